use super::law::ControllerSpec;
use super::resolver::ResolvedParameters;
use crate::core::{ControlDesign, RequirementSpec};

/// Render the MATLAB-style parameter table consumed by the template.
///
/// Every resolved symbol is bound, followed by the controller coefficients and
/// architecture metadata. Defaulted symbols are listed in a header warning and
/// annotated on their own line.
pub fn emit_parameter_table(
    req: &RequirementSpec,
    control: &ControlDesign,
    resolved: &ResolvedParameters,
    spec: &ControllerSpec,
) -> String {
    let mut lines = Vec::new();

    lines.push(format!("% Parameter table for '{}'", req.name));
    lines.push("% === Auto-generated, do not edit ===".to_string());
    if !resolved.unresolved.is_empty() {
        lines.push(format!(
            "% WARNING: {} template symbol(s) defaulted to 0: {}",
            resolved.unresolved.len(),
            resolved.unresolved.join(", ")
        ));
    }
    lines.push("par = struct();".to_string());
    lines.push(String::new());

    lines.push("% --- template symbols ---".to_string());
    for (name, value) in &resolved.values {
        let mut line = format!("par.{} = {};", name, matlab_number(*value));
        if resolved.is_defaulted(name) {
            line.push_str("  % WARNING: unresolved");
        }
        lines.push(line);
    }
    lines.push(String::new());

    lines.push("% --- controller ---".to_string());
    let coefficients = [
        ("ctrl_kp", spec.kp),
        ("ctrl_ki", spec.ki),
        ("ctrl_ts", spec.sample_time_s),
        ("ctrl_vref", spec.vref),
        ("ctrl_fsw", spec.fsw_hz),
        ("ctrl_inrush_limit_a", control.inrush_limit_a),
    ];
    for (name, value) in coefficients {
        lines.push(format!("par.{} = {};", name, matlab_number(value)));
    }
    lines.push(format!("par.ctrl_architecture = '{}';", spec.architecture));
    lines.push(format!("par.ctrl_inrush_mode = '{}';", control.inrush_control.as_str()));
    lines.push(format!("par.ctrl_output_mode = '{}';", spec.output_mode.as_str()));
    lines.push(format!("par.ctrl_input_width = {};", spec.input_width));
    lines.push(format!("par.ctrl_output_width = {};", spec.output_width));
    lines.push("% === End parameters ===".to_string());

    let mut out = lines.join("\n");
    out.push('\n');
    out
}

/// Plain decimal where readable, exponent form otherwise.
pub(crate) fn matlab_number(value: f64) -> String {
    if !value.is_finite() {
        return "0".to_string();
    }
    let magnitude = value.abs();
    if value == 0.0 {
        "0".to_string()
    } else if (1e-3..1e7).contains(&magnitude) {
        format!("{}", value)
    } else {
        format!("{:e}", value)
    }
}
