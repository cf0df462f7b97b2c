//! C source emission for the controller core.
//!
//! The generated file holds one persistent state struct, one constant
//! parameter block, `ctrl_step` implementing the selected law, and the
//! wrapper entry points the template's S-Function block links against.
//! Input reads and output writes are unrolled at generation time against the
//! template's declared port widths, so no index outside `[0, width)` ever
//! appears in the emitted text.

use super::law::*;
use crate::core::OutputMode;

const INPUT_NAMES_DC: [&str; 2] = ["vout", "il"];
const INPUT_NAMES_3PH: [&str; 6] = ["va", "vb", "vc", "ia", "ib", "ic"];

/// Render `control_core.c` for the given controller.
pub fn emit_controller_core(spec: &ControllerSpec) -> String {
    let mut c = Vec::new();

    emit_preamble(&mut c, spec);
    emit_types(&mut c, spec);
    emit_helpers(&mut c);
    emit_step(&mut c, spec);
    emit_wrappers(&mut c, spec);

    let mut out = c.join("\n");
    out.push('\n');
    out
}

fn emit_preamble(c: &mut Vec<String>, spec: &ControllerSpec) {
    c.push("/*".into());
    c.push(" * control_core.c (auto-generated, do not edit)".into());
    c.push(format!(
        " * law: {}  architecture: {}  inrush: {}  output: {}",
        spec.law.name(),
        spec.architecture,
        spec.inrush.as_str(),
        spec.output_mode.as_str()
    ));
    c.push(format!(
        " * ports: {} input(s), {} output(s); S-Function '{}' ({})",
        spec.input_width, spec.output_width, spec.function_name, spec.module_name
    ));
    c.push(" */".into());
    c.push("#include <math.h>".into());
    c.push("#include <string.h>".into());
    c.push(String::new());
    c.push(format!("#define CTRL_NU {}", spec.input_width));
    c.push(format!("#define CTRL_NY {}", spec.output_width));
    c.push("#define CTRL_TWO_PI 6.283185307179586".into());
    c.push(format!("#define CTRL_M_MAX {}", c_number(M_MAX)));
    c.push(format!("#define CTRL_SOFT_START_S {}", c_number(SOFT_START_S)));
    if let ControlLaw::ThreePhase(variant) = spec.law {
        c.push(format!("#define CTRL_F_GRID_HZ {}", c_number(F_GRID_HZ)));
        match variant {
            GridLaw::Droop => c.push(format!("#define CTRL_DROOP {}", c_number(DROOP_FRACTION))),
            GridLaw::Voc => c.push(format!("#define CTRL_VOC_K {}", c_number(VOC_PERTURBATION))),
            GridLaw::Vsg => {
                c.push(format!("#define CTRL_VSG_H {}", c_number(VSG_INERTIA_H)));
                c.push(format!("#define CTRL_VSG_D {}", c_number(VSG_DAMPING)));
                c.push(format!("#define CTRL_VSG_DW_MAX {}", c_number(VSG_MAX_DEVIATION)));
            }
            GridLaw::Dq => {}
        }
    }
    if spec.law == ControlLaw::Cascaded {
        c.push(format!("#define CTRL_INNER_GAIN {}", c_number(CASCADE_INNER_GAIN)));
    }
    c.push(String::new());
}

fn emit_types(c: &mut Vec<String>, spec: &ControllerSpec) {
    c.push("typedef struct {".into());
    c.push("    double integ;".into());
    c.push("    double t;".into());
    c.push("    double theta;".into());
    c.push("    double dw;".into());
    c.push("    double carrier;".into());
    c.push("} ctrl_state_t;".into());
    c.push(String::new());
    c.push("typedef struct {".into());
    for field in ["kp", "ki", "ts", "vref", "fsw", "ilim", "prated"] {
        c.push(format!("    double {};", field));
    }
    c.push("} ctrl_params_t;".into());
    c.push(String::new());
    c.push("static const ctrl_params_t CTRL_PARAMS = {".into());
    let values = [
        ("kp", spec.kp),
        ("ki", spec.ki),
        ("ts", spec.sample_time_s),
        ("vref", spec.vref),
        ("fsw", spec.fsw_hz),
        ("ilim", spec.current_limit_a),
        ("prated", spec.rated_power_w),
    ];
    for (name, value) in values {
        c.push(format!("    .{} = {},", name, c_number(value)));
    }
    c.push("};".into());
    c.push(String::new());
    c.push("static ctrl_state_t g_ctrl_state;".into());
    c.push(String::new());
}

fn emit_helpers(c: &mut Vec<String>) {
    c.push("static double ctrl_clamp(double x, double lo, double hi)".into());
    c.push("{".into());
    c.push("    return (x < lo) ? lo : ((x > hi) ? hi : x);".into());
    c.push("}".into());
    c.push(String::new());
    c.push("void ctrl_init(ctrl_state_t *st)".into());
    c.push("{".into());
    c.push("    memset(st, 0, sizeof(*st));".into());
    c.push("}".into());
    c.push(String::new());
}

fn emit_step(c: &mut Vec<String>, spec: &ControllerSpec) {
    let produced = spec.law.outputs_produced(spec.output_mode);

    c.push("void ctrl_step(ctrl_state_t *st, const ctrl_params_t *p,".into());
    c.push("               const double *u, int nu, double *y, int ny)".into());
    c.push("{".into());
    c.push(format!("    double out[{}] = {{0}};", produced));

    let names: &[&str] = match spec.law {
        ControlLaw::Pi | ControlLaw::Cascaded => &INPUT_NAMES_DC,
        ControlLaw::ThreePhase(_) => &INPUT_NAMES_3PH,
    };
    let read = spec.inputs_read();
    for (k, name) in names.iter().enumerate() {
        if k < read {
            c.push(format!("    const double {} = (nu > {}) ? u[{}] : 0.0;", name, k, k));
        } else {
            c.push(format!("    const double {} = 0.0;", name));
        }
    }
    c.push(String::new());

    c.push("    double vref = p->vref;".into());
    if spec.soft_start() {
        c.push("    vref *= ctrl_clamp(st->t / CTRL_SOFT_START_S, 0.0, 1.0);".into());
    }

    match spec.law {
        ControlLaw::Pi | ControlLaw::Cascaded => emit_duty_law(c, spec),
        ControlLaw::ThreePhase(variant) => emit_three_phase_law(c, spec, variant),
    }

    c.push("    st->t += p->ts;".into());
    c.push(String::new());

    let written = spec.outputs_written();
    for j in 0..spec.output_width {
        if j < written {
            c.push(format!("    if (ny > {}) y[{}] = out[{}];", j, j, j));
        } else {
            c.push(format!("    if (ny > {}) y[{}] = 0.0;", j, j));
        }
    }
    c.push("}".into());
    c.push(String::new());
}

fn emit_duty_law(c: &mut Vec<String>, spec: &ControllerSpec) {
    let current_sensed = spec.inputs_read() >= 2;

    c.push("    const double e = vref - vout;".into());
    c.push("    st->integ = ctrl_clamp(st->integ + p->ki * e * p->ts, 0.0, 1.0);".into());
    if spec.law == ControlLaw::Cascaded {
        c.push("    const double iref_pu = ctrl_clamp(p->kp * e + st->integ, 0.0, 1.0);".into());
        if current_sensed {
            c.push("    const double ilim = (p->ilim > 0.0) ? p->ilim : 1.0;".into());
            c.push("    const double iref = iref_pu * ilim;".into());
            c.push(
                "    double duty = ctrl_clamp(iref_pu + CTRL_INNER_GAIN * (iref - il) / ilim, 0.0, 1.0);"
                    .into(),
            );
        } else {
            c.push("    double duty = iref_pu;".into());
        }
    } else {
        c.push("    double duty = ctrl_clamp(p->kp * e + st->integ, 0.0, 1.0);".into());
    }
    if spec.inrush == crate::core::InrushMode::ActiveCurrentLimit && current_sensed {
        c.push("    if (p->ilim > 0.0 && fabs(il) > p->ilim) {".into());
        c.push("        duty = ctrl_clamp(duty * p->ilim / fabs(il), 0.0, 1.0);".into());
        c.push("    }".into());
    }
    c.push("    out[0] = duty;".into());
    c.push("    out[1] = 1.0 - duty;".into());
}

fn emit_three_phase_law(c: &mut Vec<String>, spec: &ControllerSpec, variant: GridLaw) {
    let read = spec.inputs_read();
    let nv = read.min(3).max(1);
    let ni = read.saturating_sub(3).max(1);

    c.push(format!(
        "    const double vmag = sqrt((va * va + vb * vb + vc * vc) / {});",
        c_number(nv as f64)
    ));
    c.push(format!(
        "    const double imag = sqrt((ia * ia + ib * ib + ic * ic) / {});",
        c_number(ni as f64)
    ));
    c.push("    const double pest = 3.0 * vmag * imag;".into());
    if variant == GridLaw::Droop {
        c.push("    vref -= CTRL_DROOP * p->vref * (pest / p->prated);".into());
    }
    c.push("    const double vnorm = (fabs(p->vref) > 1.0) ? fabs(p->vref) : 1.0;".into());
    c.push("    const double e = (vref - vmag) / vnorm;".into());
    c.push("    st->integ = ctrl_clamp(st->integ + p->ki * e * p->ts, -CTRL_M_MAX, CTRL_M_MAX);".into());
    c.push("    double m = p->kp * e + st->integ;".into());
    c.push("    double omega = CTRL_TWO_PI * CTRL_F_GRID_HZ;".into());
    if variant == GridLaw::Vsg {
        c.push("    {".into());
        c.push("        const double swing = 1.0 - pest / p->prated - CTRL_VSG_D * st->dw;".into());
        c.push(
            "        st->dw = ctrl_clamp(st->dw + p->ts * swing / (2.0 * CTRL_VSG_H), -CTRL_VSG_DW_MAX, CTRL_VSG_DW_MAX);"
                .into(),
        );
        c.push("    }".into());
        c.push("    omega *= 1.0 + st->dw;".into());
    }
    c.push("    st->theta = fmod(st->theta + omega * p->ts, CTRL_TWO_PI);".into());
    if variant == GridLaw::Voc {
        c.push("    m += CTRL_VOC_K * sin(st->theta);".into());
    }
    if spec.inrush == crate::core::InrushMode::ActiveCurrentLimit {
        c.push("    if (p->ilim > 0.0 && imag > p->ilim) {".into());
        c.push("        m *= p->ilim / imag;".into());
        c.push("    }".into());
    }
    c.push("    m = ctrl_clamp(m, -CTRL_M_MAX, CTRL_M_MAX);".into());
    c.push("    const double ra = m * sin(st->theta);".into());
    c.push("    const double rb = m * sin(st->theta - CTRL_TWO_PI / 3.0);".into());
    c.push("    const double rc = m * sin(st->theta - 2.0 * CTRL_TWO_PI / 3.0);".into());

    match spec.output_mode {
        OutputMode::GatePulses => {
            c.push("    st->carrier += p->fsw * p->ts;".into());
            c.push("    st->carrier -= floor(st->carrier);".into());
            c.push("    const double tri = 1.0 - 4.0 * fabs(st->carrier - 0.5);".into());
            for (k, r) in ["ra", "rb", "rc"].iter().enumerate() {
                c.push(format!("    out[{}] = ({} >= tri) ? 1.0 : 0.0;", 2 * k, r));
                c.push(format!("    out[{}] = 1.0 - out[{}];", 2 * k + 1, 2 * k));
            }
        }
        OutputMode::DutyCycles => {
            for (k, r) in ["ra", "rb", "rc"].iter().enumerate() {
                c.push(format!("    out[{}] = 0.5 * (1.0 + {});", k, r));
            }
        }
    }
}

fn emit_wrappers(c: &mut Vec<String>, spec: &ControllerSpec) {
    let name = c_identifier(&spec.function_name);

    c.push(format!("void {}_Start_wrapper(void)", name));
    c.push("{".into());
    c.push("    ctrl_init(&g_ctrl_state);".into());
    c.push("}".into());
    c.push(String::new());
    c.push(format!("void {}_Outputs_wrapper(const double *u0, double *y0)", name));
    c.push("{".into());
    c.push("    ctrl_step(&g_ctrl_state, &CTRL_PARAMS, u0, CTRL_NU, y0, CTRL_NY);".into());
    c.push("}".into());
    c.push(String::new());
    c.push(format!("void {}_Terminate_wrapper(void)", name));
    c.push("{".into());
    c.push("}".into());
}

/// C double literal; non-finite values become `0.0`.
pub(crate) fn c_number(value: f64) -> String {
    if value.is_finite() {
        format!("{:?}", value)
    } else {
        "0.0".to_string()
    }
}

/// Map an arbitrary block function name onto a C identifier.
pub(crate) fn c_identifier(name: &str) -> String {
    let mut ident: String = name
        .chars()
        .map(|ch| if ch.is_ascii_alphanumeric() || ch == '_' { ch } else { '_' })
        .collect();
    if ident.is_empty() || ident.starts_with(|ch: char| ch.is_ascii_digit()) {
        ident.insert(0, '_');
    }
    ident
}
