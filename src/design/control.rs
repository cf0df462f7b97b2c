use super::proposal::{self, DesignProposer, ProposalKind};
use super::strategy::ControlStrategy;
use crate::core::{Architecture, ControlDesign, InrushMode, RequirementSpec, TopologyDesign};
use crate::error::ProposalError;
use tracing::{debug, warn};

const SYSTEM_PROMPT: &str = "You are a control parameter synthesis assistant. \
Given selected strategy, return JSON only with keys: controller, architecture, \
current_loop_enabled, inrush_control, inrush_limit_a, secondary_controller, kp, ki, sample_time_s, rationale.";

/// Per-iteration gain growth of the rule-based design.
const GAIN_STEP: f64 = 0.15;

pub fn design_control(
    req: &RequirementSpec,
    topology: &TopologyDesign,
    iteration: u32,
    strategy: &ControlStrategy,
    proposer: &dyn DesignProposer,
) -> ControlDesign {
    match propose_gains(req, topology, iteration, strategy, proposer) {
        Ok(control) => {
            debug!(kp = control.kp, ki = control.ki, "using proposed gains");
            control
        }
        Err(ProposalError::Disabled) => rule_based_control(req, topology, iteration, strategy),
        Err(e) => {
            warn!(error = %e, "gain proposal rejected, using rules");
            rule_based_control(req, topology, iteration, strategy)
        }
    }
}

fn propose_gains(
    req: &RequirementSpec,
    topology: &TopologyDesign,
    iteration: u32,
    strategy: &ControlStrategy,
    proposer: &dyn DesignProposer,
) -> Result<ControlDesign, ProposalError> {
    let user = format!(
        "requirements={}\ntopology={}\nselected_strategy={}\niteration={}\ndesign_prompt={}\n\
         Keep controller type aligned with selected_strategy.",
        serde_json::to_string(req).unwrap_or_default(),
        serde_json::to_string(topology).unwrap_or_default(),
        serde_json::to_string(strategy).unwrap_or_default(),
        iteration,
        req.design_prompt.as_deref().unwrap_or(""),
    );
    let value = proposer.propose(ProposalKind::Gains, SYSTEM_PROMPT, &user)?;
    let object = proposal::validate_fields(ProposalKind::Gains, &value)?;

    let kp = non_negative(proposal::number(object, "kp")?, "kp")?;
    let ki = non_negative(proposal::number(object, "ki")?, "ki")?;
    let sample_time_s = proposal::number(object, "sample_time_s")?;
    if sample_time_s <= 0.0 {
        return Err(ProposalError::InvalidField {
            field: "sample_time_s".into(),
            expected: "positive number",
        });
    }

    let inrush = object
        .get("inrush_control")
        .and_then(|v| v.as_str())
        .map(InrushMode::normalize)
        .unwrap_or(strategy.inrush_control);
    let limit = proposal::number(object, "inrush_limit_a").unwrap_or_else(|_| req.current_limit_a());
    let mut rationale = proposal::string_list(object, "rationale");
    if rationale.is_empty() {
        rationale.push(format!("Proposed gains for iteration {}", iteration));
    }

    let mut control = ControlDesign {
        controller: proposal::text(object, "controller")?,
        kp,
        ki,
        sample_time_s,
        architecture: Architecture::from_tag(&proposal::text(object, "architecture")?),
        current_loop_enabled: proposal::boolean(object, "current_loop_enabled")
            .unwrap_or(strategy.current_loop_enabled),
        inrush_control: InrushMode::None,
        inrush_limit_a: 0.0,
        secondary_controller: proposal::text(object, "secondary_controller")
            .unwrap_or_else(|_| strategy.secondary_controller.clone()),
        rationale,
    };
    control.set_inrush(inrush, limit);
    Ok(control)
}

fn non_negative(value: f64, field: &str) -> Result<f64, ProposalError> {
    if value >= 0.0 {
        Ok(value)
    } else {
        Err(ProposalError::InvalidField {
            field: field.to_string(),
            expected: "non-negative number",
        })
    }
}

/// Gains scaled with the iteration index from per-architecture bases.
pub fn rule_based_control(
    req: &RequirementSpec,
    topology: &TopologyDesign,
    iteration: u32,
    strategy: &ControlStrategy,
) -> ControlDesign {
    let scale = 1.0 + GAIN_STEP * iteration as f64;

    let (architecture, kp, ki, sample_time_s, current_loop_enabled) = if topology.topology.is_three_phase() {
        let architecture = match strategy.architecture {
            Architecture::Pi => Architecture::Dq,
            other => other,
        };
        let base = match architecture {
            Architecture::Droop => 0.06,
            Architecture::Voc | Architecture::Cascaded => 0.05,
            Architecture::Vsg => 0.04,
            _ => 0.08,
        };
        let kp = base * scale;
        let ki_ratio = match architecture {
            Architecture::Vsg | Architecture::Droop => 600.0,
            _ => 500.0,
        };
        let current_loop = match architecture {
            Architecture::PfcCurrentMode => strategy.current_loop_enabled,
            _ => true,
        };
        (architecture, kp, kp * ki_ratio, 1.0 / req.fsw_hz.max(1.0), current_loop)
    } else {
        let base = match topology.topology {
            crate::core::Topology::Buck => 0.03,
            _ => 0.02,
        };
        let kp = base * scale;
        (
            strategy.architecture,
            kp,
            kp * 200.0,
            1.0 / (req.fsw_hz.max(1.0) * 10.0),
            strategy.current_loop_enabled,
        )
    };

    let mut control = ControlDesign {
        controller: strategy.controller.clone(),
        kp,
        ki,
        sample_time_s,
        architecture,
        current_loop_enabled,
        inrush_control: InrushMode::None,
        inrush_limit_a: 0.0,
        secondary_controller: strategy.secondary_controller.clone(),
        rationale: strategy.rationale.clone(),
    };
    control.set_inrush(strategy.inrush_control, req.current_limit_a());
    control
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Topology;
    use crate::design::proposal::DisabledProposer;
    use serde_json::{Value, json};

    fn requirement() -> RequirementSpec {
        serde_json::from_value(json!({
            "name": "x", "vin_nominal_v": 400, "vout_target_v": 200, "pout_w": 1000,
            "fsw_hz": 20000, "ripple_v_pp_max": 5, "settling_time_ms_max": 50,
            "overshoot_pct_max": 50, "efficiency_min_pct": 50
        }))
        .unwrap()
    }

    fn strategy(architecture: Architecture, inrush: InrushMode) -> ControlStrategy {
        ControlStrategy {
            controller: "ctrl".into(),
            architecture,
            current_loop_enabled: false,
            inrush_control: inrush,
            secondary_controller: "none".into(),
            rationale: vec!["r".into()],
        }
    }

    fn topology(topology: Topology) -> TopologyDesign {
        TopologyDesign {
            topology,
            inductor_uh: 400.0,
            capacitor_uf: 100.0,
            switches: 1,
        }
    }

    #[test]
    fn dc_dc_gains() {
        let c = rule_based_control(&requirement(), &topology(Topology::Buck), 0, &strategy(Architecture::Pi, InrushMode::None));
        assert!((c.kp - 0.03).abs() < 1e-12);
        assert!((c.ki - 6.0).abs() < 1e-9);
        assert!((c.sample_time_s - 5e-6).abs() < 1e-15);
        assert_eq!(c.inrush_limit_a, 0.0);

        let c = rule_based_control(&requirement(), &topology(Topology::Boost), 2, &strategy(Architecture::Pi, InrushMode::None));
        assert!((c.kp - 0.02 * 1.3).abs() < 1e-12);
    }

    #[test]
    fn inverter_gains() {
        let inv = topology(Topology::Inverter3Ph);
        let c = rule_based_control(&requirement(), &inv, 0, &strategy(Architecture::Pi, InrushMode::None));
        assert_eq!(c.architecture, Architecture::Dq);
        assert!((c.kp - 0.08).abs() < 1e-12);
        assert!((c.ki - 40.0).abs() < 1e-9);
        assert!((c.sample_time_s - 5e-5).abs() < 1e-15);
        assert!(c.current_loop_enabled);

        let c = rule_based_control(&requirement(), &inv, 1, &strategy(Architecture::Vsg, InrushMode::ActiveCurrentLimit));
        assert!((c.kp - 0.04 * 1.15).abs() < 1e-12);
        assert!((c.ki - c.kp * 600.0).abs() < 1e-9);
        // max(10, 1000 / 200)
        assert_eq!(c.inrush_limit_a, 10.0);
    }

    #[test]
    fn proposed_gains_are_validated() {
        let req = requirement();
        let buck = topology(Topology::Buck);
        let s = strategy(Architecture::Pi, InrushMode::None);

        let good = |_: ProposalKind, _: &str, _: &str| -> Result<Value, ProposalError> {
            Ok(json!({"controller": "pi", "architecture": "cascaded", "kp": "0.5", "ki": 10,
                      "sample_time_s": 1e-5, "inrush_control": "none", "inrush_limit_a": 25}))
        };
        let c = design_control(&req, &buck, 0, &s, &good);
        assert_eq!(c.architecture, Architecture::Cascaded);
        assert_eq!(c.kp, 0.5);
        assert_eq!(c.inrush_limit_a, 0.0);

        let negative = |_: ProposalKind, _: &str, _: &str| -> Result<Value, ProposalError> {
            Ok(json!({"controller": "pi", "architecture": "pi", "kp": -1, "ki": 10, "sample_time_s": 1e-5}))
        };
        let expected = rule_based_control(&req, &buck, 0, &s);
        assert_eq!(design_control(&req, &buck, 0, &s, &negative), expected);
        assert_eq!(design_control(&req, &buck, 0, &s, &DisabledProposer), expected);
    }
}
