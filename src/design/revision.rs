use crate::core::{ControlDesign, EvaluationResult, RequirementSpec, TopologyDesign};
use serde::Serialize;
use tracing::debug;

/// Free-text design guidance accumulated over a run.
///
/// Owned by the run, never written back into the requirement. Notes are
/// deduplicated case-insensitively against each other and against the
/// requirement's own notes.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct DesignNotes {
    notes: Vec<String>,
}

impl DesignNotes {
    pub fn add(&mut self, req: &RequirementSpec, note: &str) -> bool {
        let lower = note.to_lowercase();
        if self.text(req).to_lowercase().contains(&lower) {
            return false;
        }
        self.notes.push(note.to_string());
        true
    }

    pub fn notes(&self) -> &[String] {
        &self.notes
    }

    /// Requirement notes followed by accumulated notes.
    pub fn text(&self, req: &RequirementSpec) -> String {
        let base = req.control_design_notes.as_deref().unwrap_or("").trim();
        std::iter::once(base)
            .chain(self.notes.iter().map(String::as_str))
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

pub const NOTE_TRANSIENT: &str = "Use cascaded current-mode control for transient response.";
pub const NOTE_RIPPLE: &str = "Reduce output ripple with stronger filtering and current loop.";
pub const NOTE_EFFICIENCY: &str = "Prefer lower-loss control action and avoid overly aggressive gains.";
pub const NOTE_ESCALATE: &str = "Escalate control structure if needed (not only gain tuning).";

/// Multiplicative perturbations applied after a failing iteration.
#[derive(Clone, Debug, PartialEq)]
pub struct RevisionPolicy {
    pub capacitance_step: f64,
    pub kp_step: f64,
    pub ki_step: f64,
    pub transient_kp_step: f64,
    pub transient_ki_step: f64,
    pub ripple_capacitance_step: f64,
    pub ripple_inductance_step: f64,
}

impl Default for RevisionPolicy {
    fn default() -> Self {
        Self {
            capacitance_step: 1.2,
            kp_step: 1.15,
            ki_step: 1.2,
            transient_kp_step: 1.08,
            transient_ki_step: 1.12,
            ripple_capacitance_step: 1.3,
            ripple_inductance_step: 1.1,
        }
    }
}

impl RevisionPolicy {
    /// Perturb `topology` and `control` in place for the next iteration.
    ///
    /// Architecture changes are left to the strategy selector, which sees the
    /// notes added here.
    pub fn revise(
        &self,
        req: &RequirementSpec,
        topology: &mut TopologyDesign,
        control: &mut ControlDesign,
        evaluation: &EvaluationResult,
        iteration: u32,
        notes: &mut DesignNotes,
    ) {
        topology.capacitor_uf *= self.capacitance_step;
        control.kp *= self.kp_step;
        control.ki *= self.ki_step;

        let violations = evaluation.violations.join(" | ").to_lowercase();
        let mut added = Vec::new();

        if violations.contains("overshoot") || violations.contains("settling_time") {
            control.kp *= self.transient_kp_step;
            control.ki *= self.transient_ki_step;
            added.push(NOTE_TRANSIENT);
        }
        if violations.contains("ripple") {
            topology.capacitor_uf *= self.ripple_capacitance_step;
            topology.inductor_uh *= self.ripple_inductance_step;
            added.push(NOTE_RIPPLE);
        }
        if violations.contains("efficiency") {
            added.push(NOTE_EFFICIENCY);
        }
        if iteration >= 1 && !evaluation.passed {
            added.push(NOTE_ESCALATE);
        }

        for note in added {
            notes.add(req, note);
        }
        debug!(
            iteration,
            capacitor_uf = topology.capacitor_uf,
            kp = control.kp,
            ki = control.ki,
            "design revised"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Architecture, InrushMode, Topology};
    use serde_json::json;

    fn requirement(notes: Option<&str>) -> RequirementSpec {
        let mut req: RequirementSpec = serde_json::from_value(json!({
            "name": "x", "vin_nominal_v": 400, "vout_target_v": 200, "pout_w": 1000,
            "fsw_hz": 20000, "ripple_v_pp_max": 5, "settling_time_ms_max": 50,
            "overshoot_pct_max": 50, "efficiency_min_pct": 99.9
        }))
        .unwrap();
        req.control_design_notes = notes.map(String::from);
        req
    }

    fn design() -> (TopologyDesign, ControlDesign) {
        (
            TopologyDesign {
                topology: Topology::Buck,
                inductor_uh: 100.0,
                capacitor_uf: 100.0,
                switches: 1,
            },
            ControlDesign {
                controller: "pi_voltage_loop".into(),
                kp: 1.0,
                ki: 1.0,
                sample_time_s: 5e-6,
                architecture: Architecture::Pi,
                current_loop_enabled: false,
                inrush_control: InrushMode::None,
                inrush_limit_a: 0.0,
                secondary_controller: "none".into(),
                rationale: vec![],
            },
        )
    }

    fn failed(violations: &[&str]) -> EvaluationResult {
        EvaluationResult {
            passed: false,
            violations: violations.iter().map(|s| s.to_string()).collect(),
            score: 0.8,
        }
    }

    #[test]
    fn baseline_tuning_always_applies() {
        let req = requirement(None);
        let (mut t, mut c) = design();
        let mut notes = DesignNotes::default();
        RevisionPolicy::default().revise(&req, &mut t, &mut c, &failed(&["efficiency_pct 96.1 < 99.9"]), 0, &mut notes);
        assert!((t.capacitor_uf - 120.0).abs() < 1e-9);
        assert!((c.kp - 1.15).abs() < 1e-12);
        assert!((c.ki - 1.2).abs() < 1e-12);
        assert_eq!(t.inductor_uh, 100.0);
        assert_eq!(notes.notes(), &[NOTE_EFFICIENCY.to_string()]);
    }

    #[test]
    fn transient_and_ripple_adjustments() {
        let req = requirement(None);
        let (mut t, mut c) = design();
        let mut notes = DesignNotes::default();
        let eval = failed(&["overshoot_pct 9.0 > 5.0", "ripple_v_pp 9.0 > 5.0"]);
        RevisionPolicy::default().revise(&req, &mut t, &mut c, &eval, 1, &mut notes);
        assert!((t.capacitor_uf - 100.0 * 1.2 * 1.3).abs() < 1e-9);
        assert!((t.inductor_uh - 110.0).abs() < 1e-9);
        assert!((c.kp - 1.15 * 1.08).abs() < 1e-12);
        assert!((c.ki - 1.2 * 1.12).abs() < 1e-12);
        assert_eq!(notes.notes().len(), 3);
    }

    #[test]
    fn notes_accumulate_without_duplicates() {
        let req = requirement(Some("Prefer lower-loss control action and avoid overly aggressive gains."));
        let (mut t, mut c) = design();
        let mut notes = DesignNotes::default();
        let eval = failed(&["efficiency_pct 96.1 < 99.9"]);
        for iteration in 0..4 {
            RevisionPolicy::default().revise(&req, &mut t, &mut c, &eval, iteration, &mut notes);
        }
        assert_eq!(notes.notes(), &[NOTE_ESCALATE.to_string()]);
        assert!(notes.text(&req).starts_with("Prefer lower-loss"));
        assert_eq!(req.control_design_notes.as_deref(), Some(NOTE_EFFICIENCY));
    }
}
