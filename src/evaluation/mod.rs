//! Requirement checks over a simulation result.
//!
//! Violations are data: every failed check contributes one message, and the
//! score drops by 0.2 per violation.

use crate::core::{EvaluationResult, RequirementSpec, SimulationResult, ValidationMode};
use serde_json::Value;
use std::path::Path;
use tracing::debug;

/// Minimum number of output samples for a waveform to be judged.
pub const MIN_WAVEFORM_SAMPLES: usize = 10;
/// Trailing mean |vout| must reach this fraction of |vout_target_v|.
pub const MIN_SETTLED_FRACTION: f64 = 0.1;
const SCORE_PENALTY: f64 = 0.2;

/// Direction of a threshold check.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Bound {
    AtMost,
    AtLeast,
}

impl Bound {
    pub fn satisfied(&self, value: f64, limit: f64) -> bool {
        match self {
            Self::AtMost => value <= limit,
            Self::AtLeast => value >= limit,
        }
    }

    /// Relation printed when the check fails.
    fn violated_symbol(&self) -> &'static str {
        match self {
            Self::AtMost => ">",
            Self::AtLeast => "<",
        }
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct Evaluator {
    /// Reject results that did not come from a trusted backend.
    pub require_trusted_backend: bool,
}

impl Evaluator {
    pub fn new(require_trusted_backend: bool) -> Self {
        Self {
            require_trusted_backend,
        }
    }

    pub fn evaluate(&self, req: &RequirementSpec, sim: &SimulationResult) -> EvaluationResult {
        let m = &sim.metrics;
        let mut violations = Vec::new();

        let checks = [
            ("overshoot_pct", m.overshoot_pct, Bound::AtMost, req.overshoot_pct_max),
            ("settling_time_ms", m.settling_time_ms, Bound::AtMost, req.settling_time_ms_max),
            ("ripple_v_pp", m.ripple_v_pp, Bound::AtMost, req.ripple_v_pp_max),
            ("efficiency_pct", m.efficiency_pct, Bound::AtLeast, req.efficiency_min_pct),
        ];
        for (metric, value, bound, limit) in checks {
            if !bound.satisfied(value, limit) {
                violations.push(format!("{} {:?} {} {:?}", metric, value, bound.violated_symbol(), limit));
            }
        }

        if self.require_trusted_backend {
            let mode = sim.validation_mode();
            if mode != ValidationMode::Trusted {
                let tag = sim
                    .raw
                    .get("validation")
                    .or_else(|| sim.raw.get("mode"))
                    .and_then(Value::as_str)
                    .unwrap_or("unknown");
                violations.push(format!("validation_mode_untrusted: {}", tag));
            }
            for warning in sim.warnings() {
                let lower = warning.to_lowercase();
                if lower.contains("fallback") || lower.contains("missing") {
                    violations.push(format!("backend_warning: {}", warning));
                }
            }
        }

        if let Some(first) = sim.waveform_files.first() {
            if let Some(violation) = check_output_waveform(Path::new(first), req.vout_target_v) {
                violations.push(violation);
            }
        }

        let passed = violations.is_empty();
        let score = if passed {
            1.0
        } else {
            (1.0 - SCORE_PENALTY * violations.len() as f64).max(0.0)
        };
        debug!(passed, score, violations = violations.len(), "evaluation complete");

        EvaluationResult {
            passed,
            violations,
            score,
        }
    }
}

/// Sanity check of the output-voltage waveform; `None` when it looks plausible.
pub fn check_output_waveform(path: &Path, vout_target_v: f64) -> Option<String> {
    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) => return Some(format!("waveform_vout_invalid: cannot read {}: {}", path.display(), e)),
    };
    let doc: Value = match serde_json::from_str(&text) {
        Ok(doc) => doc,
        Err(e) => return Some(format!("waveform_vout_invalid: cannot parse {}: {}", path.display(), e)),
    };
    let Some(samples) = doc.get("vout_v").and_then(Value::as_array) else {
        return Some(format!("waveform_vout_invalid: no vout_v series in {}", path.display()));
    };
    let vout: Vec<f64> = samples.iter().filter_map(Value::as_f64).collect();
    if vout.len() < MIN_WAVEFORM_SAMPLES {
        return Some(format!(
            "waveform_vout_invalid: {} samples < {}",
            vout.len(),
            MIN_WAVEFORM_SAMPLES
        ));
    }

    let window = (vout.len() / 10).max(1);
    let tail = &vout[vout.len() - window..];
    let settled = tail.iter().map(|v| v.abs()).sum::<f64>() / window as f64;
    let required = MIN_SETTLED_FRACTION * vout_target_v.abs();
    if settled < required {
        return Some(format!(
            "waveform_vout_low: trailing mean {:.4} < {:.4}",
            settled, required
        ));
    }
    None
}
