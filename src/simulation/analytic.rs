//! Closed-form stand-in for the circuit simulator.
//!
//! The numbers are a crude heuristic, good enough to drive the iteration loop
//! when no backend is available. Results are tagged `analytic_fallback` so a
//! trusted-backend evaluation rejects them.

use crate::core::{ControlDesign, Metrics, RequirementSpec, SimulationResult, Topology, TopologyDesign};
use crate::error::{DesignError, Result, io};
use indexmap::IndexMap;
use serde::Serialize;
use serde_json::json;
use std::path::Path;

pub const WAVEFORM_FILE: &str = "waveforms.json";
pub const FALLBACK_MODE: &str = "analytic_fallback";

const WAVEFORM_SAMPLES: usize = 200;
const WAVEFORM_DT_S: f64 = 1e-4;
/// Rise time constant, in samples.
const WAVEFORM_TAU: f64 = 35.0;

#[derive(Serialize)]
struct Waveforms {
    time_s: Vec<f64>,
    vout_v: Vec<f64>,
}

/// Heuristic metrics for one design.
pub fn estimate_metrics(req: &RequirementSpec, topology: &TopologyDesign, control: &ControlDesign) -> Metrics {
    let ratio = req.conversion_ratio();
    let matched = (ratio < 1.0 && topology.topology == Topology::Buck)
        || (ratio > 1.0 && topology.topology == Topology::Boost);
    let bonus = if matched { 1.0 } else { 0.92 };
    let gain = (0.7 + control.kp * 12.0).min(1.2).max(0.1);

    let overshoot = (8.0 / gain).max(0.5) / bonus;
    let settling = (5.0 / gain).max(0.3) / bonus;
    let ripple = (0.12 * (100.0 / topology.capacitor_uf.max(1.0))).max(0.01);
    let efficiency = (89.0 + 4.5 * bonus + topology.inductor_uh.max(1.0).log10()).min(99.0);

    Metrics {
        overshoot_pct: round_to(overshoot, 3),
        settling_time_ms: round_to(settling, 3),
        ripple_v_pp: round_to(ripple, 4),
        efficiency_pct: round_to(efficiency, 3),
        extra: IndexMap::new(),
    }
}

/// Fallback simulation: heuristic metrics plus a first-order output rise
/// written to `waveforms.json` in `out_dir`.
pub fn approximate(
    req: &RequirementSpec,
    topology: &TopologyDesign,
    control: &ControlDesign,
    out_dir: &Path,
) -> Result<SimulationResult> {
    let metrics = estimate_metrics(req, topology, control);

    let waveforms = Waveforms {
        time_s: (0..WAVEFORM_SAMPLES).map(|i| i as f64 * WAVEFORM_DT_S).collect(),
        vout_v: (0..WAVEFORM_SAMPLES)
            .map(|i| req.vout_target_v * (1.0 - (-(i as f64) / WAVEFORM_TAU).exp()))
            .collect(),
    };
    let path = out_dir.join(WAVEFORM_FILE);
    let text = serde_json::to_string(&waveforms).map_err(|source| DesignError::Serialize {
        context: WAVEFORM_FILE.to_string(),
        source,
    })?;
    std::fs::write(&path, text).map_err(|e| io(format!("write {}", path.display()), e))?;

    Ok(SimulationResult {
        metrics,
        waveform_files: vec![path.to_string_lossy().into_owned()],
        code_files: Vec::new(),
        raw: json!({
            "mode": FALLBACK_MODE,
            "validation": "fallback",
            "topology": topology,
            "control": control,
        }),
    })
}

fn round_to(value: f64, places: i32) -> f64 {
    let scale = 10f64.powi(places);
    (value * scale).round() / scale
}
