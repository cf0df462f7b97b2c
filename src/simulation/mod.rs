pub mod analytic;
pub mod backend;
pub mod payload;

pub use analytic::approximate;
pub use backend::{BackendConfig, ProcessBackend, SimulationBackend};
pub use payload::{ModelPayload, build_payload};

use crate::core::{ControlDesign, RequirementSpec, SimulationResult, TopologyDesign};
use crate::error::Result;
use std::path::Path;
use tracing::{info, warn};

/// Run the backend when one is supplied, otherwise (or on any backend
/// failure) fall back to the analytic approximation.
///
/// Only a failure to write the fallback waveform document is an error.
pub fn simulate(
    backend: Option<&dyn SimulationBackend>,
    req: &RequirementSpec,
    topology: &TopologyDesign,
    control: &ControlDesign,
    payload: &Path,
    out_dir: &Path,
) -> Result<SimulationResult> {
    if let Some(backend) = backend {
        match backend.run(payload, out_dir) {
            Ok(result) => {
                info!(backend = backend.name(), "backend simulation complete");
                return Ok(result);
            }
            Err(e) => warn!(backend = backend.name(), error = %e, "backend failed, using analytic fallback"),
        }
    }
    approximate(req, topology, control, out_dir)
}
