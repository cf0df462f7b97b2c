pub mod controller;
pub mod law;
pub mod model;
pub mod params;
pub mod resolver;

pub use controller::emit_controller_core;
pub use law::{ControlLaw, ControllerSpec, GridLaw};
pub use model::ControllerModel;
pub use params::emit_parameter_table;
pub use resolver::{ParameterSource, ResolvedParameters, resolve_parameters};

use crate::core::{ControlDesign, RequirementSpec, SlxTemplateInfo};
use crate::error::{Result, io};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::debug;

pub const PARAMETER_TABLE_FILE: &str = "parameter_table.m";
pub const CONTROLLER_CORE_FILE: &str = "control_core.c";

/// Files written by one synthesis pass.
#[derive(Clone, Debug, Serialize)]
pub struct SynthesizedCode {
    pub parameter_table: PathBuf,
    pub controller_core: PathBuf,
    pub spec: ControllerSpec,
}

impl SynthesizedCode {
    pub fn files(&self) -> Vec<PathBuf> {
        vec![self.parameter_table.clone(), self.controller_core.clone()]
    }
}

/// Write the parameter table and controller core into `dir`.
///
/// Missing design information never fails synthesis; only filesystem errors do.
pub fn synthesize(
    dir: &Path,
    req: &RequirementSpec,
    control: &ControlDesign,
    template: &SlxTemplateInfo,
    resolved: &ResolvedParameters,
) -> Result<SynthesizedCode> {
    std::fs::create_dir_all(dir).map_err(|e| io(format!("create {}", dir.display()), e))?;

    let spec = ControllerSpec::from_design(req, control, &template.sfunction);
    debug!(
        law = spec.law.name(),
        inputs = spec.input_width,
        outputs = spec.output_width,
        "synthesizing controller"
    );

    let parameter_table = dir.join(PARAMETER_TABLE_FILE);
    std::fs::write(&parameter_table, emit_parameter_table(req, control, resolved, &spec))
        .map_err(|e| io(format!("write {}", parameter_table.display()), e))?;

    let controller_core = dir.join(CONTROLLER_CORE_FILE);
    std::fs::write(&controller_core, emit_controller_core(&spec))
        .map_err(|e| io(format!("write {}", controller_core.display()), e))?;

    Ok(SynthesizedCode {
        parameter_table,
        controller_core,
        spec,
    })
}
