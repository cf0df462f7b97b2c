use crate::core::{ControlDesign, RequirementSpec, SensorDesign, SlxTemplateInfo, TopologyDesign};
use crate::error::{DesignError, Result, io};
use crate::synthesis::ResolvedParameters;
use serde::Serialize;
use std::path::{Path, PathBuf};

pub const PAYLOAD_FILE: &str = "model_payload.json";

/// Everything the backend needs to build one iteration's model.
#[derive(Debug, Serialize)]
pub struct ModelPayload<'a> {
    pub requirements: &'a RequirementSpec,
    pub topology: &'a TopologyDesign,
    pub sensors: &'a SensorDesign,
    pub control: &'a ControlDesign,
    pub template: &'a SlxTemplateInfo,
    pub template_path: Option<&'a Path>,
    pub parameters: &'a ResolvedParameters,
    pub code_files: Vec<String>,
}

/// Write `model_payload.json` into `dir` and return its path.
pub fn build_payload(dir: &Path, payload: &ModelPayload<'_>) -> Result<PathBuf> {
    let path = dir.join(PAYLOAD_FILE);
    let text = serde_json::to_string_pretty(payload).map_err(|source| DesignError::Serialize {
        context: PAYLOAD_FILE.to_string(),
        source,
    })?;
    std::fs::write(&path, text).map_err(|e| io(format!("write {}", path.display()), e))?;
    Ok(path)
}
