//! Documents written into the run directory.

use super::RunState;
use crate::core::{ControlDesign, IterationRecord, RequirementSpec, SlxTemplateInfo};
use crate::error::{DesignError, Result, io};
use chrono::{DateTime, Local};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub const ITERATION_SUMMARY_FILE: &str = "summary.json";
pub const RUN_SUMMARY_FILE: &str = "run_summary.json";
pub const ARTIFACTS_DIR: &str = "final_artifacts";
pub const MANIFEST_FILE: &str = "manifest.json";

/// Template actually used for a run.
#[derive(Clone, Debug, Serialize)]
pub struct TemplateSelection {
    pub path: Option<PathBuf>,
    pub info: SlxTemplateInfo,
    /// The built-in descriptor stands in for a missing or unreadable container.
    pub defaulted: bool,
}

#[derive(Serialize)]
pub struct RunSummary<'a> {
    pub requirements: &'a RequirementSpec,
    pub template: &'a TemplateSelection,
    pub iterations: &'a [IterationRecord],
    pub final_passed: bool,
    pub final_score: f64,
    pub final_state: RunState,
    pub published_from: Option<u32>,
    pub design_notes: &'a [String],
}

#[derive(Debug, Serialize)]
pub struct Manifest<'a> {
    pub source_iteration: u32,
    pub controller: &'a ControlDesign,
    pub files: Vec<String>,
    pub published_at: DateTime<Local>,
}

pub fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let text = serde_json::to_string_pretty(value).map_err(|source| DesignError::Serialize {
        context: path.display().to_string(),
        source,
    })?;
    std::fs::write(path, text).map_err(|e| io(format!("write {}", path.display()), e))
}

pub fn write_iteration_summary(iter_dir: &Path, record: &IterationRecord) -> Result<()> {
    write_json(&iter_dir.join(ITERATION_SUMMARY_FILE), record)
}

pub fn write_run_summary(run_dir: &Path, summary: &RunSummary<'_>) -> Result<PathBuf> {
    let path = run_dir.join(RUN_SUMMARY_FILE);
    write_json(&path, summary)?;
    Ok(path)
}

/// Copy the first passing record's code files into `final_artifacts/`.
///
/// Returns the iteration published from, or `None` when nothing passed, in
/// which case no artifacts directory is created.
pub fn publish(run_dir: &Path, records: &[IterationRecord]) -> Result<Option<u32>> {
    let Some(record) = records.iter().find(|r| r.evaluation.passed) else {
        info!("no passing iteration, nothing published");
        return Ok(None);
    };

    let dir = run_dir.join(ARTIFACTS_DIR);
    std::fs::create_dir_all(&dir).map_err(|e| io(format!("create {}", dir.display()), e))?;

    let mut files = Vec::new();
    for source in &record.simulation.code_files {
        let source = Path::new(source);
        let Some(name) = source.file_name() else {
            continue;
        };
        if !source.is_file() {
            warn!(file = %source.display(), "code file missing, not published");
            continue;
        }
        let target = dir.join(name);
        std::fs::copy(source, &target)
            .map_err(|e| io(format!("copy {} to {}", source.display(), target.display()), e))?;
        files.push(name.to_string_lossy().into_owned());
    }

    let manifest = Manifest {
        source_iteration: record.iteration,
        controller: &record.control,
        files,
        published_at: Local::now(),
    };
    write_json(&dir.join(MANIFEST_FILE), &manifest)?;
    info!(
        iteration = record.iteration,
        files = manifest.files.len(),
        dir = %dir.display(),
        "published final artifacts"
    );
    Ok(Some(record.iteration))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{
        Architecture, EvaluationResult, InrushMode, Metrics, SensorDesign, SimulationResult,
        Topology, TopologyDesign,
    };
    use indexmap::IndexMap;
    use serde_json::{Value, json};

    fn record(iteration: u32, passed: bool, code_files: Vec<String>) -> IterationRecord {
        IterationRecord {
            iteration,
            topology: TopologyDesign {
                topology: Topology::Buck,
                inductor_uh: 10.0,
                capacitor_uf: 100.0,
                switches: 1,
            },
            sensors: SensorDesign::default(),
            control: ControlDesign {
                controller: "pi_voltage_loop".into(),
                kp: 0.03 + iteration as f64,
                ki: 6.0,
                sample_time_s: 1e-6,
                architecture: Architecture::Pi,
                current_loop_enabled: false,
                inrush_control: InrushMode::None,
                inrush_limit_a: 0.0,
                secondary_controller: "none".into(),
                rationale: vec![],
            },
            simulation: SimulationResult {
                metrics: Metrics {
                    overshoot_pct: 1.0,
                    settling_time_ms: 1.0,
                    ripple_v_pp: 0.1,
                    efficiency_pct: 95.0,
                    extra: IndexMap::new(),
                },
                waveform_files: vec![],
                code_files,
                raw: json!({}),
            },
            evaluation: EvaluationResult {
                passed,
                violations: vec![],
                score: if passed { 1.0 } else { 0.5 },
            },
        }
    }

    #[test]
    fn nothing_published_without_pass() {
        let dir = tempfile::tempdir().unwrap();
        let published = publish(dir.path(), &[record(0, false, vec![])]).unwrap();
        assert_eq!(published, None);
        assert!(!dir.path().join(ARTIFACTS_DIR).exists());
    }

    #[test]
    fn first_passing_record_is_published() {
        let dir = tempfile::tempdir().unwrap();
        let code = |it: u32| {
            let path = dir.path().join(format!("core_{it}.c"));
            std::fs::write(&path, format!("// iteration {it}")).unwrap();
            vec![path.display().to_string()]
        };
        let records = vec![
            record(0, false, code(0)),
            record(1, true, code(1)),
            record(2, true, code(2)),
        ];

        assert_eq!(publish(dir.path(), &records).unwrap(), Some(1));

        let artifacts = dir.path().join(ARTIFACTS_DIR);
        assert!(artifacts.join("core_1.c").is_file());
        assert!(!artifacts.join("core_2.c").exists());
        let manifest: Value =
            serde_json::from_str(&std::fs::read_to_string(artifacts.join(MANIFEST_FILE)).unwrap()).unwrap();
        assert_eq!(manifest["source_iteration"], 1);
        assert_eq!(manifest["controller"]["kp"], 1.03);
        assert_eq!(manifest["files"], json!(["core_1.c"]));
    }
}
