//! The design iteration loop.
//!
//! A run walks `Init -> Iterating -> {Passed | Exhausted}`. Every fatal error
//! (requirement or explicit template) surfaces before iteration 0; from then on
//! only filesystem failures abort the run.

pub mod callback;
pub mod config;
pub mod report;

pub use callback::{IterationObserver, ProgressLog, format_duration};
pub use config::OrchestratorConfig;
pub use report::TemplateSelection;

use crate::core::{
    ControlDesign, IterationRecord, RequirementSpec, SlxTemplateInfo, TopologyDesign,
};
use crate::design::{
    DesignNotes, DesignProposer, DisabledProposer, RevisionPolicy,
    choose_strategy, design_control, design_sensors, design_topology,
};
use crate::error::{DesignError, Result, io};
use crate::evaluation::Evaluator;
use crate::simulation::{ModelPayload, ProcessBackend, SimulationBackend, build_payload, simulate};
use crate::synthesis::{resolve_parameters, synthesize};
use crate::template::{discover_template, load_template_info};
use chrono::Local;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

pub const GENERATED_DIR: &str = "generated";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Init,
    Iterating,
    Passed,
    Exhausted,
}

/// Everything a finished run produced.
#[derive(Clone, Debug)]
pub struct RunOutcome {
    pub run_dir: PathBuf,
    pub state: RunState,
    pub records: Vec<IterationRecord>,
    pub published_from: Option<u32>,
    pub design_notes: Vec<String>,
}

impl RunOutcome {
    pub fn final_passed(&self) -> bool {
        self.state == RunState::Passed
    }

    /// Score of the last record, 0 for an empty run.
    pub fn final_score(&self) -> f64 {
        self.records.last().map(|r| r.evaluation.score).unwrap_or(0.0)
    }

    pub fn artifacts_dir(&self) -> Option<PathBuf> {
        self.published_from.map(|_| self.run_dir.join(report::ARTIFACTS_DIR))
    }
}

pub struct Orchestrator {
    config: OrchestratorConfig,
    proposer: Box<dyn DesignProposer>,
    backend: Option<Box<dyn SimulationBackend>>,
    observers: Vec<Box<dyn IterationObserver>>,
    revision: RevisionPolicy,
    evaluator: Evaluator,
}

impl Orchestrator {
    pub fn new(config: OrchestratorConfig) -> Self {
        let backend: Option<Box<dyn SimulationBackend>> = if config.use_backend {
            Some(Box::new(ProcessBackend::new(config.backend.clone())))
        } else {
            None
        };
        let evaluator = Evaluator::new(config.require_trusted_backend);
        Self {
            config,
            proposer: Box::new(DisabledProposer),
            backend,
            observers: Vec::new(),
            revision: RevisionPolicy::default(),
            evaluator,
        }
    }

    pub fn with_proposer(mut self, proposer: impl DesignProposer + 'static) -> Self {
        self.proposer = Box::new(proposer);
        self
    }

    /// Replace the backend. Ignored when the backend is disabled in the config.
    pub fn with_backend(mut self, backend: impl SimulationBackend + 'static) -> Self {
        if self.config.use_backend {
            self.backend = Some(Box::new(backend));
        }
        self
    }

    pub fn with_observer(mut self, observer: impl IterationObserver + 'static) -> Self {
        self.observers.push(Box::new(observer));
        self
    }

    pub fn with_revision_policy(mut self, revision: RevisionPolicy) -> Self {
        self.revision = revision;
        self
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn run(&mut self, requirements_path: &Path) -> Result<RunOutcome> {
        let req = RequirementSpec::load(requirements_path)?;
        req.validate()?;
        let template = self.select_template()?;

        info!("=== DESIGN RUN START ===");
        info!(
            name = %req.name,
            vin = req.vin_nominal_v,
            vout = req.vout_target_v,
            pout = req.pout_w,
            max_iterations = req.max_iterations,
            "requirements loaded"
        );
        info!(
            template = %template.path.as_deref().map(|p| p.display().to_string()).unwrap_or_else(|| "<builtin>".into()),
            symbols = template.info.parameter_symbols.len(),
            sfunction = %template.info.sfunction.function_name,
            "template selected"
        );

        let run_dir = create_run_dir(&self.config.out_dir, &req.name)?;
        info!(dir = %run_dir.display(), "run directory created");

        let mut state = RunState::Init;
        let proposer = &*self.proposer;
        let mut notes = DesignNotes::default();
        let mut topology = design_topology(&req, proposer);
        let mut strategy = choose_strategy(&req, &topology, 0, None, &notes, proposer);
        let mut control = design_control(&req, &topology, 0, &strategy, proposer);
        info!(
            topology = %topology.topology,
            architecture = %control.architecture,
            controller = %control.controller,
            "initial design"
        );

        let mut records: Vec<IterationRecord> = Vec::new();
        transition(&mut state, RunState::Iterating);

        for iteration in 0..req.max_iterations {
            if iteration > 0 {
                let previous = records.last().map(|r| &r.evaluation);
                let next = choose_strategy(&req, &topology, iteration, previous, &notes, proposer);
                if next.architecture != strategy.architecture {
                    info!(
                        iteration,
                        from = %strategy.architecture,
                        to = %next.architecture,
                        "escalating control structure"
                    );
                    control = design_control(&req, &topology, iteration, &next, proposer);
                }
                strategy = next;
            }

            let record = self.run_iteration(&req, &template, &run_dir, iteration, &topology, &control)?;
            for observer in self.observers.iter_mut() {
                observer.on_iteration(&record);
            }
            report::write_iteration_summary(&iteration_dir(&run_dir, iteration), &record)?;

            let passed = record.evaluation.passed;
            records.push(record);
            if passed {
                transition(&mut state, RunState::Passed);
                break;
            }

            if let Some(last) = records.last() {
                self.revision.revise(
                    &req,
                    &mut topology,
                    &mut control,
                    &last.evaluation,
                    iteration,
                    &mut notes,
                );
            }
        }

        if state != RunState::Passed {
            transition(&mut state, RunState::Exhausted);
        }

        let published_from = report::publish(&run_dir, &records)?;
        let final_score = records.last().map(|r| r.evaluation.score).unwrap_or(0.0);
        report::write_run_summary(
            &run_dir,
            &report::RunSummary {
                requirements: &req,
                template: &template,
                iterations: &records,
                final_passed: state == RunState::Passed,
                final_score,
                final_state: state,
                published_from,
                design_notes: notes.notes(),
            },
        )?;

        let outcome = RunOutcome {
            run_dir,
            state,
            records,
            published_from,
            design_notes: notes.notes().to_vec(),
        };
        for observer in self.observers.iter_mut() {
            observer.on_finish(&outcome);
        }
        info!(
            passed = outcome.final_passed(),
            score = outcome.final_score(),
            iterations = outcome.records.len(),
            "=== DESIGN RUN COMPLETE ==="
        );
        Ok(outcome)
    }

    /// Explicit template: must exist, unreadable content is defaulted.
    /// Otherwise the first `*.slx` under the search directory, else the builtin.
    fn select_template(&self) -> Result<TemplateSelection> {
        let path = match &self.config.template_path {
            Some(path) if !path.is_file() => return Err(DesignError::TemplateNotFound(path.clone())),
            Some(path) => Some(path.clone()),
            None => discover_template(&self.config.template_dir),
        };

        let Some(path) = path else {
            info!(dir = %self.config.template_dir.display(), "no template found, using builtin descriptor");
            return Ok(TemplateSelection {
                path: None,
                info: SlxTemplateInfo::fallback(),
                defaulted: true,
            });
        };

        match load_template_info(&path) {
            Ok(info) => Ok(TemplateSelection {
                path: Some(path),
                info,
                defaulted: false,
            }),
            Err(e) => {
                warn!(template = %path.display(), error = %e, "template unreadable, using builtin descriptor");
                Ok(TemplateSelection {
                    path: Some(path),
                    info: SlxTemplateInfo::fallback(),
                    defaulted: true,
                })
            }
        }
    }

    fn run_iteration(
        &self,
        req: &RequirementSpec,
        template: &TemplateSelection,
        run_dir: &Path,
        iteration: u32,
        topology: &TopologyDesign,
        control: &ControlDesign,
    ) -> Result<IterationRecord> {
        let iter_dir = iteration_dir(run_dir, iteration);
        std::fs::create_dir_all(&iter_dir).map_err(|e| io(format!("create {}", iter_dir.display()), e))?;
        debug!(iteration, dir = %iter_dir.display(), "iteration start");

        let sensors = design_sensors(req, topology);
        let resolved = resolve_parameters(req, topology, control, &template.info.parameter_symbols);
        for symbol in &resolved.unresolved {
            warn!(iteration, symbol = %symbol, "template symbol unresolved, defaulted to 0");
        }

        let code = synthesize(&iter_dir.join(GENERATED_DIR), req, control, &template.info, &resolved)?;
        let code_files: Vec<String> = code.files().iter().map(|p| p.display().to_string()).collect();

        let payload = build_payload(
            &iter_dir,
            &ModelPayload {
                requirements: req,
                topology,
                sensors: &sensors,
                control,
                template: &template.info,
                template_path: template.path.as_deref(),
                parameters: &resolved,
                code_files: code_files.clone(),
            },
        )?;

        let mut simulation = simulate(self.backend.as_deref(), req, topology, control, &payload, &iter_dir)?;
        for file in code_files {
            if !simulation.code_files.contains(&file) {
                simulation.code_files.push(file);
            }
        }

        let evaluation = self.evaluator.evaluate(req, &simulation);
        Ok(IterationRecord::capture(
            iteration,
            topology,
            &sensors,
            control,
            simulation,
            evaluation,
        ))
    }
}

fn transition(state: &mut RunState, next: RunState) {
    debug!(from = ?*state, to = ?next, "run state");
    *state = next;
}

fn iteration_dir(run_dir: &Path, iteration: u32) -> PathBuf {
    run_dir.join(format!("iter_{:02}", iteration))
}

/// `<out>/<YYYYmmdd_HHMMSS>_<name>`, suffixed when the directory already exists.
fn create_run_dir(out_dir: &Path, name: &str) -> Result<PathBuf> {
    let stamp = Local::now().format("%Y%m%d_%H%M%S");
    let base = format!("{}_{}", stamp, sanitize_name(name));
    let mut dir = out_dir.join(&base);
    let mut suffix = 1;
    while dir.exists() {
        dir = out_dir.join(format!("{}_{}", base, suffix));
        suffix += 1;
    }
    std::fs::create_dir_all(&dir).map_err(|e| io(format!("create {}", dir.display()), e))?;
    Ok(dir)
}

fn sanitize_name(name: &str) -> String {
    let cleaned: String = name
        .trim()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    if cleaned.is_empty() { "run".to_string() } else { cleaned }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Metrics, SimulationResult};
    use crate::design::ProposalKind;
    use crate::error::{BackendError, ProposalError};
    use indexmap::IndexMap;
    use serde_json::{Value, json};
    use std::cell::Cell;
    use std::rc::Rc;

    fn write_requirements(dir: &Path, extra: Value) -> PathBuf {
        let mut doc = json!({
            "name": "buck 48-12", "vin_nominal_v": 48, "vout_target_v": 12, "pout_w": 120,
            "fsw_hz": 100000, "ripple_v_pp_max": 1.0, "settling_time_ms_max": 10,
            "overshoot_pct_max": 10, "efficiency_min_pct": 90, "max_iterations": 3
        });
        if let (Some(doc), Some(extra)) = (doc.as_object_mut(), extra.as_object()) {
            for (k, v) in extra {
                doc.insert(k.clone(), v.clone());
            }
        }
        let path = dir.join("req.json");
        std::fs::write(&path, doc.to_string()).unwrap();
        path
    }

    fn offline(out: &Path) -> OrchestratorConfig {
        OrchestratorConfig::default()
            .with_out_dir(out)
            .with_template_dir(out.join("no-templates"))
            .with_backend_enabled(false)
    }

    struct Counter(Rc<Cell<usize>>);

    impl IterationObserver for Counter {
        fn on_iteration(&mut self, _record: &IterationRecord) {
            self.0.set(self.0.get() + 1);
        }
    }

    #[test]
    fn sanitizes_run_names() {
        assert_eq!(sanitize_name("buck 48/12"), "buck_48_12");
        assert_eq!(sanitize_name("  "), "run");
    }

    #[test]
    fn passing_run_stops_and_publishes() {
        let dir = tempfile::tempdir().unwrap();
        let req = write_requirements(dir.path(), json!({}));
        let count = Rc::new(Cell::new(0));
        let mut orchestrator =
            Orchestrator::new(offline(dir.path())).with_observer(Counter(count.clone()));

        let outcome = orchestrator.run(&req).unwrap();
        assert_eq!(outcome.state, RunState::Passed);
        assert_eq!(outcome.records.len(), 1);
        assert_eq!(count.get(), 1);
        assert_eq!(outcome.published_from, Some(0));
        assert!(outcome.run_dir.join("iter_00").join("summary.json").is_file());
        assert!(outcome.run_dir.join("iter_00").join("model_payload.json").is_file());
        assert!(outcome.artifacts_dir().unwrap().join("control_core.c").is_file());

        let summary: Value = serde_json::from_str(
            &std::fs::read_to_string(outcome.run_dir.join("run_summary.json")).unwrap(),
        )
        .unwrap();
        assert_eq!(summary["final_state"], "passed");
        assert_eq!(summary["published_from"], 0);
        assert_eq!(summary["template"]["defaulted"], true);
    }

    #[test]
    fn exhausted_run_keeps_every_record() {
        let dir = tempfile::tempdir().unwrap();
        let req = write_requirements(dir.path(), json!({"efficiency_min_pct": 99.9}));
        let mut orchestrator = Orchestrator::new(offline(dir.path()));

        let outcome = orchestrator.run(&req).unwrap();
        assert_eq!(outcome.state, RunState::Exhausted);
        assert_eq!(outcome.records.len(), 3);
        assert!(outcome.records.iter().all(|r| !r.evaluation.passed));
        assert_eq!(outcome.published_from, None);
        assert!(!outcome.run_dir.join(report::ARTIFACTS_DIR).exists());

        // revisions never alias earlier records
        let caps: Vec<f64> = outcome.records.iter().map(|r| r.topology.capacitor_uf).collect();
        assert!(caps.windows(2).all(|w| w[1] > w[0]));
    }

    #[test]
    fn missing_explicit_template_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let req = write_requirements(dir.path(), json!({}));
        let config = offline(dir.path()).with_template(Some(dir.path().join("absent.slx")));
        let err = Orchestrator::new(config).run(&req).unwrap_err();
        assert!(matches!(err, DesignError::TemplateNotFound(_)));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn invalid_requirements_abort_before_iterating() {
        let dir = tempfile::tempdir().unwrap();
        let req = write_requirements(dir.path(), json!({"max_iterations": 0}));
        let err = Orchestrator::new(offline(dir.path())).run(&req).unwrap_err();
        assert!(matches!(err, DesignError::InvalidRequirement(_)));
    }

    struct Scripted;

    impl SimulationBackend for Scripted {
        fn name(&self) -> &str {
            "scripted"
        }

        fn run(&self, _payload: &Path, _out_dir: &Path) -> std::result::Result<SimulationResult, BackendError> {
            Ok(SimulationResult {
                metrics: Metrics {
                    overshoot_pct: 2.0,
                    settling_time_ms: 1.0,
                    ripple_v_pp: 0.05,
                    efficiency_pct: 97.0,
                    extra: IndexMap::new(),
                },
                waveform_files: vec![],
                code_files: vec![],
                raw: json!({"mode": "backend", "validation": "trusted"}),
            })
        }
    }

    #[test]
    fn trusted_backend_result_is_accepted() {
        let dir = tempfile::tempdir().unwrap();
        let req = write_requirements(dir.path(), json!({}));
        let config = offline(dir.path())
            .with_backend_enabled(true)
            .with_trusted_backend_required(true);
        let outcome = Orchestrator::new(config).with_backend(Scripted).run(&req).unwrap();
        assert!(outcome.final_passed());
        assert_eq!(outcome.records[0].simulation.metrics.efficiency_pct, 97.0);
        assert_eq!(outcome.records[0].simulation.code_files.len(), 2);
    }

    #[test]
    fn proposer_failure_falls_back_to_rules() {
        let dir = tempfile::tempdir().unwrap();
        let req = write_requirements(dir.path(), json!({}));
        let proposer = |_kind: ProposalKind, _system: &str, _user: &str| -> std::result::Result<Value, ProposalError> {
            Ok(json!({"topology": "buck"}))
        };
        let outcome = Orchestrator::new(offline(dir.path()))
            .with_proposer(proposer)
            .run(&req)
            .unwrap();
        assert_eq!(outcome.records[0].topology.topology, crate::core::Topology::Buck);
        assert!(outcome.records[0].topology.inductor_uh > 0.0);
    }
}
