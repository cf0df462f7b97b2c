//! Iterative power-converter control design.
//!
//! From a requirement document the engine proposes a power stage, a sensor set
//! and a control law, synthesizes a parameter table and a C controller core
//! sized to the model template's S-Function ports, simulates (external backend
//! or analytic fallback), evaluates against the thresholds and revises until a
//! design passes or the iteration budget is spent.

pub mod core;
pub mod design;
pub mod error;
pub mod evaluation;
pub mod orchestrator;
pub mod simulation;
pub mod synthesis;
pub mod template;

pub use crate::core::*;
pub use error::{BackendError, DesignError, ProposalError, Result, TemplateError};
pub use evaluation::Evaluator;
pub use orchestrator::{
    IterationObserver, Orchestrator, OrchestratorConfig, ProgressLog, RunOutcome, RunState,
};
pub use simulation::{BackendConfig, ProcessBackend, SimulationBackend};
pub use synthesis::{ControlLaw, ControllerModel, ControllerSpec, GridLaw};
