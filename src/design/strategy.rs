use super::proposal::{self, DesignProposer, ProposalKind};
use super::revision::DesignNotes;
use crate::core::{Architecture, EvaluationResult, InrushMode, RequirementSpec, TopologyDesign};
use crate::error::ProposalError;
use serde::Serialize;
use tracing::{debug, warn};

const SYSTEM_PROMPT: &str = "You are a power-electronics control strategy selector. \
Pick the control structure (not gains). Return JSON only with keys: \
controller, architecture, current_loop_enabled, inrush_control, secondary_controller, rationale. \
inrush_control must be one of: none, active_current_limit, soft_start_ramp.";

/// Iteration from which a failing DC-DC design escalates to cascaded control.
pub const ESCALATION_ITERATION: u32 = 2;

/// Control structure chosen for an iteration, without gains.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ControlStrategy {
    pub controller: String,
    pub architecture: Architecture,
    pub current_loop_enabled: bool,
    pub inrush_control: InrushMode,
    pub secondary_controller: String,
    pub rationale: Vec<String>,
}

impl ControlStrategy {
    fn new(
        controller: &str,
        architecture: Architecture,
        current_loop_enabled: bool,
        inrush_control: InrushMode,
        secondary_controller: &str,
        rationale: &str,
    ) -> Self {
        Self {
            controller: controller.to_string(),
            architecture,
            current_loop_enabled,
            inrush_control,
            secondary_controller: secondary_controller.to_string(),
            rationale: vec![rationale.to_string()],
        }
    }
}

pub fn choose_strategy(
    req: &RequirementSpec,
    topology: &TopologyDesign,
    iteration: u32,
    previous: Option<&EvaluationResult>,
    notes: &DesignNotes,
    proposer: &dyn DesignProposer,
) -> ControlStrategy {
    match propose_strategy(req, topology, iteration, previous, notes, proposer) {
        Ok(strategy) => {
            debug!(architecture = %strategy.architecture, "using proposed strategy");
            strategy
        }
        Err(ProposalError::Disabled) => rule_based_strategy(req, topology, iteration, previous, notes),
        Err(e) => {
            warn!(error = %e, "strategy proposal rejected, using rules");
            rule_based_strategy(req, topology, iteration, previous, notes)
        }
    }
}

fn propose_strategy(
    req: &RequirementSpec,
    topology: &TopologyDesign,
    iteration: u32,
    previous: Option<&EvaluationResult>,
    notes: &DesignNotes,
    proposer: &dyn DesignProposer,
) -> Result<ControlStrategy, ProposalError> {
    let user = format!(
        "requirements={}\ntopology={}\niteration={}\nprevious_evaluation={}\ndesign_notes={}\n\
         Choose robust strategy for converter barriers, load step, grid connection, and inrush.",
        serde_json::to_string(req).unwrap_or_default(),
        serde_json::to_string(topology).unwrap_or_default(),
        iteration,
        previous
            .and_then(|p| serde_json::to_string(p).ok())
            .unwrap_or_else(|| "null".into()),
        notes.text(req),
    );
    let value = proposer.propose(ProposalKind::Strategy, SYSTEM_PROMPT, &user)?;
    let object = proposal::validate_fields(ProposalKind::Strategy, &value)?;

    let mut rationale = proposal::string_list(object, "rationale");
    if rationale.is_empty() {
        rationale.push(format!("Proposed strategy for iteration {}", iteration));
    }
    Ok(ControlStrategy {
        controller: proposal::text(object, "controller")?,
        architecture: Architecture::from_tag(&proposal::text(object, "architecture")?),
        current_loop_enabled: proposal::boolean(object, "current_loop_enabled")?,
        inrush_control: InrushMode::normalize(&proposal::text(object, "inrush_control")?),
        secondary_controller: proposal::text(object, "secondary_controller")?,
        rationale,
    })
}

/// Keyword and topology driven selection.
pub fn rule_based_strategy(
    req: &RequirementSpec,
    topology: &TopologyDesign,
    iteration: u32,
    previous: Option<&EvaluationResult>,
    notes: &DesignNotes,
) -> ControlStrategy {
    let notes = notes.text(req).to_lowercase();
    let name = req.name.to_lowercase();

    if name.contains("pfc") || name.contains("rectifier") || notes.contains("pfc") {
        return ControlStrategy::new(
            "pfc_dual_loop",
            Architecture::PfcCurrentMode,
            true,
            InrushMode::ActiveCurrentLimit,
            "voltage_outer_loop",
            "PFC/rectifier keywords detected",
        );
    }

    if topology.topology.is_three_phase() {
        if req.weak_grid_mode || notes.contains("vsg") {
            return ControlStrategy::new(
                "vsg_grid_forming",
                Architecture::Vsg,
                true,
                InrushMode::ActiveCurrentLimit,
                "dq_current_inner",
                "Weak-grid/VSG preference",
            );
        }
        if notes.contains("voc") {
            return ControlStrategy::new(
                "voc_grid_forming",
                Architecture::Voc,
                true,
                InrushMode::ActiveCurrentLimit,
                "dq_current_inner",
                "VOC preference",
            );
        }
        if req.grid_connected || notes.contains("droop") {
            return ControlStrategy::new(
                "droop_grid_support",
                Architecture::Droop,
                true,
                InrushMode::ActiveCurrentLimit,
                "dq_current_inner",
                "Grid-connected support with droop",
            );
        }
        let inrush = if req.inrush_limit_a.is_some() || req.load_step_pct.is_some_and(|p| p != 0.0) {
            InrushMode::ActiveCurrentLimit
        } else {
            InrushMode::None
        };
        return ControlStrategy::new(
            "dq_current_voltage_loop",
            Architecture::Dq,
            true,
            inrush,
            "none",
            "Default inverter dq strategy",
        );
    }

    if iteration >= ESCALATION_ITERATION && previous.is_some_and(|p| !p.passed) {
        return ControlStrategy::new(
            "pi_current_mode",
            Architecture::Cascaded,
            true,
            InrushMode::ActiveCurrentLimit,
            "voltage_outer_loop",
            "Escalated from plain PI after failed iterations",
        );
    }

    ControlStrategy::new(
        "pi_voltage_loop",
        Architecture::Pi,
        false,
        InrushMode::None,
        "none",
        "Default converter PI strategy",
    )
}
