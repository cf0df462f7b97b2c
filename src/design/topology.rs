use super::proposal::{self, DesignProposer, ProposalKind};
use crate::core::{RequirementSpec, Topology, TopologyDesign};
use crate::error::ProposalError;
use tracing::{debug, warn};

const SYSTEM_PROMPT: &str = "You are a power electronics topology assistant. \
Return JSON only with keys: topology, inductor_uH, capacitor_uF, switches. \
Allowed topology values: buck, boost, buck_boost, inverter_3ph.";

/// Initial topology: proposer first, rules when it fails or is disabled.
pub fn design_topology(req: &RequirementSpec, proposer: &dyn DesignProposer) -> TopologyDesign {
    match propose_topology(req, proposer) {
        Ok(topology) => {
            debug!(topology = %topology.topology, "using proposed topology");
            topology
        }
        Err(ProposalError::Disabled) => rule_based_topology(req),
        Err(e) => {
            warn!(error = %e, "topology proposal rejected, using rules");
            rule_based_topology(req)
        }
    }
}

fn propose_topology(req: &RequirementSpec, proposer: &dyn DesignProposer) -> Result<TopologyDesign, ProposalError> {
    let user = format!(
        "Given this requirement object, propose a practical initial topology and passive sizing \
         for a first simulation iteration.\nDesign intent prompt: {}\n{}",
        req.design_prompt.as_deref().unwrap_or(""),
        serde_json::to_string(req).unwrap_or_default()
    );
    let value = proposer.propose(ProposalKind::Topology, SYSTEM_PROMPT, &user)?;
    let object = proposal::validate_fields(ProposalKind::Topology, &value)?;

    let topology = Topology::from_tag(&proposal::text(object, "topology")?).ok_or(ProposalError::InvalidField {
        field: "topology".into(),
        expected: "topology tag",
    })?;
    let inductor_uh = positive(proposal::number(object, "inductor_uH")?, "inductor_uH")?;
    let capacitor_uf = positive(proposal::number(object, "capacitor_uF")?, "capacitor_uF")?;
    let switches = proposal::number(object, "switches")?;
    if switches < 1.0 || switches.fract() != 0.0 || switches > u32::MAX as f64 {
        return Err(ProposalError::InvalidField {
            field: "switches".into(),
            expected: "positive integer",
        });
    }

    Ok(TopologyDesign {
        topology,
        inductor_uh,
        capacitor_uf,
        switches: switches as u32,
    })
}

fn positive(value: f64, field: &str) -> Result<f64, ProposalError> {
    if value > 0.0 {
        Ok(value)
    } else {
        Err(ProposalError::InvalidField {
            field: field.to_string(),
            expected: "positive number",
        })
    }
}

/// Deterministic sizing heuristics for the first iteration.
pub fn rule_based_topology(req: &RequirementSpec) -> TopologyDesign {
    let preferred = req
        .preferred_topology
        .as_deref()
        .and_then(Topology::from_tag)
        .or_else(|| req.name.to_lowercase().contains("inverter").then_some(Topology::Inverter3Ph));
    let fsw = req.fsw_hz.max(1.0);
    let vout = req.vout_target_v.max(1.0);

    if preferred == Some(Topology::Inverter3Ph) {
        return TopologyDesign {
            topology: Topology::Inverter3Ph,
            inductor_uh: (req.vout_target_v / fsw * 1e6 * 0.2).max(50.0),
            capacitor_uf: (req.pout_w / vout * 2.0).max(10.0),
            switches: 6,
        };
    }

    let topology = match preferred {
        Some(t) => t,
        None => {
            let ratio = req.conversion_ratio();
            if ratio < 0.85 {
                Topology::Buck
            } else if ratio > 1.15 {
                Topology::Boost
            } else {
                Topology::BuckBoost
            }
        }
    };

    TopologyDesign {
        topology,
        inductor_uh: (req.vout_target_v / fsw * 1e6 * 0.04).max(10.0),
        capacitor_uf: (req.pout_w / vout * 20.0).max(47.0),
        switches: if topology == Topology::BuckBoost { 2 } else { 1 },
    }
}
