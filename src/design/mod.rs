//! Design proposal, rule-based fallbacks and the revision policy.

pub mod control;
pub mod proposal;
pub mod revision;
pub mod sensors;
pub mod strategy;
pub mod topology;

pub use control::design_control;
pub use proposal::{DesignProposer, DisabledProposer, ProposalKind};
pub use revision::{DesignNotes, RevisionPolicy};
pub use sensors::design_sensors;
pub use strategy::{ControlStrategy, choose_strategy};
pub use topology::design_topology;
