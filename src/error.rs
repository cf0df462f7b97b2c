//! Error types for the design-iteration engine.
//!
//! Only [`DesignError`] aborts a run. The collaborator errors
//! ([`TemplateError`], [`BackendError`], [`ProposalError`]) are always caught
//! by the orchestrator and routed to a deterministic fallback.

use std::path::PathBuf;
use thiserror::Error;

/// Run-fatal errors. Raised before the first iteration starts.
#[derive(Debug, Error)]
pub enum DesignError {
    /// The requirement document could not be read.
    #[error("failed to read requirements '{path}': {source}")]
    RequirementIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The requirement document is not valid JSON or misses required fields.
    #[error("malformed requirements '{path}': {source}")]
    RequirementParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// A requirement field violates its invariant.
    #[error("invalid requirement: {0}")]
    InvalidRequirement(String),

    /// An explicitly requested template file does not exist.
    #[error("template not found: {}", .0.display())]
    TemplateNotFound(PathBuf),

    /// Output area could not be written.
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    /// A summary document could not be serialized.
    #[error("failed to serialize {context}: {source}")]
    Serialize {
        context: String,
        #[source]
        source: serde_json::Error,
    },
}

pub(crate) fn io(context: impl Into<String>, source: std::io::Error) -> DesignError {
    DesignError::Io {
        context: context.into(),
        source,
    }
}

/// Result type for run-fatal operations.
pub type Result<T> = std::result::Result<T, DesignError>;

/// Template container could not be introspected at all.
#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("failed to read template '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The container is not a readable Zip32 archive.
    #[error("invalid archive: {0}")]
    Archive(String),

    /// A required archive entry is missing.
    #[error("archive entry not found: {0}")]
    MissingEntry(String),
}

/// External simulation backend did not produce a usable result.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("backend disabled")]
    Disabled,

    #[error("failed to launch backend '{program}': {source}")]
    Launch {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("backend exited with {status}: {stderr}")]
    Exit { status: String, stderr: String },

    #[error("backend result missing: {}", .0.display())]
    MissingOutput(PathBuf),

    #[error("invalid backend result: {0}")]
    InvalidOutput(String),
}

/// Design-proposal collaborator failed or returned an unusable document.
#[derive(Debug, Error)]
pub enum ProposalError {
    #[error("proposer disabled")]
    Disabled,

    #[error("proposer call failed: {0}")]
    Call(String),

    #[error("proposal missing required fields: {}", .0.join(", "))]
    MissingFields(Vec<String>),

    #[error("proposal field '{field}' is not a valid {expected}")]
    InvalidField {
        field: String,
        expected: &'static str,
    },
}
