//! Proposal collaborator seam.
//!
//! A proposer answers a (system, user) prompt pair with a JSON object. Its
//! answers are never trusted: required fields are checked and every value is
//! coerced through the helpers below. Any failure sends the caller back to its
//! rule-based design.

use crate::error::ProposalError;
use serde_json::{Map, Value};

/// What is being asked for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProposalKind {
    Topology,
    Strategy,
    Gains,
}

impl ProposalKind {
    pub fn required_fields(&self) -> &'static [&'static str] {
        match self {
            Self::Topology => &["topology", "inductor_uH", "capacitor_uF", "switches"],
            Self::Strategy => &[
                "controller",
                "architecture",
                "current_loop_enabled",
                "inrush_control",
                "secondary_controller",
            ],
            Self::Gains => &["controller", "architecture", "kp", "ki", "sample_time_s"],
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Topology => "topology",
            Self::Strategy => "strategy",
            Self::Gains => "gains",
        }
    }
}

pub trait DesignProposer {
    fn propose(&self, kind: ProposalKind, system: &str, user: &str) -> Result<Value, ProposalError>;
}

/// Proposer used when no remote collaborator is configured.
#[derive(Clone, Copy, Debug, Default)]
pub struct DisabledProposer;

impl DesignProposer for DisabledProposer {
    fn propose(&self, _kind: ProposalKind, _system: &str, _user: &str) -> Result<Value, ProposalError> {
        Err(ProposalError::Disabled)
    }
}

impl<F> DesignProposer for F
where
    F: Fn(ProposalKind, &str, &str) -> Result<Value, ProposalError>,
{
    fn propose(&self, kind: ProposalKind, system: &str, user: &str) -> Result<Value, ProposalError> {
        self(kind, system, user)
    }
}

/// Check that `value` is an object carrying every field `kind` requires.
pub fn validate_fields(kind: ProposalKind, value: &Value) -> Result<&Map<String, Value>, ProposalError> {
    let Some(object) = value.as_object() else {
        return Err(ProposalError::MissingFields(
            kind.required_fields().iter().map(|s| s.to_string()).collect(),
        ));
    };
    let missing: Vec<String> = kind
        .required_fields()
        .iter()
        .filter(|f| !object.contains_key(**f))
        .map(|f| f.to_string())
        .collect();
    if !missing.is_empty() {
        return Err(ProposalError::MissingFields(missing));
    }
    Ok(object)
}

/// Finite number, or a string that parses as one.
pub fn number(object: &Map<String, Value>, field: &str) -> Result<f64, ProposalError> {
    let parsed = match object.get(field) {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed.filter(|v| v.is_finite()).ok_or(ProposalError::InvalidField {
        field: field.to_string(),
        expected: "number",
    })
}

/// Boolean, or one of the usual truthy/falsy spellings.
pub fn boolean(object: &Map<String, Value>, field: &str) -> Result<bool, ProposalError> {
    let parsed = match object.get(field) {
        Some(Value::Bool(b)) => Some(*b),
        Some(Value::Number(n)) => n.as_f64().map(|v| v != 0.0),
        Some(Value::String(s)) => match s.trim().to_lowercase().as_str() {
            "true" | "yes" | "1" | "enable" | "enabled" | "on" => Some(true),
            "false" | "no" | "0" | "disable" | "disabled" | "off" => Some(false),
            _ => None,
        },
        _ => None,
    };
    parsed.ok_or(ProposalError::InvalidField {
        field: field.to_string(),
        expected: "boolean",
    })
}

/// Non-empty text; numbers and booleans are rendered.
pub fn text(object: &Map<String, Value>, field: &str) -> Result<String, ProposalError> {
    let parsed = match object.get(field) {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Some(v @ (Value::Number(_) | Value::Bool(_))) => Some(v.to_string()),
        _ => None,
    };
    parsed.ok_or(ProposalError::InvalidField {
        field: field.to_string(),
        expected: "string",
    })
}

/// List of strings; absent or malformed lists yield an empty vector.
pub fn string_list(object: &Map<String, Value>, field: &str) -> Vec<String> {
    object
        .get(field)
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .map(|v| match v {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
                .collect()
        })
        .unwrap_or_default()
}
