//! Business rule failures raised by the state machines.

use thiserror::Error;

pub type DomainResult<T> = Result<T, DomainError>;

/// Why a command was refused.
///
/// Deterministic business failures only. Lock timeouts and storage failures
/// live in the infrastructure error types and are mapped at the boundary.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Bad input shape (negative quantity, empty line list, ...).
    #[error("invalid input: {0}")]
    Validation(String),

    /// The requested status change is not in the transition table.
    #[error("invalid {entity} transition: {from} -> {to}")]
    InvalidTransition {
        entity: &'static str,
        from: String,
        to: String,
    },

    /// A line quantity broke a receipt rule. The whole batch is rejected.
    #[error("line {line_no}: {rule}")]
    QuantityConstraint { line_no: u32, rule: String },

    /// State that should be impossible, e.g. a received request with no location.
    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    #[error("malformed id: {0}")]
    InvalidId(String),

    #[error("no such request")]
    NotFound,

    /// Aggregate already exists, or a stale revision was used.
    #[error("conflicting request: {0}")]
    Conflict(String),
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invalid_transition(
        entity: &'static str,
        from: impl core::fmt::Display,
        to: impl core::fmt::Display,
    ) -> Self {
        Self::InvalidTransition {
            entity,
            from: from.to_string(),
            to: to.to_string(),
        }
    }

    pub fn quantity_constraint(line_no: u32, rule: impl Into<String>) -> Self {
        Self::QuantityConstraint {
            line_no,
            rule: rule.into(),
        }
    }

    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::InvariantViolation(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn not_found() -> Self {
        Self::NotFound
    }
}
