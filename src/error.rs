//! Error types for the Dorado provisioner
//!
//! Provides structured error types for the array transport, the entity
//! repositories, the readiness poller and the host-mapping reconciler.

use crate::reconcile::saga::{ReconcileStep, SagaStep};
use std::time::Duration;
use thiserror::Error;

/// Unified error type for the provisioner
#[derive(Error, Debug)]
pub enum Error {
    // =========================================================================
    // Internal Errors
    // =========================================================================
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    // =========================================================================
    // Transport Errors
    // =========================================================================
    #[error("Array transport error: {0}")]
    Transport(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Array rejected request (code {code}): {description}")]
    Api { code: i64, description: String },

    #[error("Array session is not authorized")]
    Unauthorized,

    #[error("Operation cancelled")]
    Cancelled,

    // =========================================================================
    // Array State Errors
    // =========================================================================
    #[error("{kind} not found: {name}")]
    NotFound { kind: String, name: String },

    #[error("Data is incorrect: expected exactly one {kind} named {name}, found {count}")]
    ConsistencyViolation {
        kind: String,
        name: String,
        count: usize,
    },

    #[error("{kind} {id} is not healthy (HEALTHSTATUS: {health_status}, RUNNINGSTATUS: {running_status})")]
    NotReady {
        kind: String,
        id: String,
        health_status: String,
        running_status: String,
    },

    // =========================================================================
    // Reconciliation Errors
    // =========================================================================
    #[error("Failed to {step} ({target}): {source}")]
    StepFailed {
        step: ReconcileStep,
        target: String,
        /// Steps that had already been applied to the array when this one failed
        completed: Vec<SagaStep>,
        #[source]
        source: Box<Error>,
    },

    #[error("LUN (ID: {lun_id}) is not associated to host (ID: {host_id})")]
    NotAssociated { lun_id: String, host_id: String },

    #[error("Failed to parse ASSOCIATEMETADATA of LUN {lun_id}: {reason}")]
    MetadataParse { lun_id: String, reason: String },

    #[error("Capacity of {size_gb} GB is out of range")]
    InvalidCapacity { size_gb: u64 },

    #[error("Invalid target port: {0}")]
    InvalidTargetPort(String),

    // =========================================================================
    // Parse Errors
    // =========================================================================
    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("YAML parse error: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    // =========================================================================
    // IO Errors
    // =========================================================================
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Action a caller should take when an operation fails
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorAction {
    /// Retry with exponential backoff
    RetryWithBackoff,
    /// Retry after specific duration
    RetryAfter(Duration),
    /// Needs an operator; retrying cannot help
    Abort,
}

impl Error {
    /// Determine what action to take for this error
    pub fn action(&self) -> ErrorAction {
        match self {
            Error::Http(_) | Error::Transport(_) | Error::Unauthorized => {
                ErrorAction::RetryWithBackoff
            }

            // Object still settling on the array
            Error::NotReady { .. } => ErrorAction::RetryAfter(Duration::from_secs(10)),

            Error::StepFailed { source, .. } => source.action(),

            Error::ConsistencyViolation { .. }
            | Error::Configuration(_)
            | Error::MetadataParse { .. }
            | Error::InvalidTargetPort(_)
            | Error::InvalidCapacity { .. }
            | Error::Cancelled => ErrorAction::Abort,

            _ => ErrorAction::RetryWithBackoff,
        }
    }

    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        !matches!(self.action(), ErrorAction::Abort)
    }

    /// Check if this error is transient (network level)
    pub fn is_transient(&self) -> bool {
        match self {
            Error::Http(e) => e.is_connect() || e.is_timeout() || e.is_request(),
            Error::Transport(_) => true,
            _ => false,
        }
    }

    /// Check if the request failed before it reached the array
    pub fn is_connect_failure(&self) -> bool {
        matches!(self, Error::Http(e) if e.is_connect())
    }

    /// Check if the array reported the target object as absent
    pub fn is_not_found(&self) -> bool {
        match self {
            Error::NotFound { .. } => true,
            Error::StepFailed { source, .. } => source.is_not_found(),
            _ => false,
        }
    }

    /// Check if a uniqueness invariant was violated
    pub fn is_consistency_violation(&self) -> bool {
        match self {
            Error::ConsistencyViolation { .. } => true,
            Error::StepFailed { source, .. } => source.is_consistency_violation(),
            _ => false,
        }
    }

    /// Steps already applied when a reconciliation step failed
    pub fn completed_steps(&self) -> &[SagaStep] {
        match self {
            Error::StepFailed { completed, .. } => completed,
            _ => &[],
        }
    }
}

/// Result type alias for the provisioner
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_actions() {
        let err = Error::ConsistencyViolation {
            kind: "HostGroup".into(),
            name: "compute-07".into(),
            count: 2,
        };
        assert_eq!(err.action(), ErrorAction::Abort);

        let err = Error::NotReady {
            kind: "LUN".into(),
            id: "7".into(),
            health_status: "1".into(),
            running_status: "53".into(),
        };
        assert_eq!(err.action(), ErrorAction::RetryAfter(Duration::from_secs(10)));

        let err = Error::Transport("connection reset".into());
        assert_eq!(err.action(), ErrorAction::RetryWithBackoff);
    }

    #[test]
    fn test_step_failure_delegates_to_source() {
        let err = Error::StepFailed {
            step: ReconcileStep::AssociateHost,
            target: "hostgroup 3".into(),
            completed: vec![],
            source: Box::new(Error::NotFound {
                kind: "Host".into(),
                name: "4".into(),
            }),
        };
        assert!(err.is_not_found());
        assert!(!err.is_consistency_violation());
        assert!(err.to_string().contains("associate host to hostgroup"));
    }

    #[test]
    fn test_error_retryable() {
        let transient = Error::Transport("timeout".into());
        assert!(transient.is_retryable());
        assert!(transient.is_transient());

        let config_err = Error::Configuration("invalid".into());
        assert!(!config_err.is_retryable());
        assert!(!config_err.is_transient());
    }
}
