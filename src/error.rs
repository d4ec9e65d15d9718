//! Error taxonomy for the analysis pipeline.
//!
//! Task-level failures are isolated at the orchestrator's fan-out boundary;
//! bus correlation failures are surfaced to the requesting task, which treats
//! a missing peer response as absent evidence.

use crate::models::TaskId;
use thiserror::Error;

/// Errors produced by the analysis pipeline.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// An operation was attempted on a store with no created or loaded session.
    #[error("no active session; create or load one first")]
    NoActiveSession,

    /// The analysis capability returned non-conforming output on every attempt.
    #[error("analysis output unparseable after {attempts} attempts: {reason}")]
    AnalysisUnparseable { attempts: usize, reason: String },

    /// A correlated bus request received no response within its timeout.
    #[error("request to {to} timed out after {timeout_ms}ms")]
    RequestTimeout { to: TaskId, timeout_ms: u64 },

    /// The bus was cleared while a request was still pending.
    #[error("bus cleared while request was pending")]
    BusCleared,

    /// A response was attempted for a message that carries no correlation id.
    #[error("message {id} carries no correlation id")]
    MissingCorrelationId { id: String },

    /// Transport or protocol failure talking to the analysis capability.
    #[error("analysis capability error: {0}")]
    Capability(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = PipelineError::NoActiveSession;
        assert!(err.to_string().contains("no active session"));

        let err = PipelineError::RequestTimeout {
            to: TaskId::Legal,
            timeout_ms: 50,
        };
        assert!(err.to_string().contains("legal"));
        assert!(err.to_string().contains("50ms"));

        let err = PipelineError::AnalysisUnparseable {
            attempts: 3,
            reason: "missing insights field".to_string(),
        };
        assert!(err.to_string().contains("3 attempts"));
    }
}
