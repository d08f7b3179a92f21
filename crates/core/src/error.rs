//! Error types for the core pipeline.
//!
//! Most problems a message can have are data, not errors: parse and
//! validation findings travel inside the [`crate::validation::ValidationOutcome`]
//! of a transformation outcome, and consent denials inside its blocked list.
//! A `BridgeError` only surfaces when the pipeline itself cannot continue
//! safely, most importantly when the audit trail cannot be written.

use crate::audit::AuditSinkError;

#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    /// Caller-supplied input (configuration, consent files) was unusable.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The audit sink stayed down past the retry budget. Processing stops
    /// here: no stage result is released without its audit event.
    #[error("audit trail unavailable after {attempts} attempts")]
    AuditUnavailable {
        attempts: u32,
        #[source]
        source: AuditSinkError,
    },
}

/// Type alias for Results that can fail with a [`BridgeError`].
pub type BridgeResult<T> = Result<T, BridgeError>;
