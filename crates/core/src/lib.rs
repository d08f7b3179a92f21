//! # Bridge Core
//!
//! The clinical heart of the bridge: everything between a raw HL7 v2 message
//! arriving and a set of consent-filtered FHIR resources leaving.
//!
//! The [`pipeline::Orchestrator`] is the entry point. It drives each message
//! through four stages — parse (via the `hl7` crate), structural
//! [`validation`], segment-to-resource [`mapper`] dispatch (via the `fhir`
//! crate), and [`consent`] filtering — while the [`audit`] module records one
//! append-only event per stage.
//!
//! External integration points are the [`consent::ConsentStore`] and
//! [`audit::AuditSink`] traits; the in-memory implementations back tests and
//! the CLI.

pub mod audit;
pub mod config;
pub mod consent;
pub mod error;
pub mod mapper;
pub mod message;
pub mod pipeline;
pub mod validation;

pub use audit::{AuditEvent, AuditRecorder, AuditSink, InMemoryAuditSink, RetentionTier, RetryPolicy};
pub use config::BridgeConfig;
pub use consent::{
    BlockedResource, ConsentEngine, ConsentRecord, ConsentStatus, ConsentStore, DataCategory,
    DenialReason, InMemoryConsentStore,
};
pub use error::{BridgeError, BridgeResult};
pub use mapper::{MappingOutput, MappingWarning};
pub use message::{MessageStatus, SourceMessage};
pub use pipeline::{Orchestrator, TransformationOutcome};
pub use validation::{Severity, ValidationError, ValidationOutcome, ValidationWarning};
