//! FHIR R4 wire/boundary support.
//!
//! This crate provides **wire models** and **translation helpers** for the
//! FHIR resources the bridge emits:
//! - JSON wire structs for Patient, Encounter, Observation, and ServiceRequest
//! - coded-value enums with translation from HL7 v2 table values
//! - the [`FhirResource`] envelope carrying serialized content, provenance,
//!   and the format version stamp
//!
//! This crate focuses on:
//! - FHIR semantic alignment (without FHIR REST transport)
//! - serialisation/deserialisation
//! - translation between HL7 v2 coded values and FHIR value sets
//!
//! Clinical mapping decisions (which segment becomes which resource) live in
//! `bridge-core`; this crate only knows how each resource looks on the wire.

pub mod encounter;
pub mod observation;
pub mod patient;
pub mod resource;
pub mod service_request;
pub mod types;

// Re-export wire models
pub use encounter::{Encounter, EncounterClass, EncounterStatus};
pub use observation::{Observation, ObservationStatus};
pub use patient::{Gender, Patient};
pub use resource::FhirResource;
pub use service_request::{RequestIntent, RequestPriority, RequestStatus, ServiceRequest};

// Re-export shared datatypes
pub use types::{
    Address, CodeableConcept, Coding, ContactPoint, HumanName, Identifier, Period, Quantity,
    Reference,
};

use serde::de::DeserializeOwned;
use serde::Serialize;

/// Errors returned by the `fhir` boundary crate.
#[derive(Debug, thiserror::Error)]
pub enum FhirError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("invalid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("translation error: {0}")]
    Translation(String),
}

/// Type alias for Results that can fail with a [`FhirError`].
pub type FhirResult<T> = Result<T, FhirError>;

/// Render a wire model as a JSON string.
pub(crate) fn render<T: Serialize>(wire: &T) -> FhirResult<String> {
    Ok(serde_json::to_string(wire)?)
}

/// Parse a wire model from JSON text, surfacing a best-effort path (e.g.
/// `name.0.family`) to the failing field when the JSON does not match the
/// wire schema.
pub(crate) fn parse<T: DeserializeOwned>(json_text: &str, resource_type: &str) -> FhirResult<T> {
    let mut deserializer = serde_json::Deserializer::from_str(json_text);
    match serde_path_to_error::deserialize::<_, T>(&mut deserializer) {
        Ok(parsed) => Ok(parsed),
        Err(err) => {
            let path = err.path().to_string();
            let source = err.into_inner();
            let path = if path.is_empty() {
                "<root>"
            } else {
                path.as_str()
            };
            Err(FhirError::Translation(format!(
                "{resource_type} schema mismatch at {path}: {source}"
            )))
        }
    }
}
