//! FHIR Patient wire model and HL7 v2 translation helpers.
//!
//! Responsibilities:
//! - Define a strict wire model for serialisation/deserialisation
//! - Translate HL7 v2 administrative sex codes (table 0001) to FHIR
//!   administrative gender
//!
//! The wire model carries only the elements the bridge maps from PID segments.

use crate::types::{Address, ContactPoint, HumanName, Identifier};
use crate::{FhirError, FhirResult};
use serde::{Deserialize, Serialize};

/// FHIR administrative gender.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Gender {
    Male,
    Female,
    Other,
    Unknown,
}

impl Gender {
    /// Convert to FHIR wire format string.
    pub fn to_wire(self) -> &'static str {
        match self {
            Gender::Male => "male",
            Gender::Female => "female",
            Gender::Other => "other",
            Gender::Unknown => "unknown",
        }
    }

    /// Translate an HL7 v2 administrative sex code.
    ///
    /// `A` (ambiguous) maps to `other`; anything unrecognized maps to
    /// `unknown` rather than failing, since PID-8 is not required.
    pub fn from_hl7(code: &str) -> Self {
        match code.to_ascii_uppercase().as_str() {
            "M" | "MALE" => Gender::Male,
            "F" | "FEMALE" => Gender::Female,
            "O" | "A" | "OTHER" => Gender::Other,
            _ => Gender::Unknown,
        }
    }
}

/// Strict wire model for a Patient resource.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Patient {
    #[serde(rename = "resourceType")]
    pub resource_type: String,
    pub id: String,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub identifier: Vec<Identifier>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub name: Vec<HumanName>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gender: Option<String>,
    #[serde(rename = "birthDate", skip_serializing_if = "Option::is_none")]
    pub birth_date: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub address: Vec<Address>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub telecom: Vec<ContactPoint>,
}

impl Patient {
    /// Creates an empty Patient with the given logical id.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            resource_type: "Patient".to_owned(),
            id: id.into(),
            identifier: Vec::new(),
            name: Vec::new(),
            gender: None,
            birth_date: None,
            address: Vec::new(),
            telecom: Vec::new(),
        }
    }

    /// Render as a JSON string.
    pub fn render(&self) -> FhirResult<String> {
        crate::render(self)
    }

    /// Parse from JSON text, rejecting unknown keys and a wrong resourceType.
    pub fn parse(json_text: &str) -> FhirResult<Self> {
        let wire: Patient = crate::parse(json_text, "Patient")?;
        if wire.resource_type != "Patient" {
            return Err(FhirError::InvalidInput(format!(
                "Expected resourceType 'Patient', got '{}'",
                wire.resource_type
            )));
        }
        Ok(wire)
    }
}
