//! FHIR Encounter wire model and HL7 v2 translation helpers.
//!
//! Encounters are mapped from PV1 (patient visit) segments. Historical
//! messages describe visits that have already happened, so the status defaults
//! to `finished`.

use crate::types::{Coding, Identifier, Period, Reference};
use crate::{FhirError, FhirResult};
use serde::{Deserialize, Serialize};

/// FHIR encounter status. The bridge only ever emits `finished`, but the full
/// value set is modelled so parsed resources survive a round trip.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EncounterStatus {
    Planned,
    InProgress,
    Finished,
    Cancelled,
}

impl EncounterStatus {
    /// Convert to FHIR wire format string.
    pub fn to_wire(self) -> &'static str {
        match self {
            EncounterStatus::Planned => "planned",
            EncounterStatus::InProgress => "in-progress",
            EncounterStatus::Finished => "finished",
            EncounterStatus::Cancelled => "cancelled",
        }
    }
}

/// FHIR v3-ActCode encounter class.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EncounterClass {
    Inpatient,
    Ambulatory,
    Emergency,
}

impl EncounterClass {
    /// Translate an HL7 v2 patient class code (PV1-2, table 0004).
    ///
    /// Unrecognized codes fall back to ambulatory, matching the permissive
    /// posture of the source systems.
    pub fn from_hl7(code: &str) -> Self {
        match code.to_ascii_uppercase().as_str() {
            "I" | "INPATIENT" => EncounterClass::Inpatient,
            "E" | "EMERGENCY" => EncounterClass::Emergency,
            _ => EncounterClass::Ambulatory,
        }
    }

    /// The v3-ActCode coding for this class.
    pub fn to_coding(self) -> Coding {
        let (code, display) = match self {
            EncounterClass::Inpatient => ("IMP", "inpatient encounter"),
            EncounterClass::Ambulatory => ("AMB", "ambulatory"),
            EncounterClass::Emergency => ("EMER", "emergency"),
        };
        Coding::new("http://terminology.hl7.org/CodeSystem/v3-ActCode", code)
            .with_display(display)
    }
}

/// Strict wire model for an Encounter resource.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Encounter {
    #[serde(rename = "resourceType")]
    pub resource_type: String,
    pub id: String,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub identifier: Vec<Identifier>,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub class: Option<Coding>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<Reference>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub period: Option<Period>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub location: Vec<EncounterLocation>,
}

/// A location entry inside an Encounter.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EncounterLocation {
    pub location: Reference,
}

impl Encounter {
    /// Creates a finished Encounter with the given logical id.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            resource_type: "Encounter".to_owned(),
            id: id.into(),
            identifier: Vec::new(),
            status: EncounterStatus::Finished.to_wire().to_owned(),
            class: None,
            subject: None,
            period: None,
            location: Vec::new(),
        }
    }

    /// Render as a JSON string.
    pub fn render(&self) -> FhirResult<String> {
        crate::render(self)
    }

    /// Parse from JSON text, rejecting unknown keys and a wrong resourceType.
    pub fn parse(json_text: &str) -> FhirResult<Self> {
        let wire: Encounter = crate::parse(json_text, "Encounter")?;
        if wire.resource_type != "Encounter" {
            return Err(FhirError::InvalidInput(format!(
                "Expected resourceType 'Encounter', got '{}'",
                wire.resource_type
            )));
        }
        Ok(wire)
    }
}
