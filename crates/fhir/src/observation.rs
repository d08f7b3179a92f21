//! FHIR Observation wire model and HL7 v2 translation helpers.
//!
//! Observations are mapped from OBX segments in result (ORU) messages.
//! Numeric OBX-5 values become `valueQuantity` with the OBX-6 unit; anything
//! else becomes `valueString`.

use crate::types::{CodeableConcept, Quantity, Reference};
use crate::{FhirError, FhirResult};
use serde::{Deserialize, Serialize};

/// FHIR observation status.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ObservationStatus {
    Preliminary,
    Final,
    Corrected,
    Cancelled,
}

impl ObservationStatus {
    /// Convert to FHIR wire format string.
    pub fn to_wire(self) -> &'static str {
        match self {
            ObservationStatus::Preliminary => "preliminary",
            ObservationStatus::Final => "final",
            ObservationStatus::Corrected => "corrected",
            ObservationStatus::Cancelled => "cancelled",
        }
    }

    /// Translate an HL7 v2 observation result status (OBX-11, table 0085).
    ///
    /// Unrecognized or absent codes default to `final`, the status carried by
    /// the vast majority of historical result feeds.
    pub fn from_hl7(code: &str) -> Self {
        match code.to_ascii_uppercase().as_str() {
            "P" | "PRELIMINARY" => ObservationStatus::Preliminary,
            "C" | "CORRECTED" => ObservationStatus::Corrected,
            "X" | "CANCELLED" => ObservationStatus::Cancelled,
            _ => ObservationStatus::Final,
        }
    }
}

/// A reference range entry inside an Observation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReferenceRange {
    pub text: String,
}

/// Strict wire model for an Observation resource.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Observation {
    #[serde(rename = "resourceType")]
    pub resource_type: String,
    pub id: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<CodeableConcept>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<Reference>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encounter: Option<Reference>,
    #[serde(rename = "effectiveDateTime", skip_serializing_if = "Option::is_none")]
    pub effective_date_time: Option<String>,
    #[serde(rename = "valueQuantity", skip_serializing_if = "Option::is_none")]
    pub value_quantity: Option<Quantity>,
    #[serde(rename = "valueString", skip_serializing_if = "Option::is_none")]
    pub value_string: Option<String>,
    #[serde(rename = "referenceRange", skip_serializing_if = "Vec::is_empty", default)]
    pub reference_range: Vec<ReferenceRange>,
}

impl Observation {
    /// Creates a final-status Observation with the given logical id.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            resource_type: "Observation".to_owned(),
            id: id.into(),
            status: ObservationStatus::Final.to_wire().to_owned(),
            code: None,
            subject: None,
            encounter: None,
            effective_date_time: None,
            value_quantity: None,
            value_string: None,
            reference_range: Vec::new(),
        }
    }

    /// Sets the value element: numeric input becomes a quantity with the given
    /// unit, anything else a plain string value.
    pub fn set_value(&mut self, raw: &str, unit: Option<&str>) {
        if let Ok(value) = raw.trim().parse::<f64>() {
            self.value_quantity = Some(Quantity {
                value,
                unit: unit.map(str::to_owned),
                system: unit.map(|_| "http://unitsofmeasure.org".to_owned()),
                code: unit.map(str::to_owned),
            });
        } else {
            self.value_string = Some(raw.to_owned());
        }
    }

    /// Render as a JSON string.
    pub fn render(&self) -> FhirResult<String> {
        crate::render(self)
    }

    /// Parse from JSON text, rejecting unknown keys and a wrong resourceType.
    pub fn parse(json_text: &str) -> FhirResult<Self> {
        let wire: Observation = crate::parse(json_text, "Observation")?;
        if wire.resource_type != "Observation" {
            return Err(FhirError::InvalidInput(format!(
                "Expected resourceType 'Observation', got '{}'",
                wire.resource_type
            )));
        }
        Ok(wire)
    }
}
