//! FHIR ServiceRequest wire model and HL7 v2 translation helpers.
//!
//! Service requests are mapped from ORC/OBR pairs in order (ORM) messages.

use crate::types::{CodeableConcept, Identifier, Reference};
use crate::{FhirError, FhirResult};
use serde::{Deserialize, Serialize};

/// FHIR request status.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RequestStatus {
    Active,
    OnHold,
    Completed,
    Revoked,
}

impl RequestStatus {
    /// Convert to FHIR wire format string.
    pub fn to_wire(self) -> &'static str {
        match self {
            RequestStatus::Active => "active",
            RequestStatus::OnHold => "on-hold",
            RequestStatus::Completed => "completed",
            RequestStatus::Revoked => "revoked",
        }
    }

    /// Translate an HL7 v2 order control/status code (ORC-1/ORC-5).
    pub fn from_hl7(code: &str) -> Self {
        match code.to_ascii_uppercase().as_str() {
            "C" | "COMPLETED" => RequestStatus::Completed,
            "CA" | "CANCELLED" => RequestStatus::Revoked,
            "H" | "HOLD" => RequestStatus::OnHold,
            _ => RequestStatus::Active,
        }
    }
}

/// FHIR request intent. Everything coming off an ORM feed is an order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RequestIntent {
    Order,
}

impl RequestIntent {
    pub fn to_wire(self) -> &'static str {
        match self {
            RequestIntent::Order => "order",
        }
    }
}

/// FHIR request priority.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RequestPriority {
    Routine,
    Urgent,
    Asap,
    Stat,
}

impl RequestPriority {
    /// Convert to FHIR wire format string.
    pub fn to_wire(self) -> &'static str {
        match self {
            RequestPriority::Routine => "routine",
            RequestPriority::Urgent => "urgent",
            RequestPriority::Asap => "asap",
            RequestPriority::Stat => "stat",
        }
    }

    /// Translate an HL7 v2 priority code (OBR-5/TQ1, table 0485).
    pub fn from_hl7(code: &str) -> Self {
        match code.to_ascii_uppercase().as_str() {
            "S" | "STAT" => RequestPriority::Stat,
            "A" | "ASAP" => RequestPriority::Asap,
            "U" | "URGENT" => RequestPriority::Urgent,
            _ => RequestPriority::Routine,
        }
    }
}

/// Strict wire model for a ServiceRequest resource.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServiceRequest {
    #[serde(rename = "resourceType")]
    pub resource_type: String,
    pub id: String,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub identifier: Vec<Identifier>,
    pub status: String,
    pub intent: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<CodeableConcept>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<Reference>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encounter: Option<Reference>,
    #[serde(rename = "authoredOn", skip_serializing_if = "Option::is_none")]
    pub authored_on: Option<String>,
}

impl ServiceRequest {
    /// Creates an active order-intent ServiceRequest with the given id.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            resource_type: "ServiceRequest".to_owned(),
            id: id.into(),
            identifier: Vec::new(),
            status: RequestStatus::Active.to_wire().to_owned(),
            intent: RequestIntent::Order.to_wire().to_owned(),
            priority: None,
            code: None,
            subject: None,
            encounter: None,
            authored_on: None,
        }
    }

    /// Render as a JSON string.
    pub fn render(&self) -> FhirResult<String> {
        crate::render(self)
    }

    /// Parse from JSON text, rejecting unknown keys and a wrong resourceType.
    pub fn parse(json_text: &str) -> FhirResult<Self> {
        let wire: ServiceRequest = crate::parse(json_text, "ServiceRequest")?;
        if wire.resource_type != "ServiceRequest" {
            return Err(FhirError::InvalidInput(format!(
                "Expected resourceType 'ServiceRequest', got '{}'",
                wire.resource_type
            )));
        }
        Ok(wire)
    }
}
