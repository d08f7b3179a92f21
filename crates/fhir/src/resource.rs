//! The resource envelope handed between pipeline stages.
//!
//! A [`FhirResource`] wraps the serialized JSON content of a mapped resource
//! together with its provenance (the originating source message id) and the
//! FHIR version stamp. The envelope, not the wire struct, is what the consent
//! engine filters and the caller receives.

use bridge_types::FhirVersion;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::hash::{Hash, Hasher};

/// A mapped target resource.
///
/// Logical identity is the `(resource_id, resource_type)` pair: two envelopes
/// with the same id and type are the same resource even when their content or
/// timestamps differ. `PartialEq` and `Hash` implement exactly that, so do not
/// use them to compare content; compare `content` directly when that matters.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FhirResource {
    pub resource_id: String,
    pub resource_type: String,
    pub fhir_version: FhirVersion,
    /// Serialized JSON body of the resource.
    pub content: String,
    /// Identifier of the source message this resource was mapped from.
    pub source_message_id: String,
    pub created_at: DateTime<Utc>,
}

impl FhirResource {
    /// Creates an envelope stamped with the given version and provenance.
    pub fn new(
        resource_id: impl Into<String>,
        resource_type: impl Into<String>,
        content: String,
        source_message_id: impl Into<String>,
        fhir_version: FhirVersion,
    ) -> Self {
        Self {
            resource_id: resource_id.into(),
            resource_type: resource_type.into(),
            fhir_version,
            content,
            source_message_id: source_message_id.into(),
            created_at: Utc::now(),
        }
    }
}

impl PartialEq for FhirResource {
    fn eq(&self, other: &Self) -> bool {
        self.resource_id == other.resource_id && self.resource_type == other.resource_type
    }
}

impl Eq for FhirResource {}

impl Hash for FhirResource {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.resource_id.hash(state);
        self.resource_type.hash(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn envelope(id: &str, resource_type: &str, content: &str) -> FhirResource {
        FhirResource::new(id, resource_type, content.to_owned(), "MSG001", FhirVersion::R4)
    }

    #[test]
    fn identity_is_id_and_type_only() {
        let a = envelope("123", "Patient", "{}");
        let b = envelope("123", "Patient", r#"{"resourceType":"Patient"}"#);
        let c = envelope("123", "Encounter", "{}");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn hash_agrees_with_equality() {
        use std::collections::HashSet;
        let mut set = HashSet::new();
        set.insert(envelope("123", "Patient", "{}"));
        set.insert(envelope("123", "Patient", "other content"));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn carries_provenance_and_version() {
        let resource = envelope("123", "Patient", "{}");
        assert_eq!(resource.source_message_id, "MSG001");
        assert_eq!(resource.fhir_version.to_string(), "4.0.1");
    }
}
