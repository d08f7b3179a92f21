//! Pipeline configuration.
//!
//! Configuration is resolved once, before any message is processed; nothing
//! in the pipeline reads the environment at transform time.

use crate::audit::RetryPolicy;
use crate::error::BridgeError;
use bridge_types::FhirVersion;

/// Settings shared by every transformation an [`crate::pipeline::Orchestrator`]
/// runs.
#[derive(Clone, Debug)]
pub struct BridgeConfig {
    /// Version stamped on every emitted resource.
    pub fhir_version: FhirVersion,
    /// Actor recorded on audit events.
    pub actor: String,
    /// Retry budget for audit appends.
    pub retry: RetryPolicy,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            fhir_version: FhirVersion::R4,
            actor: "hl7-bridge".to_owned(),
            retry: RetryPolicy::default(),
        }
    }
}

impl BridgeConfig {
    /// Reads overrides from `BRIDGE_FHIR_VERSION`, `BRIDGE_ACTOR`, and
    /// `BRIDGE_AUDIT_MAX_ATTEMPTS`; anything unset keeps its default.
    pub fn from_env() -> Result<Self, BridgeError> {
        let mut config = Self::default();
        if let Ok(version) = std::env::var("BRIDGE_FHIR_VERSION") {
            config.fhir_version = FhirVersion::parse(&version)
                .map_err(|err| BridgeError::InvalidInput(err.to_string()))?;
        }
        if let Ok(actor) = std::env::var("BRIDGE_ACTOR") {
            config.actor = actor;
        }
        if let Ok(attempts) = std::env::var("BRIDGE_AUDIT_MAX_ATTEMPTS") {
            config.retry.max_attempts = attempts.parse().map_err(|_| {
                BridgeError::InvalidInput(format!(
                    "BRIDGE_AUDIT_MAX_ATTEMPTS must be a positive integer, got '{attempts}'"
                ))
            })?;
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_r4() {
        let config = BridgeConfig::default();
        assert_eq!(config.fhir_version, FhirVersion::R4);
        assert_eq!(config.retry.max_attempts, 3);
    }
}
