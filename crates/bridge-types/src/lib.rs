//! # Bridge Types
//!
//! Primitive types shared across the bridge crates. Currently that is just
//! [`FhirVersion`], the version stamp every emitted resource carries.

use serde::Deserialize;

/// Errors that can occur when parsing a FHIR version string.
#[derive(Debug, thiserror::Error)]
pub enum VersionError {
    /// The version string did not have the `major.minor.patch` shape
    #[error("FHIR version must be in major.minor.patch form, got '{0}'")]
    Malformed(String),
    /// The major version was not 4; this core only speaks FHIR R4
    #[error("unsupported FHIR major version {0} (only major version 4 is supported)")]
    UnsupportedMajor(u32),
}

/// A FHIR specification version in `major.minor.patch` form.
///
/// The bridge targets FHIR R4, so construction rejects any version whose major
/// component is not 4. Every emitted resource is stamped with one of these;
/// accepting anything else would be a contract violation for downstream
/// consumers.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FhirVersion {
    major: u32,
    minor: u32,
    patch: u32,
}

impl FhirVersion {
    /// The default version stamped on emitted resources.
    pub const R4: FhirVersion = FhirVersion {
        major: 4,
        minor: 0,
        patch: 1,
    };

    /// Parses a version string such as `"4.0.1"`.
    ///
    /// Returns `VersionError::Malformed` when the string is not three
    /// dot-separated integers, and `VersionError::UnsupportedMajor` when the
    /// major version is anything other than 4.
    pub fn parse(input: &str) -> Result<Self, VersionError> {
        let mut parts = input.splitn(3, '.');
        let mut next = || -> Result<u32, VersionError> {
            parts
                .next()
                .and_then(|p| p.parse::<u32>().ok())
                .ok_or_else(|| VersionError::Malformed(input.to_owned()))
        };
        let major = next()?;
        let minor = next()?;
        let patch = next()?;

        if major != 4 {
            return Err(VersionError::UnsupportedMajor(major));
        }

        Ok(Self {
            major,
            minor,
            patch,
        })
    }

    pub fn major(&self) -> u32 {
        self.major
    }
}

impl Default for FhirVersion {
    fn default() -> Self {
        Self::R4
    }
}

impl std::fmt::Display for FhirVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl serde::Serialize for FhirVersion {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> serde::Deserialize<'de> for FhirVersion {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        FhirVersion::parse(&s).map_err(serde::de::Error::custom)
    }
}
