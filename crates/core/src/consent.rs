//! Consent policy evaluation.
//!
//! Resources never leave the pipeline without an affirmative consent
//! decision. The engine resolves the applicable [`ConsentRecord`] for a
//! `(patient, organization)` pair and filters mapped resources against its
//! category sets. When no record exists, everything is blocked: absence of
//! consent is denial, never permission.

use chrono::{DateTime, Utc};
use fhir::FhirResource;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, RwLock};

/// Clinical data categories a consent record can speak about.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DataCategory {
    Demographics,
    ClinicalNotes,
    LaboratoryResults,
    Medications,
    Allergies,
    Immunizations,
    Procedures,
    Diagnoses,
    VitalSigns,
    ImagingReports,
}

impl DataCategory {
    /// The category a mapped resource type falls under, if it has one.
    pub fn for_resource_type(resource_type: &str) -> Option<Self> {
        match resource_type {
            "Patient" | "Encounter" => Some(DataCategory::Demographics),
            "Observation" => Some(DataCategory::LaboratoryResults),
            "ServiceRequest" => Some(DataCategory::Procedures),
            _ => None,
        }
    }
}

/// Lifecycle status of a consent record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConsentStatus {
    Pending,
    Active,
    Inactive,
    Expired,
    Revoked,
}

/// A patient's consent decision toward one organization.
///
/// Equality and hashing are keyed on the `(patient_id, organization_id)` pair
/// alone: two records for the same pair compare equal even when their
/// category sets or dates differ. Collections of records therefore hold at
/// most one entry per pair; use [`ConsentRecord::same_content`] when a full
/// comparison is needed.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ConsentRecord {
    pub patient_id: String,
    pub organization_id: String,
    pub status: ConsentStatus,
    #[serde(default)]
    pub allowed_categories: BTreeSet<DataCategory>,
    #[serde(default)]
    pub denied_categories: BTreeSet<DataCategory>,
    pub effective_date: DateTime<Utc>,
    #[serde(default)]
    pub expiration_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub policy_reference: Option<String>,
}

impl ConsentRecord {
    pub fn new(patient_id: impl Into<String>, organization_id: impl Into<String>) -> Self {
        Self {
            patient_id: patient_id.into(),
            organization_id: organization_id.into(),
            status: ConsentStatus::Active,
            allowed_categories: BTreeSet::new(),
            denied_categories: BTreeSet::new(),
            effective_date: Utc::now(),
            expiration_date: None,
            policy_reference: None,
        }
    }

    /// Whether the record grants anything at `now`: ACTIVE status, effective
    /// date reached, not expired.
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        self.status == ConsentStatus::Active
            && self.effective_date <= now
            && !self.is_expired_at(now)
    }

    /// Expiry is judged purely on the expiration date, independent of status:
    /// a REVOKED record with a future expiration date is inactive but not
    /// expired.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expiration_date.is_some_and(|expiry| expiry <= now)
    }

    pub fn is_active(&self) -> bool {
        self.is_active_at(Utc::now())
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    /// Field-by-field comparison, unlike `==` which only compares identity.
    pub fn same_content(&self, other: &ConsentRecord) -> bool {
        self.patient_id == other.patient_id
            && self.organization_id == other.organization_id
            && self.status == other.status
            && self.allowed_categories == other.allowed_categories
            && self.denied_categories == other.denied_categories
            && self.effective_date == other.effective_date
            && self.expiration_date == other.expiration_date
            && self.policy_reference == other.policy_reference
    }
}

impl PartialEq for ConsentRecord {
    fn eq(&self, other: &Self) -> bool {
        self.patient_id == other.patient_id && self.organization_id == other.organization_id
    }
}

impl Eq for ConsentRecord {}

impl Hash for ConsentRecord {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.patient_id.hash(state);
        self.organization_id.hash(state);
    }
}

/// Error raised when the consent store cannot be read.
#[derive(Debug, thiserror::Error)]
#[error("consent store unavailable: {0}")]
pub struct ConsentStoreError(pub String);

/// Lookup seam for consent records. Production deployments back this with a
/// database; tests and the CLI use [`InMemoryConsentStore`].
pub trait ConsentStore: Send + Sync {
    /// All records on file for the pair, in no particular order.
    fn records_for(
        &self,
        patient_id: &str,
        organization_id: &str,
    ) -> Result<Vec<ConsentRecord>, ConsentStoreError>;
}

/// A consent store held in memory.
#[derive(Default)]
pub struct InMemoryConsentStore {
    records: RwLock<Vec<ConsentRecord>>,
}

impl InMemoryConsentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(records: Vec<ConsentRecord>) -> Self {
        Self {
            records: RwLock::new(records),
        }
    }

    /// Inserts a record, replacing any existing record for the same pair.
    pub fn put(&self, record: ConsentRecord) {
        if let Ok(mut records) = self.records.write() {
            records.retain(|existing| existing != &record);
            records.push(record);
        }
    }
}

impl ConsentStore for InMemoryConsentStore {
    fn records_for(
        &self,
        patient_id: &str,
        organization_id: &str,
    ) -> Result<Vec<ConsentRecord>, ConsentStoreError> {
        let records = self
            .records
            .read()
            .map_err(|_| ConsentStoreError("lock poisoned".to_owned()))?;
        Ok(records
            .iter()
            .filter(|r| r.patient_id == patient_id && r.organization_id == organization_id)
            .cloned()
            .collect())
    }
}

/// Why a resource was withheld.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DenialReason {
    /// No consent record exists for the pair; default deny.
    NoConsent,
    /// A record exists but is pending, revoked, expired, or not yet effective.
    ConsentNotActive,
    /// The record explicitly denies the resource's category.
    CategoryDenied,
    /// The record neither denies nor allows the category; default deny.
    CategoryNotAllowed,
}

/// A resource withheld by the filter, with enough structure for the caller
/// to know what was blocked and why without seeing the content.
#[derive(Clone, Debug, Serialize)]
pub struct BlockedResource {
    pub resource_id: String,
    pub resource_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<DataCategory>,
    pub reason: DenialReason,
}

/// The result of filtering one message's resources.
#[derive(Debug, Default)]
pub struct FilterOutcome {
    pub allowed: Vec<FhirResource>,
    pub blocked: Vec<BlockedResource>,
}

impl FilterOutcome {
    /// The distinct categories that had at least one resource blocked.
    pub fn blocked_categories(&self) -> Vec<DataCategory> {
        let set: BTreeSet<DataCategory> =
            self.blocked.iter().filter_map(|b| b.category).collect();
        set.into_iter().collect()
    }
}

/// Resolves and applies consent decisions.
pub struct ConsentEngine {
    store: Arc<dyn ConsentStore>,
}

impl ConsentEngine {
    pub fn new(store: Arc<dyn ConsentStore>) -> Self {
        Self { store }
    }

    /// The single most applicable record for the pair at `now`.
    ///
    /// Records active at `now` take precedence; among several, the latest
    /// effective date wins. When no record is active the most recently
    /// effective record is still returned so the caller can distinguish
    /// "consent exists but is not active" from "no consent on file".
    pub fn resolve(
        &self,
        patient_id: &str,
        organization_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<ConsentRecord>, ConsentStoreError> {
        let records = self.store.records_for(patient_id, organization_id)?;
        let active = records
            .iter()
            .filter(|r| r.is_active_at(now))
            .max_by_key(|r| r.effective_date)
            .cloned();
        if active.is_some() {
            return Ok(active);
        }
        Ok(records.into_iter().max_by(|a, b| a.effective_date.cmp(&b.effective_date)))
    }

    /// Splits mapped resources into released and withheld.
    ///
    /// Denied categories beat allowed ones, and a category mentioned in
    /// neither set is withheld. With no record at all, every resource is
    /// withheld.
    pub fn filter(
        &self,
        resources: Vec<FhirResource>,
        record: Option<&ConsentRecord>,
        now: DateTime<Utc>,
    ) -> FilterOutcome {
        let mut outcome = FilterOutcome::default();
        for resource in resources {
            let category = DataCategory::for_resource_type(&resource.resource_type);
            let denial = match record {
                None => Some(DenialReason::NoConsent),
                Some(record) if !record.is_active_at(now) => Some(DenialReason::ConsentNotActive),
                Some(record) => match category {
                    Some(category) if record.denied_categories.contains(&category) => {
                        Some(DenialReason::CategoryDenied)
                    }
                    Some(category) if record.allowed_categories.contains(&category) => None,
                    _ => Some(DenialReason::CategoryNotAllowed),
                },
            };
            match denial {
                None => outcome.allowed.push(resource),
                Some(reason) => outcome.blocked.push(BlockedResource {
                    resource_id: resource.resource_id,
                    resource_type: resource.resource_type,
                    category,
                    reason,
                }),
            }
        }
        tracing::info!(
            allowed = outcome.allowed.len(),
            blocked = outcome.blocked.len(),
            "applied consent filter"
        );
        outcome
    }
}
