//! End-to-end pipeline tests: raw HL7 in, consent-filtered FHIR out, with
//! the audit trail checked at every step.

use bridge_core::audit::{actions, outcomes, AuditEvent, AuditSink, AuditSinkError};
use bridge_core::{
    BridgeConfig, BridgeError, ConsentRecord, DataCategory, DenialReason, InMemoryAuditSink,
    InMemoryConsentStore, MessageStatus, Orchestrator, RetryPolicy,
};
use chrono::{Duration, Utc};
use std::sync::Arc;
use std::time::Duration as StdDuration;

const ADMISSION: &str = "MSH|^~\\&|EHR|HOSP|BRIDGE|BRIDGE|20240101120000||ADT^A01|MSG001|P|2.5\r\
                         EVN|A01|20240101120000\r\
                         PID|1||123^^^HOSP^MR||SMITH^JOHN^Q||19800115|M|||42 OAK AVE^^SPRINGFIELD^IL^62701||555-1234\r\
                         PV1|1|I|ICU^201^A||||||||||||||||V100";

const LAB_RESULT: &str = "MSH|^~\\&|LAB|HOSP|BRIDGE|BRIDGE|20240102080000||ORU^R01|MSG777|P|2.5\r\
                          PID|1||123||SMITH^JOHN\r\
                          OBX|1|NM|2345-7^Glucose|1|5.4|mmol/L|3.9-5.8||||F";

fn full_consent(patient: &str, organization: &str) -> ConsentRecord {
    let mut record = ConsentRecord::new(patient, organization);
    record.effective_date = Utc::now() - Duration::days(30);
    record.policy_reference = Some("policy-2024-01".to_owned());
    record.allowed_categories.extend([
        DataCategory::Demographics,
        DataCategory::LaboratoryResults,
        DataCategory::Procedures,
    ]);
    record
}

fn orchestrator_with(
    records: Vec<ConsentRecord>,
) -> (Orchestrator, Arc<InMemoryAuditSink>) {
    let sink = Arc::new(InMemoryAuditSink::new());
    let orchestrator = Orchestrator::new(
        BridgeConfig::default(),
        Arc::new(InMemoryConsentStore::with_records(records)),
        sink.clone(),
    );
    (orchestrator, sink)
}

#[test]
fn admission_releases_patient_and_encounter() {
    let (orchestrator, sink) = orchestrator_with(vec![full_consent("123", "BRIDGE")]);
    let outcome = orchestrator.transform(ADMISSION, "EHR", "BRIDGE").expect("outcome");

    assert_eq!(outcome.status, MessageStatus::Completed);
    assert!(outcome.is_success());
    assert_eq!(outcome.message_id, "MSG001");
    assert!(outcome.validation.is_valid());
    assert!(outcome.blocked.is_empty());

    assert_eq!(outcome.resources.len(), 2);
    let types: Vec<&str> = outcome
        .resources
        .iter()
        .map(|r| r.resource_type.as_str())
        .collect();
    assert_eq!(types, vec!["Patient", "Encounter"]);
    for resource in &outcome.resources {
        assert_eq!(resource.source_message_id, "MSG001");
        assert!(resource.fhir_version.to_string().starts_with("4."));
    }

    // The EVN segment has no mapping; it is skipped, not an error.
    assert_eq!(outcome.mapping_warnings.len(), 1);
    assert_eq!(outcome.mapping_warnings[0].segment, "EVN");

    let patient = fhir::Patient::parse(&outcome.resources[0].content).expect("patient JSON");
    assert_eq!(patient.id, "123");
    assert_eq!(patient.gender.as_deref(), Some("male"));
    assert_eq!(patient.birth_date.as_deref(), Some("1980-01-15"));

    let events = sink.snapshot();
    let trail: Vec<(&str, &str)> = events
        .iter()
        .map(|e| (e.action.as_str(), e.outcome.as_str()))
        .collect();
    assert_eq!(
        trail,
        vec![
            (actions::MESSAGE_PARSED, outcomes::SUCCESS),
            (actions::MESSAGE_VALIDATED, outcomes::SUCCESS),
            (actions::RESOURCES_MAPPED, outcomes::SUCCESS),
            (actions::CONSENT_FILTERED, outcomes::SUCCESS),
        ]
    );
    let ids: Vec<String> = events.iter().map(|e| e.event_id.clone()).collect();
    assert_eq!(outcome.audit_event_ids, ids);
    assert!(events.iter().all(|e| e.resource_id.as_deref() == Some("MSG001")));
    assert_eq!(
        events[3].details.get("policy_reference"),
        Some(&serde_json::json!("policy-2024-01"))
    );
}

#[test]
fn denied_category_withholds_lab_results() {
    let mut record = full_consent("123", "BRIDGE");
    record
        .denied_categories
        .insert(DataCategory::LaboratoryResults);
    let (orchestrator, sink) = orchestrator_with(vec![record]);

    let outcome = orchestrator.transform(LAB_RESULT, "LAB", "BRIDGE").expect("outcome");
    assert_eq!(outcome.status, MessageStatus::Completed);
    assert!(outcome.resources.is_empty());
    assert_eq!(outcome.blocked.len(), 1);
    assert_eq!(outcome.blocked[0].resource_type, "Observation");
    assert_eq!(outcome.blocked[0].reason, DenialReason::CategoryDenied);
    assert_eq!(
        outcome.blocked_categories,
        vec![DataCategory::LaboratoryResults]
    );

    // A consent decision was made, so the filter event is a SUCCESS even
    // though it withheld everything.
    let consent_event = sink
        .snapshot()
        .into_iter()
        .find(|e| e.action == actions::CONSENT_FILTERED)
        .expect("consent event");
    assert_eq!(consent_event.outcome, outcomes::SUCCESS);
    assert!(consent_event.is_successful());
    assert_eq!(
        consent_event.details.get("blocked_count"),
        Some(&serde_json::json!(1))
    );
}

#[test]
fn no_consent_on_file_fails_closed() {
    let (orchestrator, sink) = orchestrator_with(vec![]);
    let outcome = orchestrator.transform(ADMISSION, "EHR", "BRIDGE").expect("outcome");

    // The message still completes; only the release is refused.
    assert_eq!(outcome.status, MessageStatus::Completed);
    assert!(outcome.resources.is_empty());
    assert_eq!(outcome.blocked.len(), 2);
    assert!(outcome
        .blocked
        .iter()
        .all(|b| b.reason == DenialReason::NoConsent));

    let consent_event = sink
        .snapshot()
        .into_iter()
        .find(|e| e.action == actions::CONSENT_FILTERED)
        .expect("consent event");
    assert_eq!(consent_event.outcome, outcomes::FAILURE);
    assert!(consent_event.is_failure());
    assert_eq!(
        consent_event.details.get("reason"),
        Some(&serde_json::json!("NO_CONSENT"))
    );
}

#[test]
fn expired_consent_withholds_everything() {
    let mut record = full_consent("123", "BRIDGE");
    record.expiration_date = Some(Utc::now() - Duration::days(1));
    let (orchestrator, _sink) = orchestrator_with(vec![record]);

    let outcome = orchestrator.transform(ADMISSION, "EHR", "BRIDGE").expect("outcome");
    assert_eq!(outcome.status, MessageStatus::Completed);
    assert!(outcome.resources.is_empty());
    assert!(outcome
        .blocked
        .iter()
        .all(|b| b.reason == DenialReason::ConsentNotActive));
}

#[test]
fn malformed_delimiters_fail_with_fatal_validation() {
    let (orchestrator, sink) = orchestrator_with(vec![full_consent("123", "BRIDGE")]);
    let outcome = orchestrator
        .transform("MSH|^^\\&|EHR|HOSP|BRIDGE|BRIDGE", "EHR", "BRIDGE")
        .expect("outcome");

    assert_eq!(outcome.status, MessageStatus::Failed);
    assert!(outcome.validation.has_fatal());
    assert!(outcome.resources.is_empty());

    let events = sink.snapshot();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].action, actions::MESSAGE_PARSED);
    assert_eq!(events[0].outcome, outcomes::ERROR);
}

#[test]
fn deprecated_sex_code_survives_with_a_warning() {
    let raw = "MSH|^~\\&|EHR|HOSP|BRIDGE|BRIDGE|20240101120000||ADT^A01|MSG004|P|2.5\r\
               PID|1||123||SMITH^JOHN||19800115|A";
    let (orchestrator, _sink) = orchestrator_with(vec![full_consent("123", "BRIDGE")]);
    let outcome = orchestrator.transform(raw, "EHR", "BRIDGE").expect("outcome");

    assert_eq!(outcome.status, MessageStatus::Completed);
    let warning = outcome
        .validation
        .warnings
        .iter()
        .find(|w| w.code == "DEPRECATED_VALUE")
        .expect("deprecation warning");
    assert_eq!(warning.recommended.as_deref(), Some("O"));

    // "A" (ambiguous) maps forward to "other".
    let patient = fhir::Patient::parse(&outcome.resources[0].content).expect("patient JSON");
    assert_eq!(patient.gender.as_deref(), Some("other"));
}

#[test]
fn unparseable_birth_date_is_an_error_but_the_message_completes() {
    let raw = "MSH|^~\\&|EHR|HOSP|BRIDGE|BRIDGE|20240101120000||ADT^A01|MSG008|P|2.5\r\
               PID|1||123||SMITH^JOHN||1980XX15|M";
    let (orchestrator, _sink) = orchestrator_with(vec![full_consent("123", "BRIDGE")]);
    let outcome = orchestrator.transform(raw, "EHR", "BRIDGE").expect("outcome");

    // An ERROR-severity finding rides along in the outcome; only FATAL
    // findings stop the pipeline.
    assert_eq!(outcome.status, MessageStatus::Completed);
    assert!(!outcome.validation.is_valid());
    assert!(!outcome.validation.has_fatal());
    assert!(outcome
        .validation
        .errors
        .iter()
        .any(|e| e.code == "INVALID_DATE"));

    assert_eq!(outcome.resources.len(), 1);
    let patient = fhir::Patient::parse(&outcome.resources[0].content).expect("patient JSON");
    assert_eq!(patient.id, "123");
    assert!(patient.birth_date.is_none());
}

#[test]
fn batch_processes_messages_independently() {
    let (orchestrator, _sink) = orchestrator_with(vec![full_consent("123", "BRIDGE")]);
    let raws = vec![
        ADMISSION.to_owned(),
        "garbage".to_owned(),
        LAB_RESULT.to_owned(),
    ];
    let outcomes = orchestrator.transform_batch(&raws, "EHR", "BRIDGE");
    assert_eq!(outcomes.len(), 3);

    let admission = outcomes[0].as_ref().expect("admission outcome");
    assert_eq!(admission.status, MessageStatus::Completed);
    let garbage = outcomes[1].as_ref().expect("garbage outcome");
    assert_eq!(garbage.status, MessageStatus::Failed);
    let lab = outcomes[2].as_ref().expect("lab outcome");
    assert_eq!(lab.status, MessageStatus::Completed);
    assert_eq!(lab.resources.len(), 2, "patient and observation released");
}

/// A sink that always refuses, to prove the pipeline fails closed when the
/// audit trail is unavailable.
struct DownSink;

impl AuditSink for DownSink {
    fn append(&self, _event: &AuditEvent) -> Result<(), AuditSinkError> {
        Err(AuditSinkError("disk full".to_owned()))
    }
}

#[test]
fn unavailable_audit_trail_aborts_the_transformation() {
    let mut config = BridgeConfig::default();
    config.retry = RetryPolicy {
        max_attempts: 2,
        base_delay: StdDuration::from_millis(1),
    };
    let orchestrator = Orchestrator::new(
        config,
        Arc::new(InMemoryConsentStore::with_records(vec![full_consent(
            "123", "BRIDGE",
        )])),
        Arc::new(DownSink),
    );

    let err = orchestrator
        .transform(ADMISSION, "EHR", "BRIDGE")
        .expect_err("no outcome without an audit trail");
    match err {
        BridgeError::AuditUnavailable { attempts, .. } => assert_eq!(attempts, 2),
        other => panic!("expected AuditUnavailable, got {other:?}"),
    }
}
