//! The transformation pipeline.
//!
//! [`Orchestrator::transform`] drives one message through parse, validation,
//! mapping, and consent filtering, advancing the [`SourceMessage`] state
//! machine and recording exactly one audit event per stage. The returned
//! [`TransformationOutcome`] is fully populated on success and failure alike;
//! a `BridgeError` escapes only when the audit trail itself cannot be
//! written.
//!
//! Invocations are independent of each other, so batches run on a rayon
//! worker pool.

use crate::audit::{actions, outcomes, AuditEvent, AuditRecorder, AuditSink};
use crate::config::BridgeConfig;
use crate::consent::{BlockedResource, ConsentEngine, ConsentStore, DataCategory, FilterOutcome};
use crate::error::BridgeResult;
use crate::mapper::{self, MappingWarning};
use crate::message::{MessageStatus, SourceMessage};
use crate::validation::{self, ValidationOutcome};
use chrono::Utc;
use fhir::FhirResource;
use hl7::{Hl7Error, ParsedMessage};
use rayon::prelude::*;
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;

/// Everything a caller learns about one transformation.
#[derive(Debug, Serialize)]
pub struct TransformationOutcome {
    pub message_id: String,
    pub status: MessageStatus,
    pub validation: ValidationOutcome,
    /// Resources released by the consent filter.
    pub resources: Vec<FhirResource>,
    /// Resources withheld by the consent filter.
    pub blocked: Vec<BlockedResource>,
    /// Distinct categories with at least one blocked resource.
    pub blocked_categories: Vec<DataCategory>,
    pub mapping_warnings: Vec<MappingWarning>,
    /// Ids of the audit events this transformation recorded, in order.
    pub audit_event_ids: Vec<String>,
}

impl TransformationOutcome {
    pub fn is_success(&self) -> bool {
        self.status == MessageStatus::Completed
    }
}

/// Drives messages through the pipeline.
pub struct Orchestrator {
    config: BridgeConfig,
    consent: ConsentEngine,
    recorder: AuditRecorder,
}

/// State threaded through the stages of one transformation.
struct Run {
    message: SourceMessage,
    validation: ValidationOutcome,
    mapping_warnings: Vec<MappingWarning>,
    audit_event_ids: Vec<String>,
}

impl Run {
    fn new(raw: &str, sender_id: &str, receiver_id: &str) -> Self {
        Self {
            message: SourceMessage::new(raw, sender_id, receiver_id),
            validation: ValidationOutcome::default(),
            mapping_warnings: Vec::new(),
            audit_event_ids: Vec::new(),
        }
    }

    /// Advances the state machine. The orchestrator only requests legal
    /// transitions, so a rejection is a bug worth a log line, not a panic.
    fn advance(&mut self, next: MessageStatus) {
        if let Err(err) = self.message.transition_to(next) {
            tracing::error!(message_id = %self.message.id, error = %err, "status transition rejected");
        }
    }

    fn finish(self, filter: FilterOutcome) -> TransformationOutcome {
        let blocked_categories = filter.blocked_categories();
        let status = self.message.status();
        TransformationOutcome {
            message_id: self.message.id,
            status,
            validation: self.validation,
            resources: filter.allowed,
            blocked: filter.blocked,
            blocked_categories,
            mapping_warnings: self.mapping_warnings,
            audit_event_ids: self.audit_event_ids,
        }
    }

    fn fail(mut self, filter: FilterOutcome) -> TransformationOutcome {
        self.advance(MessageStatus::Failed);
        self.finish(filter)
    }
}

impl Orchestrator {
    pub fn new(
        config: BridgeConfig,
        consent_store: Arc<dyn ConsentStore>,
        audit_sink: Arc<dyn AuditSink>,
    ) -> Self {
        let recorder = AuditRecorder::new(audit_sink, config.retry);
        Self {
            consent: ConsentEngine::new(consent_store),
            recorder,
            config,
        }
    }

    /// Transforms one raw HL7 message with no deadline.
    ///
    /// `sender_id` and `receiver_id` identify the ingestion endpoints; the
    /// receiver is the organization consent decisions are scoped to.
    pub fn transform(
        &self,
        raw: &str,
        sender_id: &str,
        receiver_id: &str,
    ) -> BridgeResult<TransformationOutcome> {
        self.transform_with_deadline(raw, sender_id, receiver_id, None)
    }

    /// Transforms a batch from one ingestion endpoint in parallel. Each
    /// message succeeds or fails on its own; one poisoned message never
    /// affects its neighbours.
    pub fn transform_batch(
        &self,
        raws: &[String],
        sender_id: &str,
        receiver_id: &str,
    ) -> Vec<BridgeResult<TransformationOutcome>> {
        raws.par_iter()
            .map(|raw| self.transform(raw, sender_id, receiver_id))
            .collect()
    }

    /// Transforms one raw HL7 message, checking the deadline between stages.
    ///
    /// A deadline hit fails the message with a `TIMEOUT` audit event; work
    /// already in flight for the current stage is allowed to finish.
    pub fn transform_with_deadline(
        &self,
        raw: &str,
        sender_id: &str,
        receiver_id: &str,
        deadline: Option<Instant>,
    ) -> BridgeResult<TransformationOutcome> {
        let mut run = Run::new(raw, sender_id, receiver_id);

        // Parse.
        if expired(deadline) {
            return self.timed_out(run, "parse");
        }
        let parsed = match ParsedMessage::parse(raw) {
            Ok(parsed) => parsed,
            Err(err) => return self.parse_failed(run, err),
        };
        self.read_header(&mut run.message, &parsed);
        run.advance(MessageStatus::Parsed);
        let event = self
            .event(actions::MESSAGE_PARSED, outcomes::SUCCESS, &run.message)
            .with_detail("segment_count", parsed.segments().len());
        run.audit_event_ids.push(self.recorder.record(event)?);

        // Validate.
        if expired(deadline) {
            return self.timed_out(run, "validate");
        }
        run.validation = validation::validate(&parsed);
        // Only FATAL findings stop the pipeline; ERROR findings travel in the
        // outcome and the message still gets mapped and filtered.
        if run.validation.has_fatal() {
            let event = self
                .event(actions::MESSAGE_VALIDATED, outcomes::FAILURE, &run.message)
                .with_detail("error_count", run.validation.errors.len())
                .with_detail("fatal", true);
            run.audit_event_ids.push(self.recorder.record(event)?);
            return Ok(run.fail(FilterOutcome::default()));
        }
        let event = self
            .event(actions::MESSAGE_VALIDATED, outcomes::SUCCESS, &run.message)
            .with_detail("error_count", run.validation.errors.len())
            .with_detail("warning_count", run.validation.warnings.len());
        run.audit_event_ids.push(self.recorder.record(event)?);
        run.advance(MessageStatus::Validated);

        // Map.
        if expired(deadline) {
            return self.timed_out(run, "map");
        }
        let mapping = match mapper::map_message(&parsed, &run.message.id, &self.config.fhir_version)
        {
            Ok(mapping) => mapping,
            Err(err) => {
                let event = self
                    .event(actions::RESOURCES_MAPPED, outcomes::ERROR, &run.message)
                    .with_detail("error", err.to_string());
                run.audit_event_ids.push(self.recorder.record(event)?);
                return Ok(run.fail(FilterOutcome::default()));
            }
        };
        run.mapping_warnings = mapping.warnings;
        let event = self
            .event(actions::RESOURCES_MAPPED, outcomes::SUCCESS, &run.message)
            .with_detail("resource_count", mapping.resources.len())
            .with_detail("skipped_segments", run.mapping_warnings.len());
        run.audit_event_ids.push(self.recorder.record(event)?);
        run.advance(MessageStatus::Mapped);

        // Consent.
        if expired(deadline) {
            return self.timed_out(run, "consent");
        }
        self.apply_consent(run, &parsed, mapping.resources)
    }

    /// Resolves consent for the message's patient and filters the mapped
    /// resources. Absence of a record, an unknown patient, and a store
    /// failure all fail closed.
    fn apply_consent(
        &self,
        mut run: Run,
        parsed: &ParsedMessage,
        resources: Vec<FhirResource>,
    ) -> BridgeResult<TransformationOutcome> {
        let now = Utc::now();
        let patient_id = parsed
            .segment("PID")
            .and_then(|pid| pid.component_value(3, 1));
        let organization = run.message.receiving_application.clone();

        let record = match patient_id {
            Some(patient_id) => {
                match self.consent.resolve(patient_id, &organization, now) {
                    Ok(record) => record,
                    Err(err) => {
                        // Store down: withhold everything and fail the message.
                        let filter = self.consent.filter(resources, None, now);
                        let event = self
                            .event(actions::CONSENT_FILTERED, outcomes::ERROR, &run.message)
                            .with_detail("error", err.to_string());
                        run.audit_event_ids.push(self.recorder.record(event)?);
                        return Ok(run.fail(filter));
                    }
                }
            }
            // No patient in the message means no consent can exist for it.
            None => None,
        };

        let filter = self.consent.filter(resources, record.as_ref(), now);
        let event = match &record {
            Some(record) => {
                let mut event = self
                    .event(actions::CONSENT_FILTERED, outcomes::SUCCESS, &run.message)
                    .with_detail("allowed_count", filter.allowed.len())
                    .with_detail("blocked_count", filter.blocked.len());
                if let Some(policy) = &record.policy_reference {
                    event = event.with_detail("policy_reference", policy.as_str());
                }
                event
            }
            None => self
                .event(actions::CONSENT_FILTERED, outcomes::FAILURE, &run.message)
                .with_detail("reason", "NO_CONSENT")
                .with_detail("blocked_count", filter.blocked.len()),
        };
        run.audit_event_ids.push(self.recorder.record(event)?);

        run.advance(MessageStatus::Completed);
        tracing::info!(
            message_id = %run.message.id,
            released = filter.allowed.len(),
            blocked = filter.blocked.len(),
            "transformation completed"
        );
        Ok(run.finish(filter))
    }

    /// A message that never tokenized still gets a populated outcome: one
    /// fatal validation entry and an ERROR audit event.
    fn parse_failed(&self, mut run: Run, err: Hl7Error) -> BridgeResult<TransformationOutcome> {
        let code = match &err {
            Hl7Error::Delimiters(_) | Hl7Error::TruncatedHeader(_) => "DELIMITER_ERROR",
            _ => "PARSE_ERROR",
        };
        tracing::warn!(message_id = %run.message.id, error = %err, "message failed to parse");
        let event = self
            .event(actions::MESSAGE_PARSED, outcomes::ERROR, &run.message)
            .with_detail("error", err.to_string());
        run.audit_event_ids.push(self.recorder.record(event)?);
        run.validation = ValidationOutcome::fatal(code, err.to_string());
        Ok(run.fail(FilterOutcome::default()))
    }

    fn timed_out(&self, mut run: Run, stage: &str) -> BridgeResult<TransformationOutcome> {
        tracing::warn!(message_id = %run.message.id, stage, "deadline expired");
        let event = self
            .event(
                actions::TRANSFORMATION_TIMEOUT,
                outcomes::TIMEOUT,
                &run.message,
            )
            .with_detail("stage", stage);
        run.audit_event_ids.push(self.recorder.record(event)?);
        Ok(run.fail(FilterOutcome::default()))
    }

    fn event(&self, action: &str, outcome: &str, message: &SourceMessage) -> AuditEvent {
        AuditEvent::new(&self.config.actor, action, outcome).with_resource("Message", &message.id)
    }

    /// Lifts header metadata onto the message record, replacing the fallback
    /// id with the MSH-10 control id when one is present.
    fn read_header(&self, message: &mut SourceMessage, parsed: &ParsedMessage) {
        let Some(msh) = parsed.segment("MSH") else {
            return;
        };
        if let Some(control_id) = msh.field_value(10) {
            message.id = control_id.to_owned();
        }
        message.message_type = msh.component_value(9, 1).map(str::to_owned);
        message.version = msh.field_value(12).map(str::to_owned);
    }
}

fn expired(deadline: Option<Instant>) -> bool {
    deadline.is_some_and(|deadline| Instant::now() >= deadline)
}
