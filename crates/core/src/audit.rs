//! Audit trail recording.
//!
//! Every pipeline stage transition produces exactly one [`AuditEvent`].
//! Events are append-only: nothing in this module updates or deletes one.
//! Appending retries with exponential backoff, and when the sink stays down
//! past the retry budget the transformation itself fails; an unauditable
//! data release is worse than an unavailable one.

use crate::error::BridgeError;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

/// Audit action names emitted by the pipeline.
pub mod actions {
    pub const MESSAGE_PARSED: &str = "MESSAGE_PARSED";
    pub const MESSAGE_VALIDATED: &str = "MESSAGE_VALIDATED";
    pub const RESOURCES_MAPPED: &str = "RESOURCES_MAPPED";
    pub const CONSENT_FILTERED: &str = "CONSENT_FILTERED";
    pub const TRANSFORMATION_TIMEOUT: &str = "TRANSFORMATION_TIMEOUT";
}

/// Outcome strings carried by audit events.
pub mod outcomes {
    pub const SUCCESS: &str = "SUCCESS";
    pub const FAILURE: &str = "FAILURE";
    pub const ERROR: &str = "ERROR";
    pub const TIMEOUT: &str = "TIMEOUT";
}

/// How long an event must be kept, driven by regulatory class.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RetentionTier {
    /// Routine processing events.
    Short,
    /// Security-relevant events.
    Medium,
    /// Consent and access decisions.
    Long,
}

impl RetentionTier {
    pub fn retention_days(self) -> u32 {
        match self {
            RetentionTier::Short => 90,
            RetentionTier::Medium => 365,
            RetentionTier::Long => 2555,
        }
    }
}

/// One immutable entry in the audit trail.
#[derive(Clone, Debug, Serialize)]
pub struct AuditEvent {
    pub event_id: String,
    pub timestamp: DateTime<Utc>,
    pub actor: String,
    pub action: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource_id: Option<String>,
    pub outcome: String,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub details: BTreeMap<String, serde_json::Value>,
}

impl AuditEvent {
    pub fn new(actor: &str, action: &str, outcome: &str) -> Self {
        Self {
            event_id: Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            actor: actor.to_owned(),
            action: action.to_owned(),
            resource_type: None,
            resource_id: None,
            outcome: outcome.to_owned(),
            details: BTreeMap::new(),
        }
    }

    pub fn with_resource(mut self, resource_type: &str, resource_id: &str) -> Self {
        self.resource_type = Some(resource_type.to_owned());
        self.resource_id = Some(resource_id.to_owned());
        self
    }

    pub fn with_detail(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.details.insert(key.to_owned(), value.into());
        self
    }

    /// Case-insensitive check against the SUCCESS outcome.
    pub fn is_successful(&self) -> bool {
        self.outcome.eq_ignore_ascii_case(outcomes::SUCCESS)
    }

    /// Case-insensitive check against FAILURE and ERROR. Other outcomes
    /// (including TIMEOUT) are neither success nor failure.
    pub fn is_failure(&self) -> bool {
        self.outcome.eq_ignore_ascii_case(outcomes::FAILURE)
            || self.outcome.eq_ignore_ascii_case(outcomes::ERROR)
    }

    /// The retention tier is derived from the action name, so the event
    /// itself carries everything an archival job needs.
    pub fn retention_tier(&self) -> RetentionTier {
        let action = self.action.to_ascii_uppercase();
        if action.starts_with("CONSENT_") || action.starts_with("ACCESS_") {
            RetentionTier::Long
        } else if action.starts_with("SECURITY_") || action.contains("AUTH") {
            RetentionTier::Medium
        } else {
            RetentionTier::Short
        }
    }
}

/// Error raised when an append attempt fails.
#[derive(Debug, thiserror::Error)]
#[error("audit sink unavailable: {0}")]
pub struct AuditSinkError(pub String);

/// Append-only sink for audit events. Production deployments back this with
/// durable storage; tests and the CLI use [`InMemoryAuditSink`].
pub trait AuditSink: Send + Sync {
    fn append(&self, event: &AuditEvent) -> Result<(), AuditSinkError>;
}

/// An audit sink held in memory.
#[derive(Default)]
pub struct InMemoryAuditSink {
    events: Mutex<Vec<AuditEvent>>,
}

impl InMemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// A copy of everything appended so far, in append order.
    pub fn snapshot(&self) -> Vec<AuditEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }
}

impl AuditSink for InMemoryAuditSink {
    fn append(&self, event: &AuditEvent) -> Result<(), AuditSinkError> {
        let mut events = self
            .events
            .lock()
            .map_err(|_| AuditSinkError("lock poisoned".to_owned()))?;
        events.push(event.clone());
        Ok(())
    }
}

/// Retry budget for audit appends.
#[derive(Clone, Copy, Debug)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(50),
        }
    }
}

impl RetryPolicy {
    /// Delay before the retry following `attempt` (1-based): base * 2^(n-1).
    pub fn delay_after(self, attempt: u32) -> Duration {
        self.base_delay
            .saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)))
    }
}

/// Records events against a sink, retrying with exponential backoff.
pub struct AuditRecorder {
    sink: Arc<dyn AuditSink>,
    policy: RetryPolicy,
}

impl AuditRecorder {
    pub fn new(sink: Arc<dyn AuditSink>, policy: RetryPolicy) -> Self {
        Self { sink, policy }
    }

    /// Appends the event, returning its id once durably recorded.
    ///
    /// Exhausting the retry budget is a hard error: the caller must treat the
    /// whole operation as failed rather than proceed unaudited.
    pub fn record(&self, event: AuditEvent) -> Result<String, BridgeError> {
        let mut attempt = 1;
        loop {
            match self.sink.append(&event) {
                Ok(()) => {
                    tracing::debug!(
                        event_id = %event.event_id,
                        action = %event.action,
                        outcome = %event.outcome,
                        "recorded audit event"
                    );
                    return Ok(event.event_id);
                }
                Err(err) if attempt < self.policy.max_attempts => {
                    let delay = self.policy.delay_after(attempt);
                    tracing::warn!(
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "audit append failed, retrying"
                    );
                    std::thread::sleep(delay);
                    attempt += 1;
                }
                Err(err) => {
                    tracing::error!(
                        attempts = attempt,
                        error = %err,
                        "audit trail unavailable, failing closed"
                    );
                    return Err(BridgeError::AuditUnavailable {
                        attempts: attempt,
                        source: err,
                    });
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Fails the first `failures` appends, then delegates to memory.
    struct FlakySink {
        failures: u32,
        attempts: AtomicU32,
        inner: InMemoryAuditSink,
    }

    impl FlakySink {
        fn new(failures: u32) -> Self {
            Self {
                failures,
                attempts: AtomicU32::new(0),
                inner: InMemoryAuditSink::new(),
            }
        }
    }

    impl AuditSink for FlakySink {
        fn append(&self, event: &AuditEvent) -> Result<(), AuditSinkError> {
            let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
            if attempt < self.failures {
                return Err(AuditSinkError("connection refused".to_owned()));
            }
            self.inner.append(event)
        }
    }

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay: Duration::from_millis(1),
        }
    }

    #[test]
    fn outcome_predicates_are_case_insensitive() {
        assert!(AuditEvent::new("t", "X", "success").is_successful());
        assert!(AuditEvent::new("t", "X", "Failure").is_failure());
        assert!(AuditEvent::new("t", "X", "ERROR").is_failure());
        let timeout = AuditEvent::new("t", "X", outcomes::TIMEOUT);
        assert!(!timeout.is_successful());
        assert!(!timeout.is_failure());
    }

    #[test]
    fn retention_tier_follows_the_action() {
        let consent = AuditEvent::new("t", actions::CONSENT_FILTERED, "SUCCESS");
        assert_eq!(consent.retention_tier(), RetentionTier::Long);
        assert_eq!(consent.retention_tier().retention_days(), 2555);

        let security = AuditEvent::new("t", "SECURITY_EVENT", "FAILURE");
        assert_eq!(security.retention_tier(), RetentionTier::Medium);
        let auth = AuditEvent::new("t", "AUTHENTICATION_FAILED", "FAILURE");
        assert_eq!(auth.retention_tier(), RetentionTier::Medium);

        let routine = AuditEvent::new("t", actions::MESSAGE_PARSED, "SUCCESS");
        assert_eq!(routine.retention_tier(), RetentionTier::Short);
    }

    #[test]
    fn backoff_doubles_per_attempt() {
        let policy = RetryPolicy {
            max_attempts: 4,
            base_delay: Duration::from_millis(50),
        };
        assert_eq!(policy.delay_after(1), Duration::from_millis(50));
        assert_eq!(policy.delay_after(2), Duration::from_millis(100));
        assert_eq!(policy.delay_after(3), Duration::from_millis(200));
    }

    #[test]
    fn record_retries_until_the_sink_recovers() {
        let sink = Arc::new(FlakySink::new(2));
        let recorder = AuditRecorder::new(sink.clone(), fast_policy(3));
        let event_id = recorder
            .record(AuditEvent::new("t", actions::MESSAGE_PARSED, "SUCCESS"))
            .expect("recorded on the third attempt");
        let recorded = sink.inner.snapshot();
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].event_id, event_id);
    }

    #[test]
    fn record_fails_closed_when_the_budget_is_exhausted() {
        let sink = Arc::new(FlakySink::new(10));
        let recorder = AuditRecorder::new(sink.clone(), fast_policy(3));
        let err = recorder
            .record(AuditEvent::new("t", actions::MESSAGE_PARSED, "SUCCESS"))
            .expect_err("sink never recovers");
        match err {
            BridgeError::AuditUnavailable { attempts, .. } => assert_eq!(attempts, 3),
            other => panic!("expected AuditUnavailable, got {other:?}"),
        }
        assert!(sink.inner.snapshot().is_empty());
    }

    #[test]
    fn events_carry_resource_and_details() {
        let event = AuditEvent::new("bridge", actions::RESOURCES_MAPPED, "SUCCESS")
            .with_resource("Message", "MSG001")
            .with_detail("resource_count", 2);
        assert_eq!(event.resource_id.as_deref(), Some("MSG001"));
        assert_eq!(
            event.details.get("resource_count"),
            Some(&serde_json::json!(2))
        );
    }
}
