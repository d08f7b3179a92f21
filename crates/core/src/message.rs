//! Source message lifecycle.
//!
//! A [`SourceMessage`] tracks one inbound HL7 message through the pipeline.
//! Its status advances along a fixed path:
//!
//! ```text
//! RECEIVED -> PARSED -> VALIDATED -> MAPPED -> COMPLETED
//!                \          \           \
//!                 +----------+-----------+--> FAILED
//! ```
//!
//! `COMPLETED` and `FAILED` are terminal. Once a message reaches a terminal
//! status every further transition is rejected, so a finished message can
//! never be reopened or re-failed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Pipeline status of a source message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageStatus {
    Received,
    Parsed,
    Validated,
    Mapped,
    Completed,
    Failed,
}

impl MessageStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            MessageStatus::Received => "RECEIVED",
            MessageStatus::Parsed => "PARSED",
            MessageStatus::Validated => "VALIDATED",
            MessageStatus::Mapped => "MAPPED",
            MessageStatus::Completed => "COMPLETED",
            MessageStatus::Failed => "FAILED",
        }
    }

    /// Terminal statuses admit no further transitions.
    pub fn is_terminal(self) -> bool {
        matches!(self, MessageStatus::Completed | MessageStatus::Failed)
    }

    /// Whether `next` is a legal successor of this status.
    ///
    /// Any non-terminal status may fail; otherwise only the next stage in the
    /// pipeline order is reachable.
    pub fn can_transition_to(self, next: MessageStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        matches!(
            (self, next),
            (MessageStatus::Received, MessageStatus::Parsed)
                | (MessageStatus::Parsed, MessageStatus::Validated)
                | (MessageStatus::Validated, MessageStatus::Mapped)
                | (MessageStatus::Mapped, MessageStatus::Completed)
                | (_, MessageStatus::Failed)
        )
    }
}

impl std::fmt::Display for MessageStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a status transition is rejected.
#[derive(Debug, thiserror::Error)]
#[error("illegal status transition {from} -> {to}")]
pub struct StatusError {
    pub from: MessageStatus,
    pub to: MessageStatus,
}

/// An inbound HL7 message with its header metadata and pipeline status.
///
/// The id starts as a generated UUID and is replaced with the MSH-10 control
/// id once the header has been read, so even unparseable messages are
/// addressable in the audit trail.
#[derive(Clone, Debug, Serialize)]
pub struct SourceMessage {
    pub id: String,
    pub message_type: Option<String>,
    pub version: Option<String>,
    /// Caller-supplied sender identifier from the ingestion boundary.
    pub sending_application: String,
    /// Caller-supplied receiver identifier; scopes the consent lookup.
    pub receiving_application: String,
    #[serde(skip)]
    pub raw: String,
    pub received_at: DateTime<Utc>,
    status: MessageStatus,
}

impl SourceMessage {
    pub fn new(raw: impl Into<String>, sender_id: &str, receiver_id: &str) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            message_type: None,
            version: None,
            sending_application: sender_id.to_owned(),
            receiving_application: receiver_id.to_owned(),
            raw: raw.into(),
            received_at: Utc::now(),
            status: MessageStatus::Received,
        }
    }

    pub fn status(&self) -> MessageStatus {
        self.status
    }

    /// Advances the status, rejecting transitions out of terminal statuses
    /// and jumps that skip a pipeline stage.
    pub fn transition_to(&mut self, next: MessageStatus) -> Result<(), StatusError> {
        if !self.status.can_transition_to(next) {
            return Err(StatusError {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn advances_through_the_happy_path() {
        let mut message = SourceMessage::new("MSH|...", "EHR", "BRIDGE");
        for next in [
            MessageStatus::Parsed,
            MessageStatus::Validated,
            MessageStatus::Mapped,
            MessageStatus::Completed,
        ] {
            message.transition_to(next).expect("legal transition");
        }
        assert_eq!(message.status(), MessageStatus::Completed);
    }

    #[test]
    fn any_non_terminal_status_can_fail() {
        let mut message = SourceMessage::new("MSH|...", "EHR", "BRIDGE");
        message.transition_to(MessageStatus::Parsed).expect("parse");
        message.transition_to(MessageStatus::Failed).expect("fail");
        assert_eq!(message.status(), MessageStatus::Failed);
    }

    #[test]
    fn rejects_skipping_a_stage() {
        let mut message = SourceMessage::new("MSH|...", "EHR", "BRIDGE");
        let err = message
            .transition_to(MessageStatus::Validated)
            .expect_err("skipped PARSED");
        assert_eq!(err.from, MessageStatus::Received);
        assert_eq!(err.to, MessageStatus::Validated);
    }

    #[test]
    fn terminal_statuses_are_immutable() {
        let mut message = SourceMessage::new("MSH|...", "EHR", "BRIDGE");
        message.transition_to(MessageStatus::Failed).expect("fail");
        assert!(message.transition_to(MessageStatus::Parsed).is_err());
        assert!(message.transition_to(MessageStatus::Failed).is_err());
        assert_eq!(message.status(), MessageStatus::Failed);
    }

    #[test]
    fn fresh_messages_get_a_fallback_id() {
        let message = SourceMessage::new("not even HL7", "EHR", "BRIDGE");
        assert!(!message.id.is_empty());
        assert_eq!(message.status(), MessageStatus::Received);
    }
}
