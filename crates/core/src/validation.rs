//! Structural validation of tokenized messages.
//!
//! Validation is a pure function over a [`ParsedMessage`]: it never mutates
//! the message and has no side effects. Problems are reported at three
//! levels:
//!
//! - **Fatal** errors mean the message cannot be processed at all (no usable
//!   message type, a malformed segment id).
//! - **Error** severity marks a rule violation in an otherwise well-formed
//!   message (a missing required field or segment, an unparseable date). The
//!   outcome is invalid but the message can still be mapped.
//! - **Warnings** are advisory and never block processing; where a value is
//!   deprecated but still understood, the warning carries the recommended
//!   replacement.

use hl7::{timestamp, ParsedMessage, Segment};
use serde::Serialize;

/// Severity of a validation error. Warnings are a separate type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Error,
    Fatal,
}

/// A single rule violation.
#[derive(Clone, Debug, Serialize)]
pub struct ValidationError {
    pub code: String,
    pub message: String,
    pub severity: Severity,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub segment: Option<String>,
    /// HL7 name of the offending field, e.g. "Message Control ID".
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    /// Location pointer in segment-index form, e.g. "MSH-10".
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actual: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected: Option<String>,
}

/// An advisory finding. Never blocks processing.
#[derive(Clone, Debug, Serialize)]
pub struct ValidationWarning {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub segment: Option<String>,
    /// HL7 name of the field the advice concerns.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    /// Location pointer in segment-index form, e.g. "PID-8".
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    /// The value senders should use instead, when one exists.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recommended: Option<String>,
}

/// The result of validating one message.
#[derive(Clone, Debug, Default, Serialize)]
pub struct ValidationOutcome {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    pub errors: Vec<ValidationError>,
    pub warnings: Vec<ValidationWarning>,
}

impl ValidationOutcome {
    /// A message is valid when it produced no errors; warnings don't count.
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn has_fatal(&self) -> bool {
        self.errors.iter().any(|e| e.severity == Severity::Fatal)
    }

    /// An outcome carrying a single fatal error, used when the message never
    /// made it past tokenization.
    pub fn fatal(code: &str, message: impl Into<String>) -> Self {
        ValidationOutcome {
            errors: vec![ValidationError {
                code: code.to_owned(),
                message: message.into(),
                severity: Severity::Fatal,
                segment: None,
                field: None,
                location: None,
                actual: None,
                expected: None,
            }],
            ..ValidationOutcome::default()
        }
    }

    fn error(
        &mut self,
        code: &str,
        message: String,
        segment: &str,
        field: Option<&str>,
        location: Option<String>,
    ) {
        self.errors.push(ValidationError {
            code: code.to_owned(),
            message,
            severity: Severity::Error,
            segment: Some(segment.to_owned()),
            field: field.map(str::to_owned),
            location,
            actual: None,
            expected: None,
        });
    }

    fn warn(
        &mut self,
        code: &str,
        message: String,
        segment: &str,
        field: Option<&str>,
        location: Option<String>,
    ) {
        self.warnings.push(ValidationWarning {
            code: code.to_owned(),
            message,
            segment: Some(segment.to_owned()),
            field: field.map(str::to_owned),
            location,
            recommended: None,
        });
    }
}

/// Structural rules for one supported message type.
struct MessageRules {
    message_type: &'static str,
    required_segments: &'static [&'static str],
}

const RULES: &[MessageRules] = &[
    MessageRules {
        message_type: "ADT",
        required_segments: &["PID"],
    },
    MessageRules {
        message_type: "ORM",
        required_segments: &["ORC"],
    },
    MessageRules {
        message_type: "ORU",
        required_segments: &["OBX"],
    },
];

/// MSH fields every message must carry, with their HL7 names.
const MSH_REQUIRED: &[(usize, &str)] = &[
    (1, "Field Separator"),
    (2, "Encoding Characters"),
    (3, "Sending Application"),
    (4, "Sending Facility"),
    (5, "Receiving Application"),
    (6, "Receiving Facility"),
    (7, "Date/Time of Message"),
    (9, "Message Type"),
    (10, "Message Control ID"),
    (11, "Processing ID"),
    (12, "Version ID"),
];

const VALID_SEX_CODES: &[&str] = &["M", "F", "O", "U", "A", "N"];
const MAX_CONTROL_ID_LENGTH: usize = 20;

/// Validates a tokenized message against the structural rules for its type.
pub fn validate(message: &ParsedMessage) -> ValidationOutcome {
    let mut outcome = ValidationOutcome::default();

    let Some(msh) = message.segment("MSH") else {
        return ValidationOutcome::fatal("MISSING_MSH", "message has no MSH header segment");
    };

    check_segment_shapes(message, &mut outcome);
    check_msh(msh, &mut outcome);

    outcome.version = msh.field_value(12).map(str::to_owned);
    let message_type = msh.component_value(9, 1).map(str::to_owned);
    outcome.message_type = message_type.clone();

    match message_type.as_deref() {
        None => outcome.errors.push(ValidationError {
            code: "MISSING_MESSAGE_TYPE".to_owned(),
            message: "MSH-9 carries no message type; the message cannot be routed".to_owned(),
            severity: Severity::Fatal,
            segment: Some("MSH".to_owned()),
            field: Some("Message Type".to_owned()),
            location: Some("MSH-9".to_owned()),
            actual: None,
            expected: None,
        }),
        Some(message_type) => match RULES.iter().find(|r| r.message_type == message_type) {
            None => outcome.errors.push(ValidationError {
                code: "UNSUPPORTED_MESSAGE_TYPE".to_owned(),
                message: format!("message type '{message_type}' is not supported"),
                severity: Severity::Fatal,
                segment: Some("MSH".to_owned()),
                field: Some("Message Type".to_owned()),
                location: Some("MSH-9".to_owned()),
                actual: Some(message_type.to_owned()),
                expected: Some("ADT, ORM, ORU".to_owned()),
            }),
            Some(rules) => apply_rules(message, rules, &mut outcome),
        },
    }

    tracing::debug!(
        message_type = outcome.message_type.as_deref().unwrap_or("?"),
        errors = outcome.errors.len(),
        warnings = outcome.warnings.len(),
        "validated message"
    );
    outcome
}

/// Every segment id must be three ASCII alphanumerics; a named segment with
/// no fields at all is a truncation.
fn check_segment_shapes(message: &ParsedMessage, outcome: &mut ValidationOutcome) {
    for segment in message.segments() {
        let id = segment.id();
        if id.len() != 3 || !id.bytes().all(|b| b.is_ascii_alphanumeric()) {
            outcome.errors.push(ValidationError {
                code: "MALFORMED_SEGMENT_ID".to_owned(),
                message: format!("'{id}' is not a valid segment id"),
                severity: Severity::Fatal,
                segment: Some(id.to_owned()),
                field: None,
                location: None,
                actual: Some(id.to_owned()),
                expected: None,
            });
        } else if id != "MSH" && segment.field_count() == 0 {
            outcome.error(
                "TRUNCATED_SEGMENT",
                format!("segment {id} carries no fields"),
                id,
                None,
                None,
            );
        }
    }
}

fn check_msh(msh: &Segment, outcome: &mut ValidationOutcome) {
    for &(index, name) in MSH_REQUIRED {
        if msh.field_value(index).is_none() {
            outcome.error(
                "REQUIRED_FIELD_MISSING",
                format!("MSH-{index} ({name}) is required"),
                "MSH",
                Some(name),
                Some(format!("MSH-{index}")),
            );
        }
    }

    if let Some(ts) = msh.field_value(7) {
        if timestamp::parse_datetime(ts).is_none() {
            outcome.error(
                "INVALID_DATETIME",
                format!("MSH-7 value '{ts}' is not a valid HL7 timestamp"),
                "MSH",
                Some("Date/Time of Message"),
                Some("MSH-7".to_owned()),
            );
        }
    }

    if let Some(version) = msh.field_value(12) {
        if !version.starts_with("2.") {
            outcome.warn(
                "UNSUPPORTED_VERSION",
                format!("HL7 version '{version}' is outside the 2.x family"),
                "MSH",
                Some("Version ID"),
                Some("MSH-12".to_owned()),
            );
        }
    }

    if let Some(processing_id) = msh.field_value(11) {
        if !matches!(processing_id, "P" | "D" | "T") {
            outcome.warn(
                "NONSTANDARD_PROCESSING_ID",
                format!("MSH-11 value '{processing_id}' is not one of P, D, T"),
                "MSH",
                Some("Processing ID"),
                Some("MSH-11".to_owned()),
            );
        }
    }

    if let (Some(sender), Some(receiver)) = (msh.field_value(3), msh.field_value(5)) {
        if sender == receiver {
            outcome.warn(
                "SAME_APPLICATION",
                format!("sending and receiving application are both '{sender}'"),
                "MSH",
                Some("Sending Application"),
                Some("MSH-3".to_owned()),
            );
        }
    }

    if let Some(control_id) = msh.field_value(10) {
        if control_id.len() > MAX_CONTROL_ID_LENGTH {
            outcome.warn(
                "CONTROL_ID_LENGTH",
                format!(
                    "control id is {} characters, longer than the conventional {MAX_CONTROL_ID_LENGTH}",
                    control_id.len()
                ),
                "MSH",
                Some("Message Control ID"),
                Some("MSH-10".to_owned()),
            );
        }
    }
}

fn apply_rules(message: &ParsedMessage, rules: &MessageRules, outcome: &mut ValidationOutcome) {
    for &required in rules.required_segments {
        if message.segment(required).is_none() {
            outcome.error(
                "REQUIRED_SEGMENT_MISSING",
                format!(
                    "{} messages must carry a {required} segment",
                    rules.message_type
                ),
                required,
                None,
                None,
            );
        }
    }

    if let Some(pid) = message.segment("PID") {
        check_pid(pid, outcome);
    }
}

fn check_pid(pid: &Segment, outcome: &mut ValidationOutcome) {
    if pid.component_value(3, 1).is_none() {
        outcome.error(
            "REQUIRED_FIELD_MISSING",
            "PID-3 (Patient Identifier List) is required".to_owned(),
            "PID",
            Some("Patient Identifier List"),
            Some("PID-3".to_owned()),
        );
    }

    if let Some(dob) = pid.field_value(7) {
        if timestamp::parse_date(dob).is_none() {
            outcome.error(
                "INVALID_DATE",
                format!("PID-7 value '{dob}' is not a valid date of birth"),
                "PID",
                Some("Date/Time of Birth"),
                Some("PID-7".to_owned()),
            );
        }
    }

    if let Some(sex) = pid.field_value(8) {
        if !VALID_SEX_CODES.contains(&sex) {
            outcome.errors.push(ValidationError {
                code: "INVALID_CODE".to_owned(),
                message: format!("PID-8 value '{sex}' is not a known administrative sex code"),
                severity: Severity::Error,
                segment: Some("PID".to_owned()),
                field: Some("Administrative Sex".to_owned()),
                location: Some("PID-8".to_owned()),
                actual: Some(sex.to_owned()),
                expected: Some(VALID_SEX_CODES.join(", ")),
            });
        } else if sex == "A" {
            // Still parseable, but senders should move to "O".
            outcome.warnings.push(ValidationWarning {
                code: "DEPRECATED_VALUE".to_owned(),
                message: "PID-8 value 'A' (ambiguous) is deprecated".to_owned(),
                segment: Some("PID".to_owned()),
                field: Some("Administrative Sex".to_owned()),
                location: Some("PID-8".to_owned()),
                recommended: Some("O".to_owned()),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(raw: &str) -> ParsedMessage {
        ParsedMessage::parse(raw).expect("tokenize")
    }

    const VALID_ADT: &str = "MSH|^~\\&|EHR|HOSP|BRIDGE|BRIDGE|20240101120000||ADT^A01|MSG001|P|2.5\r\
                             PID|1||123^^^HOSP^MR||SMITH^JOHN||19800115|M";

    #[test]
    fn accepts_a_well_formed_admission() {
        let outcome = validate(&parse(VALID_ADT));
        assert!(outcome.is_valid(), "unexpected errors: {:?}", outcome.errors);
        assert_eq!(outcome.message_type.as_deref(), Some("ADT"));
        assert_eq!(outcome.version.as_deref(), Some("2.5"));
        assert!(outcome.warnings.is_empty());
    }

    #[test]
    fn missing_required_segment_is_an_error_not_fatal() {
        let raw = "MSH|^~\\&|EHR|HOSP|BRIDGE|BRIDGE|20240101120000||ADT^A01|MSG001|P|2.5";
        let outcome = validate(&parse(raw));
        assert!(!outcome.is_valid());
        assert!(!outcome.has_fatal());
        assert_eq!(outcome.errors[0].code, "REQUIRED_SEGMENT_MISSING");
        assert_eq!(outcome.errors[0].segment.as_deref(), Some("PID"));
    }

    #[test]
    fn unsupported_message_type_is_fatal() {
        let raw = "MSH|^~\\&|EHR|HOSP|BRIDGE|BRIDGE|20240101120000||SIU^S12|MSG001|P|2.5";
        let outcome = validate(&parse(raw));
        assert!(outcome.has_fatal());
        let fatal = &outcome.errors[0];
        assert_eq!(fatal.code, "UNSUPPORTED_MESSAGE_TYPE");
        assert_eq!(fatal.expected.as_deref(), Some("ADT, ORM, ORU"));
    }

    #[test]
    fn missing_message_type_is_fatal() {
        let raw = "MSH|^~\\&|EHR|HOSP|BRIDGE|BRIDGE|20240101120000|||MSG001|P|2.5";
        let outcome = validate(&parse(raw));
        assert!(outcome.has_fatal());
        assert!(outcome.errors.iter().any(|e| e.code == "MISSING_MESSAGE_TYPE"));
    }

    #[test]
    fn missing_msh_fields_are_reported_by_name() {
        // No control id (MSH-10) and no version (MSH-12).
        let raw = "MSH|^~\\&|EHR|HOSP|BRIDGE|BRIDGE|20240101120000||ADT^A01\r\
                   PID|1||123";
        let outcome = validate(&parse(raw));
        let codes: Vec<&str> = outcome.errors.iter().map(|e| e.code.as_str()).collect();
        assert!(codes.contains(&"REQUIRED_FIELD_MISSING"));
        assert!(outcome.errors.iter().any(|e| {
            e.location.as_deref() == Some("MSH-10")
                && e.field.as_deref() == Some("Message Control ID")
        }));
        assert!(outcome.errors.iter().any(|e| {
            e.location.as_deref() == Some("MSH-12") && e.field.as_deref() == Some("Version ID")
        }));
    }

    #[test]
    fn deprecated_sex_code_warns_with_replacement() {
        let raw = "MSH|^~\\&|EHR|HOSP|BRIDGE|BRIDGE|20240101120000||ADT^A01|MSG001|P|2.5\r\
                   PID|1||123||SMITH^JOHN||19800115|A";
        let outcome = validate(&parse(raw));
        assert!(outcome.is_valid());
        let warning = outcome
            .warnings
            .iter()
            .find(|w| w.code == "DEPRECATED_VALUE")
            .expect("deprecation warning");
        assert_eq!(warning.recommended.as_deref(), Some("O"));
        assert_eq!(warning.field.as_deref(), Some("Administrative Sex"));
        assert_eq!(warning.location.as_deref(), Some("PID-8"));
    }

    #[test]
    fn unknown_sex_code_is_an_error() {
        let raw = "MSH|^~\\&|EHR|HOSP|BRIDGE|BRIDGE|20240101120000||ADT^A01|MSG001|P|2.5\r\
                   PID|1||123||SMITH^JOHN||19800115|X";
        let outcome = validate(&parse(raw));
        let error = outcome
            .errors
            .iter()
            .find(|e| e.code == "INVALID_CODE")
            .expect("invalid code error");
        assert_eq!(error.actual.as_deref(), Some("X"));
        assert_eq!(error.severity, Severity::Error);
    }

    #[test]
    fn bad_dates_are_errors() {
        let raw = "MSH|^~\\&|EHR|HOSP|BRIDGE|BRIDGE|2024XX01||ADT^A01|MSG001|P|2.5\r\
                   PID|1||123||SMITH^JOHN||1980";
        let outcome = validate(&parse(raw));
        let codes: Vec<&str> = outcome.errors.iter().map(|e| e.code.as_str()).collect();
        assert!(codes.contains(&"INVALID_DATETIME"));
        assert!(codes.contains(&"INVALID_DATE"));
    }

    #[test]
    fn advisory_findings_do_not_invalidate() {
        // Same sending/receiving app, non-2.x version, odd processing id,
        // over-long control id: four warnings, zero errors.
        let raw = "MSH|^~\\&|BRIDGE|HOSP|BRIDGE|BRIDGE|20240101120000||ADT^A01|THIS-CONTROL-ID-IS-TOO-LONG|Q|3.0\r\
                   PID|1||123";
        let outcome = validate(&parse(raw));
        assert!(outcome.is_valid());
        let codes: Vec<&str> = outcome.warnings.iter().map(|w| w.code.as_str()).collect();
        assert!(codes.contains(&"SAME_APPLICATION"));
        assert!(codes.contains(&"UNSUPPORTED_VERSION"));
        assert!(codes.contains(&"NONSTANDARD_PROCESSING_ID"));
        assert!(codes.contains(&"CONTROL_ID_LENGTH"));
    }

    #[test]
    fn truncated_trailing_segment_is_an_error() {
        let raw = "MSH|^~\\&|EHR|HOSP|BRIDGE|BRIDGE|20240101120000||ADT^A01|MSG001|P|2.5\r\
                   PID|1||123\rPV1";
        let outcome = validate(&parse(raw));
        assert!(outcome
            .errors
            .iter()
            .any(|e| e.code == "TRUNCATED_SEGMENT" && e.segment.as_deref() == Some("PV1")));
        assert!(!outcome.has_fatal());
    }
}
