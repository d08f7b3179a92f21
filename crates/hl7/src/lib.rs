//! HL7 v2 wire/boundary support.
//!
//! This crate is responsible for tokenizing raw pipe-delimited HL7 v2 messages
//! into an ordered structure of segments, fields, repetitions, and components.
//! It honours the delimiter characters declared in the MSH header rather than
//! assuming the conventional `|^~\&` set, and decodes HL7 escape sequences in
//! field content.
//!
//! Clinical meaning lives in `bridge-core`. This crate handles wire structure
//! only: it does not know about message types, rule sets, or FHIR.

pub mod delimiters;
pub mod escape;
pub mod message;
pub mod timestamp;

pub use delimiters::Delimiters;
pub use message::{Field, ParsedMessage, Repetition, Segment};

/// Errors returned by the `hl7` boundary crate.
///
/// All variants are fatal to parsing: a message that cannot declare its own
/// delimiters cannot be tokenized at all. Truncated trailing segments are not
/// errors; they parse to segments with fewer fields and are left to structural
/// validation.
#[derive(Debug, thiserror::Error)]
pub enum Hl7Error {
    #[error("message is empty")]
    EmptyMessage,

    #[error("message must start with an MSH segment, found '{0}'")]
    MissingHeader(String),

    #[error("MSH header is truncated: {0}")]
    TruncatedHeader(String),

    #[error("invalid delimiter declaration: {0}")]
    Delimiters(String),
}

/// Type alias for Results that can fail with an [`Hl7Error`].
pub type Hl7Result<T> = Result<T, Hl7Error>;
