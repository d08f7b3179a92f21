//! Delimiter declaration handling.
//!
//! The first segment of every HL7 v2 message declares the characters used to
//! tokenize the rest of the message: the field separator immediately after
//! `MSH`, then MSH-2 carrying the component, repetition, escape, and
//! subcomponent characters in that order. All subsequent tokenization must use
//! these declared characters, never hard-coded ones.

use crate::{Hl7Error, Hl7Result};

/// The five delimiter characters declared by an MSH header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Delimiters {
    pub field: char,
    pub component: char,
    pub repetition: char,
    pub escape: char,
    pub subcomponent: char,
}

impl Delimiters {
    /// The conventional HL7 delimiter set: `|^~\&`.
    pub const STANDARD: Delimiters = Delimiters {
        field: '|',
        component: '^',
        repetition: '~',
        escape: '\\',
        subcomponent: '&',
    };

    /// Reads the delimiter declaration from the start of a raw message.
    ///
    /// Expects the message to begin with `MSH`, followed by the field
    /// separator, followed by the four encoding characters. The declaration is
    /// rejected when any of the five characters is missing or when the set
    /// contains duplicates: a message whose field separator doubles as its
    /// escape character cannot be tokenized unambiguously.
    pub fn from_header(raw: &str) -> Hl7Result<Self> {
        let trimmed = raw.trim_start_matches(['\r', '\n']);
        if trimmed.is_empty() {
            return Err(Hl7Error::EmptyMessage);
        }

        if !trimmed.starts_with("MSH") {
            let found: String = trimmed.chars().take(3).collect();
            return Err(Hl7Error::MissingHeader(found));
        }

        let mut chars = trimmed[3..].chars();
        let field = chars
            .next()
            .ok_or_else(|| Hl7Error::TruncatedHeader("no field separator after MSH".into()))?;

        let mut encoding = [None::<char>; 4];
        for slot in encoding.iter_mut() {
            match chars.next() {
                Some(c) if c != field => *slot = Some(c),
                // Hitting the field separator means MSH-2 ended early.
                Some(_) | None => {
                    return Err(Hl7Error::Delimiters(format!(
                        "MSH-2 must declare 4 encoding characters, found {}",
                        encoding.iter().filter(|s| s.is_some()).count()
                    )));
                }
            }
        }

        let delimiters = Delimiters {
            field,
            component: encoding[0].unwrap_or_default(),
            repetition: encoding[1].unwrap_or_default(),
            escape: encoding[2].unwrap_or_default(),
            subcomponent: encoding[3].unwrap_or_default(),
        };

        delimiters.ensure_distinct()?;
        Ok(delimiters)
    }

    /// The raw MSH-2 value implied by this delimiter set.
    pub fn encoding_characters(&self) -> String {
        [self.component, self.repetition, self.escape, self.subcomponent]
            .iter()
            .collect()
    }

    fn ensure_distinct(&self) -> Hl7Result<()> {
        let set = [
            self.field,
            self.component,
            self.repetition,
            self.escape,
            self.subcomponent,
        ];
        for (i, a) in set.iter().enumerate() {
            for b in set.iter().skip(i + 1) {
                if a == b {
                    return Err(Hl7Error::Delimiters(format!(
                        "delimiter characters must be distinct, '{a}' is declared twice"
                    )));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_standard_declaration() {
        let delimiters = Delimiters::from_header("MSH|^~\\&|EHR|HOSP").expect("valid header");
        assert_eq!(delimiters, Delimiters::STANDARD);
        assert_eq!(delimiters.encoding_characters(), "^~\\&");
    }

    #[test]
    fn reads_nonstandard_declaration() {
        let delimiters = Delimiters::from_header("MSH#!$%*#APP").expect("valid header");
        assert_eq!(delimiters.field, '#');
        assert_eq!(delimiters.component, '!');
        assert_eq!(delimiters.repetition, '$');
        assert_eq!(delimiters.escape, '%');
        assert_eq!(delimiters.subcomponent, '*');
    }

    #[test]
    fn rejects_empty_message() {
        assert!(matches!(
            Delimiters::from_header(""),
            Err(Hl7Error::EmptyMessage)
        ));
        assert!(matches!(
            Delimiters::from_header("\r\n"),
            Err(Hl7Error::EmptyMessage)
        ));
    }

    #[test]
    fn rejects_non_msh_start() {
        let err = Delimiters::from_header("PID|1|").expect_err("should reject");
        match err {
            Hl7Error::MissingHeader(found) => assert_eq!(found, "PID"),
            other => panic!("expected MissingHeader, got {other:?}"),
        }
    }

    #[test]
    fn rejects_short_encoding_declaration() {
        // Only two encoding characters before the next field separator.
        let err = Delimiters::from_header("MSH|^~|EHR").expect_err("should reject");
        assert!(matches!(err, Hl7Error::Delimiters(_)));
    }

    #[test]
    fn rejects_duplicate_delimiters() {
        let err = Delimiters::from_header("MSH|^~^&|EHR").expect_err("should reject");
        match err {
            Hl7Error::Delimiters(msg) => assert!(msg.contains("distinct")),
            other => panic!("expected Delimiters, got {other:?}"),
        }
    }

    #[test]
    fn rejects_header_with_nothing_after_msh() {
        assert!(matches!(
            Delimiters::from_header("MSH"),
            Err(Hl7Error::TruncatedHeader(_))
        ));
    }
}
