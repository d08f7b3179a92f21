//! Message tokenization.
//!
//! A raw message is an ordered sequence of segments (one per line), each an
//! ordered sequence of fields, each field potentially a repeated list of
//! component groups. Tokenization uses the delimiters declared by the MSH
//! header and decodes escape sequences in component values.
//!
//! Field numbering follows HL7 convention: `segment.field(1)` is the first
//! field after the segment id. For MSH the field separator itself is MSH-1 and
//! the encoding characters are MSH-2, so `MSH|^~\&|EHR|...` yields `EHR` for
//! `field(3)`.

use crate::{escape, Delimiters, Hl7Result};

/// A single repetition of a field: an ordered list of decoded components.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Repetition {
    components: Vec<String>,
}

impl Repetition {
    /// Returns the 1-based component, or `None` when absent.
    pub fn component(&self, index: usize) -> Option<&str> {
        if index == 0 {
            return None;
        }
        self.components.get(index - 1).map(String::as_str)
    }

    /// The first component, or the empty string when the repetition is empty.
    pub fn value(&self) -> &str {
        self.components.first().map(String::as_str).unwrap_or("")
    }

    pub fn components(&self) -> &[String] {
        &self.components
    }
}

/// A field: one or more repetitions separated by the repetition character.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    repetitions: Vec<Repetition>,
}

impl Field {
    fn parse(raw: &str, delimiters: &Delimiters) -> Self {
        let repetitions = raw
            .split(delimiters.repetition)
            .map(|rep| Repetition {
                components: rep
                    .split(delimiters.component)
                    .map(|c| escape::decode(c, delimiters))
                    .collect(),
            })
            .collect();
        Field { repetitions }
    }

    fn literal(value: &str) -> Self {
        Field {
            repetitions: vec![Repetition {
                components: vec![value.to_owned()],
            }],
        }
    }

    pub fn repetitions(&self) -> &[Repetition] {
        &self.repetitions
    }

    /// The first repetition, which exists for every parsed field.
    pub fn first(&self) -> &Repetition {
        &self.repetitions[0]
    }

    /// First component of the first repetition.
    pub fn value(&self) -> &str {
        self.first().value()
    }

    /// 1-based component access on the first repetition.
    pub fn component(&self, index: usize) -> Option<&str> {
        self.first().component(index)
    }

    /// True when every component of every repetition is empty.
    pub fn is_empty(&self) -> bool {
        self.repetitions
            .iter()
            .all(|rep| rep.components.iter().all(|c| c.is_empty()))
    }
}

/// A segment: an id (conventionally three characters) and its fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    id: String,
    fields: Vec<Field>,
}

impl Segment {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Returns the 1-based field, or `None` when the segment is too short.
    pub fn field(&self, index: usize) -> Option<&Field> {
        if index == 0 {
            return None;
        }
        self.fields.get(index - 1)
    }

    /// Convenience accessor: the first-repetition value of a field, or `None`
    /// when the field is absent or entirely empty.
    pub fn field_value(&self, index: usize) -> Option<&str> {
        self.field(index)
            .filter(|f| !f.is_empty())
            .map(Field::value)
    }

    /// Convenience accessor for `SEG-n-m` style component paths.
    pub fn component_value(&self, field: usize, component: usize) -> Option<&str> {
        self.field(field)
            .and_then(|f| f.component(component))
            .filter(|v| !v.is_empty())
    }

    pub fn field_count(&self) -> usize {
        self.fields.len()
    }
}

/// A tokenized message: the declared delimiters plus the ordered segments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedMessage {
    delimiters: Delimiters,
    segments: Vec<Segment>,
}

impl ParsedMessage {
    /// Tokenizes a raw message.
    ///
    /// Fails only when the delimiter declaration is missing or malformed; a
    /// truncated trailing segment tokenizes to a segment with fewer fields and
    /// is left for structural validation to report.
    pub fn parse(raw: &str) -> Hl7Result<Self> {
        let delimiters = Delimiters::from_header(raw)?;

        let segments = raw
            .split(['\r', '\n'])
            .map(str::trim_end)
            .filter(|line| !line.is_empty())
            .map(|line| Self::parse_segment(line, &delimiters))
            .collect::<Vec<_>>();

        tracing::debug!(
            segment_count = segments.len(),
            "tokenized HL7 message"
        );

        Ok(ParsedMessage {
            delimiters,
            segments,
        })
    }

    fn parse_segment(line: &str, delimiters: &Delimiters) -> Segment {
        let mut parts = line.split(delimiters.field);
        let id = parts.next().unwrap_or("").to_owned();

        let mut fields = Vec::new();
        if id == "MSH" {
            // MSH-1 is the separator itself and MSH-2 the encoding characters;
            // neither goes through escape decoding.
            fields.push(Field::literal(&delimiters.field.to_string()));
            fields.push(Field::literal(&delimiters.encoding_characters()));
            parts.next(); // consume the raw MSH-2 token
        }
        fields.extend(parts.map(|raw| Field::parse(raw, delimiters)));

        Segment { id, fields }
    }

    pub fn delimiters(&self) -> &Delimiters {
        &self.delimiters
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// The first segment with the given id, if any.
    pub fn segment(&self, id: &str) -> Option<&Segment> {
        self.segments.iter().find(|s| s.id() == id)
    }

    /// All segments with the given id, in message order.
    pub fn segments_named<'a>(&'a self, id: &'a str) -> impl Iterator<Item = &'a Segment> {
        self.segments.iter().filter(move |s| s.id() == id)
    }
}
