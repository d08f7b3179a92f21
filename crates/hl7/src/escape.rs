//! HL7 escape sequence decoding.
//!
//! Field content may contain delimiter literals wrapped in the declared escape
//! character: `\F\` for the field separator, `\S\` for the component separator,
//! `\T\` for the subcomponent separator, `\R\` for the repetition separator,
//! and `\E\` for the escape character itself (shown here with the conventional
//! `\` escape; the declared character is honoured).

use crate::Delimiters;

/// Decodes HL7 escape sequences in a tokenized value.
///
/// Unrecognized sequences are preserved verbatim, including their escape
/// characters, so that downstream consumers can still see the original
/// content. A dangling escape character at the end of the value is also
/// preserved rather than dropped.
pub fn decode(value: &str, delimiters: &Delimiters) -> String {
    if !value.contains(delimiters.escape) {
        return value.to_owned();
    }

    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars().peekable();

    while let Some(c) = chars.next() {
        if c != delimiters.escape {
            out.push(c);
            continue;
        }

        // Collect up to the closing escape character.
        let mut body = String::new();
        let mut closed = false;
        for inner in chars.by_ref() {
            if inner == delimiters.escape {
                closed = true;
                break;
            }
            body.push(inner);
        }

        if !closed {
            out.push(delimiters.escape);
            out.push_str(&body);
            break;
        }

        match body.as_str() {
            "F" => out.push(delimiters.field),
            "S" => out.push(delimiters.component),
            "T" => out.push(delimiters.subcomponent),
            "R" => out.push(delimiters.repetition),
            "E" => out.push(delimiters.escape),
            _ => {
                out.push(delimiters.escape);
                out.push_str(&body);
                out.push(delimiters.escape);
            }
        }
    }

    out
}
