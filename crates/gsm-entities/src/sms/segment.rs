use super::alphabet::{Alphabet, detect};

/// Body that still fits a single message
pub const GSM7_SINGLE_LIMIT: usize = 160;
pub const UCS2_SINGLE_LIMIT: usize = 140;
/// Per-part limits once a concatenation header is needed
pub const GSM7_PART_LIMIT: usize = 153;
pub const UCS2_PART_LIMIT: usize = 134;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmsPart {
    /// 1-based
    pub index: u16,
    pub total: u16,
    pub text: String,
}

/// Splits a body into the parts submitted to the engine.
///
/// Lengths are counted in UTF-8 bytes of the source text, which for 7-bit safe text equals
/// the septet count. A part never ends inside a code point.
pub fn segment(body: &str) -> (Alphabet, Vec<SmsPart>) {
    let alphabet = detect(body);
    let (single, per_part) = match alphabet {
        Alphabet::Gsm7 => (GSM7_SINGLE_LIMIT, GSM7_PART_LIMIT),
        Alphabet::Ucs2 => (UCS2_SINGLE_LIMIT, UCS2_PART_LIMIT),
    };

    let chunks = if body.len() <= single {
        vec![body]
    } else {
        split_at_boundaries(body, per_part)
    };

    let total = chunks.len() as u16;
    let parts = chunks
        .into_iter()
        .enumerate()
        .map(|(i, text)| SmsPart {
            index: i as u16 + 1,
            total,
            text: text.to_string(),
        })
        .collect();
    (alphabet, parts)
}

fn split_at_boundaries(body: &str, limit: usize) -> Vec<&str> {
    let mut chunks = Vec::new();
    let mut start = 0;
    let mut end = 0;
    for (pos, c) in body.char_indices() {
        let next = pos + c.len_utf8();
        if next - start > limit {
            chunks.push(&body[start..end]);
            start = end;
        }
        end = next;
    }
    if start < body.len() {
        chunks.push(&body[start..]);
    }
    chunks
}
