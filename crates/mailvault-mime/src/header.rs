//! Header block parsing for stored messages.

use std::collections::HashMap;

use crate::encoding::decode_encoded_words;

/// Parsed header block of a MIME entity.
///
/// Names are matched case-insensitively; repeated headers keep their order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    fields: HashMap<String, Vec<String>>,
}

impl Headers {
    /// Returns the first value of a header.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .get(&name.to_ascii_lowercase())
            .and_then(|values| values.first())
            .map(String::as_str)
    }

    /// Returns the first value of a header with RFC 2047 encoded words decoded.
    ///
    /// Undecodable words are kept verbatim.
    #[must_use]
    pub fn get_decoded(&self, name: &str) -> Option<String> {
        self.get(name).map(decode_encoded_words)
    }

    /// Number of distinct header names.
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether the block held no headers at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Splits an entity into its header block and body.
    ///
    /// The header block ends at the first empty line (`\r\n\r\n` or `\n\n`).
    /// An entity with no blank line is treated as headers only.
    #[must_use]
    pub fn split(entity: &[u8]) -> (Self, &[u8]) {
        let (head, body) = split_at_blank_line(entity);
        (Self::parse(&String::from_utf8_lossy(head)), body)
    }

    /// Parses a header block, unfolding continuation lines.
    ///
    /// Lines that are neither continuations nor `name: value` pairs (mbox
    /// `From ` separators, stray garbage) are skipped.
    #[must_use]
    pub fn parse(text: &str) -> Self {
        let mut headers = Self::default();
        let mut current: Option<(String, String)> = None;

        for line in text.lines() {
            let line = line.trim_end_matches('\r');
            if line.is_empty() {
                break;
            }

            if line.starts_with(' ') || line.starts_with('\t') {
                if let Some((_, value)) = current.as_mut() {
                    value.push(' ');
                    value.push_str(line.trim());
                }
                continue;
            }

            if let Some((name, value)) = current.take() {
                headers.insert(name, value);
            }

            if line.starts_with("From ") {
                continue;
            }

            if let Some((name, value)) = line.split_once(':') {
                current = Some((name.trim().to_string(), value.trim().to_string()));
            }
        }

        if let Some((name, value)) = current {
            headers.insert(name, value);
        }

        headers
    }

    fn insert(&mut self, name: String, value: String) {
        self.fields
            .entry(name.to_ascii_lowercase())
            .or_default()
            .push(value);
    }
}

fn split_at_blank_line(entity: &[u8]) -> (&[u8], &[u8]) {
    // A part may open with the blank line itself when it has no headers.
    if let Some(body) = entity.strip_prefix(b"\r\n") {
        return (&[], body);
    }
    if let Some(body) = entity.strip_prefix(b"\n") {
        return (&[], body);
    }

    let crlf = find(entity, b"\r\n\r\n").map(|i| (i, 4));
    let lf = find(entity, b"\n\n").map(|i| (i, 2));

    let split = match (crlf, lf) {
        (Some(a), Some(b)) => Some(if a.0 <= b.0 { a } else { b }),
        (a, b) => a.or(b),
    };

    match split {
        Some((at, sep)) => (&entity[..at], &entity[at + sep..]),
        None => (entity, &[]),
    }
}

pub(crate) fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}
