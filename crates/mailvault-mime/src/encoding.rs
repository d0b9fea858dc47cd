//! Transfer and header decoding.
//!
//! Decoding is lenient throughout: stored messages come from many mailers
//! and a body with one bad escape is still worth showing.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use crate::error::{Error, Result};

/// Content-Transfer-Encoding of an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferEncoding {
    /// 7-bit ASCII.
    SevenBit,
    /// 8-bit text.
    EightBit,
    /// Base64 encoding.
    Base64,
    /// Quoted-Printable encoding.
    QuotedPrintable,
    /// Binary (no encoding).
    Binary,
}

impl TransferEncoding {
    /// Parses transfer encoding from a header value.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "8bit" => Self::EightBit,
            "base64" => Self::Base64,
            "quoted-printable" => Self::QuotedPrintable,
            "binary" => Self::Binary,
            _ => Self::SevenBit,
        }
    }

    /// Decodes a body in this encoding.
    ///
    /// # Errors
    ///
    /// Returns an error if a Base64 body is malformed.
    pub fn decode(self, body: &[u8]) -> Result<Vec<u8>> {
        match self {
            Self::Base64 => decode_base64(body),
            Self::QuotedPrintable => Ok(decode_quoted_printable(body)),
            Self::SevenBit | Self::EightBit | Self::Binary => Ok(body.to_vec()),
        }
    }
}

/// Decodes Base64 data, ignoring embedded whitespace and line breaks.
///
/// # Errors
///
/// Returns an error if the input is not valid Base64.
pub fn decode_base64(data: &[u8]) -> Result<Vec<u8>> {
    let cleaned: Vec<u8> = data
        .iter()
        .copied()
        .filter(|b| !b.is_ascii_whitespace())
        .collect();
    STANDARD.decode(cleaned).map_err(Into::into)
}

/// Decodes Quoted-Printable bytes (RFC 2045).
///
/// Soft line breaks are removed. An `=` not followed by two hex digits is
/// kept as a literal character.
#[must_use]
pub fn decode_quoted_printable(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len());
    let mut i = 0;

    while i < data.len() {
        let byte = data[i];
        if byte != b'=' {
            out.push(byte);
            i += 1;
            continue;
        }

        let next = data.get(i + 1).copied();
        let after = data.get(i + 2).copied();
        match (next, after) {
            (Some(b'\r'), Some(b'\n')) => i += 3,
            (Some(b'\n'), _) => i += 2,
            _ => match next.and_then(hex_value).zip(after.and_then(hex_value)) {
                Some((hi, lo)) => {
                    out.push((hi << 4) | lo);
                    i += 3;
                }
                None => {
                    out.push(b'=');
                    i += 1;
                }
            },
        }
    }

    out
}

const fn hex_value(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}

/// Converts bytes in the named charset to a string.
///
/// UTF-8 and ASCII are decoded lossily; Latin-1 family charsets map each
/// byte to its code point. Unknown charsets fall back to lossy UTF-8.
#[must_use]
pub fn decode_charset(bytes: &[u8], charset: Option<&str>) -> String {
    let charset = charset.map(str::to_ascii_lowercase);
    match charset.as_deref() {
        Some("iso-8859-1" | "latin1" | "latin-1" | "windows-1252" | "cp1252") => {
            bytes.iter().map(|&b| char::from(b)).collect()
        }
        _ => String::from_utf8_lossy(bytes).into_owned(),
    }
}

/// Decodes a single RFC 2047 encoded word.
///
/// Format: `=?charset?encoding?encoded-text?=`
///
/// # Errors
///
/// Returns an error if the word is malformed or its encoding is unknown.
pub fn decode_rfc2047_word(word: &str) -> Result<String> {
    let inner = word
        .strip_prefix("=?")
        .and_then(|w| w.strip_suffix("?="))
        .ok_or_else(|| Error::InvalidEncoding(format!("not an encoded word: {word}")))?;

    let mut parts = inner.splitn(3, '?');
    let (Some(charset), Some(encoding), Some(text)) = (parts.next(), parts.next(), parts.next())
    else {
        return Err(Error::InvalidEncoding(format!("invalid RFC 2047 word: {word}")));
    };

    let bytes = match encoding.to_ascii_uppercase().as_str() {
        "B" => decode_base64(text.as_bytes())?,
        "Q" => decode_quoted_printable(text.replace('_', " ").as_bytes()),
        other => {
            return Err(Error::InvalidEncoding(format!("unknown encoding: {other}")));
        }
    };

    Ok(decode_charset(&bytes, Some(charset)))
}

/// Decodes every encoded word in a header value.
///
/// Whitespace between two adjacent encoded words is dropped, as RFC 2047
/// requires; words that fail to decode are kept verbatim.
#[must_use]
pub fn decode_encoded_words(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut rest = value;
    let mut last_was_word = false;

    while let Some(start) = rest.find("=?") {
        let Some(end) = find_word_end(&rest[start..]) else {
            break;
        };
        let before = &rest[..start];
        let word = &rest[start..start + end];

        match decode_rfc2047_word(word) {
            Ok(decoded) => {
                if !(last_was_word && before.trim().is_empty()) {
                    out.push_str(before);
                }
                out.push_str(&decoded);
                last_was_word = true;
            }
            Err(_) => {
                out.push_str(before);
                out.push_str(word);
                last_was_word = false;
            }
        }
        rest = &rest[start + end..];
    }

    out.push_str(rest);
    out
}

/// Byte length of the encoded word at the start of `s`, if complete.
fn find_word_end(s: &str) -> Option<usize> {
    // =?charset?X?text?= : skip the charset and encoding markers first
    let mut question_marks = 0;
    for (i, ch) in s.char_indices().skip(2) {
        if ch == '?' {
            question_marks += 1;
            if question_marks >= 3 && s[i..].starts_with("?=") {
                return Some(i + 2);
            }
        } else if ch.is_whitespace() {
            return None;
        }
    }
    None
}
