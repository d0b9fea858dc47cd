//! Body extraction from raw stored messages.

use std::io::Read;

use flate2::read::ZlibDecoder;

use crate::content_type::ContentType;
use crate::encoding::{TransferEncoding, decode_charset};
use crate::error::{Error, Result};
use crate::header::Headers;

/// Nesting limit for multipart traversal.
const MAX_DEPTH: usize = 16;

/// Compression applied to a stored raw message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    /// Stored as-is.
    None,
    /// zlib stream (RFC 1950).
    Zlib,
}

impl Compression {
    /// Parses the compression tag stored next to the blob.
    ///
    /// A missing or empty tag means uncompressed.
    ///
    /// # Errors
    ///
    /// Returns an error for unknown tags.
    pub fn parse(tag: Option<&str>) -> Result<Self> {
        match tag.map(str::trim) {
            None | Some("") => Ok(Self::None),
            Some(t) if t.eq_ignore_ascii_case("zlib") => Ok(Self::Zlib),
            Some(other) => Err(Error::UnsupportedCompression(other.to_string())),
        }
    }
}

/// Inflates a zlib-compressed blob.
///
/// # Errors
///
/// Returns an error if the stream is corrupt or truncated.
pub fn inflate(compressed: &[u8]) -> Result<Vec<u8>> {
    let mut decoder = ZlibDecoder::new(compressed);
    let mut out = Vec::new();
    decoder.read_to_end(&mut out)?;
    Ok(out)
}

/// Readable bodies found in a message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageBody {
    /// First inline text/plain part.
    pub text: Option<String>,
    /// First inline text/html part.
    pub html: Option<String>,
    /// Top-level `Subject` with encoded words decoded.
    pub subject: Option<String>,
}

impl MessageBody {
    /// Parses a complete RFC 5322 message and collects its bodies.
    ///
    /// Parts marked `Content-Disposition: attachment` are skipped.
    ///
    /// # Errors
    ///
    /// Returns an error if a multipart entity has no boundary or a
    /// Base64 body is malformed.
    pub fn parse(raw: &[u8]) -> Result<Self> {
        let (headers, _) = Headers::split(raw);
        let mut body = Self {
            subject: headers.get_decoded("subject").map(|s| s.trim().to_string()),
            ..Self::default()
        };
        body.visit(raw, 0)?;
        Ok(body)
    }

    /// Parses a stored raw message, inflating it first when compressed.
    ///
    /// # Errors
    ///
    /// Returns an error if inflation fails or the MIME structure is unusable.
    pub fn from_stored(raw: &[u8], compression: Compression) -> Result<Self> {
        match compression {
            Compression::None => Self::parse(raw),
            Compression::Zlib => Self::parse(&inflate(raw)?),
        }
    }

    fn visit(&mut self, entity: &[u8], depth: usize) -> Result<()> {
        if depth > MAX_DEPTH || (self.text.is_some() && self.html.is_some()) {
            return Ok(());
        }

        let (headers, content) = Headers::split(entity);
        let content_type = headers
            .get("content-type")
            .and_then(|v| ContentType::parse(v).ok())
            .unwrap_or_default();

        if content_type.is_multipart() {
            let boundary = content_type.boundary().ok_or(Error::MissingBoundary)?;
            for part in split_multipart(content, boundary) {
                self.visit(part, depth + 1)?;
            }
            return Ok(());
        }

        let is_attachment = headers
            .get("content-disposition")
            .is_some_and(|d| d.trim_start().to_ascii_lowercase().starts_with("attachment"));
        if is_attachment {
            return Ok(());
        }

        let slot = if content_type.is("text", "plain") {
            &mut self.text
        } else if content_type.is("text", "html") {
            &mut self.html
        } else {
            return Ok(());
        };
        if slot.is_some() {
            return Ok(());
        }

        let encoding = headers
            .get("content-transfer-encoding")
            .map_or(TransferEncoding::SevenBit, TransferEncoding::parse);
        let decoded = encoding.decode(content)?;
        *slot = Some(decode_charset(&decoded, content_type.charset()));
        Ok(())
    }

    /// Best readable text: the plain body, else the HTML body rendered
    /// to Markdown, else empty.
    #[must_use]
    pub fn into_text(self) -> String {
        if let Some(text) = self.text.filter(|t| !t.trim().is_empty()) {
            return text.trim().to_string();
        }
        self.html
            .map(|html| htmd::convert(&html).unwrap_or(html))
            .map(|text| text.trim().to_string())
            .unwrap_or_default()
    }
}

/// Recovers readable body text from a stored raw message.
///
/// # Errors
///
/// Returns an error if inflation fails or the MIME structure is unusable.
pub fn extract_body_text(raw: &[u8], compression: Compression) -> Result<String> {
    Ok(MessageBody::from_stored(raw, compression)?.into_text())
}

/// Splits a multipart body into its parts.
///
/// The line break before a delimiter belongs to the delimiter, so it is
/// trimmed from the preceding part. Preamble and epilogue are dropped.
fn split_multipart<'a>(body: &'a [u8], boundary: &str) -> Vec<&'a [u8]> {
    let delimiter = format!("--{boundary}");
    let closing = format!("--{boundary}--");

    let mut parts = Vec::new();
    let mut part_start: Option<usize> = None;
    let mut offset = 0;

    for line in body.split_inclusive(|&b| b == b'\n') {
        let trimmed = trim_line_end(line);
        let is_closing = trimmed == closing.as_bytes();
        if is_closing || trimmed == delimiter.as_bytes() {
            if let Some(start) = part_start.take() {
                parts.push(trim_trailing_newline(&body[start..offset]));
            }
            if is_closing {
                return parts;
            }
            part_start = Some(offset + line.len());
        }
        offset += line.len();
    }

    // Unterminated multipart: keep the last open part.
    if let Some(start) = part_start {
        parts.push(&body[start..]);
    }
    parts
}

fn trim_line_end(line: &[u8]) -> &[u8] {
    let end = line
        .iter()
        .rposition(|b| !b.is_ascii_whitespace())
        .map_or(0, |i| i + 1);
    &line[..end]
}

fn trim_trailing_newline(part: &[u8]) -> &[u8] {
    part.strip_suffix(b"\r\n")
        .or_else(|| part.strip_suffix(b"\n"))
        .unwrap_or(part)
}
