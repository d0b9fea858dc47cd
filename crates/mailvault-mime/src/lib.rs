//! # mailvault-mime
//!
//! Recovers a readable body from a message stored as raw MIME.
//!
//! The archive keeps parsed bodies in their own table, but older imports (and
//! some chat exports) only carry the original RFC 5322 bytes, optionally zlib
//! compressed. This crate turns those bytes back into text:
//!
//! - zlib inflation of the stored blob
//! - header parsing with folded continuation lines
//! - `Content-Type` parameters (boundary, charset)
//! - multipart traversal, nested to any depth
//! - Base64 and Quoted-Printable transfer decoding
//! - RFC 2047 encoded words in header values
//!
//! ## Example
//!
//! ```rust
//! use mailvault_mime::{Compression, extract_body_text};
//!
//! let raw = b"Subject: hi\r\nContent-Type: text/plain\r\n\r\nHello there\r\n";
//! let text = extract_body_text(raw, Compression::None)?;
//! assert_eq!(text, "Hello there");
//! # Ok::<(), mailvault_mime::Error>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod body;
mod content_type;
mod error;
mod header;

pub mod encoding;

pub use body::{Compression, MessageBody, extract_body_text, inflate};
pub use content_type::ContentType;
pub use error::{Error, Result};
pub use header::Headers;
