//! Image payload types: [`RawImage`] and its [`PreviewEncoding`].
//!
//! `RawImage` is what gets uploaded. `PreviewEncoding` is a base64 data URI
//! derived from it, used for display and for the durable storage slot.
//! The two are always replaced together; the data URI is never turned back
//! into an upload payload by the widget itself.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// MIME type used when a data URI header does not name one.
pub const FALLBACK_MIME: &str = "image/jpeg";

/// `data:<mime>[;param]*,<payload>`
static DATA_URI: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)^data:(?P<mime>[^;,]*)(?P<params>(?:;[^;,]*)*),(?P<payload>.*)$")
        .unwrap()
});

/// Acquired image bytes plus the metadata sent alongside them.
#[derive(Clone, PartialEq, Eq)]
pub struct RawImage {
    pub bytes: Vec<u8>,
    pub mime: String,
    pub filename: String,
}

impl RawImage {
    pub fn new(bytes: Vec<u8>, mime: impl Into<String>, filename: impl Into<String>) -> Self {
        Self {
            bytes,
            mime: mime.into(),
            filename: filename.into(),
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl fmt::Debug for RawImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawImage")
            .field("filename", &self.filename)
            .field("mime", &self.mime)
            .field("len", &self.bytes.len())
            .finish()
    }
}

/// A self-describing `data:` URI holding a base64 copy of an image.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PreviewEncoding(String);

impl PreviewEncoding {
    /// Encode `raw` as `data:<mime>;base64,<payload>`.
    pub fn from_raw(raw: &RawImage) -> Self {
        let mime = if raw.mime.is_empty() {
            FALLBACK_MIME
        } else {
            raw.mime.as_str()
        };
        Self(format!("data:{};base64,{}", mime, STANDARD.encode(&raw.bytes)))
    }

    /// Accept a stored string only if it is a base64 data URI.
    pub fn parse(value: impl Into<String>) -> Option<Self> {
        let value = value.into();
        let caps = DATA_URI.captures(&value)?;
        let base64 = caps["params"]
            .split(';')
            .any(|p| p.eq_ignore_ascii_case("base64"));
        if !base64 {
            return None;
        }
        Some(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// MIME type named in the header, or [`FALLBACK_MIME`].
    pub fn mime(&self) -> &str {
        DATA_URI
            .captures(&self.0)
            .and_then(|c| c.name("mime"))
            .map(|m| m.as_str())
            .filter(|m| !m.is_empty())
            .unwrap_or(FALLBACK_MIME)
    }

    /// Decode the payload back to bytes. Used for display and tests only.
    pub fn decode(&self) -> Result<Vec<u8>, base64::DecodeError> {
        let payload = DATA_URI
            .captures(&self.0)
            .and_then(|c| c.name("payload"))
            .map(|m| m.as_str())
            .unwrap_or_default();
        STANDARD.decode(payload)
    }
}

impl fmt::Debug for PreviewEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let head: String = self.0.chars().take(48).collect();
        write!(f, "PreviewEncoding({}… {} chars)", head, self.0.len())
    }
}

/// MIME type of an image file judged by its extension, or `None` when the
/// file is not a recognised image type.
pub fn detect_image_mime(path: &Path) -> Option<&'static str> {
    image::ImageFormat::from_path(path)
        .ok()
        .map(|format| format.to_mime_type())
}
