//! Error types for the recycle-lens library.
//!
//! A single [`LensError`] covers every failure the widget can hit. None of
//! them is fatal: each one is caught at the boundary where it happens
//! (camera, input, store, upload) and turned into status text through
//! [`LensError::user_message`], leaving the widget usable afterwards.
//!
//! The variants follow the three input sources the widget coordinates:
//!
//! * camera: [`LensError::Unsupported`], [`LensError::PermissionDenied`],
//!   [`LensError::DeviceError`], [`LensError::NoFrameAvailable`]
//! * upload: [`LensError::NoImageSelected`], [`LensError::Http`],
//!   [`LensError::Transport`], [`LensError::InvalidResponse`]
//! * persistence: [`LensError::Storage`]

use std::path::PathBuf;
use thiserror::Error;

/// Fallback text when a transport error carries no message of its own.
pub const UPLOAD_FAILED: &str = "Upload failed";

/// All errors returned by the recycle-lens library.
#[derive(Debug, Error)]
pub enum LensError {
    // ── Camera errors ─────────────────────────────────────────────────────
    /// Feature detection found no camera API on this platform.
    #[error("Camera not supported on this device.")]
    Unsupported,

    /// The camera API exists but the user (or policy) refused access.
    #[error("Could not access camera. Please allow camera permissions.")]
    PermissionDenied,

    /// The camera API exists but opening the stream failed for another reason.
    #[error("Camera error: {detail}")]
    DeviceError { detail: String },

    /// Capture was attempted before the stream decoded its first frame.
    #[error("No video frame available yet: {reason}")]
    NoFrameAvailable { reason: String },

    // ── Input errors ──────────────────────────────────────────────────────
    /// The selected file does not carry a recognised image type.
    #[error("'{path}' is not an image file")]
    UnsupportedFileType { path: PathBuf },

    /// Reading the selected file failed.
    #[error("Failed to read '{path}': {source}")]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// JPEG encoding of a captured frame failed.
    #[error("Failed to encode captured frame: {0}")]
    Encode(String),

    // ── Upload errors ─────────────────────────────────────────────────────
    /// Upload was requested with nothing to send.
    #[error("No image selected")]
    NoImageSelected,

    /// The endpoint answered with a non-2xx status.
    #[error("Server error: {status} {body}")]
    Http { status: u16, body: String },

    /// The request never completed (connection refused, reset, DNS, …).
    #[error("{0}")]
    Transport(String),

    /// A 2xx response whose body is not `{ "label", "confidence" }`.
    #[error("Invalid prediction response: {0}")]
    InvalidResponse(String),

    // ── Persistence errors ────────────────────────────────────────────────
    /// Reading or writing the durable preview slot failed.
    #[error("Storage error: {0}")]
    Storage(String),

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl LensError {
    /// Build a transport error, substituting the generic fallback when the
    /// underlying error renders as an empty string.
    pub fn transport(message: impl Into<String>) -> Self {
        let message = message.into();
        if message.trim().is_empty() {
            LensError::Transport(UPLOAD_FAILED.to_string())
        } else {
            LensError::Transport(message)
        }
    }

    /// Text shown in the widget's status regions.
    pub fn user_message(&self) -> String {
        self.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_error_display_carries_status_and_body() {
        let e = LensError::Http {
            status: 500,
            body: "oops".into(),
        };
        let msg = e.user_message();
        assert!(msg.contains("500"), "got: {msg}");
        assert!(msg.contains("oops"), "got: {msg}");
    }

    #[test]
    fn transport_falls_back_to_generic_message() {
        let e = LensError::transport("   ");
        assert_eq!(e.to_string(), UPLOAD_FAILED);

        let e = LensError::transport("connection refused");
        assert_eq!(e.to_string(), "connection refused");
    }

    #[test]
    fn no_image_selected_display() {
        assert_eq!(LensError::NoImageSelected.to_string(), "No image selected");
    }
}
