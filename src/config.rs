//! Configuration types for the image-acquisition widget.
//!
//! Every knob lives in [`WidgetConfig`], built via [`WidgetConfigBuilder`].
//! Defaults reproduce the stock deployment: a classifier listening on
//! `http://localhost:8000/predict`, the preview persisted under the
//! `uploadedImage` key, and captures encoded as `captured.jpg`.

use crate::error::LensError;
use serde::{Deserialize, Serialize};

/// Default classification endpoint base URL.
pub const DEFAULT_ENDPOINT: &str = "http://localhost:8000";

/// Default storage key for the persisted preview.
pub const DEFAULT_STORAGE_KEY: &str = "uploadedImage";

/// Configuration for an [`crate::widget::ImageWidget`].
///
/// # Example
/// ```rust
/// use recycle_lens::WidgetConfig;
///
/// let config = WidgetConfig::builder()
///     .endpoint("http://127.0.0.1:9000")
///     .jpeg_quality(80)
///     .build()
///     .unwrap();
/// assert_eq!(config.predict_url(), "http://127.0.0.1:9000/predict");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WidgetConfig {
    /// Base URL of the classification service. Default: `http://localhost:8000`.
    pub endpoint: String,

    /// Path of the prediction route, appended to `endpoint`. Default: `/predict`.
    pub predict_path: String,

    /// Multipart part name holding the image bytes. Default: `file`.
    pub upload_field: String,

    /// Key of the durable slot holding the preview. Default: `uploadedImage`.
    pub storage_key: String,

    /// Synthetic filename given to camera captures. Default: `captured.jpg`.
    pub capture_filename: String,

    /// Capture width when the source reports a zero width. Default: 640.
    pub fallback_width: u32,

    /// Capture height when the source reports a zero height. Default: 480.
    pub fallback_height: u32,

    /// JPEG quality for captured frames, 1–100. Default: 92.
    ///
    /// Matches the quality browsers use for `canvas.toDataURL("image/jpeg")`.
    pub jpeg_quality: u8,

    /// How long [`crate::camera::CameraManager::wait_for_first_frame`] waits
    /// for the stream to decode a frame, in milliseconds. Default: 5000.
    pub frame_wait_timeout_ms: u64,

    /// Upload request timeout in seconds. Default: `None` (transport default).
    pub request_timeout_secs: Option<u64>,
}

impl Default for WidgetConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            predict_path: "/predict".to_string(),
            upload_field: "file".to_string(),
            storage_key: DEFAULT_STORAGE_KEY.to_string(),
            capture_filename: "captured.jpg".to_string(),
            fallback_width: 640,
            fallback_height: 480,
            jpeg_quality: 92,
            frame_wait_timeout_ms: 5000,
            request_timeout_secs: None,
        }
    }
}

impl WidgetConfig {
    /// Create a new builder for `WidgetConfig`.
    pub fn builder() -> WidgetConfigBuilder {
        WidgetConfigBuilder {
            config: Self::default(),
        }
    }

    /// Full URL the upload coordinator posts to.
    pub fn predict_url(&self) -> String {
        let base = self.endpoint.trim_end_matches('/');
        if self.predict_path.starts_with('/') {
            format!("{}{}", base, self.predict_path)
        } else {
            format!("{}/{}", base, self.predict_path)
        }
    }
}

/// Builder for [`WidgetConfig`].
#[derive(Debug)]
pub struct WidgetConfigBuilder {
    config: WidgetConfig,
}

impl WidgetConfigBuilder {
    pub fn endpoint(mut self, url: impl Into<String>) -> Self {
        self.config.endpoint = url.into();
        self
    }

    pub fn predict_path(mut self, path: impl Into<String>) -> Self {
        self.config.predict_path = path.into();
        self
    }

    pub fn upload_field(mut self, name: impl Into<String>) -> Self {
        self.config.upload_field = name.into();
        self
    }

    pub fn storage_key(mut self, key: impl Into<String>) -> Self {
        self.config.storage_key = key.into();
        self
    }

    pub fn capture_filename(mut self, name: impl Into<String>) -> Self {
        self.config.capture_filename = name.into();
        self
    }

    pub fn fallback_size(mut self, width: u32, height: u32) -> Self {
        self.config.fallback_width = width.max(1);
        self.config.fallback_height = height.max(1);
        self
    }

    pub fn jpeg_quality(mut self, quality: u8) -> Self {
        self.config.jpeg_quality = quality.clamp(1, 100);
        self
    }

    pub fn frame_wait_timeout_ms(mut self, ms: u64) -> Self {
        self.config.frame_wait_timeout_ms = ms;
        self
    }

    pub fn request_timeout_secs(mut self, secs: u64) -> Self {
        self.config.request_timeout_secs = Some(secs);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<WidgetConfig, LensError> {
        let c = &self.config;
        if !(c.endpoint.starts_with("http://") || c.endpoint.starts_with("https://")) {
            return Err(LensError::InvalidConfig(format!(
                "endpoint must be an http(s) URL, got '{}'",
                c.endpoint
            )));
        }
        if c.upload_field.trim().is_empty() {
            return Err(LensError::InvalidConfig(
                "upload field name must not be empty".into(),
            ));
        }
        if c.storage_key.trim().is_empty() {
            return Err(LensError::InvalidConfig(
                "storage key must not be empty".into(),
            ));
        }
        Ok(self.config)
    }
}
