//! The widget: one explicit state object coordinating camera, file picker,
//! preview store and uploader.
//!
//! ```text
//! select_file ─┐
//!              ├─▶ RawImage ─▶ PreviewStore (data URI + durable slot)
//! capture ─────┘        │
//!                       └─────▶ Uploader (raw bytes, never the data URI)
//! ```
//!
//! Every operation recovers its own errors: the failure is written to the
//! matching status text (camera, upload, storage) and also returned so
//! callers can react. No failure leaves the widget unusable.
//!
//! All operations take `&mut self`, so a second upload cannot start while
//! one is awaiting its response.

use crate::camera::{CameraDevice, CameraManager, CameraState, PreviewSurface};
use crate::config::WidgetConfig;
use crate::error::LensError;
use crate::input::{self, FileSelector};
use crate::media::{PreviewEncoding, RawImage};
use crate::store::{KeyValueStore, PreviewStore};
use crate::upload::{Prediction, UploadOutcome, Uploader};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info};

/// Snapshot of everything a UI needs to render the widget.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WidgetView {
    pub has_preview: bool,
    pub preview_mime: Option<String>,
    pub camera_state: CameraState,
    /// Tooltip for the camera trigger.
    pub camera_button_title: &'static str,
    pub can_clear: bool,
    pub can_upload: bool,
    pub uploading: bool,
    pub camera_error: Option<String>,
    pub upload_error: Option<String>,
    pub result_text: Option<String>,
    pub storage_warning: Option<String>,
}

/// Image acquisition, preview, persistence and upload in one place.
pub struct ImageWidget {
    config: WidgetConfig,
    camera: CameraManager,
    store: PreviewStore,
    uploader: Uploader,
    raw: Option<RawImage>,
    camera_error: Option<String>,
    upload_error: Option<String>,
    result_text: Option<String>,
    storage_warning: Option<String>,
}

impl ImageWidget {
    /// Build a widget. Camera feature detection runs here, once.
    ///
    /// Call [`ImageWidget::restore_on_init`] afterwards to load a persisted
    /// preview.
    pub fn new(
        config: WidgetConfig,
        device: Arc<dyn CameraDevice>,
        storage: Box<dyn KeyValueStore>,
    ) -> Result<Self, LensError> {
        let uploader = Uploader::new(&config)?;
        let camera = CameraManager::new(
            device,
            Duration::from_millis(config.frame_wait_timeout_ms),
        );
        let store = PreviewStore::new(storage, config.storage_key.clone());

        Ok(Self {
            config,
            camera,
            store,
            uploader,
            raw: None,
            camera_error: None,
            upload_error: None,
            result_text: None,
            storage_warning: None,
        })
    }

    // ── Accessors ────────────────────────────────────────────────────────

    pub fn config(&self) -> &WidgetConfig {
        &self.config
    }

    pub fn preview(&self) -> Option<&PreviewEncoding> {
        self.store.preview()
    }

    /// The image an upload would send. `None` after a restore until a new
    /// acquisition.
    pub fn raw_image(&self) -> Option<&RawImage> {
        self.raw.as_ref()
    }

    pub fn camera(&self) -> &CameraManager {
        &self.camera
    }

    pub fn camera_error(&self) -> Option<&str> {
        self.camera_error.as_deref()
    }

    pub fn upload_error(&self) -> Option<&str> {
        self.upload_error.as_deref()
    }

    pub fn result_text(&self) -> Option<&str> {
        self.result_text.as_deref()
    }

    pub fn storage_warning(&self) -> Option<&str> {
        self.storage_warning.as_deref()
    }

    pub fn is_uploading(&self) -> bool {
        self.uploader.is_uploading()
    }

    pub fn upload_outcome(&self) -> Option<UploadOutcome> {
        self.uploader.outcome()
    }

    /// Follow upload progress from outside the widget.
    pub fn upload_status(&self) -> watch::Receiver<Option<UploadOutcome>> {
        self.uploader.subscribe()
    }

    pub fn view(&self) -> WidgetView {
        let preview = self.store.preview();
        let can_upload = self.raw.is_some() && !self.is_uploading();
        WidgetView {
            has_preview: preview.is_some(),
            preview_mime: preview.map(|p| p.mime().to_string()),
            camera_state: self.camera.state(),
            camera_button_title: if self.camera.is_supported() {
                "Open camera"
            } else {
                "Camera not supported"
            },
            can_clear: preview.is_some(),
            can_upload,
            uploading: self.is_uploading(),
            camera_error: self.camera_error.clone(),
            upload_error: self.upload_error.clone(),
            result_text: self.result_text.clone(),
            storage_warning: self.storage_warning.clone(),
        }
    }

    // ── Preview / persistence ────────────────────────────────────────────

    /// Load the persisted preview, display-only. Returns whether one was found.
    pub fn restore_on_init(&mut self) -> bool {
        match self.store.restore_on_init() {
            Ok(found) => found,
            Err(e) => {
                self.storage_warning = Some(e.user_message());
                false
            }
        }
    }

    /// Drop the current image, its preview and the persisted copy.
    pub fn clear(&mut self) {
        self.raw = None;
        self.storage_warning = self.store.clear().err().map(|e| e.user_message());
        debug!("Image cleared");
    }

    fn accept(&mut self, raw: RawImage) {
        self.storage_warning = self.store.set_image(&raw).err().map(|e| e.user_message());
        self.raw = Some(raw);
    }

    // ── Input acquisition ────────────────────────────────────────────────

    /// Prompt `selector` for an image. Returns `Ok(false)` on cancel, leaving
    /// the current image untouched.
    pub async fn select_file(&mut self, selector: &mut dyn FileSelector) -> Result<bool, LensError> {
        match input::select_file(selector).await {
            Ok(Some(raw)) => {
                self.accept(raw);
                Ok(true)
            }
            Ok(None) => Ok(false),
            Err(e) => {
                self.upload_error = Some(e.user_message());
                Err(e)
            }
        }
    }

    /// Capture the current camera frame, make it the image, close the camera.
    pub fn capture(&mut self) -> Result<(), LensError> {
        let captured = match self.camera.session() {
            Some(session) => input::capture_frame(session, &self.config),
            None => Err(LensError::NoFrameAvailable {
                reason: "camera is not open".into(),
            }),
        };

        match captured {
            Ok(raw) => {
                info!("Captured {} ({} bytes)", raw.filename, raw.len());
                self.camera_error = None;
                self.accept(raw);
                self.camera.close();
                Ok(())
            }
            Err(e) => {
                self.camera_error = Some(e.user_message());
                Err(e)
            }
        }
    }

    // ── Camera ───────────────────────────────────────────────────────────

    pub async fn open_camera(&mut self) -> Result<(), LensError> {
        self.camera_error = None;
        let result = self.camera.open().await;
        if let Err(ref e) = result {
            self.camera_error = Some(e.user_message());
        }
        result
    }

    /// Attach the stream to `surface` once it is mounted. See
    /// [`CameraManager::bind_preview`].
    pub async fn bind_preview(&mut self, surface: Arc<dyn PreviewSurface>) -> bool {
        self.camera.bind_preview(surface).await
    }

    /// Suspend until the camera has a decoded frame, so capture can proceed.
    pub async fn wait_for_first_frame(&mut self) -> Result<(), LensError> {
        match self.camera.wait_for_first_frame().await {
            Ok(frame) => {
                debug!("First frame decoded ({}x{})", frame.width, frame.height);
                Ok(())
            }
            Err(e) => {
                self.camera_error = Some(e.user_message());
                Err(e)
            }
        }
    }

    pub fn close_camera(&mut self) {
        self.camera.close();
    }

    // ── Upload ───────────────────────────────────────────────────────────

    /// Send the current image for classification.
    pub async fn upload(&mut self) -> Result<Prediction, LensError> {
        self.upload_error = None;
        self.result_text = None;

        let result = self.uploader.upload(self.raw.as_ref()).await;
        match &result {
            Ok(prediction) => self.result_text = Some(prediction.message()),
            Err(e) => self.upload_error = Some(e.user_message()),
        }
        result
    }
}
