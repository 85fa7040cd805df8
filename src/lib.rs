//! # recycle-lens
//!
//! Pick a photo or snap one from a camera, keep a preview that survives
//! restarts, and ask a remote model whether the object is recyclable.
//!
//! ## Flow Overview
//!
//! ```text
//! file picker ──┐
//!               ├─ 1. Acquire   RawImage (bytes + MIME + filename)
//! camera frame ─┘
//!                  2. Preview   data URI, mirrored to a durable slot
//!                  3. Upload    multipart POST /predict → { label, confidence }
//!                  4. Report    "Prediction: plastic (87.3% confidence)"
//! ```
//!
//! Three asynchronous sources feed one state object, [`ImageWidget`]:
//! the file selection, the camera stream (grant, then first decoded frame),
//! and the HTTP request. Each suspends with `.await` and resumes into the
//! widget; failures become status text instead of propagating.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use recycle_lens::{FileStore, ImageWidget, NoCamera, PathSelector, WidgetConfig};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = WidgetConfig::default(); // http://localhost:8000/predict
//!     let storage = Box::new(FileStore::new(".recycle-lens/storage.json"));
//!     let mut widget = ImageWidget::new(config, Arc::new(NoCamera), storage)?;
//!     widget.restore_on_init();
//!
//!     widget.select_file(&mut PathSelector::new("bottle.jpg")).await?;
//!     let prediction = widget.upload().await?;
//!     println!("{}", prediction.message());
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `recycle-lens` binary (clap + anyhow + tracing-subscriber) |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod camera;
pub mod config;
pub mod error;
pub mod input;
pub mod media;
pub mod store;
pub mod upload;
pub mod widget;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use camera::{
    CameraDevice, CameraManager, CameraSession, CameraState, FacingMode, HeadlessSurface,
    MediaStream, NoCamera, PreviewSurface, ReplayCamera, StreamRequest, VideoFrame,
};
pub use config::{WidgetConfig, WidgetConfigBuilder};
pub use error::LensError;
pub use input::{capture_frame, select_file, FileSelector, PathSelector};
pub use media::{PreviewEncoding, RawImage};
pub use store::{FileStore, KeyValueStore, MemoryStore, PreviewStore};
pub use upload::{Prediction, UploadOutcome, Uploader};
pub use widget::{ImageWidget, WidgetView};
