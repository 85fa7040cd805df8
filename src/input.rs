//! Input acquisition: turn a file selection or a camera frame into a [`RawImage`].
//!
//! Both paths end in the same place: a fresh `RawImage` that replaces
//! whatever the widget held before. Neither path touches widget state
//! itself; [`crate::widget::ImageWidget`] feeds the result into the
//! preview store.

use crate::camera::{CameraSession, VideoFrame};
use crate::config::WidgetConfig;
use crate::error::LensError;
use crate::media::{detect_image_mime, RawImage};
use async_trait::async_trait;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::{self, FilterType};
use std::path::PathBuf;
use tracing::{debug, info};

/// Accept filter handed to selection surfaces.
pub const IMAGE_ACCEPT: &str = "image/*";

/// MIME type of every camera capture.
pub const CAPTURE_MIME: &str = "image/jpeg";

/// A file-selection surface (native dialog, drop zone, command-line argument…).
#[async_trait]
pub trait FileSelector: Send {
    /// Let the user pick one file matching `accept`. `None` means cancelled.
    async fn choose(&mut self, accept: &str) -> Option<PathBuf>;
}

/// A selector that hands out a preset path once, then reports cancellation.
#[derive(Debug, Default, Clone)]
pub struct PathSelector {
    path: Option<PathBuf>,
}

impl PathSelector {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
        }
    }

    /// A selector the user always dismisses.
    pub fn cancelled() -> Self {
        Self { path: None }
    }
}

#[async_trait]
impl FileSelector for PathSelector {
    async fn choose(&mut self, _accept: &str) -> Option<PathBuf> {
        self.path.take()
    }
}

/// Ask `selector` for an image file and read it.
///
/// Returns `Ok(None)` when the user cancels. The MIME type is the one the
/// file declares through its extension; files that do not declare an image
/// type are rejected with [`LensError::UnsupportedFileType`].
pub async fn select_file(selector: &mut dyn FileSelector) -> Result<Option<RawImage>, LensError> {
    let Some(path) = selector.choose(IMAGE_ACCEPT).await else {
        debug!("File selection cancelled");
        return Ok(None);
    };

    let mime = detect_image_mime(&path)
        .ok_or_else(|| LensError::UnsupportedFileType { path: path.clone() })?;

    let bytes = tokio::fs::read(&path)
        .await
        .map_err(|source| LensError::FileRead {
            path: path.clone(),
            source,
        })?;

    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    info!("File selected: {} ({}, {} bytes)", filename, mime, bytes.len());
    Ok(Some(RawImage::new(bytes, mime, filename)))
}

/// Grab the current frame of `session` as a JPEG.
///
/// Fails with [`LensError::NoFrameAvailable`] when the stream is not bound
/// to a preview surface or has not decoded a frame yet, so a premature
/// capture never yields an empty image.
pub fn capture_frame(session: &CameraSession, config: &WidgetConfig) -> Result<RawImage, LensError> {
    if !session.is_bound() {
        return Err(LensError::NoFrameAvailable {
            reason: "preview surface is not bound to the stream".into(),
        });
    }
    let frame = session
        .latest_frame()
        .ok_or_else(|| LensError::NoFrameAvailable {
            reason: "stream has not decoded a frame yet".into(),
        })?;

    encode_frame(&frame, config)
}

/// Draw `frame` onto a bitmap of its reported size and JPEG-encode it.
///
/// Each dimension the source reports as zero is replaced by the configured
/// fallback (640 wide, 480 high by default).
pub fn encode_frame(frame: &VideoFrame, config: &WidgetConfig) -> Result<RawImage, LensError> {
    if frame.image.width() == 0 || frame.image.height() == 0 {
        return Err(LensError::NoFrameAvailable {
            reason: "frame has no pixels".into(),
        });
    }

    let width = if frame.width == 0 {
        config.fallback_width
    } else {
        frame.width
    };
    let height = if frame.height == 0 {
        config.fallback_height
    } else {
        frame.height
    };

    let pixels = frame.image.to_rgb8();
    let canvas = if pixels.dimensions() == (width, height) {
        pixels
    } else {
        imageops::resize(&pixels, width, height, FilterType::Triangle)
    };

    let mut bytes = Vec::new();
    JpegEncoder::new_with_quality(&mut bytes, config.jpeg_quality)
        .encode_image(&canvas)
        .map_err(|e| LensError::Encode(e.to_string()))?;

    if bytes.is_empty() {
        return Err(LensError::Encode("encoder produced no data".into()));
    }

    debug!("Captured {}x{} frame → {} bytes JPEG", width, height, bytes.len());
    Ok(RawImage::new(bytes, CAPTURE_MIME, config.capture_filename.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, GenericImageView, Rgb, RgbImage};

    fn frame(w: u32, h: u32) -> VideoFrame {
        VideoFrame::new(DynamicImage::ImageRgb8(RgbImage::from_pixel(
            w,
            h,
            Rgb([120, 80, 40]),
        )))
    }

    #[test]
    fn capture_keeps_native_resolution() {
        let raw = encode_frame(&frame(32, 24), &WidgetConfig::default()).unwrap();
        assert_eq!(raw.mime, "image/jpeg");
        assert_eq!(raw.filename, "captured.jpg");
        assert!(!raw.is_empty());

        let decoded = image::load_from_memory(&raw.bytes).unwrap();
        assert_eq!(decoded.dimensions(), (32, 24));
    }

    #[test]
    fn zero_reported_size_falls_back() {
        let mut f = frame(4, 4);
        f.width = 0;
        f.height = 0;
        let raw = encode_frame(&f, &WidgetConfig::default()).unwrap();
        let decoded = image::load_from_memory(&raw.bytes).unwrap();
        assert_eq!(decoded.dimensions(), (640, 480));
    }

    #[test]
    fn each_missing_dimension_falls_back_on_its_own() {
        let mut f = frame(4, 4);
        f.width = 800;
        f.height = 0;
        let raw = encode_frame(&f, &WidgetConfig::default()).unwrap();
        let decoded = image::load_from_memory(&raw.bytes).unwrap();
        assert_eq!(decoded.dimensions(), (800, 480));

        f.width = 0;
        f.height = 360;
        let raw = encode_frame(&f, &WidgetConfig::default()).unwrap();
        let decoded = image::load_from_memory(&raw.bytes).unwrap();
        assert_eq!(decoded.dimensions(), (640, 360));
    }

    #[test]
    fn empty_frame_is_rejected() {
        let f = VideoFrame {
            width: 640,
            height: 480,
            image: DynamicImage::ImageRgb8(RgbImage::new(0, 0)),
        };
        let err = encode_frame(&f, &WidgetConfig::default()).unwrap_err();
        assert!(matches!(err, LensError::NoFrameAvailable { .. }));
    }

    #[tokio::test]
    async fn cancelled_selection_yields_nothing() {
        let mut selector = PathSelector::cancelled();
        assert!(select_file(&mut selector).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn selection_reads_declared_type_and_name() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bottle.png");
        std::fs::write(&path, b"\x89PNG fake").unwrap();

        let mut selector = PathSelector::new(&path);
        let raw = select_file(&mut selector).await.unwrap().unwrap();
        assert_eq!(raw.mime, "image/png");
        assert_eq!(raw.filename, "bottle.png");
        assert_eq!(raw.bytes, b"\x89PNG fake");

        // One-shot: a second prompt behaves like a cancel.
        assert!(select_file(&mut selector).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn non_image_selection_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        std::fs::write(&path, b"hello").unwrap();

        let err = select_file(&mut PathSelector::new(&path)).await.unwrap_err();
        assert!(matches!(err, LensError::UnsupportedFileType { .. }));
    }

    #[tokio::test]
    async fn missing_file_is_a_read_error() {
        let err = select_file(&mut PathSelector::new("/definitely/not/here.jpg"))
            .await
            .unwrap_err();
        assert!(matches!(err, LensError::FileRead { .. }));
    }
}
