//! Camera session manager: open, bind, and close a live video stream.
//!
//! ## State machine
//!
//! ```text
//!            open()            grant
//! Closed ───────────▶ Requesting ──────▶ Active
//!   ▲                     │ deny/error      │ close() / capture
//!   └─────────────────────┴─────────────────┘
//!
//! Unsupported  (set once by feature detection, never left)
//! ```
//!
//! Platform camera APIs sit behind [`CameraDevice`], which collapses every
//! capability check into one [`CameraDevice::probe`] plus a single
//! [`CameraDevice::request_stream`]. A granted stream publishes decoded
//! frames on a `tokio::sync::watch` channel; the channel holds `None` until
//! the first frame decodes, which is what capture gates on.

use crate::error::LensError;
use async_trait::async_trait;
use image::DynamicImage;
use serde::Serialize;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Receiving side of a stream's frame channel. `None` until the first frame.
pub type FrameReceiver = watch::Receiver<Option<Arc<VideoFrame>>>;

/// Which way the requested camera faces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FacingMode {
    /// Rear camera, pointing away from the user.
    #[default]
    Environment,
    /// Front camera.
    User,
}

/// Constraints passed to [`CameraDevice::request_stream`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StreamRequest {
    pub facing: FacingMode,
    /// Always `false` for this widget: video only.
    pub audio: bool,
}

/// One decoded frame from a live source.
///
/// `width`/`height` are what the source *reports* as its native
/// resolution; they may be zero on sources that have not published
/// metadata, in which case capture falls back to the configured size.
#[derive(Debug, Clone)]
pub struct VideoFrame {
    pub width: u32,
    pub height: u32,
    pub image: DynamicImage,
}

impl VideoFrame {
    /// Frame whose reported size is the decoded image size.
    pub fn new(image: DynamicImage) -> Self {
        Self {
            width: image.width(),
            height: image.height(),
            image,
        }
    }
}

/// A platform camera API.
#[async_trait]
pub trait CameraDevice: Send + Sync {
    /// Feature detection: does this platform expose a camera API at all?
    fn probe(&self) -> bool;

    /// Ask for a live stream. Suspends until the user grants or denies.
    ///
    /// Implementations map refusals to [`LensError::PermissionDenied`],
    /// a missing API to [`LensError::Unsupported`], and anything else to
    /// [`LensError::DeviceError`].
    async fn request_stream(
        &self,
        request: &StreamRequest,
    ) -> Result<Box<dyn MediaStream>, LensError>;
}

/// A granted live stream. Holds the hardware until [`MediaStream::stop`].
pub trait MediaStream: Send {
    /// Subscribe to decoded frames.
    fn frames(&self) -> FrameReceiver;

    /// Stop every track and release the hardware. Must be idempotent.
    fn stop(&mut self);
}

/// The visible region the live stream plays into.
///
/// Shared between the UI that mounts it and the session that feeds it, so
/// methods take `&self`.
#[async_trait]
pub trait PreviewSurface: Send + Sync {
    /// Whether the surface exists in the visible tree yet.
    fn is_mounted(&self) -> bool;

    fn attach(&self, frames: FrameReceiver);

    /// Drop the source and stop playback. Called when the stream closes.
    fn detach(&self);

    /// Start playback. May be refused by runtime autoplay policy.
    async fn play(&self) -> Result<(), String>;
}

/// Lifecycle state of the camera.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CameraState {
    Unsupported,
    Closed,
    Requesting,
    Active,
}

/// An open stream plus the surface it is bound to.
pub struct CameraSession {
    stream: Box<dyn MediaStream>,
    frames: FrameReceiver,
    surface: Option<Arc<dyn PreviewSurface>>,
}

impl CameraSession {
    /// Most recent decoded frame, if any has arrived.
    pub fn latest_frame(&self) -> Option<Arc<VideoFrame>> {
        self.frames.borrow().clone()
    }

    /// Whether the stream has been attached to a mounted preview surface.
    pub fn is_bound(&self) -> bool {
        self.surface.is_some()
    }

    fn release(mut self) {
        if let Some(surface) = self.surface.take() {
            surface.detach();
        }
        self.stream.stop();
    }
}

/// Owns the single camera session of a widget.
pub struct CameraManager {
    device: Arc<dyn CameraDevice>,
    request: StreamRequest,
    frame_wait: Duration,
    state: CameraState,
    session: Option<CameraSession>,
    last_error: Option<String>,
}

impl CameraManager {
    /// Create a manager and run feature detection once.
    pub fn new(device: Arc<dyn CameraDevice>, frame_wait: Duration) -> Self {
        let state = if device.probe() {
            CameraState::Closed
        } else {
            info!("Camera API not detected; camera capture disabled");
            CameraState::Unsupported
        };
        Self {
            device,
            request: StreamRequest::default(),
            frame_wait,
            state,
            session: None,
            last_error: None,
        }
    }

    pub fn state(&self) -> CameraState {
        self.state
    }

    pub fn is_supported(&self) -> bool {
        self.state != CameraState::Unsupported
    }

    pub fn is_active(&self) -> bool {
        self.state == CameraState::Active
    }

    pub fn session(&self) -> Option<&CameraSession> {
        self.session.as_ref()
    }

    /// Human-readable text of the last open failure.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Open a rear-facing, video-only stream.
    ///
    /// An already active session is closed first, so at most one stream is
    /// ever held.
    pub async fn open(&mut self) -> Result<(), LensError> {
        self.last_error = None;

        if self.state == CameraState::Unsupported {
            let err = LensError::Unsupported;
            self.last_error = Some(err.user_message());
            return Err(err);
        }

        if self.session.is_some() {
            debug!("Camera already open; closing previous session first");
            self.close();
        }

        self.state = CameraState::Requesting;
        match self.device.request_stream(&self.request).await {
            Ok(stream) => {
                let frames = stream.frames();
                self.session = Some(CameraSession {
                    stream,
                    frames,
                    surface: None,
                });
                self.state = CameraState::Active;
                info!("Camera stream opened");
                Ok(())
            }
            Err(e) => {
                warn!("Error accessing camera: {}", e);
                self.state = CameraState::Closed;
                self.last_error = Some(e.user_message());
                Err(e)
            }
        }
    }

    /// Attach the live stream to `surface` and start playback.
    ///
    /// Returns `false` without touching the surface when there is no active
    /// session or the surface is not mounted yet; call again once it is.
    /// Playback refusal is logged and otherwise ignored. The session keeps
    /// the surface and detaches it on [`CameraManager::close`].
    pub async fn bind_preview(&mut self, surface: Arc<dyn PreviewSurface>) -> bool {
        let Some(session) = self.session.as_mut() else {
            return false;
        };
        if !surface.is_mounted() {
            debug!("Preview surface not mounted yet; deferring attach");
            return false;
        }

        if let Some(previous) = session.surface.replace(Arc::clone(&surface)) {
            previous.detach();
        }
        surface.attach(session.frames.clone());

        if let Err(e) = surface.play().await {
            warn!("Video playback failed or was blocked: {}", e);
        }
        true
    }

    /// Suspend until the stream has decoded at least one frame.
    ///
    /// Fails with [`LensError::NoFrameAvailable`] when no session is open,
    /// the stream ends, or the configured wait elapses.
    pub async fn wait_for_first_frame(&self) -> Result<Arc<VideoFrame>, LensError> {
        let Some(session) = self.session.as_ref() else {
            return Err(LensError::NoFrameAvailable {
                reason: "camera is not open".into(),
            });
        };

        let mut rx = session.frames.clone();
        let waited = tokio::time::timeout(self.frame_wait, async {
            rx.wait_for(Option::is_some)
                .await
                .map(|frame| (*frame).clone())
        })
        .await;

        match waited {
            Ok(Ok(Some(frame))) => Ok(frame),
            Ok(Ok(None)) | Ok(Err(_)) => Err(LensError::NoFrameAvailable {
                reason: "stream ended before a frame decoded".into(),
            }),
            Err(_) => Err(LensError::NoFrameAvailable {
                reason: format!(
                    "no frame decoded within {}ms",
                    self.frame_wait.as_millis()
                ),
            }),
        }
    }

    /// Stop every track and return to `Closed`. A no-op when nothing is open.
    pub fn close(&mut self) {
        if let Some(session) = self.session.take() {
            session.release();
            info!("Camera stream closed");
        }
        if self.state != CameraState::Unsupported {
            self.state = CameraState::Closed;
        }
    }
}

impl Drop for CameraManager {
    fn drop(&mut self) {
        self.close();
    }
}

// ── Built-in devices ─────────────────────────────────────────────────────────

/// A platform without any camera API.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoCamera;

#[async_trait]
impl CameraDevice for NoCamera {
    fn probe(&self) -> bool {
        false
    }

    async fn request_stream(
        &self,
        _request: &StreamRequest,
    ) -> Result<Box<dyn MediaStream>, LensError> {
        Err(LensError::Unsupported)
    }
}

/// A camera that replays one still image as its live feed.
///
/// The first frame is published after `warmup`, modelling the gap between
/// a stream grant and the first decoded frame.
#[derive(Debug, Clone)]
pub struct ReplayCamera {
    frame: Arc<VideoFrame>,
    warmup: Duration,
}

impl ReplayCamera {
    pub fn new(image: DynamicImage) -> Self {
        Self {
            frame: Arc::new(VideoFrame::new(image)),
            warmup: Duration::from_millis(50),
        }
    }

    /// Decode `path` and replay it.
    pub fn from_path(path: &Path) -> Result<Self, LensError> {
        let image = image::open(path).map_err(|e| LensError::DeviceError {
            detail: format!("cannot load replay source '{}': {}", path.display(), e),
        })?;
        Ok(Self::new(image))
    }

    /// Replay `frame` verbatim, including its reported size.
    pub fn from_frame(frame: VideoFrame) -> Self {
        Self {
            frame: Arc::new(frame),
            warmup: Duration::from_millis(50),
        }
    }

    pub fn with_warmup(mut self, warmup: Duration) -> Self {
        self.warmup = warmup;
        self
    }
}

#[async_trait]
impl CameraDevice for ReplayCamera {
    fn probe(&self) -> bool {
        true
    }

    async fn request_stream(
        &self,
        request: &StreamRequest,
    ) -> Result<Box<dyn MediaStream>, LensError> {
        debug!("Replay camera granted {:?}", request);
        let (tx, rx) = watch::channel(None);
        let frame = Arc::clone(&self.frame);
        let warmup = self.warmup;

        let task = tokio::spawn(async move {
            tokio::time::sleep(warmup).await;
            tx.send_replace(Some(frame));
            // Keep the track alive until every subscriber is gone or stop() aborts us.
            tx.closed().await;
        });

        Ok(Box::new(ReplayStream {
            frames: rx,
            task: Some(task),
        }))
    }
}

struct ReplayStream {
    frames: FrameReceiver,
    task: Option<JoinHandle<()>>,
}

impl MediaStream for ReplayStream {
    fn frames(&self) -> FrameReceiver {
        self.frames.clone()
    }

    fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for ReplayStream {
    fn drop(&mut self) {
        self.stop();
    }
}

/// A preview surface with no display, for command-line and test use.
#[derive(Debug, Default)]
pub struct HeadlessSurface {
    state: Mutex<SurfaceState>,
}

#[derive(Debug, Default)]
struct SurfaceState {
    mounted: bool,
    frames: Option<FrameReceiver>,
    playing: bool,
}

impl HeadlessSurface {
    /// A surface that is already mounted.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(SurfaceState {
                mounted: true,
                ..SurfaceState::default()
            }),
        }
    }

    /// A surface that is not yet part of the visible tree.
    pub fn unmounted() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, SurfaceState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn mount(&self) {
        self.state().mounted = true;
    }

    pub fn is_attached(&self) -> bool {
        self.state().frames.is_some()
    }

    pub fn is_playing(&self) -> bool {
        self.state().playing
    }

    /// Frame currently shown, if any.
    pub fn current_frame(&self) -> Option<Arc<VideoFrame>> {
        self.state()
            .frames
            .as_ref()
            .and_then(|rx| rx.borrow().clone())
    }
}

#[async_trait]
impl PreviewSurface for HeadlessSurface {
    fn is_mounted(&self) -> bool {
        self.state().mounted
    }

    fn attach(&self, frames: FrameReceiver) {
        self.state().frames = Some(frames);
    }

    fn detach(&self) {
        let mut state = self.state();
        state.frames = None;
        state.playing = false;
    }

    async fn play(&self) -> Result<(), String> {
        let mut state = self.state();
        if state.frames.is_none() {
            return Err("no source attached".into());
        }
        state.playing = true;
        Ok(())
    }
}
