//! End-to-end widget tests against an in-process classification server.
//!
//! Each test spins up an `axum` app on an ephemeral localhost port that
//! plays the classifier: it inspects the multipart body and answers with a
//! canned prediction, an HTTP error, or a response held back until the test
//! releases it.

use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use image::{DynamicImage, Rgb, RgbImage};
use recycle_lens::{
    CameraDevice, FileStore, HeadlessSurface, ImageWidget, LensError, MemoryStore, NoCamera,
    PathSelector, Prediction, PreviewEncoding, ReplayCamera, UploadOutcome, WidgetConfig,
};
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::Notify;

// ── Test helpers ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
struct ReceivedPart {
    name: Option<String>,
    file_name: Option<String>,
    content_type: Option<String>,
    bytes: Vec<u8>,
}

#[derive(Clone, Default)]
struct Recorder {
    requests: Arc<AtomicUsize>,
    parts: Arc<Mutex<Vec<ReceivedPart>>>,
}

async fn serve(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

async fn classifier(label: &'static str, confidence: f64) -> (String, Recorder) {
    let recorder = Recorder::default();
    let app = Router::new()
        .route(
            "/predict",
            post(
                move |State(rec): State<Recorder>, mut multipart: Multipart| async move {
                    rec.requests.fetch_add(1, Ordering::SeqCst);
                    while let Some(field) = multipart.next_field().await.unwrap() {
                        let name = field.name().map(str::to_string);
                        let file_name = field.file_name().map(str::to_string);
                        let content_type = field.content_type().map(str::to_string);
                        let bytes = field.bytes().await.unwrap().to_vec();
                        rec.parts.lock().unwrap().push(ReceivedPart {
                            name,
                            file_name,
                            content_type,
                            bytes,
                        });
                    }
                    Json(json!({ "label": label, "confidence": confidence }))
                },
            ),
        )
        .with_state(recorder.clone());
    (serve(app).await, recorder)
}

async fn failing_classifier(status: StatusCode, body: &'static str) -> String {
    let app = Router::new().route("/predict", post(move || async move { (status, body) }));
    serve(app).await
}

async fn gated_classifier(gate: Arc<Notify>) -> String {
    let app = Router::new()
        .route(
            "/predict",
            post(|State(gate): State<Arc<Notify>>| async move {
                gate.notified().await;
                Json(json!({ "label": "paper", "confidence": 0.5 }))
            }),
        )
        .with_state(gate);
    serve(app).await
}

/// An address nothing listens on.
async fn dead_endpoint() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{addr}")
}

/// Answers one request with a 500 whose declared body length is never sent.
async fn truncated_error_endpoint() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut request = Vec::new();
        let mut buf = [0u8; 4096];
        while !request.ends_with(b"--\r\n") && !request.ends_with(b"0\r\n\r\n") {
            let n = socket.read(&mut buf).await.unwrap();
            if n == 0 {
                break;
            }
            request.extend_from_slice(&buf[..n]);
        }
        socket
            .write_all(b"HTTP/1.1 500 Internal Server Error\r\ncontent-length: 64\r\n\r\npartial")
            .await
            .unwrap();
        socket.shutdown().await.unwrap();
    });
    format!("http://{addr}")
}

/// Route widget logs to the test harness; `RUST_LOG=recycle_lens=debug` to see them.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn widget_at(endpoint: &str, device: Arc<dyn CameraDevice>) -> ImageWidget {
    init_tracing();
    let config = WidgetConfig::builder().endpoint(endpoint).build().unwrap();
    ImageWidget::new(config, device, Box::new(MemoryStore::new())).unwrap()
}

fn write_image(dir: &Path, name: &str, bytes: &[u8]) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, bytes).unwrap();
    path
}

fn replay_camera() -> Arc<dyn CameraDevice> {
    let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(24, 18, Rgb([200, 30, 30])));
    Arc::new(ReplayCamera::new(img).with_warmup(Duration::from_millis(5)))
}

/// Run an upload while recording every outcome published on the status channel.
async fn upload_traced(
    widget: &mut ImageWidget,
) -> (Result<Prediction, LensError>, Vec<UploadOutcome>) {
    let mut rx = widget.upload_status();
    let mut seen = Vec::new();

    let result = {
        let upload = widget.upload();
        tokio::pin!(upload);
        loop {
            tokio::select! {
                biased;
                changed = rx.changed() => {
                    if changed.is_ok() {
                        if let Some(o) = rx.borrow_and_update().clone() {
                            seen.push(o);
                        }
                    }
                }
                res = &mut upload => break res,
            }
        }
    };

    if rx.has_changed().unwrap_or(false) {
        if let Some(o) = rx.borrow_and_update().clone() {
            seen.push(o);
        }
    }
    (result, seen)
}

// ── Upload coordinator ───────────────────────────────────────────────────────

#[tokio::test]
async fn upload_reports_formatted_prediction() {
    let (endpoint, recorder) = classifier("plastic", 0.873).await;
    let dir = tempfile::tempdir().unwrap();
    let path = write_image(dir.path(), "bottle.png", b"\x89PNG bottle");

    let mut widget = widget_at(&endpoint, Arc::new(NoCamera));
    assert!(widget.select_file(&mut PathSelector::new(&path)).await.unwrap());

    let (result, seen) = upload_traced(&mut widget).await;
    let prediction = result.unwrap();
    assert_eq!(prediction.label, "plastic");
    assert_eq!(
        widget.result_text(),
        Some("Prediction: plastic (87.3% confidence)")
    );
    assert!(widget.upload_error().is_none());

    assert_eq!(seen.first(), Some(&UploadOutcome::Pending));
    assert!(matches!(seen.last(), Some(UploadOutcome::Succeeded { .. })));
    assert!(!widget.is_uploading());

    let parts = recorder.parts.lock().unwrap().clone();
    assert_eq!(parts.len(), 1);
    assert_eq!(parts[0].name.as_deref(), Some("file"));
    assert_eq!(parts[0].file_name.as_deref(), Some("bottle.png"));
    assert_eq!(parts[0].content_type.as_deref(), Some("image/png"));
    assert_eq!(parts[0].bytes, b"\x89PNG bottle");
}

#[tokio::test]
async fn http_error_carries_status_and_body() {
    let endpoint = failing_classifier(StatusCode::INTERNAL_SERVER_ERROR, "oops").await;
    let dir = tempfile::tempdir().unwrap();
    let path = write_image(dir.path(), "can.jpg", b"jpeg");

    let mut widget = widget_at(&endpoint, Arc::new(NoCamera));
    widget.select_file(&mut PathSelector::new(&path)).await.unwrap();

    let (result, seen) = upload_traced(&mut widget).await;
    match result.unwrap_err() {
        LensError::Http { status, body } => {
            assert_eq!(status, 500);
            assert_eq!(body, "oops");
        }
        other => panic!("expected HTTP error, got {other:?}"),
    }

    let shown = widget.upload_error().unwrap();
    assert!(shown.contains("500"), "got: {shown}");
    assert!(shown.contains("oops"), "got: {shown}");
    assert!(widget.result_text().is_none());

    assert_eq!(seen.first(), Some(&UploadOutcome::Pending));
    assert!(matches!(seen.last(), Some(UploadOutcome::Failed { .. })));
    assert!(!widget.is_uploading());
    assert!(widget.view().can_upload, "upload must stay retriable");
}

#[tokio::test]
async fn transport_error_clears_pending() {
    let endpoint = dead_endpoint().await;
    let dir = tempfile::tempdir().unwrap();
    let path = write_image(dir.path(), "can.jpg", b"jpeg");

    let mut widget = widget_at(&endpoint, Arc::new(NoCamera));
    widget.select_file(&mut PathSelector::new(&path)).await.unwrap();

    let (result, seen) = upload_traced(&mut widget).await;
    let err = result.unwrap_err();
    assert!(matches!(err, LensError::Transport(_)), "got {err:?}");
    assert!(!widget.upload_error().unwrap().is_empty());

    assert_eq!(seen.first(), Some(&UploadOutcome::Pending));
    assert!(matches!(seen.last(), Some(UploadOutcome::Failed { .. })));
    assert!(!widget.is_uploading());
}

#[tokio::test]
async fn missing_image_never_reaches_the_network() {
    let (endpoint, recorder) = classifier("plastic", 0.9).await;
    let mut widget = widget_at(&endpoint, Arc::new(NoCamera));

    let (result, seen) = upload_traced(&mut widget).await;
    assert!(matches!(result, Err(LensError::NoImageSelected)));
    assert!(!seen.contains(&UploadOutcome::Pending));
    assert_eq!(widget.upload_error(), Some("No image selected"));
    assert_eq!(recorder.requests.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn uploading_flag_spans_the_request() {
    let gate = Arc::new(Notify::new());
    let endpoint = gated_classifier(Arc::clone(&gate)).await;
    let dir = tempfile::tempdir().unwrap();
    let path = write_image(dir.path(), "box.png", b"png");

    let mut widget = widget_at(&endpoint, Arc::new(NoCamera));
    widget.select_file(&mut PathSelector::new(&path)).await.unwrap();
    assert!(!widget.is_uploading());

    let mut rx = widget.upload_status();
    let release = async {
        rx.wait_for(|o| matches!(o, Some(UploadOutcome::Pending)))
            .await
            .unwrap();
        gate.notify_one();
    };
    let (result, ()) = tokio::join!(widget.upload(), release);

    assert_eq!(result.unwrap().label, "paper");
    assert!(!widget.is_uploading());
    assert_eq!(widget.result_text(), Some("Prediction: paper (50.0% confidence)"));
}

#[tokio::test]
async fn unreadable_error_body_still_reports_status() {
    let dir = tempfile::tempdir().unwrap();
    let image = write_image(dir.path(), "tin.png", b"tin");
    let mut widget = widget_at(&truncated_error_endpoint().await, Arc::new(NoCamera));
    widget.select_file(&mut PathSelector::new(&image)).await.unwrap();

    let err = widget.upload().await.unwrap_err();
    assert!(
        matches!(err, LensError::Http { status: 500, ref body } if body.is_empty()),
        "got: {err:?}"
    );
    assert!(!widget.is_uploading());
    assert_eq!(widget.upload_error(), Some("Server error: 500 "));
}

// ── Acquisition + preview ────────────────────────────────────────────────────

#[tokio::test]
async fn captured_frame_is_uploaded_as_jpeg() {
    let (endpoint, recorder) = classifier("metal", 0.42).await;
    let mut widget = widget_at(&endpoint, replay_camera());
    let surface = Arc::new(HeadlessSurface::new());

    widget.open_camera().await.unwrap();
    assert!(widget.bind_preview(surface.clone()).await);
    widget.wait_for_first_frame().await.unwrap();
    widget.capture().unwrap();

    widget.upload().await.unwrap();
    assert_eq!(widget.result_text(), Some("Prediction: metal (42.0% confidence)"));

    let parts = recorder.parts.lock().unwrap().clone();
    assert_eq!(parts[0].file_name.as_deref(), Some("captured.jpg"));
    assert_eq!(parts[0].content_type.as_deref(), Some("image/jpeg"));
    let decoded = image::load_from_memory(&parts[0].bytes).unwrap();
    assert_eq!((decoded.width(), decoded.height()), (24, 18));
}

#[tokio::test]
async fn preview_tracks_latest_acquisition() {
    let dir = tempfile::tempdir().unwrap();
    let first = write_image(dir.path(), "first.png", b"first");
    let second = write_image(dir.path(), "second.jpg", b"second");

    let mut widget = widget_at("http://localhost:8000", replay_camera());

    widget.select_file(&mut PathSelector::new(&first)).await.unwrap();
    assert_eq!(widget.preview().unwrap().decode().unwrap(), b"first");

    widget.select_file(&mut PathSelector::new(&second)).await.unwrap();
    assert_eq!(widget.preview().unwrap().decode().unwrap(), b"second");
    assert_eq!(widget.preview().unwrap().mime(), "image/jpeg");

    let surface = Arc::new(HeadlessSurface::new());
    widget.open_camera().await.unwrap();
    widget.bind_preview(surface.clone()).await;
    widget.wait_for_first_frame().await.unwrap();
    widget.capture().unwrap();

    let raw = widget.raw_image().unwrap().clone();
    assert_eq!(widget.preview(), Some(&PreviewEncoding::from_raw(&raw)));
}

#[tokio::test]
async fn unmounted_surface_defers_binding_and_blocks_capture() {
    let mut widget = widget_at("http://localhost:8000", replay_camera());
    let surface = Arc::new(HeadlessSurface::unmounted());

    widget.open_camera().await.unwrap();
    assert!(!widget.bind_preview(surface.clone()).await);
    widget.wait_for_first_frame().await.unwrap();
    assert!(matches!(
        widget.capture(),
        Err(LensError::NoFrameAvailable { .. })
    ));
    assert!(widget.raw_image().is_none());

    surface.mount();
    assert!(widget.bind_preview(surface.clone()).await);
    assert!(surface.current_frame().is_some());
    widget.capture().unwrap();
    assert!(widget.raw_image().is_some());
}

#[tokio::test]
async fn preview_survives_reload_through_file_store() {
    let dir = tempfile::tempdir().unwrap();
    let storage = dir.path().join("state").join("storage.json");
    let image = write_image(dir.path(), "jar.png", b"glass jar");
    let config = WidgetConfig::default();

    let mut before = ImageWidget::new(
        config.clone(),
        Arc::new(NoCamera),
        Box::new(FileStore::new(&storage)),
    )
    .unwrap();
    before.select_file(&mut PathSelector::new(&image)).await.unwrap();
    let expected = before.preview().cloned().unwrap();
    drop(before);

    let mut after =
        ImageWidget::new(config.clone(), Arc::new(NoCamera), Box::new(FileStore::new(&storage)))
            .unwrap();
    assert!(after.restore_on_init());
    assert_eq!(after.preview(), Some(&expected));
    assert_eq!(after.preview().unwrap().decode().unwrap(), b"glass jar");

    after.clear();
    let mut fresh =
        ImageWidget::new(config, Arc::new(NoCamera), Box::new(FileStore::new(&storage))).unwrap();
    assert!(!fresh.restore_on_init());
    assert!(fresh.preview().is_none());
}

#[tokio::test]
async fn corrupt_storage_file_is_recovered_by_the_widget() {
    let dir = tempfile::tempdir().unwrap();
    let storage = dir.path().join("storage.json");
    std::fs::write(&storage, "{ not json").unwrap();
    let image = write_image(dir.path(), "cup.png", b"paper cup");
    let config = WidgetConfig::default();

    let mut widget = ImageWidget::new(
        config.clone(),
        Arc::new(NoCamera),
        Box::new(FileStore::new(&storage)),
    )
    .unwrap();
    assert!(!widget.restore_on_init());
    assert!(widget.storage_warning().unwrap().contains("corrupt"));

    widget.clear();
    assert_eq!(widget.storage_warning(), None);

    std::fs::write(&storage, "{ not json").unwrap();
    widget.select_file(&mut PathSelector::new(&image)).await.unwrap();
    assert_eq!(widget.storage_warning(), None);

    let mut reloaded =
        ImageWidget::new(config, Arc::new(NoCamera), Box::new(FileStore::new(&storage))).unwrap();
    assert!(reloaded.restore_on_init());
    assert_eq!(reloaded.preview().unwrap().decode().unwrap(), b"paper cup");
}

#[tokio::test]
async fn failed_save_leaves_no_stale_preview_for_reload() {
    let dir = tempfile::tempdir().unwrap();
    let small = write_image(dir.path(), "small.png", b"A");
    let big = write_image(dir.path(), "big.png", &[0u8; 4096]);
    let slot = MemoryStore::with_quota(200);
    let config = WidgetConfig::default();

    let mut widget =
        ImageWidget::new(config.clone(), Arc::new(NoCamera), Box::new(slot.clone())).unwrap();
    widget.select_file(&mut PathSelector::new(&small)).await.unwrap();
    widget.select_file(&mut PathSelector::new(&big)).await.unwrap();
    assert!(widget.storage_warning().unwrap().contains("quota"));
    assert_eq!(widget.raw_image().unwrap().filename, "big.png");

    let mut reloaded = ImageWidget::new(config, Arc::new(NoCamera), Box::new(slot)).unwrap();
    assert!(!reloaded.restore_on_init());
    assert!(reloaded.preview().is_none());
}
