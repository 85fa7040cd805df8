//! CLI binary for recycle-lens.
//!
//! A thin shim over [`recycle_lens::ImageWidget`]: each subcommand mounts a
//! widget over the on-disk preview slot, performs one user action, and
//! prints the resulting status text.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use recycle_lens::{
    FileStore, HeadlessSurface, ImageWidget, LensError, NoCamera, PathSelector, ReplayCamera,
    WidgetConfig,
};
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Classify an existing photo
  recycle-lens classify bottle.jpg

  # Replay a still image as a camera, capture it, and classify the capture
  recycle-lens capture --source can.png --upload

  # Show the preview persisted by the last acquisition
  recycle-lens preview

  # Forget the persisted preview
  recycle-lens clear

  # Talk to a classifier elsewhere
  recycle-lens --endpoint http://10.0.0.5:8000 classify bottle.jpg

ENVIRONMENT VARIABLES:
  RECYCLE_LENS_ENDPOINT   Classifier base URL (default http://localhost:8000)
  RECYCLE_LENS_STORAGE    Path of the persisted preview slot
  RUST_LOG                Override log filtering (e.g. recycle_lens=debug)
"#;

/// Pick or capture a photo and classify it with a remote recycling model.
#[derive(Parser, Debug)]
#[command(
    name = "recycle-lens",
    version,
    about = "Pick or capture a photo and classify it with a remote recycling model",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Classifier base URL.
    #[arg(long, global = true, env = "RECYCLE_LENS_ENDPOINT", default_value = "http://localhost:8000")]
    endpoint: String,

    /// JSON file holding the persisted preview.
    #[arg(long, global = true, env = "RECYCLE_LENS_STORAGE", default_value = ".recycle-lens/storage.json")]
    storage: PathBuf,

    /// Upload request timeout in seconds (default: none).
    #[arg(long, global = true, env = "RECYCLE_LENS_TIMEOUT")]
    timeout: Option<u64>,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "RECYCLE_LENS_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "RECYCLE_LENS_QUIET")]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Select an image file and classify it.
    Classify {
        /// Image file to upload.
        image: PathBuf,
    },

    /// Capture a frame from a replayed camera source.
    Capture {
        /// Still image replayed as the camera feed.
        #[arg(long)]
        source: PathBuf,

        /// Delay before the replayed camera decodes its first frame.
        #[arg(long, default_value_t = 50)]
        warmup_ms: u64,

        /// Classify the captured frame right away.
        #[arg(long)]
        upload: bool,
    },

    /// Show the persisted preview.
    Preview,

    /// Print the widget state as JSON.
    Status,

    /// Remove the persisted preview.
    Clear,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "error"
    } else {
        "warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let config = build_config(&cli)?;

    match &cli.command {
        Command::Classify { image } => {
            let mut widget = mount(config, Arc::new(NoCamera), &cli)?;
            widget
                .select_file(&mut PathSelector::new(image))
                .await
                .with_context(|| format!("Failed to select {}", image.display()))?;
            report_storage(&widget, &cli);
            upload(&mut widget, &cli).await?;
        }

        Command::Capture {
            source,
            warmup_ms,
            upload: and_upload,
        } => {
            let camera = ReplayCamera::from_path(source)
                .context("Failed to open camera source")?
                .with_warmup(Duration::from_millis(*warmup_ms));
            let mut widget = mount(config, Arc::new(camera), &cli)?;
            let surface = Arc::new(HeadlessSurface::new());

            widget.open_camera().await.context("Failed to open camera")?;
            widget.bind_preview(surface).await;
            widget
                .wait_for_first_frame()
                .await
                .context("Camera produced no frame")?;
            widget.capture().context("Capture failed")?;
            report_storage(&widget, &cli);

            if !cli.quiet {
                if let Some(raw) = widget.raw_image() {
                    eprintln!(
                        "{} captured {}  {}",
                        green("✔"),
                        bold(&raw.filename),
                        dim(&format!("{} bytes", raw.len()))
                    );
                }
            }
            if *and_upload {
                upload(&mut widget, &cli).await?;
            }
        }

        Command::Preview => {
            let widget = mount(config, Arc::new(NoCamera), &cli)?;
            match widget.preview() {
                Some(preview) => {
                    let size = preview.decode().map(|b| b.len()).unwrap_or(0);
                    let head: String = preview.as_str().chars().take(64).collect();
                    println!("MIME:     {}", preview.mime());
                    println!("Size:     {} bytes", size);
                    println!("Data URI: {}…", head);
                }
                None => println!("No image selected"),
            }
        }

        Command::Status => {
            let widget = mount(config, Arc::new(NoCamera), &cli)?;
            let json = serde_json::to_string_pretty(&widget.view())
                .context("Failed to serialise widget state")?;
            println!("{json}");
        }

        Command::Clear => {
            let mut widget = mount(config, Arc::new(NoCamera), &cli)?;
            widget.clear();
            report_storage(&widget, &cli);
            if !cli.quiet {
                eprintln!("{} preview cleared", green("✔"));
            }
        }
    }

    Ok(())
}

/// Map CLI flags to `WidgetConfig`.
fn build_config(cli: &Cli) -> Result<WidgetConfig> {
    let mut builder = WidgetConfig::builder().endpoint(cli.endpoint.clone());
    if let Some(secs) = cli.timeout {
        builder = builder.request_timeout_secs(secs);
    }
    builder.build().context("Invalid configuration")
}

/// Build a widget over the on-disk slot and restore its preview.
fn mount(
    config: WidgetConfig,
    device: Arc<dyn recycle_lens::CameraDevice>,
    cli: &Cli,
) -> Result<ImageWidget> {
    let storage = Box::new(FileStore::new(&cli.storage));
    let mut widget = ImageWidget::new(config, device, storage).context("Failed to set up widget")?;
    widget.restore_on_init();
    report_storage(&widget, cli);
    Ok(widget)
}

fn report_storage(widget: &ImageWidget, cli: &Cli) {
    if cli.quiet {
        return;
    }
    if let Some(warning) = widget.storage_warning() {
        eprintln!("{} {}", red("⚠"), warning);
    }
}

/// Upload with a spinner and print the prediction.
async fn upload(widget: &mut ImageWidget, cli: &Cli) -> Result<()> {
    let spinner = if cli.quiet {
        ProgressBar::hidden()
    } else {
        let bar = ProgressBar::new_spinner();
        bar.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]),
        );
        bar.set_prefix("Uploading");
        bar.set_message(widget.config().predict_url());
        bar.enable_steady_tick(Duration::from_millis(80));
        bar
    };

    let result = widget.upload().await;
    spinner.finish_and_clear();

    match result {
        Ok(prediction) => {
            println!("{}", prediction.message());
            Ok(())
        }
        Err(e @ LensError::NoImageSelected) => Err(e).context("Nothing to upload"),
        Err(e) => Err(e).context("Upload failed"),
    }
}
