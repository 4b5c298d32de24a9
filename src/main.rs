use anyhow::{Context, Result};
use clap::Parser;
use kyc_capture::{
    ApplicationContext, CameraBackend, CaptureConfig, CaptureMode, CaptureRequest,
    CaptureResult, CaptureSession, DocumentKind, FacingMode, NokhwaBackend, ObjectFit,
    OverlayGeometry, ScreenRect, StillImageBackend,
};
use std::fs;
use std::path::{Path, PathBuf};
use tokio::io::{AsyncBufReadExt, BufReader};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Webcam device index used for the user-facing camera
    #[arg(short, long, default_value_t = 0)]
    input_device: u32,

    /// Webcam device index used for the environment-facing camera
    /// (defaults to the input device)
    #[arg(long)]
    environment_device: Option<u32>,

    /// Stream this image instead of a webcam
    #[arg(long)]
    from_image: Option<PathBuf>,

    /// What is being captured
    #[arg(long, value_enum, default_value_t = DocumentKind::IdentityDocument)]
    kind: DocumentKind,

    /// Single shot or front and back
    #[arg(long, value_enum, default_value_t = CaptureMode::Single)]
    mode: CaptureMode,

    /// Camera to start with (defaults by document kind)
    #[arg(long, value_enum)]
    facing: Option<FacingMode>,

    /// Displayed video element as "width,height" or "left,top,width,height"
    #[arg(long, value_parser = parse_rect, default_value = "640,480")]
    display: ScreenRect,

    /// Overlay guide as "left,top,width,height" in display pixels
    /// If not provided, the full frame is captured
    #[arg(long, value_parser = parse_rect)]
    overlay: Option<ScreenRect>,

    /// How the video element scales the frame
    #[arg(long, value_enum, default_value_t = ObjectFit::Cover)]
    fit: ObjectFit,

    /// JSON capture config (crop tuning, stream constraints, quality)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory for confirmed stills and the JSON upload body
    #[arg(short, long, default_value = ".")]
    output_dir: PathBuf,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,
}

fn parse_rect(value: &str) -> std::result::Result<ScreenRect, String> {
    let parts = value
        .split(',')
        .map(|p| p.trim().parse::<f64>())
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| format!("invalid number in \"{}\": {}", value, e))?;

    match parts.as_slice() {
        [width, height] => Ok(ScreenRect::sized(*width, *height)),
        [left, top, width, height] => Ok(ScreenRect::new(*left, *top, *width, *height)),
        _ => Err(format!(
            "expected \"width,height\" or \"left,top,width,height\", got \"{}\"",
            value
        )),
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let log_level = if args.debug {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .init();

    tracing::info!("kyc-capture starting");

    let config = match &args.config {
        Some(path) => CaptureConfig::load(path)?,
        None => CaptureConfig::default(),
    };
    tracing::info!(
        "Stream: ideal {}x{}, max {}x{}, JPEG quality {}",
        config.stream.ideal_width,
        config.stream.ideal_height,
        config.stream.max_width,
        config.stream.max_height,
        config.jpeg_quality
    );

    fs::create_dir_all(&args.output_dir).with_context(|| {
        format!(
            "Failed to create output directory {}",
            args.output_dir.display()
        )
    })?;

    let mut request = CaptureRequest::new(args.kind, args.mode);
    if let Some(facing) = args.facing {
        request = request.with_facing(facing);
    }
    let overlay = args
        .overlay
        .map(|overlay| OverlayGeometry::new(args.display, overlay, args.fit));

    let mut context = ApplicationContext::new();
    let result = if let Some(path) = &args.from_image {
        let backend = StillImageBackend::open(path)?;
        run_session(backend, request, &config, overlay).await?
    } else {
        let backend = NokhwaBackend::new(
            args.input_device,
            args.environment_device.unwrap_or(args.input_device),
        );
        run_session(backend, request, &config, overlay).await?
    };

    let Some(result) = result else {
        tracing::info!("Capture cancelled");
        return Ok(());
    };

    write_stills(&args.output_dir, &result)?;
    context.record_capture(request.kind, result);

    let json_path = args.output_dir.join("kyc.json");
    fs::write(&json_path, context.to_json()?)
        .with_context(|| format!("Failed to write {}", json_path.display()))?;
    tracing::info!("Wrote upload body to {}", json_path.display());

    Ok(())
}

async fn run_session<B>(
    backend: B,
    request: CaptureRequest,
    config: &CaptureConfig,
    overlay: Option<OverlayGeometry>,
) -> Result<Option<CaptureResult>>
where
    B: CameraBackend,
{
    let mut session = CaptureSession::open(backend, request, config).await;

    let mut status = session.subscribe();
    tokio::spawn(async move {
        while status.changed().await.is_ok() {
            let current = status.borrow_and_update().clone();
            match &current.last_error {
                Some(e) => tracing::warn!("Camera error: {} (type \"retry\")", e),
                None => tracing::info!(
                    "Camera {}: {}",
                    current.facing,
                    if current.streaming { "streaming" } else { "stopped" }
                ),
            }
        }
    });

    if let Some(e) = session.last_error() {
        tracing::warn!("Camera error: {} (type \"retry\")", e);
    }
    tracing::info!("Commands: shot, retake, next, prev, switch, retry, confirm, status, quit");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await.context("Failed to read command")? {
        let outcome = match line.trim() {
            "" => continue,
            "shot" => session.shutter(overlay.as_ref()).map(|captured| {
                if !captured {
                    tracing::warn!("No image captured, try again");
                }
            }),
            "retake" => session.retake().await,
            "next" => session.next_side().await,
            "prev" => session.previous_side().await,
            "switch" => session.switch_facing().await,
            "retry" => session.retry().await,
            "confirm" => match session.confirm() {
                Ok(result) => return Ok(Some(result)),
                Err(e) => Err(e),
            },
            "status" => Ok(()),
            "quit" => break,
            other => {
                tracing::warn!("Unknown command \"{}\"", other);
                continue;
            }
        };

        if let Err(e) = outcome {
            tracing::warn!("{}", e);
        }
        tracing::info!(
            "State: {} ({:?}, side {})",
            session.state().as_str(),
            session.phase(),
            session.active_side()
        );
    }

    session.close();
    Ok(None)
}

fn write_stills(dir: &Path, result: &CaptureResult) -> Result<()> {
    let stills = match result {
        CaptureResult::Single(image) => vec![("capture.jpg", image)],
        CaptureResult::FrontBack { front, back } => {
            vec![("front.jpg", front), ("back.jpg", back)]
        }
    };

    for (name, image) in stills {
        let path = dir.join(name);
        fs::write(&path, &image.data)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        tracing::info!("Saved {} ({}x{})", path.display(), image.width, image.height);
    }
    Ok(())
}
