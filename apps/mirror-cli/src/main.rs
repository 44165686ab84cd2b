mod display;

use std::{env, path::PathBuf, sync::Arc, time::Duration};

use anyhow::{Context, Result};
use clap::Parser;
use mirror_capture::{CaptureHandle, FrameSlot, FrameSource};
use mirror_device::{DeviceApi, SessionManager, SessionProvider, WdaClient};
use mirror_dispatch::{ordered_transports, DispatchPool, Dispatcher, RetryPolicy};
use mirror_gesture::{CoordinateMapper, GestureClassifier};
use mirror_ops::{init_tracing, StopSignal};
use mirror_types::{config::MirrorConfig, geometry::Size};
use tracing::{info, warn};

#[derive(Debug, Parser)]
#[command(
    name = "mirror",
    about = "Mirror an iOS device through WebDriverAgent and drive it with the mouse"
)]
struct Args {
    /// TOML config file. Falls back to $MIRROR_CONFIG, then built-in defaults.
    #[arg(long)]
    config: Option<PathBuf>,
    /// WebDriverAgent base URL.
    #[arg(long)]
    url: Option<String>,
    /// Attach to this bundle instead of the foreground app.
    #[arg(long)]
    bundle: Option<String>,
    /// Skip the MJPEG stream and poll screenshots.
    #[arg(long)]
    poll_only: bool,
    /// Send touches through session actions before the raw endpoints.
    #[arg(long)]
    prefer_session_transport: bool,
    #[arg(long)]
    log_level: Option<String>,
}

/// Everything started before the window opens.
struct Mirror {
    slot: FrameSlot,
    mapper: CoordinateMapper,
    initial_canvas: Size,
    capture: CaptureHandle,
    dispatcher: Arc<Dispatcher>,
    pool: DispatchPool,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let config = load_config(&args)?;
    init_tracing(&config.ops)?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;
    let stop = StopSignal::new();

    let Mirror {
        slot,
        mapper,
        initial_canvas,
        capture,
        dispatcher,
        pool,
    } = runtime.block_on(connect(&config, stop.clone()))?;
    let classifier = GestureClassifier::new(config.gesture.clone());

    // minifb needs the main thread; device I/O stays on the runtime workers.
    let rendered = display::run(
        &config.display,
        initial_canvas,
        mapper,
        slot,
        classifier,
        pool.submitter(),
        &stop,
    );
    stop.stop();

    let grace = config.dispatch.shutdown_grace();
    runtime.block_on(async {
        pool.shutdown(grace).await;
        if tokio::time::timeout(grace, capture.join()).await.is_err() {
            warn!("capture tasks did not stop within the grace period");
        }
        let metrics = dispatcher.metrics();
        info!(
            delivered = metrics.delivered,
            dropped = metrics.dropped,
            fallbacks = metrics.fallbacks,
            recoveries = metrics.recoveries,
            last_latency_ms = metrics.last_latency.as_ref().map(|sample| sample.total_ms),
            "dispatch summary"
        );
    });
    runtime.shutdown_timeout(Duration::from_millis(500));
    rendered
}

async fn connect(config: &MirrorConfig, stop: StopSignal) -> Result<Mirror> {
    let client = WdaClient::new(config.device.clone())?;
    let status = client
        .status()
        .await
        .with_context(|| format!("automation service at {} unreachable", config.device.base_url))?;
    info!(base_url = %config.device.base_url, %status, "automation service status");

    let sessions = Arc::new(SessionManager::new(
        client.clone(),
        &config.device,
        config.session.clone(),
    ));
    let session = sessions.ensure_session().await?;
    let device = client.window_size(&session).await?;
    info!(width = device.width, height = device.height, "device window size (pt)");

    let slot = FrameSlot::new();
    let capture = FrameSource::new(
        Arc::new(client.clone()),
        slot.clone(),
        stop.clone(),
        config.capture.clone(),
    )
    .start()
    .await;

    // Size the window from the first frame when one arrives in time.
    slot.wait_for_newer(0, config.device.image_timeout()).await;
    let source = match slot.latest() {
        Some(frame) => frame.size(),
        None => {
            warn!("no frame yet; sizing the window from the device window size");
            Size::new(device.width.round() as u32, device.height.round() as u32)
        }
    };
    let initial_canvas =
        display::fit_canvas(source, config.display.max_width, config.display.max_height);

    let provider: Arc<dyn SessionProvider> = sessions;
    let dispatcher = Arc::new(Dispatcher::new(
        ordered_transports(&client, config.dispatch.prefer_raw),
        provider,
        RetryPolicy {
            recovery_attempts: config.dispatch.recovery_attempts,
        },
        stop.clone(),
    ));
    let pool = DispatchPool::spawn(
        dispatcher.clone(),
        config.dispatch.workers,
        config.dispatch.queue_capacity,
        stop,
    );

    Ok(Mirror {
        slot,
        mapper: CoordinateMapper::new(device),
        initial_canvas,
        capture,
        dispatcher,
        pool,
    })
}

fn load_config(args: &Args) -> Result<MirrorConfig> {
    let path = args
        .config
        .clone()
        .or_else(|| env::var_os("MIRROR_CONFIG").map(PathBuf::from));
    let mut config = match path {
        Some(path) => match MirrorConfig::from_file(&path) {
            Ok(config) => config,
            Err(err) => {
                eprintln!(
                    "Failed to load config from '{}': {err}. Falling back to internal defaults.",
                    path.display()
                );
                MirrorConfig::default()
            }
        },
        None => MirrorConfig::default(),
    };

    if let Some(url) = &args.url {
        config.device.base_url = url.clone();
    }
    if let Some(bundle) = &args.bundle {
        config.device.target_bundle = Some(bundle.clone());
    }
    if args.poll_only {
        config.capture.prefer_stream = false;
    }
    if args.prefer_session_transport {
        config.dispatch.prefer_raw = false;
    }
    if let Some(level) = &args.log_level {
        config.ops.log_level = level.clone();
    }

    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_override_file_values() {
        let args = Args::parse_from([
            "mirror",
            "--url",
            "http://10.0.0.7:8100",
            "--bundle",
            "com.example.notes",
            "--poll-only",
            "--prefer-session-transport",
            "--log-level",
            "debug",
        ]);
        let config = load_config(&args).expect("config");

        assert_eq!(config.device.base_url, "http://10.0.0.7:8100");
        assert_eq!(config.device.target_bundle.as_deref(), Some("com.example.notes"));
        assert!(!config.capture.prefer_stream);
        assert!(!config.dispatch.prefer_raw);
        assert_eq!(config.ops.log_level, "debug");
    }

    #[test]
    fn empty_url_is_rejected() {
        let args = Args::parse_from(["mirror", "--url", " "]);
        assert!(load_config(&args).is_err());
    }
}
