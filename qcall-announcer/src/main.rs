//! Queue Call Announcer (qcall-announcer) - Main entry point
//!
//! Headless announcement node: follows the queue server's push channel,
//! plays each call through the audio device and serves the view feed.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use qcall_announcer::api::{self, AppContext};
use qcall_announcer::audio::{AudioEngine, CpalEngine, HttpClipSource, VirtualEngine};
use qcall_announcer::config::{AnnouncerConfig, ConfigOverrides};
use qcall_announcer::connection::{ConnectionExit, WsConnector};
use qcall_announcer::engine::{AnnouncementEngine, EngineParts, EngineSettings};
use qcall_announcer::marquee::MarqueePoller;
use qcall_announcer::notify::FeedNotifier;
use qcall_announcer::playback::DispatcherSettings;
use qcall_announcer::SharedState;
use qcall_common::time::millis_to_duration;

/// Output rate of the clock-only engine
const VIRTUAL_SAMPLE_RATE: u32 = 44_100;

/// Command-line arguments for qcall-announcer
#[derive(Parser, Debug)]
#[command(name = "qcall-announcer")]
#[command(about = "Queue call announcer for display nodes")]
#[command(version)]
struct Args {
    /// Path to announcer.toml
    #[arg(short, long, env = "QCALL_CONFIG")]
    config: Option<PathBuf>,

    /// Push channel WebSocket URL
    #[arg(long, env = "QCALL_PUSH_URL")]
    push_url: Option<String>,

    /// Base URL announcement clips are fetched from
    #[arg(long, env = "QCALL_CLIP_BASE_URL")]
    clip_base_url: Option<String>,

    /// View feed port
    #[arg(short, long, env = "QCALL_PORT")]
    port: Option<u16>,

    /// Only announce calls for this unit
    #[arg(long, env = "QCALL_UNIT_ID")]
    unit_id: Option<String>,

    /// Run without an audio device
    #[arg(long)]
    no_audio: bool,

    /// Output device name
    #[arg(long)]
    device: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let overrides = ConfigOverrides {
        push_url: args.push_url,
        clip_base_url: args.clip_base_url,
        port: args.port,
        unit_id: args.unit_id,
        device: args.device,
        no_audio: args.no_audio,
    };
    let (config, config_path) = AnnouncerConfig::load(args.config.as_deref(), overrides)
        .context("Failed to load configuration")?;

    // RUST_LOG wins over the configured level
    let level = config.logging.level.clone();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("qcall_announcer={level},qcall_common={level},tower_http=warn").into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting qcall announcer v{}", env!("CARGO_PKG_VERSION"));
    match &config_path {
        Some(path) => info!("Configuration loaded from {}", path.display()),
        None => info!("No configuration file found, using defaults"),
    }
    info!("Push channel: {}", config.push.url);
    info!("Clip source: {}", config.clips.base_url);
    if let Some(unit) = config.unit_filter() {
        info!("Announcing calls for unit {} only", unit);
    }

    let root = CancellationToken::new();
    let state = Arc::new(SharedState::new());

    let (audio, audio_output, clock_driver) = open_audio(&config, &root);

    let mut services = Vec::new();

    if config.http.enabled {
        let addr = config.http_addr()?;
        let ctx = AppContext {
            state: Arc::clone(&state),
            audio_output,
        };
        let cancel = root.clone();
        services.push(tokio::spawn(async move {
            if let Err(e) = api::run(addr, ctx, cancel).await {
                warn!("View feed stopped: {}", e);
            }
        }));
    }

    if let Some(url) = config.marquee_url() {
        let poller = MarqueePoller::new(
            url,
            Duration::from_secs(config.api.marquee_poll_interval_secs),
            millis_to_duration(config.clips.request_timeout_ms),
        )
        .context("Failed to create marquee poller")?;
        services.push(tokio::spawn(poller.run(Arc::clone(&state), root.clone())));
    }

    {
        let root = root.clone();
        tokio::spawn(async move {
            shutdown_signal().await;
            root.cancel();
        });
    }

    let settings = EngineSettings {
        lead_time: config.lead_time(),
        dispatcher: DispatcherSettings {
            display_hold: config.display_hold(),
            unit_filter: config.unit_filter(),
        },
        reconnect: config.reconnect_policy(),
        static_prefix: config.clips.static_prefix.clone(),
    };

    let mut generation = 1u64;
    loop {
        // Fresh clip source and connector per generation
        let parts = EngineParts {
            audio: Arc::clone(&audio),
            clips: Arc::new(
                HttpClipSource::new(
                    &config.clips.base_url,
                    millis_to_duration(config.clips.request_timeout_ms),
                )
                .context("Failed to create clip source")?,
            ),
            connector: Arc::new(WsConnector::new(
                config.push.url.clone(),
                millis_to_duration(config.push.connect_timeout_ms),
            )),
            notifier: Arc::new(FeedNotifier::new(Arc::clone(&state))),
        };

        info!(generation, "Starting announcement engine");
        let engine = AnnouncementEngine::start(
            settings.clone(),
            parts,
            Arc::clone(&state),
            root.child_token(),
        );

        match engine.run().await {
            ConnectionExit::ReloadRequested if !root.is_cancelled() => {
                warn!(generation, "Reloading announcement engine");
                generation += 1;
            }
            _ => break,
        }
    }

    root.cancel();
    for service in services {
        let _ = service.await;
    }
    if let Some(driver) = clock_driver {
        let _ = driver.await;
    }

    info!("Shutdown complete");
    Ok(())
}

/// Open the configured audio device, falling back to the clock-only engine
fn open_audio(
    config: &AnnouncerConfig,
    root: &CancellationToken,
) -> (Arc<dyn AudioEngine>, String, Option<tokio::task::JoinHandle<()>>) {
    if config.audio.enabled {
        match CpalEngine::open(config.audio.device.as_deref(), config.audio.volume) {
            Ok(engine) => {
                let name = engine.device_name().to_string();
                let engine: Arc<dyn AudioEngine> = Arc::new(engine);
                return (engine, name, None);
            }
            Err(e) => warn!("Audio device unavailable ({}), running without sound", e),
        }
    } else {
        info!("Audio disabled, running without sound");
    }

    let engine = Arc::new(VirtualEngine::new(VIRTUAL_SAMPLE_RATE));
    let driver = engine.spawn_realtime(root.clone());
    let engine: Arc<dyn AudioEngine> = engine;
    (engine, "virtual".to_string(), Some(driver))
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
