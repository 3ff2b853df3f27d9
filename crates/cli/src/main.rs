use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::net::TcpListener;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

use rtpbridge_cli::{router, AppState, BridgeConfig, Overrides};
use rtpbridge_infra_common::logging::log_welcome;
use rtpbridge_infra_common::setup_logging;
use rtpbridge_session_core::SessionCoordinator;
use rtpbridge_webrtc::WebRtcEngine;

/// Relay a raw RTP stream into a WebRTC session and capture the peer's video
#[derive(Parser, Debug)]
#[command(name = "rtpbridge", version, about)]
struct Args {
    /// TOML configuration file
    #[arg(short, long, env = "RTPBRIDGE_CONFIG")]
    config: Option<PathBuf>,

    /// HTTP signaling address
    #[arg(long)]
    http_bind: Option<String>,

    /// UDP address the RTP source sends to
    #[arg(long)]
    relay_listen: Option<String>,

    /// Attempt a sample pop every N packets
    #[arg(long)]
    decimation: Option<u32>,

    /// Directory for captured IVF files
    #[arg(long)]
    output_dir: Option<String>,

    #[arg(long)]
    max_sessions: Option<usize>,

    #[arg(long)]
    log_level: Option<String>,

    /// Log as JSON lines
    #[arg(long)]
    json_logs: bool,

    /// Print the effective configuration and exit
    #[arg(long)]
    print_config: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let overrides = Overrides {
        http_bind: args.http_bind,
        relay_listen: args.relay_listen,
        decimation: args.decimation,
        output_dir: args.output_dir,
        max_sessions: args.max_sessions,
        log_level: args.log_level,
        json_logs: args.json_logs,
    };
    let config = BridgeConfig::load(args.config, overrides)?;

    if args.print_config {
        println!("{}", toml::to_string_pretty(&config)?);
        return Ok(());
    }

    setup_logging(config.logging_config()?)?;
    log_welcome("rtpbridge", env!("CARGO_PKG_VERSION"));

    let engine = Arc::new(WebRtcEngine::new(config.engine.clone())?);
    let coordinator = SessionCoordinator::new(config.session_config(), engine)?;

    let mut events = coordinator.subscribe();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => match serde_json::to_string(&event) {
                    Ok(json) => info!("Session event: {}", json),
                    Err(e) => debug!("Unserializable session event: {}", e),
                },
                Err(RecvError::Lagged(missed)) => warn!("Missed {} session events", missed),
                Err(RecvError::Closed) => break,
            }
        }
    });

    let state = AppState {
        coordinator: Arc::clone(&coordinator),
        demo_page: config.server.demo_page.clone(),
    };
    let app = router(state, &config.server.allow_origin);

    let listener = TcpListener::bind(config.server.http_bind)
        .await
        .with_context(|| format!("failed to bind {}", config.server.http_bind))?;
    info!("Signaling on http://{}", listener.local_addr()?);

    let shutdown_coordinator = Arc::clone(&coordinator);
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Failed to listen for Ctrl-C: {}", e);
                std::future::pending::<()>().await;
            }
            info!("Ctrl-C received, shutting down");
            // Unblocks requests waiting for a session slot
            shutdown_coordinator.shutdown().await;
        })
        .await?;

    info!("rtpbridge stopped");
    Ok(())
}
