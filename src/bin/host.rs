//! Audio Host Application
//!
//! Accepts playback commands and audio uploads from a controller and plays
//! them on this machine.
//!
//! Usage: socket-audio-host [--config <file>] [--host <addr>] [--port <port>]

use anyhow::{bail, Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use socket_audio_host::{
    audio::AudioBackend,
    config::AppConfig,
    dispatch::{Dispatcher, WorkerPool},
    server::Server,
};

#[derive(Debug, Default)]
struct Args {
    config: Option<PathBuf>,
    host: Option<String>,
    port: Option<u16>,
}

fn parse_args() -> Result<Args> {
    let mut args = Args::default();
    let mut iter = std::env::args().skip(1);

    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--config" | "-c" => {
                args.config = Some(iter.next().context("--config needs a path")?.into());
            }
            "--host" => {
                args.host = Some(iter.next().context("--host needs an address")?);
            }
            "--port" | "-p" => {
                let port = iter.next().context("--port needs a number")?;
                args.port = Some(port.parse().with_context(|| format!("invalid port '{}'", port))?);
            }
            "--help" | "-h" => {
                println!("Usage: socket-audio-host [--config <file>] [--host <addr>] [--port <port>]");
                std::process::exit(0);
            }
            other => bail!("unknown argument '{}'", other),
        }
    }

    Ok(args)
}

#[cfg(feature = "device")]
fn make_backend() -> Arc<dyn AudioBackend> {
    Arc::new(socket_audio_host::audio::CpalBackend::new())
}

#[cfg(not(feature = "device"))]
fn make_backend() -> Arc<dyn AudioBackend> {
    tracing::warn!("Built without the `device` feature; audio is decoded but not played");
    Arc::new(socket_audio_host::audio::NullBackend::default())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting audio host");

    let args = parse_args()?;

    // Load config
    let mut config = match args.config.or_else(AppConfig::default_path) {
        Some(path) => AppConfig::load_or_default(&path)?,
        None => AppConfig::default(),
    };
    if let Some(host) = args.host {
        config.server.host = host;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }

    let backend = make_backend();

    // List available output devices
    println!("\n=== Available Output Devices ===");
    match backend.enumerate_devices() {
        Ok(devices) => {
            for device in &devices {
                let default_marker = if device.is_default { " [DEFAULT]" } else { "" };
                println!("  {}{}:", device.name, default_marker);
                println!("    ID: {}", device.id);
                println!("    Channels: {}", device.max_output_channels);
            }
        }
        Err(e) => println!("  (unavailable: {})", e),
    }
    println!();

    let dispatcher = Arc::new(Dispatcher::new(backend, config.session.dispatch_defaults()));
    let pool = WorkerPool::start(dispatcher, config.server.workers, config.server.job_queue_depth)
        .context("failed to start audio workers")?;
    tracing::info!("Started {} audio workers", pool.worker_count());

    let mut server = Server::bind(&config.server, pool.handle())
        .await
        .with_context(|| format!("failed to bind {}", config.server.bind_address()))?;

    tracing::info!("Press Ctrl+C to stop");

    server
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Cannot listen for Ctrl+C: {}", e);
                std::future::pending::<()>().await;
            }
        })
        .await?;

    pool.shutdown();
    tracing::info!("Audio host stopped");

    Ok(())
}
