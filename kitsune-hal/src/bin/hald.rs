//! Kitsune HAL daemon.
//!
//! Opens the configured platform's driver table and serves it over TCP to
//! guest runtimes speaking the tunnel wire protocol.

use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal::unix::{self, SignalKind};
use tokio::sync::Mutex;
use tokio_util::{
    sync::CancellationToken,
    task::TaskTracker,
};

use kitsune_hal::config::Config;
use kitsune_hal::dispatch::Dispatcher;
use kitsune_hal::platform;
use kitsune_hal::tracing::{self, prelude::*};
use kitsune_hal::tunnel::server;

#[derive(Parser)]
#[command(name = "kitsune-hald", about = "Peripheral capability daemon")]
struct Args {
    /// Path to the configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing::init_journald_or_stdout();

    let args = Args::parse();
    let config = match &args.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };

    let descriptor = platform::find_platform(&config.platform.name)
        .with_context(|| format!("Unknown platform '{}'", config.platform.name))?;
    let table = (descriptor.build)().open(&config).await?;
    let dispatcher = Arc::new(Mutex::new(Dispatcher::new(table)));

    let listener = TcpListener::bind(&config.daemon.listen)
        .await
        .with_context(|| format!("Failed to bind {}", config.daemon.listen))?;

    let running = CancellationToken::new();
    let tracker = TaskTracker::new();
    info!(listen = %config.daemon.listen, platform = descriptor.name, "Started.");

    let mut sigint = unix::signal(SignalKind::interrupt())?;
    let mut sigterm = unix::signal(SignalKind::terminate())?;
    loop {
        tokio::select! {
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, peer)) => {
                        debug!(%peer, "Guest connected.");
                        let dispatcher = dispatcher.clone();
                        let token = running.clone();
                        tracker.spawn(async move {
                            match server::serve(stream, dispatcher, token).await {
                                Ok(()) => debug!(%peer, "Guest disconnected."),
                                Err(e) => warn!(%peer, error = %e, "Connection failed."),
                            }
                        });
                    }
                    Err(e) => warn!(error = %e, "Accept failed."),
                }
            }
            _ = sigint.recv() => break,
            _ = sigterm.recv() => break,
        }
    }

    trace!("Shutting down.");
    running.cancel();
    tracker.close();
    tracker.wait().await;
    info!("Exiting.");

    Ok(())
}
