//! tether Relay Server
//!
//! Accepts connections and relays every payload received from one
//! peer to all other connected peers.

use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::{fmt, EnvFilter};

use tether::{Acceptor, Config, Handle, Overlay, Target, TetherError};

/// tether relay server
#[derive(Parser, Debug)]
#[command(name = "tether-server")]
#[command(about = "Broadcast relay server built on the tether overlay")]
#[command(version)]
struct Args {
    /// Port to listen on
    #[arg(short, long, default_value = "9000")]
    port: u16,

    /// Listen backlog (max simultaneous pending connections)
    #[arg(short, long, default_value = "10")]
    backlog: u32,

    /// Worker threads handling peer traffic
    #[arg(short, long, default_value = "4")]
    workers: usize,

    /// Receive buffer capacity in bytes
    #[arg(short = 'r', long, default_value = "4096")]
    recv_buffer: usize,
}

fn main() {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tether=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .init();

    let args = Args::parse();

    tracing::info!("tether server v{}", tether::VERSION);
    tracing::info!("Listen port: {}", args.port);

    let config = Config::builder().max_simultaneous(args.backlog).build();

    let overlay = match Overlay::new(config) {
        Ok(overlay) => Arc::new(overlay),
        Err(e) => {
            tracing::error!("Failed to open overlay socket: {}", e);
            std::process::exit(1);
        }
    };

    overlay.configure_local(args.port);
    if let Err(e) = overlay.bind().and_then(|_| overlay.listen()) {
        tracing::error!("Failed to start listener: {}", e);
        std::process::exit(1);
    }

    let recv_buffer = args.recv_buffer;
    let acceptor = Acceptor::new(Arc::clone(&overlay), args.workers);

    if let Err(e) = acceptor.serve(move |overlay, handle| relay(overlay, handle, recv_buffer)) {
        tracing::error!("Accept loop failed: {}", e);
        std::process::exit(1);
    }

    tracing::info!("Server stopped");
}

/// Pump one peer: every payload it sends goes out to everyone else
fn relay(overlay: Arc<Overlay>, handle: Handle, recv_buffer: usize) {
    loop {
        let payload = match overlay.receive(handle.into(), recv_buffer) {
            // Peer hung up gracefully
            Ok(payload) if payload.is_empty() => break,
            Ok(payload) => payload,
            Err(TetherError::ReceiveOverflow { capacity }) => {
                tracing::warn!(%handle, "dropping payload larger than {} bytes", capacity);
                continue;
            }
            Err(e) => {
                tracing::debug!(%handle, "receive failed: {}", e);
                break;
            }
        };

        let targets: Vec<Target> = overlay
            .handles()
            .into_iter()
            .filter(|&peer| peer != handle)
            .map(Target::from)
            .collect();

        let report = overlay.broadcast(&payload, &targets);
        tracing::debug!(
            %handle,
            bytes = payload.len(),
            delivered = report.delivered.len(),
            failed = report.failed.len(),
            "relayed payload"
        );
    }

    if let Err(e) = overlay.release(handle.into()) {
        tracing::debug!(%handle, "release after disconnect: {}", e);
    }
    tracing::info!(%handle, active = overlay.active_count(), "peer disconnected");
}
