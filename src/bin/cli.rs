//! tether Client
//!
//! Connects to a relay server, forwards stdin lines, and prints
//! whatever the server relays back.

use std::io::{self, BufRead};
use std::sync::Arc;
use std::thread;

use clap::Parser;
use tracing_subscriber::{fmt, EnvFilter};

use tether::{Config, Overlay, Target, TetherError};

/// tether client
#[derive(Parser, Debug)]
#[command(name = "tether-cli")]
#[command(about = "Line-oriented client for the tether relay server")]
#[command(version)]
struct Args {
    /// Server IPv4 address
    #[arg(short, long, default_value = "127.0.0.1")]
    address: String,

    /// Server port
    #[arg(short, long, default_value = "9000")]
    port: u16,

    /// Send one message and exit instead of reading stdin
    #[arg(short, long)]
    message: Option<String>,

    /// Receive buffer capacity in bytes
    #[arg(short = 'r', long, default_value = "4096")]
    recv_buffer: usize,
}

fn main() {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    fmt().with_env_filter(filter).with_target(false).init();

    let args = Args::parse();

    if let Err(e) = run(&args) {
        tracing::error!("{}", e);
        std::process::exit(1);
    }
}

fn run(args: &Args) -> tether::Result<()> {
    let overlay = Arc::new(Overlay::new(Config::default())?);

    overlay.configure_remote(&args.address, args.port)?;
    overlay.connect()?;

    // One-shot mode: send and leave.
    if let Some(message) = &args.message {
        overlay.send(Target::Primary, message.as_bytes())?;
        return overlay.release(Target::Primary);
    }

    // Printer thread for everything the server relays to us.
    let receiver = Arc::clone(&overlay);
    let recv_buffer = args.recv_buffer;
    thread::spawn(move || loop {
        match receiver.receive(Target::Primary, recv_buffer) {
            Ok(payload) if payload.is_empty() => {
                tracing::info!("server closed the connection");
                std::process::exit(0);
            }
            Ok(payload) => println!("{}", String::from_utf8_lossy(&payload)),
            Err(TetherError::ReceiveOverflow { capacity }) => {
                tracing::warn!("dropped payload larger than {} bytes", capacity);
            }
            Err(e) => {
                tracing::error!("receive failed: {}", e);
                std::process::exit(1);
            }
        }
    });

    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        let Ok(line) = line else { break };
        overlay.send(Target::Primary, line.as_bytes())?;
    }

    overlay.release(Target::Primary)
}
