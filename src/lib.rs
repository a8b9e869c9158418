//! # tether
//!
//! A thin overlay over IPv4/TCP stream sockets: one instance acts as
//! either a TCP client or a TCP server, with accepted connections
//! addressed by stable small-integer handles that are recycled after
//! release.
//!
//! No framing, no TLS, no readiness notification: raw byte transfer
//! plus the bookkeeping that makes many concurrent connections
//! manageable from plain threads.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   Connection Acceptor                        │
//! │              (blocking accept, any thread)                   │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │ store / recycle
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                      Slot Table                              │
//! │        (arena of handles, lowest-free-index-first)           │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │ resolve handle
//!          ┌────────────┴────────────┐
//!          │                         │
//!          ▼                         ▼
//!   ┌─────────────┐          ┌─────────────┐
//!   │   Session   │          │   Session   │
//!   │ send / recv │          │ send / recv │
//!   └─────────────┘          └─────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod endpoint;
pub mod table;
pub mod network;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{Result, TetherError};
pub use config::Config;
pub use endpoint::Endpoint;
pub use table::{Handle, SlotTable, Target};
pub use network::{Acceptor, BroadcastReport, Overlay, Session};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of tether
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
