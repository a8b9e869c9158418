//! Error types for tether
//!
//! Provides a unified error type for all operations. Every failure is
//! surfaced to the caller as a typed value; nothing in this library
//! terminates the process.

use thiserror::Error;

use crate::table::Handle;

/// Result type alias using TetherError
pub type Result<T> = std::result::Result<T, TetherError>;

/// Unified error type for tether operations
#[derive(Debug, Error)]
pub enum TetherError {
    // -------------------------------------------------------------------------
    // Socket Lifecycle Errors
    // -------------------------------------------------------------------------
    #[error("socket creation failed: {0}")]
    SocketCreation(#[source] std::io::Error),

    #[error("socket option failed: {0}")]
    SocketOption(#[source] std::io::Error),

    #[error("bind failed: {0}")]
    Bind(#[source] std::io::Error),

    #[error("listen failed: {0}")]
    Listen(#[source] std::io::Error),

    #[error("connect failed: {0}")]
    Connect(#[source] std::io::Error),

    #[error("accept failed: {0}")]
    Accept(#[source] std::io::Error),

    #[error("close failed: {0}")]
    Close(#[source] std::io::Error),

    // -------------------------------------------------------------------------
    // Transfer Errors
    // -------------------------------------------------------------------------
    #[error("send failed: {0}")]
    Send(#[source] std::io::Error),

    #[error("receive failed: {0}")]
    Receive(#[source] std::io::Error),

    /// The incoming payload filled the whole receive buffer, so it may
    /// have been truncated mid-message. Recoverable: retry with a
    /// larger buffer.
    #[error("received payload filled the whole {capacity}-byte buffer")]
    ReceiveOverflow { capacity: usize },

    // -------------------------------------------------------------------------
    // Addressing Errors
    // -------------------------------------------------------------------------
    #[error("invalid IPv4 address: {0}")]
    InvalidAddress(String),

    #[error("handle {0} does not refer to an active connection")]
    StaleHandle(Handle),

    #[error("{0} endpoint not configured")]
    MissingEndpoint(&'static str),
}

impl TetherError {
    /// OS errno of the underlying I/O failure, when there is one
    pub fn raw_os_error(&self) -> Option<i32> {
        match self {
            TetherError::SocketCreation(e)
            | TetherError::SocketOption(e)
            | TetherError::Bind(e)
            | TetherError::Listen(e)
            | TetherError::Connect(e)
            | TetherError::Accept(e)
            | TetherError::Close(e)
            | TetherError::Send(e)
            | TetherError::Receive(e) => e.raw_os_error(),
            _ => None,
        }
    }
}
