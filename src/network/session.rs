//! Transport Session
//!
//! Wraps one resolved connection (an accepted peer or the overlay's
//! primary socket) and performs the raw byte transfer on it. There
//! is no framing at this layer: message boundaries belong to whatever
//! protocol the caller runs on top.

use std::io::{Read, Write};
use std::net::{Shutdown, TcpStream};
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use socket2::Socket;

use crate::error::{Result, TetherError};
use crate::table::Target;

/// One send/receive-capable connection resolved from a target
///
/// A session holds its own reference to the underlying descriptor, so
/// releasing the slot mid-operation cannot hand the descriptor to a
/// recycled connection; the socket closes when the last reference
/// drops.
pub enum Session<'a> {
    /// The overlay's own listening or outbound socket
    Primary(&'a Socket),

    /// An accepted peer connection
    Peer(Arc<TcpStream>),
}

impl Session<'_> {
    /// Write the whole payload to the connection
    pub fn send(&self, bytes: &[u8]) -> Result<()> {
        match self {
            Session::Primary(socket) => {
                let mut wire: &Socket = socket;
                wire.write_all(bytes).map_err(TetherError::Send)
            }
            Session::Peer(stream) => {
                let mut wire: &TcpStream = stream.as_ref();
                wire.write_all(bytes).map_err(TetherError::Send)
            }
        }
    }

    /// One blocking read of at most `capacity` bytes
    ///
    /// A read that fills the whole buffer is rejected as
    /// `ReceiveOverflow` rather than silently truncated: the payload
    /// may continue past the buffer and the caller cannot tell. An
    /// empty result means the peer shut the connection down.
    pub fn receive(&self, capacity: usize) -> Result<Bytes> {
        let mut buf = BytesMut::zeroed(capacity);

        let n = match self {
            Session::Primary(socket) => {
                let mut wire: &Socket = socket;
                wire.read(&mut buf)
            }
            Session::Peer(stream) => {
                let mut wire: &TcpStream = stream.as_ref();
                wire.read(&mut buf)
            }
        }
        .map_err(TetherError::Receive)?;

        // Strictly >=: a read of exactly `capacity` bytes is
        // indistinguishable from a truncated longer message.
        if n >= capacity {
            return Err(TetherError::ReceiveOverflow { capacity });
        }

        buf.truncate(n);
        Ok(buf.freeze())
    }

    /// Shut the connection down in both directions
    ///
    /// Wakes any thread blocked reading this connection. The
    /// descriptor itself is reclaimed when the last holder drops.
    pub fn close(&self) -> Result<()> {
        match self {
            Session::Primary(socket) => socket.shutdown(Shutdown::Both),
            Session::Peer(stream) => stream.shutdown(Shutdown::Both),
        }
        .map_err(TetherError::Close)
    }
}

/// Outcome of a broadcast: which targets got the payload, which failed
///
/// A dead peer does not abort delivery to the rest; its failure is
/// recorded here instead.
#[derive(Debug)]
pub struct BroadcastReport {
    /// Targets that received the whole payload, in delivery order
    pub delivered: Vec<Target>,

    /// Targets that failed, with the error for each
    pub failed: Vec<(Target, TetherError)>,
}

impl BroadcastReport {
    /// True when every target received the payload
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}
