//! Overlay Instance
//!
//! One primary socket (listening for servers, outbound for clients),
//! the slot table of accepted peers, and the configured endpoints.
//!
//! ## Lifecycle
//! - Server: `configure_local` → `bind` → `listen` → `accept`
//!   (repeatedly) → send/receive/broadcast by handle → `release`
//! - Client: `configure_remote` → `connect` → send/receive on
//!   `Target::Primary`
//!
//! ## Concurrency
//! All methods take `&self`; share one overlay across threads with
//! `Arc`. The blocking accept syscall runs outside the table lock, so
//! any number of threads may wait for connections concurrently; only
//! the slot-table mutation itself is serialized. Send and receive on
//! distinct handles never contend.

use std::io::ErrorKind;
use std::net::TcpStream;
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;
use socket2::{Domain, Protocol, Socket, Type};

use crate::config::Config;
use crate::endpoint::Endpoint;
use crate::error::{Result, TetherError};
use crate::table::{Handle, SlotTable, Target};

use super::session::{BroadcastReport, Session};

/// A TCP overlay instance, usable as either server or client
pub struct Overlay {
    /// The listening (server) or outbound (client) socket
    socket: Socket,

    /// Accepted peer connections, indexed by handle
    table: SlotTable<Arc<TcpStream>>,

    /// Local bind endpoint (refreshed from the kernel after bind, so
    /// binding port 0 reports the assigned port)
    local: Mutex<Option<Endpoint>>,

    /// Dial target, or the address of the last accepted peer
    remote: Mutex<Option<Endpoint>>,

    /// Instance configuration
    config: Config,
}

impl Overlay {
    /// Open the primary socket with `SO_REUSEADDR` set
    pub fn new(config: Config) -> Result<Self> {
        let socket = Socket::new(Domain::IPV4, Type::STREAM, Some(Protocol::TCP))
            .map_err(TetherError::SocketCreation)?;

        socket
            .set_reuse_address(true)
            .map_err(TetherError::SocketOption)?;

        tracing::debug!("overlay socket opened");

        Ok(Self {
            socket,
            table: SlotTable::new(),
            local: Mutex::new(None),
            remote: Mutex::new(None),
            config,
        })
    }

    // =========================================================================
    // Endpoint Configuration
    // =========================================================================

    /// Set the local endpoint to the wildcard address and `port`
    pub fn configure_local(&self, port: u16) {
        *self.local.lock() = Some(Endpoint::local(port));
    }

    /// Set the remote endpoint from a dotted-decimal IPv4 literal
    pub fn configure_remote(&self, addr: &str, port: u16) -> Result<()> {
        *self.remote.lock() = Some(Endpoint::remote(addr, port)?);
        Ok(())
    }

    /// The configured local endpoint, if any
    pub fn local_endpoint(&self) -> Option<Endpoint> {
        *self.local.lock()
    }

    /// The configured dial target, or the last accepted peer's address
    pub fn remote_endpoint(&self) -> Option<Endpoint> {
        *self.remote.lock()
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Bind the primary socket to the configured local endpoint
    pub fn bind(&self) -> Result<()> {
        let endpoint = self
            .local_endpoint()
            .ok_or(TetherError::MissingEndpoint("local"))?;

        self.socket
            .bind(&endpoint.socket_addr().into())
            .map_err(TetherError::Bind)?;

        // Re-read the bound address so port 0 reports the real port.
        if let Ok(addr) = self.socket.local_addr() {
            if let Some(v4) = addr.as_socket_ipv4() {
                *self.local.lock() = Some(Endpoint::from(v4));
            }
        }

        tracing::info!(endpoint = %self.local_endpoint().unwrap_or(endpoint), "bound");
        Ok(())
    }

    /// Start listening with the configured backlog
    pub fn listen(&self) -> Result<()> {
        self.socket
            .listen(self.config.max_simultaneous as i32)
            .map_err(TetherError::Listen)?;

        tracing::info!(backlog = self.config.max_simultaneous, "listening");
        Ok(())
    }

    /// Dial the configured remote endpoint
    pub fn connect(&self) -> Result<()> {
        let endpoint = self
            .remote_endpoint()
            .ok_or(TetherError::MissingEndpoint("remote"))?;

        self.socket
            .connect(&endpoint.socket_addr().into())
            .map_err(TetherError::Connect)?;

        if self.config.nodelay {
            self.socket
                .set_nodelay(true)
                .map_err(TetherError::SocketOption)?;
        }

        tracing::info!(peer = %endpoint, "connected");
        Ok(())
    }

    // =========================================================================
    // Accepting
    // =========================================================================

    /// Block until a peer connects, store it in the slot table
    ///
    /// The accept syscall runs outside the table lock, so concurrent
    /// callers each wait for their own connection. The peer's address
    /// is recorded in the remote endpoint cell, last writer wins
    /// across concurrent accepts. An accept failure is returned to
    /// the caller, who decides between retry and shutdown.
    pub fn accept(&self) -> Result<Handle> {
        let (peer, addr) = self.socket.accept().map_err(TetherError::Accept)?;
        let stream: TcpStream = peer.into();

        if self.config.nodelay {
            stream.set_nodelay(true).map_err(TetherError::SocketOption)?;
        }

        let peer_endpoint = addr.as_socket_ipv4().map(Endpoint::from);
        if let Some(endpoint) = peer_endpoint {
            *self.remote.lock() = Some(endpoint);
        }

        let handle = self.table.store(Arc::new(stream));

        match peer_endpoint {
            Some(endpoint) => tracing::debug!(%handle, peer = %endpoint, "accepted connection"),
            None => tracing::debug!(%handle, "accepted connection"),
        }

        Ok(handle)
    }

    // =========================================================================
    // Session Operations
    // =========================================================================

    /// Resolve a target to a transport session
    pub fn session(&self, target: Target) -> Result<Session<'_>> {
        match target {
            Target::Primary => Ok(Session::Primary(&self.socket)),
            Target::Peer(handle) => Ok(Session::Peer(self.table.get(handle)?)),
        }
    }

    /// Write the whole payload to the targeted connection, unframed
    pub fn send(&self, target: Target, bytes: &[u8]) -> Result<()> {
        self.session(target)?.send(bytes)
    }

    /// Block for one read of at most `max` bytes from the target
    ///
    /// Fails with `ReceiveOverflow` when the read fills the whole
    /// buffer; an empty result means the peer shut down. The payload
    /// comes back as raw bytes, so binary payloads with embedded zero
    /// bytes survive intact; converting to text is the caller's
    /// choice.
    pub fn receive(&self, target: Target, max: usize) -> Result<Bytes> {
        self.session(target)?.receive(max)
    }

    /// Send the payload to every target, in order
    ///
    /// A failed target is recorded in the report and does not stop
    /// delivery to the remaining targets.
    pub fn broadcast(&self, bytes: &[u8], targets: &[Target]) -> BroadcastReport {
        let mut report = BroadcastReport {
            delivered: Vec::new(),
            failed: Vec::new(),
        };

        for &target in targets {
            match self.session(target).and_then(|session| session.send(bytes)) {
                Ok(()) => report.delivered.push(target),
                Err(e) => {
                    tracing::warn!(?target, error = %e, "broadcast delivery failed");
                    report.failed.push((target, e));
                }
            }
        }

        report
    }

    /// Close the targeted connection
    ///
    /// Releasing a peer marks its slot free for reuse by a later
    /// accept and shuts the stream down; a send or receive already in
    /// flight on the same handle holds its own reference and observes
    /// an ordinary I/O error instead of a recycled descriptor.
    /// Releasing the primary shuts the overlay's own socket down and
    /// leaves the table untouched.
    pub fn release(&self, target: Target) -> Result<()> {
        match target {
            Target::Peer(handle) => {
                // The slot is freed even if the peer already tore the
                // connection down.
                let stream = self.table.release(handle)?;
                ignore_not_connected(Session::Peer(stream).close())?;

                tracing::debug!(%handle, "released connection");
                Ok(())
            }
            Target::Primary => {
                ignore_not_connected(Session::Primary(&self.socket).close())?;

                tracing::debug!("primary socket shut down");
                Ok(())
            }
        }
    }

    // =========================================================================
    // Introspection
    // =========================================================================

    /// High-water mark of concurrently held connections
    pub fn size(&self) -> usize {
        self.table.size()
    }

    /// Handles of the currently active connections, ascending
    pub fn handles(&self) -> Vec<Handle> {
        self.table.handles()
    }

    /// Number of currently active connections
    pub fn active_count(&self) -> usize {
        self.table.active_count()
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }
}

impl Drop for Overlay {
    fn drop(&mut self) {
        // Primary socket and any remaining peer streams close with
        // their descriptors here.
        tracing::debug!("overlay dropped");
    }
}

/// Shutting down an already-dead connection still counts as closed
fn ignore_not_connected(result: Result<()>) -> Result<()> {
    match result {
        Err(TetherError::Close(e)) if e.kind() == ErrorKind::NotConnected => Ok(()),
        other => other,
    }
}
