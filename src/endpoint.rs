//! Endpoint configuration
//!
//! Builds the IPv4 address descriptors consumed by the overlay: a
//! local endpoint for binding and a remote endpoint for dialing.
//! Byte-order conversion of the port and zero-filling of the sockaddr
//! padding happen at the sockaddr conversion boundary, not here.

use std::fmt;
use std::net::{Ipv4Addr, SocketAddrV4};

use crate::error::{Result, TetherError};

/// An IPv4 address and port pair used for binding or dialing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Endpoint {
    addr: Ipv4Addr,
    port: u16,
}

impl Endpoint {
    /// Local endpoint on the wildcard address, for binding
    ///
    /// Pure data construction, no failure path.
    pub fn local(port: u16) -> Self {
        Self {
            addr: Ipv4Addr::UNSPECIFIED,
            port,
        }
    }

    /// Remote endpoint from a dotted-decimal IPv4 literal, for dialing
    ///
    /// Anything that is not a syntactically valid IPv4 literal is
    /// rejected with `InvalidAddress`.
    pub fn remote(addr: &str, port: u16) -> Result<Self> {
        let parsed = addr
            .parse::<Ipv4Addr>()
            .map_err(|_| TetherError::InvalidAddress(addr.to_string()))?;

        Ok(Self {
            addr: parsed,
            port,
        })
    }

    /// The IPv4 address
    pub fn ip(&self) -> Ipv4Addr {
        self.addr
    }

    /// The port, in host byte order
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Address form handed to the transport boundary
    pub fn socket_addr(&self) -> SocketAddrV4 {
        SocketAddrV4::new(self.addr, self.port)
    }
}

impl From<SocketAddrV4> for Endpoint {
    fn from(addr: SocketAddrV4) -> Self {
        Self {
            addr: *addr.ip(),
            port: addr.port(),
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.addr, self.port)
    }
}
