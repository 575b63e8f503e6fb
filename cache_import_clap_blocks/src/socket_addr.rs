//! Address the event receiver listens on.
use std::{net::ToSocketAddrs, ops::Deref, str::FromStr};

/// `PORT` is how serverless platforms tell a container where to listen.
pub const DEFAULT_PORT: u16 = 8080;

/// A socket address that may be given as a host name, e.g. `localhost:8080`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SocketAddr(std::net::SocketAddr);

impl SocketAddr {
    /// Listen on all interfaces at `port`.
    pub fn any(port: u16) -> Self {
        Self(std::net::SocketAddr::from(([0, 0, 0, 0], port)))
    }
}

impl Deref for SocketAddr {
    type Target = std::net::SocketAddr;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl std::fmt::Display for SocketAddr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for SocketAddr {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // a bare port number binds every interface
        if let Ok(port) = s.parse::<u16>() {
            return Ok(Self::any(port));
        }
        let mut addrs = s
            .to_socket_addrs()
            .map_err(|e| format!("Cannot parse socket address '{s}': {e}"))?;
        addrs
            .next()
            .map(Self)
            .ok_or_else(|| format!("Found no addresses for '{s}'"))
    }
}

impl From<SocketAddr> for std::net::SocketAddr {
    fn from(addr: SocketAddr) -> Self {
        addr.0
    }
}
