//! Peer identity used to correlate callbacks to a logical connection.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

/// Address + port of a connection peer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Endpoint(SocketAddr);

impl Endpoint {
    /// Create an endpoint from address and port
    pub fn new(address: IpAddr, port: u16) -> Self {
        Self(SocketAddr::new(address, port))
    }

    /// `0.0.0.0:0`, used before a peer address is known
    pub fn unspecified() -> Self {
        Self::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0)
    }

    pub fn address(&self) -> IpAddr {
        self.0.ip()
    }

    pub fn port(&self) -> u16 {
        self.0.port()
    }

    pub fn socket_addr(&self) -> SocketAddr {
        self.0
    }

    pub fn is_unspecified(&self) -> bool {
        self.0.ip().is_unspecified() && self.0.port() == 0
    }
}

impl Default for Endpoint {
    fn default() -> Self {
        Self::unspecified()
    }
}

impl From<SocketAddr> for Endpoint {
    fn from(addr: SocketAddr) -> Self {
        Self(addr)
    }
}

impl<I: Into<IpAddr>> From<(I, u16)> for Endpoint {
    fn from((ip, port): (I, u16)) -> Self {
        Self::new(ip.into(), port)
    }
}

impl From<Endpoint> for SocketAddr {
    fn from(endpoint: Endpoint) -> Self {
        endpoint.0
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unspecified_default() {
        let ep = Endpoint::default();
        assert!(ep.is_unspecified());
        assert_eq!(ep.to_string(), "0.0.0.0:0");
    }

    #[test]
    fn test_parts() {
        let ep = Endpoint::from(([192, 168, 1, 7], 8080));
        assert_eq!(ep.port(), 8080);
        assert_eq!(ep.address(), IpAddr::from([192, 168, 1, 7]));
        assert!(!ep.is_unspecified());
        assert_eq!(SocketAddr::from(ep), "192.168.1.7:8080".parse::<SocketAddr>().unwrap());
    }
}
