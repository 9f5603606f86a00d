use std::fmt;
use std::net::IpAddr;

use serde::{Deserialize, Serialize};

use crate::error::WulpusError;

/// Default mDNS service name the probe advertises.
pub const DEFAULT_SERVICE_NAME: &str = "wulpus";

/// Default mDNS service type.
pub const DEFAULT_SERVICE_TYPE: &str = "tcp";

/// Default TCP port the probe listens on.
pub const DEFAULT_PORT: u16 = 2121;

/// One discovered probe on the local network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkDevice {
    pub name: String,
    pub server: String,
    pub ip: IpAddr,
    pub port: u16,
}

impl NetworkDevice {
    pub fn new(
        name: impl Into<String>,
        server: impl Into<String>,
        ip: IpAddr,
        port: u16,
    ) -> Self {
        Self {
            name: name.into(),
            server: server.into(),
            ip,
            port,
        }
    }
}

impl fmt::Display for NetworkDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}:{})", self.name, self.ip, self.port)
    }
}

/// Source of resolved probe addresses, typically an mDNS/zeroconf browser.
///
/// The concrete browser lives outside this crate; anything that can produce
/// resolved `(ip, port)` records will do.
pub trait Discovery {
    fn find(&mut self) -> Result<Vec<NetworkDevice>, WulpusError>;
}
