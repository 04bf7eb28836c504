//! Device network address.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::Error;

/// Network address of a Yeelight device's control port.
///
/// Addresses are compared by value and are the identity key of a
/// [`DeviceController`](crate::DeviceController) inside a
/// [`ControllerRegistry`](crate::ControllerRegistry).
///
/// # Example
///
/// ```
/// use yeelight_rs::Address;
///
/// let address: Address = "192.168.1.23:55443".parse().unwrap();
/// assert_eq!(address.host(), "192.168.1.23");
/// assert_eq!(address.port(), 55443);
/// assert_eq!(address.to_string(), "192.168.1.23:55443");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Address {
    host: String,
    port: u16,
}

impl Address {
    /// Default control port used by Yeelight bulbs.
    pub const DEFAULT_PORT: u16 = 55443;

    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Address {
            host: host.into(),
            port,
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

impl FromStr for Address {
    type Err = Error;

    /// Parse from `host:port`, or a bare host with the default port.
    fn from_str(s: &str) -> Result<Self, Error> {
        let s = s.trim();
        if s.is_empty() {
            return Err(Error::InvalidAddress(s.to_string()));
        }
        match s.rsplit_once(':') {
            Some((host, port)) if !host.is_empty() => port
                .parse()
                .map(|port| Address::new(host, port))
                .map_err(|_| Error::InvalidAddress(s.to_string())),
            Some(_) => Err(Error::InvalidAddress(s.to_string())),
            None => Ok(Address::new(s, Self::DEFAULT_PORT)),
        }
    }
}
