//! Timing and network configuration for controllers and discovery.
//!
//! Both structs deserialize from any serde format, with durations given in
//! milliseconds:
//!
//! ```
//! use std::time::Duration;
//! use yeelight_rs::{ControllerConfig, DiscoveryConfig};
//!
//! let controller: ControllerConfig =
//!     serde_json::from_str(r#"{"command_timeout": 1500}"#).unwrap();
//! assert_eq!(controller.command_timeout, Duration::from_millis(1500));
//! assert_eq!(controller.detach_grace, Duration::from_secs(5));
//!
//! let discovery: DiscoveryConfig = serde_json::from_str("{}").unwrap();
//! assert_eq!(discovery.local_port, 43210);
//! ```

use std::net::{Ipv4Addr, SocketAddrV4};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_with::{DurationMilliSeconds, serde_as};

/// Settings for a [`DeviceController`](crate::DeviceController).
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    /// How long a command waits for its matching result.
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub command_timeout: Duration,
    /// How long the connection outlives its last detach.
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub detach_grace: Duration,
}

impl ControllerConfig {
    pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(3);
    pub const DEFAULT_DETACH_GRACE: Duration = Duration::from_secs(5);

    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }

    pub fn with_detach_grace(mut self, grace: Duration) -> Self {
        self.detach_grace = grace;
        self
    }
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            command_timeout: Self::DEFAULT_COMMAND_TIMEOUT,
            detach_grace: Self::DEFAULT_DETACH_GRACE,
        }
    }
}

/// Settings for the [`Discovery`](crate::Discovery) engine.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// Local UDP port the search socket binds to (0 picks any free port).
    pub local_port: u16,
    /// Where search requests are sent.
    pub multicast_addr: SocketAddrV4,
    /// How long to wait for the next response before a cycle finishes.
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub receive_timeout: Duration,
    /// Period between cycles while discovery is started.
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub interval: Duration,
    /// Receive buffer size for a single response datagram.
    pub buffer_size: usize,
}

impl DiscoveryConfig {
    pub const DEFAULT_LOCAL_PORT: u16 = 43210;
    pub const MULTICAST_GROUP: Ipv4Addr = Ipv4Addr::new(239, 255, 255, 250);
    pub const MULTICAST_PORT: u16 = 1982;
    pub const DEFAULT_RECEIVE_TIMEOUT: Duration = Duration::from_secs(10);
    pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(30);
    pub const DEFAULT_BUFFER_SIZE: usize = 1024;

    pub fn with_local_port(mut self, port: u16) -> Self {
        self.local_port = port;
        self
    }

    pub fn with_multicast_addr(mut self, addr: SocketAddrV4) -> Self {
        self.multicast_addr = addr;
        self
    }

    pub fn with_receive_timeout(mut self, timeout: Duration) -> Self {
        self.receive_timeout = timeout;
        self
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            local_port: Self::DEFAULT_LOCAL_PORT,
            multicast_addr: SocketAddrV4::new(Self::MULTICAST_GROUP, Self::MULTICAST_PORT),
            receive_timeout: Self::DEFAULT_RECEIVE_TIMEOUT,
            interval: Self::DEFAULT_INTERVAL,
            buffer_size: Self::DEFAULT_BUFFER_SIZE,
        }
    }
}
