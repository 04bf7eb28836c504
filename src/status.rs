//! Connection and device state tracking.

use serde::{Deserialize, Serialize};
use strum_macros::Display;

use crate::types::Color;

/// State of the TCP session between a controller and its device.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, Default, PartialEq, Eq, Hash, Display)]
pub enum ConnectionState {
    /// A connection attempt is in progress
    Connecting,
    /// The socket is open
    Connected,
    /// No socket is open; the initial state
    #[default]
    Disconnected,
}

/// The last known state of a light.
///
/// `Undefined` means the state has not been observed yet on the current
/// connection. It is a distinct variant, so it can never be mistaken for a
/// real observation that happens to carry the same values.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum DeviceState {
    #[default]
    Undefined,
    Known { enabled: bool, color: Color },
}

impl DeviceState {
    pub fn known(enabled: bool, color: Color) -> Self {
        DeviceState::Known { enabled, color }
    }

    pub fn is_known(&self) -> bool {
        matches!(self, DeviceState::Known { .. })
    }

    /// Whether the light is on, if known.
    pub fn is_enabled(&self) -> Option<bool> {
        match self {
            DeviceState::Known { enabled, .. } => Some(*enabled),
            DeviceState::Undefined => None,
        }
    }

    /// The light's color, if known.
    pub fn color(&self) -> Option<Color> {
        match self {
            DeviceState::Known { color, .. } => Some(*color),
            DeviceState::Undefined => None,
        }
    }
}
