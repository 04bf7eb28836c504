use std::string::FromUtf8Error;

use crate::packet::Method;

/// All error types that can occur when interacting with Yeelight devices.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Failed to serialize data to JSON.
    #[error("failed to dump json: {0:?}")]
    JsonDump(serde_json::Error),

    /// Failed to deserialize JSON data.
    #[error("failed to load json: {0:?}")]
    JsonLoad(serde_json::Error),

    /// A network socket operation failed.
    #[error("socket {action} error: {err:?}")]
    Socket { action: String, err: std::io::Error },

    /// A datagram or frame contained invalid UTF-8.
    #[error("utf8 decoding error: {0:?}")]
    Utf8Decode(FromUtf8Error),

    /// A frame received from a device could not be decoded.
    #[error("invalid frame: {0}")]
    InvalidFrame(String),

    /// A discovery response did not carry the expected headers.
    #[error("invalid discovery response: {0}")]
    InvalidResponse(String),

    /// An address string could not be parsed as `host:port`.
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    /// Hue or saturation outside of the accepted range.
    #[error("invalid color: hue {hue}, saturation {saturation}")]
    InvalidColor { hue: u16, saturation: u8 },

    /// Color temperature outside of the accepted range.
    #[error("invalid color temperature: {0}K")]
    InvalidTemperature(u16),

    /// No matching result arrived before the command timeout.
    #[error("command {method} ({id}) timed out")]
    CommandTimeout { method: Method, id: i32 },

    /// The device answered the command with something other than "ok".
    #[error("command {method} ({id}) rejected: {result:?}")]
    CommandRejected {
        method: Method,
        id: i32,
        result: Vec<String>,
    },

    /// No known device state was observed within the given time.
    #[error("device state not known after {0:?}")]
    StateTimeout(std::time::Duration),

    /// The controller event loop is no longer running.
    #[error("device controller is closed")]
    ControllerClosed,
}

impl Error {
    /// Create a new socket error
    pub fn socket(action: &str, err: std::io::Error) -> Self {
        Error::Socket {
            action: action.to_string(),
            err,
        }
    }
}

/// Hacky implementation of PartialEq for testing
#[cfg(test)]
impl PartialEq for Error {
    fn eq(&self, other: &Self) -> bool {
        self.to_string() == other.to_string()
    }
}
