use std::{net::Ipv4Addr, string::FromUtf8Error};

/// All error types that can occur when talking to Govee devices.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Failed to serialize a message to JSON.
    #[error("failed to dump json: {0:?}")]
    JsonDump(serde_json::Error),

    /// Failed to deserialize JSON data received from a device.
    #[error("failed to load json: {0:?}")]
    JsonLoad(serde_json::Error),

    /// A socket operation (bind, send, receive) failed.
    #[error("socket {action} error: {err:?}")]
    Socket { action: String, err: std::io::Error },

    /// The UDP datagram from a device contained invalid UTF-8.
    #[error("utf8 decoding error: {0:?}")]
    Utf8Decode(FromUtf8Error),

    /// No reply arrived within the allotted time.
    #[error("timed out waiting for a reply")]
    Timeout,

    /// A reply arrived from an address other than the queried device.
    #[error("reply from {actual} discarded; expected {expected}")]
    AddressMismatch { expected: Ipv4Addr, actual: String },

    /// The reply decoded as JSON but did not have the expected envelope.
    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),

    /// User supplied text is not a valid device address.
    #[error("invalid device address {0:?}")]
    InvalidAddress(String),

    /// Every status query attempt failed.
    #[error("device did not answer the status query after {attempts} attempts")]
    StatusUnavailable { attempts: u32 },
}

impl Error {
    /// Create a new socket error
    pub fn socket(action: &str, err: std::io::Error) -> Self {
        Error::Socket {
            action: action.to_string(),
            err,
        }
    }

    /// Create a new address mismatch error
    pub fn address_mismatch(expected: &Ipv4Addr, actual: impl ToString) -> Self {
        Error::AddressMismatch {
            expected: *expected,
            actual: actual.to_string(),
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
