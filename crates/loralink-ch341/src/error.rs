//! Error types for the CH341 transport

use thiserror::Error;

/// Result type for CH341 operations
pub type Result<T> = std::result::Result<T, Ch341Error>;

/// Errors that can occur when using the CH341 bridge
#[derive(Debug, Error)]
pub enum Ch341Error {
    /// No device with VID:1a86 PID:5512
    #[error("CH341 device not found (VID:1a86 PID:5512)")]
    DeviceNotFound,

    /// Requested index is past the end of the enumeration
    #[error("CH341 device index {index} out of range ({found} device(s) found)")]
    IndexOutOfRange { index: usize, found: usize },

    /// Failed to open device
    #[error("Failed to open CH341: {0}")]
    OpenFailed(String),

    /// Failed to claim interface or endpoints
    #[error("Failed to claim interface: {0}")]
    ClaimFailed(String),

    /// USB transfer failed
    #[error("USB transfer failed: {0}")]
    TransferFailed(String),

    /// Device returned fewer bytes than requested
    #[error("Short read: expected {expected} byte(s), got {actual}")]
    ShortRead { expected: usize, actual: usize },

    /// USB transfer did not complete in time
    #[error("Timeout during USB transfer")]
    Timeout,

    /// Operation requires an open session
    #[error("CH341 is not open")]
    NotOpen,
}

impl From<nusb::Error> for Ch341Error {
    fn from(e: nusb::Error) -> Self {
        Ch341Error::TransferFailed(e.to_string())
    }
}

impl From<Ch341Error> for loralink_core::Error {
    fn from(e: Ch341Error) -> Self {
        match e {
            Ch341Error::DeviceNotFound => loralink_core::Error::DeviceNotFound,
            Ch341Error::IndexOutOfRange { index, found } => {
                loralink_core::Error::IndexOutOfRange { index, found }
            }
            Ch341Error::NotOpen => loralink_core::Error::NotOpen,
            other => loralink_core::Error::backend(other),
        }
    }
}
