//! Error types shared by all transports

use thiserror::Error;

/// Transport error
///
/// Backends map their own failures onto this type. Anything that does not
/// have a dedicated variant is carried as [`Error::Backend`] with the
/// backend's error as the source.
#[derive(Debug, Error)]
pub enum Error {
    /// Operation requires an open session
    #[error("Transport is not open")]
    NotOpen,

    /// No device matching the backend's identifiers was found
    #[error("Device not found")]
    DeviceNotFound,

    /// Requested device index is past the end of the enumeration
    #[error("Device index {index} out of range ({found} device(s) found)")]
    IndexOutOfRange {
        /// Requested zero-based index
        index: usize,
        /// Number of matching devices
        found: usize,
    },

    /// Pin number is not valid for this transport
    #[error("Invalid pin: {0}")]
    InvalidPin(u8),

    /// Transfer returned fewer bytes than requested
    #[error("Short response: expected {expected} byte(s), got {actual}")]
    ShortResponse {
        /// Bytes requested
        expected: usize,
        /// Bytes returned
        actual: usize,
    },

    /// Operation is not supported by this transport
    #[error("Operation not supported: {0}")]
    Unsupported(&'static str),

    /// Backend-specific failure
    #[error("Transport error: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl Error {
    /// Wrap a backend error
    pub fn backend<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Error::Backend(Box::new(err))
    }
}

/// Result type for transport operations
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_out_of_range_message() {
        let err = Error::IndexOutOfRange { index: 2, found: 1 };
        assert_eq!(
            err.to_string(),
            "Device index 2 out of range (1 device(s) found)"
        );
    }

    #[test]
    fn test_backend_keeps_source() {
        let io = std::io::Error::new(std::io::ErrorKind::TimedOut, "usb timeout");
        let err = Error::backend(io);
        let source = std::error::Error::source(&err).expect("source");
        assert_eq!(source.to_string(), "usb timeout");
    }
}
