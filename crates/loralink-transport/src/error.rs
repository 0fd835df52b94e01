//! Factory errors

use thiserror::Error;

/// Error returned when a transport cannot be created
#[derive(Debug, Error)]
pub enum FactoryError {
    /// No compiled-in backend has this name
    #[error("Unsupported transport type: {0}")]
    UnsupportedType(String),

    /// The specification or one of its options is malformed
    #[error("Invalid transport parameter: {0}")]
    InvalidParameter(String),

    /// The backend rejected its configuration
    #[error("Transport backend error: {0}")]
    Backend(#[from] loralink_core::Error),
}
