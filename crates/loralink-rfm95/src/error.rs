//! Radio driver errors

use thiserror::Error;

use crate::registers::OperatingMode;

/// Error returned by radio operations
#[derive(Debug, Error)]
pub enum RadioError {
    /// The transport failed underneath the driver
    #[error("Transport error: {0}")]
    Transport(#[from] loralink_core::Error),

    /// VERSION register did not identify an SX1276
    #[error("Unexpected chip version 0x{found:02X} (expected 0x{expected:02X})")]
    VersionMismatch { expected: u8, found: u8 },

    /// Payload does not fit in a single LoRa packet
    #[error("Payload of {0} bytes exceeds the 255 byte limit")]
    PayloadTooLarge(usize),

    /// TxDone was not raised in time
    #[error("Timed out waiting for transmission to complete")]
    TxTimeout,

    /// Mode change was not reflected in RegOpMode
    #[error("Radio did not enter {expected} mode (reads back {found})")]
    ModeNotReached {
        expected: OperatingMode,
        found: OperatingMode,
    },
}

/// Result type for radio operations
pub type Result<T> = std::result::Result<T, RadioError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = RadioError::VersionMismatch {
            expected: 0x12,
            found: 0x00,
        };
        assert_eq!(err.to_string(), "Unexpected chip version 0x00 (expected 0x12)");

        let err = RadioError::ModeNotReached {
            expected: OperatingMode::ReceiveContinuous,
            found: OperatingMode::Standby,
        };
        assert_eq!(
            err.to_string(),
            "Radio did not enter RXCONTINUOUS mode (reads back STDBY)"
        );
    }

    #[test]
    fn test_transport_error_conversion() {
        let err: RadioError = loralink_core::Error::NotOpen.into();
        assert!(matches!(err, RadioError::Transport(loralink_core::Error::NotOpen)));
    }
}
