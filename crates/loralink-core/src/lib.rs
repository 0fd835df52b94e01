//! loralink-core - Transport contract for loralink
//!
//! This crate defines the [`SpiTransport`] trait that decouples radio drivers
//! from the physical bus they talk over. A transport provides framed SPI
//! exchanges (chip-select asserted for the whole exchange), a handful of GPIO
//! operations, and an edge-triggered interrupt notification.
//!
//! Backends live in their own crates:
//! - `loralink-ch341` - CH341 USB-to-SPI bridge
//! - `loralink-linux-spi` - Linux spidev with GPIO character device lines
//! - `loralink-dummy` - Simulated SX1276 register file for tests
//!
//! # Example
//!
//! ```ignore
//! use loralink_core::SpiTransport;
//!
//! fn read_version<T: SpiTransport>(bus: &mut T) -> loralink_core::Result<u8> {
//!     let resp = bus.transfer(&[0x42], 1)?;
//!     Ok(resp[0])
//! }
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod error;
pub mod transport;

pub use error::{Error, Result};
pub use transport::{InterruptCallback, PinMode, SpiTransport};
