//! loralink-rfm95 - RFM95 / SX1276 LoRa radio driver
//!
//! This crate drives a HopeRF RFM95 (Semtech SX1276) in LoRa mode over any
//! [`loralink_core::SpiTransport`]: a CH341 USB bridge, a Linux spidev node,
//! or the in-memory simulation used by the tests.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use loralink_dummy::SimulatedRfm95;
//! use loralink_rfm95::{RadioConfig, Rfm95};
//!
//! let mut radio = Rfm95::new(SimulatedRfm95::new());
//! radio.begin()?;
//! radio.configure(&RadioConfig::new().with_frequency_mhz(868.1))?;
//! radio.send(b"hello", false)?;
//! if let Some(packet) = radio.receive(Duration::from_secs(5), false)? {
//!     println!("{} bytes, RSSI {} dBm", packet.data.len(), packet.rssi);
//! }
//! # Ok::<(), loralink_rfm95::RadioError>(())
//! ```

pub mod config;
mod diag;
mod error;
mod radio;
pub mod registers;

pub use config::RadioConfig;
pub use diag::{irq_flag_names, ModeStatus, RegisterDump};
pub use error::{RadioError, Result};
pub use radio::{Packet, Rfm95, DEFAULT_RX_TIMEOUT, MAX_PAYLOAD_LEN};
pub use registers::{IrqFlags, OperatingMode, Register};
