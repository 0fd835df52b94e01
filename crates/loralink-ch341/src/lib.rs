//! loralink-ch341 - CH341 USB-to-SPI bridge transport
//!
//! This crate implements [`loralink_core::SpiTransport`] for the WCH CH341
//! (VID:1a86 PID:5512) in its SPI/parallel mode.
//!
//! # Protocol Overview
//!
//! The CH341 communicates via USB bulk transfers. SPI data is sent one byte
//! per `SPI_STREAM` command and the chip answers with one byte per command.
//! Chip select and the D0-D5 pins are driven with `UIO_STREAM` commands that
//! carry the full output and direction bytes, so the driver caches both.
//! Interrupts are emulated by polling the pin status byte.
//!
//! # Example
//!
//! ```no_run
//! use loralink_ch341::{Ch341, Ch341Config};
//! use loralink_core::SpiTransport;
//!
//! let mut bus = Ch341::new(Ch341Config::new().with_index(0));
//! bus.open()?;
//! let version = bus.transfer(&[0x42], 1)?;
//! println!("Radio version: {:02X}", version[0]);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

mod device;
mod error;
mod pipe;
pub mod protocol;

pub use device::{parse_options, Ch341, Ch341Config, Ch341DeviceInfo};
pub use error::{Ch341Error, Result};
