//! loralink-linux-spi - Linux spidev transport
//!
//! This crate implements [`loralink_core::SpiTransport`] on Linux using the
//! `/dev/spidevX.Y` character device for SPI and the GPIO character device
//! (`/dev/gpiochipN`) for pins and interrupts.
//!
//! # Example
//!
//! ```no_run
//! use loralink_core::SpiTransport;
//! use loralink_linux_spi::{LinuxSpi, LinuxSpiConfig};
//!
//! let config = LinuxSpiConfig::new("/dev/spidev0.0")
//!     .with_speed(1_000_000)
//!     .with_mode(0);
//! let mut bus = LinuxSpi::new(config);
//! bus.open()?;
//! let version = bus.transfer(&[0x42], 1)?;
//! println!("Radio version: {:02X}", version[0]);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! # Usage with loralink CLI
//!
//! ```bash
//! loralink -t linux_spi:dev=/dev/spidev0.0,spispeed=1000 test
//! ```
//!
//! # System Requirements
//!
//! - Linux kernel with spidev support enabled (`CONFIG_SPI_SPIDEV`)
//! - Read/write access to `/dev/spidevX.Y` and `/dev/gpiochipN`

mod device;
mod error;
mod gpio;
mod spidev;

pub use device::{mode, parse_options, LinuxSpi, LinuxSpiConfig, DEFAULT_DEVICE, DEFAULT_GPIOCHIP};
pub use error::{LinuxSpiError, Result};
