//! Transport factory
//!
//! This crate turns a transport specification such as `ch341:index=1` or
//! `linux_spi:dev=/dev/spidev0.1,spispeed=2000` into a boxed
//! [`SpiTransport`](loralink_core::SpiTransport). Backends are compiled in
//! through cargo features (`dummy`, `ch341`, `linux-spi`), all on by default.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────┐
//! │  CLI / application       │  create_transport("ch341:index=0")
//! └────────────┬─────────────┘
//!              ▼
//! ┌──────────────────────────┐
//! │  loralink-transport      │  parse spec, pick backend
//! └────────────┬─────────────┘
//!              ▼
//! ┌──────────────────────────────────────────────┐
//! │  loralink-ch341 │ loralink-linux-spi │ dummy │  impl SpiTransport
//! └──────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use loralink_core::SpiTransport;
//! use loralink_transport::create_transport;
//!
//! let mut transport = create_transport("ch341:index=0")?;
//! transport.open()?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

mod error;
mod registry;

pub use error::FactoryError;
pub use registry::{
    available_transports, create_transport, find_transport, open_transport, parse_transport_params,
    transport_help, transport_names_short, TransportInfo, TransportParams,
};

#[cfg(feature = "ch341")]
pub use registry::create_ch341;
#[cfg(feature = "linux-spi")]
pub use registry::create_linux_spi;
