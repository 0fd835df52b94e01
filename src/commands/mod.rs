//! CLI command implementations
//!
//! Radio commands take an opened [`Rfm95`](loralink_rfm95::Rfm95) over
//! whichever transport was selected; list commands need no radio.

mod list;
mod radio;

pub use list::{list_devices, list_transports};
pub use radio::{run_rx, run_test, run_tx};
