//! loralink - LoRa radio tool
//!
//! Drives an RFM95/SX1276 module over a CH341 USB-to-SPI bridge, a Linux
//! spidev node, or the built-in simulation.
//!
//! # Architecture
//!
//! The radio driver (`loralink-rfm95`) only knows the `SpiTransport` trait.
//! Which transport sits underneath is picked at runtime from the `-t`
//! specification by `loralink-transport`, so every command works the same on
//! every backend.

mod cli;
mod commands;

use std::time::Duration;

use clap::Parser;
use cli::{Cli, Commands, RadioArgs};
use loralink_core::SpiTransport;
use loralink_rfm95::{RadioConfig, Rfm95};
use loralink_transport::create_transport;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logger
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    // Set log level based on verbosity
    match cli.verbose {
        0 => {} // default (info)
        1 => log::set_max_level(log::LevelFilter::Debug),
        _ => log::set_max_level(log::LevelFilter::Trace),
    }

    match cli.command {
        Commands::Tx { message, invert_iq } => {
            let mut radio = open_radio(&cli.transport, &cli.radio)?;
            commands::run_tx(&mut radio, &message, invert_iq)
        }
        Commands::Rx {
            timeout,
            count,
            invert_iq,
        } => {
            let timeout = Duration::try_from_secs_f64(timeout)
                .map_err(|_| format!("Invalid timeout: {}", timeout))?;
            let mut radio = open_radio(&cli.transport, &cli.radio)?;
            commands::run_rx(&mut radio, timeout, count, invert_iq).map(|_| ())
        }
        Commands::Test => {
            let mut radio = open_radio(&cli.transport, &cli.radio)?;
            commands::run_test(&mut radio, cli.radio.sync_word)
        }
        Commands::ListTransports => {
            commands::list_transports();
            Ok(())
        }
        Commands::ListDevices => commands::list_devices(),
    }
}

/// Build the radio configuration from the command line
fn radio_config(args: &RadioArgs) -> RadioConfig {
    RadioConfig::new()
        .with_frequency_mhz(args.frequency)
        .with_tx_power(args.power, !args.rfo)
        .with_spreading_factor(args.sf)
        .with_bandwidth_khz(args.bandwidth)
        .with_coding_rate(args.coding_rate)
        .with_preamble_length(args.preamble)
        .with_sync_word(args.sync_word)
}

/// Create the transport, bring the radio up and apply the configuration
fn open_radio(
    spec: &str,
    args: &RadioArgs,
) -> Result<Rfm95<Box<dyn SpiTransport>>, Box<dyn std::error::Error>> {
    let transport = create_transport(spec)?;
    let mut radio = Rfm95::new(transport);
    radio.begin().map_err(|e| {
        format!(
            "Failed to initialise radio on '{}': {}\n\
             Make sure the module is connected and you have access to the device.",
            spec, e
        )
    })?;

    let config = radio_config(args);
    radio.configure(&config)?;
    log::info!(
        "Radio ready: {:.3} MHz, SF{}, {} kHz, CR 4/{}, {} dBm",
        config.frequency_hz as f64 / 1e6,
        config.spreading_factor,
        config.bandwidth_khz,
        config.coding_rate,
        config.tx_power
    );
    Ok(radio)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_radio_config_from_args() {
        let cli = Cli::try_parse_from([
            "loralink",
            "--frequency",
            "915.2",
            "--power",
            "12",
            "--rfo",
            "--bandwidth",
            "250",
            "test",
        ])
        .unwrap();
        let config = radio_config(&cli.radio);
        assert_eq!(config.frequency_hz, 915_200_000);
        assert_eq!((config.tx_power, config.pa_boost), (12, false));
        assert_eq!(config.bandwidth_khz, 250.0);
        assert_eq!(config.spreading_factor, 7);
    }

    #[cfg(feature = "dummy")]
    #[test]
    fn test_open_radio_on_dummy() {
        let cli = Cli::try_parse_from(["loralink", "--sf", "10", "test"]).unwrap();
        let mut radio = open_radio("dummy", &cli.radio).unwrap();
        assert_eq!(radio.spreading_factor().unwrap(), 10);
        assert!(radio.is_active());
    }

    #[test]
    fn test_open_radio_unknown_transport() {
        let cli = Cli::try_parse_from(["loralink", "test"]).unwrap();
        assert!(open_radio("nosuch", &cli.radio).is_err());
    }
}
