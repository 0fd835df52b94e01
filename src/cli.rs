//! CLI argument parsing

use clap::{Parser, Subcommand};

/// Parse a string as a hex or decimal u8
fn parse_hex_u8(s: &str) -> Result<u8, String> {
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u8::from_str_radix(hex, 16).map_err(|e| format!("Invalid hex value: {}", e))
    } else {
        s.parse::<u8>().map_err(|e| format!("Invalid number: {}", e))
    }
}

/// Generate dynamic help text for the transport argument
fn transport_help() -> String {
    format!(
        "Transport to use, as name[:key=value,...] [available: {}]",
        loralink_transport::transport_names_short()
    )
}

#[derive(Parser)]
#[command(name = "loralink")]
#[command(author, version, about = "LoRa radio tool for RFM95/SX1276 modules", long_about = None)]
pub struct Cli {
    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[arg(short, long, global = true, default_value = "ch341", help = transport_help())]
    pub transport: String,

    #[command(flatten)]
    pub radio: RadioArgs,

    #[command(subcommand)]
    pub command: Commands,
}

/// Modem parameters shared by the radio commands
#[derive(clap::Args, Debug, Clone)]
pub struct RadioArgs {
    /// Carrier frequency in MHz
    #[arg(long, global = true, default_value_t = 868.1)]
    pub frequency: f64,

    /// Transmit power in dBm (2-20 on PA_BOOST, 0-15 on RFO)
    #[arg(long, global = true, default_value_t = 17)]
    pub power: i8,

    /// Use the RFO output instead of PA_BOOST
    #[arg(long, global = true)]
    pub rfo: bool,

    /// Spreading factor
    #[arg(long, global = true, default_value_t = 7,
          value_parser = clap::value_parser!(u8).range(6..=12))]
    pub sf: u8,

    /// Bandwidth in kHz (rounded up to the next supported value)
    #[arg(long, global = true, default_value_t = 125.0)]
    pub bandwidth: f32,

    /// Coding rate denominator (4/5 .. 4/8)
    #[arg(long, global = true, default_value_t = 5,
          value_parser = clap::value_parser!(u8).range(5..=8))]
    pub coding_rate: u8,

    /// Preamble length in symbols
    #[arg(long, global = true, default_value_t = 8)]
    pub preamble: u16,

    /// Sync word (hex or decimal)
    #[arg(long, global = true, default_value = "0x12", value_parser = parse_hex_u8)]
    pub sync_word: u8,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Transmit a message as one LoRa packet
    Tx {
        /// Message to send (at most 255 bytes)
        message: String,

        /// Transmit with inverted IQ
        #[arg(long)]
        invert_iq: bool,
    },

    /// Receive and print LoRa packets
    Rx {
        /// Seconds to wait for each packet
        #[arg(long, default_value_t = 5.0)]
        timeout: f64,

        /// Number of packets to receive (0 = until a timeout)
        #[arg(long, default_value_t = 1)]
        count: u32,

        /// Receive with inverted IQ
        #[arg(long)]
        invert_iq: bool,
    },

    /// Check communication with the radio and print its state
    Test,

    /// List available transports
    ListTransports,

    /// List attached CH341 devices
    ListDevices,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_defaults() {
        let cli = Cli::try_parse_from(["loralink", "test"]).unwrap();
        assert_eq!(cli.transport, "ch341");
        assert_eq!(cli.verbose, 0);
        assert_eq!(cli.radio.frequency, 868.1);
        assert_eq!(cli.radio.power, 17);
        assert!(!cli.radio.rfo);
        assert_eq!(cli.radio.sf, 7);
        assert_eq!(cli.radio.bandwidth, 125.0);
        assert_eq!(cli.radio.coding_rate, 5);
        assert_eq!(cli.radio.preamble, 8);
        assert_eq!(cli.radio.sync_word, 0x12);
        assert!(matches!(cli.command, Commands::Test));
    }

    #[test]
    fn test_tx_with_radio_options() {
        let cli = Cli::try_parse_from([
            "loralink",
            "-vv",
            "-t",
            "linux_spi:dev=/dev/spidev0.1",
            "tx",
            "hello",
            "--invert-iq",
            "--sf",
            "9",
            "--sync-word",
            "0x34",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.transport, "linux_spi:dev=/dev/spidev0.1");
        assert_eq!(cli.radio.sf, 9);
        assert_eq!(cli.radio.sync_word, 0x34);
        match cli.command {
            Commands::Tx { message, invert_iq } => {
                assert_eq!(message, "hello");
                assert!(invert_iq);
            }
            _ => panic!("expected tx"),
        }
    }

    #[test]
    fn test_rx_options() {
        let cli =
            Cli::try_parse_from(["loralink", "rx", "--timeout", "2.5", "--count", "0"]).unwrap();
        match cli.command {
            Commands::Rx {
                timeout,
                count,
                invert_iq,
            } => {
                assert_eq!(timeout, 2.5);
                assert_eq!(count, 0);
                assert!(!invert_iq);
            }
            _ => panic!("expected rx"),
        }
    }

    #[test]
    fn test_rejects_out_of_range_parameters() {
        assert!(Cli::try_parse_from(["loralink", "--sf", "13", "test"]).is_err());
        assert!(Cli::try_parse_from(["loralink", "--coding-rate", "4", "test"]).is_err());
        assert!(Cli::try_parse_from(["loralink", "--sync-word", "0x100", "test"]).is_err());
        assert!(Cli::try_parse_from(["loralink", "tx"]).is_err());
    }

    #[test]
    fn test_parse_hex_u8() {
        assert_eq!(parse_hex_u8("0x34"), Ok(0x34));
        assert_eq!(parse_hex_u8("18"), Ok(18));
        assert!(parse_hex_u8("0xZZ").is_err());
    }
}
