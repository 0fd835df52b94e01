//! Radio commands implementation

use std::time::Duration;

use loralink_core::SpiTransport;
use loralink_rfm95::{irq_flag_names, Packet, Rfm95};

/// Send `message` as a single packet
pub fn run_tx<T: SpiTransport>(
    radio: &mut Rfm95<T>,
    message: &str,
    invert_iq: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    radio.send(message.as_bytes(), invert_iq)?;
    println!("Sent {} byte(s)", message.len());
    Ok(())
}

/// Receive up to `count` packets, stopping at the first timeout
///
/// A `count` of zero keeps listening until a timeout. Returns how many
/// packets were printed.
pub fn run_rx<T: SpiTransport>(
    radio: &mut Rfm95<T>,
    timeout: Duration,
    count: u32,
    invert_iq: bool,
) -> Result<u32, Box<dyn std::error::Error>> {
    let mut received = 0u32;
    while count == 0 || received < count {
        match radio.receive(timeout, invert_iq)? {
            Some(packet) => {
                received += 1;
                let freq_error = radio.frequency_error_hz()?;
                println!("{}", format_packet(&packet, freq_error));
            }
            None => {
                if received == 0 {
                    println!("No packet received within {:.1} s", timeout.as_secs_f64());
                }
                break;
            }
        }
    }
    Ok(received)
}

/// Check the bus and print the radio's state
///
/// The communication check overwrites the sync word; `sync_word` is written
/// back afterwards.
pub fn run_test<T: SpiTransport>(
    radio: &mut Rfm95<T>,
    sync_word: u8,
) -> Result<(), Box<dyn std::error::Error>> {
    println!("Version:        0x{:02X}", radio.version()?);

    let ok = radio.test_communication()?;
    radio.set_sync_word(sync_word)?;
    println!("Communication:  {}", if ok { "OK" } else { "FAILED" });
    if !ok {
        return Err("SPI communication test failed".into());
    }

    println!("Operating mode: {}", radio.operating_mode()?);
    let flags = radio.irq_flags()?;
    let names = irq_flag_names(flags);
    println!(
        "IRQ flags:      0x{:02X}{}",
        flags.bits(),
        if names.is_empty() {
            String::new()
        } else {
            format!(" ({})", names.join(", "))
        }
    );
    println!("Temperature:    {:.0} (raw + offset)", radio.read_temperature()?);
    println!();
    println!("Registers:");
    println!("{}", radio.dump_registers()?);
    Ok(())
}

fn format_packet(packet: &Packet, freq_error_hz: i32) -> String {
    format!(
        "[RSSI {} dBm, SNR {:.2} dB, offset {} Hz] {}",
        packet.rssi,
        packet.snr,
        freq_error_hz,
        format_payload(&packet.data)
    )
}

/// Printable text in quotes, anything else as hex
fn format_payload(data: &[u8]) -> String {
    match std::str::from_utf8(data) {
        Ok(text) if !text.chars().any(|c| c.is_control()) => format!("\"{}\"", text),
        _ => data
            .iter()
            .map(|b| format!("{:02X}", b))
            .collect::<Vec<_>>()
            .join(" "),
    }
}
