//! Read-only diagnostic views of the radio state

use std::fmt;

use crate::registers::{IrqFlags, OperatingMode, MODE_LONG_RANGE};

/// Decoded RegOpMode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModeStatus {
    /// Raw register value
    pub raw: u8,
    /// LoRa (long range) mode bit
    pub lora: bool,
    pub mode: OperatingMode,
}

impl ModeStatus {
    pub fn from_register(raw: u8) -> Self {
        Self {
            raw,
            lora: raw & MODE_LONG_RANGE != 0,
            mode: OperatingMode::from_bits(raw),
        }
    }
}

impl fmt::Display for ModeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "0x{:02X} ({}, {})",
            self.raw,
            if self.lora { "LoRa" } else { "FSK/OOK" },
            self.mode
        )
    }
}

/// Names of the set IRQ flags, in register bit order
pub fn irq_flag_names(flags: IrqFlags) -> Vec<&'static str> {
    flags.iter_names().map(|(name, _)| name).collect()
}

/// Snapshot of the registers that matter for a LoRa link
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterDump {
    pub op_mode: u8,
    pub frf: [u8; 3],
    pub pa_config: u8,
    pub lna: u8,
    pub modem_config: [u8; 3],
    pub preamble: [u8; 2],
    pub sync_word: u8,
    pub dio_mapping: [u8; 2],
    pub version: u8,
    pub irq_flags: u8,
}

impl fmt::Display for RegisterDump {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rows: [(&str, u8); 16] = [
            ("OP_MODE", self.op_mode),
            ("FRF_MSB", self.frf[0]),
            ("FRF_MID", self.frf[1]),
            ("FRF_LSB", self.frf[2]),
            ("PA_CONFIG", self.pa_config),
            ("LNA", self.lna),
            ("MODEM_CONFIG_1", self.modem_config[0]),
            ("MODEM_CONFIG_2", self.modem_config[1]),
            ("MODEM_CONFIG_3", self.modem_config[2]),
            ("PREAMBLE_MSB", self.preamble[0]),
            ("PREAMBLE_LSB", self.preamble[1]),
            ("SYNC_WORD", self.sync_word),
            ("DIO_MAPPING_1", self.dio_mapping[0]),
            ("DIO_MAPPING_2", self.dio_mapping[1]),
            ("VERSION", self.version),
            ("IRQ_FLAGS", self.irq_flags),
        ];
        for (i, (name, value)) in rows.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{:<16}0x{:02X}", name, value)?;
        }
        Ok(())
    }
}
