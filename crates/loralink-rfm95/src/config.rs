//! Physical-layer parameters and their register encodings
//!
//! The encode/decode helpers here are pure so they can be checked without a
//! radio. Every setter clamps or quantizes out-of-range input to the nearest
//! value the chip can represent.

use crate::registers::PA_BOOST;

/// Crystal oscillator frequency in Hz
pub const FXOSC_HZ: u64 = 32_000_000;

/// Synthesizer step denominator (2^19)
const FRF_SCALE: u64 = 1 << 19;

/// Largest value of the 24-bit FRF register
pub const FRF_MAX: u32 = 0x00FF_FFFF;

/// Selectable LoRa bandwidths in kHz, indexed by the ModemConfig1 field
pub const BANDWIDTHS_KHZ: [f32; 10] = [
    7.8, 10.4, 15.6, 20.8, 31.25, 41.7, 62.5, 125.0, 250.0, 500.0,
];

pub const MIN_SPREADING_FACTOR: u8 = 6;
pub const MAX_SPREADING_FACTOR: u8 = 12;
pub const MIN_CODING_RATE: u8 = 5;
pub const MAX_CODING_RATE: u8 = 8;

/// PA_BOOST output range in dBm
pub const PA_BOOST_RANGE: (i8, i8) = (2, 20);
/// RFO output range in dBm
pub const RFO_RANGE: (i8, i8) = (0, 15);

/// Convert a carrier frequency to the 24-bit FRF word
///
/// Frequencies above the synthesizer range saturate at [`FRF_MAX`].
pub fn frequency_to_frf(frequency_hz: u32) -> u32 {
    let frf = (frequency_hz as u64 * FRF_SCALE + FXOSC_HZ / 2) / FXOSC_HZ;
    frf.min(FRF_MAX as u64) as u32
}

/// Convert a 24-bit FRF word back to Hz
pub fn frf_to_frequency(frf: u32) -> u32 {
    let frf = (frf & FRF_MAX) as u64;
    ((frf * FXOSC_HZ + FRF_SCALE / 2) / FRF_SCALE) as u32
}

/// Encode a transmit power level for RegPaConfig
///
/// PA_BOOST clamps to 2..=20 dBm and RFO to 0..=15 dBm. The OutputPower field
/// is four bits wide, so PA_BOOST levels above 17 dBm saturate at 0x8F.
pub fn encode_tx_power(level: i8, pa_boost: bool) -> u8 {
    if pa_boost {
        let level = level.clamp(PA_BOOST_RANGE.0, PA_BOOST_RANGE.1);
        PA_BOOST | ((level - 2) as u8).min(0x0F)
    } else {
        level.clamp(RFO_RANGE.0, RFO_RANGE.1) as u8
    }
}

/// Decode RegPaConfig into (dBm, pa_boost)
pub fn decode_tx_power(reg: u8) -> (i8, bool) {
    let field = (reg & 0x0F) as i8;
    if reg & PA_BOOST != 0 {
        (field + 2, true)
    } else {
        (field, false)
    }
}

pub fn clamp_spreading_factor(sf: u8) -> u8 {
    sf.clamp(MIN_SPREADING_FACTOR, MAX_SPREADING_FACTOR)
}

pub fn clamp_coding_rate(denominator: u8) -> u8 {
    denominator.clamp(MIN_CODING_RATE, MAX_CODING_RATE)
}

/// Index of the smallest bandwidth at or above `khz`, or 500 kHz
pub fn bandwidth_index(khz: f32) -> u8 {
    BANDWIDTHS_KHZ
        .iter()
        .position(|&bw| khz <= bw)
        .unwrap_or(BANDWIDTHS_KHZ.len() - 1) as u8
}

/// Bandwidth for a ModemConfig1 index; reserved indices read as 500 kHz
pub fn bandwidth_from_index(index: u8) -> f32 {
    BANDWIDTHS_KHZ
        .get(index as usize)
        .copied()
        .unwrap_or(BANDWIDTHS_KHZ[BANDWIDTHS_KHZ.len() - 1])
}

/// Replace the bandwidth nibble of RegModemConfig1
pub fn with_bandwidth(reg: u8, khz: f32) -> u8 {
    (reg & 0x0F) | (bandwidth_index(khz) << 4)
}

/// Replace the coding-rate field (bits 3..1) of RegModemConfig1
pub fn with_coding_rate(reg: u8, denominator: u8) -> u8 {
    (reg & 0xF1) | ((clamp_coding_rate(denominator) - 4) << 1)
}

/// Coding-rate denominator from RegModemConfig1
pub fn coding_rate(reg: u8) -> u8 {
    ((reg >> 1) & 0x07) + 4
}

/// Replace the spreading-factor nibble of RegModemConfig2
pub fn with_spreading_factor(reg: u8, sf: u8) -> u8 {
    (reg & 0x0F) | (clamp_spreading_factor(sf) << 4)
}

/// Frequency error in Hz from the 20-bit signed FREQ_ERROR value
pub fn frequency_error_hz(raw: u32, bandwidth_khz: f32) -> i32 {
    let raw = raw & 0x000F_FFFF;
    // Sign-extend from bit 19
    let ferr = ((raw << 12) as i32) >> 12;
    let hz = ferr as f64 * (1u64 << 24) as f64 / FXOSC_HZ as f64 * (bandwidth_khz as f64 / 500.0);
    hz.round() as i32
}

/// Complete set of LoRa modem parameters
#[derive(Debug, Clone, PartialEq)]
pub struct RadioConfig {
    /// Carrier frequency in Hz
    pub frequency_hz: u32,
    /// Transmit power in dBm
    pub tx_power: i8,
    /// Use the PA_BOOST output instead of RFO
    pub pa_boost: bool,
    /// Spreading factor (6-12)
    pub spreading_factor: u8,
    /// Bandwidth in kHz
    pub bandwidth_khz: f32,
    /// Coding rate denominator (5-8, i.e. 4/5 .. 4/8)
    pub coding_rate: u8,
    /// Preamble length in symbols
    pub preamble_length: u16,
    pub sync_word: u8,
    pub invert_iq: bool,
}

impl Default for RadioConfig {
    fn default() -> Self {
        Self {
            frequency_hz: 868_100_000,
            tx_power: 17,
            pa_boost: true,
            spreading_factor: 7,
            bandwidth_khz: 125.0,
            coding_rate: 5,
            preamble_length: 8,
            sync_word: 0x12,
            invert_iq: false,
        }
    }
}

impl RadioConfig {
    /// Create a configuration with the default parameters
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_frequency_hz(mut self, hz: u32) -> Self {
        self.frequency_hz = hz;
        self
    }

    /// Set the carrier frequency in MHz
    pub fn with_frequency_mhz(mut self, mhz: f64) -> Self {
        self.frequency_hz = (mhz * 1_000_000.0).round() as u32;
        self
    }

    /// Set the transmit power and amplifier output
    pub fn with_tx_power(mut self, dbm: i8, pa_boost: bool) -> Self {
        self.tx_power = dbm;
        self.pa_boost = pa_boost;
        self
    }

    pub fn with_spreading_factor(mut self, sf: u8) -> Self {
        self.spreading_factor = sf;
        self
    }

    pub fn with_bandwidth_khz(mut self, khz: f32) -> Self {
        self.bandwidth_khz = khz;
        self
    }

    pub fn with_coding_rate(mut self, denominator: u8) -> Self {
        self.coding_rate = denominator;
        self
    }

    pub fn with_preamble_length(mut self, symbols: u16) -> Self {
        self.preamble_length = symbols;
        self
    }

    pub fn with_sync_word(mut self, sync_word: u8) -> Self {
        self.sync_word = sync_word;
        self
    }

    pub fn with_invert_iq(mut self, invert: bool) -> Self {
        self.invert_iq = invert;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frf_encoding() {
        // 868.1 MHz and 915 MHz reference words
        assert_eq!(frequency_to_frf(868_100_000), 0xD9_0666);
        assert_eq!(frequency_to_frf(915_000_000), 0xE4_C000);
        assert_eq!(frf_to_frequency(0xE4_C000), 915_000_000);
    }

    #[test]
    fn test_frf_round_trip_within_one_step() {
        for hz in [433_175_000u32, 868_100_000, 868_300_000, 902_300_000, 923_200_000] {
            let back = frf_to_frequency(frequency_to_frf(hz));
            assert!(back.abs_diff(hz) <= 62, "{} -> {}", hz, back);
        }
    }

    #[test]
    fn test_frf_saturates_above_range() {
        assert_eq!(frequency_to_frf(1_100_000_000), FRF_MAX);
        assert_eq!(frequency_to_frf(u32::MAX), FRF_MAX);
        let top = frf_to_frequency(FRF_MAX);
        assert!(top > 1_000_000_000);
        assert_eq!(frf_to_frequency(frequency_to_frf(1_100_000_000)), top);
        assert_eq!(frequency_to_frf(0), 0);
    }

    #[test]
    fn test_tx_power_encoding() {
        assert_eq!(encode_tx_power(17, true), 0x8F);
        assert_eq!(encode_tx_power(2, true), 0x80);
        assert_eq!(encode_tx_power(0, true), 0x80);
        assert_eq!(encode_tx_power(20, true), 0x8F);
        assert_eq!(encode_tx_power(10, false), 0x0A);
        assert_eq!(encode_tx_power(-3, false), 0x00);
        assert_eq!(encode_tx_power(30, false), 0x0F);

        assert_eq!(decode_tx_power(0x8F), (17, true));
        assert_eq!(decode_tx_power(0x0A), (10, false));
        assert_eq!(decode_tx_power(0x4F), (15, false));
    }

    #[test]
    fn test_bandwidth_quantization() {
        assert_eq!(bandwidth_index(7.8), 0);
        assert_eq!(bandwidth_index(100.0), 7);
        assert_eq!(bandwidth_index(125.0), 7);
        assert_eq!(bandwidth_index(126.0), 8);
        assert_eq!(bandwidth_index(500.0), 9);
        assert_eq!(bandwidth_index(600.0), 9);
        assert_eq!(bandwidth_from_index(7), 125.0);
        assert_eq!(bandwidth_from_index(12), 500.0);
    }

    #[test]
    fn test_modem_config_fields() {
        // 125 kHz, 4/5, explicit header
        let reg = with_coding_rate(with_bandwidth(0x00, 125.0), 5);
        assert_eq!(reg, 0x72);
        assert_eq!(coding_rate(reg), 5);
        for cr in MIN_CODING_RATE..=MAX_CODING_RATE {
            let encoded = with_coding_rate(reg, cr);
            assert_eq!(coding_rate(encoded), cr);
            assert_eq!(encoded & 0xF0, 0x70);
        }
        assert_eq!(coding_rate(with_coding_rate(reg, 2)), 5);
        assert_eq!(coding_rate(with_coding_rate(reg, 9)), 8);
        // Implicit-header bit survives a coding-rate change
        assert_eq!(with_coding_rate(0x73, 8) & 0x01, 0x01);

        assert_eq!(with_spreading_factor(0x74, 12), 0xC4);
        assert_eq!(with_spreading_factor(0x74, 3), 0x64);
        assert_eq!(with_spreading_factor(0x74, 13), 0xC4);
    }

    #[test]
    fn test_frequency_error() {
        assert_eq!(frequency_error_hz(0, 125.0), 0);
        // +1000 counts at 500 kHz
        assert_eq!(frequency_error_hz(1000, 500.0), 524);
        // -1000 counts (20-bit two's complement)
        assert_eq!(frequency_error_hz(0x10_0000 - 1000, 500.0), -524);
        assert_eq!(frequency_error_hz(0x10_0000 - 1000, 125.0), -131);
    }

    #[test]
    fn test_config_defaults_and_builder() {
        let config = RadioConfig::new();
        assert_eq!(config.frequency_hz, 868_100_000);
        assert_eq!(config.tx_power, 17);
        assert!(config.pa_boost);
        assert_eq!(config.spreading_factor, 7);
        assert_eq!(config.bandwidth_khz, 125.0);
        assert_eq!(config.coding_rate, 5);
        assert_eq!(config.preamble_length, 8);
        assert_eq!(config.sync_word, 0x12);

        let config = RadioConfig::new()
            .with_frequency_mhz(915.0)
            .with_tx_power(10, false)
            .with_spreading_factor(9)
            .with_bandwidth_khz(250.0)
            .with_coding_rate(8)
            .with_preamble_length(12)
            .with_sync_word(0x34)
            .with_invert_iq(true);
        assert_eq!(config.frequency_hz, 915_000_000);
        assert_eq!((config.tx_power, config.pa_boost), (10, false));
        assert_eq!(config.spreading_factor, 9);
        assert!(config.invert_iq);
    }
}
