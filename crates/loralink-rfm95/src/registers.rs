//! SX1276 LoRa register map and field values
//!
//! Addresses are for the LoRa register page. A handful of addresses mean
//! something else when the chip is in FSK mode; those are listed separately.

use bitflags::bitflags;

/// LoRa-page registers used by the driver
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Register {
    Fifo = 0x00,
    OpMode = 0x01,
    FrfMsb = 0x06,
    FrfMid = 0x07,
    FrfLsb = 0x08,
    PaConfig = 0x09,
    PaRamp = 0x0A,
    Ocp = 0x0B,
    Lna = 0x0C,
    FifoAddrPtr = 0x0D,
    FifoTxBaseAddr = 0x0E,
    FifoRxBaseAddr = 0x0F,
    FifoRxCurrentAddr = 0x10,
    IrqFlagsMask = 0x11,
    IrqFlags = 0x12,
    RxNbBytes = 0x13,
    PktSnrValue = 0x19,
    PktRssiValue = 0x1A,
    ModemConfig1 = 0x1D,
    ModemConfig2 = 0x1E,
    PreambleMsb = 0x20,
    PreambleLsb = 0x21,
    PayloadLength = 0x22,
    /// Beacon period, as driven by beacon mode
    BeaconPeriodMsb = 0x24,
    BeaconPeriodLsb = 0x25,
    ModemConfig3 = 0x26,
    FreqErrorMsb = 0x28,
    FreqErrorMid = 0x29,
    FreqErrorLsb = 0x2A,
    RssiWideband = 0x2C,
    DetectionOptimize = 0x31,
    InvertIq = 0x33,
    DetectionThreshold = 0x37,
    SyncWord = 0x39,
    InvertIq2 = 0x3B,
    DioMapping1 = 0x40,
    DioMapping2 = 0x41,
    Version = 0x42,
    PaDac = 0x4D,
}

impl Register {
    /// Register address
    pub fn addr(self) -> u8 {
        self as u8
    }
}

/// FSK-page temperature calibration offset (shares 0x3B with `InvertIq2`)
pub const REG_FSK_TEMP_OFFSET: u8 = 0x3B;
/// FSK-page raw temperature reading
pub const REG_FSK_TEMP: u8 = 0x3C;

/// Expected VERSION value for SX1276/RFM95
pub const SX1276_VERSION: u8 = 0x12;

// RegOpMode fields
pub const MODE_LONG_RANGE: u8 = 0x80;
pub const MODE_MASK: u8 = 0x07;

// RegPaConfig fields
pub const PA_BOOST: u8 = 0x80;

// RegModemConfig3 fields
pub const MODEM_CONFIG3_AGC_AUTO_ON: u8 = 0x04;

// RegLna fields
pub const LNA_BOOST_HF: u8 = 0x03;
pub const LNA_GAIN_MASK: u8 = 0xE0;

// Register values written during initialisation
pub const MODEM_CONFIG1_DEFAULT: u8 = 0x72;
pub const MODEM_CONFIG2_DEFAULT: u8 = 0x70;
pub const MODEM_CONFIG3_DEFAULT: u8 = 0x04;
pub const PA_CONFIG_DEFAULT: u8 = 0x8F;
pub const PA_DAC_DEFAULT: u8 = 0x87;
pub const LNA_DEFAULT: u8 = 0x23;

// Detection optimisation pairs
pub const DETECTION_OPTIMIZE_SF6: u8 = 0xC5;
pub const DETECTION_THRESHOLD_SF6: u8 = 0x0C;
pub const DETECTION_OPTIMIZE_SF7_12: u8 = 0xC3;
pub const DETECTION_THRESHOLD_SF7_12: u8 = 0x0A;

// IQ register pairs (InvertIq, InvertIq2)
pub const INVERT_IQ_ON: (u8, u8) = (0x66, 0x19);
pub const INVERT_IQ_OFF: (u8, u8) = (0x27, 0x1D);
pub const INVERT_IQ_RX_BIT: u8 = 0x40;

// DIO mapping (top two bits of RegDioMapping1 / RegDioMapping2)
pub const DIO_MAPPING_TX: (u8, u8) = (0x40, 0x40);
pub const DIO_MAPPING_RX: (u8, u8) = (0x40, 0xC0);
pub const DIO_FIELD_MASK: u8 = 0xC0;
pub const DIO3_TX_DONE: u8 = 0x40;
pub const DIO0_RX_DONE: u8 = 0x00;

/// Value read back by the communication self-test
pub const COMM_TEST_VALUE: u8 = 0x42;

/// Device operating mode (RegOpMode bits 2..0)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatingMode {
    Sleep = 0,
    Standby = 1,
    FrequencySynthTx = 2,
    Transmit = 3,
    FrequencySynthRx = 4,
    ReceiveContinuous = 5,
    ReceiveSingle = 6,
    ChannelActivityDetection = 7,
}

impl OperatingMode {
    /// Decode the mode bits of RegOpMode
    pub fn from_bits(reg: u8) -> Self {
        match reg & MODE_MASK {
            0 => OperatingMode::Sleep,
            1 => OperatingMode::Standby,
            2 => OperatingMode::FrequencySynthTx,
            3 => OperatingMode::Transmit,
            4 => OperatingMode::FrequencySynthRx,
            5 => OperatingMode::ReceiveContinuous,
            6 => OperatingMode::ReceiveSingle,
            _ => OperatingMode::ChannelActivityDetection,
        }
    }

    /// Mode bits for RegOpMode
    pub fn bits(self) -> u8 {
        self as u8
    }
}

impl std::fmt::Display for OperatingMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            OperatingMode::Sleep => "SLEEP",
            OperatingMode::Standby => "STDBY",
            OperatingMode::FrequencySynthTx => "FSTX",
            OperatingMode::Transmit => "TX",
            OperatingMode::FrequencySynthRx => "FSRX",
            OperatingMode::ReceiveContinuous => "RXCONTINUOUS",
            OperatingMode::ReceiveSingle => "RXSINGLE",
            OperatingMode::ChannelActivityDetection => "CAD",
        };
        f.write_str(name)
    }
}

bitflags! {
    /// RegIrqFlags bits
    ///
    /// Flags are sticky; writing a 1 to a bit clears it.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct IrqFlags: u8 {
        const CAD_DONE          = 0x01;
        const CAD_DETECTED      = 0x02;
        const RX_TIMEOUT        = 0x04;
        const TX_DONE           = 0x08;
        const VALID_HEADER      = 0x10;
        const PAYLOAD_CRC_ERROR = 0x20;
        const RX_DONE           = 0x40;
        const TX_TIMEOUT        = 0x80;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_addresses() {
        assert_eq!(Register::Fifo.addr(), 0x00);
        assert_eq!(Register::IrqFlags.addr(), 0x12);
        assert_eq!(Register::SyncWord.addr(), 0x39);
        assert_eq!(Register::InvertIq2.addr(), REG_FSK_TEMP_OFFSET);
        assert_eq!(Register::PaDac.addr(), 0x4D);
    }

    #[test]
    fn test_operating_mode_bits() {
        for bits in 0..8u8 {
            assert_eq!(OperatingMode::from_bits(MODE_LONG_RANGE | bits).bits(), bits);
        }
        assert_eq!(OperatingMode::from_bits(0x85), OperatingMode::ReceiveContinuous);
        assert_eq!(OperatingMode::from_bits(0x09), OperatingMode::Standby);
        assert_eq!(OperatingMode::Transmit.to_string(), "TX");
    }

    #[test]
    fn test_irq_flags_write_back() {
        let flags = IrqFlags::from_bits_retain(0x68);
        assert!(flags.contains(IrqFlags::RX_DONE | IrqFlags::PAYLOAD_CRC_ERROR));
        assert!(flags.contains(IrqFlags::TX_DONE));
        assert!(!flags.contains(IrqFlags::VALID_HEADER));
        assert_eq!(IrqFlags::all().bits(), 0xFF);
    }
}
