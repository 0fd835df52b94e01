//! RFM95 / SX1276 driver
//!
//! The driver talks to the radio exclusively through register reads and
//! writes issued over a [`SpiTransport`]. All operations run on the caller's
//! thread; transmit and receive block while polling RegIrqFlags.

use std::thread;
use std::time::{Duration, Instant};

use loralink_core::{Error as TransportError, SpiTransport};

use crate::config::{self, RadioConfig};
use crate::diag::{ModeStatus, RegisterDump};
use crate::error::{RadioError, Result};
use crate::registers::*;

/// Largest payload a single LoRa packet can carry
pub const MAX_PAYLOAD_LEN: usize = 255;

/// Default receive timeout
pub const DEFAULT_RX_TIMEOUT: Duration = Duration::from_secs(5);

/// How long to wait for TxDone
const TX_TIMEOUT: Duration = Duration::from_millis(2000);

/// Interval between IRQ flag polls
const POLL_INTERVAL: Duration = Duration::from_millis(1);

const MODE_SETTLE: Duration = Duration::from_millis(10);
const FSK_SETTLE: Duration = Duration::from_millis(100);

/// OP_MODE value for FSK/OOK sleep, where the temperature registers are mapped
const FSK_SLEEP: u8 = 0x00;

/// RSSI register offset for the high-frequency port
const RSSI_OFFSET_DBM: i16 = -137;

/// A received packet with the link quality measured for it
#[derive(Debug, Clone, PartialEq)]
pub struct Packet {
    pub data: Vec<u8>,
    /// Packet RSSI in dBm
    pub rssi: i16,
    /// Packet SNR in dB
    pub snr: f32,
}

/// RFM95 / SX1276 LoRa radio
pub struct Rfm95<T: SpiTransport> {
    transport: T,
}

impl<T: SpiTransport> Rfm95<T> {
    /// Wrap a transport; nothing is opened until [`Rfm95::begin`]
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Open the transport and bring the radio up in LoRa standby
    ///
    /// If anything fails after the transport was opened, it is closed again.
    pub fn begin(&mut self) -> Result<()> {
        self.transport.open()?;
        if let Err(e) = self.init() {
            log::debug!("rfm95: Initialisation failed, closing transport: {}", e);
            self.transport.close();
            return Err(e);
        }
        log::info!("rfm95: Radio initialised");
        Ok(())
    }

    fn init(&mut self) -> Result<()> {
        self.sleep()?;

        let found = self.version()?;
        if found != SX1276_VERSION {
            return Err(RadioError::VersionMismatch {
                expected: SX1276_VERSION,
                found,
            });
        }

        self.write_register(Register::OpMode, MODE_LONG_RANGE)?;
        thread::sleep(MODE_SETTLE);

        self.write_register(Register::FifoTxBaseAddr, 0)?;
        self.write_register(Register::FifoRxBaseAddr, 0)?;
        self.write_register(Register::ModemConfig1, MODEM_CONFIG1_DEFAULT)?;
        self.write_register(Register::ModemConfig2, MODEM_CONFIG2_DEFAULT)?;
        self.write_register(Register::ModemConfig3, MODEM_CONFIG3_DEFAULT)?;
        self.write_register(Register::PaConfig, PA_CONFIG_DEFAULT)?;
        self.write_register(Register::PaDac, PA_DAC_DEFAULT)?;
        self.write_register(Register::Lna, LNA_DEFAULT)?;
        self.write_register(Register::FifoAddrPtr, 0)?;

        self.standby()?;
        thread::sleep(MODE_SETTLE);
        Ok(())
    }

    /// Close the transport
    pub fn end(&mut self) {
        if self.transport.is_active() {
            log::info!("rfm95: Closing radio");
        }
        self.transport.close();
    }

    pub fn is_active(&self) -> bool {
        self.transport.is_active()
    }

    // Register access

    fn read_addr(&mut self, addr: u8) -> Result<u8> {
        let response = self.transport.transfer(&[addr & 0x7F], 1)?;
        response.first().copied().ok_or_else(|| {
            TransportError::ShortResponse {
                expected: 1,
                actual: 0,
            }
            .into()
        })
    }

    fn write_addr(&mut self, addr: u8, value: u8) -> Result<()> {
        self.transport.transfer(&[addr | 0x80, value], 0)?;
        Ok(())
    }

    /// Read one register
    pub fn read_register(&mut self, reg: Register) -> Result<u8> {
        self.read_addr(reg.addr())
    }

    /// Write one register
    pub fn write_register(&mut self, reg: Register, value: u8) -> Result<()> {
        self.write_addr(reg.addr(), value)
    }

    fn modify_register(&mut self, reg: Register, f: impl FnOnce(u8) -> u8) -> Result<()> {
        let value = self.read_register(reg)?;
        self.write_register(reg, f(value))
    }

    fn write_fifo(&mut self, data: &[u8]) -> Result<()> {
        if data.is_empty() {
            return Ok(());
        }
        let mut frame = Vec::with_capacity(data.len() + 1);
        frame.push(Register::Fifo.addr() | 0x80);
        frame.extend_from_slice(data);
        self.transport.transfer(&frame, 0)?;
        Ok(())
    }

    fn read_fifo(&mut self, len: usize) -> Result<Vec<u8>> {
        if len == 0 {
            return Ok(Vec::new());
        }
        let data = self.transport.transfer(&[Register::Fifo.addr()], len)?;
        if data.len() < len {
            return Err(TransportError::ShortResponse {
                expected: len,
                actual: data.len(),
            }
            .into());
        }
        Ok(data)
    }

    // Modes

    fn set_mode(&mut self, mode: OperatingMode) -> Result<()> {
        self.write_register(Register::OpMode, MODE_LONG_RANGE | mode.bits())
    }

    /// Enter LoRa standby
    pub fn standby(&mut self) -> Result<()> {
        self.set_mode(OperatingMode::Standby)
    }

    /// Enter sleep, keeping the modulation bit as it is
    pub fn sleep(&mut self) -> Result<()> {
        self.modify_register(Register::OpMode, |v| (v & !MODE_MASK) | OperatingMode::Sleep.bits())?;
        thread::sleep(MODE_SETTLE);
        Ok(())
    }

    /// Switch between LoRa and FSK/OOK modulation
    pub fn set_lora_mode(&mut self, enable: bool) -> Result<()> {
        self.modify_register(Register::OpMode, |v| {
            if enable {
                v | MODE_LONG_RANGE
            } else {
                v & !MODE_LONG_RANGE
            }
        })?;
        thread::sleep(MODE_SETTLE);
        Ok(())
    }

    /// Arm continuous reception with DIO0 signalling RxDone
    ///
    /// Fails with [`RadioError::ModeNotReached`] if RegOpMode does not read
    /// back as RX continuous afterwards.
    pub fn set_continuous_receive(&mut self) -> Result<()> {
        self.standby()?;

        let base = self.read_register(Register::FifoRxBaseAddr)?;
        self.write_register(Register::FifoAddrPtr, base)?;
        self.modify_register(Register::DioMapping1, |v| (v & !DIO_FIELD_MASK) | DIO0_RX_DONE)?;
        self.clear_irq_flags()?;
        self.modify_register(Register::OpMode, |v| {
            (v & !MODE_MASK) | OperatingMode::ReceiveContinuous.bits()
        })?;

        let found = OperatingMode::from_bits(self.read_register(Register::OpMode)?);
        if found != OperatingMode::ReceiveContinuous {
            return Err(RadioError::ModeNotReached {
                expected: OperatingMode::ReceiveContinuous,
                found,
            });
        }
        Ok(())
    }

    /// Reset the FIFO and detection settings and enter RX continuous
    pub fn receive_mode(&mut self) -> Result<()> {
        self.write_register(Register::FifoAddrPtr, 0)?;
        self.clear_irq_flags()?;
        self.write_register(Register::Lna, LNA_DEFAULT)?;
        self.write_register(Register::DetectionOptimize, DETECTION_OPTIMIZE_SF7_12)?;
        self.write_register(Register::DetectionThreshold, DETECTION_THRESHOLD_SF7_12)?;
        self.set_mode(OperatingMode::ReceiveContinuous)
    }

    /// Map DIO3 and DIO4 (top two bits of the mapping registers)
    ///
    /// Also unmasks every IRQ source and clears pending flags.
    pub fn set_dio_mapping(&mut self, dio3: u8, dio4: u8) -> Result<()> {
        self.modify_register(Register::DioMapping1, |v| {
            (v & !DIO_FIELD_MASK) | (dio3 & DIO_FIELD_MASK)
        })?;
        self.modify_register(Register::DioMapping2, |v| {
            (v & !DIO_FIELD_MASK) | (dio4 & DIO_FIELD_MASK)
        })?;
        self.write_register(Register::IrqFlagsMask, 0x00)?;
        self.clear_irq_flags()
    }

    // Parameters

    /// Set the carrier frequency in Hz
    pub fn set_frequency(&mut self, frequency_hz: u32) -> Result<()> {
        let frf = config::frequency_to_frf(frequency_hz);
        self.write_register(Register::FrfMsb, (frf >> 16) as u8)?;
        self.write_register(Register::FrfMid, (frf >> 8) as u8)?;
        self.write_register(Register::FrfLsb, frf as u8)?;
        log::debug!("rfm95: Frequency set to {} Hz (FRF 0x{:06X})", frequency_hz, frf);
        Ok(())
    }

    /// Carrier frequency in Hz
    pub fn frequency(&mut self) -> Result<u32> {
        let msb = self.read_register(Register::FrfMsb)? as u32;
        let mid = self.read_register(Register::FrfMid)? as u32;
        let lsb = self.read_register(Register::FrfLsb)? as u32;
        Ok(config::frf_to_frequency((msb << 16) | (mid << 8) | lsb))
    }

    /// Set the transmit power in dBm
    ///
    /// PA_BOOST accepts 2..=20 dBm, RFO 0..=15 dBm; other values are clamped.
    pub fn set_tx_power(&mut self, level: i8, pa_boost: bool) -> Result<()> {
        self.write_register(Register::PaConfig, config::encode_tx_power(level, pa_boost))
    }

    /// Transmit power in dBm and whether PA_BOOST is selected
    pub fn tx_power(&mut self) -> Result<(i8, bool)> {
        Ok(config::decode_tx_power(self.read_register(Register::PaConfig)?))
    }

    /// Set the spreading factor (clamped to 6..=12)
    pub fn set_spreading_factor(&mut self, sf: u8) -> Result<()> {
        let sf = config::clamp_spreading_factor(sf);
        let (optimize, threshold) = if sf == 6 {
            (DETECTION_OPTIMIZE_SF6, DETECTION_THRESHOLD_SF6)
        } else {
            (DETECTION_OPTIMIZE_SF7_12, DETECTION_THRESHOLD_SF7_12)
        };
        self.write_register(Register::DetectionOptimize, optimize)?;
        self.write_register(Register::DetectionThreshold, threshold)?;
        self.modify_register(Register::ModemConfig2, |v| config::with_spreading_factor(v, sf))
    }

    pub fn spreading_factor(&mut self) -> Result<u8> {
        Ok(self.read_register(Register::ModemConfig2)? >> 4)
    }

    /// Set the bandwidth, rounding up to the next supported value
    pub fn set_bandwidth(&mut self, khz: f32) -> Result<()> {
        self.modify_register(Register::ModemConfig1, |v| config::with_bandwidth(v, khz))
    }

    /// Bandwidth in kHz
    pub fn bandwidth(&mut self) -> Result<f32> {
        let reg = self.read_register(Register::ModemConfig1)?;
        Ok(config::bandwidth_from_index(reg >> 4))
    }

    /// Set the coding rate denominator (clamped to 5..=8)
    pub fn set_coding_rate(&mut self, denominator: u8) -> Result<()> {
        self.modify_register(Register::ModemConfig1, |v| config::with_coding_rate(v, denominator))
    }

    pub fn coding_rate(&mut self) -> Result<u8> {
        Ok(config::coding_rate(self.read_register(Register::ModemConfig1)?))
    }

    pub fn set_preamble_length(&mut self, symbols: u16) -> Result<()> {
        let [msb, lsb] = symbols.to_be_bytes();
        self.write_register(Register::PreambleMsb, msb)?;
        self.write_register(Register::PreambleLsb, lsb)
    }

    pub fn preamble_length(&mut self) -> Result<u16> {
        let msb = self.read_register(Register::PreambleMsb)?;
        let lsb = self.read_register(Register::PreambleLsb)?;
        Ok(u16::from_be_bytes([msb, lsb]))
    }

    /// Select inverted or normal IQ; both IQ registers are always written
    pub fn set_invert_iq(&mut self, invert: bool) -> Result<()> {
        let (iq, iq2) = if invert { INVERT_IQ_ON } else { INVERT_IQ_OFF };
        self.write_register(Register::InvertIq, iq)?;
        self.write_register(Register::InvertIq2, iq2)
    }

    pub fn invert_iq(&mut self) -> Result<bool> {
        Ok(self.read_register(Register::InvertIq)? & INVERT_IQ_RX_BIT != 0)
    }

    pub fn set_sync_word(&mut self, sync_word: u8) -> Result<()> {
        self.write_register(Register::SyncWord, sync_word)
    }

    pub fn sync_word(&mut self) -> Result<u8> {
        self.read_register(Register::SyncWord)
    }

    /// Configure the LNA
    ///
    /// `gain` of `None` hands gain control to the AGC. `Some(g)` turns the
    /// AGC off and selects gain G1 (highest) to G6 (lowest), clamped.
    pub fn set_lna(&mut self, gain: Option<u8>, boost: bool) -> Result<()> {
        self.set_auto_agc(gain.is_none())?;
        self.modify_register(Register::Lna, |v| {
            let v = match gain {
                Some(g) => (v & !LNA_GAIN_MASK) | (g.clamp(1, 6) << 5),
                None => v,
            };
            if boost {
                v | LNA_BOOST_HF
            } else {
                v & !LNA_BOOST_HF
            }
        })
    }

    /// Raw RegLna
    pub fn lna(&mut self) -> Result<u8> {
        self.read_register(Register::Lna)
    }

    pub fn set_auto_agc(&mut self, enable: bool) -> Result<()> {
        self.modify_register(Register::ModemConfig3, |v| {
            if enable {
                v | MODEM_CONFIG3_AGC_AUTO_ON
            } else {
                v & !MODEM_CONFIG3_AGC_AUTO_ON
            }
        })
    }

    pub fn auto_agc(&mut self) -> Result<bool> {
        Ok(self.read_register(Register::ModemConfig3)? & MODEM_CONFIG3_AGC_AUTO_ON != 0)
    }

    /// Apply a full set of modem parameters
    pub fn configure(&mut self, config: &RadioConfig) -> Result<()> {
        self.set_frequency(config.frequency_hz)?;
        self.set_tx_power(config.tx_power, config.pa_boost)?;
        self.set_spreading_factor(config.spreading_factor)?;
        self.set_bandwidth(config.bandwidth_khz)?;
        self.set_coding_rate(config.coding_rate)?;
        self.set_preamble_length(config.preamble_length)?;
        self.set_sync_word(config.sync_word)?;
        self.set_invert_iq(config.invert_iq)?;
        log::debug!("rfm95: Applied {:?}", config);
        Ok(())
    }

    /// Read the modem parameters back from the radio
    pub fn read_config(&mut self) -> Result<RadioConfig> {
        let (tx_power, pa_boost) = self.tx_power()?;
        Ok(RadioConfig {
            frequency_hz: self.frequency()?,
            tx_power,
            pa_boost,
            spreading_factor: self.spreading_factor()?,
            bandwidth_khz: self.bandwidth()?,
            coding_rate: self.coding_rate()?,
            preamble_length: self.preamble_length()?,
            sync_word: self.sync_word()?,
            invert_iq: self.invert_iq()?,
        })
    }

    // Transmit / receive

    /// Send one packet and wait for TxDone
    ///
    /// IQ is set back to normal before returning, whatever the outcome.
    pub fn send(&mut self, payload: &[u8], invert_iq: bool) -> Result<()> {
        if payload.len() > MAX_PAYLOAD_LEN {
            return Err(RadioError::PayloadTooLarge(payload.len()));
        }
        let result = self.transmit(payload, invert_iq);
        let restored = self.set_invert_iq(false);
        result.and(restored)
    }

    fn transmit(&mut self, payload: &[u8], invert_iq: bool) -> Result<()> {
        self.set_invert_iq(invert_iq)?;
        self.set_dio_mapping(DIO_MAPPING_TX.0, DIO_MAPPING_TX.1)?;

        self.standby()?;
        thread::sleep(POLL_INTERVAL);
        self.modify_register(Register::DioMapping1, |v| (v & !DIO_FIELD_MASK) | DIO3_TX_DONE)?;
        self.clear_irq_flags()?;

        self.write_register(Register::FifoAddrPtr, 0)?;
        self.write_fifo(payload)?;
        self.write_register(Register::PayloadLength, payload.len() as u8)?;

        self.set_mode(OperatingMode::Transmit)?;
        log::debug!("rfm95: Transmitting {} byte(s)", payload.len());

        let start = Instant::now();
        loop {
            if self.irq_flags()?.contains(IrqFlags::TX_DONE) {
                self.clear_irq_flags()?;
                self.standby()?;
                return Ok(());
            }
            if start.elapsed() > TX_TIMEOUT {
                log::warn!("rfm95: TxDone not raised within {:?}", TX_TIMEOUT);
                return Err(RadioError::TxTimeout);
            }
            thread::sleep(POLL_INTERVAL);
        }
    }

    /// Wait up to `timeout` for one packet
    ///
    /// Returns `Ok(None)` on timeout. Packets failing the payload CRC are
    /// dropped and listening continues. A zero-length packet is returned as
    /// `Some` with empty data.
    pub fn receive(&mut self, timeout: Duration, invert_iq: bool) -> Result<Option<Packet>> {
        let result = self.listen(timeout, invert_iq);
        let restored = self.set_invert_iq(false);
        result.and_then(|packet| restored.map(|()| packet))
    }

    fn listen(&mut self, timeout: Duration, invert_iq: bool) -> Result<Option<Packet>> {
        self.set_invert_iq(invert_iq)?;
        self.set_mode(OperatingMode::ReceiveContinuous)?;
        self.set_dio_mapping(DIO_MAPPING_RX.0, DIO_MAPPING_RX.1)?;
        self.clear_irq_flags()?;

        let start = Instant::now();
        loop {
            let flags = self.irq_flags()?;
            if flags.contains(IrqFlags::RX_DONE) {
                if flags.contains(IrqFlags::PAYLOAD_CRC_ERROR) {
                    log::debug!("rfm95: Dropped packet with CRC error");
                    self.clear_irq_flags()?;
                } else {
                    let data = self.read_payload()?;
                    let rssi = self.packet_rssi()?;
                    let snr = self.packet_snr()?;
                    self.clear_irq_flags()?;
                    log::debug!(
                        "rfm95: Received {} byte(s), RSSI {} dBm, SNR {} dB",
                        data.len(),
                        rssi,
                        snr
                    );
                    return Ok(Some(Packet { data, rssi, snr }));
                }
            }
            if start.elapsed() > timeout {
                self.clear_irq_flags()?;
                return Ok(None);
            }
            thread::sleep(POLL_INTERVAL);
        }
    }

    /// Point the FIFO at its start
    pub fn reset_rx_pointer(&mut self) -> Result<()> {
        self.write_register(Register::FifoAddrPtr, 0)
    }

    /// Read the last received packet's bytes from the FIFO
    pub fn read_payload(&mut self) -> Result<Vec<u8>> {
        let len = self.rx_byte_count()? as usize;
        if len == 0 {
            return Ok(Vec::new());
        }
        let current = self.fifo_rx_current_addr()?;
        self.write_register(Register::FifoAddrPtr, current)?;
        self.read_fifo(len)
    }

    pub fn fifo_rx_current_addr(&mut self) -> Result<u8> {
        self.read_register(Register::FifoRxCurrentAddr)
    }

    pub fn rx_byte_count(&mut self) -> Result<u8> {
        self.read_register(Register::RxNbBytes)
    }

    // Status

    /// RSSI of the last packet in dBm
    pub fn packet_rssi(&mut self) -> Result<i16> {
        Ok(RSSI_OFFSET_DBM + self.read_register(Register::PktRssiValue)? as i16)
    }

    /// SNR of the last packet in dB
    pub fn packet_snr(&mut self) -> Result<f32> {
        Ok(self.read_register(Register::PktSnrValue)? as i8 as f32 * 0.25)
    }

    /// Wideband RSSI reading in dBm
    pub fn current_rssi(&mut self) -> Result<i16> {
        Ok(RSSI_OFFSET_DBM + self.read_register(Register::RssiWideband)? as i16)
    }

    /// Estimated carrier offset of the last packet in Hz
    pub fn frequency_error_hz(&mut self) -> Result<i32> {
        let msb = (self.read_register(Register::FreqErrorMsb)? & 0x0F) as u32;
        let mid = self.read_register(Register::FreqErrorMid)? as u32;
        let lsb = self.read_register(Register::FreqErrorLsb)? as u32;
        let bandwidth = self.bandwidth()?;
        Ok(config::frequency_error_hz((msb << 16) | (mid << 8) | lsb, bandwidth))
    }

    // Temperature

    /// Run `f` in FSK sleep and put RegOpMode back afterwards
    fn in_fsk_sleep<R>(&mut self, f: impl FnOnce(&mut Self) -> Result<R>) -> Result<R> {
        let saved = self.read_register(Register::OpMode)?;
        let result = self.write_register(Register::OpMode, FSK_SLEEP).and_then(|()| {
            thread::sleep(FSK_SETTLE);
            f(self)
        });
        let restored = self.write_register(Register::OpMode, saved);
        thread::sleep(FSK_SETTLE);
        result.and_then(|value| restored.map(|()| value))
    }

    /// Temperature as the sum of the raw reading and the stored offset
    pub fn read_temperature(&mut self) -> Result<f32> {
        self.in_fsk_sleep(|radio| {
            let offset = radio.read_addr(REG_FSK_TEMP_OFFSET)?;
            let raw = radio.read_addr(REG_FSK_TEMP)?;
            Ok(raw as f32 + offset as f32)
        })
    }

    /// Store a temperature offset; fractional degrees are truncated
    pub fn calibrate_temperature(&mut self, reference_c: f32) -> Result<()> {
        let offset = (reference_c.trunc() as i32) as u8;
        self.in_fsk_sleep(|radio| radio.write_addr(REG_FSK_TEMP_OFFSET, offset))?;
        log::debug!("rfm95: Temperature offset set to 0x{:02X}", offset);
        Ok(())
    }

    // Beacon

    /// Load `payload` and start transmitting it as a beacon
    ///
    /// The interval is written in whole seconds to registers 0x24/0x25.
    pub fn set_beacon_mode(&mut self, interval_ms: u32, payload: &[u8]) -> Result<()> {
        if payload.len() > MAX_PAYLOAD_LEN {
            return Err(RadioError::PayloadTooLarge(payload.len()));
        }
        self.set_dio_mapping(DIO_MAPPING_TX.0, DIO_MAPPING_TX.1)?;

        self.write_register(Register::FifoTxBaseAddr, 0)?;
        self.write_register(Register::FifoAddrPtr, 0)?;
        self.write_fifo(payload)?;
        self.write_register(Register::PayloadLength, payload.len() as u8)?;

        let period = (interval_ms / 1000).min(u16::MAX as u32) as u16;
        let [msb, lsb] = period.to_be_bytes();
        self.write_register(Register::BeaconPeriodMsb, msb)?;
        self.write_register(Register::BeaconPeriodLsb, lsb)?;

        self.modify_register(Register::OpMode, |v| {
            ((v | MODE_LONG_RANGE) & !MODE_MASK) | OperatingMode::Transmit.bits()
        })?;
        log::debug!("rfm95: Beacon started, period {} s", period);
        Ok(())
    }

    pub fn stop_beacon_mode(&mut self) -> Result<()> {
        self.standby()
    }

    // IRQ flags

    pub fn irq_flags(&mut self) -> Result<IrqFlags> {
        Ok(IrqFlags::from_bits_retain(self.read_register(Register::IrqFlags)?))
    }

    /// Clear every IRQ flag
    pub fn clear_irq_flags(&mut self) -> Result<()> {
        self.clear_irq(IrqFlags::all())
    }

    /// Clear the given IRQ flags (write-1-to-clear)
    pub fn clear_irq(&mut self, flags: IrqFlags) -> Result<()> {
        self.write_register(Register::IrqFlags, flags.bits())
    }

    pub fn tx_done(&mut self) -> Result<bool> {
        Ok(self.irq_flags()?.contains(IrqFlags::TX_DONE))
    }

    pub fn rx_done(&mut self) -> Result<bool> {
        Ok(self.irq_flags()?.contains(IrqFlags::RX_DONE))
    }

    pub fn crc_error(&mut self) -> Result<bool> {
        Ok(self.irq_flags()?.contains(IrqFlags::PAYLOAD_CRC_ERROR))
    }

    pub fn valid_header(&mut self) -> Result<bool> {
        Ok(self.irq_flags()?.contains(IrqFlags::VALID_HEADER))
    }

    pub fn cad_done(&mut self) -> Result<bool> {
        Ok(self.irq_flags()?.contains(IrqFlags::CAD_DONE))
    }

    pub fn cad_detected(&mut self) -> Result<bool> {
        Ok(self.irq_flags()?.contains(IrqFlags::CAD_DETECTED))
    }

    // Diagnostics

    /// Chip revision from RegVersion
    pub fn version(&mut self) -> Result<u8> {
        self.read_register(Register::Version)
    }

    pub fn operating_mode(&mut self) -> Result<ModeStatus> {
        Ok(ModeStatus::from_register(self.read_register(Register::OpMode)?))
    }

    /// Snapshot the registers that define the link
    pub fn dump_registers(&mut self) -> Result<RegisterDump> {
        Ok(RegisterDump {
            op_mode: self.read_register(Register::OpMode)?,
            frf: [
                self.read_register(Register::FrfMsb)?,
                self.read_register(Register::FrfMid)?,
                self.read_register(Register::FrfLsb)?,
            ],
            pa_config: self.read_register(Register::PaConfig)?,
            lna: self.read_register(Register::Lna)?,
            modem_config: [
                self.read_register(Register::ModemConfig1)?,
                self.read_register(Register::ModemConfig2)?,
                self.read_register(Register::ModemConfig3)?,
            ],
            preamble: [
                self.read_register(Register::PreambleMsb)?,
                self.read_register(Register::PreambleLsb)?,
            ],
            sync_word: self.read_register(Register::SyncWord)?,
            dio_mapping: [
                self.read_register(Register::DioMapping1)?,
                self.read_register(Register::DioMapping2)?,
            ],
            version: self.read_register(Register::Version)?,
            irq_flags: self.read_register(Register::IrqFlags)?,
        })
    }

    /// Check the bus by writing and reading back the sync word register
    ///
    /// The sync word is left at the test value.
    pub fn test_communication(&mut self) -> Result<bool> {
        self.write_register(Register::SyncWord, COMM_TEST_VALUE)?;
        Ok(self.read_register(Register::SyncWord)? == COMM_TEST_VALUE)
    }
}

impl<T: SpiTransport> Drop for Rfm95<T> {
    fn drop(&mut self) {
        self.end();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use loralink_dummy::{DummyConfig, SimulatedPacket, SimulatedRfm95};

    fn radio() -> (Rfm95<SimulatedRfm95>, SimulatedRfm95) {
        let sim = SimulatedRfm95::new();
        let mut radio = Rfm95::new(sim.clone());
        radio.begin().unwrap();
        sim.clear_writes();
        (radio, sim)
    }

    #[test]
    fn test_begin_initialises_lora_standby() {
        let sim = SimulatedRfm95::new();
        let mut radio = Rfm95::new(sim.clone());
        radio.begin().unwrap();

        assert!(radio.is_active());
        assert_eq!(sim.register(0x01), 0x81);
        assert_eq!(sim.register(0x0E), 0x00);
        assert_eq!(sim.register(0x0F), 0x00);
        assert_eq!(sim.register(0x1D), 0x72);
        assert_eq!(sim.register(0x1E), 0x70);
        assert_eq!(sim.register(0x26), 0x04);
        assert_eq!(sim.register(0x09), 0x8F);
        assert_eq!(sim.register(0x4D), 0x87);
        assert_eq!(sim.register(0x0C), 0x23);
        // Sleep before LoRa is selected
        assert_eq!(sim.writes_to(0x01)[..2], [0x08, 0x80]);
    }

    #[test]
    fn test_begin_version_mismatch_closes_transport() {
        let sim = SimulatedRfm95::with_config(DummyConfig {
            version: 0x22,
            ..Default::default()
        });
        let mut radio = Rfm95::new(sim.clone());
        let err = radio.begin().unwrap_err();
        assert!(matches!(
            err,
            RadioError::VersionMismatch {
                expected: 0x12,
                found: 0x22
            }
        ));
        assert!(!radio.is_active());
        assert!(!sim.is_active());
    }

    #[test]
    fn test_operations_on_closed_transport_fail() {
        let mut radio = Rfm95::new(SimulatedRfm95::new());
        assert!(matches!(
            radio.version(),
            Err(RadioError::Transport(TransportError::NotOpen))
        ));
        assert!(radio.send(b"x", false).is_err());
    }

    #[test]
    fn test_frequency_round_trip() {
        let (mut radio, sim) = radio();
        radio.set_frequency(868_100_000).unwrap();
        assert_eq!(sim.writes(), vec![(0x06, 0xD9), (0x07, 0x06), (0x08, 0x66)]);
        let back = radio.frequency().unwrap();
        assert!(back.abs_diff(868_100_000) <= 62);

        sim.clear_writes();
        radio.set_frequency(1_100_000_000).unwrap();
        assert_eq!(sim.writes(), vec![(0x06, 0xFF), (0x07, 0xFF), (0x08, 0xFF)]);
    }

    #[test]
    fn test_spreading_factor_detection_registers() {
        let (mut radio, sim) = radio();

        radio.set_spreading_factor(6).unwrap();
        assert_eq!(sim.register(0x31), 0xC5);
        assert_eq!(sim.register(0x37), 0x0C);
        assert_eq!(radio.spreading_factor().unwrap(), 6);

        radio.set_spreading_factor(9).unwrap();
        assert_eq!(sim.register(0x31), 0xC3);
        assert_eq!(sim.register(0x37), 0x0A);
        assert_eq!(radio.spreading_factor().unwrap(), 9);
        // Low nibble untouched
        assert_eq!(sim.register(0x1E) & 0x0F, 0x00);

        radio.set_spreading_factor(15).unwrap();
        assert_eq!(radio.spreading_factor().unwrap(), 12);
    }

    #[test]
    fn test_bandwidth_and_coding_rate_share_register() {
        let (mut radio, _sim) = radio();
        radio.set_bandwidth(100.0).unwrap();
        radio.set_coding_rate(8).unwrap();
        assert_eq!(radio.bandwidth().unwrap(), 125.0);
        assert_eq!(radio.coding_rate().unwrap(), 8);

        radio.set_bandwidth(600.0).unwrap();
        assert_eq!(radio.bandwidth().unwrap(), 500.0);
        assert_eq!(radio.coding_rate().unwrap(), 8);
    }

    #[test]
    fn test_configure_and_read_back() {
        let (mut radio, _sim) = radio();
        let config = RadioConfig::new()
            .with_frequency_mhz(915.0)
            .with_tx_power(10, false)
            .with_spreading_factor(10)
            .with_bandwidth_khz(250.0)
            .with_coding_rate(6)
            .with_preamble_length(0x0123)
            .with_sync_word(0x34);
        radio.configure(&config).unwrap();
        assert_eq!(radio.read_config().unwrap(), config);
    }

    #[test]
    fn test_invert_iq_writes_both_registers() {
        let (mut radio, sim) = radio();
        radio.set_invert_iq(true).unwrap();
        assert_eq!(sim.writes(), vec![(0x33, 0x66), (0x3B, 0x19)]);
        assert!(radio.invert_iq().unwrap());
        radio.set_invert_iq(false).unwrap();
        assert!(!radio.invert_iq().unwrap());
        assert_eq!(sim.register(0x3B), 0x1D);
    }

    #[test]
    fn test_lna_and_agc() {
        let (mut radio, sim) = radio();
        radio.set_lna(Some(1), false).unwrap();
        assert!(!radio.auto_agc().unwrap());
        assert_eq!(sim.register(0x0C), 0x20);

        radio.set_lna(None, true).unwrap();
        assert!(radio.auto_agc().unwrap());
        assert_eq!(radio.lna().unwrap() & 0x03, 0x03);
    }

    #[test]
    fn test_send_transmits_payload() {
        let (mut radio, sim) = radio();
        radio.send(b"hello", false).unwrap();

        assert_eq!(sim.transmitted(), vec![b"hello".to_vec()]);
        assert_eq!(sim.register(0x22), 5);
        assert_eq!(sim.register(0x12), 0x00);
        assert_eq!(sim.register(0x01) & MODE_MASK, OperatingMode::Standby.bits());
        // IQ back to normal
        assert_eq!(sim.register(0x33), 0x27);
    }

    #[test]
    fn test_send_restores_iq_after_inverted_transmit() {
        let (mut radio, sim) = radio();
        radio.send(b"up", true).unwrap();
        assert_eq!(sim.writes_to(0x33), vec![0x66, 0x27]);
        assert_eq!(sim.register(0x3B), 0x1D);
    }

    #[test]
    fn test_send_rejects_oversized_payload() {
        let (mut radio, sim) = radio();
        let err = radio.send(&[0u8; 256], false).unwrap_err();
        assert!(matches!(err, RadioError::PayloadTooLarge(256)));
        assert!(sim.writes().is_empty());
        radio.send(&[0xA5; 255], false).unwrap();
    }

    #[test]
    fn test_send_times_out() {
        let (mut radio, sim) = radio();
        sim.set_complete_tx(false);
        let start = Instant::now();
        let err = radio.send(b"stuck", true).unwrap_err();
        let elapsed = start.elapsed();
        assert!(matches!(err, RadioError::TxTimeout));
        assert!(elapsed >= TX_TIMEOUT);
        assert!(elapsed < Duration::from_secs(4));
        assert_eq!(sim.register(0x33), 0x27);
    }

    #[test]
    fn test_receive_skips_crc_errors() {
        let (mut radio, sim) = radio();
        sim.queue_packet(SimulatedPacket::new(b"garbled".to_vec()).with_crc_error());
        sim.queue_packet(SimulatedPacket::new(b"ping".to_vec()).with_signal(80, 0xF8));

        let packet = radio
            .receive(Duration::from_secs(1), false)
            .unwrap()
            .expect("packet");
        assert_eq!(packet.data, b"ping");
        assert_eq!(packet.rssi, -57);
        assert_eq!(packet.snr, -2.0);
        assert_eq!(sim.register(0x12), 0x00);
    }

    #[test]
    fn test_receive_timeout_returns_none() {
        let (mut radio, sim) = radio();
        let start = Instant::now();
        let result = radio.receive(Duration::from_millis(100), true).unwrap();
        assert!(result.is_none());
        assert!(start.elapsed() >= Duration::from_millis(100));
        assert_eq!(sim.register(0x33), 0x27);
    }

    #[test]
    fn test_receive_zero_length_packet() {
        let (mut radio, sim) = radio();
        sim.queue_packet(SimulatedPacket::new(Vec::new()));
        let packet = radio.receive(Duration::from_secs(1), false).unwrap();
        assert_eq!(packet.map(|p| p.data), Some(Vec::new()));
    }

    #[test]
    fn test_receive_transport_failure_is_error() {
        let (mut radio, sim) = radio();
        sim.set_fail_transfers(true);
        assert!(matches!(
            radio.receive(Duration::from_millis(10), false),
            Err(RadioError::Transport(_))
        ));
    }

    #[test]
    fn test_continuous_receive() {
        let (mut radio, sim) = radio();
        sim.set_register(0x40, 0xC5);
        radio.set_continuous_receive().unwrap();
        assert_eq!(radio.operating_mode().unwrap().mode, OperatingMode::ReceiveContinuous);
        assert_eq!(sim.register(0x40), 0x05);

        sim.queue_packet(SimulatedPacket::new(b"abc".to_vec()));
        assert!(radio.rx_done().unwrap());
        assert_eq!(radio.rx_byte_count().unwrap(), 3);
        assert_eq!(radio.read_payload().unwrap(), b"abc");
        radio.clear_irq(IrqFlags::RX_DONE).unwrap();
        assert!(!radio.rx_done().unwrap());
        assert!(radio.valid_header().unwrap());
    }

    #[test]
    fn test_temperature_restores_mode() {
        let (mut radio, sim) = radio();
        sim.set_temperature_raw(20);
        sim.set_temperature_offset(3);

        assert_eq!(radio.read_temperature().unwrap(), 23.0);
        assert_eq!(sim.register(0x01), 0x81);
        assert_eq!(sim.writes_to(0x01), vec![0x00, 0x81]);
    }

    #[test]
    fn test_calibrate_temperature_truncates() {
        let (mut radio, sim) = radio();
        radio.calibrate_temperature(21.9).unwrap();
        assert_eq!(sim.temperature_offset(), 21);
        assert_eq!(sim.register(0x01), 0x81);
        // LoRa-page InvertIq2 is not touched
        assert_eq!(sim.register(0x3B), 0x1D);
    }

    #[test]
    fn test_beacon_mode() {
        let (mut radio, sim) = radio();
        radio.set_beacon_mode(5_500, b"beacon").unwrap();
        assert_eq!(sim.register(0x24), 0x00);
        assert_eq!(sim.register(0x25), 0x05);
        assert_eq!(sim.transmitted(), vec![b"beacon".to_vec()]);
        radio.stop_beacon_mode().unwrap();
        assert_eq!(radio.operating_mode().unwrap().mode, OperatingMode::Standby);

        assert!(matches!(
            radio.set_beacon_mode(1000, &[0u8; 300]),
            Err(RadioError::PayloadTooLarge(300))
        ));
    }

    #[test]
    fn test_status_decoding() {
        let (mut radio, sim) = radio();
        sim.set_register(0x1A, 0x50);
        sim.set_register(0x19, 0x26);
        sim.set_register(0x2C, 0x20);
        assert_eq!(radio.packet_rssi().unwrap(), -57);
        assert_eq!(radio.packet_snr().unwrap(), 9.5);
        assert_eq!(radio.current_rssi().unwrap(), -105);

        // 125 kHz, -1000 counts
        let raw: u32 = 0x10_0000 - 1000;
        sim.set_register(0x28, (raw >> 16) as u8);
        sim.set_register(0x29, (raw >> 8) as u8);
        sim.set_register(0x2A, raw as u8);
        assert_eq!(radio.frequency_error_hz().unwrap(), -131);
    }

    #[test]
    fn test_diagnostics() {
        let (mut radio, sim) = radio();
        let status = radio.operating_mode().unwrap();
        assert!(status.lora);
        assert_eq!(status.mode, OperatingMode::Standby);

        let dump = radio.dump_registers().unwrap();
        assert_eq!(dump.version, 0x12);
        assert_eq!(dump.op_mode, 0x81);
        assert_eq!(dump.modem_config, [0x72, 0x70, 0x04]);
        assert!(sim.writes().is_empty());

        assert!(radio.test_communication().unwrap());
        assert_eq!(sim.register(0x39), 0x42);
    }

    #[test]
    fn test_drop_closes_transport() {
        let sim = SimulatedRfm95::new();
        {
            let mut radio = Rfm95::new(sim.clone());
            radio.begin().unwrap();
            assert!(sim.is_active());
        }
        assert!(!sim.is_active());
    }
}
