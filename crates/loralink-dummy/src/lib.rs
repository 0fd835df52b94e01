//! loralink-dummy - Simulated SX1276 transport for testing
//!
//! This crate provides a transport that emulates the register file of an
//! SX1276 LoRa transceiver (as found on the RFM95) in memory. It's useful for
//! testing radio code without hardware.
//!
//! What is modelled:
//! - register reads and writes, with burst access and FIFO auto-increment
//! - write-1-to-clear IRQ flags
//! - TxDone on entering transmit mode (can be disabled)
//! - queued packets delivered while in receive mode
//! - the FSK-page temperature and calibration registers
//!
//! Clones share state, so a test can keep a clone for inspection after
//! handing the transport to a driver.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use loralink_core::{Error, InterruptCallback, PinMode, Result, SpiTransport};

// Register addresses used by the simulation
const REG_FIFO: u8 = 0x00;
const REG_OP_MODE: u8 = 0x01;
const REG_FIFO_ADDR_PTR: u8 = 0x0D;
const REG_FIFO_TX_BASE_ADDR: u8 = 0x0E;
const REG_FIFO_RX_BASE_ADDR: u8 = 0x0F;
const REG_FIFO_RX_CURRENT_ADDR: u8 = 0x10;
const REG_IRQ_FLAGS: u8 = 0x12;
const REG_RX_NB_BYTES: u8 = 0x13;
const REG_PKT_SNR_VALUE: u8 = 0x19;
const REG_PKT_RSSI_VALUE: u8 = 0x1A;
const REG_PAYLOAD_LENGTH: u8 = 0x22;
const REG_FSK_IMAGE_CAL: u8 = 0x3B;
const REG_FSK_TEMP: u8 = 0x3C;
const REG_VERSION: u8 = 0x42;

const MODE_LONG_RANGE: u8 = 0x80;
const MODE_MASK: u8 = 0x07;
const MODE_STDBY: u8 = 0x01;
const MODE_TX: u8 = 0x03;
const MODE_RX_CONTINUOUS: u8 = 0x05;
const MODE_RX_SINGLE: u8 = 0x06;

const IRQ_TX_DONE: u8 = 0x08;
const IRQ_VALID_HEADER: u8 = 0x10;
const IRQ_PAYLOAD_CRC_ERROR: u8 = 0x20;
const IRQ_RX_DONE: u8 = 0x40;

const REGISTER_COUNT: usize = 0x80;
const FIFO_SIZE: usize = 256;

/// Configuration for the simulated radio
#[derive(Debug, Clone)]
pub struct DummyConfig {
    /// Value of the VERSION register
    pub version: u8,
    /// Raw temperature register value
    pub temperature_raw: u8,
    /// Whether entering transmit mode raises TxDone
    pub complete_tx: bool,
}

impl Default for DummyConfig {
    fn default() -> Self {
        Self {
            version: 0x12, // SX1276
            temperature_raw: 0x1A,
            complete_tx: true,
        }
    }
}

/// A packet waiting to be "received" by the simulated radio
#[derive(Debug, Clone)]
pub struct SimulatedPacket {
    /// Payload bytes
    pub data: Vec<u8>,
    /// Raise PayloadCrcError alongside RxDone
    pub crc_error: bool,
    /// Raw PKT_RSSI register value
    pub rssi_reg: u8,
    /// Raw PKT_SNR register value
    pub snr_reg: u8,
}

impl SimulatedPacket {
    /// A clean packet with RSSI -60 dBm and SNR 9.5 dB
    pub fn new(data: impl Into<Vec<u8>>) -> Self {
        Self {
            data: data.into(),
            crc_error: false,
            rssi_reg: 77,
            snr_reg: 38,
        }
    }

    /// Mark the packet as failing the payload CRC
    pub fn with_crc_error(mut self) -> Self {
        self.crc_error = true;
        self
    }

    /// Set the raw RSSI and SNR register values
    pub fn with_signal(mut self, rssi_reg: u8, snr_reg: u8) -> Self {
        self.rssi_reg = rssi_reg;
        self.snr_reg = snr_reg;
        self
    }
}

struct State {
    config: DummyConfig,
    regs: [u8; REGISTER_COUNT],
    fifo: [u8; FIFO_SIZE],
    fsk_image_cal: u8,
    open: bool,
    fail_transfers: bool,
    rx_queue: VecDeque<SimulatedPacket>,
    transmitted: Vec<Vec<u8>>,
    writes: Vec<(u8, u8)>,
    pins: HashMap<u8, (PinMode, bool)>,
    irq_pin: Option<u8>,
    irq_enabled: bool,
    callback: Option<InterruptCallback>,
}

impl State {
    fn new(config: DummyConfig) -> Self {
        let mut regs = [0u8; REGISTER_COUNT];
        // Power-on values for the registers the driver touches
        regs[REG_OP_MODE as usize] = 0x09;
        regs[0x06] = 0x6C;
        regs[0x07] = 0x80;
        regs[0x08] = 0x00;
        regs[0x09] = 0x4F;
        regs[0x0A] = 0x09;
        regs[0x0B] = 0x2B;
        regs[0x0C] = 0x20;
        regs[REG_FIFO_TX_BASE_ADDR as usize] = 0x80;
        regs[0x1D] = 0x72;
        regs[0x1E] = 0x70;
        regs[0x21] = 0x08;
        regs[REG_PAYLOAD_LENGTH as usize] = 0x01;
        regs[0x26] = 0x04;
        regs[0x31] = 0xC3;
        regs[0x33] = 0x27;
        regs[0x37] = 0x0A;
        regs[0x39] = 0x12;
        regs[0x3B] = 0x1D;
        regs[REG_VERSION as usize] = config.version;
        regs[0x4D] = 0x84;

        Self {
            config,
            regs,
            fifo: [0u8; FIFO_SIZE],
            fsk_image_cal: 0,
            open: false,
            fail_transfers: false,
            rx_queue: VecDeque::new(),
            transmitted: Vec::new(),
            writes: Vec::new(),
            pins: HashMap::new(),
            irq_pin: None,
            irq_enabled: false,
            callback: None,
        }
    }

    fn lora(&self) -> bool {
        self.regs[REG_OP_MODE as usize] & MODE_LONG_RANGE != 0
    }

    fn mode(&self) -> u8 {
        self.regs[REG_OP_MODE as usize] & MODE_MASK
    }

    fn fifo_ptr(&self) -> usize {
        self.regs[REG_FIFO_ADDR_PTR as usize] as usize
    }

    fn advance_fifo_ptr(&mut self) {
        let ptr = &mut self.regs[REG_FIFO_ADDR_PTR as usize];
        *ptr = ptr.wrapping_add(1);
    }

    fn read_register(&mut self, addr: u8) -> u8 {
        match addr {
            REG_FIFO => {
                let value = self.fifo[self.fifo_ptr()];
                self.advance_fifo_ptr();
                value
            }
            REG_FSK_IMAGE_CAL if !self.lora() => self.fsk_image_cal,
            REG_FSK_TEMP if !self.lora() => self.config.temperature_raw,
            REG_IRQ_FLAGS => {
                self.deliver_packet();
                self.regs[REG_IRQ_FLAGS as usize]
            }
            _ => self.regs[addr as usize],
        }
    }

    fn write_register(&mut self, addr: u8, value: u8) {
        self.writes.push((addr, value));
        match addr {
            REG_FIFO => {
                let ptr = self.fifo_ptr();
                self.fifo[ptr] = value;
                self.advance_fifo_ptr();
            }
            REG_IRQ_FLAGS => {
                self.regs[REG_IRQ_FLAGS as usize] &= !value;
            }
            REG_FSK_IMAGE_CAL if !self.lora() => {
                self.fsk_image_cal = value;
            }
            REG_FSK_TEMP if !self.lora() => {}
            REG_VERSION => {}
            REG_OP_MODE => {
                self.regs[REG_OP_MODE as usize] = value;
                if self.lora() && self.mode() == MODE_TX {
                    self.start_tx();
                }
            }
            _ => self.regs[addr as usize] = value,
        }
    }

    fn start_tx(&mut self) {
        if !self.config.complete_tx {
            log::debug!("dummy: Transmitter stuck, TxDone will not be raised");
            return;
        }
        let base = self.regs[REG_FIFO_TX_BASE_ADDR as usize] as usize;
        let len = self.regs[REG_PAYLOAD_LENGTH as usize] as usize;
        let payload: Vec<u8> = (0..len).map(|i| self.fifo[(base + i) % FIFO_SIZE]).collect();
        log::debug!("dummy: Transmitted {} byte(s)", payload.len());
        self.transmitted.push(payload);
        self.regs[REG_IRQ_FLAGS as usize] |= IRQ_TX_DONE;
        let op = &mut self.regs[REG_OP_MODE as usize];
        *op = (*op & !MODE_MASK) | MODE_STDBY;
    }

    fn deliver_packet(&mut self) {
        let receiving = self.lora() && matches!(self.mode(), MODE_RX_CONTINUOUS | MODE_RX_SINGLE);
        if !receiving || self.regs[REG_IRQ_FLAGS as usize] & IRQ_RX_DONE != 0 {
            return;
        }
        let Some(packet) = self.rx_queue.pop_front() else {
            return;
        };

        let base = self.regs[REG_FIFO_RX_BASE_ADDR as usize];
        for (i, b) in packet.data.iter().enumerate() {
            self.fifo[(base as usize + i) % FIFO_SIZE] = *b;
        }
        self.regs[REG_FIFO_RX_CURRENT_ADDR as usize] = base;
        self.regs[REG_RX_NB_BYTES as usize] = packet.data.len() as u8;
        self.regs[REG_PKT_RSSI_VALUE as usize] = packet.rssi_reg;
        self.regs[REG_PKT_SNR_VALUE as usize] = packet.snr_reg;

        let mut flags = IRQ_RX_DONE | IRQ_VALID_HEADER;
        if packet.crc_error {
            flags |= IRQ_PAYLOAD_CRC_ERROR;
        }
        self.regs[REG_IRQ_FLAGS as usize] |= flags;
        log::debug!(
            "dummy: Delivered {} byte packet{}",
            packet.data.len(),
            if packet.crc_error { " (CRC error)" } else { "" }
        );
    }
}

/// Simulated SX1276 behind a [`SpiTransport`]
#[derive(Clone)]
pub struct SimulatedRfm95 {
    state: Arc<Mutex<State>>,
}

impl Default for SimulatedRfm95 {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedRfm95 {
    /// Create a simulated radio with the default configuration
    pub fn new() -> Self {
        Self::with_config(DummyConfig::default())
    }

    /// Create a simulated radio with the given configuration
    pub fn with_config(config: DummyConfig) -> Self {
        Self {
            state: Arc::new(Mutex::new(State::new(config))),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Current value of a register, without side effects
    pub fn register(&self, addr: u8) -> u8 {
        self.state().regs[(addr & 0x7F) as usize]
    }

    /// Overwrite a register, without side effects
    pub fn set_register(&self, addr: u8, value: u8) {
        self.state().regs[(addr & 0x7F) as usize] = value;
    }

    /// Every register write seen so far, in order
    pub fn writes(&self) -> Vec<(u8, u8)> {
        self.state().writes.clone()
    }

    /// Values written to one register, in order
    pub fn writes_to(&self, addr: u8) -> Vec<u8> {
        self.state()
            .writes
            .iter()
            .filter(|(a, _)| *a == addr)
            .map(|(_, v)| *v)
            .collect()
    }

    /// Forget recorded writes
    pub fn clear_writes(&self) {
        self.state().writes.clear();
    }

    /// Queue a packet for delivery while the radio is receiving
    pub fn queue_packet(&self, packet: SimulatedPacket) {
        self.state().rx_queue.push_back(packet);
    }

    /// Payloads sent so far
    pub fn transmitted(&self) -> Vec<Vec<u8>> {
        self.state().transmitted.clone()
    }

    /// Whether entering transmit mode raises TxDone
    pub fn set_complete_tx(&self, complete: bool) {
        self.state().config.complete_tx = complete;
    }

    /// Make every subsequent transfer fail
    pub fn set_fail_transfers(&self, fail: bool) {
        self.state().fail_transfers = fail;
    }

    /// Set the raw temperature reading
    pub fn set_temperature_raw(&self, raw: u8) {
        self.state().config.temperature_raw = raw;
    }

    /// Temperature calibration offset (FSK page register 0x3B)
    pub fn temperature_offset(&self) -> u8 {
        self.state().fsk_image_cal
    }

    /// Set the FSK page calibration offset directly
    pub fn set_temperature_offset(&self, offset: u8) {
        self.state().fsk_image_cal = offset;
    }

    /// Mode and level of a pin, if it has been touched
    pub fn pin(&self, pin: u8) -> Option<(PinMode, bool)> {
        self.state().pins.get(&pin).copied()
    }

    /// Drive the level a pin reads back as
    pub fn set_pin_level(&self, pin: u8, high: bool) {
        let mut state = self.state();
        let entry = state.pins.entry(pin).or_insert((PinMode::Input, false));
        entry.1 = high;
    }

    /// Fire the interrupt callback as if the configured line had an edge
    ///
    /// Returns whether a callback was invoked.
    pub fn trigger_interrupt(&self) -> bool {
        let callback = {
            let state = self.state();
            if !(state.irq_enabled && state.irq_pin.is_some()) {
                return false;
            }
            state.callback.clone()
        };
        match callback {
            Some(cb) => {
                cb();
                true
            }
            None => false,
        }
    }
}

impl SpiTransport for SimulatedRfm95 {
    fn open(&mut self) -> Result<()> {
        self.state().open = true;
        Ok(())
    }

    fn close(&mut self) {
        let mut state = self.state();
        state.irq_enabled = false;
        state.open = false;
    }

    fn transfer(&mut self, write: &[u8], read_len: usize) -> Result<Vec<u8>> {
        let mut state = self.state();
        if !state.open {
            return Err(Error::NotOpen);
        }
        if state.fail_transfers {
            return Err(Error::backend(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "simulated transfer failure",
            )));
        }

        let Some((&first, data)) = write.split_first() else {
            return Ok(vec![0; read_len]);
        };
        let addr = first & 0x7F;

        if first & 0x80 != 0 {
            for (i, &value) in data.iter().enumerate() {
                let reg = if addr == REG_FIFO { addr } else { addr.wrapping_add(i as u8) };
                state.write_register(reg & 0x7F, value);
            }
            return Ok(vec![0; read_len]);
        }

        Ok((0..read_len)
            .map(|i| {
                let reg = if addr == REG_FIFO { addr } else { addr.wrapping_add(i as u8) };
                state.read_register(reg & 0x7F)
            })
            .collect())
    }

    fn digital_write(&mut self, pin: u8, high: bool) -> Result<()> {
        self.state().pins.insert(pin, (PinMode::Output, high));
        Ok(())
    }

    fn digital_read(&mut self, pin: u8) -> Result<bool> {
        let mut state = self.state();
        let entry = state.pins.entry(pin).or_insert((PinMode::Input, false));
        entry.0 = PinMode::Input;
        Ok(entry.1)
    }

    fn pin_mode(&mut self, pin: u8, mode: PinMode) -> Result<()> {
        let mut state = self.state();
        let entry = state.pins.entry(pin).or_insert((mode, false));
        entry.0 = mode;
        Ok(())
    }

    fn configure_interrupt(&mut self, pin: u8, enable: bool) -> Result<()> {
        self.state().irq_pin = if enable { Some(pin) } else { None };
        Ok(())
    }

    fn set_interrupt_callback(&mut self, callback: InterruptCallback) {
        self.state().callback = Some(callback);
    }

    fn enable_interrupt(&mut self, enable: bool) -> Result<()> {
        let mut state = self.state();
        if enable && !state.open {
            return Err(Error::NotOpen);
        }
        state.irq_enabled = enable;
        Ok(())
    }

    fn is_active(&self) -> bool {
        self.state().open
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opened() -> SimulatedRfm95 {
        let mut sim = SimulatedRfm95::new();
        sim.open().unwrap();
        sim
    }

    #[test]
    fn test_read_version() {
        let mut sim = opened();
        assert_eq!(sim.transfer(&[REG_VERSION], 1).unwrap(), vec![0x12]);
    }

    #[test]
    fn test_closed_transfer_fails() {
        let mut sim = SimulatedRfm95::new();
        assert!(matches!(sim.transfer(&[REG_VERSION], 1), Err(Error::NotOpen)));
    }

    #[test]
    fn test_fifo_auto_increment() {
        let mut sim = opened();
        sim.transfer(&[REG_FIFO_ADDR_PTR | 0x80, 0x10], 0).unwrap();
        sim.transfer(&[REG_FIFO | 0x80, 0xDE, 0xAD], 0).unwrap();
        assert_eq!(sim.register(REG_FIFO_ADDR_PTR), 0x12);

        sim.transfer(&[REG_FIFO_ADDR_PTR | 0x80, 0x10], 0).unwrap();
        assert_eq!(sim.transfer(&[REG_FIFO], 2).unwrap(), vec![0xDE, 0xAD]);
    }

    #[test]
    fn test_irq_flags_write_one_to_clear() {
        let mut sim = opened();
        sim.set_register(REG_IRQ_FLAGS, IRQ_RX_DONE | IRQ_TX_DONE);
        sim.transfer(&[REG_IRQ_FLAGS | 0x80, IRQ_TX_DONE], 0).unwrap();
        assert_eq!(sim.register(REG_IRQ_FLAGS), IRQ_RX_DONE);
    }

    #[test]
    fn test_tx_raises_tx_done() {
        let mut sim = opened();
        sim.transfer(&[REG_OP_MODE | 0x80, MODE_LONG_RANGE | MODE_STDBY], 0)
            .unwrap();
        sim.transfer(&[REG_FIFO_TX_BASE_ADDR | 0x80, 0x00], 0).unwrap();
        sim.transfer(&[REG_FIFO_ADDR_PTR | 0x80, 0x00], 0).unwrap();
        sim.transfer(&[REG_FIFO | 0x80, b'h', b'i'], 0).unwrap();
        sim.transfer(&[REG_PAYLOAD_LENGTH | 0x80, 2], 0).unwrap();
        sim.transfer(&[REG_OP_MODE | 0x80, MODE_LONG_RANGE | MODE_TX], 0)
            .unwrap();

        assert_eq!(sim.register(REG_IRQ_FLAGS) & IRQ_TX_DONE, IRQ_TX_DONE);
        assert_eq!(sim.transmitted(), vec![b"hi".to_vec()]);
        assert_eq!(sim.register(REG_OP_MODE) & MODE_MASK, MODE_STDBY);
    }

    #[test]
    fn test_rx_delivery() {
        let mut sim = opened();
        sim.queue_packet(SimulatedPacket::new(vec![1, 2, 3]).with_crc_error());

        // Not receiving yet: nothing delivered
        assert_eq!(sim.transfer(&[REG_IRQ_FLAGS], 1).unwrap(), vec![0]);

        sim.transfer(&[REG_OP_MODE | 0x80, MODE_LONG_RANGE | MODE_RX_CONTINUOUS], 0)
            .unwrap();
        let flags = sim.transfer(&[REG_IRQ_FLAGS], 1).unwrap()[0];
        assert_eq!(flags & IRQ_RX_DONE, IRQ_RX_DONE);
        assert_eq!(flags & IRQ_PAYLOAD_CRC_ERROR, IRQ_PAYLOAD_CRC_ERROR);
        assert_eq!(sim.register(REG_RX_NB_BYTES), 3);
    }

    #[test]
    fn test_fsk_page_registers() {
        let mut sim = opened();
        sim.set_temperature_raw(25);
        sim.transfer(&[REG_OP_MODE | 0x80, 0x00], 0).unwrap();
        sim.transfer(&[REG_FSK_IMAGE_CAL | 0x80, 3], 0).unwrap();
        assert_eq!(sim.transfer(&[REG_FSK_IMAGE_CAL], 2).unwrap(), vec![3, 25]);

        // LoRa page still sees the IQ register
        sim.transfer(&[REG_OP_MODE | 0x80, MODE_LONG_RANGE], 0).unwrap();
        assert_eq!(sim.transfer(&[REG_FSK_IMAGE_CAL], 1).unwrap(), vec![0x1D]);
    }

    #[test]
    fn test_pins_and_interrupt() {
        let mut sim = opened();
        sim.digital_write(3, true).unwrap();
        assert_eq!(sim.pin(3), Some((PinMode::Output, true)));

        sim.set_pin_level(5, true);
        assert!(sim.digital_read(5).unwrap());

        let hits = Arc::new(Mutex::new(0));
        let counter = Arc::clone(&hits);
        sim.set_interrupt_callback(Arc::new(move || *counter.lock().unwrap() += 1));
        assert!(!sim.trigger_interrupt());
        sim.configure_interrupt(5, true).unwrap();
        sim.enable_interrupt(true).unwrap();
        assert!(sim.trigger_interrupt());
        assert_eq!(*hits.lock().unwrap(), 1);

        sim.close();
        assert!(!sim.trigger_interrupt());
    }
}
