//! CH341 device implementation
//!
//! This module provides the `Ch341` struct, which implements `SpiTransport`
//! on top of the CH341 bulk command protocol.
//!
//! SPI is emulated one byte per `SPI_STREAM` command: the chip echoes one
//! response byte for every byte it clocks, which is read back immediately.
//! Chip-select and the GPIO pins share the `UIO_STREAM` command, which always
//! carries full output and direction bytes.
//!
//! The chip has no interrupt line, so interrupts are emulated by a thread
//! that polls the pin status byte and looks for a falling edge.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;
use std::time::Duration;

use loralink_core::{Error as CoreError, InterruptCallback, PinMode, Result as CoreResult, SpiTransport};

use crate::error::{Ch341Error, Result};
use crate::pipe::{BulkPipe, NusbPipe};
use crate::protocol::*;

/// Configuration for opening a CH341
#[derive(Debug, Clone, Default)]
pub struct Ch341Config {
    /// Zero-based index among attached CH341 devices
    pub index: usize,
    /// Bit-reverse every SPI byte (device expects LSB first)
    pub lsb_first: bool,
}

impl Ch341Config {
    /// Configuration for the first device, MSB first
    pub fn new() -> Self {
        Self::default()
    }

    /// Select the nth attached device
    pub fn with_index(mut self, index: usize) -> Self {
        self.index = index;
        self
    }

    /// Set the bit order
    pub fn with_lsb_first(mut self, lsb_first: bool) -> Self {
        self.lsb_first = lsb_first;
        self
    }
}

/// Parse transport options from a list of key-value pairs
///
/// Recognised keys: `index` (decimal) and `lsb_first` (`0`/`1`/`true`/`false`).
pub fn parse_options(options: &[(&str, &str)]) -> std::result::Result<Ch341Config, String> {
    let mut config = Ch341Config::default();

    for (key, value) in options {
        match *key {
            "index" => {
                config.index = value
                    .parse()
                    .map_err(|_| format!("Invalid index value: {}", value))?;
            }
            "lsb_first" => {
                config.lsb_first = match *value {
                    "1" | "true" | "yes" => true,
                    "0" | "false" | "no" => false,
                    _ => return Err(format!("Invalid lsb_first value: {}", value)),
                };
            }
            _ => {
                log::warn!("ch341: Unknown option: {}={}", key, value);
            }
        }
    }

    Ok(config)
}

/// Open bulk pipe plus the pin state that goes with it
struct Session {
    pipe: Box<dyn BulkPipe>,
    gpio: GpioState,
    lsb_first: bool,
}

impl Session {
    /// Configure the stream clock and drive the pins
    fn configure(&mut self) -> Result<()> {
        self.pipe.write(&config_stream_frame(CH341_STM_I2C_100K))?;
        self.enable_pins(true)?;
        std::thread::sleep(Duration::from_millis(10));
        log::debug!("CH341 configured for SPI mode");
        Ok(())
    }

    fn enable_pins(&mut self, enable: bool) -> Result<()> {
        self.pipe.write(&enable_pins_frame(enable))?;
        if enable {
            self.gpio = GpioState::default();
        }
        log::debug!("Pins {}abled", if enable { "en" } else { "dis" });
        Ok(())
    }

    fn spi_transfer(&mut self, write: &[u8], read_len: usize) -> Result<Vec<u8>> {
        let frame = self.gpio.chip_select(true);
        self.pipe.write(&frame)?;

        match self.stream_bytes(write, read_len) {
            Ok(data) => {
                let frame = self.gpio.chip_select(false);
                self.pipe.write(&frame)?;
                Ok(data)
            }
            Err(e) => {
                let frame = self.gpio.chip_select(false);
                if let Err(cs) = self.pipe.write(&frame) {
                    log::warn!("Failed to deassert CS after error: {}", cs);
                }
                Err(e)
            }
        }
    }

    fn stream_bytes(&mut self, write: &[u8], read_len: usize) -> Result<Vec<u8>> {
        for &byte in write {
            let byte = if self.lsb_first {
                reverse_byte(byte)
            } else {
                byte
            };
            self.pipe.write(&spi_byte_frame(byte))?;
            self.pipe.read(1)?;
        }

        let mut data = Vec::with_capacity(read_len);
        for _ in 0..read_len {
            self.pipe.write(&spi_byte_frame(SPI_READ_FILL))?;
            let resp = self.pipe.read(1)?;
            data.push(if self.lsb_first {
                reverse_byte(resp[0])
            } else {
                resp[0]
            });
        }

        Ok(data)
    }

    fn read_status(&mut self) -> Result<u8> {
        self.pipe.write(&status_read_frame())?;
        let resp = self.pipe.read(1)?;
        Ok(resp[0])
    }
}

/// Background thread polling the interrupt status bit
struct InterruptMonitor {
    stop: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

impl InterruptMonitor {
    fn spawn(
        session: Arc<Mutex<Session>>,
        callback: Arc<Mutex<Option<InterruptCallback>>>,
        bit: u8,
    ) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&stop);

        let handle = std::thread::spawn(move || {
            let mut edge = FallingEdge::new(bit);
            log::debug!("CH341 interrupt monitor started on status bit {}", bit);

            while !flag.load(Ordering::Acquire) {
                let status = lock(&session).read_status();
                match status {
                    Ok(status) => {
                        if edge.update(status) {
                            log::trace!("CH341 interrupt edge (status {:02X})", status);
                            let cb = lock(&callback).clone();
                            if let Some(cb) = cb {
                                cb();
                            }
                        }
                    }
                    Err(e) => log::debug!("CH341 interrupt poll failed: {}", e),
                }
                std::thread::sleep(Duration::from_millis(IRQ_POLL_INTERVAL_MS));
            }

            log::debug!("CH341 interrupt monitor stopped");
        });

        Self { stop, handle }
    }

    fn stop(self) {
        self.stop.store(true, Ordering::Release);
        if self.handle.join().is_err() {
            log::warn!("CH341 interrupt monitor panicked");
        }
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

/// CH341 USB-to-SPI bridge
///
/// Created closed; call [`SpiTransport::open`] to claim the device. The
/// session is released on [`SpiTransport::close`] or drop.
pub struct Ch341 {
    config: Ch341Config,
    session: Option<Arc<Mutex<Session>>>,
    callback: Arc<Mutex<Option<InterruptCallback>>>,
    irq_bit: u8,
    monitor: Option<InterruptMonitor>,
}

impl Ch341 {
    /// Create a closed transport for the device described by `config`
    pub fn new(config: Ch341Config) -> Self {
        Self {
            config,
            session: None,
            callback: Arc::new(Mutex::new(None)),
            irq_bit: DEFAULT_IRQ_BIT,
            monitor: None,
        }
    }

    /// Shorthand for `Ch341::new(Ch341Config::new().with_index(index).with_lsb_first(lsb_first))`
    pub fn with_index(index: usize, lsb_first: bool) -> Self {
        Self::new(
            Ch341Config::new()
                .with_index(index)
                .with_lsb_first(lsb_first),
        )
    }

    /// Current configuration
    pub fn config(&self) -> &Ch341Config {
        &self.config
    }

    /// List all connected CH341 devices
    pub fn list_devices() -> Result<Vec<Ch341DeviceInfo>> {
        Ok(matching_devices()?
            .iter()
            .map(|d| Ch341DeviceInfo {
                bus: d.busnum(),
                address: d.device_address(),
            })
            .collect())
    }

    /// Open the configured device and bring up the session
    fn open_usb(&mut self) -> Result<()> {
        use nusb::MaybeFuture;

        let devices = matching_devices()?;
        if devices.is_empty() {
            return Err(Ch341Error::DeviceNotFound);
        }
        let device_info = devices
            .get(self.config.index)
            .ok_or(Ch341Error::IndexOutOfRange {
                index: self.config.index,
                found: devices.len(),
            })?;

        log::info!(
            "Opening CH341 device at bus {} address {}",
            device_info.busnum(),
            device_info.device_address()
        );

        let device = device_info
            .open()
            .wait()
            .map_err(|e| Ch341Error::OpenFailed(e.to_string()))?;

        let pipe = NusbPipe::claim(&device)?;
        self.attach(Box::new(pipe))
    }

    /// Configure the chip through `pipe` and keep it as the session
    fn attach(&mut self, pipe: Box<dyn BulkPipe>) -> Result<()> {
        let mut session = Session {
            pipe,
            gpio: GpioState::default(),
            lsb_first: self.config.lsb_first,
        };
        session.configure()?;
        self.session = Some(Arc::new(Mutex::new(session)));
        log::info!(
            "CH341 ready (index {}, {} first)",
            self.config.index,
            if self.config.lsb_first { "LSB" } else { "MSB" }
        );
        Ok(())
    }

    fn session(&self) -> Result<&Arc<Mutex<Session>>> {
        self.session.as_ref().ok_or(Ch341Error::NotOpen)
    }

    fn stop_monitor(&mut self) {
        if let Some(monitor) = self.monitor.take() {
            monitor.stop();
        }
    }
}

fn matching_devices() -> Result<Vec<nusb::DeviceInfo>> {
    use nusb::MaybeFuture;

    Ok(nusb::list_devices()
        .wait()
        .map_err(|e| Ch341Error::OpenFailed(e.to_string()))?
        .filter(|d| d.vendor_id() == CH341_USB_VENDOR && d.product_id() == CH341_USB_PRODUCT)
        .collect())
}

/// Information about a connected CH341 device
#[derive(Debug, Clone)]
pub struct Ch341DeviceInfo {
    /// USB bus number
    pub bus: u8,
    /// USB device address
    pub address: u8,
}

impl std::fmt::Display for Ch341DeviceInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "CH341 at bus {} address {}", self.bus, self.address)
    }
}

impl SpiTransport for Ch341 {
    fn open(&mut self) -> CoreResult<()> {
        if self.session.is_some() {
            return Ok(());
        }
        self.open_usb().map_err(CoreError::from)
    }

    fn close(&mut self) {
        self.stop_monitor();

        if let Some(session) = self.session.take() {
            if let Err(e) = lock(&session).enable_pins(false) {
                log::warn!("Failed to disable pins on close: {}", e);
            }
            log::info!("CH341 closed");
        }
    }

    fn transfer(&mut self, write: &[u8], read_len: usize) -> CoreResult<Vec<u8>> {
        let session = self.session()?;
        let data = lock(session).spi_transfer(write, read_len)?;
        Ok(data)
    }

    fn digital_write(&mut self, pin: u8, high: bool) -> CoreResult<()> {
        if pin >= OUTPUT_PIN_COUNT {
            return Err(CoreError::InvalidPin(pin));
        }
        let session = self.session()?;
        let mut session = lock(session);
        let frame = session.gpio.write(pin, high);
        session.pipe.write(&frame)?;
        Ok(())
    }

    fn digital_read(&mut self, pin: u8) -> CoreResult<bool> {
        if pin >= STATUS_PIN_COUNT {
            return Err(CoreError::InvalidPin(pin));
        }
        let session = self.session()?;
        let mut session = lock(session);
        let frame = session.gpio.set_direction(pin, false);
        session.pipe.write(&frame)?;
        let status = session.read_status()?;
        Ok(status & (1 << pin) != 0)
    }

    fn pin_mode(&mut self, pin: u8, mode: PinMode) -> CoreResult<()> {
        if pin >= OUTPUT_PIN_COUNT {
            return Err(CoreError::InvalidPin(pin));
        }
        if mode == PinMode::InputPullup {
            log::debug!("CH341 has no pull-up control, pin {} set as plain input", pin);
        }
        let session = self.session()?;
        let mut session = lock(session);
        let frame = session.gpio.set_direction(pin, mode == PinMode::Output);
        session.pipe.write(&frame)?;
        Ok(())
    }

    fn configure_interrupt(&mut self, pin: u8, enable: bool) -> CoreResult<()> {
        if pin >= STATUS_PIN_COUNT {
            return Err(CoreError::InvalidPin(pin));
        }
        self.irq_bit = if enable { pin } else { DEFAULT_IRQ_BIT };
        Ok(())
    }

    fn set_interrupt_callback(&mut self, callback: InterruptCallback) {
        *lock(&self.callback) = Some(callback);
    }

    fn enable_interrupt(&mut self, enable: bool) -> CoreResult<()> {
        if !enable {
            self.stop_monitor();
            return Ok(());
        }
        if self.monitor.is_some() {
            return Ok(());
        }
        let session = Arc::clone(self.session()?);
        self.monitor = Some(InterruptMonitor::spawn(
            session,
            Arc::clone(&self.callback),
            self.irq_bit,
        ));
        Ok(())
    }

    fn is_active(&self) -> bool {
        self.session.is_some()
    }
}

impl Drop for Ch341 {
    fn drop(&mut self) {
        self.close();
    }
}
