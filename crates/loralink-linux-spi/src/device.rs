//! Linux SPI transport implementation
//!
//! This module provides the `LinuxSpi` struct that implements `SpiTransport`
//! using the spidev interface for the bus and the GPIO character device for
//! pins and interrupts.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;
use std::time::Duration;

use gpiocdev::line::Offset;
use gpiocdev::request::Request;
use loralink_core::{Error as CoreError, InterruptCallback, PinMode, Result as CoreResult, SpiTransport};

use crate::error::LinuxSpiError;
use crate::gpio::{read_line, GpioBank, RisingEdge};
use crate::spidev::Spidev;

/// Default spidev node
pub const DEFAULT_DEVICE: &str = "/dev/spidev0.0";

/// Default GPIO chip
pub const DEFAULT_GPIOCHIP: &str = "/dev/gpiochip0";

/// Default SPI clock speed in Hz (1 MHz)
const DEFAULT_SPEED_HZ: u32 = 1_000_000;

/// Interval between interrupt polls
const IRQ_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// SPI mode constants
pub mod mode {
    /// SPI mode 0: CPOL=0, CPHA=0
    pub const MODE_0: u8 = 0;
    /// SPI mode 1: CPOL=0, CPHA=1
    pub const MODE_1: u8 = 1;
    /// SPI mode 2: CPOL=1, CPHA=0
    pub const MODE_2: u8 = 2;
    /// SPI mode 3: CPOL=1, CPHA=1
    pub const MODE_3: u8 = 3;
}

/// Configuration for a Linux SPI transport
#[derive(Debug, Clone)]
pub struct LinuxSpiConfig {
    /// Device path (e.g., "/dev/spidev0.0")
    pub device: String,
    /// SPI clock speed in Hz (default: 1 MHz)
    pub speed_hz: u32,
    /// SPI mode (0-3, default: 0)
    pub mode: u8,
    /// GPIO chip used for pin and interrupt operations
    pub gpiochip: String,
}

impl Default for LinuxSpiConfig {
    fn default() -> Self {
        Self {
            device: DEFAULT_DEVICE.to_string(),
            speed_hz: DEFAULT_SPEED_HZ,
            mode: mode::MODE_0,
            gpiochip: DEFAULT_GPIOCHIP.to_string(),
        }
    }
}

impl LinuxSpiConfig {
    /// Create a new configuration with the given device path
    pub fn new(device: impl Into<String>) -> Self {
        Self {
            device: device.into(),
            ..Default::default()
        }
    }

    /// Set the SPI clock speed in Hz
    pub fn with_speed(mut self, speed_hz: u32) -> Self {
        self.speed_hz = speed_hz;
        self
    }

    /// Set the SPI mode (0-3)
    pub fn with_mode(mut self, mode: u8) -> Self {
        self.mode = mode;
        self
    }

    /// Set the GPIO chip path
    pub fn with_gpiochip(mut self, gpiochip: impl Into<String>) -> Self {
        self.gpiochip = gpiochip.into();
        self
    }
}

/// Parse transport options from a list of key-value pairs
///
/// - `dev=/dev/spidevX.Y` - device path (default `/dev/spidev0.0`)
/// - `spispeed=1000` - speed in kHz (default 1000)
/// - `mode=0` - SPI mode 0-3 (default 0)
/// - `gpiochip=/dev/gpiochipN` - GPIO chip (default `/dev/gpiochip0`)
pub fn parse_options(options: &[(&str, &str)]) -> std::result::Result<LinuxSpiConfig, String> {
    let mut config = LinuxSpiConfig::default();

    for (key, value) in options {
        match *key {
            "dev" => {
                config.device = value.to_string();
            }
            "spispeed" => {
                let speed_khz: u32 = value
                    .parse()
                    .map_err(|_| format!("Invalid spispeed value: {}", value))?;
                config.speed_hz = speed_khz
                    .checked_mul(1000)
                    .ok_or_else(|| format!("spispeed too large: {}", value))?;
            }
            "mode" => {
                let mode: u8 = value
                    .parse()
                    .map_err(|_| format!("Invalid mode value: {}", value))?;
                if mode > 3 {
                    return Err(format!("Invalid SPI mode: {} (must be 0-3)", mode));
                }
                config.mode = mode;
            }
            "gpiochip" => {
                config.gpiochip = if value.chars().all(|c| c.is_ascii_digit()) {
                    format!("/dev/gpiochip{}", value)
                } else {
                    value.to_string()
                };
            }
            _ => {
                log::warn!("linux_spi: Unknown option: {}={}", key, value);
            }
        }
    }

    if config.device.is_empty() {
        return Err("No device specified. Use dev=/dev/spidevX.Y".to_string());
    }

    Ok(config)
}

/// Background thread polling the interrupt line
struct InterruptMonitor {
    stop: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

impl InterruptMonitor {
    fn spawn(
        line: Arc<Request>,
        offset: Offset,
        callback: Arc<Mutex<Option<InterruptCallback>>>,
    ) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&stop);

        let handle = std::thread::spawn(move || {
            let mut edge = RisingEdge::default();
            log::debug!("linux_spi: Interrupt monitor started on line {}", offset);

            while !flag.load(Ordering::Acquire) {
                match read_line(&line, offset) {
                    Ok(high) => {
                        if edge.update(high) {
                            let cb = lock(&callback).clone();
                            if let Some(cb) = cb {
                                cb();
                            }
                        }
                    }
                    Err(e) => log::debug!("linux_spi: Interrupt poll failed: {}", e),
                }
                std::thread::sleep(IRQ_POLL_INTERVAL);
            }

            log::debug!("linux_spi: Interrupt monitor stopped");
        });

        Self { stop, handle }
    }

    fn stop(self) {
        self.stop.store(true, Ordering::Release);
        if self.handle.join().is_err() {
            log::warn!("linux_spi: Interrupt monitor panicked");
        }
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

/// Linux SPI transport using spidev and gpiocdev
pub struct LinuxSpi {
    config: LinuxSpiConfig,
    spi: Option<Spidev>,
    gpio: GpioBank,
    irq_line: Option<Offset>,
    callback: Arc<Mutex<Option<InterruptCallback>>>,
    monitor: Option<InterruptMonitor>,
}

impl LinuxSpi {
    /// Create a closed transport
    pub fn new(config: LinuxSpiConfig) -> Self {
        let gpio = GpioBank::new(config.gpiochip.clone());
        Self {
            config,
            spi: None,
            gpio,
            irq_line: None,
            callback: Arc::new(Mutex::new(None)),
            monitor: None,
        }
    }

    /// Current configuration
    pub fn config(&self) -> &LinuxSpiConfig {
        &self.config
    }

    fn stop_monitor(&mut self) {
        if let Some(monitor) = self.monitor.take() {
            monitor.stop();
        }
    }

    fn ensure_open(&self) -> CoreResult<()> {
        if self.spi.is_some() {
            Ok(())
        } else {
            Err(CoreError::NotOpen)
        }
    }
}

impl SpiTransport for LinuxSpi {
    fn open(&mut self) -> CoreResult<()> {
        if self.spi.is_some() {
            return Ok(());
        }
        if self.config.mode > mode::MODE_3 {
            return Err(LinuxSpiError::InvalidParameter(format!(
                "SPI mode {} (must be 0-3)",
                self.config.mode
            ))
            .into());
        }
        let spi = Spidev::open(&self.config.device, self.config.mode, self.config.speed_hz)?;
        self.spi = Some(spi);
        Ok(())
    }

    fn close(&mut self) {
        self.stop_monitor();
        self.gpio.release_all();
        if self.spi.take().is_some() {
            log::info!("linux_spi: Closed {}", self.config.device);
        }
    }

    fn transfer(&mut self, write: &[u8], read_len: usize) -> CoreResult<Vec<u8>> {
        let spi = self.spi.as_mut().ok_or(CoreError::NotOpen)?;
        Ok(spi.transfer(write, read_len)?)
    }

    fn digital_write(&mut self, pin: u8, high: bool) -> CoreResult<()> {
        self.ensure_open()?;
        self.gpio.write(Offset::from(pin), high)?;
        Ok(())
    }

    fn digital_read(&mut self, pin: u8) -> CoreResult<bool> {
        self.ensure_open()?;
        Ok(self.gpio.read(Offset::from(pin))?)
    }

    fn pin_mode(&mut self, pin: u8, mode: PinMode) -> CoreResult<()> {
        self.ensure_open()?;
        self.gpio.set_mode(Offset::from(pin), mode)?;
        Ok(())
    }

    fn configure_interrupt(&mut self, pin: u8, enable: bool) -> CoreResult<()> {
        self.irq_line = if enable { Some(Offset::from(pin)) } else { None };
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
        self.ensure_open()?;
        let offset = self
            .irq_line
            .ok_or(CoreError::Unsupported("no interrupt line configured"))?;
        let line = self.gpio.input_line(offset)?;
        self.monitor = Some(InterruptMonitor::spawn(
            line,
            offset,
            Arc::clone(&self.callback),
        ));
        Ok(())
    }

    fn is_active(&self) -> bool {
        self.spi.is_some()
    }
}

impl Drop for LinuxSpi {
    fn drop(&mut self) {
        self.close();
    }
}
