//! CH341 protocol constants and frame builders
//!
//! Everything the CH341 understands is a short command stream written to the
//! bulk OUT endpoint. SPI bytes go through `SPI_STREAM`, pins (including chip
//! select) through `UIO_STREAM`, and the stream clock through `I2C_STREAM`.

// USB device identifiers
/// CH341 USB VID
pub const CH341_USB_VENDOR: u16 = 0x1A86;
/// CH341 USB PID (parallel/SPI mode)
pub const CH341_USB_PRODUCT: u16 = 0x5512;

// USB endpoints
/// Bulk OUT endpoint
pub const WRITE_EP: u8 = 0x02;
/// Bulk IN endpoint
pub const READ_EP: u8 = 0x82;

/// USB I/O timeout in milliseconds
pub const USB_TIMEOUT_MS: u64 = 1000;

// Commands
pub const CH341_CMD_SPI_STREAM: u8 = 0xA8;
pub const CH341_CMD_UIO_STREAM: u8 = 0xAB;
pub const CH341_CMD_I2C_STREAM: u8 = 0xAA;

// UIO stream sub-commands
pub const CH341_CMD_UIO_STM_OUT: u8 = 0x80;
pub const CH341_CMD_UIO_STM_DIR: u8 = 0x40;
pub const CH341_CMD_UIO_STM_END: u8 = 0x20;

// I2C stream sub-commands
pub const CH341_CMD_I2C_STM_SET: u8 = 0x60;
pub const CH341_CMD_I2C_STM_END: u8 = 0x00;

/// Stream speed selector for 100 kHz
pub const CH341_STM_I2C_100K: u8 = 0x01;

/// Chip-select line (D0, active low)
pub const PIN_CS: u8 = 0x01;

/// Output levels with chip-select idle (high)
pub const UIO_CS_DEASSERT: u8 = 0x37;
/// All six D-port pins driven
pub const UIO_DIR_OUTPUT: u8 = 0x3F;
/// All D-port pins released
pub const UIO_DIR_INPUT: u8 = 0x00;

/// Number of D-port pins with a direction bit
pub const OUTPUT_PIN_COUNT: u8 = 6;
/// Number of bits in the status byte
pub const STATUS_PIN_COUNT: u8 = 8;

/// Dummy byte clocked out during the read phase
pub const SPI_READ_FILL: u8 = 0xFF;

/// Status bit carrying the active-low INT# input
pub const DEFAULT_IRQ_BIT: u8 = 6;

/// Interval between interrupt polls in milliseconds
pub const IRQ_POLL_INTERVAL_MS: u64 = 10;

/// Reverse the bit order of a byte
///
/// The CH341 shifts bytes out LSB first; this converts between orders.
#[inline]
pub fn reverse_byte(b: u8) -> u8 {
    b.reverse_bits()
}

/// Stream clock configuration frame
pub fn config_stream_frame(speed: u8) -> [u8; 3] {
    [
        CH341_CMD_I2C_STREAM,
        CH341_CMD_I2C_STM_SET | (speed & 0x7),
        CH341_CMD_I2C_STM_END,
    ]
}

/// Output enable/disable frame sent after open and before close
pub fn enable_pins_frame(enable: bool) -> [u8; 6] {
    let dir = if enable {
        UIO_DIR_OUTPUT
    } else {
        UIO_DIR_INPUT
    };
    let out = CH341_CMD_UIO_STM_OUT | UIO_CS_DEASSERT;
    [
        CH341_CMD_UIO_STREAM,
        out,
        out,
        out,
        CH341_CMD_UIO_STM_DIR | dir,
        CH341_CMD_UIO_STM_END,
    ]
}

/// Chip-select frame built on the current output levels
///
/// Only the CS bit differs from `output`; D1-D5 keep their levels.
pub fn chip_select_frame(output: u8, asserted: bool) -> [u8; 3] {
    let out = if asserted {
        output & !PIN_CS
    } else {
        output | PIN_CS
    };
    [
        CH341_CMD_UIO_STREAM,
        CH341_CMD_UIO_STM_OUT | (out & UIO_DIR_OUTPUT),
        CH341_CMD_UIO_STM_END,
    ]
}

/// Mask for a D-port pin, empty for pins without a direction bit
fn pin_mask(pin: u8) -> u8 {
    1u8.checked_shl(pin as u32).unwrap_or(0) & UIO_DIR_OUTPUT
}

/// Single-byte SPI stream frame
pub fn spi_byte_frame(byte: u8) -> [u8; 2] {
    [CH341_CMD_SPI_STREAM, byte]
}

/// Frame that asks the chip for its pin status byte
pub fn status_read_frame() -> [u8; 2] {
    [CH341_CMD_UIO_STREAM, CH341_CMD_UIO_STM_END]
}

/// Cached D-port direction and output levels
///
/// The UIO command always carries full bytes, so every pin update is a
/// read-modify-write of this cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GpioState {
    /// Direction bits (1 = output)
    pub direction: u8,
    /// Output levels
    pub output: u8,
}

impl Default for GpioState {
    fn default() -> Self {
        Self {
            direction: UIO_DIR_OUTPUT,
            output: UIO_CS_DEASSERT,
        }
    }
}

impl GpioState {
    /// Make `pin` an output at `high`; returns the frame to send
    pub fn write(&mut self, pin: u8, high: bool) -> [u8; 4] {
        let mask = pin_mask(pin);
        self.direction |= mask;
        if high {
            self.output |= mask;
        } else {
            self.output &= !mask;
        }
        [
            CH341_CMD_UIO_STREAM,
            CH341_CMD_UIO_STM_OUT | self.output,
            CH341_CMD_UIO_STM_DIR | self.direction,
            CH341_CMD_UIO_STM_END,
        ]
    }

    /// Set or clear the direction bit of `pin`; returns the frame to send
    pub fn set_direction(&mut self, pin: u8, output: bool) -> [u8; 3] {
        let mask = pin_mask(pin);
        if output {
            self.direction |= mask;
        } else {
            self.direction &= !mask;
        }
        self.direction_frame()
    }

    /// Assert or release chip select; returns the frame to send
    pub fn chip_select(&mut self, asserted: bool) -> [u8; 3] {
        let frame = chip_select_frame(self.output, asserted);
        self.output = frame[1] & !CH341_CMD_UIO_STM_OUT;
        frame
    }

    /// Frame carrying the current direction byte
    pub fn direction_frame(&self) -> [u8; 3] {
        [
            CH341_CMD_UIO_STREAM,
            CH341_CMD_UIO_STM_DIR | self.direction,
            CH341_CMD_UIO_STM_END,
        ]
    }
}

/// Edge detector for an active-low status bit
#[derive(Debug, Clone, Copy)]
pub struct FallingEdge {
    bit: u8,
    was_active: bool,
}

impl FallingEdge {
    /// Track `bit` of the status byte, starting from the idle (high) level
    pub fn new(bit: u8) -> Self {
        Self {
            bit,
            was_active: false,
        }
    }

    /// Feed one status sample; true exactly when the line has just gone low
    pub fn update(&mut self, status: u8) -> bool {
        let active = status & (1 << self.bit) == 0;
        let fired = active && !self.was_active;
        self.was_active = active;
        fired
    }
}
