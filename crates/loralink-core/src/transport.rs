//! Transport trait definitions

use std::sync::Arc;

use crate::error::Result;

/// GPIO pin configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinMode {
    /// High-impedance input
    Input = 0,
    /// Push-pull output
    Output = 1,
    /// Input with pull-up enabled (where the backend supports it)
    InputPullup = 2,
}

/// Callback invoked once per detected interrupt edge
///
/// Called from the backend's monitoring thread, never while the backend
/// holds its bus lock.
pub type InterruptCallback = Arc<dyn Fn() + Send + Sync>;

/// SPI transport with GPIO and interrupt plumbing
///
/// A transport owns one session to one device. Operations on a session are
/// serialized by the implementation; a transfer is never interleaved with
/// another transfer or GPIO command on the same session.
///
/// Failures are reported as `Err`. A failed transfer never yields a
/// partially filled buffer.
pub trait SpiTransport: Send {
    /// Acquire exclusive access to the device
    ///
    /// Opening an already open transport is a no-op. On failure nothing is
    /// left held.
    fn open(&mut self) -> Result<()>;

    /// Release the device
    ///
    /// Stops any interrupt monitoring first. Safe to call when not open and
    /// safe to call more than once.
    fn close(&mut self);

    /// Perform one framed exchange
    ///
    /// Asserts chip-select, clocks out `write`, clocks in `read_len` bytes
    /// and deasserts chip-select. Returns exactly the `read_len` bytes of the
    /// read phase.
    fn transfer(&mut self, write: &[u8], read_len: usize) -> Result<Vec<u8>>;

    /// Drive a pin high or low, making it an output
    fn digital_write(&mut self, pin: u8, high: bool) -> Result<()>;

    /// Sample a pin, making it an input
    fn digital_read(&mut self, pin: u8) -> Result<bool>;

    /// Configure a pin's direction
    fn pin_mode(&mut self, pin: u8, mode: PinMode) -> Result<()>;

    /// Select the pin used for interrupt notification
    fn configure_interrupt(&mut self, pin: u8, enable: bool) -> Result<()>;

    /// Register the interrupt callback, replacing any previous one
    fn set_interrupt_callback(&mut self, callback: InterruptCallback);

    /// Start or stop interrupt notification
    ///
    /// Stopping waits for any monitoring thread to exit.
    fn enable_interrupt(&mut self, enable: bool) -> Result<()>;

    /// Whether a session is currently open
    fn is_active(&self) -> bool;
}

// Lets drivers be generic over either a concrete backend or a
// factory-built `Box<dyn SpiTransport>`.
impl<T: SpiTransport + ?Sized> SpiTransport for Box<T> {
    fn open(&mut self) -> Result<()> {
        (**self).open()
    }

    fn close(&mut self) {
        (**self).close()
    }

    fn transfer(&mut self, write: &[u8], read_len: usize) -> Result<Vec<u8>> {
        (**self).transfer(write, read_len)
    }

    fn digital_write(&mut self, pin: u8, high: bool) -> Result<()> {
        (**self).digital_write(pin, high)
    }

    fn digital_read(&mut self, pin: u8) -> Result<bool> {
        (**self).digital_read(pin)
    }

    fn pin_mode(&mut self, pin: u8, mode: PinMode) -> Result<()> {
        (**self).pin_mode(pin, mode)
    }

    fn configure_interrupt(&mut self, pin: u8, enable: bool) -> Result<()> {
        (**self).configure_interrupt(pin, enable)
    }

    fn set_interrupt_callback(&mut self, callback: InterruptCallback) {
        (**self).set_interrupt_callback(callback)
    }

    fn enable_interrupt(&mut self, enable: bool) -> Result<()> {
        (**self).enable_interrupt(enable)
    }

    fn is_active(&self) -> bool {
        (**self).is_active()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    struct Loopback {
        open: bool,
    }

    impl SpiTransport for Loopback {
        fn open(&mut self) -> Result<()> {
            self.open = true;
            Ok(())
        }

        fn close(&mut self) {
            self.open = false;
        }

        fn transfer(&mut self, write: &[u8], read_len: usize) -> Result<Vec<u8>> {
            if !self.open {
                return Err(Error::NotOpen);
            }
            Ok(write.iter().copied().cycle().take(read_len).collect())
        }

        fn digital_write(&mut self, _pin: u8, _high: bool) -> Result<()> {
            Ok(())
        }

        fn digital_read(&mut self, _pin: u8) -> Result<bool> {
            Ok(false)
        }

        fn pin_mode(&mut self, _pin: u8, _mode: PinMode) -> Result<()> {
            Ok(())
        }

        fn configure_interrupt(&mut self, _pin: u8, _enable: bool) -> Result<()> {
            Err(Error::Unsupported("interrupts"))
        }

        fn set_interrupt_callback(&mut self, _callback: InterruptCallback) {}

        fn enable_interrupt(&mut self, _enable: bool) -> Result<()> {
            Err(Error::Unsupported("interrupts"))
        }

        fn is_active(&self) -> bool {
            self.open
        }
    }

    #[test]
    fn test_boxed_transport_forwards() {
        let mut bus: Box<dyn SpiTransport> = Box::new(Loopback { open: false });
        assert!(!bus.is_active());
        assert!(matches!(bus.transfer(&[1], 1), Err(Error::NotOpen)));

        bus.open().unwrap();
        assert!(bus.is_active());
        assert_eq!(bus.transfer(&[0xAA, 0x55], 3).unwrap(), vec![0xAA, 0x55, 0xAA]);

        bus.close();
        bus.close();
        assert!(!bus.is_active());
    }

    #[test]
    fn test_pin_mode_values() {
        assert_eq!(PinMode::Input as u8, 0);
        assert_eq!(PinMode::Output as u8, 1);
        assert_eq!(PinMode::InputPullup as u8, 2);
    }
}
