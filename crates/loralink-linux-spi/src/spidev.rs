//! spidev character device access
//!
//! Thin wrapper around the `SPI_IOC_*` ioctls. A transfer is submitted as a
//! single `SPI_IOC_MESSAGE` so chip select stays asserted across the write
//! and read segments.

use std::fs::{File, OpenOptions};
use std::os::unix::io::AsRawFd;

use crate::error::{LinuxSpiError, Result};

/// Linux spidev ioctl constants
mod ioctl {
    use nix::ioctl_write_ptr;

    // SPI ioctl magic number
    pub const SPI_IOC_MAGIC: u8 = b'k';

    const SPI_IOC_TYPE_MODE: u8 = 1;
    const SPI_IOC_TYPE_BITS_PER_WORD: u8 = 3;
    const SPI_IOC_TYPE_MAX_SPEED_HZ: u8 = 4;

    ioctl_write_ptr!(spi_ioc_wr_mode, SPI_IOC_MAGIC, SPI_IOC_TYPE_MODE, u8);
    ioctl_write_ptr!(
        spi_ioc_wr_bits_per_word,
        SPI_IOC_MAGIC,
        SPI_IOC_TYPE_BITS_PER_WORD,
        u8
    );
    ioctl_write_ptr!(
        spi_ioc_wr_max_speed_hz,
        SPI_IOC_MAGIC,
        SPI_IOC_TYPE_MAX_SPEED_HZ,
        u32
    );

    /// Size of `struct spi_ioc_transfer`
    pub const SPI_IOC_TRANSFER_SIZE: usize = 32;

    /// `SPI_IOC_MESSAGE(n)` = `_IOW(SPI_IOC_MAGIC, 0, char[n * sizeof(spi_ioc_transfer)])`
    pub fn spi_ioc_message(n: u8) -> libc::c_ulong {
        let size = (n as usize) * SPI_IOC_TRANSFER_SIZE;
        ((1u32 << 30) | ((size as u32) << 16) | ((SPI_IOC_MAGIC as u32) << 8)) as libc::c_ulong
    }
}

/// Kernel `struct spi_ioc_transfer`
#[repr(C)]
#[derive(Debug, Default, Clone)]
pub(crate) struct SpiIocTransfer {
    tx_buf: u64,
    rx_buf: u64,
    len: u32,
    speed_hz: u32,
    delay_usecs: u16,
    bits_per_word: u8,
    cs_change: u8,
    tx_nbits: u8,
    rx_nbits: u8,
    word_delay_usecs: u8,
    _pad: u8,
}

/// Build the segment list for a write-then-read exchange
///
/// Empty phases are left out; `cs_change` stays 0 so chip select is held
/// between segments.
pub(crate) fn build_segments(write: &[u8], read: &mut [u8], speed_hz: u32) -> Vec<SpiIocTransfer> {
    let mut segments = Vec::with_capacity(2);
    if !write.is_empty() {
        segments.push(SpiIocTransfer {
            tx_buf: write.as_ptr() as u64,
            len: write.len() as u32,
            speed_hz,
            bits_per_word: 8,
            ..Default::default()
        });
    }
    if !read.is_empty() {
        segments.push(SpiIocTransfer {
            rx_buf: read.as_mut_ptr() as u64,
            len: read.len() as u32,
            speed_hz,
            bits_per_word: 8,
            ..Default::default()
        });
    }
    segments
}

/// An open and configured spidev node
pub(crate) struct Spidev {
    file: File,
    speed_hz: u32,
}

impl Spidev {
    /// Open `path` and apply mode, word size and clock
    pub(crate) fn open(path: &str, mode: u8, speed_hz: u32) -> Result<Self> {
        log::debug!("linux_spi: Opening device {}", path);

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(|e| LinuxSpiError::OpenFailed {
                path: path.to_string(),
                source: e,
            })?;

        let fd = file.as_raw_fd();

        unsafe {
            ioctl::spi_ioc_wr_mode(fd, &mode).map_err(|e| LinuxSpiError::SetModeFailed {
                mode,
                source: std::io::Error::from_raw_os_error(e as i32),
            })?;
        }

        let bits: u8 = 8;
        unsafe {
            ioctl::spi_ioc_wr_bits_per_word(fd, &bits).map_err(|e| {
                LinuxSpiError::SetBitsPerWordFailed {
                    bits,
                    source: std::io::Error::from_raw_os_error(e as i32),
                }
            })?;
        }

        unsafe {
            ioctl::spi_ioc_wr_max_speed_hz(fd, &speed_hz).map_err(|e| {
                LinuxSpiError::SetSpeedFailed {
                    speed: speed_hz,
                    source: std::io::Error::from_raw_os_error(e as i32),
                }
            })?;
        }

        log::info!(
            "linux_spi: Opened {} (mode={}, speed={} kHz)",
            path,
            mode,
            speed_hz / 1000
        );

        Ok(Self { file, speed_hz })
    }

    /// Write `write`, then read `read_len` bytes, under one chip select
    pub(crate) fn transfer(&mut self, write: &[u8], read_len: usize) -> Result<Vec<u8>> {
        let mut read = vec![0u8; read_len];
        let segments = build_segments(write, &mut read, self.speed_hz);
        if segments.is_empty() {
            return Ok(read);
        }

        let ioctl_num = ioctl::spi_ioc_message(segments.len() as u8);
        let ret = unsafe { libc::ioctl(self.file.as_raw_fd(), ioctl_num, segments.as_ptr()) };
        if ret < 0 {
            return Err(LinuxSpiError::TransferFailed(
                std::io::Error::last_os_error(),
            ));
        }

        log::trace!("linux_spi: {:02X?} -> {:02X?}", write, read);
        Ok(read)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transfer_struct_size() {
        assert_eq!(
            std::mem::size_of::<SpiIocTransfer>(),
            ioctl::SPI_IOC_TRANSFER_SIZE
        );
    }

    #[test]
    fn test_spi_ioc_message() {
        // _IOW('k', 0, char[32]) and _IOW('k', 0, char[64])
        assert_eq!(ioctl::spi_ioc_message(1), 0x4020_6B00);
        assert_eq!(ioctl::spi_ioc_message(2), 0x4040_6B00);
    }

    #[test]
    fn test_segments() {
        let write = [0x42];
        let mut read = [0u8; 2];
        let segs = build_segments(&write, &mut read, 1_000_000);
        assert_eq!(segs.len(), 2);
        assert_eq!(segs[0].len, 1);
        assert_eq!(segs[0].rx_buf, 0);
        assert_eq!(segs[1].len, 2);
        assert_eq!(segs[1].tx_buf, 0);
        assert_eq!(segs[1].cs_change, 0);

        let segs = build_segments(&[0x81, 0x00], &mut [], 1_000_000);
        assert_eq!(segs.len(), 1);
        assert_eq!(segs[0].len, 2);
    }

    #[test]
    fn test_open_missing_device() {
        let err = Spidev::open("/nonexistent/spidev9.9", 0, 1_000_000)
            .err()
            .expect("open should fail");
        assert!(matches!(err, LinuxSpiError::OpenFailed { .. }));
    }
}
