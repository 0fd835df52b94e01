//! Bulk endpoint pair used by the CH341 session

use std::time::Duration;

use nusb::transfer::{Buffer, Bulk, In, Out};
use nusb::Endpoint;

use crate::error::{Ch341Error, Result};
use crate::protocol::{READ_EP, USB_TIMEOUT_MS, WRITE_EP};

/// A bulk OUT/IN endpoint pair
///
/// The session only ever writes one command frame and then reads the bytes
/// it produced, so blocking calls with a fixed timeout are enough.
pub(crate) trait BulkPipe: Send {
    /// Write a complete frame to the OUT endpoint
    fn write(&mut self, data: &[u8]) -> Result<()>;

    /// Read exactly `len` bytes from the IN endpoint
    fn read(&mut self, len: usize) -> Result<Vec<u8>>;
}

/// Bulk endpoints of a claimed CH341 interface
pub(crate) struct NusbPipe {
    /// Keeps the interface claimed for the lifetime of the pipe
    _interface: nusb::Interface,
    out_ep: Endpoint<Bulk, Out>,
    in_ep: Endpoint<Bulk, In>,
    timeout: Duration,
}

impl NusbPipe {
    /// Claim interface 0 of `device` and open both bulk endpoints
    pub(crate) fn claim(device: &nusb::Device) -> Result<Self> {
        use nusb::MaybeFuture;

        let interface = device
            .claim_interface(0)
            .wait()
            .map_err(|e| Ch341Error::ClaimFailed(e.to_string()))?;

        let out_ep = interface
            .endpoint::<Bulk, Out>(WRITE_EP)
            .map_err(|e| Ch341Error::ClaimFailed(e.to_string()))?;
        let in_ep = interface
            .endpoint::<Bulk, In>(READ_EP)
            .map_err(|e| Ch341Error::ClaimFailed(e.to_string()))?;

        Ok(Self {
            _interface: interface,
            out_ep,
            in_ep,
            timeout: Duration::from_millis(USB_TIMEOUT_MS),
        })
    }

    /// Cancel and drain all pending transfers on both endpoints
    fn drain_all_pending(&mut self) {
        self.out_ep.cancel_all();
        while self.out_ep.pending() > 0 {
            let _ = self.out_ep.wait_next_complete(self.timeout);
        }
        self.in_ep.cancel_all();
        while self.in_ep.pending() > 0 {
            let _ = self.in_ep.wait_next_complete(self.timeout);
        }
    }
}

impl BulkPipe for NusbPipe {
    fn write(&mut self, data: &[u8]) -> Result<()> {
        self.out_ep.submit(Buffer::from(data.to_vec()));

        let completion = match self.out_ep.wait_next_complete(self.timeout) {
            Some(c) => c,
            None => {
                self.drain_all_pending();
                return Err(Ch341Error::Timeout);
            }
        };

        completion
            .status
            .map_err(|e| Ch341Error::TransferFailed(e.to_string()))?;

        log::trace!("USB write {:02X?}", data);
        Ok(())
    }

    fn read(&mut self, len: usize) -> Result<Vec<u8>> {
        let max_packet_size = self.in_ep.max_packet_size();
        let mut data = Vec::with_capacity(len);

        while data.len() < len {
            self.in_ep.submit(Buffer::new(max_packet_size));

            let completion = match self.in_ep.wait_next_complete(self.timeout) {
                Some(c) => c,
                None => {
                    self.drain_all_pending();
                    return Err(Ch341Error::Timeout);
                }
            };

            completion
                .status
                .map_err(|e| Ch341Error::TransferFailed(e.to_string()))?;

            if completion.actual_len == 0 {
                return Err(Ch341Error::ShortRead {
                    expected: len,
                    actual: data.len(),
                });
            }

            let take = completion.actual_len.min(len - data.len());
            data.extend_from_slice(&completion.buffer[..take]);
        }

        log::trace!("USB read {:02X?}", data);
        Ok(data)
    }
}

impl Drop for NusbPipe {
    fn drop(&mut self) {
        self.drain_all_pending();
    }
}

#[cfg(test)]
pub(crate) mod mock {
    //! Scripted pipe for exercising the session without hardware

    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    use super::BulkPipe;
    use crate::error::{Ch341Error, Result};

    #[derive(Default)]
    pub(crate) struct MockState {
        /// Every frame written, in order
        pub writes: Vec<Vec<u8>>,
        /// Bytes served to reads; `idle` is used once this runs dry
        pub responses: VecDeque<u8>,
        /// Byte returned when no scripted response is left
        pub idle: u8,
        /// Fail the write with this index (counting from zero)
        pub fail_write_at: Option<usize>,
    }

    #[derive(Clone, Default)]
    pub(crate) struct MockPipe {
        pub state: Arc<Mutex<MockState>>,
    }

    impl MockPipe {
        pub(crate) fn new() -> Self {
            Self::default()
        }

        pub(crate) fn writes(&self) -> Vec<Vec<u8>> {
            self.state.lock().unwrap().writes.clone()
        }

        pub(crate) fn push_responses(&self, bytes: &[u8]) {
            self.state.lock().unwrap().responses.extend(bytes);
        }

        pub(crate) fn set_idle(&self, byte: u8) {
            self.state.lock().unwrap().idle = byte;
        }

        pub(crate) fn clear_writes(&self) {
            self.state.lock().unwrap().writes.clear();
        }
    }

    impl BulkPipe for MockPipe {
        fn write(&mut self, data: &[u8]) -> Result<()> {
            let mut state = self.state.lock().unwrap();
            if state.fail_write_at == Some(state.writes.len()) {
                state.writes.push(data.to_vec());
                return Err(Ch341Error::TransferFailed("injected failure".into()));
            }
            state.writes.push(data.to_vec());
            Ok(())
        }

        fn read(&mut self, len: usize) -> Result<Vec<u8>> {
            let mut state = self.state.lock().unwrap();
            let idle = state.idle;
            Ok((0..len)
                .map(|_| state.responses.pop_front().unwrap_or(idle))
                .collect())
        }
    }
}
