//! Protocol transport interface.
//!
//! The comms channel is transport-agnostic: SPI, Ethernet, or the in-process
//! [`ScriptTransport`] all present the same byte/DMA surface plus a
//! data-received notification hook. Physical byte movement (DMA setup, PHY
//! and MAC bring-up) lives entirely behind this trait.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// Notification hook invoked from the transport when a frame has landed.
/// The `bool` reports whether the frame arrived intact.
pub type DataCallback = Box<dyn Fn(bool) + Send + Sync>;

/// Byte-level protocol endpoint.
pub trait Transport: Send {
    /// Read one byte from the peripheral.
    fn read_byte(&mut self) -> u8;

    /// Write one byte to the peripheral.
    fn write_byte(&mut self, byte: u8);

    /// Copy the most recently received frame into `buf`.
    ///
    /// Returns the number of bytes copied (0 when nothing is pending).
    fn dma_read(&mut self, buf: &mut [u8]) -> usize;

    /// Queue a frame for transmission.
    fn dma_write(&mut self, buf: &[u8]);

    /// Register the data-received notification hook.
    fn set_data_callback(&mut self, callback: DataCallback);
}

#[derive(Default)]
struct ScriptInner {
    inbound: VecDeque<Vec<u8>>,
    sent: Vec<Vec<u8>>,
    callback: Option<DataCallback>,
    byte_cursor: Vec<u8>,
}

/// Shared handle for driving a [`ScriptTransport`] from a test.
#[derive(Clone, Default)]
pub struct ScriptTransportHandle {
    inner: Arc<Mutex<ScriptInner>>,
}

impl ScriptTransportHandle {
    /// Queue an inbound frame and fire the data-received notification.
    pub fn push_frame(&self, frame: &[u8]) {
        let callback = {
            let mut inner = self.inner.lock().unwrap();
            inner.inbound.push_back(frame.to_vec());
            inner.callback.take()
        };
        // Fire outside the lock; the callback may re-enter the transport.
        if let Some(callback) = callback {
            callback(true);
            self.inner.lock().unwrap().callback = Some(callback);
        }
    }

    /// Drain every frame the device has transmitted so far.
    pub fn take_sent(&self) -> Vec<Vec<u8>> {
        std::mem::take(&mut self.inner.lock().unwrap().sent)
    }
}

/// In-process transport for tests and the simulation binary.
#[derive(Default)]
pub struct ScriptTransport {
    inner: Arc<Mutex<ScriptInner>>,
}

impl ScriptTransport {
    /// Create a transport plus the handle that feeds it.
    pub fn new() -> (Self, ScriptTransportHandle) {
        let inner = Arc::new(Mutex::new(ScriptInner::default()));
        (
            Self {
                inner: Arc::clone(&inner),
            },
            ScriptTransportHandle { inner },
        )
    }
}

impl Transport for ScriptTransport {
    fn read_byte(&mut self) -> u8 {
        let mut inner = self.inner.lock().unwrap();
        if inner.byte_cursor.is_empty() {
            if let Some(frame) = inner.inbound.pop_front() {
                inner.byte_cursor = frame;
            }
        }
        if inner.byte_cursor.is_empty() {
            0
        } else {
            inner.byte_cursor.remove(0)
        }
    }

    fn write_byte(&mut self, byte: u8) {
        self.inner.lock().unwrap().sent.push(vec![byte]);
    }

    fn dma_read(&mut self, buf: &mut [u8]) -> usize {
        let mut inner = self.inner.lock().unwrap();
        match inner.inbound.pop_front() {
            Some(frame) => {
                let len = frame.len().min(buf.len());
                buf[..len].copy_from_slice(&frame[..len]);
                len
            }
            None => 0,
        }
    }

    fn dma_write(&mut self, buf: &[u8]) {
        self.inner.lock().unwrap().sent.push(buf.to_vec());
    }

    fn set_data_callback(&mut self, callback: DataCallback) {
        self.inner.lock().unwrap().callback = Some(callback);
    }
}
