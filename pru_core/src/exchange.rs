//! Double-buffered process-data exchange.
//!
//! Each record type exists twice; at any instant one slot is *active*
//! (read/written by the cycle threads and the header update) and one is
//! *alternate* (populated from or prepared for the transport). The comms
//! channel copies incoming payloads into the alternate receive slot and then
//! swaps designations, so a cycle thread never observes a partially-written
//! record.
//!
//! ## Swap protocol
//!
//! The swap is an index exchange guarded by a compare-and-swap spinlock.
//! The lock is held for the index flips only — never for a data copy or a
//! transport operation — which bounds the time a cycle thread can be stalled
//! behind a swap to a small constant.
//!
//! Slot contents are accessed through volatile reads/writes: the writer of
//! a slot is always the sole writer while that slot holds its current
//! designation.

use pru_common::protocol::VARIABLES;
use pru_common::records::{RxRecord, TxRecord};
use std::cell::UnsafeCell;
use std::ptr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// Which buffers a swap exchanges.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Swap {
    /// Transmit pair only (READ request).
    TxOnly,
    /// Both pairs (WRITE request).
    Both,
}

/// Shared process data in double-buffered form.
pub struct DataExchange {
    rx: [UnsafeCell<RxRecord>; 2],
    tx: [UnsafeCell<TxRecord>; 2],
    rx_active: AtomicUsize,
    tx_active: AtomicUsize,
    swap_lock: AtomicBool,
}

// SAFETY: all slot access goes through the active/alternate designation
// protocol above; the indices and lock are atomics.
unsafe impl Sync for DataExchange {}

impl DataExchange {
    /// Create an exchange with zeroed records, slot 0 active on both sides.
    pub fn new() -> Self {
        Self {
            rx: [
                UnsafeCell::new(RxRecord::zeroed()),
                UnsafeCell::new(RxRecord::zeroed()),
            ],
            tx: [
                UnsafeCell::new(TxRecord::zeroed()),
                UnsafeCell::new(TxRecord::zeroed()),
            ],
            rx_active: AtomicUsize::new(0),
            tx_active: AtomicUsize::new(0),
            swap_lock: AtomicBool::new(false),
        }
    }

    /// Active receive slot index (0 or 1).
    #[inline]
    pub fn rx_active_index(&self) -> usize {
        self.rx_active.load(Ordering::Acquire)
    }

    /// Active transmit slot index (0 or 1).
    #[inline]
    pub fn tx_active_index(&self) -> usize {
        self.tx_active.load(Ordering::Acquire)
    }

    #[inline]
    fn active_rx(&self) -> *mut RxRecord {
        self.rx[self.rx_active_index()].get()
    }

    #[inline]
    fn alternate_rx(&self) -> *mut RxRecord {
        self.rx[self.rx_active_index() ^ 1].get()
    }

    #[inline]
    fn active_tx(&self) -> *mut TxRecord {
        self.tx[self.tx_active_index()].get()
    }

    #[inline]
    fn alternate_tx(&self) -> *mut TxRecord {
        self.tx[self.tx_active_index() ^ 1].get()
    }

    // ─── Cycle-thread / device-logic side (active slots) ────────────

    /// Read a host setpoint from the active receive slot.
    #[inline]
    pub fn set_point(&self, index: usize) -> f32 {
        debug_assert!(index < VARIABLES);
        unsafe { ptr::read_volatile(&(*self.active_rx()).set_point[index]) }
    }

    /// Write a process variable into the active transmit slot.
    #[inline]
    pub fn write_process_variable(&self, index: usize, value: f32) {
        debug_assert!(index < VARIABLES);
        unsafe { ptr::write_volatile(&mut (*self.active_tx()).process_variable[index], value) }
    }

    /// Read back a process variable from the active transmit slot.
    #[inline]
    pub fn process_variable(&self, index: usize) -> f32 {
        debug_assert!(index < VARIABLES);
        unsafe { ptr::read_volatile(&(*self.active_tx()).process_variable[index]) }
    }

    /// Set bits in the discrete-input word of the active transmit slot.
    #[inline]
    pub fn set_input_bits(&self, mask: u16) {
        unsafe {
            let inputs = &mut (*self.active_tx()).inputs;
            ptr::write_volatile(inputs, ptr::read_volatile(inputs) | mask);
        }
    }

    /// Clear bits in the discrete-input word of the active transmit slot.
    #[inline]
    pub fn clear_input_bits(&self, mask: u16) {
        unsafe {
            let inputs = &mut (*self.active_tx()).inputs;
            ptr::write_volatile(inputs, ptr::read_volatile(inputs) & !mask);
        }
    }

    /// Current discrete-input word of the active transmit slot.
    #[inline]
    pub fn inputs(&self) -> u16 {
        unsafe { ptr::read_volatile(&(*self.active_tx()).inputs) }
    }

    /// Write the outgoing header into the active transmit slot.
    #[inline]
    pub fn set_tx_header(&self, header: u32) {
        unsafe { ptr::write_volatile(&mut (*self.active_tx()).header, header) }
    }

    /// Outgoing header of the active transmit slot.
    #[inline]
    pub fn tx_header(&self) -> u32 {
        unsafe { ptr::read_volatile(&(*self.active_tx()).header) }
    }

    /// Zero the active receive record (link-loss recovery).
    pub fn clear_active_rx(&self) {
        unsafe { (*self.active_rx()).clear() }
    }

    // ─── Comms-channel side (alternate slots) ───────────────────────

    /// Copy an incoming payload into the alternate receive slot.
    ///
    /// Never touches the active slot: a cycle thread may be mid-read there.
    pub fn write_alternate_rx(&self, frame: &[u8]) {
        unsafe { (*self.alternate_rx()).copy_from_bytes(frame) }
    }

    /// Copy out the alternate transmit record.
    ///
    /// After a swap this is the record the cycle threads had been filling,
    /// i.e. the feedback to send.
    pub fn snapshot_alternate_tx(&self) -> TxRecord {
        unsafe { ptr::read_volatile(self.alternate_tx()) }
    }

    /// Exchange active/alternate designations.
    ///
    /// The spin guard is held for the index flips only.
    pub fn swap(&self, swap: Swap) {
        while self
            .swap_lock
            .compare_exchange_weak(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            std::hint::spin_loop();
        }
        self.tx_active.fetch_xor(1, Ordering::AcqRel);
        if swap == Swap::Both {
            self.rx_active.fetch_xor(1, Ordering::AcqRel);
        }
        self.swap_lock.store(false, Ordering::Release);
    }
}

impl Default for DataExchange {
    fn default() -> Self {
        Self::new()
    }
}
