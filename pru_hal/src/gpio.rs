//! Digital output driver interface.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

/// Push-pull digital output pin.
pub trait OutputPin: Send {
    /// Drive the pin high or low.
    fn set(&mut self, high: bool);
}

/// Shared state backing a [`SimPin`].
#[derive(Debug, Default)]
pub struct SimPinState {
    high: AtomicBool,
    writes: AtomicU32,
}

impl SimPinState {
    /// Current pin level.
    pub fn is_high(&self) -> bool {
        self.high.load(Ordering::SeqCst)
    }

    /// Number of level writes since creation.
    pub fn writes(&self) -> u32 {
        self.writes.load(Ordering::SeqCst)
    }
}

/// Simulation output pin.
#[derive(Default)]
pub struct SimPin {
    state: Arc<SimPinState>,
}

impl SimPin {
    /// Create a simulation pin, initially low.
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared handle for observing the pin from tests.
    pub fn state(&self) -> Arc<SimPinState> {
        Arc::clone(&self.state)
    }
}

impl OutputPin for SimPin {
    fn set(&mut self, high: bool) {
        self.state.high.store(high, Ordering::SeqCst);
        self.state.writes.fetch_add(1, Ordering::SeqCst);
    }
}
