//! Quadrature encoder driver interface.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};

/// Hardware quadrature pulse counter, optionally with an index channel.
pub trait QeiDriver: Send {
    /// Current raw pulse count.
    fn count(&self) -> i32;

    /// True if an index edge was latched since the last [`clear_index`].
    ///
    /// [`clear_index`]: QeiDriver::clear_index
    fn index_detected(&self) -> bool;

    /// Pulse count captured at the latched index edge.
    fn index_count(&self) -> i32;

    /// Clear the latched index edge.
    fn clear_index(&mut self);
}

/// Shared state backing a [`SimQei`], driven from tests.
#[derive(Debug, Default)]
pub struct SimQeiState {
    count: AtomicI32,
    index_detected: AtomicBool,
    index_count: AtomicI32,
}

impl SimQeiState {
    /// Set the raw pulse count.
    pub fn set_count(&self, count: i32) {
        self.count.store(count, Ordering::SeqCst);
    }

    /// Latch an index edge at the given captured count.
    pub fn raise_index(&self, index_count: i32) {
        self.index_count.store(index_count, Ordering::SeqCst);
        self.index_detected.store(true, Ordering::SeqCst);
    }
}

/// Simulation encoder driver.
#[derive(Default)]
pub struct SimQei {
    state: Arc<SimQeiState>,
}

impl SimQei {
    /// Create a simulation encoder with a zeroed count.
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared handle for driving the encoder from tests.
    pub fn state(&self) -> Arc<SimQeiState> {
        Arc::clone(&self.state)
    }
}

impl QeiDriver for SimQei {
    fn count(&self) -> i32 {
        self.state.count.load(Ordering::SeqCst)
    }

    fn index_detected(&self) -> bool {
        self.state.index_detected.load(Ordering::SeqCst)
    }

    fn index_count(&self) -> i32 {
        self.state.index_count.load(Ordering::SeqCst)
    }

    fn clear_index(&mut self) {
        self.state.index_detected.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sim_qei_tracks_count_and_index() {
        let mut qei = SimQei::new();
        let state = qei.state();

        assert_eq!(qei.count(), 0);
        assert!(!qei.index_detected());

        state.set_count(1234);
        state.raise_index(1200);
        assert_eq!(qei.count(), 1234);
        assert!(qei.index_detected());
        assert_eq!(qei.index_count(), 1200);

        qei.clear_index();
        assert!(!qei.index_detected());
        // Captured count survives the clear.
        assert_eq!(qei.index_count(), 1200);
    }
}
