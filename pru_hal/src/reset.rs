//! System reset line.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::warn;

/// Hardware restart trigger.
pub trait ResetController: Send + Sync {
    /// Trigger a full hardware restart.
    ///
    /// On real hardware this does not return. The simulation latches the
    /// request instead so the control loop can observe it and terminate.
    fn system_reset(&self);
}

/// Simulation reset controller that latches the request.
#[derive(Default)]
pub struct SimReset {
    requested: Arc<AtomicBool>,
}

impl SimReset {
    /// Create a reset controller with the request line clear.
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared handle for observing the request from tests.
    pub fn requested(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.requested)
    }
}

impl ResetController for SimReset {
    fn system_reset(&self) {
        warn!("system reset requested");
        self.requested.store(true, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sim_reset_latches() {
        let reset = SimReset::new();
        let flag = reset.requested();
        assert!(!flag.load(Ordering::SeqCst));
        reset.system_reset();
        assert!(flag.load(Ordering::SeqCst));
    }
}
