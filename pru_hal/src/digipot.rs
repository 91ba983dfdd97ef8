//! Digital potentiometer driver interface.
//!
//! Used by on-load modules that program a wiper position once during setup
//! (motor current scaling and similar one-time trims).

use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Error type for digipot operations.
#[derive(Debug, Clone, Error)]
pub enum DigipotError {
    /// Requested wiper position is outside 0–100 %.
    #[error("wiper position out of range: {0}%")]
    OutOfRange(f32),

    /// Bus transfer to the device failed.
    #[error("digipot bus transfer failed: {0}")]
    BusError(String),
}

/// Bus-attached digital potentiometer.
pub trait Digipot: Send {
    /// Program the wiper position as a percentage of full scale.
    fn set_wiper_percent(&mut self, percent: f32) -> Result<(), DigipotError>;
}

/// Observable state of a [`SimDigipot`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SimDigipotState {
    /// Last programmed wiper position [%].
    pub wiper_percent: f32,
    /// Number of programming operations.
    pub writes: u32,
}

/// Simulation digipot recording programmed wiper positions.
#[derive(Default)]
pub struct SimDigipot {
    state: Arc<Mutex<SimDigipotState>>,
}

impl SimDigipot {
    /// Create a simulation digipot.
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared handle for observing programmed values from tests.
    pub fn state(&self) -> Arc<Mutex<SimDigipotState>> {
        Arc::clone(&self.state)
    }
}

impl Digipot for SimDigipot {
    fn set_wiper_percent(&mut self, percent: f32) -> Result<(), DigipotError> {
        if !(0.0..=100.0).contains(&percent) {
            return Err(DigipotError::OutOfRange(percent));
        }
        let mut state = self.state.lock().unwrap();
        state.wiper_percent = percent;
        state.writes += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sim_digipot_accepts_in_range_wiper() {
        let mut pot = SimDigipot::new();
        let state = pot.state();

        pot.set_wiper_percent(42.0).unwrap();
        let snap = *state.lock().unwrap();
        assert_eq!(snap.wiper_percent, 42.0);
        assert_eq!(snap.writes, 1);
    }

    #[test]
    fn sim_digipot_rejects_out_of_range() {
        let mut pot = SimDigipot::new();
        assert!(matches!(
            pot.set_wiper_percent(120.0),
            Err(DigipotError::OutOfRange(_))
        ));
        assert_eq!(pot.state().lock().unwrap().writes, 0);
    }
}
