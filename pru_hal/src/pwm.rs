//! PWM output driver interface.

use std::sync::{Arc, Mutex};
use tracing::debug;

/// Timer-backed PWM generator, addressed in microseconds.
pub trait PwmDriver: Send {
    /// Reprogram the output period.
    fn set_period_us(&mut self, period_us: f32);

    /// Reprogram the output pulse width.
    fn set_pulse_width_us(&mut self, pulse_width_us: f32);
}

/// Observable state of a [`SimPwm`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SimPwmState {
    /// Last programmed period [µs].
    pub period_us: f32,
    /// Last programmed pulse width [µs].
    pub pulse_width_us: f32,
    /// Number of period reprogrammings.
    pub period_writes: u32,
    /// Number of pulse-width reprogrammings.
    pub pulse_writes: u32,
}

/// Simulation PWM driver recording every hardware write.
pub struct SimPwm {
    pin: String,
    state: Arc<Mutex<SimPwmState>>,
}

impl SimPwm {
    /// Create a simulation PWM on the named pin.
    pub fn new(pin: &str) -> Self {
        Self {
            pin: pin.to_string(),
            state: Arc::new(Mutex::new(SimPwmState::default())),
        }
    }

    /// Shared handle for observing programmed values from tests.
    pub fn state(&self) -> Arc<Mutex<SimPwmState>> {
        Arc::clone(&self.state)
    }
}

impl PwmDriver for SimPwm {
    fn set_period_us(&mut self, period_us: f32) {
        debug!("sim pwm {}: period {period_us}us", self.pin);
        let mut state = self.state.lock().unwrap();
        state.period_us = period_us;
        state.period_writes += 1;
    }

    fn set_pulse_width_us(&mut self, pulse_width_us: f32) {
        debug!("sim pwm {}: pulse width {pulse_width_us}us", self.pin);
        let mut state = self.state.lock().unwrap();
        state.pulse_width_us = pulse_width_us;
        state.pulse_writes += 1;
    }
}
