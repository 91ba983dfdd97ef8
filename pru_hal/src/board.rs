//! Board support: driver construction by pin name.
//!
//! Module constructors never instantiate concrete drivers; they ask the
//! board for one. A real board maps pin names onto timer channels and
//! counter peripherals; the simulation board hands out recording drivers
//! and keeps their observation handles for the test suite.

use crate::digipot::{Digipot, SimDigipot, SimDigipotState};
use crate::gpio::{OutputPin, SimPin, SimPinState};
use crate::pwm::{PwmDriver, SimPwm, SimPwmState};
use crate::qei::{QeiDriver, SimQei, SimQeiState};
use std::sync::{Arc, Mutex};

/// Factory for the hardware drivers behind the module set.
pub trait BoardSupport: Send + Sync {
    /// PWM generator on the named pin.
    fn pwm(&self, pin: &str) -> Box<dyn PwmDriver>;

    /// Quadrature encoder interface, with or without an index channel.
    fn qei(&self, with_index: bool) -> Box<dyn QeiDriver>;

    /// Digital output on the named pin.
    fn output_pin(&self, pin: &str) -> Box<dyn OutputPin>;

    /// Bus-attached digital potentiometer.
    fn digipot(&self) -> Box<dyn Digipot>;
}

/// Simulation board handing out recording drivers.
#[derive(Default)]
pub struct SimBoard {
    pwms: Mutex<Vec<(String, Arc<Mutex<SimPwmState>>)>>,
    qeis: Mutex<Vec<Arc<SimQeiState>>>,
    pins: Mutex<Vec<(String, Arc<SimPinState>)>>,
    digipots: Mutex<Vec<Arc<Mutex<SimDigipotState>>>>,
}

impl SimBoard {
    /// Create a simulation board with no drivers handed out yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Observation handles of every PWM handed out, in creation order.
    pub fn pwm_states(&self) -> Vec<(String, Arc<Mutex<SimPwmState>>)> {
        self.pwms.lock().unwrap().clone()
    }

    /// Observation handles of every encoder handed out, in creation order.
    pub fn qei_states(&self) -> Vec<Arc<SimQeiState>> {
        self.qeis.lock().unwrap().clone()
    }

    /// Observation handles of every output pin handed out, in creation order.
    pub fn pin_states(&self) -> Vec<(String, Arc<SimPinState>)> {
        self.pins.lock().unwrap().clone()
    }

    /// Observation handles of every digipot handed out, in creation order.
    pub fn digipot_states(&self) -> Vec<Arc<Mutex<SimDigipotState>>> {
        self.digipots.lock().unwrap().clone()
    }
}

impl BoardSupport for SimBoard {
    fn pwm(&self, pin: &str) -> Box<dyn PwmDriver> {
        let pwm = SimPwm::new(pin);
        self.pwms
            .lock()
            .unwrap()
            .push((pin.to_string(), pwm.state()));
        Box::new(pwm)
    }

    fn qei(&self, _with_index: bool) -> Box<dyn QeiDriver> {
        let qei = SimQei::new();
        self.qeis.lock().unwrap().push(qei.state());
        Box::new(qei)
    }

    fn output_pin(&self, pin: &str) -> Box<dyn OutputPin> {
        let out = SimPin::new();
        self.pins
            .lock()
            .unwrap()
            .push((pin.to_string(), out.state()));
        Box::new(out)
    }

    fn digipot(&self) -> Box<dyn Digipot> {
        let pot = SimDigipot::new();
        self.digipots.lock().unwrap().push(pot.state());
        Box::new(pot)
    }
}
