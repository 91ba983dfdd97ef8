//! PWM output module.
//!
//! Reads a period setpoint and a duty-cycle setpoint (percent) from shared
//! process data and pushes microsecond values to the hardware driver. In
//! variable-frequency mode a period change reprograms the driver and forces
//! the pulse-width path to recompute against the new period.

use super::{Module, ModuleContext};
use crate::exchange::DataExchange;
use pru_common::config::ModuleConfig;
use pru_common::protocol::VARIABLES;
use pru_hal::pwm::PwmDriver;
use std::sync::Arc;
use tracing::{info, warn};

/// Full-scale value of the duty cap (8-bit resolution).
const PWM_MAX_RES: i32 = 256;

/// Fallback period when the configured or commanded period is unusable [µs].
const DEFAULT_PWM_PERIOD_US: f32 = 200.0;

/// Build a PWM module from its configuration entry.
pub fn create(config: &ModuleConfig, ctx: &ModuleContext) -> Option<Box<dyn Module>> {
    let Some(sp) = config.index_field("SP[i]") else {
        warn!("PWM entry missing 'SP[i]'");
        return None;
    };
    let Some(period_sp) = config.index_field("Period SP[i]") else {
        warn!("PWM entry missing 'Period SP[i]'");
        return None;
    };
    if sp >= VARIABLES || period_sp >= VARIABLES {
        warn!("PWM setpoint slot out of range: SP[i]={sp}, Period SP[i]={period_sp}");
        return None;
    }
    let Some(pin) = config.str_field("PWM Pin") else {
        warn!("PWM entry missing 'PWM Pin'");
        return None;
    };

    let pwm_max = config.u32_field("PWM Max").unwrap_or(0) as i32;
    let variable_freq = config.flag_field("Variable Freq");
    let fixed_period_us = config.f32_field("Period us").unwrap_or(0.0);

    info!("Creating PWM at pin {pin} (variable_freq={variable_freq})");

    let driver = ctx.board.pwm(pin);
    Some(Box::new(PwmModule::new(
        Arc::clone(&ctx.exchange),
        sp,
        period_sp,
        variable_freq,
        fixed_period_us,
        pwm_max,
        driver,
    )))
}

/// Timer-backed PWM output.
pub struct PwmModule {
    exchange: Arc<DataExchange>,
    /// Slot of the duty-cycle setpoint [%].
    sp_index: usize,
    /// Slot of the period setpoint [µs].
    period_sp_index: usize,
    variable_freq: bool,
    period_us: f32,
    /// Cached duty cycle [%]; change detection runs against this.
    pulse_width: f32,
    pulse_width_us: f32,
    /// Duty cap on the 0–255 scale; 0 disables the cap.
    pwm_max: i32,
    driver: Box<dyn PwmDriver>,
}

impl PwmModule {
    /// Create the module and program the initial period and pulse width.
    pub fn new(
        exchange: Arc<DataExchange>,
        sp_index: usize,
        period_sp_index: usize,
        variable_freq: bool,
        fixed_period_us: f32,
        pwm_max: i32,
        mut driver: Box<dyn PwmDriver>,
    ) -> Self {
        let mut period_us = if variable_freq {
            exchange.set_point(period_sp_index)
        } else {
            fixed_period_us
        };
        if period_us < 1.0 {
            period_us = DEFAULT_PWM_PERIOD_US;
        }

        let pulse_width = exchange.set_point(sp_index).clamp(0.0, 100.0);
        let pulse_width_us = (period_us * pulse_width) / 100.0;

        driver.set_period_us(period_us);
        driver.set_pulse_width_us(pulse_width_us);

        Self {
            exchange,
            sp_index,
            period_sp_index,
            variable_freq,
            period_us,
            pulse_width,
            pulse_width_us,
            pwm_max,
            driver,
        }
    }

    /// Pulse width for a clamped duty cycle, honoring the duty cap.
    ///
    /// Deterministic in its inputs: recomputing from the same duty and
    /// period yields the same microsecond value.
    fn pulse_width_us_for(&self, duty: f32) -> f32 {
        if self.pwm_max > 0 && (duty / 100.0) * PWM_MAX_RES as f32 > self.pwm_max as f32 {
            // Substitute the duty recomputed from the capped maximum.
            let capped = (self.pwm_max * 100) / PWM_MAX_RES;
            (self.period_us * capped as f32) / 100.0
        } else {
            (self.period_us * duty) / 100.0
        }
    }
}

impl Module for PwmModule {
    fn update(&mut self) {
        if self.variable_freq {
            let period = self.exchange.set_point(self.period_sp_index);
            if period != 0.0 && period != self.period_us {
                self.period_us = period;
                self.driver.set_period_us(period);
                // Force the pulse-width branch below to recompute against
                // the new period.
                self.pulse_width = 0.0;
            }
        }

        let duty = self.exchange.set_point(self.sp_index);
        if duty != self.pulse_width {
            self.pulse_width = duty.clamp(0.0, 100.0);
            self.pulse_width_us = self.pulse_width_us_for(self.pulse_width);
            self.driver.set_pulse_width_us(self.pulse_width_us);
        }
    }
}
