//! Blink module: toggles a digital output at a configured rate.
//!
//! Mostly a bring-up aid — it is the one module in the built-in default
//! configuration, so a board with no stored document still shows a sign of
//! life.

use super::{Module, ModuleContext};
use pru_common::config::ModuleConfig;
use pru_hal::gpio::OutputPin;
use tracing::{info, warn};

/// Build a Blink module from its configuration entry.
pub fn create(config: &ModuleConfig, ctx: &ModuleContext) -> Option<Box<dyn Module>> {
    let Some(pin) = config.str_field("Pin") else {
        warn!("Blink entry missing 'Pin'");
        return None;
    };
    let Some(frequency) = config.u32_field("Frequency") else {
        warn!("Blink entry missing 'Frequency'");
        return None;
    };
    if frequency == 0 || config.thread_freq == 0 {
        warn!(
            "Blink at pin {pin} needs non-zero blink ({frequency}Hz) and thread ({}Hz) frequencies",
            config.thread_freq
        );
        return None;
    }

    info!("Creating Blink at pin {pin}, {frequency}Hz");

    // Two toggles per blink cycle.
    let periods_per_toggle = (config.thread_freq / (2 * frequency)).max(1);
    Some(Box::new(BlinkModule {
        output: ctx.board.output_pin(pin),
        periods_per_toggle,
        counter: 0,
        level: false,
    }))
}

/// Periodic pin toggler.
pub struct BlinkModule {
    output: Box<dyn OutputPin>,
    periods_per_toggle: u32,
    counter: u32,
    level: bool,
}

impl Module for BlinkModule {
    fn update(&mut self) {
        self.counter += 1;
        if self.counter >= self.periods_per_toggle {
            self.counter = 0;
            self.level = !self.level;
            self.output.set(self.level);
        }
    }
}
