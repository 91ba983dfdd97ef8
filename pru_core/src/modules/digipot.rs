//! Digital potentiometer module (on-load).
//!
//! Programs a wiper position once during Start. Bound to the "On load"
//! thread name, so it is never registered with a cycle thread.

use super::{Module, ModuleContext};
use pru_common::config::ModuleConfig;
use pru_hal::digipot::Digipot;
use tracing::{info, warn};

/// Build a Digipot module from its configuration entry.
pub fn create(config: &ModuleConfig, ctx: &ModuleContext) -> Option<Box<dyn Module>> {
    let Some(wiper_percent) = config.f32_field("Wiper %") else {
        warn!("Digipot entry missing 'Wiper %'");
        return None;
    };

    info!("Creating Digipot, wiper at {wiper_percent}%");
    Some(Box::new(DigipotModule {
        driver: ctx.board.digipot(),
        wiper_percent,
    }))
}

/// One-shot wiper programming.
pub struct DigipotModule {
    driver: Box<dyn Digipot>,
    wiper_percent: f32,
}

impl Module for DigipotModule {
    fn configure(&mut self) {
        // Runtime-phase errors have no reporting channel; clamp and retry
        // with the nearest valid value instead of failing the Start state.
        if let Err(e) = self.driver.set_wiper_percent(self.wiper_percent) {
            warn!("digipot rejected wiper {}%: {e}", self.wiper_percent);
            let clamped = self.wiper_percent.clamp(0.0, 100.0);
            let _ = self.driver.set_wiper_percent(clamped);
        }
    }

    fn update(&mut self) {
        // On-load module: never scheduled.
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pru_hal::digipot::SimDigipot;

    #[test]
    fn configure_programs_wiper_once() {
        let pot = SimDigipot::new();
        let state = pot.state();
        let mut module = DigipotModule {
            driver: Box::new(pot),
            wiper_percent: 35.0,
        };

        module.configure();
        let snap = *state.lock().unwrap();
        assert_eq!(snap.wiper_percent, 35.0);
        assert_eq!(snap.writes, 1);
    }

    #[test]
    fn out_of_range_wiper_is_clamped() {
        let pot = SimDigipot::new();
        let state = pot.state();
        let mut module = DigipotModule {
            driver: Box::new(pot),
            wiper_percent: 130.0,
        };

        module.configure();
        let snap = *state.lock().unwrap();
        assert_eq!(snap.wiper_percent, 100.0);
        assert_eq!(snap.writes, 1);
    }
}
