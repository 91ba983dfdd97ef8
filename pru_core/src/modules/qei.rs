//! Quadrature encoder module.
//!
//! Mirrors the hardware pulse count into a process-variable slot. With index
//! support enabled, an index edge latches the process variable to the
//! captured index count for a fixed number of periods and raises a discrete
//! input bit for the duration of the window, so the host can sample the
//! index position reliably at its slower request cadence.

use super::{Module, ModuleContext};
use crate::exchange::DataExchange;
use pru_common::config::ModuleConfig;
use pru_common::protocol::VARIABLES;
use pru_hal::qei::QeiDriver;
use std::sync::Arc;
use tracing::{info, warn};

/// Periods the index latch (and its input bit) is held.
const INDEX_PULSE_HOLD: u32 = 100;

/// Build a QEI module from its configuration entry.
pub fn create(config: &ModuleConfig, ctx: &ModuleContext) -> Option<Box<dyn Module>> {
    let Some(pv) = config.index_field("PV[i]") else {
        warn!("QEI entry missing 'PV[i]'");
        return None;
    };
    if pv >= VARIABLES {
        warn!("QEI process-variable slot out of range: PV[i]={pv}");
        return None;
    }

    let has_index = config.flag_field("Enable Index");
    info!("Creating QEI, hardware quadrature encoder interface");

    let index = if has_index {
        let Some(bit) = config.index_field("Data Bit") else {
            warn!("QEI entry with index missing 'Data Bit'");
            return None;
        };
        if bit >= 16 {
            warn!("QEI data bit out of range: {bit}");
            return None;
        }
        info!("  Encoder has index");
        Some(IndexState {
            mask: 1 << bit,
            pulse_count: 0,
        })
    } else {
        None
    };

    let driver = ctx.board.qei(has_index);
    Some(Box::new(QeiModule {
        exchange: Arc::clone(&ctx.exchange),
        pv_index: pv,
        driver,
        index,
        count: 0,
    }))
}

struct IndexState {
    /// Mask of the discrete-input bit raised during the latch window.
    mask: u16,
    /// Remaining periods of the current latch window.
    pulse_count: u32,
}

/// Hardware quadrature encoder reader.
pub struct QeiModule {
    exchange: Arc<DataExchange>,
    pv_index: usize,
    driver: Box<dyn QeiDriver>,
    index: Option<IndexState>,
    count: i32,
}

impl Module for QeiModule {
    fn update(&mut self) {
        self.count = self.driver.count();

        match &mut self.index {
            Some(index) => {
                if self.driver.index_detected() && index.pulse_count == 0 {
                    // Index edge: latch the captured count and raise the bit.
                    self.exchange
                        .write_process_variable(self.pv_index, self.driver.index_count() as f32);
                    index.pulse_count = INDEX_PULSE_HOLD;
                    self.exchange.set_input_bits(index.mask);
                } else if index.pulse_count > 0 {
                    // Hold the latched value and the bit for the window.
                    self.driver.clear_index();
                    index.pulse_count -= 1;
                } else {
                    self.exchange.clear_input_bits(index.mask);
                    self.exchange
                        .write_process_variable(self.pv_index, self.count as f32);
                }
            }
            None => {
                self.exchange
                    .write_process_variable(self.pv_index, self.count as f32);
            }
        }
    }
}
