//! Module pipeline: the uniform per-cycle contract and its implementations.
//!
//! A module is one unit of I/O logic, built once from a configuration entry
//! and alive for the process lifetime. Cycle threads drive the primary
//! [`update`] phase every period and the secondary [`slow_update`] phase for
//! modules that opt in; on-load modules are instead [`configure`]d once
//! during Start and never scheduled.
//!
//! [`update`]: Module::update
//! [`slow_update`]: Module::slow_update
//! [`configure`]: Module::configure

use crate::exchange::DataExchange;
use pru_hal::board::BoardSupport;
use std::sync::Arc;

pub mod blink;
pub mod digipot;
pub mod pwm;
pub mod qei;
pub mod registry;

/// Uniform module lifecycle and per-cycle contract.
pub trait Module: Send {
    /// One-time post-construction setup. Only invoked for modules not bound
    /// to a cycle thread ("on-load" modules).
    fn configure(&mut self) {}

    /// Primary-phase per-period logic.
    ///
    /// Must not fail: internal invariant violations clamp silently rather
    /// than abort the period, because a skipped period has no defined
    /// recovery.
    fn update(&mut self);

    /// Secondary-phase logic, invoked only when [`uses_post`] is true.
    ///
    /// [`uses_post`]: Module::uses_post
    fn slow_update(&mut self) {}

    /// Whether the secondary phase applies to this module.
    fn uses_post(&self) -> bool {
        false
    }
}

/// Construction context handed to every module constructor.
///
/// Replaces device-wide singletons: modules reach shared process data and
/// the board through this handle, holding slot indices rather than raw
/// pointers.
#[derive(Clone)]
pub struct ModuleContext {
    /// Shared process data.
    pub exchange: Arc<DataExchange>,
    /// Driver construction surface.
    pub board: Arc<dyn BoardSupport>,
}
