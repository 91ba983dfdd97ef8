//! # PRU Core
//!
//! Real-time orchestration core of a machine-control bridge: a host motion
//! controller issues periodic READ/WRITE requests over a fixed-format binary
//! protocol while two fixed-frequency cycle threads drive the configured
//! I/O modules against double-buffered shared process data.
//!
//! - [`orchestrator`] - State machine and top-level control loop
//! - [`thread`] - Fixed-frequency cycle threads
//! - [`exchange`] - Double-buffered process-data exchange
//! - [`comms`] - Protocol decode, buffer-swap policy, replies
//! - [`modules`] - Module contract, registry, and implementations
//! - [`state`] - Device state enumeration and tracking
//! - [`rt`] - PREEMPT_RT setup (behind the `rt` feature)

pub mod comms;
pub mod exchange;
pub mod modules;
pub mod orchestrator;
pub mod rt;
pub mod state;
pub mod thread;
