//! Hardware abstraction boundary for the PRU firmware core.
//!
//! The core treats hardware as a set of narrow, opaque driver interfaces:
//! module drivers ([`pwm`], [`qei`], [`gpio`], [`digipot`]), the protocol
//! [`transport`], the configuration [`storage`] medium, and the system
//! [`reset`] line. The [`board`] module ties the driver traits together into
//! a single construction surface. Each interface ships a simulation
//! implementation used by the test suite and the simulation binary; real
//! boards supply their own.

pub mod board;
pub mod digipot;
pub mod gpio;
pub mod pwm;
pub mod qei;
pub mod reset;
pub mod storage;
pub mod transport;
