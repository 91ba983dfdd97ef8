//! Real-time execution setup.
//!
//! Sequence, run once before the orchestrator loop:
//! 1. `mlockall(MCL_CURRENT | MCL_FUTURE)` — lock all pages.
//! 2. Prefault stack pages.
//! 3. `sched_setaffinity` — pin to an isolated core.
//! 4. `sched_setscheduler(SCHED_FIFO, prio)` — RT priority.
//!
//! Every step is a no-op without the `rt` feature, so simulation builds run
//! unprivileged.

use thiserror::Error;

/// Error type for RT setup.
#[derive(Debug, Clone, Error)]
pub enum RtError {
    /// An RT system call failed.
    #[error("RT setup error: {0}")]
    Setup(String),
}

/// Lock all current and future memory pages.
#[cfg(feature = "rt")]
fn rt_mlockall() -> Result<(), RtError> {
    use nix::sys::mman::{MlockAllFlags, mlockall};
    mlockall(MlockAllFlags::MCL_CURRENT | MlockAllFlags::MCL_FUTURE)
        .map_err(|e| RtError::Setup(format!("mlockall failed: {e}")))
}

#[cfg(not(feature = "rt"))]
fn rt_mlockall() -> Result<(), RtError> {
    Ok(()) // No-op in simulation mode
}

/// Prefault stack pages so the cycle threads never page-fault.
fn prefault_stack() {
    let mut buf = [0u8; 1024 * 1024];
    for byte in buf.iter_mut() {
        unsafe { core::ptr::write_volatile(byte, 0xFF) };
    }
    core::hint::black_box(&buf);
}

/// Pin the current thread to a specific CPU core.
#[cfg(feature = "rt")]
fn rt_set_affinity(cpu: usize) -> Result<(), RtError> {
    use nix::sched::{CpuSet, sched_setaffinity};
    use nix::unistd::Pid;

    let mut cpuset = CpuSet::new();
    cpuset
        .set(cpu)
        .map_err(|e| RtError::Setup(format!("CpuSet::set({cpu}) failed: {e}")))?;
    sched_setaffinity(Pid::from_raw(0), &cpuset)
        .map_err(|e| RtError::Setup(format!("sched_setaffinity failed: {e}")))
}

#[cfg(not(feature = "rt"))]
fn rt_set_affinity(_cpu: usize) -> Result<(), RtError> {
    Ok(()) // No-op in simulation mode
}

/// Set SCHED_FIFO with the given RT priority.
#[cfg(feature = "rt")]
fn rt_set_scheduler(priority: i32) -> Result<(), RtError> {
    let param = libc::sched_param {
        sched_priority: priority,
    };
    let ret = unsafe { libc::sched_setscheduler(0, libc::SCHED_FIFO, &param) };
    if ret != 0 {
        let err = std::io::Error::last_os_error();
        return Err(RtError::Setup(format!(
            "sched_setscheduler(SCHED_FIFO, {priority}) failed: {err}"
        )));
    }
    Ok(())
}

#[cfg(not(feature = "rt"))]
fn rt_set_scheduler(_priority: i32) -> Result<(), RtError> {
    Ok(()) // No-op in simulation mode
}

/// Perform the full RT setup sequence.
pub fn rt_setup(cpu_core: usize, rt_priority: i32) -> Result<(), RtError> {
    rt_mlockall()?;
    prefault_stack();
    rt_set_affinity(cpu_core)?;
    rt_set_scheduler(rt_priority)?;
    Ok(())
}
