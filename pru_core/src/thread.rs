//! Fixed-frequency cycle threads.
//!
//! Each cycle thread owns a frozen, registration-ordered module list and a
//! periodic pacer standing in for the hardware timer interrupt. Per period
//! it runs the primary phase over every module, then the secondary phase
//! over the modules that opted in — both in registration order, which is the
//! dependency-resolution contract configuration authors rely on.
//!
//! Registration happens during Setup only; the list is frozen when the
//! thread starts, and there is no suspend, removal, or re-ordering at
//! runtime.
//!
//! Pacing is absolute-time: with the `rt` feature,
//! `clock_nanosleep(TIMER_ABSTIME)` on `CLOCK_MONOTONIC`; otherwise an
//! `Instant`-based sleep loop good enough for simulation.

use crate::modules::Module;
use heapless::Vec as FixedVec;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::thread::JoinHandle;
use thiserror::Error;
use tracing::info;

/// Capacity of one thread's module list.
pub const MAX_THREAD_MODULES: usize = 32;

/// Errors from cycle-thread management.
#[derive(Debug, Clone, Error)]
pub enum ThreadError {
    /// The thread is already running; its module list is frozen.
    #[error("cycle thread '{0}' already started")]
    AlreadyStarted(&'static str),

    /// The module list is at capacity.
    #[error("cycle thread '{0}' module list full")]
    ListFull(&'static str),

    /// The OS thread could not be spawned.
    #[error("cycle thread '{0}' failed to spawn: {1}")]
    SpawnFailed(&'static str, String),
}

/// O(1) per-period timing statistics, shared with the pacer thread.
#[derive(Debug, Default)]
pub struct CycleStats {
    periods: AtomicU64,
    overruns: AtomicU64,
    max_period_ns: AtomicI64,
}

impl CycleStats {
    /// Record one period. O(1), no allocation.
    #[inline]
    fn record(&self, duration_ns: i64, budget_ns: i64) {
        self.periods.fetch_add(1, Ordering::Relaxed);
        self.max_period_ns.fetch_max(duration_ns, Ordering::Relaxed);
        if duration_ns > budget_ns {
            self.overruns.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Total periods executed.
    pub fn periods(&self) -> u64 {
        self.periods.load(Ordering::Relaxed)
    }

    /// Periods that exceeded the budget.
    pub fn overruns(&self) -> u64 {
        self.overruns.load(Ordering::Relaxed)
    }

    /// Longest observed period body [ns].
    pub fn max_period_ns(&self) -> i64 {
        self.max_period_ns.load(Ordering::Relaxed)
    }
}

/// One fixed-cadence module pipeline.
pub struct CycleThread {
    name: &'static str,
    frequency_hz: u32,
    modules: FixedVec<Box<dyn Module>, MAX_THREAD_MODULES>,
    post_indices: FixedVec<usize, MAX_THREAD_MODULES>,
    registered: usize,
    post_registered: usize,
    run_flag: Arc<AtomicBool>,
    stats: Arc<CycleStats>,
    handle: Option<JoinHandle<()>>,
    started: bool,
}

impl CycleThread {
    /// Create a stopped cycle thread.
    pub fn new(name: &'static str, frequency_hz: u32) -> Self {
        Self {
            name,
            frequency_hz,
            modules: FixedVec::new(),
            post_indices: FixedVec::new(),
            registered: 0,
            post_registered: 0,
            run_flag: Arc::new(AtomicBool::new(false)),
            stats: Arc::new(CycleStats::default()),
            handle: None,
            started: false,
        }
    }

    /// Thread name.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Target frequency [Hz].
    pub fn frequency_hz(&self) -> u32 {
        self.frequency_hz
    }

    /// Retarget the frequency. Only allowed before the thread starts.
    pub fn set_frequency(&mut self, frequency_hz: u32) -> Result<(), ThreadError> {
        if self.started {
            return Err(ThreadError::AlreadyStarted(self.name));
        }
        self.frequency_hz = frequency_hz;
        Ok(())
    }

    /// Number of registered modules.
    pub fn module_count(&self) -> usize {
        self.registered
    }

    /// Number of modules in the secondary phase.
    pub fn post_count(&self) -> usize {
        self.post_registered
    }

    /// Shared timing statistics.
    pub fn stats(&self) -> Arc<CycleStats> {
        Arc::clone(&self.stats)
    }

    /// Append a module to the pipeline.
    ///
    /// Modules run in registration order; a module whose [`uses_post`] is
    /// true is also appended to the secondary phase.
    ///
    /// [`uses_post`]: Module::uses_post
    pub fn register(&mut self, module: Box<dyn Module>) -> Result<(), ThreadError> {
        if self.started {
            return Err(ThreadError::AlreadyStarted(self.name));
        }
        let index = self.modules.len();
        let uses_post = module.uses_post();
        self.modules
            .push(module)
            .map_err(|_| ThreadError::ListFull(self.name))?;
        if uses_post {
            self.post_indices
                .push(index)
                .map_err(|_| ThreadError::ListFull(self.name))?;
            self.post_registered += 1;
        }
        self.registered += 1;
        Ok(())
    }

    /// Freeze the module list and start the pacer thread.
    ///
    /// May be called once per process lifetime.
    pub fn start(&mut self) -> Result<(), ThreadError> {
        if self.started {
            return Err(ThreadError::AlreadyStarted(self.name));
        }
        self.started = true;
        self.run_flag.store(true, Ordering::SeqCst);

        let period_ns = 1_000_000_000u64 / u64::from(self.frequency_hz.max(1));
        let modules = core::mem::take(&mut self.modules);
        let post_indices = core::mem::take(&mut self.post_indices);
        let run_flag = Arc::clone(&self.run_flag);
        let stats = Arc::clone(&self.stats);
        let name = self.name;

        let handle = std::thread::Builder::new()
            .name(format!("{name}-cycle"))
            .spawn(move || run_cycles(period_ns, modules, post_indices, run_flag, stats))
            .map_err(|e| ThreadError::SpawnFailed(self.name, e.to_string()))?;
        self.handle = Some(handle);

        info!(
            "Cycle thread '{}' running at {}Hz with {} modules ({} post)",
            self.name, self.frequency_hz, self.registered, self.post_registered
        );
        Ok(())
    }

    /// Stop the pacer thread and join it (shutdown and test teardown).
    pub fn stop(&mut self) {
        self.run_flag.store(false, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for CycleThread {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Period body shared by both pacers.
#[inline]
fn run_period(
    modules: &mut FixedVec<Box<dyn Module>, MAX_THREAD_MODULES>,
    post_indices: &FixedVec<usize, MAX_THREAD_MODULES>,
) {
    for module in modules.iter_mut() {
        module.update();
    }
    for &index in post_indices.iter() {
        modules[index].slow_update();
    }
}

/// Simulation pacer: `Instant`-based absolute scheduling.
#[cfg(not(feature = "rt"))]
fn run_cycles(
    period_ns: u64,
    mut modules: FixedVec<Box<dyn Module>, MAX_THREAD_MODULES>,
    post_indices: FixedVec<usize, MAX_THREAD_MODULES>,
    run_flag: Arc<AtomicBool>,
    stats: Arc<CycleStats>,
) {
    use std::time::{Duration, Instant};

    let period = Duration::from_nanos(period_ns);
    let mut next_wake = Instant::now() + period;

    while run_flag.load(Ordering::Relaxed) {
        let started = Instant::now();
        run_period(&mut modules, &post_indices);
        stats.record(started.elapsed().as_nanos() as i64, period_ns as i64);

        let now = Instant::now();
        if next_wake > now {
            std::thread::sleep(next_wake - now);
            next_wake += period;
        } else {
            // Fell behind; rebase instead of replaying missed periods.
            next_wake = now + period;
        }
    }
}

/// RT pacer: `clock_nanosleep(TIMER_ABSTIME)` on `CLOCK_MONOTONIC` for
/// drift-free pacing.
#[cfg(feature = "rt")]
fn run_cycles(
    period_ns: u64,
    mut modules: FixedVec<Box<dyn Module>, MAX_THREAD_MODULES>,
    post_indices: FixedVec<usize, MAX_THREAD_MODULES>,
    run_flag: Arc<AtomicBool>,
    stats: Arc<CycleStats>,
) {
    use nix::time::{ClockId, clock_gettime, clock_nanosleep, ClockNanosleepFlags};

    let clock = ClockId::CLOCK_MONOTONIC;
    let Ok(mut next_wake) = clock_gettime(clock) else {
        return;
    };

    while run_flag.load(Ordering::Relaxed) {
        next_wake = timespec_add_ns(next_wake, period_ns as i64);

        let Ok(period_start) = clock_gettime(clock) else {
            return;
        };
        run_period(&mut modules, &post_indices);
        if let Ok(period_end) = clock_gettime(clock) {
            stats.record(
                timespec_diff_ns(&period_end, &period_start),
                period_ns as i64,
            );
        }

        let _ = clock_nanosleep(clock, ClockNanosleepFlags::TIMER_ABSTIME, &next_wake);
    }
}

/// Add nanoseconds to a TimeSpec.
#[cfg(feature = "rt")]
fn timespec_add_ns(ts: nix::sys::time::TimeSpec, ns: i64) -> nix::sys::time::TimeSpec {
    use nix::sys::time::TimeSpec;
    let mut secs = ts.tv_sec();
    let mut nanos = ts.tv_nsec() + ns;
    while nanos >= 1_000_000_000 {
        secs += 1;
        nanos -= 1_000_000_000;
    }
    TimeSpec::new(secs, nanos)
}

/// Compute the difference (a - b) in nanoseconds.
#[cfg(feature = "rt")]
fn timespec_diff_ns(a: &nix::sys::time::TimeSpec, b: &nix::sys::time::TimeSpec) -> i64 {
    (a.tv_sec() - b.tv_sec()) * 1_000_000_000 + (a.tv_nsec() - b.tv_nsec())
}
