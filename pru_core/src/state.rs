//! Device state machine.
//!
//! Lifecycle: Setup → Start → Idle ↔ Running, with Reset for link-loss
//! recovery and SysReset as the terminal hardware-restart state. The
//! previous state is kept for diagnostics only.

use tracing::info;

/// Top-level device state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    /// Build modules from configuration.
    Setup,
    /// Configure on-load modules, start the cycle threads.
    Start,
    /// Waiting for a healthy host link.
    Idle,
    /// Steady-state control.
    Running,
    /// Link lost: clear stale input data, return to Idle.
    Reset,
    /// Terminal: hardware restart.
    SysReset,
}

impl State {
    /// Human-readable state name used in transition logs.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Setup => "Setup",
            Self::Start => "Start",
            Self::Idle => "Idle",
            Self::Running => "Running",
            Self::Reset => "Reset",
            Self::SysReset => "System Reset",
        }
    }
}

/// Current and previously-visited state.
#[derive(Debug, Clone)]
pub struct StateTracker {
    current: State,
    previous: State,
}

impl StateTracker {
    /// Start in Setup.
    pub const fn new() -> Self {
        Self {
            current: State::Setup,
            previous: State::Setup,
        }
    }

    /// Current state.
    #[inline]
    pub const fn current(&self) -> State {
        self.current
    }

    /// State visited before the current one (diagnostics only).
    #[inline]
    pub const fn previous(&self) -> State {
        self.previous
    }

    /// Move to `next`.
    ///
    /// A transition to the current state is a no-op: no log entry, no
    /// change to the previous-state record. Returns whether a real
    /// transition happened.
    pub fn transition_to(&mut self, next: State) -> bool {
        if self.current == next {
            return false;
        }
        info!("## Transitioning to {} state", next.name());
        self.previous = self.current;
        self.current = next;
        true
    }
}

impl Default for StateTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_in_setup() {
        let tracker = StateTracker::new();
        assert_eq!(tracker.current(), State::Setup);
        assert_eq!(tracker.previous(), State::Setup);
    }

    #[test]
    fn transition_updates_previous() {
        let mut tracker = StateTracker::new();
        assert!(tracker.transition_to(State::Start));
        assert_eq!(tracker.current(), State::Start);
        assert_eq!(tracker.previous(), State::Setup);

        assert!(tracker.transition_to(State::Idle));
        assert_eq!(tracker.previous(), State::Start);
    }

    #[test]
    fn same_state_transition_is_a_noop() {
        let mut tracker = StateTracker::new();
        tracker.transition_to(State::Idle);
        tracker.transition_to(State::Running);
        assert_eq!(tracker.previous(), State::Idle);

        // Re-entering Running must not touch the previous-state record.
        assert!(!tracker.transition_to(State::Running));
        assert_eq!(tracker.current(), State::Running);
        assert_eq!(tracker.previous(), State::Idle);
    }

    #[test]
    fn state_names() {
        assert_eq!(State::Setup.name(), "Setup");
        assert_eq!(State::SysReset.name(), "System Reset");
    }
}
