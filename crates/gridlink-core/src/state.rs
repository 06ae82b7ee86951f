//! Lifecycle states shared by hooks and paths.

use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

/// Lifecycle state of a configurable object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum State {
    Destroyed = 0,
    Initialized = 1,
    Parsed = 2,
    Checked = 3,
    Prepared = 4,
    PendingConnect = 5,
    Started = 6,
    Pausing = 7,
    Paused = 8,
    Resuming = 9,
    Stopping = 10,
    Stopped = 11,
    Error = 12,
}

impl State {
    /// Human readable name.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            State::Destroyed => "destroyed",
            State::Initialized => "initialized",
            State::Parsed => "parsed",
            State::Checked => "checked",
            State::Prepared => "prepared",
            State::PendingConnect => "pending_connect",
            State::Started => "started",
            State::Pausing => "pausing",
            State::Paused => "paused",
            State::Resuming => "resuming",
            State::Stopping => "stopping",
            State::Stopped => "stopped",
            State::Error => "error",
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            0 => State::Destroyed,
            1 => State::Initialized,
            2 => State::Parsed,
            3 => State::Checked,
            4 => State::Prepared,
            5 => State::PendingConnect,
            6 => State::Started,
            7 => State::Pausing,
            8 => State::Paused,
            9 => State::Resuming,
            10 => State::Stopping,
            11 => State::Stopped,
            _ => State::Error,
        }
    }

    /// Whether the object is inside its runtime-active window.
    #[must_use]
    pub fn is_running(&self) -> bool {
        matches!(
            self,
            State::PendingConnect
                | State::Started
                | State::Pausing
                | State::Paused
                | State::Resuming
        )
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A [`State`] that can be observed from other threads.
#[derive(Debug)]
pub struct AtomicState(AtomicU8);

impl AtomicState {
    /// Create a cell holding `state`.
    #[must_use]
    pub fn new(state: State) -> Self {
        Self(AtomicU8::new(state as u8))
    }

    /// Current state.
    #[must_use]
    pub fn get(&self) -> State {
        State::from_u8(self.0.load(Ordering::Acquire))
    }

    /// Replace the state.
    pub fn set(&self, state: State) {
        self.0.store(state as u8, Ordering::Release);
    }

    /// Move from `from` to `to`; returns the actual state on mismatch.
    ///
    /// # Errors
    ///
    /// Returns the current state if it is not `from`.
    pub fn transition(&self, from: State, to: State) -> Result<(), State> {
        self.0
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
            .map_err(State::from_u8)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_atomic_state_transition() {
        let state = AtomicState::new(State::Started);
        assert_eq!(state.transition(State::Started, State::Paused), Ok(()));
        assert_eq!(state.transition(State::Started, State::Paused), Err(State::Paused));
        assert_eq!(state.get(), State::Paused);
        assert!(state.get().is_running());
    }

    #[test]
    fn test_state_ordering_follows_lifecycle() {
        assert!(State::Parsed < State::Checked);
        assert!(State::Checked < State::Prepared);
        assert!(State::Prepared < State::Started);
        assert_eq!(State::Stopped.to_string(), "stopped");
    }
}
