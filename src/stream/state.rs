use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

/// Lifecycle of a [`super::reader::StreamReader`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReaderState {
    NotStarted,
    Running,
    Stopping,
    Stopped,
    Failed,
}

impl ReaderState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => ReaderState::NotStarted,
            1 => ReaderState::Running,
            2 => ReaderState::Stopping,
            3 => ReaderState::Stopped,
            _ => ReaderState::Failed,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            ReaderState::NotStarted => 0,
            ReaderState::Running => 1,
            ReaderState::Stopping => 2,
            ReaderState::Stopped => 3,
            ReaderState::Failed => 4,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, ReaderState::Stopped | ReaderState::Failed)
    }
}

impl fmt::Display for ReaderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ReaderState::NotStarted => "not_started",
            ReaderState::Running => "running",
            ReaderState::Stopping => "stopping",
            ReaderState::Stopped => "stopped",
            ReaderState::Failed => "failed",
        };
        f.write_str(label)
    }
}

/// Atomic holder for a reader's state, written by the reader only.
#[derive(Debug)]
pub(crate) struct StateCell {
    value: AtomicU8,
}

impl StateCell {
    pub(crate) fn new(state: ReaderState) -> Self {
        Self {
            value: AtomicU8::new(state.as_u8()),
        }
    }

    pub(crate) fn load(&self) -> ReaderState {
        ReaderState::from_u8(self.value.load(Ordering::SeqCst))
    }

    pub(crate) fn store(&self, state: ReaderState) {
        self.value.store(state.as_u8(), Ordering::SeqCst);
    }

    /// Moves from `from` to `to`; returns `false` if the state was not `from`.
    pub(crate) fn transition(&self, from: ReaderState, to: ReaderState) -> bool {
        self.value
            .compare_exchange(from.as_u8(), to.as_u8(), Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }
}
