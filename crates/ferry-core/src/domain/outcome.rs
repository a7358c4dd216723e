//! Outcome model: where the poll loop is, and why it stopped.

use std::fmt;

/// Poll loop state machine.
///
/// `Idle -> Polling -> Handling -> Forwarding -> Committing -> (Idle | Terminated)`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Idle,
    Polling,
    Handling,
    Forwarding,
    Committing,
    Terminated,
}

/// Why the poll loop reached `Terminated`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StopReason {
    FatalRead,
    FatalWrite,
    FatalCommit,
    HandlerError,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StopReason::FatalRead => "fatal-read",
            StopReason::FatalWrite => "fatal-write",
            StopReason::FatalCommit => "fatal-commit",
            StopReason::HandlerError => "handler-error",
        };
        f.write_str(s)
    }
}

/// Terminal state reached by the poll loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopOutcome {
    Running,
    Stopped(StopReason),
}

impl LoopOutcome {
    pub fn is_terminal(&self) -> bool {
        matches!(self, LoopOutcome::Stopped(_))
    }

    pub fn reason(&self) -> Option<StopReason> {
        match self {
            LoopOutcome::Running => None,
            LoopOutcome::Stopped(reason) => Some(*reason),
        }
    }
}
