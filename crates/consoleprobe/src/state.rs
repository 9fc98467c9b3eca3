//! Process lifecycle state machine
//!
//! Crash detection is a state transition rather than a side effect of a
//! liveness query: the supervisor feeds [`ProcessEvent`]s into
//! [`ProcessState::apply`] and runs crash capture only when the returned
//! [`Transition`] asks for it.

use crate::diagnostics::ExitCode;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of the supervised process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "state", content = "exit_code")]
pub enum ProcessState {
    /// Started and not known to have exited
    Running,

    /// Stopped on request
    StoppedClean,

    /// Exited without being asked to
    Crashed(ExitCode),
}

/// Something the supervisor observed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessEvent {
    /// The OS reported that the process exited
    ExitObserved(ExitCode),

    /// The caller asked for shutdown
    StopRequested,
}

/// Outcome of applying an event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    /// State after the event
    pub next: ProcessState,

    /// Whether crash diagnostics must be captured now
    pub capture_crash: bool,
}

impl ProcessState {
    /// Apply an event
    ///
    /// Terminal states absorb every event, so a crash is captured exactly
    /// once and a clean stop can never turn into a crash.
    pub fn apply(self, event: ProcessEvent) -> Transition {
        match (self, event) {
            (Self::Running, ProcessEvent::ExitObserved(code)) => Transition {
                next: Self::Crashed(code),
                capture_crash: true,
            },
            (Self::Running, ProcessEvent::StopRequested) => Transition {
                next: Self::StoppedClean,
                capture_crash: false,
            },
            (terminal, _) => Transition {
                next: terminal,
                capture_crash: false,
            },
        }
    }

    /// Whether the process is believed to be alive
    pub fn is_running(self) -> bool {
        matches!(self, Self::Running)
    }

    /// Exit code of a crash
    pub fn crash_code(self) -> Option<ExitCode> {
        match self {
            Self::Crashed(code) => Some(code),
            _ => None,
        }
    }
}

impl fmt::Display for ProcessState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Running => f.write_str("running"),
            Self::StoppedClean => f.write_str("stopped"),
            Self::Crashed(code) => write!(f, "crashed with exit code {}", code),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_exit_while_running_captures_once() {
        let first = ProcessState::Running.apply(ProcessEvent::ExitObserved(ExitCode(-6)));
        assert_eq!(first.next, ProcessState::Crashed(ExitCode(-6)));
        assert!(first.capture_crash);

        let second = first.next.apply(ProcessEvent::ExitObserved(ExitCode(-6)));
        assert_eq!(second.next, first.next);
        assert!(!second.capture_crash);
    }

    #[test]
    fn test_stop_is_clean() {
        let t = ProcessState::Running.apply(ProcessEvent::StopRequested);
        assert_eq!(t.next, ProcessState::StoppedClean);
        assert!(!t.capture_crash);
    }

    #[rstest]
    #[case(ProcessState::StoppedClean, ProcessEvent::ExitObserved(ExitCode(0)))]
    #[case(ProcessState::StoppedClean, ProcessEvent::StopRequested)]
    #[case(ProcessState::Crashed(ExitCode(1)), ProcessEvent::StopRequested)]
    #[case(ProcessState::Crashed(ExitCode(1)), ProcessEvent::ExitObserved(ExitCode(2)))]
    fn test_terminal_states_absorb(#[case] state: ProcessState, #[case] event: ProcessEvent) {
        let t = state.apply(event);
        assert_eq!(t.next, state);
        assert!(!t.capture_crash);
    }

    #[test]
    fn test_accessors() {
        assert!(ProcessState::Running.is_running());
        assert!(!ProcessState::StoppedClean.is_running());
        assert_eq!(
            ProcessState::Crashed(ExitCode(3)).crash_code(),
            Some(ExitCode(3))
        );
        assert_eq!(ProcessState::Running.crash_code(), None);
        assert_eq!(
            ProcessState::Crashed(ExitCode(3)).to_string(),
            "crashed with exit code 3 (0x00000003)"
        );
    }
}
