//! Exit code representation and classification

use serde::{Deserialize, Serialize};
use std::fmt;
use std::process::ExitStatus;

/// NTSTATUS raised by a breakpoint or failed assertion (`__debugbreak`)
pub const STATUS_BREAKPOINT: u32 = 0x8000_0003;

/// NTSTATUS for a null pointer or invalid memory access
pub const STATUS_ACCESS_VIOLATION: u32 = 0xC000_0005;

/// NTSTATUS for stack exhaustion
pub const STATUS_STACK_OVERFLOW: u32 = 0xC000_00FD;

const SIGTRAP: i32 = 5;
const SIGABRT: i32 = 6;
const SIGSEGV: i32 = 11;
#[cfg(any(target_os = "linux", target_os = "android"))]
const SIGBUS: i32 = 7;
#[cfg(not(any(target_os = "linux", target_os = "android")))]
const SIGBUS: i32 = 10;

/// Raw exit code of the child
///
/// Holds the process exit code, or the negated signal number when the
/// process was killed by a signal on Unix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExitCode(pub i32);

impl ExitCode {
    /// Build from an OS exit status
    pub fn from_status(status: ExitStatus) -> Self {
        if let Some(code) = status.code() {
            return Self(code);
        }

        #[cfg(unix)]
        {
            use std::os::unix::process::ExitStatusExt;
            if let Some(signal) = status.signal() {
                return Self(-signal);
            }
        }

        Self(-1)
    }

    /// Raw value
    pub fn raw(self) -> i32 {
        self.0
    }

    /// Signal number, when the code encodes one
    pub fn signal(self) -> Option<i32> {
        (self.0 < 0 && self.0 > -64).then_some(-self.0)
    }

    /// Zero-padded 32-bit hexadecimal form, e.g. `0xC0000005`
    pub fn hex(self) -> String {
        format!("0x{:08X}", self.0 as u32)
    }
}

impl From<ExitStatus> for ExitCode {
    fn from(status: ExitStatus) -> Self {
        Self::from_status(status)
    }
}

impl fmt::Display for ExitCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.0, self.hex())
    }
}

/// What kind of failure an exit code points to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitClassification {
    /// Breakpoint trap or assertion abort
    BreakpointOrAssertion,

    /// Invalid memory access
    AccessViolation,

    /// Stack exhaustion
    StackOverflow,

    /// Anything else
    Unknown,
}

impl ExitClassification {
    /// Classify a raw exit code
    pub fn classify(code: ExitCode) -> Self {
        match code.0 as u32 {
            STATUS_BREAKPOINT => return Self::BreakpointOrAssertion,
            STATUS_ACCESS_VIOLATION => return Self::AccessViolation,
            STATUS_STACK_OVERFLOW => return Self::StackOverflow,
            _ => {}
        }

        match code.signal() {
            Some(SIGTRAP | SIGABRT) => Self::BreakpointOrAssertion,
            Some(SIGSEGV | SIGBUS) => Self::AccessViolation,
            _ => Self::Unknown,
        }
    }

    /// Line written under the exit code analysis heading of a crash report
    pub fn analysis(self) -> &'static str {
        match self {
            Self::BreakpointOrAssertion => {
                "STATUS_BREAKPOINT - Likely an assertion failure or debug break"
            }
            Self::AccessViolation => "ACCESS_VIOLATION - Null pointer or invalid memory access",
            Self::StackOverflow => "STACK_OVERFLOW - Stack overflow",
            Self::Unknown => "Unknown exit code",
        }
    }
}

impl fmt::Display for ExitClassification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::BreakpointOrAssertion => "breakpoint/assertion",
            Self::AccessViolation => "access-violation",
            Self::StackOverflow => "stack-overflow",
            Self::Unknown => "unknown",
        };
        f.write_str(label)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(STATUS_BREAKPOINT as i32, ExitClassification::BreakpointOrAssertion)]
    #[case(-1073741819, ExitClassification::AccessViolation)]
    #[case(-1073741571, ExitClassification::StackOverflow)]
    #[case(-6, ExitClassification::BreakpointOrAssertion)]
    #[case(-5, ExitClassification::BreakpointOrAssertion)]
    #[case(-11, ExitClassification::AccessViolation)]
    #[case(1, ExitClassification::Unknown)]
    #[case(0, ExitClassification::Unknown)]
    #[case(-9, ExitClassification::Unknown)]
    #[case(134, ExitClassification::Unknown)]
    fn test_classify(#[case] raw: i32, #[case] expected: ExitClassification) {
        assert_eq!(ExitClassification::classify(ExitCode(raw)), expected);
    }

    #[test]
    fn test_hex_formatting() {
        assert_eq!(ExitCode(-1073741819).hex(), "0xC0000005");
        assert_eq!(ExitCode(1).hex(), "0x00000001");
        assert_eq!(ExitCode(STATUS_BREAKPOINT as i32).hex(), "0x80000003");
        assert_eq!(ExitCode(-6).hex(), "0xFFFFFFFA");
    }

    #[test]
    fn test_signal_extraction() {
        assert_eq!(ExitCode(-11).signal(), Some(11));
        assert_eq!(ExitCode(3).signal(), None);
        assert_eq!(ExitCode(-1073741819).signal(), None);
    }

    #[test]
    fn test_display() {
        assert_eq!(ExitCode(2).to_string(), "2 (0x00000002)");
        assert_eq!(
            ExitClassification::BreakpointOrAssertion.to_string(),
            "breakpoint/assertion"
        );
        assert_eq!(ExitClassification::Unknown.to_string(), "unknown");
    }

    #[cfg(unix)]
    #[test]
    fn test_from_signalled_status() {
        use std::os::unix::process::ExitStatusExt;

        // Raw wait status for "killed by SIGSEGV".
        let status = ExitStatus::from_raw(11);
        assert_eq!(ExitCode::from_status(status), ExitCode(-11));

        // Raw wait status for "exited with 2".
        let status = ExitStatus::from_raw(2 << 8);
        assert_eq!(ExitCode::from_status(status), ExitCode(2));
    }
}
