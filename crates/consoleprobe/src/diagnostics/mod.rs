//! Crash diagnostics
//!
//! When the child exits without being asked to, its exit code is classified,
//! the remaining stdout and the stderr tail are captured, and a
//! [`CrashReport`] is handed to a [`ReportSink`].

mod classify;
mod report;
mod sink;

pub use classify::{
    ExitClassification, ExitCode, STATUS_ACCESS_VIOLATION, STATUS_BREAKPOINT,
    STATUS_STACK_OVERFLOW,
};
pub use report::{CrashCapture, CrashReport, DEFAULT_TAIL_LINES};
pub use sink::{FileReportSink, NullReportSink, ReportSink};
