//! Supervisor and test harness for interactive console programs
//!
//! Drives a long-running child process over line-oriented stdin/stdout,
//! decides when a response is complete without any end-of-response marker,
//! and captures forensic diagnostics when the child dies unexpectedly.
//!
//! # Key Features
//!
//! - **Process supervision**: launch, liveness, graceful shutdown
//! - **Response collection**: adaptive, quiescence-based completion
//! - **Crash diagnostics**: exit classification, stderr/stdout tails,
//!   assertion extraction, persisted report
//! - **Harness**: persistent sessions, JSON test suites, quick runs
//!
//! # Architecture
//!
//! 1. **Transport Layer** (`consoleprobe-transport`): pipes, reader tasks,
//!    termination

#![deny(unsafe_code)]
//! 2. **Supervisor Layer** (this crate): state machine, collector,
//!    diagnostics
//! 3. **Harness Layer** (this crate): [`ConsoleSession`], [`SuiteRunner`],
//!    [`quick_run`]
//!
//! # Usage Example
//!
//! ```ignore
//! use consoleprobe::{ProcessSupervisor, SupervisorConfig};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = SupervisorConfig::new("bin/Debug/Console").with_project_root(".");
//!     let mut console = ProcessSupervisor::start(config).await?;
//!
//!     let response = console.send("/device/print").await?;
//!     println!("{}", response);
//!
//!     console.stop().await;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]

pub mod assertions;
pub mod collector;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod quick;
pub mod session;
pub mod state;
pub mod suite;
pub mod supervisor;

// Re-export commonly used types
pub use assertions::Assertion;
pub use collector::{Collected, CollectorConfig, ResponseCollector};
pub use config::{DiagnosticsConfig, SupervisorConfig};
pub use diagnostics::{
    CrashReport, ExitClassification, ExitCode, FileReportSink, NullReportSink, ReportSink,
};
pub use error::{ProbeError, Result};
pub use quick::{QuickRun, quick_run};
pub use session::{CommandRecord, ConsoleSession};
pub use state::{ProcessEvent, ProcessState, Transition};
pub use suite::{CaseResult, CrashSummary, SuiteReport, SuiteRunner, TestCase, load_suite};
pub use supervisor::ProcessSupervisor;

pub use consoleprobe_transport::TailSnapshot;
