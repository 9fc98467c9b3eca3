//! JSON test suite runner
//!
//! A suite is a JSON array of [`TestCase`]s. Each case sends one command and
//! checks the response against its assertions.
//!
//! ```json
//! [
//!   {
//!     "name": "Device list",
//!     "command": "/device/print",
//!     "assertions": [
//!       {"type": "contains", "value": "energy-meter"},
//!       {"type": "no_error"}
//!     ]
//!   }
//! ]
//! ```

use crate::assertions::Assertion;
use crate::config::SupervisorConfig;
use crate::diagnostics::{CrashReport, ReportSink};
use crate::error::{ProbeError, Result};
use crate::supervisor::ProcessSupervisor;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Characters of the response kept when an assertion fails
pub const RESPONSE_EXCERPT_CHARS: usize = 500;

/// One test case
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TestCase {
    /// Display name
    pub name: Option<String>,

    /// Command to send
    pub command: Option<String>,

    /// Settle delay in seconds
    pub delay: Option<f64>,

    /// Collection timeout in seconds
    pub timeout: Option<f64>,

    /// Checks applied to the response, first failure wins
    pub assertions: Vec<Assertion>,

    /// Abort the suite when this case fails
    pub stop_on_fail: bool,
}

impl TestCase {
    /// Name shown in logs
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("Unnamed test")
    }
}

/// Outcome of one test case
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaseResult {
    /// Case name
    pub name: String,

    /// Whether every assertion held
    pub success: bool,

    /// Command that was sent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,

    /// Response length in characters
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_length: Option<usize>,

    /// Why the case failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Start of the response when an assertion failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,
}

/// Crash details attached to an aborted suite
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrashSummary {
    /// Raw exit code
    pub exit_code: i32,

    /// Classification label
    pub classification: String,

    /// Last stdout lines
    pub output_lines: Vec<String>,

    /// Total stdout lines captured
    pub total_output_lines: usize,
}

impl From<&CrashReport> for CrashSummary {
    fn from(report: &CrashReport) -> Self {
        Self {
            exit_code: report.exit_code.raw(),
            classification: report.classification.to_string(),
            output_lines: report.stdout_tail.clone(),
            total_output_lines: report.stdout_total,
        }
    }
}

/// Outcome of a suite run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SuiteReport {
    /// No case failed and the run was not aborted
    pub success: bool,

    /// Cases that passed
    pub passed: usize,

    /// Cases that failed
    pub failed: usize,

    /// Per-case results in execution order
    pub results: Vec<CaseResult>,

    /// Why the run was aborted
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Crash that aborted the run
    #[serde(skip_serializing_if = "Option::is_none")]
    pub crash: Option<CrashSummary>,
}

impl SuiteReport {
    fn aborted(error: impl Into<String>, results: Vec<CaseResult>) -> Self {
        let passed = results.iter().filter(|r| r.success).count();
        Self {
            success: false,
            passed,
            failed: results.len() - passed,
            results,
            error: Some(error.into()),
            crash: None,
        }
    }
}

/// Load a suite from a JSON file
pub async fn load_suite(path: impl AsRef<Path>) -> Result<Vec<TestCase>> {
    let text = tokio::fs::read_to_string(path).await?;
    Ok(serde_json::from_str(&text)?)
}

/// Runs suites against a console process
pub struct SuiteRunner {
    config: SupervisorConfig,
    sink: Option<Arc<dyn ReportSink>>,
}

impl SuiteRunner {
    /// Create a runner that launches its own console
    pub fn new(config: SupervisorConfig) -> Self {
        Self { config, sink: None }
    }

    /// Route crash reports to `sink`
    pub fn with_sink(mut self, sink: Arc<dyn ReportSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Launch a console, run `cases` against it and stop it
    pub async fn run(&self, cases: &[TestCase]) -> SuiteReport {
        tracing::info!("Running {} tests...", cases.len());

        let started = match &self.sink {
            Some(sink) => {
                ProcessSupervisor::start_with_sink(self.config.clone(), Arc::clone(sink)).await
            }
            None => ProcessSupervisor::start(self.config.clone()).await,
        };

        let mut supervisor = match started {
            Ok(supervisor) => supervisor,
            Err(e) => {
                let mut report =
                    SuiteReport::aborted(format!("Failed to start console: {}", e), Vec::new());
                if let ProbeError::ExitedDuringStartup {
                    report: Some(crash),
                    ..
                } = &e
                {
                    report.crash = Some(CrashSummary::from(crash.as_ref()));
                }
                return report;
            }
        };

        let report = self.run_on(&mut supervisor, cases).await;
        supervisor.stop().await;
        report
    }

    /// Run `cases` against an already running console
    pub async fn run_on(
        &self,
        supervisor: &mut ProcessSupervisor,
        cases: &[TestCase],
    ) -> SuiteReport {
        let mut results = Vec::with_capacity(cases.len());

        for (i, case) in cases.iter().enumerate() {
            if !supervisor.is_running().await {
                let Some(crash) = supervisor.crash_report() else {
                    return SuiteReport::aborted("Console is not running", results);
                };
                tracing::error!("[CRASH] console crashed ({})", crash.summary());
                let skip = crash.stdout_tail.len().saturating_sub(10);
                for line in &crash.stdout_tail[skip..] {
                    tracing::error!("  {}", line);
                }
                let mut report = SuiteReport::aborted("Process crashed during testing", results);
                report.crash = Some(CrashSummary::from(crash));
                return report;
            }

            tracing::info!("[{}/{}] {}", i + 1, cases.len(), case.display_name());
            let result = self.run_case(supervisor, case).await;

            if result.success {
                tracing::info!("  [PASS]");
            } else {
                tracing::warn!(
                    "  [FAIL]: {}",
                    result.error.as_deref().unwrap_or("Unknown error")
                );
            }

            let stop = !result.success && case.stop_on_fail;
            results.push(result);
            if stop {
                break;
            }
        }

        let passed = results.iter().filter(|r| r.success).count();
        let failed = results.len() - passed;
        tracing::info!("Results: {} passed, {} failed", passed, failed);

        SuiteReport {
            success: failed == 0,
            passed,
            failed,
            results,
            error: None,
            crash: None,
        }
    }

    async fn run_case(&self, supervisor: &mut ProcessSupervisor, case: &TestCase) -> CaseResult {
        let mut result = CaseResult {
            name: case.display_name().to_string(),
            ..Default::default()
        };

        let Some(command) = case.command.as_deref() else {
            result.error = Some("No command specified".to_string());
            return result;
        };
        result.command = Some(command.to_string());

        let settle = seconds(case.delay).unwrap_or(self.config.collector.settle_delay);
        let timeout = seconds(case.timeout).unwrap_or(self.config.collector.timeout);

        let response = match supervisor.send_command(command, settle, timeout).await {
            Ok(response) => response,
            Err(e) => {
                result.error = Some(e.to_string());
                return result;
            }
        };

        for assertion in &case.assertions {
            let failure = match assertion.check(&response) {
                Ok(true) => continue,
                Ok(false) => format!("Assertion failed: {}", assertion),
                Err(e) => format!("Assertion failed: {}: {}", assertion, e),
            };
            result.error = Some(failure);
            result.response = Some(response.chars().take(RESPONSE_EXCERPT_CHARS).collect());
            return result;
        }

        result.success = true;
        result.response_length = Some(response.chars().count());
        result
    }
}

/// Negative, non-finite and out-of-range values yield `None`
fn seconds(value: Option<f64>) -> Option<Duration> {
    value.and_then(|secs| Duration::try_from_secs_f64(secs).ok())
}
