//! Persistent command session
//!
//! A [`ConsoleSession`] keeps one console alive across many commands,
//! remembers every response and offers expectation helpers over the last one.
//! It only uses the public [`ProcessSupervisor`] API.

use crate::assertions::Assertion;
use crate::config::SupervisorConfig;
use crate::diagnostics::{CrashReport, ReportSink};
use crate::error::{ProbeError, Result};
use crate::supervisor::ProcessSupervisor;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// One executed command
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandRecord {
    /// Command text as sent
    pub command: String,

    /// Full response
    pub response: String,

    /// Response length in characters
    pub length: usize,

    /// Time spent waiting for the response
    pub elapsed: Duration,
}

/// Long-lived session over one console process
pub struct ConsoleSession {
    config: SupervisorConfig,
    sink: Option<Arc<dyn ReportSink>>,
    supervisor: Option<ProcessSupervisor>,
    last_crash: Option<CrashReport>,
    crash_logged: bool,
    last_response: String,
    history: Vec<CommandRecord>,
    verbose: bool,
}

impl ConsoleSession {
    /// Create a session; nothing is launched until [`ConsoleSession::start`]
    pub fn new(config: SupervisorConfig) -> Self {
        Self {
            config,
            sink: None,
            supervisor: None,
            last_crash: None,
            crash_logged: false,
            last_response: String::new(),
            history: Vec::new(),
            verbose: true,
        }
    }

    /// Route crash reports to `sink` instead of the default report file
    pub fn with_sink(mut self, sink: Arc<dyn ReportSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Launch the console unless it is already running
    pub async fn start(&mut self) -> Result<()> {
        if self.is_running().await {
            tracing::info!("session already running");
            return Ok(());
        }
        // Release whatever is left of a crashed process.
        self.stop().await;

        let started = match &self.sink {
            Some(sink) => {
                ProcessSupervisor::start_with_sink(self.config.clone(), Arc::clone(sink)).await
            }
            None => ProcessSupervisor::start(self.config.clone()).await,
        };

        match started {
            Ok(supervisor) => {
                self.supervisor = Some(supervisor);
                self.crash_logged = false;
                tracing::info!("session ready");
                Ok(())
            }
            Err(err) => {
                if let ProbeError::ExitedDuringStartup {
                    report: Some(report),
                    ..
                } = &err
                {
                    log_last_output(report, 20);
                    self.last_crash = Some((**report).clone());
                }
                Err(err)
            }
        }
    }

    /// Stop the console
    pub async fn stop(&mut self) {
        if let Some(mut supervisor) = self.supervisor.take() {
            supervisor.stop().await;
            if let Some(report) = supervisor.crash_report() {
                self.last_crash = Some(report.clone());
            }
            tracing::info!("session stopped");
        }
    }

    /// Whether the console is alive and accepting commands
    ///
    /// A crash is logged, with the last output lines, the first time it is
    /// observed.
    pub async fn is_running(&mut self) -> bool {
        let Some(supervisor) = self.supervisor.as_mut() else {
            return false;
        };

        if !supervisor.is_running().await {
            if !self.crash_logged
                && let Some(report) = supervisor.crash_report()
            {
                tracing::error!("console crashed ({})", report.summary());
                log_last_output(report, 10);
                self.last_crash = Some(report.clone());
                self.crash_logged = true;
            }
            return false;
        }

        supervisor.is_connected()
    }

    /// Run a command with the configured settle delay and timeout
    pub async fn cmd(&mut self, command: &str) -> Result<String> {
        let settle = self.config.collector.settle_delay;
        let timeout = self.config.collector.timeout;
        self.cmd_with(command, settle, timeout).await
    }

    /// Run a command and record it in the history
    pub async fn cmd_with(
        &mut self,
        command: &str,
        settle_delay: Duration,
        timeout: Duration,
    ) -> Result<String> {
        if !self.is_running().await {
            return Err(match self.crash_report() {
                Some(report) => ProbeError::CrashDetected(report.summary()),
                None => ProbeError::NotConnected,
            });
        }
        let supervisor = self.supervisor.as_mut().ok_or(ProbeError::NotConnected)?;

        if self.verbose {
            tracing::info!("> {}", command);
        }

        let start = Instant::now();
        let response = supervisor
            .send_command(command, settle_delay, timeout)
            .await?;
        let elapsed = start.elapsed();

        let length = response.chars().count();
        if self.verbose {
            let preview: String = response.chars().take(300).collect::<String>().replace('\n', " ");
            tracing::info!(
                "  [{} chars, {:.2}s] {}...",
                length,
                elapsed.as_secs_f64(),
                preview
            );
        }

        self.history.push(CommandRecord {
            command: command.to_string(),
            response: response.clone(),
            length,
            elapsed,
        });
        self.last_response = response.clone();

        Ok(response)
    }

    /// Response to the most recent command
    pub fn last_response(&self) -> &str {
        &self.last_response
    }

    /// The last `count` commands, oldest first
    pub fn history(&self, count: usize) -> &[CommandRecord] {
        let skip = self.history.len().saturating_sub(count);
        &self.history[skip..]
    }

    /// Evaluate an assertion against the last response
    pub fn expect(&self, assertion: &Assertion) -> Result<bool> {
        let passed = assertion.check(&self.last_response)?;
        self.report_expectation(passed, &assertion.to_string());
        Ok(passed)
    }

    /// The last response contains `text`
    ///
    /// `msg` replaces the default description in the `[PASS]`/`[FAIL]` line.
    pub fn expect_contains(&self, text: &str, msg: Option<&str>) -> bool {
        let passed = self.last_response.contains(text);
        self.report_expectation(passed, &describe(msg, || format!("contains '{}'", text)));
        passed
    }

    /// The last response does not contain `text`
    pub fn expect_not_contains(&self, text: &str, msg: Option<&str>) -> bool {
        let passed = !self.last_response.contains(text);
        self.report_expectation(
            passed,
            &describe(msg, || format!("does not contain '{}'", text)),
        );
        passed
    }

    /// The last response carries no error marker
    pub fn expect_no_error(&self) -> bool {
        let passed = Assertion::NoError
            .check(&self.last_response)
            .unwrap_or(false);
        self.report_expectation(passed, "no error");
        passed
    }

    /// The last response matches `pattern`
    pub fn expect_regex(&self, pattern: &str, msg: Option<&str>) -> Result<bool> {
        let assertion = Assertion::Regex {
            pattern: pattern.to_string(),
        };
        let passed = assertion.check(&self.last_response)?;
        self.report_expectation(passed, &describe(msg, || assertion.to_string()));
        Ok(passed)
    }

    /// The last response has at least `length` characters
    pub fn expect_min_length(&self, length: usize, msg: Option<&str>) -> bool {
        let actual = self.last_response.chars().count();
        let passed = actual >= length;
        self.report_expectation(
            passed,
            &describe(msg, || format!("length >= {} (got {})", length, actual)),
        );
        passed
    }

    fn report_expectation(&self, passed: bool, message: &str) {
        if self.verbose {
            tracing::info!("  {}", expectation_line(passed, message));
        }
    }

    /// The last response, cut to its first `lines` lines when given
    pub fn preview(&self, lines: Option<usize>) -> String {
        let Some(limit) = lines else {
            return self.last_response.clone();
        };

        let all: Vec<&str> = self.last_response.split('\n').collect();
        let mut out = all.iter().take(limit).copied().collect::<Vec<_>>().join("\n");
        if all.len() > limit {
            out.push_str(&format!("\n... ({} more lines)", all.len() - limit));
        }
        out
    }

    /// Write the last response to `path`
    pub async fn save_response(&self, path: impl AsRef<Path>) -> Result<()> {
        tokio::fs::write(path.as_ref(), &self.last_response).await?;
        if self.verbose {
            tracing::info!("  Saved to {}", path.as_ref().display());
        }
        Ok(())
    }

    /// Stop logging commands and expectations
    pub fn quiet(&mut self) {
        self.verbose = false;
    }

    /// Log commands and expectations
    pub fn loud(&mut self) {
        self.verbose = true;
    }

    /// Most recent crash report, from this or an earlier process
    pub fn crash_report(&self) -> Option<&CrashReport> {
        self.supervisor
            .as_ref()
            .and_then(ProcessSupervisor::crash_report)
            .or(self.last_crash.as_ref())
    }

    /// Underlying supervisor, while a process is held
    pub fn supervisor(&self) -> Option<&ProcessSupervisor> {
        self.supervisor.as_ref()
    }
}

fn log_last_output(report: &CrashReport, lines: usize) {
    let skip = report.stdout_tail.len().saturating_sub(lines);
    for line in &report.stdout_tail[skip..] {
        tracing::error!("  {}", line);
    }
}

fn describe(msg: Option<&str>, default: impl FnOnce() -> String) -> String {
    msg.map_or_else(default, str::to_string)
}

fn expectation_line(passed: bool, message: &str) -> String {
    let status = if passed { "[PASS]" } else { "[FAIL]" };
    format!("{} {}", status, message)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session_with(response: &str) -> ConsoleSession {
        let mut session = ConsoleSession::new(SupervisorConfig::new("console"));
        session.quiet();
        session.last_response = response.to_string();
        session
    }

    #[test]
    fn test_expectations() {
        let session = session_with("energy-meter  online\nvoltage: 230V\n");

        assert!(session.expect_contains("energy-meter", None));
        assert!(!session.expect_contains("inverter", None));
        assert!(session.expect_not_contains("offline", None));
        assert!(session.expect_no_error());
        assert!(session.expect_regex(r"voltage: \d+V", None).unwrap());
        assert!(session.expect_min_length(10, None));
        assert!(!session.expect_min_length(1000, None));
    }

    #[test]
    fn test_custom_expectation_message() {
        let session = session_with("voltage: 230V\n");
        assert!(session.expect_regex(r"\d+V", Some("voltage data present")).unwrap());
        assert!(!session.expect_contains("current", Some("current data present")));

        assert_eq!(
            expectation_line(true, &describe(Some("voltage data present"), || "unused".into())),
            "[PASS] voltage data present"
        );
        assert_eq!(
            expectation_line(false, &describe(None, || "contains 'current'".into())),
            "[FAIL] contains 'current'"
        );
    }

    #[test]
    fn test_expect_no_error_fails_on_marker() {
        let session = session_with("Error: unknown command '/nope'\n");
        assert!(!session.expect_no_error());
    }

    #[test]
    fn test_preview_truncates() {
        let session = session_with("a\nb\nc\nd");
        assert_eq!(session.preview(Some(2)), "a\nb\n... (2 more lines)");
        assert_eq!(session.preview(Some(10)), "a\nb\nc\nd");
        assert_eq!(session.preview(None), "a\nb\nc\nd");
    }

    #[test]
    fn test_history_window() {
        let mut session = session_with("");
        for i in 0..5 {
            session.history.push(CommandRecord {
                command: format!("cmd {}", i),
                response: String::new(),
                length: 0,
                elapsed: Duration::ZERO,
            });
        }

        let last_two: Vec<_> = session.history(2).iter().map(|r| r.command.as_str()).collect();
        assert_eq!(last_two, vec!["cmd 3", "cmd 4"]);
        assert_eq!(session.history(50).len(), 5);
    }

    #[tokio::test]
    async fn test_cmd_without_process_is_not_connected() {
        let mut session = session_with("");
        let err = session.cmd("status").await.unwrap_err();
        assert!(matches!(err, ProbeError::NotConnected));
        assert!(session.history(10).is_empty());
    }

    #[tokio::test]
    async fn test_save_response() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("response.txt");
        let session = session_with("saved text\n");

        session.save_response(&path).await.unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "saved text\n");
    }
}
