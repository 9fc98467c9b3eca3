//! Supervisor configuration

use crate::collector::CollectorConfig;
use crate::diagnostics::{DEFAULT_TAIL_LINES, FileReportSink};
use crate::error::{ProbeError, Result};
use consoleprobe_transport::ProcessConfig;
use regex::Regex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Crash diagnostics settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiagnosticsConfig {
    /// Where the crash report is written; relative paths resolve against the
    /// working directory
    pub report_path: PathBuf,

    /// Files removed after a clean shutdown
    pub transient_artifacts: Vec<PathBuf>,

    /// Lines kept from each stream in a report
    pub tail_lines: usize,

    /// stderr lines matching this pattern are listed as assertion failures
    pub assertion_pattern: String,
}

impl Default for DiagnosticsConfig {
    fn default() -> Self {
        Self {
            report_path: PathBuf::from("crash_info.txt"),
            transient_artifacts: vec![
                PathBuf::from("test_crash_info.txt"),
                PathBuf::from("test_output.txt"),
                PathBuf::from("test_logs.txt"),
            ],
            tail_lines: DEFAULT_TAIL_LINES,
            assertion_pattern: "(?i)assert".to_string(),
        }
    }
}

impl DiagnosticsConfig {
    /// Set the report path
    pub fn with_report_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.report_path = path.into();
        self
    }

    /// Replace the transient artifact list
    pub fn with_transient_artifacts<I, P>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.transient_artifacts = paths.into_iter().map(Into::into).collect();
        self
    }

    /// Set the number of tail lines
    pub fn with_tail_lines(mut self, lines: usize) -> Self {
        self.tail_lines = lines;
        self
    }

    /// Set the assertion pattern
    pub fn with_assertion_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.assertion_pattern = pattern.into();
        self
    }

    /// Compile the assertion pattern
    pub fn assertion_regex(&self) -> Result<Regex> {
        Ok(Regex::new(&self.assertion_pattern)?)
    }

    /// File sink rooted at `working_dir`
    pub fn file_sink(&self, working_dir: &Path) -> FileReportSink {
        FileReportSink::new(working_dir.join(&self.report_path)).with_transient(
            self.transient_artifacts
                .iter()
                .map(|path| working_dir.join(path)),
        )
    }
}

/// Configuration for a [`ProcessSupervisor`](crate::ProcessSupervisor)
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// Executable, absolute or relative to the project root
    pub binary_path: PathBuf,

    /// Arguments passed to the executable
    pub args: Vec<String>,

    /// Extra environment variables
    pub env: HashMap<String, String>,

    /// Working directory for the child and base for relative paths
    pub project_root: Option<PathBuf>,

    /// Wait after launch before the first liveness check
    pub startup_grace: Duration,

    /// Wait after SIGTERM before killing
    pub shutdown_grace: Duration,

    /// Line sent to ask the console to quit
    pub exit_directive: String,

    /// Bound on draining the output streams after an exit
    pub drain_timeout: Duration,

    /// stderr lines kept in memory
    pub stderr_capacity: usize,

    /// Response collection timing
    pub collector: CollectorConfig,

    /// Crash diagnostics
    pub diagnostics: DiagnosticsConfig,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            binary_path: PathBuf::from("bin/Debug/Console"),
            args: vec!["--interactive".to_string()],
            env: HashMap::new(),
            project_root: None,
            startup_grace: Duration::from_secs(3),
            shutdown_grace: Duration::from_secs(5),
            exit_directive: "exit".to_string(),
            drain_timeout: Duration::from_secs(1),
            stderr_capacity: 10_000,
            collector: CollectorConfig::default(),
            diagnostics: DiagnosticsConfig::default(),
        }
    }
}

impl SupervisorConfig {
    /// Create a configuration for `binary_path`
    pub fn new(binary_path: impl Into<PathBuf>) -> Self {
        Self {
            binary_path: binary_path.into(),
            ..Default::default()
        }
    }

    /// Replace the argument list
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Set an environment variable
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Set the project root
    pub fn with_project_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.project_root = Some(root.into());
        self
    }

    /// Set the startup grace period
    pub fn with_startup_grace(mut self, grace: Duration) -> Self {
        self.startup_grace = grace;
        self
    }

    /// Set the shutdown grace period
    pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }

    /// Set the exit directive
    pub fn with_exit_directive(mut self, directive: impl Into<String>) -> Self {
        self.exit_directive = directive.into();
        self
    }

    /// Set the post-exit drain timeout
    pub fn with_drain_timeout(mut self, timeout: Duration) -> Self {
        self.drain_timeout = timeout;
        self
    }

    /// Set the stderr capacity
    pub fn with_stderr_capacity(mut self, lines: usize) -> Self {
        self.stderr_capacity = lines;
        self
    }

    /// Set the collector timing
    pub fn with_collector(mut self, collector: CollectorConfig) -> Self {
        self.collector = collector;
        self
    }

    /// Set the diagnostics settings
    pub fn with_diagnostics(mut self, diagnostics: DiagnosticsConfig) -> Self {
        self.diagnostics = diagnostics;
        self
    }

    /// Check settings that would make the supervisor misbehave
    pub fn validate(&self) -> Result<()> {
        if self.binary_path.as_os_str().is_empty() {
            return Err(ProbeError::config("binary path is empty"));
        }
        if self.stderr_capacity == 0 {
            return Err(ProbeError::config("stderr capacity must be at least 1"));
        }
        if self.collector.poll_interval.is_zero() {
            return Err(ProbeError::config("poll interval must be non-zero"));
        }
        self.diagnostics.assertion_regex()?;
        Ok(())
    }

    /// Resolve the executable path
    ///
    /// Relative paths resolve against the project root, else the current
    /// directory. On Windows a missing path is retried with `.exe`.
    pub fn resolve_binary(&self) -> Result<PathBuf> {
        let candidate = if self.binary_path.is_absolute() {
            self.binary_path.clone()
        } else {
            let base = match &self.project_root {
                Some(root) => root.clone(),
                None => std::env::current_dir()?,
            };
            base.join(&self.binary_path)
        };

        if candidate.is_file() {
            return Ok(candidate);
        }

        #[cfg(windows)]
        {
            let exe = candidate.with_extension("exe");
            if exe.is_file() {
                return Ok(exe);
            }
        }

        Err(ProbeError::BinaryNotFound(candidate))
    }

    /// Working directory for a resolved binary
    ///
    /// The project root when set, else the third ancestor of the binary
    /// (the `<root>/bin/<target>/<name>` layout), else its parent.
    pub fn resolve_working_dir(&self, binary: &Path) -> PathBuf {
        if let Some(root) = &self.project_root {
            return root.clone();
        }

        binary
            .ancestors()
            .nth(3)
            .filter(|dir| !dir.as_os_str().is_empty())
            .or_else(|| binary.parent())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."))
    }

    /// Transport configuration for a resolved binary
    pub fn process_config(&self, binary: &Path, working_dir: &Path) -> ProcessConfig {
        let mut config = ProcessConfig::new(binary)
            .with_args(self.args.iter().cloned())
            .with_working_dir(working_dir);
        for (key, value) in &self.env {
            config = config.with_env(key.clone(), value.clone());
        }
        config
    }
}
