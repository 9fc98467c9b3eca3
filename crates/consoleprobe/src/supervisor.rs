//! Console process supervisor
//!
//! Owns one child process for its whole lifetime: launch, liveness, command
//! round trips and shutdown. Crash detection runs through the
//! [`ProcessState`] machine so diagnostics are captured exactly once, the
//! first time an unexpected exit is observed.

use crate::collector::ResponseCollector;
use crate::config::SupervisorConfig;
use crate::diagnostics::{CrashCapture, CrashReport, ExitCode, ReportSink};
use crate::error::{ProbeError, Result};
use crate::state::{ProcessEvent, ProcessState};
use consoleprobe_transport::{OutputQueue, OutputReader, ProcessHandle, StderrTail, TailSnapshot};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Supervisor for one interactive console process
///
/// Commands take `&mut self`, so at most one response collection can be in
/// flight per child.
pub struct ProcessSupervisor {
    config: SupervisorConfig,
    binary: PathBuf,
    working_dir: PathBuf,
    process: Option<ProcessHandle>,
    reader: Option<OutputReader>,
    queue: Option<OutputQueue>,
    stderr: Option<StderrTail>,
    stderr_final: TailSnapshot,
    state: ProcessState,
    stream_open: bool,
    crash_report: Option<CrashReport>,
    report_location: Option<PathBuf>,
    sink: Arc<dyn ReportSink>,
    assertion_pattern: Regex,
}

impl std::fmt::Debug for ProcessSupervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessSupervisor")
            .field("binary", &self.binary)
            .field("working_dir", &self.working_dir)
            .field("pid", &self.pid())
            .field("state", &self.state)
            .field("stream_open", &self.stream_open)
            .finish_non_exhaustive()
    }
}

impl ProcessSupervisor {
    /// Launch the console, writing crash reports next to the project
    pub async fn start(config: SupervisorConfig) -> Result<Self> {
        let (binary, working_dir) = prepare(&config).inspect_err(log_start_failure)?;
        let sink = Arc::new(config.diagnostics.file_sink(&working_dir));
        Self::launch(config, binary, working_dir, sink)
            .await
            .inspect_err(log_start_failure)
    }

    /// Launch the console with a custom report sink
    pub async fn start_with_sink(
        config: SupervisorConfig,
        sink: Arc<dyn ReportSink>,
    ) -> Result<Self> {
        let (binary, working_dir) = prepare(&config).inspect_err(log_start_failure)?;
        Self::launch(config, binary, working_dir, sink)
            .await
            .inspect_err(log_start_failure)
    }

    async fn launch(
        config: SupervisorConfig,
        binary: PathBuf,
        working_dir: PathBuf,
        sink: Arc<dyn ReportSink>,
    ) -> Result<Self> {
        let assertion_pattern = config.diagnostics.assertion_regex()?;

        let mut process = ProcessHandle::spawn(config.process_config(&binary, &working_dir))
            .await
            .map_err(|e| ProbeError::from_spawn(binary.clone(), e))?;

        let stdout = process.take_stdout().ok_or_else(|| ProbeError::Spawn {
            binary: binary.clone(),
            reason: "stdout pipe unavailable".to_string(),
        })?;
        let stderr = process.take_stderr().ok_or_else(|| ProbeError::Spawn {
            binary: binary.clone(),
            reason: "stderr pipe unavailable".to_string(),
        })?;

        let (reader, queue) = OutputReader::spawn(stdout);
        let stderr = StderrTail::spawn(stderr, config.stderr_capacity);

        tracing::info!(
            pid = process.pid(),
            binary = %binary.display(),
            working_dir = %working_dir.display(),
            "console launched"
        );

        let startup_grace = config.startup_grace;
        let mut supervisor = Self {
            config,
            binary,
            working_dir,
            process: Some(process),
            reader: Some(reader),
            queue: Some(queue),
            stderr: Some(stderr),
            stderr_final: TailSnapshot::default(),
            state: ProcessState::Running,
            stream_open: true,
            crash_report: None,
            report_location: None,
            sink,
            assertion_pattern,
        };

        tokio::time::sleep(startup_grace).await;

        if !supervisor.is_running().await {
            let exit_code = supervisor.state.crash_code().unwrap_or(ExitCode(-1));
            supervisor.release().await;
            return Err(ProbeError::ExitedDuringStartup {
                exit_code,
                report: supervisor.crash_report.take().map(Box::new),
                location: supervisor.report_location.take(),
            });
        }

        Ok(supervisor)
    }

    /// Whether the process is alive
    ///
    /// The first time an exit is observed while running, the crash report is
    /// captured and persisted. Later calls just return `false`.
    pub async fn is_running(&mut self) -> bool {
        if !self.state.is_running() {
            return false;
        }
        let Some(process) = self.process.as_mut() else {
            return false;
        };

        let code = match process.try_wait() {
            Ok(None) => return true,
            Ok(Some(status)) => ExitCode::from_status(status),
            Err(e) => {
                tracing::warn!("liveness poll failed, treating process as exited: {}", e);
                ExitCode(-1)
            }
        };

        self.record_exit(code).await;
        false
    }

    async fn record_exit(&mut self, code: ExitCode) {
        let transition = self.state.apply(ProcessEvent::ExitObserved(code));
        self.state = transition.next;
        if transition.capture_crash {
            self.capture_crash(code).await;
        }
    }

    async fn capture_crash(&mut self, code: ExitCode) {
        let drain = self.config.drain_timeout;

        let stdout: Vec<String> = match self.queue.as_mut() {
            Some(queue) => queue
                .drain_until_closed(drain)
                .await
                .into_iter()
                .map(|line| line.trim_end_matches(['\r', '\n']).to_string())
                .collect(),
            None => Vec::new(),
        };
        let stderr = match self.stderr.as_mut() {
            Some(tail) => tail.finish(drain).await,
            None => self.stderr_final.clone(),
        };

        let capture = CrashCapture {
            stdout_total: stdout.len(),
            stdout,
            stderr_total: stderr.total,
            stderr: stderr.lines,
        };
        let report = CrashReport::new(
            &self.binary,
            code,
            capture,
            &self.assertion_pattern,
            self.config.diagnostics.tail_lines,
        );

        tracing::error!(
            exit_code = code.raw(),
            classification = %report.classification,
            assertions = report.assertion_lines.len(),
            binary = %self.binary.display(),
            "console crashed"
        );

        match self.sink.persist(&report).await {
            Ok(Some(path)) => {
                tracing::info!(path = %path.display(), "crash report written");
                self.report_location = Some(path);
            }
            Ok(None) => {}
            Err(e) => tracing::warn!("failed to persist crash report: {}", e),
        }

        self.crash_report = Some(report);
        self.stream_open = false;
    }

    /// Send a command and collect its response
    ///
    /// Fails with [`ProbeError::NotConnected`] when the process is not
    /// running or its stdout has closed, and with [`ProbeError::Command`]
    /// when the write fails. Either way later sends fail too.
    pub async fn send_command(
        &mut self,
        text: &str,
        settle_delay: Duration,
        timeout: Duration,
    ) -> Result<String> {
        if !self.is_running().await || !self.stream_open {
            return Err(ProbeError::NotConnected);
        }

        let collector = ResponseCollector::new(
            self.config
                .collector
                .clone()
                .with_settle_delay(settle_delay)
                .with_timeout(timeout),
        );

        let (Some(process), Some(queue)) = (self.process.as_mut(), self.queue.as_mut()) else {
            return Err(ProbeError::NotConnected);
        };
        let Some(stdin) = process.stdin_mut() else {
            return Err(ProbeError::NotConnected);
        };

        match collector.collect(stdin, queue, text).await {
            Ok(collected) => {
                if collected.stream_closed {
                    tracing::debug!(command = text, "stdout closed, connection unusable");
                    self.stream_open = false;
                }
                Ok(collected.text)
            }
            Err(e) => {
                tracing::warn!(command = text, "failed to send command: {}", e);
                self.stream_open = false;
                Err(ProbeError::command(e.to_string()))
            }
        }
    }

    /// Send a command with the configured settle delay and timeout
    pub async fn send(&mut self, text: &str) -> Result<String> {
        let settle = self.config.collector.settle_delay;
        let timeout = self.config.collector.timeout;
        self.send_command(text, settle, timeout).await
    }

    /// Shut the process down
    ///
    /// Idempotent and infallible. A crash that happened but was not yet
    /// observed is still recorded. Transient artifacts are removed only when
    /// no crash was recorded.
    pub async fn stop(&mut self) {
        if self.process.is_none() {
            return;
        }

        if self.is_running().await {
            if let Some(process) = self.process.as_mut() {
                if let Err(e) = process.write_line(&self.config.exit_directive).await {
                    tracing::debug!("exit directive not delivered: {}", e);
                }
                process.close_stdin().await;
            }
            self.state = self.state.apply(ProcessEvent::StopRequested).next;
        }

        self.release().await;

        if self.crash_report.is_none()
            && let Err(e) = self.sink.cleanup_transient().await
        {
            tracing::warn!("failed to clean up transient artifacts: {}", e);
        }

        tracing::info!(state = %self.state, "console stopped");
    }

    async fn release(&mut self) {
        if let Some(mut process) = self.process.take() {
            match process.terminate(self.config.shutdown_grace).await {
                Ok(status) => tracing::debug!(status = %status, "console exited"),
                Err(e) => tracing::warn!("failed to terminate console: {}", e),
            }
        }

        self.reader = None;
        self.queue = None;
        if let Some(mut tail) = self.stderr.take() {
            self.stderr_final = tail.finish(self.config.drain_timeout).await;
        }
        self.stream_open = false;
    }

    /// Whether commands can currently be sent
    ///
    /// Reflects the last observation; call [`ProcessSupervisor::is_running`]
    /// to poll the OS.
    pub fn is_connected(&self) -> bool {
        self.state.is_running() && self.stream_open
    }

    /// Lifecycle state
    pub fn state(&self) -> ProcessState {
        self.state
    }

    /// Crash report, once a crash was observed
    pub fn crash_report(&self) -> Option<&CrashReport> {
        self.crash_report.as_ref()
    }

    /// Where the crash report was persisted
    pub fn report_location(&self) -> Option<&Path> {
        self.report_location.as_deref()
    }

    /// Resolved executable
    pub fn binary(&self) -> &Path {
        &self.binary
    }

    /// Working directory of the child
    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    /// Process id while the child is held
    pub fn pid(&self) -> Option<u32> {
        self.process.as_ref().and_then(ProcessHandle::pid)
    }

    /// stderr captured so far
    pub fn stderr_snapshot(&self) -> TailSnapshot {
        match &self.stderr {
            Some(tail) => tail.snapshot(),
            None => self.stderr_final.clone(),
        }
    }

    /// Configuration
    pub fn config(&self) -> &SupervisorConfig {
        &self.config
    }
}

fn prepare(config: &SupervisorConfig) -> Result<(PathBuf, PathBuf)> {
    config.validate()?;
    let binary = config.resolve_binary()?;
    let working_dir = config.resolve_working_dir(&binary);
    Ok((binary, working_dir))
}

fn log_start_failure(err: &ProbeError) {
    if err.is_spawn_error() {
        tracing::error!("console failed to start: {}", err);
    } else {
        tracing::error!("invalid supervisor configuration: {}", err);
    }
}
