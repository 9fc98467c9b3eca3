//! Process management for the console subprocess

use crate::error::{Result, TransportError};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::process::{Child as TokioChild, ChildStderr, ChildStdin, ChildStdout, Command};

/// Configuration for spawning a console process
#[derive(Clone, Debug)]
pub struct ProcessConfig {
    /// Path to the executable
    pub program: PathBuf,

    /// Arguments to pass to the executable
    pub args: Vec<String>,

    /// Extra environment variables to set
    pub env: HashMap<String, String>,

    /// Start from an empty environment instead of inheriting the parent's
    pub clear_env: bool,

    /// Working directory for the child
    pub working_dir: Option<PathBuf>,
}

impl Default for ProcessConfig {
    fn default() -> Self {
        Self {
            program: PathBuf::new(),
            args: vec!["--interactive".to_string()],
            env: HashMap::new(),
            clear_env: false,
            working_dir: None,
        }
    }
}

impl ProcessConfig {
    /// Create a new process configuration
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
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

    /// Add an argument
    pub fn with_arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Set an environment variable
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Do not inherit the parent's environment
    ///
    /// Only the variables set via [`ProcessConfig::with_env`] reach the child.
    pub fn with_cleared_env(mut self) -> Self {
        self.clear_env = true;
        self
    }

    /// Set the working directory
    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }
}

/// Handle to a running console process
///
/// stdin, stdout and stderr are three independent pipes. stdout and stderr
/// are meant to be taken once and handed to their background readers.
pub struct ProcessHandle {
    child: TokioChild,
    stdin: Option<BufWriter<ChildStdin>>,
    stdout: Option<ChildStdout>,
    stderr: Option<ChildStderr>,
    config: ProcessConfig,
}

impl ProcessHandle {
    /// Spawn a new console process
    pub async fn spawn(config: ProcessConfig) -> Result<Self> {
        let mut cmd = Command::new(&config.program);
        cmd.args(&config.args);

        if config.clear_env {
            cmd.env_clear();
        }
        for (key, value) in &config.env {
            cmd.env(key, value);
        }

        if let Some(dir) = &config.working_dir {
            cmd.current_dir(dir);
        }

        cmd.stdin(Stdio::piped());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        cmd.kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                TransportError::NotFound(config.program.clone())
            } else {
                TransportError::Process(format!(
                    "Failed to spawn {}: {}",
                    config.program.display(),
                    e
                ))
            }
        })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| TransportError::process("Failed to get stdin"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| TransportError::process("Failed to get stdout"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| TransportError::process("Failed to get stderr"))?;

        tracing::debug!(
            pid = child.id(),
            program = %config.program.display(),
            "spawned console process"
        );

        Ok(Self {
            child,
            stdin: Some(BufWriter::new(stdin)),
            stdout: Some(stdout),
            stderr: Some(stderr),
            config,
        })
    }

    /// Take the stdout pipe (once)
    pub fn take_stdout(&mut self) -> Option<ChildStdout> {
        self.stdout.take()
    }

    /// Take the stderr pipe (once)
    pub fn take_stderr(&mut self) -> Option<ChildStderr> {
        self.stderr.take()
    }

    /// Buffered stdin writer, if stdin is still open
    pub fn stdin_mut(&mut self) -> Option<&mut BufWriter<ChildStdin>> {
        self.stdin.as_mut()
    }

    /// Write one line followed by a newline and flush
    pub async fn write_line(&mut self, line: &str) -> Result<()> {
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| TransportError::connection("stdin is closed"))?;

        stdin.write_all(line.as_bytes()).await?;
        stdin.write_all(b"\n").await?;
        stdin.flush().await?;

        Ok(())
    }

    /// Flush and close stdin, signalling end-of-input to the child
    pub async fn close_stdin(&mut self) {
        if let Some(mut stdin) = self.stdin.take() {
            let _ = stdin.shutdown().await;
        }
    }

    /// Poll the OS for an exit status without blocking
    pub fn try_wait(&mut self) -> Result<Option<ExitStatus>> {
        self.child
            .try_wait()
            .map_err(|e| TransportError::Process(format!("Failed to poll process: {}", e)))
    }

    /// Process id, while the process has not been reaped
    pub fn pid(&self) -> Option<u32> {
        self.child.id()
    }

    /// Terminate the process, escalating to a kill after `grace`
    ///
    /// Sends SIGTERM on Unix and waits up to `grace` for the process to exit;
    /// if it is still alive afterwards it is killed. Returns the final status.
    pub async fn terminate(&mut self, grace: Duration) -> Result<ExitStatus> {
        if let Some(status) = self.try_wait()? {
            return Ok(status);
        }

        #[cfg(unix)]
        if let Some(pid) = self.child.id() {
            use nix::sys::signal::{Signal, kill};
            use nix::unistd::Pid;

            if let Err(e) = kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
                tracing::debug!(pid, "SIGTERM failed: {}", e);
            }
        }

        match tokio::time::timeout(grace, self.child.wait()).await {
            Ok(status) => Ok(status?),
            Err(_) => {
                tracing::warn!(
                    pid = self.child.id(),
                    "process did not exit within {:?}, killing",
                    grace
                );
                self.kill().await?;
                Ok(self.child.wait().await?)
            }
        }
    }

    /// Kill the process
    pub async fn kill(&mut self) -> Result<()> {
        self.child
            .kill()
            .await
            .map_err(|e| TransportError::Process(format!("Failed to kill process: {}", e)))
    }

    /// Get the process configuration
    pub fn config(&self) -> &ProcessConfig {
        &self.config
    }

    /// Path of the running executable
    pub fn program(&self) -> &Path {
        &self.config.program
    }
}
