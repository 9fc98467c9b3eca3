//! Shared helpers for the supervisor integration tests
//!
//! The console under test is a `/bin/sh` script that answers every line with
//! `ok: <line>` and understands a few magic commands:
//! - `silent`: no output
//! - `burst`: one line now, one more a second later
//! - `crash`: writes an assertion message to stderr and aborts itself
//! - `die`: exits with code 5
//! - `exit`: exits cleanly

#![allow(dead_code)]

use async_trait::async_trait;
use consoleprobe::{CollectorConfig, CrashReport, ReportSink, SupervisorConfig};
use rstest::fixture;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tempfile::TempDir;

/// Line-echoing console script
pub const ECHO_CONSOLE: &str = r#"
echo "console booting" >&2
while IFS= read -r line; do
  case "$line" in
    exit) exit 0 ;;
    silent) ;;
    burst) echo "first"; sleep 1; echo "late" ;;
    crash) echo "Assertion failed: table != NULL" >&2; kill -s ABRT $$ ;;
    die) exit 5 ;;
    *) echo "ok: $line" ;;
  esac
done
"#;

/// Scratch project root
#[fixture]
pub fn project() -> TempDir {
    tempfile::tempdir().expect("failed to create project dir")
}

/// Collector timing short enough for tests
pub fn fast_collector() -> CollectorConfig {
    CollectorConfig::default()
        .with_settle_delay(Duration::from_millis(50))
        .with_timeout(Duration::from_secs(3))
        .with_poll_interval(Duration::from_millis(50))
        .with_quiescence_window(Duration::from_millis(150))
        .with_grace_poll(Duration::from_millis(50))
}

/// Supervisor config running `script` under `/bin/sh` inside `root`
pub fn sh_config(root: &Path, script: &str) -> SupervisorConfig {
    SupervisorConfig::new("/bin/sh")
        .with_args(["-c", script])
        .with_project_root(root)
        .with_startup_grace(Duration::from_millis(200))
        .with_shutdown_grace(Duration::from_secs(2))
        .with_drain_timeout(Duration::from_millis(500))
        .with_collector(fast_collector())
}

/// Supervisor config for [`ECHO_CONSOLE`]
pub fn echo_config(root: &Path) -> SupervisorConfig {
    sh_config(root, ECHO_CONSOLE)
}

/// Report sink counting calls and remembering reports
#[derive(Debug, Default)]
pub struct CountingSink {
    persisted: AtomicUsize,
    cleanups: AtomicUsize,
    reports: Mutex<Vec<CrashReport>>,
}

impl CountingSink {
    pub fn persisted(&self) -> usize {
        self.persisted.load(Ordering::SeqCst)
    }

    pub fn cleanups(&self) -> usize {
        self.cleanups.load(Ordering::SeqCst)
    }

    pub fn last_report(&self) -> Option<CrashReport> {
        self.reports.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl ReportSink for CountingSink {
    async fn persist(&self, report: &CrashReport) -> consoleprobe::Result<Option<PathBuf>> {
        self.persisted.fetch_add(1, Ordering::SeqCst);
        self.reports.lock().unwrap().push(report.clone());
        Ok(None)
    }

    async fn cleanup_transient(&self) -> consoleprobe::Result<()> {
        self.cleanups.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Poll `is_running` until it reports an exit, or panic after a few seconds
pub async fn wait_for_exit(supervisor: &mut consoleprobe::ProcessSupervisor) {
    for _ in 0..100 {
        if !supervisor.is_running().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("console never exited");
}
