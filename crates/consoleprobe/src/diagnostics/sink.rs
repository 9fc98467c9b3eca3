//! Where crash reports end up

use super::report::CrashReport;
use crate::error::Result;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;

/// Destination for crash reports and owner of transient artifacts
///
/// The supervisor calls [`ReportSink::persist`] at most once per process
/// lifetime, and [`ReportSink::cleanup_transient`] only after a shutdown in
/// which no crash was recorded.
#[async_trait]
pub trait ReportSink: Send + Sync {
    /// Store the report. Returns the location when it was written somewhere.
    async fn persist(&self, report: &CrashReport) -> Result<Option<PathBuf>>;

    /// Remove artifacts left over from earlier runs
    async fn cleanup_transient(&self) -> Result<()>;
}

/// Writes the rendered report to a file
#[derive(Debug, Clone)]
pub struct FileReportSink {
    report_path: PathBuf,
    transient: Vec<PathBuf>,
}

impl FileReportSink {
    /// Create a sink writing to `report_path`
    pub fn new(report_path: impl Into<PathBuf>) -> Self {
        Self {
            report_path: report_path.into(),
            transient: Vec::new(),
        }
    }

    /// Files removed on clean shutdown. The report itself is never removed.
    pub fn with_transient<I, P>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.transient = paths.into_iter().map(Into::into).collect();
        self
    }

    /// Report location
    pub fn report_path(&self) -> &Path {
        &self.report_path
    }
}

#[async_trait]
impl ReportSink for FileReportSink {
    async fn persist(&self, report: &CrashReport) -> Result<Option<PathBuf>> {
        if let Some(parent) = self.report_path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).await?;
        }
        fs::write(&self.report_path, report.render()).await?;
        Ok(Some(self.report_path.clone()))
    }

    async fn cleanup_transient(&self) -> Result<()> {
        for path in &self.transient {
            match fs::remove_file(path).await {
                Ok(()) => tracing::debug!(path = %path.display(), "removed transient artifact"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    tracing::warn!(path = %path.display(), "failed to remove artifact: {}", e)
                }
            }
        }
        Ok(())
    }
}

/// Discards reports
#[derive(Debug, Clone, Copy, Default)]
pub struct NullReportSink;

#[async_trait]
impl ReportSink for NullReportSink {
    async fn persist(&self, _report: &CrashReport) -> Result<Option<PathBuf>> {
        Ok(None)
    }

    async fn cleanup_transient(&self) -> Result<()> {
        Ok(())
    }
}
