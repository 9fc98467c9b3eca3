//! Crash report construction and rendering

use super::classify::{ExitClassification, ExitCode};
use chrono::{DateTime, Local};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

/// Number of lines kept from each stream by default
pub const DEFAULT_TAIL_LINES: usize = 50;

/// Raw material gathered when an unexpected exit is observed
#[derive(Debug, Clone, Default)]
pub struct CrashCapture {
    /// Residual stdout lines that nobody consumed
    pub stdout: Vec<String>,

    /// Total stdout lines captured (may exceed `stdout.len()`)
    pub stdout_total: usize,

    /// stderr lines, oldest first
    pub stderr: Vec<String>,

    /// Total stderr lines seen (may exceed `stderr.len()`)
    pub stderr_total: usize,
}

/// Forensic record of an unexpected exit
///
/// Built once, the first time the exit is observed, and never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrashReport {
    /// Executable that crashed
    pub binary: PathBuf,

    /// Raw exit code
    pub exit_code: ExitCode,

    /// Classification of the exit code
    pub classification: ExitClassification,

    /// When the exit was observed
    pub timestamp: DateTime<Local>,

    /// stderr lines matching the assertion pattern
    pub assertion_lines: Vec<String>,

    /// Last lines of stderr
    pub stderr_tail: Vec<String>,

    /// Total stderr lines captured
    pub stderr_total: usize,

    /// Last lines of residual stdout
    pub stdout_tail: Vec<String>,

    /// Total residual stdout lines captured
    pub stdout_total: usize,
}

impl CrashReport {
    /// Build a report from captured streams
    ///
    /// `assertion_pattern` is matched against every captured stderr line and
    /// only the last `tail_lines` lines of each stream are kept.
    pub fn new(
        binary: impl AsRef<Path>,
        exit_code: ExitCode,
        capture: CrashCapture,
        assertion_pattern: &Regex,
        tail_lines: usize,
    ) -> Self {
        let assertion_lines = capture
            .stderr
            .iter()
            .filter(|line| assertion_pattern.is_match(line))
            .cloned()
            .collect();

        Self {
            binary: binary.as_ref().to_path_buf(),
            exit_code,
            classification: ExitClassification::classify(exit_code),
            timestamp: Local::now(),
            assertion_lines,
            stderr_tail: tail(capture.stderr, tail_lines),
            stderr_total: capture.stderr_total,
            stdout_tail: tail(capture.stdout, tail_lines),
            stdout_total: capture.stdout_total,
        }
    }

    /// Short name used in the report header
    fn program_name(&self) -> String {
        self.binary
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| "Console".to_string())
    }

    /// Render the human-readable crash artifact
    pub fn render(&self) -> String {
        let mut out = String::new();

        // Writing into a String cannot fail.
        let _ = writeln!(out, "=== {} Crash Report ===", self.program_name());
        let _ = writeln!(out, "Binary: {}", self.binary.display());
        let _ = writeln!(
            out,
            "Exit Code: {} ({})",
            self.exit_code.raw(),
            self.exit_code.hex()
        );
        let _ = writeln!(out, "Time: {}", self.timestamp.format("%Y-%m-%d %H:%M:%S"));

        let _ = writeln!(out, "\n=== Exit Code Analysis ===");
        let _ = writeln!(out, "{}", self.classification.analysis());

        if !self.assertion_lines.is_empty() {
            let _ = writeln!(
                out,
                "\n=== Assertion Failures ({}) ===",
                self.assertion_lines.len()
            );
            for line in &self.assertion_lines {
                let _ = writeln!(out, "{}", line);
            }
        }

        render_stream(&mut out, "STDERR", self.stderr_total, &self.stderr_tail);
        render_stream(&mut out, "STDOUT", self.stdout_total, &self.stdout_tail);

        out
    }

    /// One-paragraph summary for logs and terminals
    pub fn summary(&self) -> String {
        let mut out = format!(
            "exit code {} [{}]",
            self.exit_code, self.classification
        );
        if !self.assertion_lines.is_empty() {
            let _ = write!(out, ", {} assertion line(s)", self.assertion_lines.len());
            for line in self.assertion_lines.iter().take(3) {
                let _ = write!(out, "\n  {}", line);
            }
        }
        out
    }
}

fn render_stream(out: &mut String, name: &str, total: usize, lines: &[String]) {
    let _ = writeln!(out, "\n=== {} ({} lines) ===", name, total);
    if lines.is_empty() {
        let _ = writeln!(out, "(No {} captured)", name.to_lowercase());
    } else {
        for line in lines {
            let _ = writeln!(out, "{}", line);
        }
    }
}

fn tail(mut lines: Vec<String>, keep: usize) -> Vec<String> {
    if lines.len() > keep {
        lines.drain(..lines.len() - keep);
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pattern() -> Regex {
        Regex::new("(?i)assert").unwrap()
    }

    fn capture(stdout: &[&str], stderr: &[&str]) -> CrashCapture {
        CrashCapture {
            stdout: stdout.iter().map(|s| s.to_string()).collect(),
            stdout_total: stdout.len(),
            stderr: stderr.iter().map(|s| s.to_string()).collect(),
            stderr_total: stderr.len(),
        }
    }

    #[test]
    fn test_report_classifies_and_matches_assertions() {
        let report = CrashReport::new(
            "/opt/app/bin/debug/console",
            ExitCode(-6),
            capture(
                &["> device/print"],
                &["loading config", "ASSERTION failed: x != null", "assert at main.c:12"],
            ),
            &pattern(),
            DEFAULT_TAIL_LINES,
        );

        assert_eq!(
            report.classification,
            ExitClassification::BreakpointOrAssertion
        );
        assert_eq!(
            report.assertion_lines,
            vec!["ASSERTION failed: x != null", "assert at main.c:12"]
        );
        assert_eq!(report.stdout_tail, vec!["> device/print"]);
    }

    #[test]
    fn test_render_field_order() {
        let report = CrashReport::new(
            "/opt/app/bin/debug/console",
            ExitCode(-1073741819),
            capture(&["last stdout"], &["Assertion failed: ptr", "other"]),
            &pattern(),
            DEFAULT_TAIL_LINES,
        );
        let text = report.render();

        let markers = [
            "=== console Crash Report ===",
            "Binary: /opt/app/bin/debug/console",
            "Exit Code: -1073741819 (0xC0000005)",
            "Time: ",
            "=== Exit Code Analysis ===",
            "ACCESS_VIOLATION",
            "=== Assertion Failures (1) ===",
            "Assertion failed: ptr",
            "=== STDERR (2 lines) ===",
            "=== STDOUT (1 lines) ===",
            "last stdout",
        ];
        let mut cursor = 0;
        for marker in markers {
            let found = text[cursor..]
                .find(marker)
                .unwrap_or_else(|| panic!("missing or out of order: {marker}\n{text}"));
            cursor += found + marker.len();
        }
    }

    #[test]
    fn test_render_empty_streams() {
        let report = CrashReport::new(
            "console",
            ExitCode(1),
            CrashCapture::default(),
            &pattern(),
            DEFAULT_TAIL_LINES,
        );
        let text = report.render();

        assert!(text.contains("Unknown exit code"));
        assert!(!text.contains("Assertion Failures"));
        assert!(text.contains("=== STDERR (0 lines) ===\n(No stderr captured)"));
        assert!(text.contains("=== STDOUT (0 lines) ===\n(No stdout captured)"));
    }

    #[test]
    fn test_tail_keeps_last_lines_but_counts_all() {
        let stderr: Vec<String> = (1..=120).map(|i| format!("log {}", i)).collect();
        let report = CrashReport::new(
            "console",
            ExitCode(1),
            CrashCapture {
                stderr_total: stderr.len(),
                stderr,
                ..Default::default()
            },
            &pattern(),
            DEFAULT_TAIL_LINES,
        );

        assert_eq!(report.stderr_total, 120);
        assert_eq!(report.stderr_tail.len(), 50);
        assert_eq!(report.stderr_tail.first().unwrap(), "log 71");
        assert_eq!(report.stderr_tail.last().unwrap(), "log 120");
        assert!(report.render().contains("=== STDERR (120 lines) ==="));
    }

    #[test]
    fn test_summary_mentions_assertions() {
        let report = CrashReport::new(
            "console",
            ExitCode(-6),
            capture(&[], &["assert(len > 0) failed"]),
            &pattern(),
            DEFAULT_TAIL_LINES,
        );
        let summary = report.summary();
        assert!(summary.contains("breakpoint/assertion"));
        assert!(summary.contains("assert(len > 0) failed"));
    }
}
