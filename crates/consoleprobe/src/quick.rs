//! One-shot command runs

use crate::config::SupervisorConfig;
use crate::error::Result;
use crate::supervisor::ProcessSupervisor;
use std::fmt::Write as _;
use std::path::Path;

/// Width of the separator lines in the output file
const RULE_WIDTH: usize = 60;

/// Responses gathered by [`quick_run`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QuickRun {
    /// `(command, response)` pairs in execution order; failed commands carry
    /// `ERROR: <reason>`
    pub responses: Vec<(String, String)>,

    /// stderr lines captured over the run
    pub stderr: Vec<String>,
}

impl QuickRun {
    /// Render the output file contents
    pub fn render(&self) -> String {
        let rule = "=".repeat(RULE_WIDTH);
        let mut out = String::new();
        for (command, response) in &self.responses {
            let _ = write!(
                out,
                "\n{rule}\nCommand: {command}\n{rule}\n{response}\n"
            );
        }
        out
    }
}

/// Launch the console, run `commands` in order and stop it
///
/// A failing command does not end the run. When given, `output_file`
/// receives every response and `log_file` the captured stderr (only when
/// there is any).
pub async fn quick_run(
    config: SupervisorConfig,
    commands: &[String],
    output_file: Option<&Path>,
    log_file: Option<&Path>,
) -> Result<QuickRun> {
    let mut supervisor = ProcessSupervisor::start(config).await?;
    let mut run = QuickRun::default();

    for command in commands {
        tracing::info!("Executing: {}", command);
        let response = match supervisor.send(command).await {
            Ok(response) => {
                let preview: String = response.chars().take(200).collect();
                tracing::info!("  Response: {}...", preview.replace('\n', " ").trim());
                response
            }
            Err(e) => {
                tracing::warn!("  Error: {}", e);
                format!("ERROR: {}", e)
            }
        };
        run.responses.push((command.clone(), response));
    }

    supervisor.stop().await;
    run.stderr = supervisor.stderr_snapshot().lines;

    if let Some(path) = output_file {
        tokio::fs::write(path, run.render()).await?;
        tracing::info!("Output saved to {}", path.display());
    }

    if let Some(path) = log_file
        && !run.stderr.is_empty()
    {
        let mut logs = run.stderr.join("\n");
        logs.push('\n');
        tokio::fs::write(path, logs).await?;
        tracing::info!("Logs saved to {}", path.display());
    }

    Ok(run)
}
