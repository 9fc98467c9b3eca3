//! consoleprobe - drive an interactive console program from the command line
//!
//! Usage:
//!   consoleprobe quick /device/print /stream/print --output out.txt
//!   consoleprobe suite tests.json --json
//!   consoleprobe repl

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use consoleprobe::{ConsoleSession, SuiteRunner, SupervisorConfig, load_suite, quick_run};
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

const DEFAULT_COMMANDS: [&str; 2] = ["/device/print", "/stream/tcp-client/print"];

#[derive(Parser, Debug)]
#[command(name = "consoleprobe")]
#[command(about = "Supervise and test an interactive console program")]
#[command(version)]
struct Args {
    /// Console executable, absolute or relative to the project root
    #[arg(long, env = "CONSOLEPROBE_BINARY", default_value = "bin/Debug/Console")]
    binary: PathBuf,

    /// Working directory for the console and base for relative paths
    #[arg(long, env = "CONSOLEPROBE_PROJECT_ROOT")]
    project_root: Option<PathBuf>,

    /// Seconds to wait after launch before the first liveness check
    #[arg(long, default_value_t = 3.0)]
    startup_grace: f64,

    /// Argument passed to the console (repeatable, replaces the default)
    #[arg(long = "arg", allow_hyphen_values = true)]
    args: Vec<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a few commands and print their responses
    Quick {
        /// Commands to send
        commands: Vec<String>,

        /// File receiving every response
        #[arg(long)]
        output: Option<PathBuf>,

        /// File receiving the captured stderr
        #[arg(long)]
        log: Option<PathBuf>,
    },

    /// Run a JSON test suite
    Suite {
        /// Suite file
        file: PathBuf,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Interactive shell
    Repl,
}

impl Args {
    fn supervisor_config(&self) -> Result<SupervisorConfig> {
        let startup_grace = Duration::try_from_secs_f64(self.startup_grace)
            .context("--startup-grace must be a non-negative number of seconds")?;

        let mut config = SupervisorConfig::new(&self.binary).with_startup_grace(startup_grace);
        if let Some(root) = &self.project_root {
            config = config.with_project_root(root);
        }
        if !self.args.is_empty() {
            config = config.with_args(self.args.iter().cloned());
        }
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("consoleprobe=info")),
        )
        .with_target(false)
        .init();

    let args = Args::parse();
    let config = args.supervisor_config()?;

    match args.command {
        Command::Quick {
            commands,
            output,
            log,
        } => {
            let commands = if commands.is_empty() {
                DEFAULT_COMMANDS.iter().map(|c| c.to_string()).collect()
            } else {
                commands
            };
            quick_run(config, &commands, output.as_deref(), log.as_deref())
                .await
                .context("quick run failed")?;
            Ok(())
        }
        Command::Suite { file, json } => {
            let cases = load_suite(&file)
                .await
                .with_context(|| format!("failed to load suite {}", file.display()))?;
            let report = SuiteRunner::new(config).run(&cases).await;

            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("{}", "=".repeat(60));
                println!("Results: {} passed, {} failed", report.passed, report.failed);
                if let Some(error) = &report.error {
                    println!("Error: {}", error);
                }
            }

            if !report.success {
                std::process::exit(1);
            }
            Ok(())
        }
        Command::Repl => repl(config).await,
    }
}

async fn repl(config: SupervisorConfig) -> Result<()> {
    println!("{}", "=".repeat(60));
    println!("consoleprobe - Interactive Mode");
    println!("{}", "=".repeat(60));
    println!();
    println!("Commands:");
    println!("  /command args  - Send console command");
    println!("  .show [n]      - Show last response (optional: first n lines)");
    println!("  .save file     - Save last response to file");
    println!("  .history       - Show command history");
    println!("  .restart       - Restart the console");
    println!("  .exit          - Exit session");
    println!();

    let mut session = ConsoleSession::new(config);
    if let Err(e) = session.start().await {
        eprintln!("Failed to start session: {}", e);
        eprintln!("{}", e.suggested_action());
        std::process::exit(1);
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("\nconsole> ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        match line {
            ".exit" => break,
            ".history" => {
                let history = session.history(10);
                println!("\nCommand History (last {}):", history.len());
                for (i, record) in history.iter().enumerate() {
                    println!("  {}. {}", i + 1, record.command);
                    println!(
                        "     {} chars, {:.2}s",
                        record.length,
                        record.elapsed.as_secs_f64()
                    );
                }
            }
            ".restart" => {
                session.stop().await;
                if let Err(e) = session.start().await {
                    eprintln!("Failed to restart: {}", e);
                    break;
                }
            }
            _ if line.starts_with(".show") => {
                let count = line
                    .split_whitespace()
                    .nth(1)
                    .and_then(|n| n.parse::<usize>().ok());
                println!("{}", session.preview(count));
            }
            _ if line.starts_with(".save") => match line.split_once(char::is_whitespace) {
                Some((_, path)) if !path.trim().is_empty() => {
                    if let Err(e) = session.save_response(path.trim()).await {
                        eprintln!("Error: {}", e);
                    }
                }
                _ => println!("Usage: .save filename"),
            },
            command => {
                if let Err(e) = session.cmd(command).await {
                    eprintln!("Error: {}", e);
                }
            }
        }
    }

    session.stop().await;
    Ok(())
}
