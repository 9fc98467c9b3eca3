//! Response collection
//!
//! The console protocol has no end-of-response marker, so completion is
//! inferred from output quiescence: a response is complete once output has
//! started and then stayed silent for a short window, or once stdout closes.

use consoleprobe_transport::{OutputEvent, OutputQueue, Result};
use std::time::Duration;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::time::{Instant, sleep};

/// Timing knobs for [`ResponseCollector`]
///
/// These are heuristics, not protocol guarantees. Slow consoles need a longer
/// settle delay or quiescence window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectorConfig {
    /// Sleep after writing the command, before collecting
    pub settle_delay: Duration,

    /// Upper bound on waiting for the first line
    pub timeout: Duration,

    /// Maximum single wait on the output queue
    pub poll_interval: Duration,

    /// Silence after a line that ends the response
    pub quiescence_window: Duration,

    /// Extra wait after the first silent poll once data has arrived
    pub grace_poll: Duration,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            settle_delay: Duration::from_millis(500),
            timeout: Duration::from_secs(10),
            poll_interval: Duration::from_millis(200),
            quiescence_window: Duration::from_millis(300),
            grace_poll: Duration::from_millis(100),
        }
    }
}

impl CollectorConfig {
    /// Set the settle delay
    pub fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    /// Set the overall timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the poll interval
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Set the quiescence window
    pub fn with_quiescence_window(mut self, window: Duration) -> Self {
        self.quiescence_window = window;
        self
    }

    /// Set the grace poll
    pub fn with_grace_poll(mut self, grace: Duration) -> Self {
        self.grace_poll = grace;
        self
    }
}

/// Output gathered for one command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Collected {
    /// All lines concatenated in arrival order
    pub text: String,

    /// Individual lines, newlines included
    pub lines: Vec<String>,

    /// Whether stdout ended (or failed) during collection
    pub stream_closed: bool,

    /// Wall time from the call to completion
    pub elapsed: Duration,
}

/// Quiescence-based response collector
///
/// # Limitations
///
/// - Output arriving in bursts separated by more than the quiescence window
///   is truncated after the first burst. The rest stays queued and is
///   discarded as stale before the next command.
/// - A command that produces no output returns an empty response only after
///   the full timeout.
#[derive(Debug, Clone, Default)]
pub struct ResponseCollector {
    config: CollectorConfig,
}

impl ResponseCollector {
    /// Create a collector
    pub fn new(config: CollectorConfig) -> Self {
        Self { config }
    }

    /// Timing configuration
    pub fn config(&self) -> &CollectorConfig {
        &self.config
    }

    /// Send `command` through `writer` and collect the response from `queue`
    ///
    /// Output queued before the command was written is discarded. Write
    /// failures are returned as errors; everything else ends in a
    /// [`Collected`], possibly empty.
    pub async fn collect<W>(
        &self,
        writer: &mut W,
        queue: &mut OutputQueue,
        command: &str,
    ) -> Result<Collected>
    where
        W: AsyncWrite + Unpin,
    {
        let start = Instant::now();

        let drained = queue.drain_pending();
        if drained.discarded > 0 {
            tracing::debug!(discarded = drained.discarded, "discarded stale output");
        }

        if drained.terminal {
            if let Err(e) = write_command(writer, command).await {
                tracing::debug!("write to closed console failed: {}", e);
            }
            return Ok(Collected {
                stream_closed: true,
                elapsed: start.elapsed(),
                ..Default::default()
            });
        }

        write_command(writer, command).await?;
        sleep(self.config.settle_delay).await;

        let mut lines = Vec::new();
        let mut stream_closed = false;
        let mut deadline = Instant::now() + self.config.timeout;

        loop {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            let wait = self.config.poll_interval.min(deadline - now);

            match queue.pop_timeout(wait).await {
                Some(OutputEvent::Line(line)) => {
                    lines.push(line);
                    deadline = Instant::now() + self.config.quiescence_window;
                }
                Some(event) => {
                    log_terminal(&event);
                    stream_closed = true;
                    break;
                }
                None if !lines.is_empty() => match queue.pop_timeout(self.config.grace_poll).await {
                    Some(OutputEvent::Line(line)) => {
                        lines.push(line);
                        deadline = Instant::now() + self.config.quiescence_window;
                    }
                    Some(event) => {
                        log_terminal(&event);
                        stream_closed = true;
                        break;
                    }
                    None => break,
                },
                None => {}
            }
        }

        let collected = Collected {
            text: lines.concat(),
            lines,
            stream_closed,
            elapsed: start.elapsed(),
        };

        tracing::debug!(
            command,
            lines = collected.lines.len(),
            bytes = collected.text.len(),
            elapsed_ms = collected.elapsed.as_millis() as u64,
            stream_closed,
            "collected response"
        );

        Ok(collected)
    }
}

async fn write_command<W>(writer: &mut W, command: &str) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(command.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await?;
    Ok(())
}

fn log_terminal(event: &OutputEvent) {
    if let OutputEvent::Error(reason) = event {
        tracing::warn!("stdout failed during collection: {}", reason);
    } else {
        tracing::debug!("stdout closed during collection");
    }
}
