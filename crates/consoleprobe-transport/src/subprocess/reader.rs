//! Background stdout reader and the output queue it feeds
//!
//! The reader task is the only consumer of the child's stdout. It turns the
//! byte stream into [`OutputEvent`]s and pushes them onto an unbounded FIFO,
//! so the child never blocks on a full pipe and command senders never block
//! on process I/O. The queue is the only channel between the reader and
//! whoever collects responses.

use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, timeout};

/// One entry in the output queue
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputEvent {
    /// A line read from stdout, newline included when the child wrote one
    Line(String),

    /// stdout reached end-of-stream
    Closed,

    /// Reading stdout failed
    Error(String),
}

impl OutputEvent {
    /// Whether this is the terminal sentinel (`Closed` or `Error`)
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Line(_))
    }
}

/// Producer half of the output queue
///
/// The terminal methods consume the sender, so at most one sentinel can ever
/// be pushed and nothing can follow it.
#[derive(Debug)]
pub struct OutputSender {
    tx: mpsc::UnboundedSender<OutputEvent>,
}

impl OutputSender {
    /// Push a line event. Returns `false` once the consumer is gone.
    pub fn push_line(&self, line: impl Into<String>) -> bool {
        self.tx.send(OutputEvent::Line(line.into())).is_ok()
    }

    /// Push the `Closed` sentinel
    pub fn close(self) {
        let _ = self.tx.send(OutputEvent::Closed);
    }

    /// Push the `Error` sentinel
    pub fn fail(self, reason: impl Into<String>) {
        let _ = self.tx.send(OutputEvent::Error(reason.into()));
    }
}

/// Result of a non-blocking drain
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Drained {
    /// Number of line events discarded
    pub discarded: usize,

    /// Whether the terminal sentinel was among the drained events
    pub terminal: bool,
}

/// Consumer half of the output queue
#[derive(Debug)]
pub struct OutputQueue {
    rx: mpsc::UnboundedReceiver<OutputEvent>,
    finished: bool,
}

impl OutputQueue {
    /// Create a connected sender/queue pair
    pub fn channel() -> (OutputSender, OutputQueue) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            OutputSender { tx },
            OutputQueue {
                rx,
                finished: false,
            },
        )
    }

    /// Whether the terminal sentinel has been consumed
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Pop the next event, waiting at most `wait`
    ///
    /// Returns `None` when nothing arrived in time. A producer that went away
    /// without a sentinel reads as `Closed`.
    pub async fn pop_timeout(&mut self, wait: Duration) -> Option<OutputEvent> {
        if self.finished {
            return Some(OutputEvent::Closed);
        }

        match timeout(wait, self.rx.recv()).await {
            Ok(Some(event)) => {
                if event.is_terminal() {
                    self.finished = true;
                }
                Some(event)
            }
            Ok(None) => {
                self.finished = true;
                Some(OutputEvent::Closed)
            }
            Err(_) => None,
        }
    }

    /// Discard everything already queued without waiting
    pub fn drain_pending(&mut self) -> Drained {
        let mut drained = Drained::default();
        if self.finished {
            drained.terminal = true;
            return drained;
        }

        loop {
            match self.rx.try_recv() {
                Ok(OutputEvent::Line(_)) => drained.discarded += 1,
                Ok(_) | Err(mpsc::error::TryRecvError::Disconnected) => {
                    self.finished = true;
                    drained.terminal = true;
                    break;
                }
                Err(mpsc::error::TryRecvError::Empty) => break,
            }
        }

        drained
    }

    /// Collect the remaining lines until the sentinel or until `wait` elapses
    ///
    /// Used after the child exited, when the reader is flushing whatever the
    /// pipe still held.
    pub async fn drain_until_closed(&mut self, wait: Duration) -> Vec<String> {
        let deadline = Instant::now() + wait;
        let mut lines = Vec::new();

        while !self.finished {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            match self.pop_timeout(remaining).await {
                Some(OutputEvent::Line(line)) => lines.push(line),
                Some(_) | None => break,
            }
        }

        lines
    }
}

/// Background task draining a stream into an [`OutputQueue`]
///
/// Has no callable surface beyond the queue it returns; the task is aborted
/// when the reader is dropped.
#[derive(Debug)]
pub struct OutputReader {
    handle: JoinHandle<()>,
}

impl OutputReader {
    /// Spawn the reader task over `stream`
    pub fn spawn<R>(stream: R) -> (Self, OutputQueue)
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let (sender, queue) = OutputQueue::channel();
        let handle = tokio::spawn(read_lines(stream, sender));
        (Self { handle }, queue)
    }

    /// Whether the task has terminated
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for OutputReader {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn read_lines<R>(stream: R, sender: OutputSender)
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(stream);
    let mut buf = Vec::with_capacity(1024);

    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => {
                tracing::debug!("stdout reached end of stream");
                sender.close();
                return;
            }
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf).into_owned();
                if !sender.push_line(line) {
                    return;
                }
            }
            Err(e) => {
                tracing::debug!("stdout read failed: {}", e);
                sender.fail(e.to_string());
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WAIT: Duration = Duration::from_millis(500);

    async fn collect_all(queue: &mut OutputQueue) -> Vec<OutputEvent> {
        let mut events = Vec::new();
        while let Some(event) = queue.pop_timeout(WAIT).await {
            let terminal = event.is_terminal();
            events.push(event);
            if terminal {
                break;
            }
        }
        events
    }

    #[tokio::test]
    async fn test_reader_preserves_order_and_closes_once() {
        let (_reader, mut queue) = OutputReader::spawn(&b"first\nsecond\nthird"[..]);

        let events = collect_all(&mut queue).await;
        assert_eq!(
            events,
            vec![
                OutputEvent::Line("first\n".to_string()),
                OutputEvent::Line("second\n".to_string()),
                OutputEvent::Line("third".to_string()),
                OutputEvent::Closed,
            ]
        );
        assert!(queue.is_finished());
    }

    #[tokio::test]
    async fn test_reader_substitutes_invalid_utf8() {
        let (_reader, mut queue) = OutputReader::spawn(&b"ok \xff\xfe done\n"[..]);

        match queue.pop_timeout(WAIT).await {
            Some(OutputEvent::Line(line)) => {
                assert!(line.starts_with("ok "));
                assert!(line.contains('\u{FFFD}'));
                assert!(line.ends_with(" done\n"));
            }
            other => panic!("Expected line event, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_reader_pushes_error_sentinel() {
        let stream = tokio_test::io::Builder::new()
            .read(b"partial\n")
            .read_error(std::io::Error::other("pipe broke"))
            .build();
        let (_reader, mut queue) = OutputReader::spawn(stream);

        let events = collect_all(&mut queue).await;
        assert_eq!(events.len(), 2);
        assert_eq!(events[0], OutputEvent::Line("partial\n".to_string()));
        match &events[1] {
            OutputEvent::Error(reason) => assert!(reason.contains("pipe broke")),
            other => panic!("Expected error sentinel, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_pop_after_terminal_keeps_reporting_closed() {
        let (sender, mut queue) = OutputQueue::channel();
        sender.close();

        assert_eq!(queue.pop_timeout(WAIT).await, Some(OutputEvent::Closed));
        assert_eq!(queue.pop_timeout(WAIT).await, Some(OutputEvent::Closed));
    }

    #[tokio::test(start_paused = true)]
    async fn test_pop_timeout_returns_none_when_idle() {
        let (_sender, mut queue) = OutputQueue::channel();

        let start = Instant::now();
        assert_eq!(queue.pop_timeout(Duration::from_millis(200)).await, None);
        assert!(start.elapsed() >= Duration::from_millis(200));
        assert!(!queue.is_finished());
    }

    #[tokio::test]
    async fn test_drain_pending_discards_lines() {
        let (sender, mut queue) = OutputQueue::channel();
        sender.push_line("stale 1\n");
        sender.push_line("stale 2\n");

        let drained = queue.drain_pending();
        assert_eq!(drained.discarded, 2);
        assert!(!drained.terminal);

        sender.push_line("fresh\n");
        assert_eq!(
            queue.pop_timeout(WAIT).await,
            Some(OutputEvent::Line("fresh\n".to_string()))
        );
    }

    #[tokio::test]
    async fn test_drain_pending_reports_terminal() {
        let (sender, mut queue) = OutputQueue::channel();
        sender.push_line("last words\n");
        sender.close();

        let drained = queue.drain_pending();
        assert_eq!(drained.discarded, 1);
        assert!(drained.terminal);
        assert!(queue.is_finished());
    }

    #[tokio::test(start_paused = true)]
    async fn test_drain_until_closed_is_bounded() {
        let (sender, mut queue) = OutputQueue::channel();
        sender.push_line("residual\n");

        let start = Instant::now();
        let lines = queue.drain_until_closed(Duration::from_millis(300)).await;
        assert_eq!(lines, vec!["residual\n".to_string()]);
        assert!(start.elapsed() <= Duration::from_millis(300));
        assert!(!queue.is_finished());
        drop(sender);
    }

    #[tokio::test]
    async fn test_drain_until_closed_stops_at_sentinel() {
        let (sender, mut queue) = OutputQueue::channel();
        sender.push_line("a\n");
        sender.push_line("b\n");
        sender.close();

        let lines = queue.drain_until_closed(WAIT).await;
        assert_eq!(lines, vec!["a\n".to_string(), "b\n".to_string()]);
        assert!(queue.is_finished());
    }
}
