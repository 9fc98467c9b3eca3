//! Bounded stderr capture
//!
//! stderr carries the child's logs and assertion messages. It is drained
//! continuously so the child cannot stall on a full pipe, and the most recent
//! lines are kept for diagnostics.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::task::JoinHandle;

/// Lines captured from stderr
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TailSnapshot {
    /// Retained lines, oldest first, without line terminators
    pub lines: Vec<String>,

    /// Total number of lines seen, including ones evicted from the tail
    pub total: usize,
}

#[derive(Debug)]
struct TailBuffer {
    lines: VecDeque<String>,
    capacity: usize,
    total: usize,
}

impl TailBuffer {
    fn push(&mut self, line: String) {
        if self.lines.len() == self.capacity {
            self.lines.pop_front();
        }
        self.lines.push_back(line);
        self.total += 1;
    }

    fn snapshot(&self) -> TailSnapshot {
        TailSnapshot {
            lines: self.lines.iter().cloned().collect(),
            total: self.total,
        }
    }
}

/// Background task keeping the last `capacity` lines of a stream
#[derive(Debug)]
pub struct StderrTail {
    buffer: Arc<Mutex<TailBuffer>>,
    handle: Option<JoinHandle<()>>,
}

impl StderrTail {
    /// Spawn the capture task over `stream`
    pub fn spawn<R>(stream: R, capacity: usize) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let buffer = Arc::new(Mutex::new(TailBuffer {
            lines: VecDeque::new(),
            capacity: capacity.max(1),
            total: 0,
        }));

        let handle = {
            let buffer = Arc::clone(&buffer);
            tokio::spawn(async move {
                let mut reader = BufReader::new(stream);
                let mut buf = Vec::with_capacity(512);
                loop {
                    buf.clear();
                    match reader.read_until(b'\n', &mut buf).await {
                        Ok(0) => break,
                        Ok(_) => {
                            let line = String::from_utf8_lossy(&buf)
                                .trim_end_matches(['\r', '\n'])
                                .to_string();
                            if let Ok(mut tail) = buffer.lock() {
                                tail.push(line);
                            }
                        }
                        Err(e) => {
                            tracing::debug!("stderr read failed: {}", e);
                            break;
                        }
                    }
                }
            })
        };

        Self {
            buffer,
            handle: Some(handle),
        }
    }

    /// Copy of the lines captured so far
    pub fn snapshot(&self) -> TailSnapshot {
        self.buffer
            .lock()
            .map(|tail| tail.snapshot())
            .unwrap_or_default()
    }

    /// Wait up to `wait` for the stream to end, then snapshot
    ///
    /// Best effort: if the stream is still open when `wait` elapses, the
    /// capture task is stopped and whatever arrived is returned.
    pub async fn finish(&mut self, wait: Duration) -> TailSnapshot {
        if let Some(mut handle) = self.handle.take()
            && tokio::time::timeout(wait, &mut handle).await.is_err()
        {
            tracing::debug!("stderr still open after {:?}, abandoning capture", wait);
            handle.abort();
        }
        self.snapshot()
    }
}

impl Drop for StderrTail {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}
