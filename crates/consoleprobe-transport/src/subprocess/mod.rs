//! Subprocess transport for console communication
//!
//! Spawns the console process with three independent pipes and drains its
//! output streams in the background: stdout into an [`OutputQueue`] of line
//! events, stderr into a bounded [`StderrTail`].

pub mod process;
pub mod reader;
pub mod stderr;

pub use process::{ProcessConfig, ProcessHandle};
pub use reader::{Drained, OutputEvent, OutputQueue, OutputReader, OutputSender};
pub use stderr::{StderrTail, TailSnapshot};
