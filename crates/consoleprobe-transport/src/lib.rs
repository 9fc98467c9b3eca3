//! Subprocess stdio transport for consoleprobe
//!
//! Provides the low-level plumbing for driving an interactive console
//! program over line-oriented stdin/stdout.
//!
//! # Architecture
//!
//! - **Process handle**: spawn with piped stdio, stdin writer, liveness poll,
//!   SIGTERM-then-kill termination
//! - **Output reader**: background task turning stdout into a FIFO of line
//!   events terminated by exactly one sentinel
//! - **stderr tail**: background task keeping the most recent stderr lines
//! - **Error handling**: [`TransportError`]

#![deny(unsafe_code)]
#![warn(missing_docs)]

//! # Usage
//!
//! ```ignore
//! use consoleprobe_transport::{OutputReader, ProcessConfig, ProcessHandle};
//!
//! let mut process = ProcessHandle::spawn(ProcessConfig::new("bin/console")).await?;
//! let (_reader, mut queue) = OutputReader::spawn(process.take_stdout().unwrap());
//! process.write_line("status").await?;
//! let event = queue.pop_timeout(std::time::Duration::from_millis(200)).await;
//! ```

pub mod error;
pub mod subprocess;

// Re-export commonly used types
pub use error::{Result, TransportError};
pub use subprocess::{
    Drained, OutputEvent, OutputQueue, OutputReader, OutputSender, ProcessConfig, ProcessHandle,
    StderrTail, TailSnapshot,
};
