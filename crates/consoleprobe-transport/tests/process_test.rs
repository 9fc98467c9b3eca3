//! Integration tests for the subprocess transport against real `/bin/sh` children

#![cfg(unix)]

use consoleprobe_transport::{
    OutputEvent, OutputReader, ProcessConfig, ProcessHandle, StderrTail, TransportError,
};
use std::os::unix::process::ExitStatusExt;
use std::time::{Duration, Instant};

fn sh(script: &str) -> ProcessConfig {
    ProcessConfig::new("/bin/sh").with_args(["-c", script])
}

#[tokio::test]
async fn test_round_trip_over_separate_pipes() {
    let mut process = ProcessHandle::spawn(sh(
        r#"read line; echo "got $line"; echo "diagnostic" >&2; exit 0"#,
    ))
    .await
    .unwrap();

    let (_reader, mut queue) = OutputReader::spawn(process.take_stdout().unwrap());
    let mut stderr = StderrTail::spawn(process.take_stderr().unwrap(), 16);

    process.write_line("ping").await.unwrap();

    assert_eq!(
        queue.pop_timeout(Duration::from_secs(5)).await,
        Some(OutputEvent::Line("got ping\n".to_string()))
    );
    assert_eq!(
        queue.pop_timeout(Duration::from_secs(5)).await,
        Some(OutputEvent::Closed)
    );

    let tail = stderr.finish(Duration::from_secs(5)).await;
    assert_eq!(tail.lines, vec!["diagnostic".to_string()]);
}

#[tokio::test]
async fn test_working_directory_is_applied() {
    let dir = std::env::temp_dir().canonicalize().unwrap();
    let mut process = ProcessHandle::spawn(sh("pwd -P").with_working_dir(&dir))
        .await
        .unwrap();
    let (_reader, mut queue) = OutputReader::spawn(process.take_stdout().unwrap());

    match queue.pop_timeout(Duration::from_secs(5)).await {
        Some(OutputEvent::Line(line)) => assert_eq!(line.trim_end(), dir.to_str().unwrap()),
        other => panic!("Expected pwd output, got {:?}", other),
    }
}

#[tokio::test]
async fn test_missing_executable_is_not_found() {
    let result = ProcessHandle::spawn(ProcessConfig::new("/nonexistent/console-binary")).await;
    match result {
        Err(TransportError::NotFound(path)) => {
            assert!(path.ends_with("console-binary"));
        }
        Err(other) => panic!("Expected NotFound, got {:?}", other),
        Ok(_) => panic!("Spawning a missing binary should fail"),
    }
}

#[tokio::test]
async fn test_try_wait_reports_exit_code() {
    let mut process = ProcessHandle::spawn(sh("exit 3")).await.unwrap();

    let deadline = Instant::now() + Duration::from_secs(5);
    let status = loop {
        if let Some(status) = process.try_wait().unwrap() {
            break status;
        }
        assert!(Instant::now() < deadline, "process never exited");
        tokio::time::sleep(Duration::from_millis(20)).await;
    };
    assert_eq!(status.code(), Some(3));
}

#[tokio::test]
async fn test_terminate_uses_sigterm_first() {
    let mut process = ProcessHandle::spawn(sh("sleep 30")).await.unwrap();

    let status = process.terminate(Duration::from_secs(5)).await.unwrap();
    assert_eq!(status.signal(), Some(libc_sigterm()));
}

#[tokio::test]
async fn test_terminate_escalates_to_kill() {
    let mut process = ProcessHandle::spawn(sh(r#"trap "" TERM; while true; do sleep 1; done"#))
        .await
        .unwrap();
    // Let the shell install its trap before signalling.
    tokio::time::sleep(Duration::from_millis(200)).await;

    let start = Instant::now();
    let status = process
        .terminate(Duration::from_millis(300))
        .await
        .unwrap();
    assert_eq!(status.signal(), Some(9));
    assert!(start.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn test_write_after_close_is_connection_error() {
    let mut process = ProcessHandle::spawn(sh("cat > /dev/null")).await.unwrap();
    process.close_stdin().await;

    let err = process.write_line("late").await.unwrap_err();
    assert!(matches!(err, TransportError::Connection(_)));

    let _ = process.terminate(Duration::from_secs(1)).await;
}

fn libc_sigterm() -> i32 {
    nix::sys::signal::Signal::SIGTERM as i32
}
