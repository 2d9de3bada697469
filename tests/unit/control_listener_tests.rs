//! Unit tests for operator command parsing and the keystroke listener task.

use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncReadExt;

use pcfg_session::orchestrator::control_listener::parse_command;
use pcfg_session::orchestrator::{ControlCommand, ControlListener, ShutdownSignal};
use pcfg_session::status::ProgressTracker;

/// Run a listener over `input` to completion and return what it printed.
async fn run_listener(input: &'static [u8], shutdown: &ShutdownSignal) -> String {
    let (output, mut display) = tokio::io::duplex(64 * 1024);
    let listener = ControlListener::new(input, output);
    let handle = listener.spawn(Arc::new(ProgressTracker::new()), shutdown.clone());

    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("listener finishes")
        .expect("listener does not panic");

    let mut printed = String::new();
    display
        .read_to_string(&mut printed)
        .await
        .expect("read display");
    printed
}

#[test]
fn parses_operator_commands() {
    assert_eq!(parse_command(""), ControlCommand::Status);
    assert_eq!(parse_command("  "), ControlCommand::Status);
    assert_eq!(parse_command("q"), ControlCommand::Quit);
    assert_eq!(parse_command("Q\r"), ControlCommand::Quit);
    assert_eq!(parse_command("h"), ControlCommand::Help);
    assert_eq!(parse_command("quit"), ControlCommand::Help);
    assert_eq!(parse_command("x"), ControlCommand::Help);
}

#[tokio::test]
async fn answers_each_command_then_quits() {
    let shutdown = ShutdownSignal::new();
    let printed = run_listener(b"\nh\nq\nnever read\n", &shutdown).await;

    assert!(shutdown.is_raised());
    assert!(printed.starts_with("Press [ENTER]"), "hints first: {printed}");
    assert!(printed.contains("Status Report:"));
    assert!(printed.contains("Status Report Help:"));
    assert!(printed.contains("Exit command received"));
    assert!(printed.ends_with(&pcfg_session::status::render::shutdown_notice()));
    assert_eq!(printed.matches("Status Report:").count(), 2);
}

#[tokio::test]
async fn end_of_input_raises_shutdown() {
    let shutdown = ShutdownSignal::new();
    let printed = run_listener(b"", &shutdown).await;

    assert!(shutdown.is_raised());
    assert!(!printed.contains("Exit command received"));
}

#[tokio::test]
async fn overlong_lines_are_ignored() {
    let shutdown = ShutdownSignal::new();
    let mut input = vec![b'x'; 10_000];
    input.extend_from_slice(b"\n\n");
    let input: &'static [u8] = Box::leak(input.into_boxed_slice());
    let printed = run_listener(input, &shutdown).await;

    assert!(printed.contains("Status Report:"));
    assert!(shutdown.is_raised());
}

#[tokio::test]
async fn stops_when_shutdown_is_raised_elsewhere() {
    let shutdown = ShutdownSignal::new();
    // Keep the writer half open so the listener never sees end of input.
    let (_keyboard, input) = tokio::io::duplex(64);
    let listener = ControlListener::new(input, tokio::io::sink());
    let handle = listener.spawn(Arc::new(ProgressTracker::new()), shutdown.clone());

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(!handle.is_finished());

    shutdown.raise();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("listener stops")
        .expect("listener does not panic");
}

#[tokio::test]
async fn shutdown_signal_is_idempotent_and_shared() {
    let shutdown = ShutdownSignal::new();
    let clone = shutdown.clone();
    assert!(!clone.is_raised());

    shutdown.raise();
    shutdown.raise();
    assert!(clone.is_raised());
    tokio::time::timeout(Duration::from_secs(1), clone.raised())
        .await
        .expect("already raised");
}

#[test]
fn drop_guard_raises_signal() {
    let shutdown = ShutdownSignal::new();
    {
        let _guard = shutdown.raise_on_drop();
        assert!(!shutdown.is_raised());
    }
    assert!(shutdown.is_raised());
}
