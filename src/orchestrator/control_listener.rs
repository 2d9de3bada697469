//! Operator keystroke listener.
//!
//! Reads one line at a time from the operator's input and answers with a
//! status report, the status help screen, or a shutdown request:
//!
//! | Input        | Response                                        |
//! |--------------|-------------------------------------------------|
//! | *(empty)*    | status report                                   |
//! | `q`          | status report, exit notice, raise shutdown      |
//! | *(anything)* | status help                                     |
//!
//! The listener only ever blocks itself. However it exits (quit command,
//! end of input, read error, panic) the shutdown signal is raised, since the
//! operator has no other way left to ask for a clean stop.

use std::sync::Arc;

use futures_util::StreamExt;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::task::JoinHandle;
use tokio_util::codec::{FramedRead, LinesCodec, LinesCodecError};
use tracing::{debug, info, info_span, warn, Instrument};

use super::shutdown::ShutdownSignal;
use crate::status::render;
use crate::status::ProgressTracker;

/// Longest operator line accepted; longer lines are discarded.
const MAX_LINE_LENGTH: usize = 4096;

/// What an operator input line asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlCommand {
    /// Show the current status report.
    Status,
    /// Show the status help screen.
    Help,
    /// Stop the session after the current candidate.
    Quit,
}

/// Map one line of operator input to a command.
#[must_use]
pub fn parse_command(line: &str) -> ControlCommand {
    match line.trim() {
        "" => ControlCommand::Status,
        "q" | "Q" => ControlCommand::Quit,
        _ => ControlCommand::Help,
    }
}

type BoxedInput = Box<dyn AsyncRead + Unpin + Send>;
type BoxedOutput = Box<dyn AsyncWrite + Unpin + Send>;

/// Listener bound to an operator input and a display output.
///
/// Call [`spawn`](Self::spawn) to start it as a background task.
pub struct ControlListener {
    input: BoxedInput,
    output: BoxedOutput,
}

impl ControlListener {
    /// Listener reading commands from `input` and writing replies to `output`.
    #[must_use]
    pub fn new(
        input: impl AsyncRead + Unpin + Send + 'static,
        output: impl AsyncWrite + Unpin + Send + 'static,
    ) -> Self {
        Self {
            input: Box::new(input),
            output: Box::new(output),
        }
    }

    /// Spawn the listener task.
    ///
    /// The returned handle may simply be dropped: the task holds no state
    /// that needs flushing.
    #[must_use]
    pub fn spawn(self, progress: Arc<ProgressTracker>, shutdown: ShutdownSignal) -> JoinHandle<()> {
        tokio::spawn(
            self.run(progress, shutdown)
                .instrument(info_span!("control_listener")),
        )
    }

    /// Listen until quit, end of input, or an external shutdown.
    pub async fn run(self, progress: Arc<ProgressTracker>, shutdown: ShutdownSignal) {
        let _raise_on_exit = shutdown.raise_on_drop();
        let mut output = self.output;
        let mut lines = FramedRead::new(
            self.input,
            LinesCodec::new_with_max_length(MAX_LINE_LENGTH),
        );

        write_text(&mut output, &render::key_hints()).await;

        loop {
            tokio::select! {
                biased;

                () = shutdown.raised() => {
                    debug!("shutdown already requested, listener stopping");
                    break;
                }

                item = lines.next() => {
                    match item {
                        None => {
                            info!("operator input closed, requesting shutdown");
                            break;
                        }
                        Some(Err(LinesCodecError::MaxLineLengthExceeded)) => {
                            warn!(max = MAX_LINE_LENGTH, "operator line too long, ignored");
                        }
                        Some(Err(LinesCodecError::Io(err))) => {
                            warn!(%err, "operator input failed, requesting shutdown");
                            break;
                        }
                        Some(Ok(line)) => {
                            let command = parse_command(&line);
                            debug!(?command, "operator command");
                            if respond(command, &progress, &mut output).await {
                                info!("exit command received");
                                shutdown.raise();
                                break;
                            }
                        }
                    }
                }
            }
        }
    }
}

/// Write the reply for `command`; returns whether the listener should quit.
async fn respond(
    command: ControlCommand,
    progress: &ProgressTracker,
    output: &mut BoxedOutput,
) -> bool {
    let text = match command {
        ControlCommand::Status => format!("{}\n{}", progress.render(), render::key_hints()),
        ControlCommand::Help => format!("{}\n{}", progress.render_help(), render::key_hints()),
        ControlCommand::Quit => format!("{}\n{}", progress.render(), render::shutdown_notice()),
    };
    write_text(output, &text).await;
    command == ControlCommand::Quit
}

async fn write_text(output: &mut BoxedOutput, text: &str) {
    let result = async {
        output.write_all(text.as_bytes()).await?;
        output.flush().await
    }
    .await;
    if let Err(err) = result {
        warn!(%err, "failed to write operator output");
    }
}
