//! Line-oriented console front-end

use super::session::{dispatch, parse, ConsoleCommand};
use crate::recorder::{SessionEvent, SessionHandle};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::broadcast;

/// Read commands from `input` until `quit` or end of input, writing replies to
/// `output`. The session is shut down on exit.
pub async fn run_console<R, W>(
    session: &SessionHandle,
    input: R,
    mut output: W,
) -> std::io::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = input.lines();
    output.write_all(b"Type 'help' for commands.\n").await?;
    output.flush().await?;

    while let Some(line) = lines.next_line().await? {
        let command = match parse(&line) {
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(e) => {
                output.write_all(format!("{}\n", e).as_bytes()).await?;
                output.flush().await?;
                continue;
            }
        };

        let reply = match dispatch(session, &command).await {
            Ok(text) => text,
            Err(e) => format!("[{}] {}", e.code, e.message),
        };
        output.write_all(format!("{}\n", reply).as_bytes()).await?;
        output.flush().await?;

        if command == ConsoleCommand::Quit {
            return Ok(());
        }
    }

    tracing::info!("Console input closed");
    if let Err(e) = session.shutdown().await {
        tracing::debug!("Session already stopped: {}", e);
    }
    Ok(())
}

/// Print status changes and progress as they happen
pub async fn print_events(mut events: broadcast::Receiver<SessionEvent>) {
    let mut last_progress = None;
    loop {
        match events.recv().await {
            Ok(SessionEvent::Status(text)) => eprintln!("> {}", text),
            Ok(SessionEvent::Progress(percent)) => {
                // Only every tenth percent, to keep the console readable.
                let bucket = percent / 10;
                if last_progress != Some(bucket) {
                    last_progress = Some(bucket);
                    eprintln!("> {}%", percent);
                }
            }
            Ok(SessionEvent::ResultsReady(view)) => {
                last_progress = None;
                eprintln!("> Video preview: {}", view.video.url);
                eprintln!("> Thumbnail preview: {}", view.thumbnail.url);
            }
            Ok(SessionEvent::PhaseChanged(_)) | Ok(SessionEvent::Uploaded(_)) => {}
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::debug!("Console skipped {} session events", skipped);
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}
