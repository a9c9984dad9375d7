use std::io::{IsTerminal, Write};

use crossterm::{
    cursor, queue,
    style::{Color, Print, ResetColor, SetForegroundColor},
    terminal::{Clear, ClearType},
};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::shutdown::ShutdownSender;
use crate::stats::Snapshot;

/// Renders a single live status line on stderr from the snapshot feed.
/// Stays silent when stderr is not a terminal.
pub(super) fn setup_live_monitor(
    mut snapshot_rx: watch::Receiver<Snapshot>,
    shutdown_tx: &ShutdownSender,
    no_color: bool,
) -> JoinHandle<()> {
    let mut shutdown_rx = shutdown_tx.subscribe();
    tokio::spawn(async move {
        if !std::io::stderr().is_terminal() {
            return;
        }
        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    drop(finish_status_line());
                    break;
                }
                changed = snapshot_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let snapshot = snapshot_rx.borrow_and_update().clone();
                    if render_status_line(&snapshot, no_color).is_err() {
                        break;
                    }
                }
            }
        }
    })
}

struct StatusSegment {
    text: String,
    color: Option<Color>,
}

impl StatusSegment {
    const fn plain(text: String) -> Self {
        Self { text, color: None }
    }

    const fn colored(text: String, color: Color) -> Self {
        Self {
            text,
            color: Some(color),
        }
    }
}

fn render_status_line(snapshot: &Snapshot, no_color: bool) -> Result<(), std::io::Error> {
    let mut out = std::io::stderr();
    queue!(out, cursor::MoveToColumn(0), Clear(ClearType::CurrentLine))?;
    for segment in build_status_line(snapshot, no_color) {
        if let Some(color) = segment.color {
            queue!(
                out,
                SetForegroundColor(color),
                Print(&segment.text),
                ResetColor
            )?;
        } else {
            queue!(out, Print(&segment.text))?;
        }
    }
    out.flush()?;
    Ok(())
}

fn finish_status_line() -> Result<(), std::io::Error> {
    let mut out = std::io::stderr();
    out.write_all(b"\n")?;
    out.flush()?;
    Ok(())
}

fn build_status_line(snapshot: &Snapshot, no_color: bool) -> Vec<StatusSegment> {
    let elapsed = format!("{:7.1}s", snapshot.elapsed);
    let users = format!(
        " | users {}/{}",
        snapshot.active_users, snapshot.total_users
    );
    let requests = format!(" | requests {}", snapshot.total_requests);
    let rps = format!(" | rps {:.1}", snapshot.rps);
    let errors = format!(" | errors {}", snapshot.total_errors);

    if no_color {
        return vec![
            StatusSegment::plain(elapsed),
            StatusSegment::plain(users),
            StatusSegment::plain(requests),
            StatusSegment::plain(rps),
            StatusSegment::plain(errors),
        ];
    }

    let error_color = if snapshot.total_errors > 0 {
        Color::Red
    } else {
        Color::Green
    };
    vec![
        StatusSegment::colored(elapsed, Color::Yellow),
        StatusSegment::colored(users, Color::Cyan),
        StatusSegment::plain(requests),
        StatusSegment::colored(rps, Color::Cyan),
        StatusSegment::colored(errors, error_color),
    ]
}
