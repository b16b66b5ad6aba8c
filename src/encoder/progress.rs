//! Tails the key=value log ffmpeg writes with `-progress <file>`.

use indicatif::ProgressBar;
use std::path::PathBuf;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::oneshot;

use crate::Result;

const POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ProgressEvent {
    /// Seconds of output written so far
    OutTime(f64),
    End,
}

/// Parse one line of an ffmpeg progress log.
///
/// `out_time_ms` is reported in microseconds despite its name.
pub fn parse_progress_line(line: &str) -> Option<ProgressEvent> {
    let (key, value) = line.trim().split_once('=')?;
    match key.trim() {
        "progress" if value.trim() == "end" => Some(ProgressEvent::End),
        "out_time_ms" => value
            .trim()
            .parse::<i64>()
            .ok()
            .map(|micros| ProgressEvent::OutTime(micros.max(0) as f64 / 1_000_000.0)),
        _ => None,
    }
}

/// Follow the progress log at `path`, advancing `progress` in whole seconds.
///
/// Returns the last elapsed time seen. Stops at `progress=end`, or once `exited`
/// fires (or its sender is dropped) and the rest of the file has been read.
pub async fn tail_progress(
    path: PathBuf,
    progress: ProgressBar,
    mut exited: oneshot::Receiver<()>,
) -> Result<f64> {
    let file = tokio::fs::File::open(&path).await?;
    let mut reader = BufReader::new(file);
    let mut line = String::new();
    let mut elapsed = 0.0_f64;
    let mut process_done = false;

    loop {
        let read = reader.read_line(&mut line).await?;

        if read > 0 {
            if !line.ends_with('\n') {
                // partial line, the rest is still being written
                continue;
            }
            if apply_line(&line, &progress, &mut elapsed) {
                progress.finish();
                return Ok(elapsed);
            }
            line.clear();
            continue;
        }

        if process_done {
            break;
        }

        tokio::select! {
            _ = &mut exited => process_done = true,
            _ = tokio::time::sleep(POLL_INTERVAL) => {}
        }
    }

    if !line.is_empty() && apply_line(&line, &progress, &mut elapsed) {
        progress.finish();
    }

    Ok(elapsed)
}

/// Returns true once the end marker is seen
fn apply_line(line: &str, progress: &ProgressBar, elapsed: &mut f64) -> bool {
    match parse_progress_line(line) {
        Some(ProgressEvent::End) => true,
        Some(ProgressEvent::OutTime(seconds)) => {
            if seconds > *elapsed {
                *elapsed = seconds;
                progress.set_position(seconds as u64);
            }
            false
        }
        None => false,
    }
}
