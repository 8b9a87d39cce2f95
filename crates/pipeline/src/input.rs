//! Newline-delimited JSON input

use metrics::counter;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::engine::Inbound;

/// Lines read, queued and skipped
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReadSummary {
    pub lines: u64,
    pub queued: u64,
    pub skipped: u64,
}

/// Decode one [`Inbound`] per line and queue it. Blank lines are ignored and
/// malformed lines are logged and skipped. Stops at end of input or when the
/// queue is closed.
pub async fn read_ndjson<R>(reader: R, queue: mpsc::Sender<Inbound>) -> std::io::Result<ReadSummary>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    let mut summary = ReadSummary::default();

    while let Some(line) = lines.next_line().await? {
        summary.lines += 1;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        match serde_json::from_str::<Inbound>(line) {
            Ok(message) => {
                if queue.send(message).await.is_err() {
                    debug!("Queue closed, stopping input");
                    break;
                }
                summary.queued += 1;
            }
            Err(e) => {
                warn!("Skipping malformed line {}: {}", summary.lines, e);
                counter!("nettriage_events_rejected_total").increment(1);
                summary.skipped += 1;
            }
        }
    }

    info!(
        "Input ended: {} lines, {} queued, {} skipped",
        summary.lines, summary.queued, summary.skipped
    );
    Ok(summary)
}
