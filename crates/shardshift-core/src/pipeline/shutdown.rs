//! Driving a cursor stream until it finishes or shutdown is requested.

use std::collections::BTreeMap;

use futures::StreamExt;
use shardshift_proto::{ProgressCursor, ShardId};
use tokio::sync::broadcast;
use tracing::{info, warn};

use super::documents::CursorStream;
use crate::error::PipelineError;

/// What happened to a migration driven by [`run_until_shutdown`].
#[derive(Debug, Default)]
pub struct MigrationOutcome {
    /// Acknowledged cursors in emission order. Each is a valid resume point.
    pub completed: Vec<ProgressCursor>,
    /// Failures that ended the stream.
    pub failures: Vec<PipelineError>,
    /// Whether shutdown stopped the stream early. Batches in flight at that
    /// moment may or may not have been applied.
    pub cancelled: bool,
}

impl MigrationOutcome {
    /// Latest cursor per shard.
    pub fn latest_per_shard(&self) -> BTreeMap<ShardId, ProgressCursor> {
        let mut latest = BTreeMap::new();
        for cursor in &self.completed {
            latest.insert(cursor.shard_id.clone(), cursor.clone());
        }
        latest
    }

    pub fn is_success(&self) -> bool {
        !self.cancelled && self.failures.is_empty()
    }

    pub fn docs_written(&self) -> u64 {
        self.completed.iter().map(|c| c.docs_in_batch).sum()
    }
}

/// Poll `cursors` until exhaustion, the first error, or a shutdown signal.
///
/// Dropping the stream on shutdown halts every in-flight shard; cursors
/// already passed to `on_cursor` stay valid.
pub async fn run_until_shutdown<F>(
    mut cursors: CursorStream,
    mut shutdown: broadcast::Receiver<()>,
    mut on_cursor: F,
) -> MigrationOutcome
where
    F: FnMut(&ProgressCursor),
{
    let mut outcome = MigrationOutcome::default();
    let mut senders_gone = false;

    loop {
        tokio::select! {
            biased;

            signal = shutdown.recv(), if !senders_gone => {
                if let Err(broadcast::error::RecvError::Closed) = signal {
                    // nobody can request shutdown any more
                    senders_gone = true;
                    continue;
                }
                info!(completed = outcome.completed.len(), "shutdown requested, stopping migration");
                outcome.cancelled = true;
                break;
            }

            next = cursors.next() => match next {
                Some(Ok(cursor)) => {
                    on_cursor(&cursor);
                    outcome.completed.push(cursor);
                }
                Some(Err(e)) => {
                    warn!(error = %e, "migration stopped");
                    outcome.failures.push(e);
                    break;
                }
                None => break,
            },
        }
    }

    outcome
}
