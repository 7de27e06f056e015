//! Snapshot-backed document source.

use std::sync::Arc;

use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};
use shardshift_proto::{DocumentChange, ShardId};
use tracing::info_span;

use crate::delta::DeltaEngine;
use crate::error::{Error, Result};
use crate::ports::{DocumentSource, ShardOpener};

/// Document source that diffs two snapshots of each shard.
///
/// Without a previous snapshot every live document of the current snapshot is
/// an addition, which makes this the source for full migrations too.
///
/// The sequence is `full` for a full copy and `since:<name>` for a delta from
/// the previous snapshot `name`.
pub struct SnapshotSource {
    previous: Option<(String, Arc<dyn ShardOpener>)>,
    current: Arc<dyn ShardOpener>,
    engine: Arc<DeltaEngine>,
}

impl SnapshotSource {
    pub fn new(current: Arc<dyn ShardOpener>, engine: Arc<DeltaEngine>) -> Self {
        Self {
            previous: None,
            current,
            engine,
        }
    }

    /// Only emit changes made since `previous`, the snapshot called `name`.
    pub fn with_previous(
        mut self,
        name: impl Into<String>,
        previous: Arc<dyn ShardOpener>,
    ) -> Self {
        self.previous = Some((name.into(), previous));
        self
    }
}

impl DocumentSource for SnapshotSource {
    fn read_changes(
        &self,
        shard: &ShardId,
        starting_offset: u64,
    ) -> BoxStream<'static, Result<DocumentChange>> {
        let previous = self.previous.as_ref().map(|(_, opener)| Arc::clone(opener));
        let current = Arc::clone(&self.current);
        let engine = Arc::clone(&self.engine);
        let shard = shard.clone();

        stream::once(async move {
            let compute_engine = Arc::clone(&engine);
            let delta = tokio::task::spawn_blocking(move || {
                let _span = info_span!("delta", shard = %shard).entered();
                let current_view = current
                    .open_shard(&shard.index, shard.shard)?
                    .ok_or_else(|| Error::Source(format!("shard {} not found", shard)))?;
                let previous_view = match previous {
                    Some(previous) => previous.open_shard(&shard.index, shard.shard)?,
                    None => None,
                };
                compute_engine.compute(previous_view.as_deref(), current_view.as_ref())
            })
            .await??;

            Ok::<_, Error>(
                engine
                    .changes(&delta, starting_offset)
                    .map_ok(|doc| doc.change),
            )
        })
        .try_flatten()
        .boxed()
    }

    fn sequence(&self) -> String {
        match &self.previous {
            Some((name, _)) => format!("since:{}", name),
            None => "full".to_string(),
        }
    }
}
