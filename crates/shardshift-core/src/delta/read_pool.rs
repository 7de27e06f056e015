//! Bounded, lazy reads of delta documents.

use std::collections::VecDeque;
use std::sync::Arc;

use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};
use shardshift_proto::ChangeKind;
use tokio::sync::Semaphore;

use super::engine::{DeltaDocument, ReaderAndBase};
use super::DeltaConfig;
use crate::error::{Error, Result};

/// Bounded pool for blocking segment reads.
///
/// Every stream produced by one pool shares its permits, so the total number
/// of in-flight blocking reads never exceeds `read_workers` no matter how
/// many shards are being read. Each stream holds at most one chunk of
/// documents at a time.
#[derive(Clone)]
pub struct ReadPool {
    permits: Arc<Semaphore>,
    chunk_size: usize,
}

impl ReadPool {
    pub fn new(config: &DeltaConfig) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(config.read_workers)),
            chunk_size: config.chunk_size,
        }
    }

    /// Lazily read the live documents of `units`, in order, skipping the
    /// first `skip` of them.
    ///
    /// Units wholly covered by `skip` are dropped without touching their
    /// segment.
    pub fn read(
        &self,
        units: Vec<(ReaderAndBase, ChangeKind)>,
        skip: u64,
    ) -> BoxStream<'static, Result<DeltaDocument>> {
        let mut remaining = skip;
        let mut queue = VecDeque::with_capacity(units.len());
        for (unit, kind) in units {
            let count = unit.doc_count() as u64;
            if remaining >= count {
                remaining -= count;
                continue;
            }
            let mut cursor = UnitCursor {
                unit,
                kind,
                next: 0,
            };
            cursor.skip_live(remaining);
            remaining = 0;
            queue.push_back(cursor);
        }

        let state = ReadState {
            queue,
            permits: Arc::clone(&self.permits),
            chunk_size: self.chunk_size,
        };

        stream::try_unfold(state, |mut state| async move {
            let chunk = state.next_chunk().await?;
            Ok::<_, Error>(chunk.map(|docs| (docs, state)))
        })
        .map_ok(|docs| stream::iter(docs.into_iter().map(Ok::<_, Error>)))
        .try_flatten()
        .boxed()
    }
}

/// Position within one unit's live ordinals.
struct UnitCursor {
    unit: ReaderAndBase,
    kind: ChangeKind,
    next: usize,
}

impl UnitCursor {
    fn next_live(&mut self) -> Option<usize> {
        let max_doc = self.unit.reader.max_doc();
        if self.next >= max_doc {
            return None;
        }
        let ordinal = match &self.unit.live {
            Some(live) => live.next_set_bit(self.next)?,
            None => self.next,
        };
        self.next = ordinal + 1;
        Some(ordinal)
    }

    fn skip_live(&mut self, count: u64) {
        for _ in 0..count {
            if self.next_live().is_none() {
                break;
            }
        }
    }

    fn take_chunk(&mut self, limit: usize) -> Vec<usize> {
        let mut ordinals = Vec::with_capacity(limit);
        while ordinals.len() < limit {
            match self.next_live() {
                Some(ordinal) => ordinals.push(ordinal),
                None => break,
            }
        }
        ordinals
    }
}

struct ReadState {
    queue: VecDeque<UnitCursor>,
    permits: Arc<Semaphore>,
    chunk_size: usize,
}

impl ReadState {
    async fn next_chunk(&mut self) -> Result<Option<Vec<DeltaDocument>>> {
        loop {
            let Some(cursor) = self.queue.front_mut() else {
                return Ok(None);
            };
            let ordinals = cursor.take_chunk(self.chunk_size);
            if ordinals.is_empty() {
                self.queue.pop_front();
                continue;
            }

            let reader = Arc::clone(&cursor.unit.reader);
            let base = cursor.unit.base;
            let kind = cursor.kind;
            let permit = Arc::clone(&self.permits)
                .acquire_owned()
                .await
                .map_err(|e| Error::Task(format!("read pool closed: {}", e)))?;

            let docs = tokio::task::spawn_blocking(move || {
                let _permit = permit;
                let segment: Arc<str> = Arc::from(reader.name());
                ordinals
                    .into_iter()
                    .map(|ordinal| {
                        let raw = reader.document(ordinal)?;
                        Ok(DeltaDocument {
                            address: base + ordinal as u64,
                            segment: Arc::clone(&segment),
                            change: raw.into_change(kind),
                        })
                    })
                    .collect::<Result<Vec<_>>>()
            })
            .await??;

            return Ok(Some(docs));
        }
    }
}
