//! Segment-level delta between two views of a shard.
//!
//! Segments are immutable, so a segment present in both views can only have
//! lost documents. New segments contribute every live document as an
//! addition; shared segments contribute the bits live before and dead now as
//! deletions.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use futures::stream::BoxStream;
use shardshift_proto::{ChangeKind, DocBitSet, DocumentChange};
use tracing::{debug, info};

use super::read_pool::ReadPool;
use super::DeltaConfig;
use crate::error::{Error, Result};
use crate::metrics::SharedMetricsRegistry;
use crate::segment::{SegmentReader, ShardReader};

/// One unit of delta work: a segment, its address base, and the ordinals to
/// read from it.
#[derive(Clone)]
pub struct ReaderAndBase {
    pub reader: Arc<dyn SegmentReader>,
    /// Global address of the segment's ordinal 0.
    pub base: u64,
    /// Ordinals to read, or `None` for every ordinal in `[0, max_doc)`.
    pub live: Option<Arc<DocBitSet>>,
}

impl ReaderAndBase {
    /// Number of documents this unit yields.
    pub fn doc_count(&self) -> usize {
        match &self.live {
            Some(live) => live.cardinality(),
            None => self.reader.max_doc(),
        }
    }

    pub fn segment_name(&self) -> &str {
        self.reader.name()
    }
}

impl fmt::Debug for ReaderAndBase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReaderAndBase")
            .field("segment", &self.reader.name())
            .field("base", &self.base)
            .field("docs", &self.doc_count())
            .finish()
    }
}

/// Counts gathered while computing a delta.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeltaStats {
    pub segments_examined: u64,
    pub segments_changed: u64,
    pub addition_docs: u64,
    pub deletion_docs: u64,
}

/// Additions and deletions between two views of a shard.
#[derive(Debug, Clone, Default)]
pub struct ShardDelta {
    pub additions: Vec<ReaderAndBase>,
    pub deletions: Vec<ReaderAndBase>,
    pub stats: DeltaStats,
}

impl ShardDelta {
    pub fn is_empty(&self) -> bool {
        self.additions.is_empty() && self.deletions.is_empty()
    }

    /// Length of the shard's change sequence.
    pub fn total_changes(&self) -> u64 {
        self.stats.addition_docs + self.stats.deletion_docs
    }
}

/// A materialized change and where it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeltaDocument {
    /// Segment base plus ordinal. Deletions use a base past the end of the
    /// current view, so addresses never collide between the two sequences.
    pub address: u64,
    pub segment: Arc<str>,
    pub change: DocumentChange,
}

type SegmentMap = BTreeMap<String, Arc<dyn SegmentReader>>;

/// Computes shard deltas and materializes their documents.
pub struct DeltaEngine {
    pool: ReadPool,
    metrics: Option<SharedMetricsRegistry>,
}

impl DeltaEngine {
    pub fn new(config: DeltaConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            pool: ReadPool::new(&config),
            metrics: None,
        })
    }

    pub fn with_metrics(mut self, metrics: SharedMetricsRegistry) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Compare `previous` (if any) against `current`.
    ///
    /// Opening either view's segments is the only I/O performed here; any
    /// failure is returned as-is.
    pub fn compute(
        &self,
        previous: Option<&dyn ShardReader>,
        current: &dyn ShardReader,
    ) -> Result<ShardDelta> {
        let current_segments = segment_map(current)?;
        let previous_segments = match previous {
            Some(previous) => segment_map(previous)?,
            None => SegmentMap::new(),
        };

        let current_total: u64 = current_segments
            .values()
            .map(|s| s.max_doc() as u64)
            .sum();
        let additions = newly_live(&previous_segments, &current_segments, 0);
        let deletions = newly_live(&current_segments, &previous_segments, current_total);

        let changed: BTreeSet<&str> = additions
            .iter()
            .chain(&deletions)
            .map(|unit| unit.segment_name())
            .collect();
        let examined = current_segments.len()
            + previous_segments
                .keys()
                .filter(|name| !current_segments.contains_key(*name))
                .count();

        let stats = DeltaStats {
            segments_examined: examined as u64,
            segments_changed: changed.len() as u64,
            addition_docs: additions.iter().map(|u| u.doc_count() as u64).sum(),
            deletion_docs: deletions.iter().map(|u| u.doc_count() as u64).sum(),
        };

        if let Some(metrics) = &self.metrics {
            metrics.record_delta(
                stats.segments_examined,
                stats.segments_changed,
                stats.addition_docs,
                stats.deletion_docs,
            );
        }
        info!(
            segments = stats.segments_examined,
            changed = stats.segments_changed,
            additions = stats.addition_docs,
            deletions = stats.deletion_docs,
            "computed shard delta"
        );

        Ok(ShardDelta {
            additions,
            deletions,
            stats,
        })
    }

    /// The shard's full change sequence: deletions, then additions, skipping
    /// the first `starting_offset` changes.
    pub fn changes(
        &self,
        delta: &ShardDelta,
        starting_offset: u64,
    ) -> BoxStream<'static, Result<DeltaDocument>> {
        let units = delta
            .deletions
            .iter()
            .map(|unit| (unit.clone(), ChangeKind::Delete))
            .chain(
                delta
                    .additions
                    .iter()
                    .map(|unit| (unit.clone(), ChangeKind::Index)),
            )
            .collect();
        self.pool.read(units, starting_offset)
    }

    pub fn additions(&self, delta: &ShardDelta) -> BoxStream<'static, Result<DeltaDocument>> {
        let units = delta
            .additions
            .iter()
            .map(|unit| (unit.clone(), ChangeKind::Index))
            .collect();
        self.pool.read(units, 0)
    }

    pub fn deletions(&self, delta: &ShardDelta) -> BoxStream<'static, Result<DeltaDocument>> {
        let units = delta
            .deletions
            .iter()
            .map(|unit| (unit.clone(), ChangeKind::Delete))
            .collect();
        self.pool.read(units, 0)
    }
}

fn segment_map(shard: &dyn ShardReader) -> Result<SegmentMap> {
    let mut segments = SegmentMap::new();
    for segment in shard.leaves()? {
        let name = segment.name().to_string();
        if segments.insert(name.clone(), segment).is_some() {
            return Err(Error::Segment {
                segment: name,
                message: "segment listed twice in one shard view".into(),
            });
        }
    }
    Ok(segments)
}

/// Documents live in `to` that were not live in `from`, one unit per
/// contributing segment of `to`, addressed from `base` in segment-name order.
fn newly_live(from: &SegmentMap, to: &SegmentMap, base: u64) -> Vec<ReaderAndBase> {
    let mut units = Vec::new();
    let mut offset = base;

    for (name, segment) in to {
        let max_doc = segment.max_doc();
        let live = match from.get(name) {
            // Wholly new segment: its own live set, no bit work.
            None => match segment.live_docs() {
                Some(live) if live.none() => {
                    debug!(segment = %name, "new segment has no live documents, skipping");
                    None
                }
                live => Some(live),
            },
            Some(earlier) => match earlier.live_docs() {
                None => {
                    debug!(segment = %name, "segment had no deletions, skipping");
                    None
                }
                Some(earlier_live) => {
                    let bits = match segment.live_docs() {
                        Some(live) => {
                            let mut bits = (*live).clone();
                            bits.and_not(&earlier_live);
                            bits
                        }
                        None => {
                            let mut bits = earlier_live.resized(max_doc);
                            bits.not();
                            bits
                        }
                    };
                    if bits.none() {
                        debug!(segment = %name, "no differing documents, skipping");
                        None
                    } else {
                        Some(Some(Arc::new(bits)))
                    }
                }
            },
        };

        if let Some(live) = live {
            units.push(ReaderAndBase {
                reader: Arc::clone(segment),
                base: offset,
                live,
            });
        }
        offset += max_doc as u64;
    }

    units
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::new_shared_registry;
    use crate::segment::{MemorySegment, MemoryShard, RawDocument};
    use futures::TryStreamExt;

    fn segment(name: &str, docs: usize) -> MemorySegment {
        MemorySegment::new(
            name,
            (0..docs)
                .map(|i| RawDocument::new(format!("{}-{}", name, i), format!("{{\"i\":{}}}", i)))
                .collect(),
        )
    }

    fn engine() -> DeltaEngine {
        DeltaEngine::new(DeltaConfig::default().with_chunk_size(2)).unwrap()
    }

    fn ids(docs: &[DeltaDocument]) -> Vec<&str> {
        docs.iter().map(|d| d.change.id()).collect()
    }

    #[tokio::test]
    async fn test_identical_views_are_empty() {
        let s1 = segment("s1", 4).with_deletions([2]);
        let s2 = segment("s2", 3);
        let previous = MemoryShard::new([s1.clone(), s2.clone()]);
        let current = MemoryShard::new([s1, s2]);

        let engine = engine();
        let delta = engine.compute(Some(&previous), &current).unwrap();
        assert!(delta.is_empty());
        assert_eq!(delta.stats.segments_examined, 2);
        assert_eq!(delta.stats.segments_changed, 0);

        let additions: Vec<_> = engine.additions(&delta).try_collect().await.unwrap();
        let deletions: Vec<_> = engine.deletions(&delta).try_collect().await.unwrap();
        assert!(additions.is_empty());
        assert!(deletions.is_empty());
    }

    #[tokio::test]
    async fn test_removed_segment_yields_its_live_docs_as_deletions() {
        let keep = segment("s1", 2);
        let gone = segment("s9", 5).with_deletions([0, 3]);
        let previous = MemoryShard::new([keep.clone(), gone]);
        let current = MemoryShard::new([keep]);

        let engine = engine();
        let delta = engine.compute(Some(&previous), &current).unwrap();
        assert!(delta.additions.is_empty());
        assert_eq!(delta.stats.deletion_docs, 3);

        let deletions: Vec<_> = engine.deletions(&delta).try_collect().await.unwrap();
        assert_eq!(ids(&deletions), vec!["s9-1", "s9-2", "s9-4"]);
        assert!(deletions.iter().all(|d| d.change.is_delete()));
        assert!(deletions.iter().all(|d| d.change.source().is_none()));
    }

    #[tokio::test]
    async fn test_removed_clean_segment_deletes_every_doc() {
        let previous = MemoryShard::new([segment("s9", 4)]);
        let current = MemoryShard::default();

        let engine = engine();
        let delta = engine.compute(Some(&previous), &current).unwrap();
        let deletions: Vec<_> = engine.deletions(&delta).try_collect().await.unwrap();
        assert_eq!(deletions.len(), 4);
    }

    #[tokio::test]
    async fn test_newly_live_docs_in_shared_segment() {
        let s1 = segment("s1", 3);
        let s2 = segment("s2", 5);
        let previous = MemoryShard::new([s1.clone(), s2.with_deletions([1, 2, 4])]);
        let current = MemoryShard::new([s1, s2]);

        let engine = engine();
        let delta = engine.compute(Some(&previous), &current).unwrap();
        let additions: Vec<_> = engine.additions(&delta).try_collect().await.unwrap();
        let deletions: Vec<_> = engine.deletions(&delta).try_collect().await.unwrap();

        assert_eq!(additions.len(), 3);
        assert!(additions.iter().all(|d| &*d.segment == "s2"));
        assert_eq!(ids(&additions), vec!["s2-1", "s2-2", "s2-4"]);
        assert!(deletions.is_empty());
    }

    #[tokio::test]
    async fn test_new_deletions_in_shared_segment() {
        let s1 = segment("s1", 6).with_deletions([0]);
        let previous = MemoryShard::new([s1.clone()]);
        let current = MemoryShard::new([s1.with_deletions([2, 5])]);

        let engine = engine();
        let delta = engine.compute(Some(&previous), &current).unwrap();
        assert!(delta.additions.is_empty());

        let deletions: Vec<_> = engine.deletions(&delta).try_collect().await.unwrap();
        assert_eq!(ids(&deletions), vec!["s1-2", "s1-5"]);
    }

    #[tokio::test]
    async fn test_new_segment_respects_its_live_docs() {
        let previous = MemoryShard::new([segment("a", 2)]);
        let current = MemoryShard::new([segment("a", 2), segment("b", 4).with_deletions([1])]);

        let engine = engine();
        let delta = engine.compute(Some(&previous), &current).unwrap();
        let additions: Vec<_> = engine.additions(&delta).try_collect().await.unwrap();
        assert_eq!(ids(&additions), vec!["b-0", "b-2", "b-3"]);
        // "a" holds addresses 0..2
        assert_eq!(additions[0].address, 2);
        assert_eq!(additions[2].address, 5);
    }

    #[tokio::test]
    async fn test_no_previous_view_adds_everything() {
        let current = MemoryShard::new([segment("a", 2), segment("b", 1)]);
        let engine = engine();
        let delta = engine.compute(None, &current).unwrap();
        assert_eq!(delta.stats.addition_docs, 3);
        assert!(delta.deletions.is_empty());
    }

    #[tokio::test]
    async fn test_deletion_addresses_use_distinct_base() {
        let previous = MemoryShard::new([segment("old", 2)]);
        let current = MemoryShard::new([segment("new", 3)]);

        let engine = engine();
        let delta = engine.compute(Some(&previous), &current).unwrap();
        let changes: Vec<_> = engine.changes(&delta, 0).try_collect().await.unwrap();

        let addresses: Vec<u64> = changes.iter().map(|d| d.address).collect();
        assert_eq!(addresses, vec![3, 4, 0, 1, 2]);
    }

    #[tokio::test]
    async fn test_changes_put_deletions_first_and_skip_offset() {
        let previous = MemoryShard::new([segment("old", 3)]);
        let current = MemoryShard::new([segment("new", 4)]);

        let engine = engine();
        let delta = engine.compute(Some(&previous), &current).unwrap();
        assert_eq!(delta.total_changes(), 7);

        let all: Vec<_> = engine.changes(&delta, 0).try_collect().await.unwrap();
        assert_eq!(
            ids(&all),
            vec!["old-0", "old-1", "old-2", "new-0", "new-1", "new-2", "new-3"]
        );

        let resumed: Vec<_> = engine.changes(&delta, 4).try_collect().await.unwrap();
        assert_eq!(ids(&resumed), vec!["new-1", "new-2", "new-3"]);

        let past_end: Vec<_> = engine.changes(&delta, 50).try_collect().await.unwrap();
        assert!(past_end.is_empty());
    }

    #[tokio::test]
    async fn test_skip_inside_sparse_segment() {
        let current = MemoryShard::new([segment("s", 8).with_deletions([0, 2, 3])]);
        let engine = engine();
        let delta = engine.compute(None, &current).unwrap();
        let resumed: Vec<_> = engine.changes(&delta, 2).try_collect().await.unwrap();
        assert_eq!(ids(&resumed), vec!["s-5", "s-6", "s-7"]);
    }

    #[tokio::test]
    async fn test_corrupt_segment_fails_the_stream() {
        let current = MemoryShard::new([segment("s", 5).with_corrupt_ordinal(3)]);
        let engine = engine();
        let delta = engine.compute(None, &current).unwrap();
        let result: Result<Vec<_>> = engine.changes(&delta, 0).try_collect().await;
        assert!(matches!(result, Err(Error::Segment { .. })));
    }

    #[tokio::test]
    async fn test_duplicate_segment_names_rejected() {
        let current = MemoryShard::new([segment("s", 1), segment("s", 2)]);
        let err = engine().compute(None, &current).unwrap_err();
        assert!(matches!(err, Error::Segment { .. }));
    }

    #[test]
    fn test_metrics_recorded_on_compute() {
        let metrics = new_shared_registry();
        let engine = engine().with_metrics(Arc::clone(&metrics));
        let previous = MemoryShard::new([segment("a", 2), segment("b", 2)]);
        let current = MemoryShard::new([segment("b", 2), segment("c", 3)]);

        engine.compute(Some(&previous), &current).unwrap();
        assert_eq!(metrics.segments_examined(), 3);
        assert_eq!(metrics.segments_changed(), 2);
        assert_eq!(metrics.addition_docs(), 3);
        assert_eq!(metrics.deletion_docs(), 2);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let err = DeltaEngine::new(DeltaConfig::default().with_read_workers(0)).err();
        assert!(matches!(err, Some(Error::Config(_))));
    }
}
