//! Size- and count-bounded batching.
//!
//! Batching is an explicit fold: a [`BatchAccumulator`] is offered one change
//! at a time and hands back a closed [`Batch`] whenever a limit is reached.
//! [`batch_changes`] drives that fold over a change stream.

use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};
use shardshift_proto::DocumentChange;

use crate::error::Result;

/// Upper bounds for one batch. Both must be at least 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchLimits {
    pub max_docs: usize,
    pub max_bytes: u64,
}

/// A closed batch of changes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Batch {
    pub changes: Vec<DocumentChange>,
    pub bytes: u64,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }
}

/// Changes gathered toward the next batch.
#[derive(Debug, Default)]
pub struct BatchAccumulator {
    pending: Batch,
}

impl BatchAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether adding `change` would exceed a limit.
    ///
    /// An empty accumulator always accepts, so a single change larger than
    /// `max_bytes` still forms its own batch.
    pub fn would_overflow(&self, change: &DocumentChange, limits: BatchLimits) -> bool {
        !self.pending.is_empty()
            && (self.pending.len() + 1 > limits.max_docs
                || self.pending.bytes + change.size_bytes() > limits.max_bytes)
    }

    /// Add `change`, returning the batch it closed, if any.
    ///
    /// A byte overflow closes the pending batch before `change` joins the
    /// next one; reaching `max_docs` closes the batch immediately.
    pub fn offer(&mut self, change: DocumentChange, limits: BatchLimits) -> Option<Batch> {
        let closed = if self.would_overflow(&change, limits) {
            self.take()
        } else {
            None
        };

        self.pending.bytes += change.size_bytes();
        self.pending.changes.push(change);

        if closed.is_some() {
            return closed;
        }
        if self.pending.len() >= limits.max_docs {
            return self.take();
        }
        None
    }

    /// Close and return whatever is pending.
    pub fn take(&mut self) -> Option<Batch> {
        if self.pending.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.pending))
        }
    }
}

/// Group `changes` into batches bounded by `limits`.
///
/// The input is pulled only while a batch is being filled; at most one
/// change beyond the current batch is read ahead.
pub fn batch_changes(
    changes: BoxStream<'static, Result<DocumentChange>>,
    limits: BatchLimits,
) -> BoxStream<'static, Result<Batch>> {
    stream::try_unfold(
        (changes, BatchAccumulator::new(), false),
        move |(mut changes, mut acc, exhausted)| async move {
            if exhausted {
                return Ok(None);
            }
            while let Some(change) = changes.try_next().await? {
                if let Some(batch) = acc.offer(change, limits) {
                    return Ok(Some((batch, (changes, acc, false))));
                }
            }
            Ok(acc.take().map(|batch| (batch, (changes, acc, true))))
        },
    )
    .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    fn doc(i: usize, size: usize) -> DocumentChange {
        // id "dN" is 2 bytes for N < 10
        DocumentChange::index(format!("d{}", i), vec![b'x'; size - 2])
    }

    fn sizes(batches: &[Batch]) -> Vec<usize> {
        batches.iter().map(Batch::len).collect()
    }

    async fn run(changes: Vec<DocumentChange>, limits: BatchLimits) -> Vec<Batch> {
        let input = stream::iter(changes.into_iter().map(Ok)).boxed();
        batch_changes(input, limits).try_collect().await.unwrap()
    }

    #[tokio::test]
    async fn test_count_bound() {
        let changes = (0..5).map(|i| doc(i, 10)).collect();
        let limits = BatchLimits {
            max_docs: 2,
            max_bytes: 1_000,
        };
        assert_eq!(sizes(&run(changes, limits).await), vec![2, 2, 1]);
    }

    #[tokio::test]
    async fn test_byte_bound_closes_first() {
        let changes = (0..5).map(|i| doc(i, 10)).collect();
        let limits = BatchLimits {
            max_docs: 3,
            max_bytes: 15,
        };
        let batches = run(changes, limits).await;
        assert_eq!(sizes(&batches), vec![1, 1, 1, 1, 1]);
        assert!(batches.iter().all(|b| b.bytes == 10));
    }

    #[tokio::test]
    async fn test_oversized_change_forms_own_batch() {
        let changes = vec![doc(0, 5), doc(1, 50), doc(2, 5)];
        let limits = BatchLimits {
            max_docs: 10,
            max_bytes: 20,
        };
        assert_eq!(sizes(&run(changes, limits).await), vec![1, 1, 1]);
    }

    #[tokio::test]
    async fn test_order_preserved() {
        let changes = (0..7).map(|i| doc(i, 4)).collect();
        let limits = BatchLimits {
            max_docs: 3,
            max_bytes: 100,
        };
        let ids: Vec<String> = run(changes, limits)
            .await
            .iter()
            .flat_map(|b| b.changes.iter().map(|c| c.id().to_string()))
            .collect();
        assert_eq!(ids, (0..7).map(|i| format!("d{}", i)).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_empty_input() {
        let limits = BatchLimits {
            max_docs: 2,
            max_bytes: 10,
        };
        assert!(run(Vec::new(), limits).await.is_empty());
    }

    #[tokio::test]
    async fn test_error_is_propagated() {
        let input = stream::iter(vec![
            Ok(doc(0, 4)),
            Err(Error::Source("snapshot unreadable".into())),
        ])
        .boxed();
        let limits = BatchLimits {
            max_docs: 5,
            max_bytes: 100,
        };
        let result: Result<Vec<_>> = batch_changes(input, limits).try_collect().await;
        assert!(matches!(result, Err(Error::Source(_))));
    }

    #[test]
    fn test_accumulator_fold() {
        let limits = BatchLimits {
            max_docs: 2,
            max_bytes: 1_000,
        };
        let mut acc = BatchAccumulator::new();
        assert!(acc.offer(doc(0, 4), limits).is_none());
        let closed = acc.offer(doc(1, 4), limits).unwrap();
        assert_eq!(closed.len(), 2);
        assert_eq!(closed.bytes, 8);
        assert!(acc.take().is_none());
    }
}
