use std::sync::Arc;

use bytes::Bytes;
use shardshift_proto::{ChangeKind, DocBitSet, DocumentChange};

use crate::error::Result;

/// A stored document as a segment returns it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawDocument {
    pub id: String,
    pub doc_type: Option<String>,
    pub routing: Option<String>,
    pub source: Bytes,
}

impl RawDocument {
    pub fn new(id: impl Into<String>, source: impl Into<Bytes>) -> Self {
        Self {
            id: id.into(),
            doc_type: None,
            routing: None,
            source: source.into(),
        }
    }

    pub fn with_routing(mut self, routing: impl Into<String>) -> Self {
        self.routing = Some(routing.into());
        self
    }

    pub fn with_type(mut self, doc_type: impl Into<String>) -> Self {
        self.doc_type = Some(doc_type.into());
        self
    }

    /// Change that writes this document to the target.
    pub fn into_addition(self) -> DocumentChange {
        let change = DocumentChange::index(self.id, self.source);
        Self::decorate(change, self.doc_type, self.routing)
    }

    /// Change that removes this document from the target. The source is dropped.
    pub fn into_deletion(self) -> DocumentChange {
        let change = DocumentChange::delete(self.id);
        Self::decorate(change, self.doc_type, self.routing)
    }

    pub fn into_change(self, kind: ChangeKind) -> DocumentChange {
        match kind {
            ChangeKind::Index => self.into_addition(),
            ChangeKind::Delete => self.into_deletion(),
        }
    }

    fn decorate(
        mut change: DocumentChange,
        doc_type: Option<String>,
        routing: Option<String>,
    ) -> DocumentChange {
        if let Some(doc_type) = doc_type {
            change = change.with_type(doc_type);
        }
        if let Some(routing) = routing {
            change = change.with_routing(routing);
        }
        change
    }
}

/// Read access to one immutable segment.
///
/// Implementations are blocking; the delta engine calls them from worker
/// threads.
pub trait SegmentReader: Send + Sync {
    /// Segment name, unique within a shard and stable across snapshots.
    fn name(&self) -> &str;

    /// Number of document ordinals, live or deleted.
    fn max_doc(&self) -> usize;

    /// Live documents, or `None` when every ordinal in `[0, max_doc)` is live.
    ///
    /// A returned set always has length `max_doc`.
    fn live_docs(&self) -> Option<Arc<DocBitSet>>;

    /// Load the document at `ordinal`.
    fn document(&self, ordinal: usize) -> Result<RawDocument>;

    /// Whether this segment has recorded deletions.
    fn has_deletions(&self) -> bool {
        self.live_docs().is_some()
    }

    /// Number of live documents.
    fn num_docs(&self) -> usize {
        self.live_docs()
            .map(|live| live.cardinality())
            .unwrap_or_else(|| self.max_doc())
    }
}

/// A point-in-time view of one shard.
pub trait ShardReader: Send + Sync {
    /// The shard's segments. Failing to open any of them fails the call.
    fn leaves(&self) -> Result<Vec<Arc<dyn SegmentReader>>>;
}
