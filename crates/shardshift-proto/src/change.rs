//! Document change IR.
//!
//! These are the leaf data types flowing through the migration pipeline:
//! one [`DocumentChange`] per document, addressed to a shard by [`ShardId`],
//! with progress reported as [`ProgressCursor`] values.

use std::fmt;

use bytes::Bytes;
use rkyv::{Archive, Deserialize, Serialize};
use serde::{Deserialize as SerdeDeserialize, Serialize as SerdeSerialize};

/// Kind of change applied to a target document.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Archive, Serialize, Deserialize, SerdeSerialize, SerdeDeserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChangeKind {
    /// Write the document source (create or overwrite).
    Index,
    /// Remove the document.
    Delete,
}

/// A single document change.
///
/// The source is present if and only if the kind is [`ChangeKind::Index`];
/// the constructors are the only way to build a change, so the invariant
/// always holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentChange {
    id: String,
    doc_type: Option<String>,
    routing: Option<String>,
    source: Option<Bytes>,
    kind: ChangeKind,
}

impl DocumentChange {
    /// An index change carrying the raw document source.
    pub fn index(id: impl Into<String>, source: impl Into<Bytes>) -> Self {
        Self {
            id: id.into(),
            doc_type: None,
            routing: None,
            source: Some(source.into()),
            kind: ChangeKind::Index,
        }
    }

    /// A delete change.
    pub fn delete(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            doc_type: None,
            routing: None,
            source: None,
            kind: ChangeKind::Delete,
        }
    }

    /// Set the legacy mapping type.
    pub fn with_type(mut self, doc_type: impl Into<String>) -> Self {
        self.doc_type = Some(doc_type.into());
        self
    }

    /// Set the routing key.
    pub fn with_routing(mut self, routing: impl Into<String>) -> Self {
        self.routing = Some(routing.into());
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn doc_type(&self) -> Option<&str> {
        self.doc_type.as_deref()
    }

    pub fn routing(&self) -> Option<&str> {
        self.routing.as_deref()
    }

    /// Raw document source, `None` for deletes.
    pub fn source(&self) -> Option<&Bytes> {
        self.source.as_ref()
    }

    pub fn kind(&self) -> ChangeKind {
        self.kind
    }

    pub fn is_delete(&self) -> bool {
        self.kind == ChangeKind::Delete
    }

    /// Approximate number of bytes this change contributes to a batch.
    pub fn size_bytes(&self) -> u64 {
        let source = self.source.as_ref().map(|s| s.len()).unwrap_or(0);
        let routing = self.routing.as_ref().map(|r| r.len()).unwrap_or(0);
        (self.id.len() + source + routing) as u64
    }
}

/// Identity of one shard's unit of work.
#[derive(
    Debug,
    Clone,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Archive,
    Serialize,
    Deserialize,
    SerdeSerialize,
    SerdeDeserialize,
)]
pub struct ShardId {
    /// Snapshot or live source name.
    pub source: String,
    /// Index the shard belongs to.
    pub index: String,
    /// Shard number within the index.
    pub shard: u32,
}

impl ShardId {
    pub fn new(source: impl Into<String>, index: impl Into<String>, shard: u32) -> Self {
        Self {
            source: source.into(),
            index: index.into(),
            shard,
        }
    }
}

impl fmt::Display for ShardId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.source, self.index, self.shard)
    }
}

/// Resumable checkpoint emitted after each batch a shard writes.
///
/// `last_doc_offset` is cumulative: it is the number of changes of the
/// shard's sequence reflected on the target, so restarting the shard at this
/// offset skips exactly what has been written. It never decreases across a
/// shard's successive batches.
#[derive(
    Debug, Clone, PartialEq, Eq, Archive, Serialize, Deserialize, SerdeSerialize, SerdeDeserialize,
)]
pub struct ProgressCursor {
    pub shard_id: ShardId,
    pub last_doc_offset: u64,
    pub docs_in_batch: u64,
    pub bytes_in_batch: u64,
}

impl ProgressCursor {
    /// Cursor for a batch of `docs` changes that followed `previous_offset`.
    pub fn after_batch(shard_id: ShardId, previous_offset: u64, docs: u64, bytes: u64) -> Self {
        Self {
            shard_id,
            last_doc_offset: previous_offset + docs,
            docs_in_batch: docs,
            bytes_in_batch: bytes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_change_has_source() {
        let change = DocumentChange::index("doc-1", &b"{\"a\":1}"[..]).with_routing("r1");
        assert_eq!(change.kind(), ChangeKind::Index);
        assert!(!change.is_delete());
        assert_eq!(change.source().map(|s| s.as_ref()), Some(&b"{\"a\":1}"[..]));
        assert_eq!(change.routing(), Some("r1"));
        assert_eq!(change.size_bytes(), 5 + 7 + 2);
    }

    #[test]
    fn test_delete_change_has_no_source() {
        let change = DocumentChange::delete("doc-1").with_type("_doc");
        assert!(change.is_delete());
        assert!(change.source().is_none());
        assert_eq!(change.doc_type(), Some("_doc"));
        assert_eq!(change.size_bytes(), 5);
    }

    #[test]
    fn test_shard_id_display() {
        let shard = ShardId::new("snap-1", "logs", 3);
        assert_eq!(shard.to_string(), "snap-1/logs/3");
    }

    #[test]
    fn test_cursor_after_batch() {
        let shard = ShardId::new("snap-1", "logs", 0);
        let first = ProgressCursor::after_batch(shard.clone(), 0, 10, 400);
        let second = ProgressCursor::after_batch(shard, first.last_doc_offset, 5, 100);
        assert_eq!(first.last_doc_offset, 10);
        assert_eq!(second.last_doc_offset, 15);
        assert_eq!(second.docs_in_batch, 5);
    }

    #[test]
    fn test_cursor_rkyv_roundtrip() {
        let cursor = ProgressCursor::after_batch(ShardId::new("s", "i", 1), 7, 3, 12);
        let bytes = rkyv::to_bytes::<rkyv::rancor::Error>(&cursor).unwrap();
        let archived = rkyv::access::<ArchivedProgressCursor, rkyv::rancor::Error>(&bytes).unwrap();
        let restored: ProgressCursor =
            rkyv::deserialize::<ProgressCursor, rkyv::rancor::Error>(archived).unwrap();
        assert_eq!(restored, cursor);
    }
}
