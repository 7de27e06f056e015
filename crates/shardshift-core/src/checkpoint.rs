//! Persistent progress cursors.
//!
//! The store keeps the latest [`ProgressCursor`] per shard and change
//! sequence so an interrupted migration can restart each shard where it left
//! off. An offset only means something within the sequence it was counted
//! in: a full copy and a delta of the same shard are tracked separately.

use std::path::Path;

use rkyv::util::AlignedVec;
use shardshift_proto::change::ArchivedProgressCursor;
use shardshift_proto::{ProgressCursor, ShardId};
use sled::{Db, Tree};

use crate::error::{Error, Result};

/// Latest cursor per shard and sequence, backed by a sled tree.
///
/// Keys are `sequence \0 source \0 index \0 shard(be)`; values are
/// rkyv-encoded cursors.
/// Stored offsets only move forward.
#[derive(Clone)]
pub struct CursorStore {
    tree: Tree,
}

impl CursorStore {
    const TREE_NAME: &'static str = "cursors";

    /// Open or create the cursor tree in `db`.
    pub fn open(db: &Db) -> Result<Self> {
        Ok(Self {
            tree: db.open_tree(Self::TREE_NAME)?,
        })
    }

    /// Open or create a standalone store at `path`.
    pub fn open_path(path: impl AsRef<Path>) -> Result<Self> {
        let db = sled::open(path)?;
        Self::open(&db)
    }

    /// Record `cursor` if it is ahead of the stored one.
    ///
    /// Returns whether the stored cursor changed.
    pub fn record(&self, sequence: &str, cursor: &ProgressCursor) -> Result<bool> {
        let key = Self::key(sequence, &cursor.shard_id);
        let value = rkyv::to_bytes::<rkyv::rancor::Error>(cursor)
            .map_err(|e| Error::Serialization(e.to_string()))?;

        loop {
            let existing = self.tree.get(&key)?;
            if let Some(bytes) = &existing {
                if Self::decode(bytes)?.last_doc_offset >= cursor.last_doc_offset {
                    return Ok(false);
                }
            }
            match self
                .tree
                .compare_and_swap(&key, existing, Some(value.as_slice()))?
            {
                Ok(()) => return Ok(true),
                Err(_) => continue,
            }
        }
    }

    pub fn get(&self, sequence: &str, shard: &ShardId) -> Result<Option<ProgressCursor>> {
        match self.tree.get(Self::key(sequence, shard))? {
            Some(bytes) => Ok(Some(Self::decode(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Offset to resume `shard` from within `sequence`, if it has made progress.
    pub fn last_offset(&self, sequence: &str, shard: &ShardId) -> Result<Option<u64>> {
        Ok(self
            .get(sequence, shard)?
            .map(|cursor| cursor.last_doc_offset))
    }

    /// Forget `shard`'s progress within `sequence`.
    pub fn clear(&self, sequence: &str, shard: &ShardId) -> Result<()> {
        self.tree.remove(Self::key(sequence, shard))?;
        Ok(())
    }

    /// Every stored cursor of every sequence, in key order.
    pub fn cursors(&self) -> Result<Vec<ProgressCursor>> {
        self.tree
            .iter()
            .values()
            .map(|value| Self::decode(&value?))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.tree.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }

    pub fn flush(&self) -> Result<()> {
        self.tree.flush()?;
        Ok(())
    }

    fn key(sequence: &str, shard: &ShardId) -> Vec<u8> {
        let mut key =
            Vec::with_capacity(sequence.len() + shard.source.len() + shard.index.len() + 7);
        key.extend_from_slice(sequence.as_bytes());
        key.push(0);
        key.extend_from_slice(shard.source.as_bytes());
        key.push(0);
        key.extend_from_slice(shard.index.as_bytes());
        key.push(0);
        key.extend_from_slice(&shard.shard.to_be_bytes());
        key
    }

    fn decode(bytes: &[u8]) -> Result<ProgressCursor> {
        // sled values carry no alignment guarantee
        let mut aligned = AlignedVec::<16>::with_capacity(bytes.len());
        aligned.extend_from_slice(bytes);

        let archived = rkyv::access::<ArchivedProgressCursor, rkyv::rancor::Error>(&aligned)
            .map_err(|e| Error::Deserialization(e.to_string()))?;
        rkyv::deserialize::<ProgressCursor, rkyv::rancor::Error>(archived)
            .map_err(|e| Error::Deserialization(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL: &str = "full";

    fn store() -> (tempfile::TempDir, CursorStore) {
        let dir = tempfile::tempdir().unwrap();
        let db = sled::open(dir.path()).unwrap();
        let store = CursorStore::open(&db).unwrap();
        (dir, store)
    }

    fn cursor(shard: &ShardId, offset: u64) -> ProgressCursor {
        ProgressCursor {
            shard_id: shard.clone(),
            last_doc_offset: offset,
            docs_in_batch: 1,
            bytes_in_batch: 10,
        }
    }

    #[test]
    fn test_record_and_resume() {
        let (_dir, store) = store();
        let shard = ShardId::new("snap", "logs", 0);

        assert_eq!(store.last_offset(FULL, &shard).unwrap(), None);
        assert!(store.record(FULL, &cursor(&shard, 10)).unwrap());
        assert_eq!(store.last_offset(FULL, &shard).unwrap(), Some(10));
        assert_eq!(store.get(FULL, &shard).unwrap(), Some(cursor(&shard, 10)));
    }

    #[test]
    fn test_offsets_never_move_backwards() {
        let (_dir, store) = store();
        let shard = ShardId::new("snap", "logs", 0);

        store.record(FULL, &cursor(&shard, 20)).unwrap();
        assert!(!store.record(FULL, &cursor(&shard, 15)).unwrap());
        assert!(!store.record(FULL, &cursor(&shard, 20)).unwrap());
        assert_eq!(store.last_offset(FULL, &shard).unwrap(), Some(20));
    }

    #[test]
    fn test_shards_are_independent() {
        let (_dir, store) = store();
        let a = ShardId::new("snap", "logs", 0);
        let b = ShardId::new("snap", "logs", 1);
        let c = ShardId::new("snap", "logs-archive", 0);

        store.record(FULL, &cursor(&a, 5)).unwrap();
        store.record(FULL, &cursor(&b, 7)).unwrap();
        store.record(FULL, &cursor(&c, 9)).unwrap();
        assert_eq!(store.len(), 3);

        store.clear(FULL, &b).unwrap();
        assert_eq!(store.last_offset(FULL, &b).unwrap(), None);
        assert_eq!(store.last_offset(FULL, &a).unwrap(), Some(5));

        let offsets: Vec<u64> = store
            .cursors()
            .unwrap()
            .iter()
            .map(|c| c.last_doc_offset)
            .collect();
        assert_eq!(offsets, vec![5, 9]);
    }

    #[test]
    fn test_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let shard = ShardId::new("snap", "logs", 2);
        {
            let store = CursorStore::open_path(dir.path()).unwrap();
            store.record(FULL, &cursor(&shard, 42)).unwrap();
            store.flush().unwrap();
        }
        let store = CursorStore::open_path(dir.path()).unwrap();
        assert_eq!(store.last_offset(FULL, &shard).unwrap(), Some(42));
    }

    #[test]
    fn test_sequences_are_independent() {
        let (_dir, store) = store();
        let shard = ShardId::new("snap-2", "logs", 0);

        store.record(FULL, &cursor(&shard, 3)).unwrap();
        assert_eq!(store.last_offset("since:snap-1", &shard).unwrap(), None);

        store.record("since:snap-1", &cursor(&shard, 1)).unwrap();
        assert_eq!(store.last_offset(FULL, &shard).unwrap(), Some(3));
        assert_eq!(store.last_offset("since:snap-1", &shard).unwrap(), Some(1));
        assert_eq!(store.len(), 2);
    }
}
