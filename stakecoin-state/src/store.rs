//! The transactional bucket store.
//!
//! One [`sled`] tree holds every bucket. A bucket is a named, contiguous
//! byte range of the tree's keyspace: each path segment is encoded as a
//! length byte followed by the segment, so nested buckets are ranges inside
//! their parent's range and iteration order inside a bucket equals byte
//! order of the keys.
//!
//! Invariant: a bucket holds either direct keys or child buckets, never
//! both. Every bucket in this crate and in the plugins keeps to that rule,
//! which makes the prefix encoding unambiguous.
//!
//! Mutation happens through [`BucketStore::update`]: writes are staged in
//! memory with read-your-writes semantics and land in a single atomic
//! [`sled::Batch`] on commit. Any error rolls the whole transaction back.

use std::collections::BTreeMap;

use tracing::trace;

use stakecoin_chain::{CanonicalDeserialize, CanonicalSerialize};

use crate::{Config, StoreError};

/// A handle to a (possibly nested) named bucket.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct BucketRef {
    prefix: Vec<u8>,
}

impl BucketRef {
    /// A top-level bucket.
    pub fn new(name: &[u8]) -> BucketRef {
        assert!(
            !name.is_empty() && name.len() < 256,
            "bucket names are 1..=255 bytes"
        );
        let mut prefix = Vec::with_capacity(1 + name.len());
        prefix.push(name.len() as u8);
        prefix.extend_from_slice(name);
        BucketRef { prefix }
    }

    /// A bucket nested under this one.
    pub fn child(&self, name: &[u8]) -> BucketRef {
        assert!(
            !name.is_empty() && name.len() < 256,
            "bucket names are 1..=255 bytes"
        );
        let mut prefix = Vec::with_capacity(self.prefix.len() + 1 + name.len());
        prefix.extend_from_slice(&self.prefix);
        prefix.push(name.len() as u8);
        prefix.extend_from_slice(name);
        BucketRef { prefix }
    }

    /// A handle over a whole family of buckets sharing a name prefix; only
    /// the ledger's per-height delayed-output buckets use this.
    pub(crate) fn from_raw_prefix(prefix: Vec<u8>) -> BucketRef {
        BucketRef { prefix }
    }

    pub(crate) fn prefix(&self) -> &[u8] {
        &self.prefix
    }

    fn full_key(&self, key: &[u8]) -> Vec<u8> {
        let mut full = Vec::with_capacity(self.prefix.len() + key.len());
        full.extend_from_slice(&self.prefix);
        full.extend_from_slice(key);
        full
    }
}

/// Read access shared by read-only and read-write transactions.
pub trait BucketView {
    fn get_raw(&self, bucket: &BucketRef, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError>;

    /// An ordered cursor over the bucket's entries, keyed relative to the
    /// bucket.
    fn cursor(&self, bucket: &BucketRef) -> Result<Cursor, StoreError>;
}

/// An ordered, bidirectional cursor over a bucket.
///
/// The cursor materializes the bucket's merged view at creation time, so it
/// stays stable while the surrounding transaction keeps mutating.
pub struct Cursor {
    entries: Vec<(Vec<u8>, Vec<u8>)>,
    position: Option<usize>,
}

impl Cursor {
    fn from_entries(entries: Vec<(Vec<u8>, Vec<u8>)>) -> Cursor {
        Cursor {
            entries,
            position: None,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn entry(&self) -> Option<(&[u8], &[u8])> {
        match self.position {
            Some(position) => self
                .entries
                .get(position)
                .map(|(k, v)| (k.as_slice(), v.as_slice())),
            None => None,
        }
    }

    /// Position on the first entry.
    pub fn first(&mut self) -> Option<(&[u8], &[u8])> {
        if self.entries.is_empty() {
            self.position = None;
            return None;
        }
        self.position = Some(0);
        self.entry()
    }

    /// Position on the last entry.
    pub fn last(&mut self) -> Option<(&[u8], &[u8])> {
        if self.entries.is_empty() {
            self.position = None;
            return None;
        }
        self.position = Some(self.entries.len() - 1);
        self.entry()
    }

    /// Position on the first entry whose key is `>= key`.
    pub fn seek(&mut self, key: &[u8]) -> Option<(&[u8], &[u8])> {
        let position = self
            .entries
            .partition_point(|(k, _)| k.as_slice() < key);
        self.position = Some(position);
        self.entry()
    }

    /// Advance; from an unpositioned cursor this is `first`.
    pub fn next(&mut self) -> Option<(&[u8], &[u8])> {
        match self.position {
            None => self.first(),
            Some(position) => {
                self.position = Some((position + 1).min(self.entries.len()));
                self.entry()
            }
        }
    }

    /// Step back; from an unpositioned cursor this is `last`.
    pub fn prev(&mut self) -> Option<(&[u8], &[u8])> {
        match self.position {
            None => self.last(),
            Some(0) => None,
            Some(position) => {
                self.position = Some(position - 1);
                self.entry()
            }
        }
    }
}

/// A read-only transaction.
pub struct ReadTx<'a> {
    tree: &'a sled::Tree,
}

impl BucketView for ReadTx<'_> {
    fn get_raw(&self, bucket: &BucketRef, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self
            .tree
            .get(bucket.full_key(key))?
            .map(|ivec| ivec.to_vec()))
    }

    fn cursor(&self, bucket: &BucketRef) -> Result<Cursor, StoreError> {
        let prefix_len = bucket.prefix().len();
        let mut entries = Vec::new();
        for item in self.tree.scan_prefix(bucket.prefix()) {
            let (key, value) = item?;
            entries.push((key[prefix_len..].to_vec(), value.to_vec()));
        }
        Ok(Cursor::from_entries(entries))
    }
}

/// A read-write transaction with buffered, atomic writes.
pub struct WriteTx<'a> {
    tree: &'a sled::Tree,
    staged: BTreeMap<Vec<u8>, Option<Vec<u8>>>,
}

impl WriteTx<'_> {
    pub fn put(&mut self, bucket: &BucketRef, key: &[u8], value: Vec<u8>) {
        self.staged.insert(bucket.full_key(key), Some(value));
    }

    pub fn delete(&mut self, bucket: &BucketRef, key: &[u8]) {
        self.staged.insert(bucket.full_key(key), None);
    }

    /// Stage the removal of every entry in the bucket, including nested
    /// buckets.
    pub fn delete_bucket(&mut self, bucket: &BucketRef) -> Result<(), StoreError> {
        for item in self.tree.scan_prefix(bucket.prefix()) {
            let (key, _) = item?;
            self.staged.insert(key.to_vec(), None);
        }
        let range: Vec<Vec<u8>> = self
            .staged
            .range(bucket.prefix().to_vec()..)
            .take_while(|(k, _)| k.starts_with(bucket.prefix()))
            .map(|(k, _)| k.clone())
            .collect();
        for key in range {
            self.staged.insert(key, None);
        }
        Ok(())
    }

    pub fn bucket_is_empty(&self, bucket: &BucketRef) -> Result<bool, StoreError> {
        Ok(self.cursor(bucket)?.is_empty())
    }

    fn commit(self) -> Result<(), StoreError> {
        let staged = self.staged.len();
        let mut batch = sled::Batch::default();
        for (key, value) in self.staged {
            match value {
                Some(value) => batch.insert(key, value),
                None => batch.remove(key),
            }
        }
        self.tree.apply_batch(batch)?;
        self.tree.flush()?;
        trace!(staged = staged, "committed store transaction");
        Ok(())
    }
}

impl BucketView for WriteTx<'_> {
    fn get_raw(&self, bucket: &BucketRef, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        let full = bucket.full_key(key);
        if let Some(staged) = self.staged.get(&full) {
            return Ok(staged.clone());
        }
        Ok(self.tree.get(full)?.map(|ivec| ivec.to_vec()))
    }

    fn cursor(&self, bucket: &BucketRef) -> Result<Cursor, StoreError> {
        let prefix_len = bucket.prefix().len();
        let mut merged: BTreeMap<Vec<u8>, Vec<u8>> = BTreeMap::new();
        for item in self.tree.scan_prefix(bucket.prefix()) {
            let (key, value) = item?;
            merged.insert(key[prefix_len..].to_vec(), value.to_vec());
        }
        for (key, value) in self
            .staged
            .range(bucket.prefix().to_vec()..)
            .take_while(|(k, _)| k.starts_with(bucket.prefix()))
        {
            match value {
                Some(value) => {
                    merged.insert(key[prefix_len..].to_vec(), value.clone());
                }
                None => {
                    merged.remove(&key[prefix_len..]);
                }
            }
        }
        Ok(Cursor::from_entries(merged.into_iter().collect()))
    }
}

/// The durable store backing one network's consensus state.
pub struct BucketStore {
    db: sled::Db,
}

impl BucketStore {
    pub fn open(config: &Config) -> Result<BucketStore, StoreError> {
        let db = config.sled_config().open()?;
        Ok(BucketStore { db })
    }

    /// Run a read-only transaction.
    pub fn view<T, E, F>(&self, f: F) -> Result<T, E>
    where
        E: From<StoreError>,
        F: FnOnce(&ReadTx<'_>) -> Result<T, E>,
    {
        let tx = ReadTx { tree: &self.db };
        f(&tx)
    }

    /// Run a read-write transaction. The staged writes commit atomically
    /// when `f` returns `Ok`; any error rolls everything back.
    pub fn update<T, E, F>(&self, f: F) -> Result<T, E>
    where
        E: From<StoreError>,
        F: FnOnce(&mut WriteTx<'_>) -> Result<T, E>,
    {
        let mut tx = WriteTx {
            tree: &self.db,
            staged: BTreeMap::new(),
        };
        let value = f(&mut tx)?;
        tx.commit().map_err(E::from)?;
        Ok(value)
    }

    pub fn flush(&self) -> Result<(), StoreError> {
        self.db.flush()?;
        Ok(())
    }
}

/// Read an object from its canonical encoding.
pub fn get_object<T, V>(view: &V, bucket: &BucketRef, key: &[u8]) -> Result<Option<T>, StoreError>
where
    T: CanonicalDeserialize,
    V: BucketView + ?Sized,
{
    match view.get_raw(bucket, key)? {
        Some(bytes) => Ok(Some(T::canonical_deserialize(bytes.as_slice())?)),
        None => Ok(None),
    }
}

/// Write an object in its canonical encoding.
pub fn put_object<T: CanonicalSerialize>(
    tx: &mut WriteTx<'_>,
    bucket: &BucketRef,
    key: &[u8],
    value: &T,
) -> Result<(), StoreError> {
    let bytes = value.canonical_serialize_to_vec()?;
    tx.put(bucket, key, bytes);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use stakecoin_chain::parameters::Network;

    fn ephemeral_store() -> BucketStore {
        BucketStore::open(&Config::ephemeral(Network::Devnet)).expect("ephemeral store opens")
    }

    #[test]
    fn update_commits_and_view_reads() {
        let store = ephemeral_store();
        let bucket = BucketRef::new(b"test");
        store
            .update::<_, StoreError, _>(|tx| {
                tx.put(&bucket, b"k", b"v".to_vec());
                Ok(())
            })
            .unwrap();
        let value = store
            .view::<_, StoreError, _>(|tx| tx.get_raw(&bucket, b"k"))
            .unwrap();
        assert_eq!(value, Some(b"v".to_vec()));
    }

    #[test]
    fn failed_update_rolls_back() {
        let store = ephemeral_store();
        let bucket = BucketRef::new(b"test");
        let result = store.update::<(), StoreError, _>(|tx| {
            tx.put(&bucket, b"k", b"v".to_vec());
            Err(StoreError::Corrupt("forced rollback"))
        });
        assert!(result.is_err());
        let value = store
            .view::<_, StoreError, _>(|tx| tx.get_raw(&bucket, b"k"))
            .unwrap();
        assert_eq!(value, None);
    }

    #[test]
    fn updates_read_their_own_writes() {
        let store = ephemeral_store();
        let bucket = BucketRef::new(b"test");
        store
            .update::<_, StoreError, _>(|tx| {
                tx.put(&bucket, b"a", b"1".to_vec());
                assert_eq!(tx.get_raw(&bucket, b"a")?, Some(b"1".to_vec()));
                tx.delete(&bucket, b"a");
                assert_eq!(tx.get_raw(&bucket, b"a")?, None);
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn sibling_buckets_do_not_collide() {
        let store = ephemeral_store();
        let a = BucketRef::new(b"a");
        let ab = BucketRef::new(b"ab");
        store
            .update::<_, StoreError, _>(|tx| {
                tx.put(&a, b"bx", b"in-a".to_vec());
                tx.put(&ab, b"x", b"in-ab".to_vec());
                Ok(())
            })
            .unwrap();
        store
            .view::<_, StoreError, _>(|tx| {
                let mut cursor = tx.cursor(&a)?;
                assert_eq!(cursor.len(), 1);
                assert_eq!(cursor.first().unwrap().1, b"in-a");
                let mut cursor = tx.cursor(&ab)?;
                assert_eq!(cursor.first().unwrap().1, b"in-ab");
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn cursor_orders_and_seeks() {
        let store = ephemeral_store();
        let bucket = BucketRef::new(b"test");
        store
            .update::<_, StoreError, _>(|tx| {
                for key in &[[0u8, 2], [0u8, 1], [1u8, 0]] {
                    tx.put(&bucket, key, key.to_vec());
                }
                // The cursor inside the update already sees staged writes.
                let mut cursor = tx.cursor(&bucket)?;
                assert_eq!(cursor.first().unwrap().0, &[0, 1]);
                assert_eq!(cursor.next().unwrap().0, &[0, 2]);
                assert_eq!(cursor.next().unwrap().0, &[1, 0]);
                assert!(cursor.next().is_none());
                assert_eq!(cursor.prev().unwrap().0, &[1, 0]);
                assert_eq!(cursor.seek(&[0, 2]).unwrap().0, &[0, 2]);
                assert_eq!(cursor.seek(&[0, 3]).unwrap().0, &[1, 0]);
                assert_eq!(cursor.last().unwrap().0, &[1, 0]);
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn delete_bucket_clears_nested_buckets() {
        let store = ephemeral_store();
        let parent = BucketRef::new(b"parent");
        let child = parent.child(b"child");
        store
            .update::<_, StoreError, _>(|tx| {
                tx.put(&child, b"k", b"v".to_vec());
                Ok(())
            })
            .unwrap();
        store
            .update::<_, StoreError, _>(|tx| {
                tx.delete_bucket(&parent)?;
                Ok(())
            })
            .unwrap();
        store
            .view::<_, StoreError, _>(|tx| {
                assert!(tx.cursor(&child)?.is_empty());
                Ok(())
            })
            .unwrap();
    }
}
