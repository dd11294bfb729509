use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use bytes::{Buf, BufMut, BytesMut};
use log::debug;

use crate::db::error::StoreError;
use crate::db::index::{self, Locator};
use crate::db::value::Value;

pub(crate) const DEFAULT_BUCKETS: u32 = 200;

const FILE_SUFFIX: &str = "hash";

/// Static-bucket hash index over one (table, column) pair.
///
/// Buckets are unordered collision chains; duplicate keys coexist and no
/// uniqueness is enforced.
#[derive(Debug)]
pub(crate) struct HashIndex {
    pub(crate) table: String,
    pub(crate) column: String,
    pub(crate) bucket_count: u32,
    pub(crate) entry_count: u32,
    buckets: BTreeMap<u32, Vec<(Value, Locator)>>,
}

/// Polynomial rolling hash (base 31, mod 2^32) over the stringified key,
/// reduced to a bucket id.
pub(crate) fn bucket_of(key: &Value, bucket_count: u32) -> u32 {
    let mut h: u32 = 0;
    for ch in key.to_string().chars() {
        h = h.wrapping_mul(31).wrapping_add(ch as u32);
    }
    h % bucket_count
}

impl HashIndex {
    fn new(table: &str, column: &str, bucket_count: u32) -> Self {
        HashIndex {
            table: table.to_string(),
            column: column.to_string(),
            bucket_count,
            entry_count: 0,
            buckets: BTreeMap::new(),
        }
    }

    pub(crate) fn insert(&mut self, key: Value, loc: Locator) {
        let bucket = bucket_of(&key, self.bucket_count);
        self.buckets.entry(bucket).or_default().push((key, loc));
        self.entry_count += 1;
    }

    /// Every locator in the key's bucket whose stored key is structurally
    /// equal — values of different types never match.
    pub(crate) fn search(&self, key: &Value) -> Vec<Locator> {
        let bucket = bucket_of(key, self.bucket_count);
        self.buckets
            .get(&bucket)
            .map(|chain| {
                chain
                    .iter()
                    .filter(|(k, _)| k == key)
                    .map(|&(_, loc)| loc)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Remove the first entry matching both key and locator.
    pub(crate) fn delete(&mut self, key: &Value, loc: Locator) -> bool {
        let bucket = bucket_of(key, self.bucket_count);
        if let Some(chain) = self.buckets.get_mut(&bucket) {
            if let Some(pos) = chain.iter().position(|(k, l)| k == key && *l == loc) {
                chain.remove(pos);
                self.entry_count -= 1;
                return true;
            }
        }
        false
    }

    fn serialize(&self) -> BytesMut {
        let mut buf = BytesMut::new();
        index::put_str(&mut buf, &self.table);
        index::put_str(&mut buf, &self.column);
        buf.put_u32_le(self.bucket_count);
        buf.put_u32_le(self.entry_count);

        for (&bucket, chain) in &self.buckets {
            if chain.is_empty() {
                continue;
            }
            buf.put_u32_le(bucket);
            buf.put_u32_le(chain.len() as u32);
            for (key, loc) in chain {
                index::write_key(&mut buf, key);
                buf.put_u32_le(loc.page_id);
                buf.put_u32_le(loc.slot_id);
            }
        }
        buf
    }

    fn deserialize(data: &[u8]) -> Result<HashIndex, StoreError> {
        let mut buf = data;
        let table = index::take_str(&mut buf)?;
        let column = index::take_str(&mut buf)?;
        if buf.remaining() < 8 {
            return Err(StoreError::DecodeFailure("hash index header truncated".into()));
        }
        let bucket_count = buf.get_u32_le();
        let entry_count = buf.get_u32_le();

        let mut idx = HashIndex::new(&table, &column, bucket_count);
        while buf.has_remaining() {
            if buf.remaining() < 8 {
                return Err(StoreError::DecodeFailure("hash bucket truncated".into()));
            }
            let bucket = buf.get_u32_le();
            let count = buf.get_u32_le();
            let chain = idx.buckets.entry(bucket).or_default();
            for _ in 0..count {
                let key = index::read_key(&mut buf)?;
                if buf.remaining() < 8 {
                    return Err(StoreError::DecodeFailure("hash entry truncated".into()));
                }
                let loc = Locator::new(buf.get_u32_le(), buf.get_u32_le());
                chain.push((key, loc));
            }
        }
        idx.entry_count = entry_count;
        Ok(idx)
    }
}

/// Owns the on-disk hash indexes and an in-memory cache keyed by
/// (table, column). Cache entries live from first load until the index is
/// dropped.
#[derive(Debug)]
pub(crate) struct HashIndexManager {
    index_dir: PathBuf,
    cache: HashMap<(String, String), HashIndex>,
}

impl HashIndexManager {
    pub(crate) fn new(index_dir: &Path) -> Self {
        HashIndexManager {
            index_dir: index_dir.to_path_buf(),
            cache: HashMap::new(),
        }
    }

    fn file(&self, table: &str, column: &str) -> PathBuf {
        index::index_file(&self.index_dir, table, column, FILE_SUFFIX)
    }

    /// Create a fresh empty index, replacing any cached one, and persist it.
    pub(crate) fn create(&mut self, table: &str, column: &str) -> Result<()> {
        let idx = HashIndex::new(table, column, DEFAULT_BUCKETS);
        std::fs::write(self.file(table, column), &idx.serialize())
            .with_context(|| format!("create hash index on {table}.{column}"))?;
        self.cache.insert((table.to_string(), column.to_string()), idx);
        Ok(())
    }

    /// Cache-through load. `None` when no index file exists.
    pub(crate) fn load(&mut self, table: &str, column: &str) -> Result<Option<&mut HashIndex>> {
        let key = (table.to_string(), column.to_string());
        if !self.cache.contains_key(&key) {
            let path = self.file(table, column);
            if !path.exists() {
                return Ok(None);
            }
            let data = std::fs::read(&path)
                .with_context(|| format!("read hash index {}", path.display()))?;
            let idx = HashIndex::deserialize(&data)
                .with_context(|| format!("deserialize hash index on {table}.{column}"))?;
            debug!("loaded hash index on {table}.{column}: {} entries", idx.entry_count);
            self.cache.insert(key.clone(), idx);
        }
        Ok(self.cache.get_mut(&key))
    }

    pub(crate) fn insert_entry(
        &mut self,
        table: &str,
        column: &str,
        key: Value,
        loc: Locator,
    ) -> Result<()> {
        let idx = self.load(table, column)?.ok_or_else(|| StoreError::IndexMissing {
            table: table.to_string(),
            column: column.to_string(),
        })?;
        idx.insert(key, loc);
        Ok(())
    }

    pub(crate) fn search(&mut self, table: &str, column: &str, key: &Value) -> Result<Vec<Locator>> {
        Ok(match self.load(table, column)? {
            Some(idx) => idx.search(key),
            None => Vec::new(),
        })
    }

    pub(crate) fn delete_entry(
        &mut self,
        table: &str,
        column: &str,
        key: &Value,
        loc: Locator,
    ) -> Result<bool> {
        Ok(match self.load(table, column)? {
            Some(idx) => idx.delete(key, loc),
            None => false,
        })
    }

    /// Delete-then-insert, applied even when the key did not change.
    pub(crate) fn update_entry(
        &mut self,
        table: &str,
        column: &str,
        old_key: &Value,
        new_key: Value,
        loc: Locator,
    ) -> Result<()> {
        self.delete_entry(table, column, old_key, loc)?;
        self.insert_entry(table, column, new_key, loc)
    }

    /// Flush a cached index to its file. No-op when nothing is cached.
    pub(crate) fn save(&mut self, table: &str, column: &str) -> Result<bool> {
        let key = (table.to_string(), column.to_string());
        match self.cache.get(&key) {
            Some(idx) => {
                std::fs::write(self.file(table, column), &idx.serialize())
                    .with_context(|| format!("save hash index on {table}.{column}"))?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Remove the index file and its cache entry. Idempotent.
    pub(crate) fn drop_index(&mut self, table: &str, column: &str) -> Result<()> {
        let path = self.file(table, column);
        if path.exists() {
            std::fs::remove_file(&path)
                .with_context(|| format!("remove hash index {}", path.display()))?;
        }
        self.cache.remove(&(table.to_string(), column.to_string()));
        Ok(())
    }

    /// Columns of `table` that carry a hash index, discovered on disk.
    pub(crate) fn list(&self, table: &str) -> Vec<String> {
        index::list_index_columns(&self.index_dir, table, FILE_SUFFIX)
    }
}
