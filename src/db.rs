mod codec;
mod index;
mod page;
mod pager;

pub mod error;
pub mod query;
pub mod row;
pub mod schema;
pub mod stats;
pub mod value;

use std::collections::{BTreeMap, HashSet};
use std::fs::File;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::{debug, warn};

use error::StoreError;
use index::btree::BTreeIndexManager;
use index::hash::{HashIndexManager, DEFAULT_BUCKETS};
use index::Locator;
use page::{SlottedPage, PAGE_SIZE};
use pager::Pager;
use query::{Condition, DataDeletion, DataRetrieval, DataWrite, Op, Projection, WriteValue};
use row::{deserialize_row, serialize_row, Row};
use schema::{Catalog, Schema};
use stats::{estimated_row_len, IndexStat, TableStats};
use value::Value;

const SCHEMA_FILE: &str = "schema.dat";
const INDEX_DIR: &str = "indexes";

/// The two secondary index families.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexKind {
    Hash,
    Btree,
}

/// The storage manager: one instance owns a storage directory, its schema
/// catalog and its index caches.
///
/// Single-writer by design: heap files are opened, mutated and closed
/// within one call, all dirty pages and index files are flushed before a
/// mutating call returns, and nothing here is safe to drive from two
/// instances over the same directory.
#[derive(Debug)]
pub struct Db {
    base_path: PathBuf,
    catalog: Catalog,
    hash_indexes: HashIndexManager,
    btree_indexes: BTreeIndexManager,
}

impl Db {
    /// Open (creating if needed) a storage directory and load its catalog.
    pub fn open(base_path: impl AsRef<Path>) -> Result<Self> {
        let base_path = base_path.as_ref().to_path_buf();
        let index_dir = base_path.join(INDEX_DIR);
        std::fs::create_dir_all(&index_dir)
            .with_context(|| format!("create storage directory {}", base_path.display()))?;

        let schema_file = base_path.join(SCHEMA_FILE);
        let catalog = if schema_file.exists() {
            Catalog::load(&schema_file).context("load schema catalog")?
        } else {
            Catalog::new()
        };

        Ok(Db {
            base_path,
            catalog,
            hash_indexes: HashIndexManager::new(&index_dir),
            btree_indexes: BTreeIndexManager::new(&index_dir),
        })
    }

    /// Register a table, persist the catalog and create its (empty) heap
    /// file when none exists yet.
    pub fn create_table(&mut self, name: &str, schema: Schema) -> Result<()> {
        self.catalog.insert(name, schema);
        self.catalog
            .save(&self.base_path.join(SCHEMA_FILE))
            .context("save schema catalog")?;

        let heap = self.base_path.join(format!("{name}.dat"));
        if !heap.exists() {
            File::create(&heap).with_context(|| format!("create heap file {}", heap.display()))?;
        }
        Ok(())
    }

    pub fn tables(&self) -> Vec<String> {
        self.catalog.tables().map(String::from).collect()
    }

    pub fn schema(&self, table: &str) -> Option<&Schema> {
        self.catalog.get(table)
    }

    /// Heap-file lookup: the literal table name, then lowercase, then
    /// uppercase; the first existing file wins, lowercase when none does.
    fn heap_path(&self, table: &str) -> PathBuf {
        let exact = self.base_path.join(format!("{table}.dat"));
        if exact.exists() {
            return exact;
        }
        let lower = self.base_path.join(format!("{}.dat", table.to_lowercase()));
        if lower.exists() {
            return lower;
        }
        let upper = self.base_path.join(format!("{}.dat", table.to_uppercase()));
        if upper.exists() {
            return upper;
        }
        lower
    }

    fn require_heap(&self, table: &str) -> Result<PathBuf, StoreError> {
        let path = self.heap_path(table);
        if path.exists() {
            Ok(path)
        } else {
            Err(StoreError::HeapMissing(table.to_string()))
        }
    }

    fn require_columns<'a>(
        schema: &Schema,
        table: &str,
        mut columns: impl Iterator<Item = &'a str>,
    ) -> Result<(), StoreError> {
        match columns.find(|col| !schema.contains(col)) {
            Some(col) => Err(StoreError::ColumnMiss {
                table: table.to_string(),
                column: col.to_string(),
            }),
            None => Ok(()),
        }
    }

    /// Serve a retrieval request: probe an index when a single condition
    /// allows it, otherwise scan the heap.
    pub fn select(&mut self, req: &DataRetrieval) -> Result<Vec<Row>> {
        let schema = self.catalog.require(&req.table)?.clone();
        Self::require_columns(
            &schema,
            &req.table,
            req.projection.column_names().iter().map(String::as_str),
        )?;
        Self::require_columns(
            &schema,
            &req.table,
            req.conditions.iter().map(|c| c.column.as_str()),
        )?;

        if let [cond] = req.conditions.as_slice() {
            match cond.op {
                Op::Eq => {
                    // hash probe first, then a B+-tree point search; an
                    // empty result falls through to the scan, where string
                    // operands additionally get numeric coercion
                    let mut locators =
                        self.hash_indexes.search(&req.table, &cond.column, &cond.operand)?;
                    if locators.is_empty() {
                        locators =
                            self.btree_indexes.search(&req.table, &cond.column, &cond.operand)?;
                    }
                    if !locators.is_empty() {
                        return self.fetch_rows(&req.table, &schema, &locators, &req.projection);
                    }
                }
                Op::Gt | Op::Ge | Op::Lt | Op::Le
                    if self.btree_indexes.list(&req.table).contains(&cond.column) =>
                {
                    let entries = self.range_probe(&req.table, cond)?;
                    let locators: Vec<Locator> =
                        entries.into_iter().map(|(_, loc)| loc).collect();
                    return self.fetch_rows(&req.table, &schema, &locators, &req.projection);
                }
                _ => {}
            }
        }

        self.scan(&req.table, &schema, &req.conditions, &req.projection)
    }

    /// Range scan for a single inequality: the missing bound comes from the
    /// extreme leaf of the tree, strict operators post-filter the result.
    fn range_probe(&mut self, table: &str, cond: &Condition) -> Result<Vec<(Value, Locator)>> {
        let tree = self.btree_indexes.load(table, &cond.column)?;
        let (lo, hi) = match cond.op {
            Op::Gt | Op::Ge => {
                let Some(max) = tree.and_then(|t| t.max_key()) else {
                    return Ok(Vec::new());
                };
                (cond.operand.clone(), max)
            }
            Op::Lt | Op::Le => {
                let Some(min) = tree.and_then(|t| t.min_key()) else {
                    return Ok(Vec::new());
                };
                (min, cond.operand.clone())
            }
            _ => return Ok(Vec::new()),
        };

        let mut entries = self.btree_indexes.range_search(table, &cond.column, &lo, &hi)?;
        match cond.op {
            Op::Gt => entries
                .retain(|(k, _)| k.key_cmp(&cond.operand) == std::cmp::Ordering::Greater),
            Op::Lt => entries.retain(|(k, _)| k.key_cmp(&cond.operand) == std::cmp::Ordering::Less),
            _ => {}
        }
        Ok(entries)
    }

    /// Fetch rows by locator. Stale locators and undecodable records are
    /// skipped, not surfaced: an index may lag the heap until rebuilt.
    fn fetch_rows(
        &self,
        table: &str,
        schema: &Schema,
        locators: &[Locator],
        projection: &Projection,
    ) -> Result<Vec<Row>> {
        let path = self.require_heap(table)?;
        let mut pager = Pager::open(&path)?;

        let mut results = Vec::new();
        for loc in locators {
            let Ok(page) = pager.read_page(loc.page_id) else { continue };
            let Ok(bytes) = page.get(loc.slot_id as u16) else { continue };
            let Ok(row) = deserialize_row(schema, bytes) else { continue };
            results.push(query::project(row, projection));
        }
        Ok(results)
    }

    /// Full table scan in file order with short-circuit AND filtering.
    fn scan(
        &self,
        table: &str,
        schema: &Schema,
        conditions: &[Condition],
        projection: &Projection,
    ) -> Result<Vec<Row>> {
        let path = self.require_heap(table)?;
        let mut pager = Pager::open(&path)?;
        let pages = pager.page_count()?;

        let mut results = Vec::new();
        for page_id in 0..pages {
            let page = pager.read_page(page_id)?;
            for slot in 0..page.record_count() {
                let bytes = page.get(slot)?;
                let row = deserialize_row(schema, bytes)
                    .with_context(|| format!("record at page {page_id}, slot {slot}"))?;
                if !query::matches_all(&row, conditions) {
                    continue;
                }
                results.push(query::project(row, projection));
            }
        }
        Ok(results)
    }

    /// Serve a write request: insert when no columns and no conditions are
    /// given, update otherwise. Returns the affected row count.
    pub fn write(&mut self, req: &DataWrite) -> Result<usize> {
        let schema = self.catalog.require(&req.table)?.clone();
        let path = self.require_heap(&req.table)?;

        if req.is_insert() {
            self.insert_record(&req.table, &path, &schema, &req.new_value)
        } else {
            if let Some(columns) = &req.columns {
                Self::require_columns(&schema, &req.table, columns.iter().map(String::as_str))?;
            }
            Self::require_columns(
                &schema,
                &req.table,
                req.conditions.iter().map(|c| c.column.as_str()),
            )?;
            self.update_records(req, &path, &schema)
        }
    }

    fn insert_record(
        &mut self,
        table: &str,
        path: &Path,
        schema: &Schema,
        new_value: &WriteValue,
    ) -> Result<usize> {
        let WriteValue::Row(record) = new_value else {
            return Err(StoreError::BadValue("insert requires a full row mapping".into()).into());
        };
        let bytes = serialize_row(schema, record)?;

        let mut pager = Pager::open(path)?;
        let page_count = pager.page_count()?;
        let (mut page, mut page_id) = if page_count == 0 {
            (SlottedPage::new(), 0)
        } else {
            (pager.read_page(page_count - 1)?, page_count - 1)
        };

        let slot_id = match page.append(&bytes) {
            Ok(slot) => slot,
            Err(StoreError::PageFull(_)) if page_count > 0 => {
                // last page is full: the record goes on a new trailing page
                page = SlottedPage::new();
                page_id = page_count;
                page.append(&bytes)?
            }
            Err(e) => return Err(e.into()),
        };
        pager.write_page(page_id, &page)?;

        let loc = Locator::new(page_id, slot_id as u32);
        for column in self.hash_indexes.list(table) {
            let key = record.get(&column).cloned().unwrap_or(Value::Null);
            self.hash_indexes.insert_entry(table, &column, key, loc)?;
            self.hash_indexes.save(table, &column)?;
        }
        for column in self.btree_indexes.list(table) {
            let key = record.get(&column).cloned().unwrap_or(Value::Null);
            self.btree_indexes.insert_entry(table, &column, key, loc)?;
            self.btree_indexes.save(table, &column)?;
        }
        Ok(1)
    }

    /// The mapping an update writes, resolved from the request's target
    /// columns and new value.
    fn resolve_new_value(req: &DataWrite) -> Result<Row, StoreError> {
        match (&req.new_value, &req.columns) {
            (WriteValue::Row(mapping), Some(columns)) => columns
                .iter()
                .map(|col| {
                    mapping
                        .get(col)
                        .map(|v| (col.clone(), v.clone()))
                        .ok_or_else(|| {
                            StoreError::BadValue(format!("no value given for column '{col}'"))
                        })
                })
                .collect(),
            (WriteValue::Row(mapping), None) => Ok(mapping.clone()),
            (WriteValue::Single(v), Some(columns)) if columns.len() == 1 => {
                Ok(Row::from([(columns[0].clone(), v.clone())]))
            }
            (WriteValue::Single(_), _) => Err(StoreError::BadValue(
                "a single value needs exactly one target column".into(),
            )),
        }
    }

    fn update_records(&mut self, req: &DataWrite, path: &Path, schema: &Schema) -> Result<usize> {
        let new_value = Self::resolve_new_value(req)?;
        Self::require_columns(schema, &req.table, new_value.keys().map(String::as_str))?;

        let hash_cols = self.hash_indexes.list(&req.table);
        let btree_cols = self.btree_indexes.list(&req.table);

        let mut pager = Pager::open(path)?;
        let pages = pager.page_count()?;
        let mut affected = 0;

        for page_id in 0..pages {
            let mut page = pager.read_page(page_id)?;
            let mut dirty = false;

            for slot in 0..page.record_count() {
                let bytes = page.get(slot)?;
                let Ok(mut record) = deserialize_row(schema, bytes) else {
                    continue;
                };
                if !query::matches_all(&record, &req.conditions) {
                    continue;
                }

                // index entries move before the heap record is rewritten
                let loc = Locator::new(page_id, slot as u32);
                for col in &hash_cols {
                    if let Some(new_key) = new_value.get(col) {
                        let old_key = record.get(col).cloned().unwrap_or(Value::Null);
                        self.hash_indexes.update_entry(
                            &req.table,
                            col,
                            &old_key,
                            new_key.clone(),
                            loc,
                        )?;
                    }
                }
                for col in &btree_cols {
                    if let Some(new_key) = new_value.get(col) {
                        let old_key = record.get(col).cloned().unwrap_or(Value::Null);
                        self.btree_indexes.update_entry(
                            &req.table,
                            col,
                            &old_key,
                            new_key.clone(),
                            loc,
                        )?;
                    }
                }

                for (col, v) in &new_value {
                    record.insert(col.clone(), v.clone());
                }
                let new_bytes = serialize_row(schema, &record)?;
                page.update(slot, &new_bytes)
                    .with_context(|| format!("rewrite record at page {page_id}, slot {slot}"))?;
                dirty = true;
                affected += 1;
            }

            if dirty {
                pager.write_page(page_id, &page)?;
            }
        }

        for col in &hash_cols {
            self.hash_indexes.save(&req.table, col)?;
        }
        for col in &btree_cols {
            self.btree_indexes.save(&req.table, col)?;
        }
        Ok(affected)
    }

    /// Serve a delete request. Matching slots are removed in place, their
    /// index entries deleted, and only pages still holding records are
    /// written back (the file shrinks to exactly those pages).
    ///
    /// Slot compaction shifts the locators of survivors that shared a page
    /// with a deleted row; indexes on the table are exact again after
    /// `rebuild_index`.
    pub fn delete(&mut self, req: &DataDeletion) -> Result<usize> {
        let schema = self.catalog.require(&req.table)?.clone();
        Self::require_columns(
            &schema,
            &req.table,
            req.conditions.iter().map(|c| c.column.as_str()),
        )?;
        let path = self.require_heap(&req.table)?;

        let hash_cols = self.hash_indexes.list(&req.table);
        let btree_cols = self.btree_indexes.list(&req.table);

        let mut pager = Pager::open(&path)?;
        let pages = pager.page_count()?;
        let mut kept: Vec<SlottedPage> = Vec::new();
        let mut deleted = 0;

        for page_id in 0..pages {
            let mut page = pager.read_page(page_id)?;
            let mut slot = 0;
            while slot < page.record_count() {
                let bytes = page.get(slot)?;
                let record = deserialize_row(&schema, bytes)
                    .with_context(|| format!("record at page {page_id}, slot {slot}"))?;
                if query::matches_all(&record, &req.conditions) {
                    let loc = Locator::new(page_id, slot as u32);
                    for col in &hash_cols {
                        let key = record.get(col).cloned().unwrap_or(Value::Null);
                        self.hash_indexes.delete_entry(&req.table, col, &key, loc)?;
                    }
                    for col in &btree_cols {
                        let key = record.get(col).cloned().unwrap_or(Value::Null);
                        self.btree_indexes.delete_entry(&req.table, col, &key, loc)?;
                    }
                    page.delete(slot)?;
                    deleted += 1;
                    // the next record now sits at this slot id
                } else {
                    slot += 1;
                }
            }
            if page.record_count() > 0 {
                kept.push(page);
            }
        }

        for (page_id, page) in kept.iter().enumerate() {
            pager.write_page(page_id as u32, page)?;
        }
        pager.truncate(kept.len() as u32)?;

        for col in &hash_cols {
            self.hash_indexes.save(&req.table, col)?;
        }
        for col in &btree_cols {
            self.btree_indexes.save(&req.table, col)?;
        }
        Ok(deleted)
    }

    /// Create (or re-create) an index by full heap scan.
    pub fn create_index(&mut self, table: &str, column: &str, kind: IndexKind) -> Result<()> {
        self.rebuild_index(table, column, kind)
    }

    pub fn drop_index(&mut self, table: &str, column: &str, kind: IndexKind) -> Result<()> {
        match kind {
            IndexKind::Hash => self.hash_indexes.drop_index(table, column),
            IndexKind::Btree => self.btree_indexes.drop_index(table, column),
        }
    }

    /// Drop, recreate empty and repopulate one index from the heap. The
    /// recovery tool for indexes left behind by deletes or crashes.
    pub fn rebuild_index(&mut self, table: &str, column: &str, kind: IndexKind) -> Result<()> {
        let schema = self.catalog.require(table)?.clone();
        if !schema.contains(column) {
            return Err(StoreError::ColumnMiss {
                table: table.to_string(),
                column: column.to_string(),
            }
            .into());
        }

        match kind {
            IndexKind::Hash => {
                self.hash_indexes.drop_index(table, column)?;
                self.hash_indexes.create(table, column)?;
            }
            IndexKind::Btree => {
                self.btree_indexes.drop_index(table, column)?;
                self.btree_indexes.create(table, column)?;
            }
        }

        let path = self.heap_path(table);
        if !path.exists() {
            return Ok(());
        }

        let mut pager = Pager::open(&path)?;
        let pages = pager.page_count()?;
        let mut entries = 0u32;

        for page_id in 0..pages {
            let page = pager.read_page(page_id)?;
            for slot in 0..page.record_count() {
                let bytes = page.get(slot)?;
                let record = match deserialize_row(&schema, bytes) {
                    Ok(record) => record,
                    Err(e) => {
                        warn!("skipping record at page {page_id}, slot {slot}: {e}");
                        continue;
                    }
                };
                let key = record.get(column).cloned().unwrap_or(Value::Null);
                let loc = Locator::new(page_id, slot as u32);
                match kind {
                    IndexKind::Hash => self.hash_indexes.insert_entry(table, column, key, loc)?,
                    IndexKind::Btree => {
                        self.btree_indexes.insert_entry(table, column, key, loc)?
                    }
                }
                entries += 1;
            }
        }

        match kind {
            IndexKind::Hash => self.hash_indexes.save(table, column)?,
            IndexKind::Btree => self.btree_indexes.save(table, column)?,
        };
        debug!("rebuilt {kind:?} index on {table}.{column}: {entries} entries over {pages} pages");
        Ok(())
    }

    /// Query-optimizer statistics for one table. Missing tables or heap
    /// files yield the all-zero statistic; undecodable records are skipped.
    pub fn stats(&mut self, table: &str) -> Result<TableStats> {
        let Some(schema) = self.catalog.get(table).cloned() else {
            return Ok(TableStats::empty());
        };
        let path = self.heap_path(table);
        if !path.exists() {
            return Ok(TableStats::empty());
        }

        let l_r = estimated_row_len(&schema);
        let mut n_r = 0u64;
        let mut distinct: BTreeMap<String, HashSet<String>> = schema
            .attributes()
            .iter()
            .map(|a| (a.name.clone(), HashSet::new()))
            .collect();

        let mut pager = Pager::open(&path)?;
        let page_count = pager.page_count()?;
        for page_id in 0..page_count {
            let Ok(page) = pager.read_page(page_id) else { continue };
            n_r += page.record_count() as u64;
            for slot in 0..page.record_count() {
                let Ok(bytes) = page.get(slot) else { continue };
                let Ok(record) = deserialize_row(&schema, bytes) else { continue };
                for (attr, v) in &record {
                    if let Some(set) = distinct.get_mut(attr) {
                        set.insert(v.to_string());
                    }
                }
            }
        }

        let v_a_r = distinct
            .into_iter()
            .map(|(attr, set)| (attr, set.len() as u64))
            .collect();

        let mut i_r: BTreeMap<String, IndexStat> = schema
            .attributes()
            .iter()
            .map(|a| (a.name.clone(), IndexStat::None))
            .collect();
        for column in self.hash_indexes.list(table) {
            let buckets = self
                .hash_indexes
                .load(table, &column)
                .ok()
                .flatten()
                .map(|idx| idx.bucket_count)
                .unwrap_or(DEFAULT_BUCKETS);
            i_r.insert(column, IndexStat::Hash { buckets });
        }
        // a B+-tree on the same column wins over the hash entry
        for column in self.btree_indexes.list(table) {
            let height = self
                .btree_indexes
                .load(table, &column)
                .ok()
                .flatten()
                .map(|tree| tree.height())
                .unwrap_or(0);
            i_r.insert(column, IndexStat::Btree { height });
        }

        let f_r = if l_r > 0 {
            (PAGE_SIZE as u64 / l_r).max(1)
        } else {
            1
        };
        let b_r = if n_r > 0 {
            n_r.div_ceil(f_r)
        } else {
            page_count as u64
        };

        Ok(TableStats {
            n_r,
            b_r,
            l_r,
            f_r,
            v_a_r,
            i_r,
        })
    }

    /// Statistics for every catalogued table.
    pub fn stats_all(&mut self) -> Result<BTreeMap<String, TableStats>> {
        let tables = self.tables();
        let mut all = BTreeMap::new();
        for table in tables {
            let stats = self.stats(&table)?;
            all.insert(table, stats);
        }
        Ok(all)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::schema::DataType;
    use super::*;

    fn student_schema() -> Schema {
        let mut schema = Schema::new();
        schema.add_attribute("StudentID", DataType::Int, 4).unwrap();
        schema.add_attribute("FullName", DataType::Varchar, 50).unwrap();
        schema.add_attribute("GPA", DataType::Float, 4).unwrap();
        schema
    }

    fn student(id: i32, name: &str, gpa: f32) -> Row {
        Row::from([
            ("StudentID".to_string(), Value::Int(id)),
            ("FullName".to_string(), Value::Text(name.to_string())),
            ("GPA".to_string(), Value::Float(gpa)),
        ])
    }

    fn insert(db: &mut Db, table: &str, record: Row) {
        let req = DataWrite {
            table: table.to_string(),
            columns: None,
            conditions: Vec::new(),
            new_value: WriteValue::Row(record),
        };
        assert_eq!(db.write(&req).unwrap(), 1);
    }

    fn select_where(db: &mut Db, table: &str, column: &str, op: &str, operand: Value) -> Vec<Row> {
        let req = DataRetrieval {
            table: table.to_string(),
            projection: Projection::All,
            conditions: vec![Condition::new(column, op, operand).unwrap()],
        };
        db.select(&req).unwrap()
    }

    /// Fifty students with ids 1..=50 on a fresh storage directory.
    fn seeded_db() -> (tempfile::TempDir, Db) {
        let dir = tempfile::tempdir().unwrap();
        let mut db = Db::open(dir.path()).unwrap();
        db.create_table("Student", student_schema()).unwrap();
        for i in 1..=50 {
            let gpa = 2.0 + (i % 20) as f32 * 0.1;
            insert(&mut db, "Student", student(i, &format!("Student {i}"), gpa));
        }
        (dir, db)
    }

    #[test]
    fn insert_and_point_select() {
        let (_dir, mut db) = seeded_db();
        insert(&mut db, "Student", student(999, "Test Student", 3.75));

        let rows = select_where(&mut db, "Student", "StudentID", "=", Value::Int(999));
        assert_eq!(rows, vec![student(999, "Test Student", 3.75)]);
    }

    #[test]
    fn update_preserves_row_count() {
        let (_dir, mut db) = seeded_db();

        let req = DataWrite {
            table: "Student".to_string(),
            columns: Some(vec!["GPA".to_string()]),
            conditions: vec![Condition::new("StudentID", "=", 3).unwrap()],
            new_value: WriteValue::Single(Value::Float(3.95)),
        };
        assert_eq!(db.write(&req).unwrap(), 1);

        let rows = select_where(&mut db, "Student", "StudentID", "=", Value::Int(3));
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["GPA"], Value::Float(3.95));
        assert_eq!(rows[0]["FullName"], Value::Text("Student 3".into()));

        let all = db
            .select(&DataRetrieval {
                table: "Student".to_string(),
                projection: Projection::All,
                conditions: Vec::new(),
            })
            .unwrap();
        assert_eq!(all.len(), 50);
    }

    #[test]
    fn delete_and_verify_gone() {
        let (dir, mut db) = seeded_db();

        let req = DataDeletion {
            table: "Student".to_string(),
            conditions: vec![Condition::new("StudentID", "=", 4).unwrap()],
        };
        assert_eq!(db.delete(&req).unwrap(), 1);

        let rows = select_where(&mut db, "Student", "StudentID", "=", Value::Int(4));
        assert!(rows.is_empty());

        // the file holds exactly the pages that still contain records
        let len = std::fs::metadata(dir.path().join("Student.dat")).unwrap().len();
        assert_eq!(len % PAGE_SIZE as u64, 0);
        assert_eq!(len, PAGE_SIZE as u64);
    }

    #[test]
    fn delete_everything_leaves_an_empty_file() {
        let (dir, mut db) = seeded_db();
        let req = DataDeletion {
            table: "Student".to_string(),
            conditions: Vec::new(),
        };
        assert_eq!(db.delete(&req).unwrap(), 50);
        let len = std::fs::metadata(dir.path().join("Student.dat")).unwrap().len();
        assert_eq!(len, 0);
    }

    #[test]
    fn blocking_factor_identity() {
        let (_dir, mut db) = seeded_db();
        let stats = db.stats("Student").unwrap();
        assert!(stats.n_r > 0 && stats.f_r > 0);
        assert_eq!(stats.b_r, stats.n_r.div_ceil(stats.f_r));
        // int + (4 + 50/2) + float
        assert_eq!(stats.l_r, 37);
        assert_eq!(stats.n_r, 50);
        assert_eq!(stats.v_a_r["StudentID"], 50);
        assert_eq!(stats.v_a_r["GPA"], 20);
    }

    #[test]
    fn index_hit_and_scan_agree() {
        let (_dir, mut db) = seeded_db();
        let scanned = select_where(&mut db, "Student", "StudentID", "=", Value::Int(17));

        db.create_index("Student", "StudentID", IndexKind::Hash).unwrap();
        let probed = select_where(&mut db, "Student", "StudentID", "=", Value::Int(17));

        assert_eq!(scanned, probed);
        assert_eq!(probed.len(), 1);
    }

    #[test]
    fn btree_range_scan() {
        let (_dir, mut db) = seeded_db();
        db.create_index("Student", "StudentID", IndexKind::Btree).unwrap();

        let rows = select_where(&mut db, "Student", "StudentID", ">=", Value::Int(10));
        let ids: Vec<i32> = rows
            .iter()
            .map(|r| match r["StudentID"] {
                Value::Int(v) => v,
                _ => unreachable!(),
            })
            .collect();
        assert_eq!(ids, (10..=50).collect::<Vec<_>>(), "index walk is ordered");

        let rows = select_where(&mut db, "Student", "StudentID", "<=", Value::Int(20));
        assert_eq!(rows.len(), 20);

        // strict bounds post-filter the inclusive walk
        let rows = select_where(&mut db, "Student", "StudentID", ">", Value::Int(49));
        assert_eq!(rows.len(), 1);
        let rows = select_where(&mut db, "Student", "StudentID", "<", Value::Int(2));
        assert_eq!(rows.len(), 1);

        // both bounds at once take the scan path and agree with the index
        let req = DataRetrieval {
            table: "Student".to_string(),
            projection: Projection::All,
            conditions: vec![
                Condition::new("StudentID", ">=", 10).unwrap(),
                Condition::new("StudentID", "<=", 20).unwrap(),
            ],
        };
        assert_eq!(db.select(&req).unwrap().len(), 11);
    }

    #[test]
    fn equality_probe_through_btree_when_no_hash_exists() {
        let (_dir, mut db) = seeded_db();
        db.create_index("Student", "StudentID", IndexKind::Btree).unwrap();
        let rows = select_where(&mut db, "Student", "StudentID", "=", Value::Int(33));
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["FullName"], Value::Text("Student 33".into()));
    }

    #[test]
    fn indexes_follow_inserts_and_updates() {
        let (_dir, mut db) = seeded_db();
        db.create_index("Student", "StudentID", IndexKind::Hash).unwrap();
        db.create_index("Student", "GPA", IndexKind::Btree).unwrap();

        insert(&mut db, "Student", student(60, "Late Arrival", 1.5));
        let rows = select_where(&mut db, "Student", "StudentID", "=", Value::Int(60));
        assert_eq!(rows.len(), 1);

        // moving the key out from under the old entry keeps probes exact
        let req = DataWrite {
            table: "Student".to_string(),
            columns: Some(vec!["StudentID".to_string()]),
            conditions: vec![Condition::new("StudentID", "=", 60).unwrap()],
            new_value: WriteValue::Single(Value::Int(61)),
        };
        assert_eq!(db.write(&req).unwrap(), 1);
        assert!(select_where(&mut db, "Student", "StudentID", "=", Value::Int(60)).is_empty());
        assert_eq!(
            select_where(&mut db, "Student", "StudentID", "=", Value::Int(61)).len(),
            1
        );

        let rows = select_where(&mut db, "Student", "GPA", "<", Value::Float(1.6));
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["StudentID"], Value::Int(61));
    }

    #[test]
    fn delete_maintains_indexes() {
        let (_dir, mut db) = seeded_db();
        db.create_index("Student", "StudentID", IndexKind::Hash).unwrap();

        let req = DataDeletion {
            table: "Student".to_string(),
            conditions: vec![Condition::new("StudentID", "=", 50).unwrap()],
        };
        assert_eq!(db.delete(&req).unwrap(), 1);
        assert!(select_where(&mut db, "Student", "StudentID", "=", Value::Int(50)).is_empty());
    }

    #[test]
    fn inserts_spill_to_new_pages() {
        let dir = tempfile::tempdir().unwrap();
        let mut db = Db::open(dir.path()).unwrap();
        let mut schema = Schema::new();
        schema.add_attribute("Id", DataType::Int, 4).unwrap();
        schema.add_attribute("Blob", DataType::Varchar, 2000).unwrap();
        db.create_table("Wide", schema).unwrap();

        for i in 0..5 {
            let record = Row::from([
                ("Id".to_string(), Value::Int(i)),
                ("Blob".to_string(), Value::Text("x".repeat(1500))),
            ]);
            insert(&mut db, "Wide", record);
        }

        // 1508-byte records, two per page
        let len = std::fs::metadata(dir.path().join("Wide.dat")).unwrap().len();
        assert_eq!(len, 3 * PAGE_SIZE as u64);

        let all = db
            .select(&DataRetrieval {
                table: "Wide".to_string(),
                projection: Projection::one("Id"),
                conditions: Vec::new(),
            })
            .unwrap();
        assert_eq!(all.len(), 5);
    }

    #[test]
    fn update_resizes_varchar_in_place() {
        let (_dir, mut db) = seeded_db();
        let req = DataWrite {
            table: "Student".to_string(),
            columns: Some(vec!["FullName".to_string()]),
            conditions: vec![Condition::new("StudentID", "=", 7).unwrap()],
            new_value: WriteValue::Single(Value::Text("A Considerably Longer Name".into())),
        };
        assert_eq!(db.write(&req).unwrap(), 1);

        // the resized neighbourhood is still intact
        for i in [6, 7, 8] {
            let rows = select_where(&mut db, "Student", "StudentID", "=", Value::Int(i));
            assert_eq!(rows.len(), 1, "row {i} survived the shift");
        }
        let rows = select_where(&mut db, "Student", "StudentID", "=", Value::Int(7));
        assert_eq!(rows[0]["FullName"], Value::Text("A Considerably Longer Name".into()));
    }

    #[test]
    fn projection_and_case_sensitivity() {
        let (_dir, mut db) = seeded_db();
        let req = DataRetrieval {
            table: "Student".to_string(),
            projection: Projection::Columns(vec!["FullName".to_string(), "GPA".to_string()]),
            conditions: vec![Condition::new("StudentID", "=", 12).unwrap()],
        };
        let rows = db.select(&req).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].len(), 2);
        assert!(!rows[0].contains_key("StudentID"));

        let miss = db.select(&DataRetrieval {
            table: "student".to_string(),
            projection: Projection::All,
            conditions: Vec::new(),
        });
        assert_eq!(
            miss.unwrap_err().downcast::<StoreError>().unwrap(),
            StoreError::SchemaMiss("student".into())
        );
    }

    #[test]
    fn error_kinds_surface() {
        let (dir, mut db) = seeded_db();

        let e = db
            .select(&DataRetrieval {
                table: "Student".to_string(),
                projection: Projection::one("Nickname"),
                conditions: Vec::new(),
            })
            .unwrap_err();
        assert_eq!(
            e.downcast::<StoreError>().unwrap(),
            StoreError::ColumnMiss {
                table: "Student".into(),
                column: "Nickname".into()
            }
        );

        let e = db
            .select(&DataRetrieval {
                table: "Student".to_string(),
                projection: Projection::All,
                conditions: vec![Condition::new("Nickname", "=", 1).unwrap()],
            })
            .unwrap_err();
        assert!(matches!(
            e.downcast::<StoreError>().unwrap(),
            StoreError::ColumnMiss { .. }
        ));

        // catalogued table whose heap file disappeared
        std::fs::remove_file(dir.path().join("Student.dat")).unwrap();
        let e = db
            .select(&DataRetrieval {
                table: "Student".to_string(),
                projection: Projection::All,
                conditions: Vec::new(),
            })
            .unwrap_err();
        assert_eq!(
            e.downcast::<StoreError>().unwrap(),
            StoreError::HeapMissing("Student".into())
        );
    }

    #[test]
    fn stats_for_missing_table_are_zero() {
        let (_dir, mut db) = seeded_db();
        let stats = db.stats("Nonexistent").unwrap();
        assert_eq!(stats, TableStats::empty());
    }

    #[test]
    fn stats_report_index_kinds_with_btree_precedence() {
        let (_dir, mut db) = seeded_db();
        db.create_index("Student", "StudentID", IndexKind::Hash).unwrap();
        db.create_index("Student", "GPA", IndexKind::Btree).unwrap();

        let stats = db.stats("Student").unwrap();
        assert_eq!(stats.i_r["StudentID"], IndexStat::Hash { buckets: 200 });
        assert!(matches!(stats.i_r["GPA"], IndexStat::Btree { height } if height >= 2));
        assert_eq!(stats.i_r["FullName"], IndexStat::None);

        db.create_index("Student", "StudentID", IndexKind::Btree).unwrap();
        let stats = db.stats("Student").unwrap();
        assert!(matches!(stats.i_r["StudentID"], IndexStat::Btree { .. }));
    }

    #[test]
    fn catalog_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let mut db = Db::open(dir.path()).unwrap();
            db.create_table("Student", student_schema()).unwrap();
            insert(&mut db, "Student", student(1, "Persistent", 3.0));
        }
        let mut db = Db::open(dir.path()).unwrap();
        assert_eq!(db.tables(), vec!["Student"]);
        let rows = select_where(&mut db, "Student", "StudentID", "=", Value::Int(1));
        assert_eq!(rows, vec![student(1, "Persistent", 3.0)]);
    }

    #[test]
    fn heap_file_lookup_falls_back_on_case() {
        let dir = tempfile::tempdir().unwrap();
        let mut db = Db::open(dir.path()).unwrap();
        db.create_table("Student", student_schema()).unwrap();
        insert(&mut db, "Student", student(1, "A", 3.0));

        // the heap moves to the lowercase name; the catalog entry stays
        std::fs::rename(
            dir.path().join("Student.dat"),
            dir.path().join("student.dat"),
        )
        .unwrap();
        let rows = select_where(&mut db, "Student", "StudentID", "=", Value::Int(1));
        assert_eq!(rows.len(), 1);
    }

    #[test]
    fn string_operand_matches_numeric_column_via_scan() {
        let (_dir, mut db) = seeded_db();
        let rows = select_where(&mut db, "Student", "StudentID", "=", Value::Text("17".into()));
        assert_eq!(rows.len(), 1, "scan path coerces the operand");

        // with a hash index the typed probe misses, and the scan still wins
        db.create_index("Student", "StudentID", IndexKind::Hash).unwrap();
        let rows = select_where(&mut db, "Student", "StudentID", "=", Value::Text("17".into()));
        assert_eq!(rows.len(), 1);
    }

    #[test]
    fn rebuild_restores_index_after_compaction() {
        let (_dir, mut db) = seeded_db();
        db.create_index("Student", "StudentID", IndexKind::Hash).unwrap();

        // deleting an early row shifts every later slot on the page
        let req = DataDeletion {
            table: "Student".to_string(),
            conditions: vec![Condition::new("StudentID", "=", 1).unwrap()],
        };
        assert_eq!(db.delete(&req).unwrap(), 1);

        db.rebuild_index("Student", "StudentID", IndexKind::Hash).unwrap();
        for i in 2..=50 {
            let rows = select_where(&mut db, "Student", "StudentID", "=", Value::Int(i));
            assert_eq!(rows.len(), 1, "row {i} reachable after rebuild");
        }
    }
}
