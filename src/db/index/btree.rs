use std::cmp::Ordering;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use bytes::{Buf, BufMut, BytesMut};
use log::debug;

use crate::db::error::StoreError;
use crate::db::index::{self, Locator};
use crate::db::value::Value;

pub(crate) const DEFAULT_ORDER: usize = 4;

const FILE_SUFFIX: &str = "btree";

/// Tree node in the arena. Children, parent and the sideways leaf link are
/// arena indices, never owning references: children are owned by their
/// parent's child list and `next_leaf` is a lookup only.
#[derive(Debug, Clone)]
struct Node {
    is_leaf: bool,
    keys: Vec<Value>,
    /// Leaf payloads, parallel to `keys`.
    values: Vec<Locator>,
    /// Internal fan-out: `children[i]` holds keys in `[keys[i-1], keys[i])`.
    children: Vec<usize>,
    parent: Option<usize>,
    next_leaf: Option<usize>,
}

impl Node {
    fn leaf() -> Self {
        Node {
            is_leaf: true,
            keys: Vec::new(),
            values: Vec::new(),
            children: Vec::new(),
            parent: None,
            next_leaf: None,
        }
    }
}

/// B+-tree index over one (table, column) pair.
///
/// Non-unique: duplicate keys coexist. A leaf is full when it holds `order`
/// keys, an internal node when it holds more than `order` children. Leaves
/// are chained left-to-right for range scans.
#[derive(Debug)]
pub(crate) struct BPlusTree {
    pub(crate) table: String,
    pub(crate) column: String,
    pub(crate) order: usize,
    pub(crate) entry_count: u32,
    nodes: Vec<Node>,
    root: usize,
}

impl BPlusTree {
    fn new(table: &str, column: &str, order: usize) -> Self {
        BPlusTree {
            table: table.to_string(),
            column: column.to_string(),
            order,
            entry_count: 0,
            nodes: vec![Node::leaf()],
            root: 0,
        }
    }

    fn push_node(&mut self, node: Node) -> usize {
        self.nodes.push(node);
        self.nodes.len() - 1
    }

    /// Descend to the leaf responsible for `key`: at each internal node the
    /// first child whose separator exceeds the key, else the last child.
    fn find_leaf(&self, key: &Value) -> usize {
        let mut node = self.root;
        while !self.nodes[node].is_leaf {
            let n = &self.nodes[node];
            let mut i = 0;
            while i < n.keys.len() && key.key_cmp(&n.keys[i]) != Ordering::Less {
                i += 1;
            }
            node = n.children[i];
        }
        node
    }

    pub(crate) fn insert(&mut self, key: Value, loc: Locator) {
        let leaf = self.find_leaf(&key);
        let node = &mut self.nodes[leaf];
        let mut pos = 0;
        while pos < node.keys.len() && key.key_cmp(&node.keys[pos]) == Ordering::Greater {
            pos += 1;
        }
        node.keys.insert(pos, key);
        node.values.insert(pos, loc);

        if self.nodes[leaf].keys.len() >= self.order {
            self.split_leaf(leaf);
        }
        self.entry_count += 1;
    }

    /// Left half keeps the first ⌊count/2⌋ entries; the right sibling takes
    /// the rest and inherits the old successor in the leaf chain. The right
    /// sibling's smallest key is promoted.
    fn split_leaf(&mut self, leaf: usize) {
        let mid = self.nodes[leaf].keys.len() / 2;
        let right_keys = self.nodes[leaf].keys.split_off(mid);
        let right_values = self.nodes[leaf].values.split_off(mid);

        let right = self.push_node(Node {
            is_leaf: true,
            keys: right_keys,
            values: right_values,
            children: Vec::new(),
            parent: self.nodes[leaf].parent,
            next_leaf: self.nodes[leaf].next_leaf,
        });
        self.nodes[leaf].next_leaf = Some(right);

        let promote = self.nodes[right].keys[0].clone();
        self.insert_in_parent(leaf, promote, right);
    }

    /// The middle key is promoted and removed from both halves.
    fn split_internal(&mut self, node: usize) {
        let mid = self.nodes[node].keys.len() / 2;
        let mut right_keys = self.nodes[node].keys.split_off(mid);
        let promote = right_keys.remove(0);
        let right_children = self.nodes[node].children.split_off(mid + 1);

        let right = self.push_node(Node {
            is_leaf: false,
            keys: right_keys,
            values: Vec::new(),
            children: right_children,
            parent: self.nodes[node].parent,
            next_leaf: None,
        });
        for i in 0..self.nodes[right].children.len() {
            let child = self.nodes[right].children[i];
            self.nodes[child].parent = Some(right);
        }

        self.insert_in_parent(node, promote, right);
    }

    fn insert_in_parent(&mut self, left: usize, key: Value, right: usize) {
        let Some(parent) = self.nodes[left].parent else {
            // root split: a fresh root keeps every node within reach
            let root = self.push_node(Node {
                is_leaf: false,
                keys: vec![key],
                values: Vec::new(),
                children: vec![left, right],
                parent: None,
                next_leaf: None,
            });
            self.nodes[left].parent = Some(root);
            self.nodes[right].parent = Some(root);
            self.root = root;
            return;
        };

        let mut pos = 0;
        while pos < self.nodes[parent].keys.len()
            && key.key_cmp(&self.nodes[parent].keys[pos]) == Ordering::Greater
        {
            pos += 1;
        }
        self.nodes[parent].keys.insert(pos, key);
        self.nodes[parent].children.insert(pos + 1, right);
        self.nodes[right].parent = Some(parent);

        if self.nodes[parent].children.len() > self.order {
            self.split_internal(parent);
        }
    }

    /// Point search: structural key equality within the responsible leaf.
    pub(crate) fn search(&self, key: &Value) -> Vec<Locator> {
        let leaf = &self.nodes[self.find_leaf(key)];
        leaf.keys
            .iter()
            .zip(&leaf.values)
            .filter(|(k, _)| *k == key)
            .map(|(_, &loc)| loc)
            .collect()
    }

    /// Ordered scan of every entry with key in `[lo, hi]`, walking the leaf
    /// chain and stopping at the first key past `hi`.
    pub(crate) fn range_search(&self, lo: &Value, hi: &Value) -> Vec<(Value, Locator)> {
        let mut out = Vec::new();
        let mut current = Some(self.find_leaf(lo));
        while let Some(idx) = current {
            let node = &self.nodes[idx];
            for (k, &loc) in node.keys.iter().zip(&node.values) {
                if k.key_cmp(hi) == Ordering::Greater {
                    return out;
                }
                if k.key_cmp(lo) != Ordering::Less {
                    out.push((k.clone(), loc));
                }
            }
            current = node.next_leaf;
        }
        out
    }

    /// Remove the first leaf entry matching both key and locator. The tree
    /// is never rebalanced on deletion.
    pub(crate) fn delete(&mut self, key: &Value, loc: Locator) -> bool {
        let leaf = self.find_leaf(key);
        let node = &mut self.nodes[leaf];
        if let Some(pos) = node
            .keys
            .iter()
            .zip(&node.values)
            .position(|(k, l)| k == key && *l == loc)
        {
            node.keys.remove(pos);
            node.values.remove(pos);
            self.entry_count -= 1;
            return true;
        }
        false
    }

    /// Smallest key in the tree, found at the leftmost leaf.
    pub(crate) fn min_key(&self) -> Option<Value> {
        let mut node = self.root;
        while !self.nodes[node].is_leaf {
            node = *self.nodes[node].children.first()?;
        }
        self.nodes[node].keys.first().cloned()
    }

    /// Largest key in the tree, found at the rightmost leaf.
    pub(crate) fn max_key(&self) -> Option<Value> {
        let mut node = self.root;
        while !self.nodes[node].is_leaf {
            node = *self.nodes[node].children.last()?;
        }
        self.nodes[node].keys.last().cloned()
    }

    /// Levels from root to leaf, inclusive. An empty tree is one level: its
    /// root is a leaf.
    pub(crate) fn height(&self) -> u32 {
        let mut h = 1;
        let mut node = self.root;
        while !self.nodes[node].is_leaf {
            h += 1;
            node = self.nodes[node].children[0];
        }
        h
    }

    fn write_node(&self, idx: usize, buf: &mut BytesMut) {
        let node = &self.nodes[idx];
        buf.put_u8(1);
        buf.put_u8(node.is_leaf as u8);
        buf.put_u32_le(self.order as u32);
        buf.put_u32_le(node.keys.len() as u32);
        for key in &node.keys {
            index::write_key(buf, key);
        }
        if node.is_leaf {
            buf.put_u32_le(node.values.len() as u32);
            for loc in &node.values {
                buf.put_u32_le(loc.page_id);
                buf.put_u32_le(loc.slot_id);
            }
        } else {
            buf.put_u32_le(node.children.len() as u32);
            for &child in &node.children {
                self.write_node(child, buf);
            }
        }
    }

    fn serialize(&self) -> BytesMut {
        let mut buf = BytesMut::new();
        index::put_str(&mut buf, &self.table);
        index::put_str(&mut buf, &self.column);
        buf.put_u32_le(self.order as u32);
        buf.put_u32_le(self.entry_count);

        let mut tree = BytesMut::new();
        self.write_node(self.root, &mut tree);
        buf.put_u32_le(tree.len() as u32);
        buf.put_slice(&tree);
        buf
    }

    fn read_node(
        buf: &mut &[u8],
        nodes: &mut Vec<Node>,
        parent: Option<usize>,
    ) -> Result<Option<usize>, StoreError> {
        let short = || StoreError::DecodeFailure("btree node truncated".into());

        if buf.remaining() < 1 {
            return Err(short());
        }
        if buf.get_u8() == 0 {
            return Ok(None);
        }
        if buf.remaining() < 9 {
            return Err(short());
        }
        let is_leaf = buf.get_u8() == 1;
        let _order = buf.get_u32_le();
        let key_count = buf.get_u32_le();

        let mut keys = Vec::with_capacity(key_count as usize);
        for _ in 0..key_count {
            keys.push(index::read_key(buf)?);
        }

        let idx = nodes.len();
        if is_leaf {
            if buf.remaining() < 4 {
                return Err(short());
            }
            let value_count = buf.get_u32_le();
            let mut values = Vec::with_capacity(value_count as usize);
            for _ in 0..value_count {
                if buf.remaining() < 8 {
                    return Err(short());
                }
                values.push(Locator::new(buf.get_u32_le(), buf.get_u32_le()));
            }
            nodes.push(Node {
                is_leaf: true,
                keys,
                values,
                children: Vec::new(),
                parent,
                next_leaf: None,
            });
        } else {
            if buf.remaining() < 4 {
                return Err(short());
            }
            let child_count = buf.get_u32_le();
            nodes.push(Node {
                is_leaf: false,
                keys,
                values: Vec::new(),
                children: Vec::new(),
                parent,
                next_leaf: None,
            });
            for _ in 0..child_count {
                let child = Self::read_node(buf, nodes, Some(idx))?
                    .ok_or_else(|| StoreError::DecodeFailure("missing btree child".into()))?;
                nodes[idx].children.push(child);
            }
        }
        Ok(Some(idx))
    }

    fn deserialize(data: &[u8]) -> Result<BPlusTree, StoreError> {
        let mut buf = data;
        let table = index::take_str(&mut buf)?;
        let column = index::take_str(&mut buf)?;
        if buf.remaining() < 12 {
            return Err(StoreError::DecodeFailure("btree header truncated".into()));
        }
        let order = buf.get_u32_le() as usize;
        let entry_count = buf.get_u32_le();
        let _tree_len = buf.get_u32_le();

        let mut nodes = Vec::new();
        let root = Self::read_node(&mut buf, &mut nodes, None)?;

        let mut tree = match root {
            Some(root) => BPlusTree {
                table,
                column,
                order,
                entry_count,
                nodes,
                root,
            },
            None => BPlusTree::new(&table, &column, order),
        };
        tree.relink_leaves();
        Ok(tree)
    }

    /// The file format stores no leaf links; rebuild the whole chain with
    /// one left-to-right walk so range scans cross internal-node boundaries.
    fn relink_leaves(&mut self) {
        let mut leaves = Vec::new();
        self.collect_leaves(self.root, &mut leaves);
        for pair in leaves.windows(2) {
            self.nodes[pair[0]].next_leaf = Some(pair[1]);
        }
        if let Some(&last) = leaves.last() {
            self.nodes[last].next_leaf = None;
        }
    }

    fn collect_leaves(&self, idx: usize, out: &mut Vec<usize>) {
        if self.nodes[idx].is_leaf {
            out.push(idx);
        } else {
            for &child in &self.nodes[idx].children {
                self.collect_leaves(child, out);
            }
        }
    }
}

/// Owns the on-disk B+-tree indexes and an in-memory cache keyed by
/// (table, column).
#[derive(Debug)]
pub(crate) struct BTreeIndexManager {
    index_dir: PathBuf,
    cache: HashMap<(String, String), BPlusTree>,
}

impl BTreeIndexManager {
    pub(crate) fn new(index_dir: &Path) -> Self {
        BTreeIndexManager {
            index_dir: index_dir.to_path_buf(),
            cache: HashMap::new(),
        }
    }

    fn file(&self, table: &str, column: &str) -> PathBuf {
        index::index_file(&self.index_dir, table, column, FILE_SUFFIX)
    }

    pub(crate) fn create(&mut self, table: &str, column: &str) -> Result<()> {
        let tree = BPlusTree::new(table, column, DEFAULT_ORDER);
        std::fs::write(self.file(table, column), &tree.serialize())
            .with_context(|| format!("create btree index on {table}.{column}"))?;
        self.cache.insert((table.to_string(), column.to_string()), tree);
        Ok(())
    }

    pub(crate) fn load(&mut self, table: &str, column: &str) -> Result<Option<&mut BPlusTree>> {
        let key = (table.to_string(), column.to_string());
        if !self.cache.contains_key(&key) {
            let path = self.file(table, column);
            if !path.exists() {
                return Ok(None);
            }
            let data = std::fs::read(&path)
                .with_context(|| format!("read btree index {}", path.display()))?;
            let tree = BPlusTree::deserialize(&data)
                .with_context(|| format!("deserialize btree index on {table}.{column}"))?;
            debug!("loaded btree index on {table}.{column}: {} entries", tree.entry_count);
            self.cache.insert(key.clone(), tree);
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
        let tree = self.load(table, column)?.ok_or_else(|| StoreError::IndexMissing {
            table: table.to_string(),
            column: column.to_string(),
        })?;
        tree.insert(key, loc);
        Ok(())
    }

    pub(crate) fn search(&mut self, table: &str, column: &str, key: &Value) -> Result<Vec<Locator>> {
        Ok(match self.load(table, column)? {
            Some(tree) => tree.search(key),
            None => Vec::new(),
        })
    }

    pub(crate) fn range_search(
        &mut self,
        table: &str,
        column: &str,
        lo: &Value,
        hi: &Value,
    ) -> Result<Vec<(Value, Locator)>> {
        Ok(match self.load(table, column)? {
            Some(tree) => tree.range_search(lo, hi),
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
            Some(tree) => tree.delete(key, loc),
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

    pub(crate) fn save(&mut self, table: &str, column: &str) -> Result<bool> {
        let key = (table.to_string(), column.to_string());
        match self.cache.get(&key) {
            Some(tree) => {
                std::fs::write(self.file(table, column), &tree.serialize())
                    .with_context(|| format!("save btree index on {table}.{column}"))?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub(crate) fn drop_index(&mut self, table: &str, column: &str) -> Result<()> {
        let path = self.file(table, column);
        if path.exists() {
            std::fs::remove_file(&path)
                .with_context(|| format!("remove btree index {}", path.display()))?;
        }
        self.cache.remove(&(table.to_string(), column.to_string()));
        Ok(())
    }

    pub(crate) fn list(&self, table: &str) -> Vec<String> {
        index::list_index_columns(&self.index_dir, table, FILE_SUFFIX)
    }
}
