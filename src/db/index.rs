pub(crate) mod btree;
pub(crate) mod hash;

use std::path::{Path, PathBuf};

use bytes::{Buf, BufMut, BytesMut};

use crate::db::error::StoreError;
use crate::db::value::Value;

/// Identifies one live row: the page holding it and the slot within that
/// page. What index entries point at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Locator {
    pub page_id: u32,
    pub slot_id: u32,
}

impl Locator {
    pub fn new(page_id: u32, slot_id: u32) -> Self {
        Locator { page_id, slot_id }
    }
}

/// One-byte key-type tags shared by both index file formats.
const TAG_NULL: u8 = 0;
const TAG_INT: u8 = 1;
const TAG_FLOAT: u8 = 2;
const TAG_TEXT: u8 = 3;

/// Key wire form: type tag, u32-LE byte length, key bytes.
pub(crate) fn write_key(buf: &mut BytesMut, key: &Value) {
    match key {
        Value::Null => {
            buf.put_u8(TAG_NULL);
            buf.put_u32_le(0);
        }
        Value::Int(v) => {
            buf.put_u8(TAG_INT);
            buf.put_u32_le(4);
            buf.put_i32_le(*v);
        }
        Value::Float(v) => {
            buf.put_u8(TAG_FLOAT);
            buf.put_u32_le(4);
            buf.put_f32_le(*v);
        }
        Value::Text(s) => {
            buf.put_u8(TAG_TEXT);
            buf.put_u32_le(s.len() as u32);
            buf.put_slice(s.as_bytes());
        }
    }
}

pub(crate) fn read_key<T: Buf>(buf: &mut T) -> Result<Value, StoreError> {
    if buf.remaining() < 5 {
        return Err(StoreError::DecodeFailure("index key truncated".into()));
    }
    let tag = buf.get_u8();
    let len = buf.get_u32_le() as usize;
    if buf.remaining() < len {
        return Err(StoreError::DecodeFailure("index key truncated".into()));
    }

    match tag {
        TAG_NULL => Ok(Value::Null),
        TAG_INT => Ok(Value::Int(buf.get_i32_le())),
        TAG_FLOAT => Ok(Value::Float(buf.get_f32_le())),
        TAG_TEXT => {
            let raw = buf.copy_to_bytes(len);
            String::from_utf8(raw.to_vec())
                .map(Value::Text)
                .map_err(|e| StoreError::DecodeFailure(format!("index key is not UTF-8: {e}")))
        }
        _ => Err(StoreError::DecodeFailure(format!("unknown key tag {tag}"))),
    }
}

pub(crate) fn put_str(buf: &mut BytesMut, s: &str) {
    buf.put_i32_le(s.len() as i32);
    buf.put_slice(s.as_bytes());
}

pub(crate) fn take_str<T: Buf>(buf: &mut T) -> Result<String, StoreError> {
    if buf.remaining() < 4 {
        return Err(StoreError::DecodeFailure("index header truncated".into()));
    }
    let len = buf.get_i32_le() as usize;
    if buf.remaining() < len {
        return Err(StoreError::DecodeFailure("index header truncated".into()));
    }
    String::from_utf8(buf.copy_to_bytes(len).to_vec())
        .map_err(|e| StoreError::DecodeFailure(format!("index header is not UTF-8: {e}")))
}

/// `<Table>_<Column>_<suffix>.idx` under the index directory.
pub(crate) fn index_file(dir: &Path, table: &str, column: &str, suffix: &str) -> PathBuf {
    dir.join(format!("{table}_{column}_{suffix}.idx"))
}

/// Discover indexes of one family by directory scan. The file stem splits
/// on its last `_` before the suffix: table names may contain underscores,
/// column names in indexed columns must not.
pub(crate) fn list_index_columns(dir: &Path, table: &str, suffix: &str) -> Vec<String> {
    let tail = format!("_{suffix}.idx");
    let mut columns = Vec::new();

    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(_) => return columns,
    };
    for entry in entries.flatten() {
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        let Some(stem) = name.strip_suffix(&tail) else { continue };
        if let Some((t, column)) = stem.rsplit_once('_') {
            if t == table {
                columns.push(column.to_string());
            }
        }
    }
    columns.sort();
    columns
}
