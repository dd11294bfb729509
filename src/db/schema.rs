use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{bail, Context, Result};
use bytes::{Buf, BufMut, BytesMut};

use crate::db::error::StoreError;

/// Column types the row codec understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataType {
    Int,
    Float,
    Char,
    Varchar,
}

impl DataType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DataType::Int => "int",
            DataType::Float => "float",
            DataType::Char => "char",
            DataType::Varchar => "varchar",
        }
    }

    pub(crate) fn from_str(s: &str) -> Result<DataType> {
        match s {
            "int" => Ok(DataType::Int),
            "float" => Ok(DataType::Float),
            "char" => Ok(DataType::Char),
            "varchar" => Ok(DataType::Varchar),
            _ => bail!("unknown column type '{s}'"),
        }
    }
}

/// One column: name, type and declared size.
///
/// The declared size only matters for char (exact byte width) and varchar
/// (maximum byte width); int and float are always 4 bytes.
#[derive(Debug, Clone, PartialEq)]
pub struct Attribute {
    pub name: String,
    pub dtype: DataType,
    pub size: u16,
}

/// Ordered column list of one table. Attribute names are unique.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Schema {
    attributes: Vec<Attribute>,
}

impl Schema {
    pub fn new() -> Self {
        Schema { attributes: Vec::new() }
    }

    pub fn add_attribute(&mut self, name: &str, dtype: DataType, size: u16) -> Result<()> {
        if self.attributes.iter().any(|a| a.name == name) {
            bail!("attribute '{name}' already exists in the schema");
        }
        self.attributes.push(Attribute {
            name: name.to_string(),
            dtype,
            size,
        });
        Ok(())
    }

    pub fn attributes(&self) -> &[Attribute] {
        &self.attributes
    }

    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.attributes.iter().find(|a| a.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.attribute(name).is_some()
    }

    /// Self-describing byte form: u16-LE attribute count, then per attribute
    /// a length-prefixed name, a length-prefixed type tag and a u16-LE size.
    pub(crate) fn serialize(&self) -> BytesMut {
        let mut buf = BytesMut::new();
        buf.put_u16_le(self.attributes.len() as u16);
        for attr in &self.attributes {
            buf.put_u16_le(attr.name.len() as u16);
            buf.put_slice(attr.name.as_bytes());
            let tag = attr.dtype.as_str();
            buf.put_u16_le(tag.len() as u16);
            buf.put_slice(tag.as_bytes());
            buf.put_u16_le(attr.size);
        }
        buf
    }

    pub(crate) fn deserialize(mut data: &[u8]) -> Result<Schema> {
        fn take_str(buf: &mut &[u8]) -> Result<String> {
            anyhow::ensure!(buf.remaining() >= 2, "schema blob truncated");
            let len = buf.get_u16_le() as usize;
            anyhow::ensure!(buf.remaining() >= len, "schema blob truncated");
            Ok(String::from_utf8(buf.copy_to_bytes(len).to_vec())?)
        }

        anyhow::ensure!(data.remaining() >= 2, "schema blob truncated");
        let count = data.get_u16_le();

        let mut schema = Schema::new();
        for _ in 0..count {
            let name = take_str(&mut data)?;
            let dtype = DataType::from_str(&take_str(&mut data)?)?;
            anyhow::ensure!(data.remaining() >= 2, "schema blob truncated");
            let size = data.get_u16_le();
            schema.add_attribute(&name, dtype, size)?;
        }
        Ok(schema)
    }
}

/// The table-name → schema mapping, persisted as `schema.dat`.
///
/// Lookups are case-sensitive; one catalog belongs to one storage-manager
/// instance for its whole lifetime.
#[derive(Debug, Default)]
pub struct Catalog {
    tables: BTreeMap<String, Schema>,
}

impl Catalog {
    pub(crate) fn new() -> Self {
        Catalog { tables: BTreeMap::new() }
    }

    pub(crate) fn insert(&mut self, table: &str, schema: Schema) {
        self.tables.insert(table.to_string(), schema);
    }

    pub(crate) fn get(&self, table: &str) -> Option<&Schema> {
        self.tables.get(table)
    }

    pub(crate) fn require(&self, table: &str) -> Result<&Schema, StoreError> {
        self.get(table)
            .ok_or_else(|| StoreError::SchemaMiss(table.to_string()))
    }

    pub(crate) fn tables(&self) -> impl Iterator<Item = &str> {
        self.tables.keys().map(|s| s.as_str())
    }

    pub(crate) fn save(&self, path: &Path) -> Result<()> {
        let mut buf = BytesMut::new();
        buf.put_i32_le(self.tables.len() as i32);
        for (name, schema) in &self.tables {
            buf.put_i32_le(name.len() as i32);
            buf.put_slice(name.as_bytes());
            let blob = schema.serialize();
            buf.put_i32_le(blob.len() as i32);
            buf.put_slice(&blob);
        }
        std::fs::write(path, &buf).with_context(|| format!("write {}", path.display()))
    }

    pub(crate) fn load(path: &Path) -> Result<Catalog> {
        let data = std::fs::read(path).with_context(|| format!("read {}", path.display()))?;
        let mut buf = &data[..];

        anyhow::ensure!(buf.remaining() >= 4, "schema catalog truncated");
        let count = buf.get_i32_le();

        let mut catalog = Catalog::new();
        for _ in 0..count {
            anyhow::ensure!(buf.remaining() >= 4, "schema catalog truncated");
            let name_len = buf.get_i32_le() as usize;
            anyhow::ensure!(buf.remaining() >= name_len, "schema catalog truncated");
            let name = String::from_utf8(buf.copy_to_bytes(name_len).to_vec())?;

            anyhow::ensure!(buf.remaining() >= 4, "schema catalog truncated");
            let blob_len = buf.get_i32_le() as usize;
            anyhow::ensure!(buf.remaining() >= blob_len, "schema catalog truncated");
            let blob = buf.copy_to_bytes(blob_len);
            let schema = Schema::deserialize(&blob)
                .with_context(|| format!("deserialize schema for table '{name}'"))?;

            catalog.insert(&name, schema);
        }
        Ok(catalog)
    }
}
