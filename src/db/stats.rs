use std::collections::BTreeMap;
use std::fmt;

use crate::db::schema::{DataType, Schema};

/// What kind of index covers an attribute, with its headline figure:
/// bucket count for hash, height for B+-tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexStat {
    None,
    Hash { buckets: u32 },
    Btree { height: u32 },
}

/// Query-optimizer statistics for one relation.
#[derive(Debug, Clone, PartialEq)]
pub struct TableStats {
    /// Row count.
    pub n_r: u64,
    /// Block count: ⌈n_r / f_r⌉ for populated tables, else on-disk pages.
    pub b_r: u64,
    /// Estimated row length in bytes, derived from the schema alone.
    pub l_r: u64,
    /// Blocking factor: rows per page, at least 1.
    pub f_r: u64,
    /// Distinct value count per attribute.
    pub v_a_r: BTreeMap<String, u64>,
    /// Index coverage per attribute.
    pub i_r: BTreeMap<String, IndexStat>,
}

impl TableStats {
    /// The statistic reported for missing tables: all zeros, empty maps.
    pub(crate) fn empty() -> Self {
        TableStats {
            n_r: 0,
            b_r: 0,
            l_r: 0,
            f_r: 0,
            v_a_r: BTreeMap::new(),
            i_r: BTreeMap::new(),
        }
    }
}

/// Schema-derived row length estimate: int and float are 4 bytes, char its
/// declared size, varchar the length prefix plus half the declared maximum.
pub(crate) fn estimated_row_len(schema: &Schema) -> u64 {
    schema
        .attributes()
        .iter()
        .map(|attr| match attr.dtype {
            DataType::Int | DataType::Float => 4,
            DataType::Char => attr.size as u64,
            DataType::Varchar => 4 + attr.size as u64 / 2,
        })
        .sum()
}

impl fmt::Display for TableStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "n_r: {}", self.n_r)?;
        writeln!(f, "b_r: {}", self.b_r)?;
        writeln!(f, "l_r: {}", self.l_r)?;
        writeln!(f, "f_r: {}", self.f_r)?;
        for (attr, count) in &self.v_a_r {
            writeln!(f, "V({attr}): {count}")?;
        }
        for (attr, stat) in &self.i_r {
            match stat {
                IndexStat::None => writeln!(f, "i({attr}): none")?,
                IndexStat::Hash { buckets } => writeln!(f, "i({attr}): hash, {buckets} buckets")?,
                IndexStat::Btree { height } => writeln!(f, "i({attr}): btree, height {height}")?,
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_length_follows_the_schema() {
        let mut schema = Schema::new();
        schema.add_attribute("StudentID", DataType::Int, 4).unwrap();
        schema.add_attribute("FullName", DataType::Varchar, 50).unwrap();
        schema.add_attribute("GPA", DataType::Float, 4).unwrap();
        schema.add_attribute("Initials", DataType::Char, 3).unwrap();
        // 4 + (4 + 25) + 4 + 3
        assert_eq!(estimated_row_len(&schema), 40);
    }
}
