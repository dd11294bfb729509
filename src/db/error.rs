use thiserror::Error;

/// Error kinds the engine reports to its caller.
///
/// `PageFull`, `SlotOutOfRange` and `IndexMissing` are internal: the storage
/// manager recovers from them (new page allocation, skipped record, no-op)
/// and they normally never cross the public API. The remaining kinds are
/// surfaced as-is, wrapped in `anyhow::Error` so call sites can attach
/// context and callers can still downcast to the kind.
#[derive(Debug, Error, PartialEq)]
pub enum StoreError {
    #[error("table '{0}' does not exist")]
    SchemaMiss(String),

    #[error("column '{column}' is not in table '{table}'")]
    ColumnMiss { table: String, column: String },

    #[error("data file for table '{0}' does not exist")]
    HeapMissing(String),

    #[error("cannot decode record: {0}")]
    DecodeFailure(String),

    #[error("not enough space on page for a {0}-byte record")]
    PageFull(usize),

    #[error("slot {slot} out of range (page holds {count} records)")]
    SlotOutOfRange { slot: u16, count: u16 },

    #[error("no index on {table}.{column}")]
    IndexMissing { table: String, column: String },

    #[error("invalid operator: {0}")]
    BadOperator(String),

    #[error("bad value for write: {0}")]
    BadValue(String),
}
