use std::cmp::Ordering;
use std::str::FromStr;

use crate::db::error::StoreError;
use crate::db::row::Row;
use crate::db::value::Value;

/// Comparison operators a condition may carry. `<>` and `!=` parse to the
/// same operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
}

impl FromStr for Op {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, StoreError> {
        match s {
            "=" => Ok(Op::Eq),
            "<>" | "!=" => Ok(Op::Ne),
            ">" => Ok(Op::Gt),
            ">=" => Ok(Op::Ge),
            "<" => Ok(Op::Lt),
            "<=" => Ok(Op::Le),
            _ => Err(StoreError::BadOperator(s.to_string())),
        }
    }
}

/// One predicate: `column op operand`. Unsupported operators are rejected
/// here, at construction, never at evaluation time.
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    pub column: String,
    pub op: Op,
    pub operand: Value,
}

impl Condition {
    pub fn new(column: &str, op: &str, operand: impl Into<Value>) -> Result<Self, StoreError> {
        Ok(Condition {
            column: column.to_string(),
            op: op.parse()?,
            operand: operand.into(),
        })
    }
}

/// Which columns a retrieval returns.
#[derive(Debug, Clone, PartialEq)]
pub enum Projection {
    All,
    Columns(Vec<String>),
}

impl Projection {
    pub fn one(column: &str) -> Self {
        Projection::Columns(vec![column.to_string()])
    }

    pub(crate) fn column_names(&self) -> &[String] {
        match self {
            Projection::All => &[],
            Projection::Columns(cols) => cols,
        }
    }
}

/// A structured read request from the query layer.
#[derive(Debug, Clone)]
pub struct DataRetrieval {
    pub table: String,
    pub projection: Projection,
    pub conditions: Vec<Condition>,
}

/// The value side of a write: a full row mapping, or a single value that is
/// only meaningful together with a one-column target list.
#[derive(Debug, Clone)]
pub enum WriteValue {
    Row(Row),
    Single(Value),
}

/// A structured write request: an insert when no columns and no conditions
/// are given, an update otherwise.
#[derive(Debug, Clone)]
pub struct DataWrite {
    pub table: String,
    pub columns: Option<Vec<String>>,
    pub conditions: Vec<Condition>,
    pub new_value: WriteValue,
}

impl DataWrite {
    pub(crate) fn is_insert(&self) -> bool {
        self.columns.is_none() && self.conditions.is_empty()
    }
}

/// A structured delete request.
#[derive(Debug, Clone)]
pub struct DataDeletion {
    pub table: String,
    pub conditions: Vec<Condition>,
}

/// Evaluate one condition against a row. String operands are coerced to
/// numbers when the row side is numeric; incomparable pairs satisfy only
/// the not-equal operator.
pub(crate) fn matches(row: &Row, cond: &Condition) -> bool {
    let a = row.get(&cond.column).cloned().unwrap_or(Value::Null);
    let b = cond.operand.coerced_against(&a);
    let cmp = a.compare(&b);

    match cond.op {
        Op::Eq => cmp == Some(Ordering::Equal),
        Op::Ne => cmp != Some(Ordering::Equal),
        Op::Gt => cmp == Some(Ordering::Greater),
        Op::Ge => matches!(cmp, Some(Ordering::Greater | Ordering::Equal)),
        Op::Lt => cmp == Some(Ordering::Less),
        Op::Le => matches!(cmp, Some(Ordering::Less | Ordering::Equal)),
    }
}

/// Short-circuit AND over the condition list.
pub(crate) fn matches_all(row: &Row, conditions: &[Condition]) -> bool {
    conditions.iter().all(|cond| matches(row, cond))
}

/// Restrict a row to the projected columns.
pub(crate) fn project(row: Row, projection: &Projection) -> Row {
    match projection {
        Projection::All => row,
        Projection::Columns(cols) => cols
            .iter()
            .filter_map(|c| row.get(c).map(|v| (c.clone(), v.clone())))
            .collect(),
    }
}
