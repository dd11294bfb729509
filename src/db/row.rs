use std::collections::BTreeMap;

use bytes::{Bytes, BytesMut};

use crate::db::codec;
use crate::db::error::StoreError;
use crate::db::schema::{DataType, Schema};
use crate::db::value::Value;

/// An in-memory row: attribute name → value. Rows only exist while being
/// encoded or decoded; the stored form is the schema-ordered byte string.
pub type Row = BTreeMap<String, Value>;

/// Encode `row` into the schema-ordered byte form. The result is not
/// self-describing; decoding requires the same schema.
pub(crate) fn serialize_row(schema: &Schema, row: &Row) -> Result<Bytes, StoreError> {
    let mut buf = BytesMut::new();

    for attr in schema.attributes() {
        let value = row
            .get(&attr.name)
            .ok_or_else(|| StoreError::BadValue(format!("missing value for '{}'", attr.name)))?;

        match attr.dtype {
            DataType::Int => codec::encode_int(&mut buf, value.as_i32()?),
            DataType::Float => codec::encode_float(&mut buf, value.as_f32()?),
            DataType::Char | DataType::Varchar => {
                if matches!(value, Value::Null) {
                    return Err(StoreError::BadValue(format!(
                        "NULL cannot be stored in '{}'",
                        attr.name
                    )));
                }
                let text = value.to_string();
                if attr.dtype == DataType::Char {
                    codec::encode_char(&mut buf, &text, attr.size as usize);
                } else {
                    codec::encode_varchar(&mut buf, &text, attr.size as usize);
                }
            }
        }
    }

    Ok(buf.freeze())
}

pub(crate) fn deserialize_row(schema: &Schema, data: &[u8]) -> Result<Row, StoreError> {
    let mut cursor = data;
    let mut row = Row::new();

    for attr in schema.attributes() {
        let value = match attr.dtype {
            DataType::Int => Value::Int(codec::decode_int(&mut cursor)?),
            DataType::Float => Value::Float(codec::decode_float(&mut cursor)?),
            DataType::Char => Value::Text(codec::decode_char(&mut cursor, attr.size as usize)?),
            DataType::Varchar => Value::Text(codec::decode_varchar(&mut cursor)?),
        };
        row.insert(attr.name.clone(), value);
    }

    Ok(row)
}
