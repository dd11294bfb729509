//! Primitive column codecs.
//!
//! Integers and floats are packed as 4-byte little-endian values; the
//! on-disk format assumes a little-endian host. `char(n)` occupies exactly
//! n bytes (NUL-padded), `varchar(n)` is a u32-LE length prefix followed by
//! at most n bytes of UTF-8.

use bytes::{Buf, BufMut, BytesMut};

use crate::db::error::StoreError;

fn need<T: Buf>(buf: &T, n: usize, what: &str) -> Result<(), StoreError> {
    if buf.remaining() < n {
        return Err(StoreError::DecodeFailure(format!(
            "buffer is too short ({} bytes) for {what}",
            buf.remaining()
        )));
    }
    Ok(())
}

/// Longest prefix of `s` that fits `max` bytes without splitting a
/// character. Truncating mid-character would store bytes that can never be
/// decoded again.
fn utf8_prefix(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

pub(crate) fn encode_int(buf: &mut BytesMut, v: i32) {
    buf.put_i32_le(v);
}

pub(crate) fn decode_int<T: Buf>(buf: &mut T) -> Result<i32, StoreError> {
    need(buf, 4, "int")?;
    Ok(buf.get_i32_le())
}

pub(crate) fn encode_float(buf: &mut BytesMut, v: f32) {
    buf.put_f32_le(v);
}

/// Decoded floats are rounded to two fractional digits. This is the
/// documented precision of the format, not an accident of IEEE-754.
pub(crate) fn decode_float<T: Buf>(buf: &mut T) -> Result<f32, StoreError> {
    need(buf, 4, "float")?;
    let v = buf.get_f32_le();
    Ok((v * 100.0).round() / 100.0)
}

pub(crate) fn encode_char(buf: &mut BytesMut, v: &str, len: usize) {
    let bytes = utf8_prefix(v, len).as_bytes();
    buf.put_slice(bytes);
    buf.put_bytes(0, len - bytes.len());
}

pub(crate) fn decode_char<T: Buf>(buf: &mut T, len: usize) -> Result<String, StoreError> {
    need(buf, len, "char")?;
    let raw = buf.copy_to_bytes(len);
    let end = raw.iter().rposition(|&b| b != 0).map_or(0, |p| p + 1);
    String::from_utf8(raw[..end].to_vec())
        .map_err(|e| StoreError::DecodeFailure(format!("char field is not UTF-8: {e}")))
}

pub(crate) fn encode_varchar(buf: &mut BytesMut, v: &str, max: usize) {
    let bytes = utf8_prefix(v, max).as_bytes();
    buf.put_u32_le(bytes.len() as u32);
    buf.put_slice(bytes);
}

pub(crate) fn decode_varchar<T: Buf>(buf: &mut T) -> Result<String, StoreError> {
    need(buf, 4, "varchar length")?;
    let len = buf.get_u32_le() as usize;
    need(buf, len, "varchar payload")?;
    let raw = buf.copy_to_bytes(len);
    String::from_utf8(raw.to_vec())
        .map_err(|e| StoreError::DecodeFailure(format!("varchar field is not UTF-8: {e}")))
}
