//! Raw tensor bytes to structured-text scalars and back
//!
//! Fixed-width elements are packed native-endian with no padding. BYTES
//! elements are `{u32 little-endian length}{content}` and can only be
//! located by scanning from the start of the buffer. FP16 and BF16 have no
//! structured-text form and are always rejected.

use super::{Datatype, Element};
use inferlink_common::CodecError;
use num_traits::{NumCast, ToPrimitive};
use serde_json::{Number, Value};
use std::fmt::Display;
use tracing::trace;

type CodecResult<T> = std::result::Result<T, CodecError>;

const LENGTH_PREFIX: usize = std::mem::size_of::<u32>();

/// Exact buffer size for `element_count` fixed-width elements
///
/// Returns `None` for BYTES, whose size depends on the contents.
pub fn expected_byte_size(datatype: Datatype, element_count: usize) -> CodecResult<Option<usize>> {
    datatype
        .byte_width()
        .map(|width| byte_size(element_count, width))
        .transpose()
}

fn byte_size(element_count: usize, width: usize) -> CodecResult<usize> {
    element_count
        .checked_mul(width)
        .ok_or_else(|| CodecError::overflow(format!("{} elements of {} bytes", element_count, width)))
}

/// Read `buffer` as `element_count` packed elements of `datatype`
pub fn decode_to_scalars(
    buffer: &[u8],
    element_count: usize,
    datatype: Datatype,
) -> CodecResult<Vec<Value>> {
    trace!(%datatype, element_count, bytes = buffer.len(), "decoding tensor to scalars");

    match datatype {
        Datatype::Bool => read_fixed::<bool>(buffer, element_count, |v| Ok(Value::Bool(v))),
        Datatype::Uint8 => read_fixed::<u8>(buffer, element_count, |v| Ok(Value::from(v))),
        Datatype::Uint16 => read_fixed::<u16>(buffer, element_count, |v| Ok(Value::from(v))),
        Datatype::Uint32 => read_fixed::<u32>(buffer, element_count, |v| Ok(Value::from(v))),
        Datatype::Uint64 => read_fixed::<u64>(buffer, element_count, |v| Ok(Value::from(v))),
        Datatype::Int8 => read_fixed::<i8>(buffer, element_count, |v| Ok(Value::from(v))),
        Datatype::Int16 => read_fixed::<i16>(buffer, element_count, |v| Ok(Value::from(v))),
        Datatype::Int32 => read_fixed::<i32>(buffer, element_count, |v| Ok(Value::from(v))),
        Datatype::Int64 => read_fixed::<i64>(buffer, element_count, |v| Ok(Value::from(v))),
        Datatype::Fp32 => read_fixed::<f32>(buffer, element_count, |v| {
            float_value(<f64 as From<f32>>::from(v), datatype)
        }),
        Datatype::Fp64 => read_fixed::<f64>(buffer, element_count, |v| float_value(v, datatype)),
        Datatype::Bytes => read_bytes(buffer, element_count),
        Datatype::Fp16 | Datatype::Bf16 => Err(CodecError::unsupported(datatype.as_str())),
    }
}

/// Pack structured-text scalars as raw bytes of `datatype`
pub fn encode_from_scalars(values: &[Value], datatype: Datatype) -> CodecResult<Vec<u8>> {
    trace!(%datatype, element_count = values.len(), "encoding scalars to tensor");

    if matches!(datatype, Datatype::Fp16 | Datatype::Bf16) {
        return Err(CodecError::unsupported(datatype.as_str()));
    }

    let mut out = Vec::with_capacity(expected_byte_size(datatype, values.len())?.unwrap_or(0));

    for value in values {
        match datatype {
            Datatype::Bool => match value {
                Value::Bool(b) => b.write_ne(&mut out),
                other => return Err(wrong_kind(datatype, "a boolean", other)),
            },
            Datatype::Uint8 => narrow::<u8, _>(unsigned(value, datatype)?, datatype)?.write_ne(&mut out),
            Datatype::Uint16 => narrow::<u16, _>(unsigned(value, datatype)?, datatype)?.write_ne(&mut out),
            Datatype::Uint32 => narrow::<u32, _>(unsigned(value, datatype)?, datatype)?.write_ne(&mut out),
            Datatype::Uint64 => unsigned(value, datatype)?.write_ne(&mut out),
            Datatype::Int8 => narrow::<i8, _>(signed(value, datatype)?, datatype)?.write_ne(&mut out),
            Datatype::Int16 => narrow::<i16, _>(signed(value, datatype)?, datatype)?.write_ne(&mut out),
            Datatype::Int32 => narrow::<i32, _>(signed(value, datatype)?, datatype)?.write_ne(&mut out),
            Datatype::Int64 => signed(value, datatype)?.write_ne(&mut out),
            Datatype::Fp32 => {
                let v = float(value, datatype)?;
                if v.is_finite() && v.abs() > <f64 as From<f32>>::from(f32::MAX) {
                    return Err(CodecError::out_of_range(datatype.as_str(), v));
                }
                (v as f32).write_ne(&mut out);
            }
            Datatype::Fp64 => float(value, datatype)?.write_ne(&mut out),
            Datatype::Bytes => match value {
                Value::String(s) => {
                    let len = u32::try_from(s.len())
                        .map_err(|_| CodecError::out_of_range(datatype.as_str(), format!("{} bytes", s.len())))?;
                    out.extend_from_slice(&len.to_le_bytes());
                    out.extend_from_slice(s.as_bytes());
                }
                other => return Err(wrong_kind(datatype, "a string", other)),
            },
            Datatype::Fp16 | Datatype::Bf16 => return Err(CodecError::unsupported(datatype.as_str())),
        }
    }

    Ok(out)
}

fn read_fixed<T: Element>(
    buffer: &[u8],
    element_count: usize,
    to_value: impl Fn(T) -> CodecResult<Value>,
) -> CodecResult<Vec<Value>> {
    let expected = byte_size(element_count, T::WIDTH)?;
    if buffer.len() != expected {
        return Err(CodecError::SizeMismatch {
            expected,
            actual: buffer.len(),
        });
    }

    buffer
        .chunks_exact(T::WIDTH)
        .map(|chunk| to_value(T::read_ne(chunk)))
        .collect()
}

fn read_bytes(buffer: &[u8], element_count: usize) -> CodecResult<Vec<Value>> {
    split_bytes_elements(buffer, element_count)?
        .into_iter()
        .enumerate()
        .map(|(index, content)| {
            std::str::from_utf8(content)
                .map(|text| Value::String(text.to_owned()))
                .map_err(|_| CodecError::InvalidUtf8 { index })
        })
        .collect()
}

/// Locate the contents of `element_count` length-prefixed BYTES elements
///
/// The whole buffer must be consumed.
pub fn split_bytes_elements(buffer: &[u8], element_count: usize) -> CodecResult<Vec<&[u8]>> {
    let mut elements = Vec::with_capacity(element_count.min(buffer.len() / LENGTH_PREFIX));
    let mut offset = 0;

    for _ in 0..element_count {
        let prefix_end = offset + LENGTH_PREFIX;
        let prefix = buffer.get(offset..prefix_end).ok_or(CodecError::SizeMismatch {
            expected: prefix_end,
            actual: buffer.len(),
        })?;

        let mut raw_len = [0u8; LENGTH_PREFIX];
        raw_len.copy_from_slice(prefix);
        let len = u32::from_le_bytes(raw_len) as usize;

        let content_end = prefix_end + len;
        let content = buffer.get(prefix_end..content_end).ok_or(CodecError::SizeMismatch {
            expected: content_end,
            actual: buffer.len(),
        })?;

        elements.push(content);
        offset = content_end;
    }

    if offset != buffer.len() {
        return Err(CodecError::SizeMismatch {
            expected: offset,
            actual: buffer.len(),
        });
    }

    Ok(elements)
}

fn float_value(v: f64, datatype: Datatype) -> CodecResult<Value> {
    Number::from_f64(v)
        .map(Value::Number)
        .ok_or_else(|| CodecError::malformed(datatype.as_str(), format!("{} has no structured-text form", v)))
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn wrong_kind(datatype: Datatype, expected: &str, got: &Value) -> CodecError {
    CodecError::malformed(
        datatype.as_str(),
        format!("expected {}, got {}", expected, kind(got)),
    )
}

fn unsigned(value: &Value, datatype: Datatype) -> CodecResult<u64> {
    match value {
        Value::Number(n) => match n.as_u64() {
            Some(v) => Ok(v),
            None if n.is_i64() || is_integral(n) => Err(CodecError::out_of_range(datatype.as_str(), n)),
            None => Err(CodecError::malformed(
                datatype.as_str(),
                format!("expected an integer, got {}", n),
            )),
        },
        other => Err(wrong_kind(datatype, "an integer", other)),
    }
}

fn signed(value: &Value, datatype: Datatype) -> CodecResult<i64> {
    match value {
        Value::Number(n) => match n.as_i64() {
            Some(v) => Ok(v),
            None if n.is_u64() || is_integral(n) => Err(CodecError::out_of_range(datatype.as_str(), n)),
            None => Err(CodecError::malformed(
                datatype.as_str(),
                format!("expected an integer, got {}", n),
            )),
        },
        other => Err(wrong_kind(datatype, "an integer", other)),
    }
}

/// Integer literals beyond 64 bits are parsed as floats
fn is_integral(n: &Number) -> bool {
    n.as_f64().map_or(false, |f| f.fract() == 0.0)
}

fn float(value: &Value, datatype: Datatype) -> CodecResult<f64> {
    match value {
        Value::Number(n) => n
            .as_f64()
            .ok_or_else(|| CodecError::malformed(datatype.as_str(), format!("{} is not a number", n))),
        other => Err(wrong_kind(datatype, "a number", other)),
    }
}

fn narrow<T, V>(v: V, datatype: Datatype) -> CodecResult<T>
where
    T: NumCast,
    V: ToPrimitive + Display + Copy,
{
    <T as NumCast>::from(v).ok_or_else(|| CodecError::out_of_range(datatype.as_str(), v))
}
