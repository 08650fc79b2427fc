//! Canonical JSON rendering for request identity keys.
//!
//! Two fetch states that mean the same query must produce byte-identical
//! keys. Canonical output has:
//! - Object keys sorted lexicographically (UTF-8 byte order)
//! - No whitespace
//! - Integers only (floats rejected; callers stringify decimal values first)

use serde::Serialize;
use serde_json::{Map, Number, Value};

use crate::error::{Error, Result};

/// Serializes `value` into a canonical JSON string.
///
/// # Errors
///
/// Returns [`Error::InvalidInput`] if the value cannot be represented as JSON
/// or contains a floating point number.
#[must_use = "the canonical key should be compared or stored"]
pub fn to_canonical_string<T: Serialize>(value: &T) -> Result<String> {
    let v = serde_json::to_value(value)
        .map_err(|e| Error::InvalidInput(format!("not representable as JSON: {e}")))?;
    let mut out = String::new();
    write_value(&v, &mut out)?;
    Ok(out)
}

fn write_value(v: &Value, out: &mut String) -> Result<()> {
    match v {
        Value::Null => out.push_str("null"),
        Value::Bool(true) => out.push_str("true"),
        Value::Bool(false) => out.push_str("false"),
        Value::Number(n) => write_number(n, out)?,
        Value::String(s) => write_string(s, out),
        Value::Array(arr) => {
            out.push('[');
            for (i, item) in arr.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_value(item, out)?;
            }
            out.push(']');
        }
        Value::Object(map) => write_object(map, out)?,
    }
    Ok(())
}

fn write_object(map: &Map<String, Value>, out: &mut String) -> Result<()> {
    out.push('{');

    let mut entries: Vec<(&String, &Value)> = map.iter().collect();
    entries.sort_by(|a, b| a.0.as_bytes().cmp(b.0.as_bytes()));

    for (i, (k, val)) in entries.into_iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        write_string(k, out);
        out.push(':');
        write_value(val, out)?;
    }

    out.push('}');
    Ok(())
}

fn write_number(n: &Number, out: &mut String) -> Result<()> {
    if let Some(i) = n.as_i64() {
        out.push_str(&i.to_string());
        return Ok(());
    }
    if let Some(u) = n.as_u64() {
        out.push_str(&u.to_string());
        return Ok(());
    }
    Err(Error::InvalidInput(format!(
        "float values are not allowed in canonical JSON: {n}"
    )))
}

fn write_string(s: &str, out: &mut String) {
    // serde_json never fails to encode a str
    out.push_str(&Value::String(s.to_string()).to_string());
}
