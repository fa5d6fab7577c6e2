//! Recursive key-convention transforms between the wire format (snake_case)
//! and the application convention (camelCase).
//!
//! Both directions are total over JSON trees: objects get every key
//! converted and every value recursed, arrays are mapped element-wise in
//! order, and every other node passes through untouched. The pass-through
//! check runs at every level of the recursion, so opaque leaves buried in a
//! larger tree are never rewritten.

use serde_json::{Map, Value};

use crate::error::{Error, Result};

/// Convert every object key in `value` to snake_case (application → wire).
pub fn to_snake(value: Value) -> Result<Value> {
    transform(value, camel_to_snake)
}

/// Convert every object key in `value` to camelCase (wire → application).
pub fn to_camel(value: Value) -> Result<Value> {
    transform(value, snake_to_camel)
}

fn transform(value: Value, convert: fn(&str) -> String) -> Result<Value> {
    match value {
        Value::Object(map) => {
            let mut out = Map::with_capacity(map.len());
            for (key, inner) in map {
                let converted = convert(&key);
                if out.contains_key(&converted) {
                    // two source keys collapsing into one would silently
                    // drop a field
                    return Err(Error::Transform(format!(
                        "key collision: {:?} and an earlier key both convert to {:?}",
                        key, converted
                    )));
                }
                out.insert(converted, transform(inner, convert)?);
            }
            Ok(Value::Object(out))
        }
        Value::Array(items) => items
            .into_iter()
            .map(|item| transform(item, convert))
            .collect::<Result<Vec<_>>>()
            .map(Value::Array),
        other => Ok(other),
    }
}

/// `firstName` → `first_name`. Keys without uppercase letters are unchanged.
fn camel_to_snake(key: &str) -> String {
    let mut out = String::with_capacity(key.len() + 4);
    for ch in key.chars() {
        if ch.is_ascii_uppercase() {
            out.push('_');
            out.push(ch.to_ascii_lowercase());
        } else {
            out.push(ch);
        }
    }
    out
}

/// `first_name` → `firstName`. Only an underscore followed by a lowercase
/// ASCII letter collapses; any other underscore is kept as-is.
fn snake_to_camel(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    let mut chars = key.chars().peekable();
    while let Some(ch) = chars.next() {
        if ch == '_' {
            match chars.peek() {
                Some(next) if next.is_ascii_lowercase() => {
                    out.push(next.to_ascii_uppercase());
                    chars.next();
                }
                _ => out.push(ch),
            }
        } else {
            out.push(ch);
        }
    }
    out
}
