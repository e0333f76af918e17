//! Field-level JSON Patch steps applied inside an overlaid record.

use super::Operator;
use crate::error::PatchError;
use serde_json::Value;

/// Apply one add/replace/remove at `path` (non-empty) below `root`.
pub(crate) fn apply(
    root: &mut Value,
    path: &[String],
    operator: Operator,
    value: Option<&Value>,
    pointer: &str,
) -> Result<(), PatchError> {
    let (last, parents) = path
        .split_last()
        .ok_or_else(|| PatchError::pointer(pointer, "empty field path"))?;

    let mut node = root;
    for token in parents {
        node = match node {
            Value::Object(map) => map
                .get_mut(token)
                .ok_or_else(|| PatchError::pointer(pointer, format!("no member {token:?}")))?,
            Value::Array(items) => {
                let index = parse_index(token, items.len(), pointer)?;
                items
                    .get_mut(index)
                    .ok_or_else(|| PatchError::pointer(pointer, "array index out of range"))?
            }
            _ => return Err(PatchError::pointer(pointer, "path descends into a scalar")),
        };
    }

    match node {
        Value::Object(map) => match operator {
            Operator::Add => {
                map.insert(last.clone(), required(value, pointer)?);
            }
            Operator::Replace => {
                let slot = map
                    .get_mut(last)
                    .ok_or_else(|| PatchError::pointer(pointer, "replace of missing member"))?;
                *slot = required(value, pointer)?;
            }
            Operator::Remove => {
                map.remove(last)
                    .ok_or_else(|| PatchError::pointer(pointer, "remove of missing member"))?;
            }
        },
        Value::Array(items) => match operator {
            Operator::Add => {
                let value = required(value, pointer)?;
                if last == "-" {
                    items.push(value);
                } else {
                    let index = parse_index(last, items.len() + 1, pointer)?;
                    items.insert(index, value);
                }
            }
            Operator::Replace => {
                let index = parse_index(last, items.len(), pointer)?;
                items[index] = required(value, pointer)?;
            }
            Operator::Remove => {
                let index = parse_index(last, items.len(), pointer)?;
                items.remove(index);
            }
        },
        _ => return Err(PatchError::pointer(pointer, "parent is not a container")),
    }
    Ok(())
}

fn required(value: Option<&Value>, pointer: &str) -> Result<Value, PatchError> {
    value
        .cloned()
        .ok_or_else(|| PatchError::pointer(pointer, "missing value"))
}

/// Parse an array index token; `bound` is exclusive.
fn parse_index(token: &str, bound: usize, pointer: &str) -> Result<usize, PatchError> {
    let valid = !token.is_empty()
        && token.bytes().all(|b| b.is_ascii_digit())
        && (token == "0" || !token.starts_with('0'));
    if !valid {
        return Err(PatchError::pointer(pointer, format!("invalid array index {token:?}")));
    }
    match token.parse::<usize>() {
        Ok(index) if index < bound => Ok(index),
        _ => Err(PatchError::pointer(pointer, "array index out of range")),
    }
}
