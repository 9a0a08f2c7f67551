//! JSON pointer (RFC 6901) resolution over a [`Document`].
//!
//! Pointers are parsed with the `jsonptr` types that ship with `json-patch`;
//! traversal and mutation are done here because the server's patch stream
//! expects two things plain RFC 6902 does not give us:
//!
//! - [`insert`] materializes missing intermediate objects, since the server
//!   routinely patches into branches it has not created yet
//! - the root is never replaced, added or removed; the document is always
//!   edited in place
//!
//! # Example
//!
//! ```rust
//! use garden_core::pointer;
//! use serde_json::json;
//!
//! let mut doc = json!({"garden": {}});
//! pointer::insert(&mut doc, "/garden/tileObjects/12", json!({"objectType": "plant"})).unwrap();
//! pointer::set(&mut doc, "/garden/tileObjects/12/objectType", json!("egg")).unwrap();
//!
//! assert_eq!(
//!     pointer::get(&doc, "/garden/tileObjects/12/objectType").unwrap(),
//!     &json!("egg")
//! );
//! ```

use crate::Document;
use crate::error::{PointerError, PointerResult};
use json_patch::jsonptr::{Pointer, PointerBuf};
use serde_json::{Map, Value};

/// Token that appends to an array when used as the last step of [`insert`].
pub const APPEND_TOKEN: &str = "-";

/// Split a pointer into its unescaped reference tokens.
///
/// The empty string is the root and yields no tokens.
///
/// # Errors
///
/// Returns [`PointerError::Malformed`] if the pointer does not start with `/`
/// or contains an invalid `~` escape.
pub fn parse(path: &str) -> PointerResult<Vec<String>> {
    let pointer = Pointer::parse(path).map_err(|e| PointerError::Malformed {
        path: path.to_owned(),
        reason: e.to_string(),
    })?;
    Ok(pointer
        .tokens()
        .map(|token| token.decoded().into_owned())
        .collect())
}

/// Build a pointer string from unescaped tokens, escaping `~` and `/`.
#[must_use]
pub fn join<S: AsRef<str>>(steps: &[S]) -> String {
    PointerBuf::from_tokens(steps.iter().map(AsRef::as_ref))
        .as_str()
        .to_owned()
}

/// Resolve `path` and return a reference to the value it addresses.
///
/// # Errors
///
/// Fails when a key is missing, an index is invalid or out of range, or an
/// intermediate value is a scalar.
pub fn get<'a>(doc: &'a Document, path: &str) -> PointerResult<&'a Value> {
    let steps = parse(path)?;
    let mut current = doc;
    for token in &steps {
        current = match current {
            Value::Object(map) => map
                .get(token.as_str())
                .ok_or_else(|| not_found(path, token))?,
            Value::Array(items) => {
                let index = parse_index(path, token)?;
                items
                    .get(index)
                    .ok_or_else(|| out_of_range(path, index, items.len()))?
            }
            other => return Err(not_navigable(path, token, other)),
        };
    }
    Ok(current)
}

/// Mutable counterpart of [`get`].
///
/// # Errors
///
/// Same as [`get`].
pub fn get_mut<'a>(doc: &'a mut Document, path: &str) -> PointerResult<&'a mut Value> {
    let steps = parse(path)?;
    descend_mut(doc, &steps, path, false)
}

/// Overwrite the value at `path`.
///
/// The parent must already exist. On an object the key is written whether or
/// not it was present, keeping its position if it was; on an array the index
/// must be in range.
///
/// # Errors
///
/// [`PointerError::RootMutation`] for the empty pointer, otherwise any
/// navigation error raised while reaching the parent.
pub fn set(doc: &mut Document, path: &str, value: Value) -> PointerResult<()> {
    let steps = parse(path)?;
    let (last, parents) = steps
        .split_last()
        .ok_or(PointerError::RootMutation { op: "set" })?;

    match descend_mut(doc, parents, path, false)? {
        Value::Object(map) => {
            map.insert(last.clone(), value);
            Ok(())
        }
        Value::Array(items) => {
            let index = parse_index(path, last)?;
            let len = items.len();
            let slot = items
                .get_mut(index)
                .ok_or_else(|| out_of_range(path, index, len))?;
            *slot = value;
            Ok(())
        }
        other => Err(not_navigable(path, last, other)),
    }
}

/// Add a value at `path`, creating missing intermediate objects.
///
/// Missing object keys along the way become empty objects; array steps are
/// never created. On an array parent the value is inserted before `index`
/// (which may equal the length), or appended when the last token is `-`.
///
/// # Errors
///
/// [`PointerError::RootMutation`] for the empty pointer, an index error for
/// an array position past the end, or a navigation error on a scalar.
pub fn insert(doc: &mut Document, path: &str, value: Value) -> PointerResult<()> {
    let steps = parse(path)?;
    let (last, parents) = steps
        .split_last()
        .ok_or(PointerError::RootMutation { op: "insert" })?;

    match descend_mut(doc, parents, path, true)? {
        Value::Object(map) => {
            map.insert(last.clone(), value);
            Ok(())
        }
        Value::Array(items) if last == APPEND_TOKEN => {
            items.push(value);
            Ok(())
        }
        Value::Array(items) => {
            let index = parse_index(path, last)?;
            if index > items.len() {
                return Err(out_of_range(path, index, items.len()));
            }
            items.insert(index, value);
            Ok(())
        }
        other => Err(not_navigable(path, last, other)),
    }
}

/// Remove and return the value at `path`.
///
/// Object siblings keep their relative order.
///
/// # Errors
///
/// [`PointerError::RootMutation`] for the empty pointer, otherwise a missing
/// key, bad index or navigation error.
pub fn remove(doc: &mut Document, path: &str) -> PointerResult<Value> {
    let steps = parse(path)?;
    let (last, parents) = steps
        .split_last()
        .ok_or(PointerError::RootMutation { op: "remove" })?;

    match descend_mut(doc, parents, path, false)? {
        Value::Object(map) => map
            .shift_remove(last.as_str())
            .ok_or_else(|| not_found(path, last)),
        Value::Array(items) => {
            let index = parse_index(path, last)?;
            if index >= items.len() {
                return Err(out_of_range(path, index, items.len()));
            }
            Ok(items.remove(index))
        }
        other => Err(not_navigable(path, last, other)),
    }
}

fn descend_mut<'a>(
    doc: &'a mut Value,
    steps: &[String],
    path: &str,
    create_missing: bool,
) -> PointerResult<&'a mut Value> {
    let mut current = doc;
    for token in steps {
        current = match current {
            Value::Object(map) => {
                if create_missing {
                    map.entry(token.clone())
                        .or_insert_with(|| Value::Object(Map::new()))
                } else {
                    map.get_mut(token.as_str())
                        .ok_or_else(|| not_found(path, token))?
                }
            }
            Value::Array(items) => {
                let index = parse_index(path, token)?;
                let len = items.len();
                items
                    .get_mut(index)
                    .ok_or_else(|| out_of_range(path, index, len))?
            }
            other => return Err(not_navigable(path, token, other)),
        };
    }
    Ok(current)
}

fn parse_index(path: &str, token: &str) -> PointerResult<usize> {
    let invalid = || PointerError::InvalidIndex {
        path: path.to_owned(),
        token: token.to_owned(),
    };
    if token.is_empty() || !token.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }
    token.parse().map_err(|_| invalid())
}

fn not_found(path: &str, key: &str) -> PointerError {
    PointerError::NotFound {
        path: path.to_owned(),
        key: key.to_owned(),
    }
}

fn out_of_range(path: &str, index: usize, len: usize) -> PointerError {
    PointerError::IndexOutOfRange {
        path: path.to_owned(),
        index,
        len,
    }
}

fn not_navigable(path: &str, token: &str, found: &Value) -> PointerError {
    PointerError::NotNavigable {
        path: path.to_owned(),
        token: token.to_owned(),
        found: value_kind(found),
    }
}

pub(crate) fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
