use std::path::Path;

use anyhow::{Context, Result};
use serde_json::{Map, Value};

use crate::error::CfbsError;
use crate::pretty::pretty;

/// Reads a JSON file, returning `None` if it does not exist.
pub fn read_json(path: &Path) -> Result<Option<Value>> {
    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(e).with_context(|| format!("failed to read '{}'", path.display()));
        }
    };
    let value = serde_json::from_str(&text).map_err(|e| {
        CfbsError::user(format!("Error reading json file '{}': {e}", path.display()))
    })?;
    Ok(Some(value))
}

/// Writes `value` in the cfbs style, creating parent directories.
pub fn write_json(path: &Path, value: &Value) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create directory '{}'", parent.display()))?;
        }
    }
    std::fs::write(path, pretty(value) + "\n")
        .with_context(|| format!("failed to write '{}'", path.display()))
}

/// Why [`merge_json`] replaced an existing value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Overwrite {
    TypeMismatch,
    Primitive,
}

/// Deep merges `b` into a copy of `a`.
///
/// Objects merge recursively and lists are concatenated. Any other collision
/// replaces the value from `a` and is reported through `on_overwrite` with the
/// key and the path of parent keys.
pub fn merge_json(
    a: &Map<String, Value>,
    b: &Map<String, Value>,
    on_overwrite: &mut dyn FnMut(&str, &[String], Overwrite),
) -> Map<String, Value> {
    merge_at(a, b, on_overwrite, &mut Vec::new())
}

fn merge_at(
    a: &Map<String, Value>,
    b: &Map<String, Value>,
    on_overwrite: &mut dyn FnMut(&str, &[String], Overwrite),
    stack: &mut Vec<String>,
) -> Map<String, Value> {
    let mut merged = a.clone();
    for (key, new) in b {
        let Some(old) = merged.get_mut(key) else {
            merged.insert(key.clone(), new.clone());
            continue;
        };
        match (old, new) {
            (Value::Object(old_map), Value::Object(new_map)) => {
                stack.push(key.clone());
                *old_map = merge_at(old_map, new_map, on_overwrite, stack);
                stack.pop();
            }
            (Value::Array(old_list), Value::Array(new_list)) => {
                old_list.extend(new_list.iter().cloned());
            }
            (old, new) => {
                let reason = if std::mem::discriminant(old) == std::mem::discriminant(new) {
                    Overwrite::Primitive
                } else {
                    Overwrite::TypeMismatch
                };
                on_overwrite(key, stack, reason);
                *old = new.clone();
            }
        }
    }
    merged
}

/// Merges without reporting overwrites.
pub fn merge_json_quiet(a: &Map<String, Value>, b: &Map<String, Value>) -> Map<String, Value> {
    merge_json(a, b, &mut |_, _, _| {})
}
