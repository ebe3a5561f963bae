//! Deterministic, diff friendly JSON formatting for cfbs files.
//!
//! Short collections stay on one line, larger ones are expanded with two
//! space indentation. The top level collection is always expanded.

use std::path::Path;

use anyhow::Result;
use serde_json::{Map, Value};

use crate::constants::{MODULE_KEYS, TOP_LEVEL_KEYS};
use crate::error::CfbsError;

const MAX_WIDTH: usize = 80;

/// Renders `value` in the cfbs JSON style, without a trailing newline.
pub fn pretty(value: &Value) -> String {
    encode(value, "", 0)
}

/// Renders `value` after reordering keys into the canonical cfbs order.
pub fn pretty_sorted(value: &Value) -> String {
    pretty(&sort_cfbs_keys(value))
}

/// Reorders top level keys and the keys of every module object.
///
/// Unknown keys are kept, after the known ones, in their original order.
pub fn sort_cfbs_keys(value: &Value) -> Value {
    let Value::Object(top) = value else {
        return value.clone();
    };
    let mut sorted = sort_object(top, TOP_LEVEL_KEYS);

    for key in ["index", "provides"] {
        if let Some(Value::Object(modules)) = sorted.get_mut(key) {
            for module in modules.values_mut() {
                if let Value::Object(obj) = module {
                    *obj = sort_object(obj, MODULE_KEYS);
                }
            }
        }
    }
    if let Some(Value::Array(build)) = sorted.get_mut("build") {
        for module in build.iter_mut() {
            if let Value::Object(obj) = module {
                *obj = sort_object(obj, MODULE_KEYS);
            }
        }
    }

    Value::Object(sorted)
}

fn sort_object(map: &Map<String, Value>, order: &[&str]) -> Map<String, Value> {
    let mut entries: Vec<(&String, &Value)> = map.iter().collect();
    entries.sort_by_key(|(key, _)| {
        order
            .iter()
            .position(|known| known == key)
            .unwrap_or(order.len())
    });
    entries
        .into_iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

/// Reformats a JSON file in place. Returns true if the file changed.
pub fn pretty_file(path: &Path, sort: bool) -> Result<bool> {
    let (original, formatted) = format_file(path, sort)?;
    if original == formatted {
        return Ok(false);
    }
    std::fs::write(path, formatted)?;
    Ok(true)
}

/// Returns true if the file is already formatted.
pub fn pretty_check_file(path: &Path, sort: bool) -> Result<bool> {
    let (original, formatted) = format_file(path, sort)?;
    Ok(original == formatted)
}

fn format_file(path: &Path, sort: bool) -> Result<(String, String)> {
    let original = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(CfbsError::user(format!("File '{}' not found", path.display())).into());
        }
        Err(e) => return Err(e.into()),
    };
    let value: Value = serde_json::from_str(&original).map_err(|e| {
        CfbsError::user(format!("Error reading json file '{}': {e}", path.display()))
    })?;
    let formatted = if sort {
        pretty_sorted(&value)
    } else {
        pretty(&value)
    };
    Ok((original, formatted + "\n"))
}

fn encode(value: &Value, indent: &str, cursor: usize) -> String {
    match value {
        Value::Array(items) => encode_list(items, indent, cursor),
        Value::Object(map) => encode_object(map, indent, cursor),
        scalar => scalar.to_string(),
    }
}

/// A collection is expanded when at least two children are themselves
/// non-trivial collections.
fn should_wrap<'a>(children: impl Iterator<Item = &'a Value>, indent: &str) -> bool {
    if indent.is_empty() {
        return true;
    }
    let nested = children
        .filter(|child| match child {
            Value::Array(items) => items.len() >= 2,
            Value::Object(map) => map.len() >= 2,
            _ => false,
        })
        .count();
    nested >= 2
}

fn fits(indent: &str, cursor: usize, line: &str) -> bool {
    indent.len() + cursor + line.chars().count() <= MAX_WIDTH
}

fn encode_list(items: &[Value], indent: &str, cursor: usize) -> String {
    if items.is_empty() {
        return "[]".to_string();
    }
    if !should_wrap(items.iter(), indent) {
        let line = single_line(&Value::Array(items.to_vec()));
        if fits(indent, cursor, &line) {
            return line;
        }
    }

    let inner = format!("{indent}  ");
    let body = items
        .iter()
        .map(|item| format!("{inner}{}", encode(item, &inner, 0)))
        .collect::<Vec<_>>()
        .join(",\n");
    format!("[\n{body}\n{indent}]")
}

fn encode_object(map: &Map<String, Value>, indent: &str, cursor: usize) -> String {
    if map.is_empty() {
        return "{}".to_string();
    }
    if !should_wrap(map.values(), indent) {
        let compact = single_line(&Value::Object(map.clone()));
        let line = format!("{{ {} }}", &compact[1..compact.len() - 1]);
        if fits(indent, cursor, &line) {
            return line;
        }
    }

    let inner = format!("{indent}  ");
    let body = map
        .iter()
        .map(|(key, value)| {
            let prefix = format!("{}: ", Value::String(key.clone()));
            let encoded = encode(value, &inner, prefix.chars().count());
            format!("{inner}{prefix}{encoded}")
        })
        .collect::<Vec<_>>()
        .join(",\n");
    format!("{{\n{body}\n{indent}}}")
}

fn single_line(value: &Value) -> String {
    match value {
        Value::Array(items) => {
            let parts = items.iter().map(single_line).collect::<Vec<_>>();
            format!("[{}]", parts.join(", "))
        }
        Value::Object(map) => {
            let parts = map
                .iter()
                .map(|(k, v)| format!("{}: {}", Value::String(k.clone()), single_line(v)))
                .collect::<Vec<_>>();
            format!("{{{}}}", parts.join(", "))
        }
        scalar => scalar.to_string(),
    }
}
