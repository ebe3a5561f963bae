//! Module input: questions a module asks at `cfbs input` time and the
//! `def.json` variables the answers turn into.

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// Namespace used when an input definition does not name one.
pub const DEFAULT_NAMESPACE: &str = "cfbs";

/// One input definition, optionally carrying the user's `response`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputEntry {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variable: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bundle: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub question: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtype: Option<InputSubtype>,
    #[serde(rename = "while", default, skip_serializing_if = "Option::is_none")]
    pub while_question: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Element type of a `list` input: plain strings or records of fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum InputSubtype {
    Record(Vec<InputField>),
    Single(InputField),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputField {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub question: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

/// Source of answers for input questions.
pub trait Answerer {
    /// Asks a free text question.
    fn ask(&mut self, question: &str, default: Option<&str>) -> Result<String>;
    /// Asks a yes/no question.
    fn confirm(&mut self, question: &str, default: bool) -> Result<bool>;
}

/// Fills in `response` for every entry by asking `answerer`.
pub fn ask_for_input(entries: &mut [InputEntry], answerer: &mut dyn Answerer) -> Result<()> {
    for entry in entries.iter_mut() {
        let response = match entry.kind.as_str() {
            "string" => Value::String(ask_string(
                entry_question(entry)?,
                entry.default.as_ref(),
                answerer,
            )?),
            "list" => ask_list(entry, answerer)?,
            other => bail!("Unsupported input type '{other}'"),
        };
        entry.response = Some(response);
    }
    Ok(())
}

fn entry_question(entry: &InputEntry) -> Result<&str> {
    entry
        .question
        .as_deref()
        .or(entry.label.as_deref())
        .or(entry.variable.as_deref())
        .ok_or_else(|| anyhow::anyhow!("input definition has no question, label or variable"))
}

fn ask_string(question: &str, default: Option<&Value>, answerer: &mut dyn Answerer) -> Result<String> {
    let default = default.and_then(Value::as_str);
    answerer.ask(question, default)
}

fn ask_field(field: &InputField, answerer: &mut dyn Answerer) -> Result<String> {
    if field.kind != "string" {
        bail!("Unsupported input type '{}'", field.kind);
    }
    let question = field
        .question
        .as_deref()
        .or(field.label.as_deref())
        .or(field.key.as_deref())
        .unwrap_or("Value");
    ask_string(question, field.default.as_ref(), answerer)
}

fn ask_list(entry: &InputEntry, answerer: &mut dyn Answerer) -> Result<Value> {
    let Some(subtype) = &entry.subtype else {
        bail!(
            "list input '{}' is missing its subtype",
            entry.variable.as_deref().unwrap_or("?")
        );
    };
    let again = entry
        .while_question
        .as_deref()
        .unwrap_or("Do you want to add another element?");

    let mut items = Vec::new();
    loop {
        let item = match subtype {
            InputSubtype::Single(field) => Value::String(ask_field(field, answerer)?),
            InputSubtype::Record(fields) => {
                let mut record = Map::new();
                for field in fields {
                    let key = field.key.clone().unwrap_or_else(|| field.kind.clone());
                    record.insert(key, Value::String(ask_field(field, answerer)?));
                }
                Value::Object(record)
            }
        };
        items.push(item);
        if !answerer.confirm(again, false)? {
            break;
        }
    }
    Ok(Value::Array(items))
}

/// Converts answered entries into a `def.json` augment.
pub fn augment_from_input(entries: &[InputEntry]) -> Result<Map<String, Value>> {
    let mut variables = Map::new();
    for entry in entries {
        let Some(response) = &entry.response else {
            continue;
        };
        let (Some(variable), Some(bundle)) = (&entry.variable, &entry.bundle) else {
            bail!("answered input is missing 'variable' or 'bundle'");
        };
        let namespace = entry.namespace.as_deref().unwrap_or(DEFAULT_NAMESPACE);
        let comment = entry.comment.as_deref().unwrap_or("Added by 'cfbs input'");
        variables.insert(
            format!("{namespace}:{bundle}.{variable}"),
            json!({ "value": response, "comment": comment }),
        );
    }

    let mut augment = Map::new();
    augment.insert("variables".to_string(), Value::Object(variables));
    Ok(augment)
}

/// Whether `data` answers exactly the questions in `spec`.
pub fn same_shape(spec: &[InputEntry], data: &[InputEntry]) -> bool {
    spec.len() == data.len()
        && spec.iter().zip(data).all(|(a, b)| {
            let mut a = a.clone();
            let mut b = b.clone();
            a.response = None;
            b.response = None;
            a == b
        })
}

/// Copies answers from `old` onto matching definitions in `new`.
///
/// Entries match on `variable` and `type`. Returns the number carried over.
pub fn carry_over_responses(old: &[InputEntry], new: &mut [InputEntry]) -> usize {
    let mut carried = 0;
    for entry in new.iter_mut() {
        let previous = old.iter().find(|o| {
            o.variable.is_some() && o.variable == entry.variable && o.kind == entry.kind
        });
        if let Some(response) = previous.and_then(|o| o.response.clone()) {
            entry.response = Some(response);
            carried += 1;
        }
    }
    carried
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    struct Scripted {
        answers: VecDeque<String>,
        confirms: VecDeque<bool>,
    }

    impl Answerer for Scripted {
        fn ask(&mut self, _question: &str, default: Option<&str>) -> Result<String> {
            Ok(self
                .answers
                .pop_front()
                .or_else(|| default.map(str::to_string))
                .unwrap_or_default())
        }

        fn confirm(&mut self, _question: &str, default: bool) -> Result<bool> {
            Ok(self.confirms.pop_front().unwrap_or(default))
        }
    }

    fn entries(value: Value) -> Vec<InputEntry> {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn asks_strings_and_records() {
        let mut spec = entries(json!([
            {"type": "string", "variable": "motd", "bundle": "motd", "question": "Message?"},
            {
                "type": "list", "variable": "files", "namespace": "delete_files",
                "bundle": "delete_files",
                "subtype": [
                    {"key": "path", "type": "string", "question": "Path"},
                    {"key": "why", "type": "string", "question": "Why", "default": "Unknown"}
                ],
                "while": "More?"
            }
        ]));
        let mut answerer = Scripted {
            answers: VecDeque::from(vec![
                "hello".to_string(),
                "/tmp/a".to_string(),
                "old".to_string(),
                "/tmp/b".to_string(),
            ]),
            confirms: VecDeque::from(vec![true, false]),
        };

        ask_for_input(&mut spec, &mut answerer).unwrap();
        assert_eq!(spec[0].response, Some(json!("hello")));
        assert_eq!(
            spec[1].response,
            Some(json!([
                {"path": "/tmp/a", "why": "old"},
                {"path": "/tmp/b", "why": "Unknown"}
            ]))
        );

        let augment = augment_from_input(&spec).unwrap();
        assert_eq!(
            augment["variables"]["cfbs:motd.motd"],
            json!({"value": "hello", "comment": "Added by 'cfbs input'"})
        );
        assert!(augment["variables"]
            .as_object()
            .unwrap()
            .contains_key("delete_files:delete_files.files"));
    }

    #[test]
    fn shape_ignores_responses() {
        let spec = entries(json!([{"type": "string", "variable": "x", "bundle": "b"}]));
        let data = entries(json!([{"type": "string", "variable": "x", "bundle": "b", "response": "1"}]));
        assert!(same_shape(&spec, &data));

        let other = entries(json!([{"type": "string", "variable": "y", "bundle": "b", "response": "1"}]));
        assert!(!same_shape(&spec, &other));
    }

    #[test]
    fn carries_matching_responses() {
        let old = entries(json!([
            {"type": "string", "variable": "x", "response": "kept"},
            {"type": "string", "variable": "gone", "response": "dropped"}
        ]));
        let mut new = entries(json!([
            {"type": "string", "variable": "x"},
            {"type": "list", "variable": "gone", "subtype": {"type": "string"}}
        ]));
        assert_eq!(carry_over_responses(&old, &mut new), 1);
        assert_eq!(new[0].response, Some(json!("kept")));
        assert_eq!(new[1].response, None);
    }
}
