use std::fmt::{Display, Formatter};

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::constants::{ADDED_BY_ADD, ADDED_BY_INIT};
use crate::input::InputEntry;

/// A module, as found in an index, a `provides` map or the `build` list.
///
/// Field order is the canonical key order of `cfbs.json`. Keys this version
/// does not know about are kept in `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Module {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repo: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subdirectory: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dependencies: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub added_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub steps: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<Vec<InputEntry>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Module {
    pub fn is_local(&self) -> bool {
        is_local_module(&self.name)
    }

    pub fn dependencies(&self) -> &[String] {
        self.dependencies.as_deref().unwrap_or_default()
    }

    pub fn steps(&self) -> &[String] {
        self.steps.as_deref().unwrap_or_default()
    }

    pub fn tags(&self) -> &[String] {
        self.tags.as_deref().unwrap_or_default()
    }

    /// The remote location: `url` for modules added by URL, else `repo`.
    pub fn source_url(&self) -> Option<&str> {
        self.url.as_deref().or(self.repo.as_deref())
    }

    /// Looks up a key by its `cfbs.json` name, for generic listings.
    pub fn key_as_string(&self, key: &str) -> Option<String> {
        match key {
            "name" => Some(self.name.clone()),
            "description" => self.description.clone(),
            "repo" => self.repo.clone(),
            "url" => self.url.clone(),
            "by" => self.by.clone(),
            "version" => self.version.clone(),
            "commit" => self.commit.clone(),
            "subdirectory" => self.subdirectory.clone(),
            "added_by" => self.added_by.clone(),
            "alias" => self.alias.clone(),
            other => self.extra.get(other).map(|v| match v {
                Value::String(s) => s.clone(),
                v => v.to_string(),
            }),
        }
    }
}

/// A module name with an optional version, as typed on the command line.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ModuleRef {
    pub name: String,
    pub version: Option<String>,
}

impl ModuleRef {
    pub fn parse(text: &str) -> Self {
        match text.split_once('@') {
            Some((name, version)) if !is_local_module(text) => Self {
                name: name.to_string(),
                version: Some(version.to_string()),
            },
            _ => Self {
                name: text.to_string(),
                version: None,
            },
        }
    }
}

impl Display for ModuleRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match &self.version {
            Some(version) => write!(f, "{}@{}", self.name, version),
            None => write!(f, "{}", self.name),
        }
    }
}

/// Modules added by a person, as opposed to pulled in as dependencies.
pub fn is_module_added_manually(added_by: &str) -> bool {
    added_by == ADDED_BY_ADD || added_by == ADDED_BY_INIT
}

pub fn is_local_module(name: &str) -> bool {
    name.starts_with("./")
}

fn is_number(part: &str) -> bool {
    !part.is_empty() && part.bytes().all(|b| b.is_ascii_digit())
}

/// Whether `text` is a module version like `1.2.3` or `3.21.0-2`.
pub fn is_valid_version(text: &str) -> bool {
    let release = match text.split_once('-') {
        Some((release, build)) if is_number(build) => release,
        Some(_) => return false,
        None => text,
    };
    let parts: Vec<&str> = release.split('.').collect();
    parts.len() == 3 && parts.iter().all(|p| is_number(p))
}

/// Splits a version on `.` and `-` into numbers, for ordering.
pub fn parse_version(text: &str) -> Result<Vec<u64>> {
    text.split(['.', '-'])
        .map(|part| match part.parse::<u64>() {
            Ok(n) => Ok(n),
            Err(_) => bail!("invalid version '{text}'"),
        })
        .collect()
}

/// True for full SHA-1 or SHA-256 hex digests.
pub fn is_commit_hash(text: &str) -> bool {
    (text.len() == 40 || text.len() == 64)
        && text.chars().all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c))
}
