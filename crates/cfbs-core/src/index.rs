use std::cell::OnceCell;
use std::collections::HashMap;

use anyhow::Result;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::error::CfbsError;
use crate::http::get_or_read_json;
use crate::module::{Module, ModuleRef};
use crate::settings::Settings;

/// The `index` key of `cfbs.json`: a location or an inline module map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum IndexSpec {
    Location(String),
    Inline(IndexMap<String, Module>),
}

/// Commit and archive details of one released module version.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct VersionEntry {
    pub commit: String,
    #[serde(default)]
    pub archive_url: Option<String>,
    #[serde(default)]
    pub archive_sha256: Option<String>,
    #[serde(default)]
    pub subdirectory: Option<String>,
}

/// `versions.json`: module name to version to release details.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct VersionIndex {
    #[serde(default)]
    pub versions: HashMap<String, HashMap<String, VersionEntry>>,
}

impl VersionIndex {
    pub fn get(&self, name: &str, version: &str) -> Option<&VersionEntry> {
        self.versions.get(name)?.get(version)
    }
}

#[derive(Debug, Deserialize)]
struct IndexFile {
    #[serde(default)]
    index: IndexMap<String, Module>,
}

#[derive(Debug)]
enum IndexSource {
    Location(String),
    Inline(IndexMap<String, Module>),
}

/// A catalogue of modules by name, loaded on first use.
#[derive(Debug)]
pub struct Index {
    source: IndexSource,
    versions_url: String,
    modules: OnceCell<IndexMap<String, Module>>,
    versions: OnceCell<VersionIndex>,
}

impl Index {
    /// Creates an index from the project's `index` key, or the default index.
    pub fn new(spec: Option<&IndexSpec>, settings: &Settings) -> Self {
        let source = match spec {
            Some(IndexSpec::Location(location)) => IndexSource::Location(location.clone()),
            Some(IndexSpec::Inline(modules)) => IndexSource::Inline(modules.clone()),
            None => IndexSource::Location(settings.index_url.clone()),
        };
        Self {
            source,
            versions_url: settings.versions_url.clone(),
            modules: OnceCell::new(),
            versions: OnceCell::new(),
        }
    }

    /// An index with fixed contents, used for inline indices and tests.
    pub fn from_modules(modules: IndexMap<String, Module>, versions: VersionIndex) -> Self {
        let index = Self {
            source: IndexSource::Inline(modules),
            versions_url: String::new(),
            modules: OnceCell::new(),
            versions: OnceCell::new(),
        };
        let _ = index.versions.set(versions);
        index
    }

    /// Human readable description of where the index comes from.
    pub fn describe(&self) -> String {
        match &self.source {
            IndexSource::Location(location) => location.clone(),
            IndexSource::Inline(_) => "inline index in cfbs.json".to_string(),
        }
    }

    pub fn modules(&self) -> Result<&IndexMap<String, Module>> {
        if let Some(modules) = self.modules.get() {
            return Ok(modules);
        }
        let mut loaded = match &self.source {
            IndexSource::Inline(modules) => modules.clone(),
            IndexSource::Location(location) => {
                debug!("loading index from {location}");
                let file: IndexFile = get_or_read_json(location).map_err(|e| {
                    CfbsError::Network(format!(
                        "Downloading CFEngine Build Module Index failed ({e:#}) - check your Wi-Fi / network settings."
                    ))
                })?;
                file.index
            }
        };
        for (name, module) in loaded.iter_mut() {
            if module.name.is_empty() {
                module.name = name.clone();
            }
        }
        Ok(self.modules.get_or_init(|| loaded))
    }

    pub fn versions(&self) -> Result<&VersionIndex> {
        if let Some(versions) = self.versions.get() {
            return Ok(versions);
        }
        debug!("loading version data from {}", self.versions_url);
        let loaded: VersionIndex = get_or_read_json(&self.versions_url)?;
        Ok(self.versions.get_or_init(|| loaded))
    }

    pub fn get(&self, name: &str) -> Result<Option<&Module>> {
        Ok(self.modules()?.get(name))
    }

    pub fn contains(&self, name: &str) -> Result<bool> {
        Ok(self.modules()?.contains_key(name))
    }

    /// Follows an alias to the real module name.
    pub fn resolve_alias<'a>(&'a self, name: &'a str) -> Result<&'a str> {
        match self.get(name)?.and_then(|m| m.alias.as_deref()) {
            Some(target) => Ok(target),
            None => Ok(name),
        }
    }

    pub fn translate_alias(&self, module: &mut ModuleRef) -> Result<()> {
        let target = self.resolve_alias(&module.name)?.to_string();
        if target != module.name {
            debug!("module '{}' is an alias of '{}'", module.name, target);
            module.name = target;
        }
        Ok(())
    }

    /// Whether the module (and the requested version, if any) is known.
    pub fn exists(&self, module: &ModuleRef) -> Result<bool> {
        let name = self.resolve_alias(&module.name)?;
        if !self.contains(name)? {
            return Ok(false);
        }
        match &module.version {
            Some(version) => Ok(self.versions()?.get(name, version).is_some()),
            None => Ok(true),
        }
    }

    /// Builds the module object to place in `build` for `module`.
    #[instrument(skip(self))]
    pub fn get_module_object(
        &self,
        module: &ModuleRef,
        added_by: Option<&str>,
    ) -> Result<Option<Module>> {
        let name = self.resolve_alias(&module.name)?.to_string();
        let Some(data) = self.get(&name)? else {
            return Ok(None);
        };

        let mut object = data.clone();
        object.name = name.clone();
        object.alias = None;

        if let Some(version) = &module.version {
            let entry = self.versions()?.get(&name, version).ok_or_else(|| {
                CfbsError::user(format!(
                    "Module '{name}' does not have version '{version}' in the index"
                ))
            })?;
            object.version = Some(version.clone());
            object.commit = Some(entry.commit.clone());
            if entry.subdirectory.is_some() {
                object.subdirectory = entry.subdirectory.clone();
            }
        }
        if let Some(added_by) = added_by {
            object.added_by = Some(added_by.to_string());
        }
        Ok(Some(object))
    }
}
