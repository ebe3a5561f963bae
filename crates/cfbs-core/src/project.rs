use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::error::CfbsError;
use crate::index::{Index, IndexSpec};
use crate::json::read_json;
use crate::module::{is_module_added_manually, Module, ModuleRef};
use crate::pretty::pretty_sorted;
use crate::settings::Settings;
use crate::validate::validate_value;

/// The contents of a `cfbs.json` file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Project {
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<IndexSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub git: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provides: Option<IndexMap<String, Module>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build: Option<Vec<Module>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Where module lookups are allowed to search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchIn {
    pub build: bool,
    pub provides: bool,
    pub index: bool,
}

/// A module placed into `build` by [`CfbsJson::add_with_dependencies`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Added {
    pub name: String,
    pub dependency_of: Option<String>,
}

/// Outcome of adding modules: what went in and what was already present.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct AddReport {
    pub added: Vec<Added>,
    pub skipped: Vec<String>,
}

/// A project file together with its resolved index.
#[derive(Debug)]
pub struct CfbsJson {
    path: PathBuf,
    raw: Option<Value>,
    pub project: Project,
    pub index: Index,
    url: Option<String>,
    url_commit: Option<String>,
}

impl CfbsJson {
    /// Loads a project file; a missing file gives an empty project.
    ///
    /// `index_override` takes precedence over the project's own `index` key.
    pub fn load(path: &Path, index_override: Option<&str>, settings: &Settings) -> Result<Self> {
        Self::from_raw(path, read_json(path)?, index_override, settings)
    }

    /// Builds a project from JSON already read from `path`.
    ///
    /// JSON with the wrong types fails with the messages `cfbs validate`
    /// would print for it.
    pub fn from_raw(
        path: &Path,
        raw: Option<Value>,
        index_override: Option<&str>,
        settings: &Settings,
    ) -> Result<Self> {
        let project = match &raw {
            Some(value) => parse_project(path, value)?,
            None => Project::default(),
        };
        let index = match index_override {
            Some(location) => Index::new(Some(&IndexSpec::Location(location.to_string())), settings),
            None => Index::new(project.index.as_ref(), settings),
        };
        Ok(Self {
            path: path.to_path_buf(),
            raw,
            project,
            index,
            url: None,
            url_commit: None,
        })
    }

    /// Wraps an in-memory project, for remote configs and tests.
    pub fn from_project(path: &Path, project: Project, index: Index) -> Self {
        let raw = serde_json::to_value(&project).ok();
        Self {
            path: path.to_path_buf(),
            raw,
            project,
            index,
            url: None,
            url_commit: None,
        }
    }

    /// Records where a remote project was fetched from.
    pub fn with_origin(mut self, url: &str, commit: &str) -> Self {
        self.url = Some(url.to_string());
        self.url_commit = Some(commit.to_string());
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The file contents as read, for validation.
    pub fn raw(&self) -> Option<&Value> {
        self.raw.as_ref()
    }

    pub fn exists(&self) -> bool {
        self.raw.is_some()
    }

    pub fn git_enabled(&self) -> bool {
        self.project.git.unwrap_or(false)
    }

    pub fn build(&self) -> &[Module] {
        self.project.build.as_deref().unwrap_or_default()
    }

    pub fn build_mut(&mut self) -> &mut Vec<Module> {
        self.project.build.get_or_insert_with(Vec::new)
    }

    pub fn has_build_key(&self) -> bool {
        self.project.build.is_some()
    }

    /// Warns about keys this version of cfbs does not know.
    ///
    /// Unknown keys are usually typos or come from a newer cfbs; they are
    /// never fatal here.
    pub fn warn_about_unknown_keys(&self) {
        for key in self.project.extra.keys() {
            warn!(
                "The top level key \"{key}\" is not known to this version of cfbs.\n\
                 Is it a typo? If not, try upgrading cfbs"
            );
        }
        for module in self.all_module_objects() {
            for key in module.extra.keys() {
                warn!(
                    "The module level key \"{key}\" is not known to this version of cfbs.\n\
                     Is it a typo? If not, try upgrading cfbs"
                );
            }
        }
    }

    fn all_module_objects(&self) -> impl Iterator<Item = &Module> {
        let inline_index = match &self.project.index {
            Some(IndexSpec::Inline(modules)) => Some(modules.values()),
            _ => None,
        };
        let provides = self.project.provides.as_ref().map(|p| p.values());
        inline_index
            .into_iter()
            .flatten()
            .chain(provides.into_iter().flatten())
            .chain(self.build().iter())
    }

    pub fn can_reach_dependency(&self, name: &str, search_in: SearchIn) -> Result<bool> {
        Ok(self.find_module(name, search_in)?.is_some())
    }

    pub fn find_module(&self, name: &str, search_in: SearchIn) -> Result<Option<&Module>> {
        if search_in.build {
            if let Some(module) = self.get_module_from_build(name) {
                return Ok(Some(module));
            }
        }
        if search_in.provides {
            if let Some(module) = self.project.provides.as_ref().and_then(|p| p.get(name)) {
                return Ok(Some(module));
            }
        }
        if search_in.index {
            return self.index.get(name);
        }
        Ok(None)
    }

    /// All modules this project provides, ready to be placed in a build.
    pub fn get_provides(&self, added_by: &str) -> Result<IndexMap<String, Module>> {
        let Some(provides) = &self.project.provides else {
            return Err(CfbsError::exit(format!(
                "missing required key 'provides' in module definition: {}",
                self.path.display()
            ))
            .into());
        };
        provides
            .iter()
            .map(|(name, data)| {
                let module = self.construct_provided_module(name, data, added_by)?;
                Ok((name.clone(), module))
            })
            .collect()
    }

    /// Looks a module up in `provides` and then in the index.
    pub fn get_module_for_build(&self, name: &str, added_by: &str) -> Result<Option<Module>> {
        if let Some(data) = self.project.provides.as_ref().and_then(|p| p.get(name)) {
            return self.construct_provided_module(name, data, added_by).map(Some);
        }
        self.index
            .get_module_object(&ModuleRef::parse(name), Some(added_by))
    }

    fn construct_provided_module(&self, name: &str, data: &Module, added_by: &str) -> Result<Module> {
        let (Some(url), Some(commit)) = (&self.url, &self.url_commit) else {
            return Err(CfbsError::Programmer(format!(
                "provided module '{name}' requested from a project without origin"
            ))
            .into());
        };
        let definition = || serde_json::to_string(data).unwrap_or_default();
        let description = data.description.clone().ok_or_else(|| {
            CfbsError::exit(format!(
                "missing required key 'description' in module definition: {}",
                definition()
            ))
        })?;
        let steps = data.steps.clone().ok_or_else(|| {
            CfbsError::exit(format!(
                "missing required key 'steps' in module definition: {}",
                definition()
            ))
        })?;

        Ok(Module {
            name: name.to_string(),
            description: Some(description),
            url: Some(url.clone()),
            commit: Some(commit.clone()),
            subdirectory: data.subdirectory.clone().filter(|s| !s.is_empty()),
            dependencies: data.dependencies.clone().filter(|d| !d.is_empty()),
            input: data.input.clone(),
            steps: Some(steps),
            added_by: Some(added_by.to_string()),
            ..Module::default()
        })
    }

    pub fn module_is_in_build(&self, name: &str) -> bool {
        self.build().iter().any(|m| m.name == name)
    }

    pub fn get_module_from_build(&self, name: &str) -> Option<&Module> {
        self.build().iter().find(|m| m.name == name)
    }

    pub fn get_module_from_build_mut(&mut self, name: &str) -> Option<&mut Module> {
        self.build_mut().iter_mut().find(|m| m.name == name)
    }

    /// Width of the widest value of `key` among build modules.
    pub fn longest_module_key_length(&self, key: &str) -> usize {
        self.build()
            .iter()
            .filter_map(|m| m.key_as_string(key))
            .map(|v| v.chars().count())
            .max()
            .unwrap_or(0)
    }

    /// Adds `module` to the build, dependencies first.
    ///
    /// Dependencies are resolved in `remote` when given, else in this project
    /// and its index. Modules already in the build are skipped.
    pub fn add_with_dependencies(
        &mut self,
        module: Module,
        remote: Option<&CfbsJson>,
        report: &mut AddReport,
    ) -> Result<()> {
        if module.steps.is_none() {
            return Err(CfbsError::exit(format!(
                "Module '{}' is missing required key 'steps'",
                module.name
            ))
            .into());
        }
        if self.module_is_in_build(&module.name) {
            debug!("module '{}' already in build", module.name);
            report.skipped.push(module.name);
            return Ok(());
        }

        for dependency in module.dependencies().to_vec() {
            if self.module_is_in_build(&dependency) {
                continue;
            }
            let lookup = remote.unwrap_or(&*self);
            let resolved = lookup
                .get_module_for_build(&dependency, &module.name)?
                .ok_or_else(|| CfbsError::exit(format!("Module '{dependency}' not found")))?;
            self.add_with_dependencies(resolved, remote, report)?;
        }

        let dependency_of = module
            .added_by
            .clone()
            .filter(|by| !is_module_added_manually(by));
        report.added.push(Added {
            name: module.name.clone(),
            dependency_of,
        });
        self.build_mut().push(module);
        Ok(())
    }

    pub fn to_value(&self) -> Result<Value> {
        Ok(serde_json::to_value(&self.project)?)
    }

    /// Writes the project back with canonical formatting.
    pub fn save(&mut self) -> Result<()> {
        let value = self.to_value()?;
        std::fs::write(&self.path, pretty_sorted(&value) + "\n")
            .with_context(|| format!("failed to write '{}'", self.path.display()))?;
        self.raw = Some(value);
        Ok(())
    }
}

fn parse_project(path: &Path, value: &Value) -> Result<Project> {
    let e = match serde_json::from_value::<Project>(value.clone()) {
        Ok(project) => return Ok(project),
        Err(e) => e,
    };
    let problems = validate_value(value, path, true)?;
    if problems.is_empty() {
        return Err(e).with_context(|| format!("failed to parse '{}'", path.display()));
    }
    let listed: Vec<String> = problems.iter().map(|p| format!("  - {p}")).collect();
    Err(CfbsError::Validation(format!(
        "'{}' is not a valid project file:\n{}",
        path.display(),
        listed.join("\n")
    ))
    .into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::tests::fixture;
    use serde_json::json;

    fn project(value: Value) -> Project {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn adds_dependencies_before_dependents() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = CfbsJson::from_project(
            &dir.path().join("cfbs.json"),
            project(json!({"name": "p", "type": "policy-set", "build": []})),
            fixture(),
        );
        let module = config
            .index
            .get_module_object(&ModuleRef::parse("git"), Some("cfbs add"))
            .unwrap()
            .unwrap();

        let mut report = AddReport::default();
        config.add_with_dependencies(module, None, &mut report).unwrap();

        let names: Vec<&str> = config.build().iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["library-for-promise-types-in-python", "promise-type-git"]);
        assert_eq!(
            report.added[0].dependency_of.as_deref(),
            Some("promise-type-git")
        );
        assert_eq!(config.build()[0].added_by.as_deref(), Some("promise-type-git"));
    }

    #[test]
    fn skips_modules_already_in_build() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = CfbsJson::from_project(
            &dir.path().join("cfbs.json"),
            project(json!({"name": "p", "build": [{"name": "autorun", "steps": []}]})),
            fixture(),
        );
        let module = config
            .index
            .get_module_object(&ModuleRef::parse("autorun"), Some("cfbs add"))
            .unwrap()
            .unwrap();
        let mut report = AddReport::default();
        config.add_with_dependencies(module, None, &mut report).unwrap();
        assert_eq!(report.skipped, vec!["autorun"]);
        assert_eq!(config.build().len(), 1);
    }

    #[test]
    fn provided_modules_take_url_and_commit() {
        let dir = tempfile::tempdir().unwrap();
        let remote = CfbsJson::from_project(
            &dir.path().join("cfbs.json"),
            project(json!({
                "name": "remote",
                "type": "module",
                "provides": {
                    "hello": {"description": "Says hello", "steps": ["copy hello.cf services/cfbs/"]},
                    "broken": {"steps": []}
                }
            })),
            fixture(),
        )
        .with_origin("https://example.com/repo", &"a".repeat(40));

        let hello = remote.get_module_for_build("hello", "cfbs add").unwrap().unwrap();
        assert_eq!(hello.url.as_deref(), Some("https://example.com/repo"));
        assert_eq!(hello.commit.as_deref(), Some("a".repeat(40).as_str()));

        let err = remote.get_provides("cfbs add").unwrap_err();
        assert!(err.to_string().contains("missing required key 'description'"));
    }

    #[test]
    fn finds_modules_only_where_asked() {
        let dir = tempfile::tempdir().unwrap();
        let config = CfbsJson::from_project(
            &dir.path().join("cfbs.json"),
            project(json!({
                "name": "p",
                "provides": {"hello": {"description": "Says hello", "steps": []}},
                "build": [{"name": "./local.cf", "steps": []}]
            })),
            fixture(),
        );
        let build_only = SearchIn {
            build: true,
            provides: false,
            index: false,
        };
        let elsewhere = SearchIn {
            build: false,
            provides: true,
            index: true,
        };

        assert!(config.can_reach_dependency("./local.cf", build_only).unwrap());
        assert!(!config.can_reach_dependency("autorun", build_only).unwrap());
        assert!(config.can_reach_dependency("autorun", elsewhere).unwrap());
        let hello = config.find_module("hello", elsewhere).unwrap().unwrap();
        assert_eq!(hello.description.as_deref(), Some("Says hello"));
        assert!(config.find_module("./local.cf", elsewhere).unwrap().is_none());
    }

    #[test]
    fn save_writes_sorted_pretty_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cfbs.json");
        std::fs::write(
            &path,
            r#"{"build": [], "git": false, "type": "policy-set", "name": "p", "description": "d"}"#,
        )
        .unwrap();
        let mut config = CfbsJson::load(&path, None, &Settings::default()).unwrap();
        config.save().unwrap();
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "{\n  \"name\": \"p\",\n  \"description\": \"d\",\n  \"type\": \"policy-set\",\n  \"git\": false,\n  \"build\": []\n}\n"
        );
    }

    #[test]
    fn load_reports_type_errors_as_validation_messages() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cfbs.json");
        std::fs::write(
            &path,
            r#"{"name": "p", "git": "yes", "build": [{"name": "./a.cf", "steps": "copy a b"}]}"#,
        )
        .unwrap();

        let err = CfbsJson::load(&path, None, &Settings::default()).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<CfbsError>(),
            Some(CfbsError::Validation(_))
        ));
        let msg = err.to_string();
        assert!(msg.contains("is not a valid project file"));
        assert!(msg.contains("The \"git\" field must be true or false"));
        assert!(msg.contains("\"steps\" must be a list of strings"));
    }

    #[test]
    fn longest_key_length_over_build() {
        let dir = tempfile::tempdir().unwrap();
        let config = CfbsJson::from_project(
            &dir.path().join("cfbs.json"),
            project(json!({"name": "p", "build": [
                {"name": "a", "version": "1.0.0", "steps": []},
                {"name": "longer-name", "steps": []}
            ]})),
            fixture(),
        );
        assert_eq!(config.longest_module_key_length("name"), 11);
        assert_eq!(config.longest_module_key_length("version"), 5);
    }
}
