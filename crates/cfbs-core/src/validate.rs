//! Validation of `cfbs.json` files.
//!
//! Validation works on the raw JSON so that structural problems (a string
//! where a list belongs, unknown step operations) are reported as messages
//! instead of failing to deserialize. [`CfbsJson::load`] falls back to these
//! messages when a file does not match the expected types.

use std::collections::HashSet;
use std::path::Path;
use std::str::FromStr;

use anyhow::Result;
use serde_json::{Map, Value};
use tracing::debug;

use crate::constants::PROJECT_TYPES;
use crate::input::InputEntry;
use crate::module::{is_commit_hash, is_local_module, is_valid_version};
use crate::json::read_json;
use crate::project::{CfbsJson, Project, SearchIn};
use crate::settings::Settings;
use crate::step::BuildStep;

/// Which part of the project a module object lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Build,
    Provides,
    Index,
}

impl Mode {
    fn as_str(self) -> &'static str {
        match self {
            Self::Build => "build",
            Self::Provides => "provides",
            Self::Index => "index",
        }
    }

    fn required_keys(self) -> &'static [&'static str] {
        match self {
            Self::Build => &["name", "steps"],
            Self::Provides => &["description", "steps"],
            Self::Index => &["description", "tags", "repo", "by", "version", "commit", "steps"],
        }
    }
}

/// Validates a project. Returns one message per problem found.
pub fn validate_config(config: &CfbsJson, empty_build_list_ok: bool) -> Result<Vec<String>> {
    let Some(raw) = config.raw() else {
        return Ok(vec![format!(
            "Project file '{}' does not exist",
            config.path().display()
        )]);
    };
    run_validator(raw, config.path(), Some(config), empty_build_list_ok)
}

/// Validates JSON which does not deserialize into a project.
///
/// Dependencies are not resolved, since that needs the parsed project.
pub fn validate_value(
    raw: &Value,
    path: &Path,
    empty_build_list_ok: bool,
) -> Result<Vec<String>> {
    run_validator(raw, path, None, empty_build_list_ok)
}

/// Reads and validates the project file at `path`.
///
/// Type errors are reported as messages rather than returned as errors.
pub fn validate_file(
    path: &Path,
    index_override: Option<&str>,
    settings: &Settings,
    empty_build_list_ok: bool,
) -> Result<Vec<String>> {
    let raw = read_json(path)?;
    if let Some(value) = &raw {
        if let Err(e) = serde_json::from_value::<Project>(value.clone()) {
            let mut errors = validate_value(value, path, empty_build_list_ok)?;
            if errors.is_empty() {
                errors.push(format!("Failed to parse '{}': {e}", path.display()));
            }
            return Ok(errors);
        }
    }
    let config = CfbsJson::from_raw(path, raw, index_override, settings)?;
    validate_config(&config, empty_build_list_ok)
}

fn run_validator(
    raw: &Value,
    path: &Path,
    config: Option<&CfbsJson>,
    empty_build_list_ok: bool,
) -> Result<Vec<String>> {
    let root = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));

    let mut validator = Validator {
        config,
        root,
        errors: Vec::new(),
    };
    validator.validate_top_level(raw, empty_build_list_ok)?;
    debug!("validation found {} problem(s)", validator.errors.len());
    Ok(validator.errors)
}

struct Validator<'a> {
    config: Option<&'a CfbsJson>,
    root: &'a Path,
    errors: Vec<String>,
}

impl Validator<'_> {
    fn error(&mut self, msg: impl Into<String>) {
        self.errors.push(msg.into());
    }

    fn validate_top_level(&mut self, raw: &Value, empty_build_list_ok: bool) -> Result<()> {
        let Value::Object(top) = raw else {
            self.error("The top level of cfbs.json must be a JSON object");
            return Ok(());
        };

        match top.get("name") {
            Some(Value::String(name)) if !name.trim().is_empty() => {}
            Some(Value::String(_)) => self.error("The \"name\" field must not be empty"),
            Some(_) => self.error("The \"name\" field must be a string"),
            None => self.error("The \"name\" field is required in a cfbs.json file"),
        }

        let kind = match top.get("type") {
            None => None,
            Some(Value::String(kind)) if PROJECT_TYPES.contains(&kind.as_str()) => Some(kind.as_str()),
            Some(other) => {
                self.error(format!(
                    "The \"type\" field must be one of {}, not {other}",
                    PROJECT_TYPES.join(", ")
                ));
                None
            }
        };

        if let Some(description) = top.get("description") {
            if !description.is_string() {
                self.error("The \"description\" field must be a string");
            }
        }
        if let Some(git) = top.get("git") {
            if !git.is_boolean() {
                self.error("The \"git\" field must be true or false");
            }
        }

        match top.get("index") {
            None | Some(Value::String(_)) => {
                if kind == Some("index") {
                    self.error("Projects of type \"index\" must have an \"index\" object");
                }
            }
            Some(Value::Object(modules)) => {
                for (name, module) in modules {
                    self.validate_module(Mode::Index, name, module, Some(modules))?;
                }
            }
            Some(_) => self.error("The \"index\" field must be a URL / path or an object"),
        }

        match top.get("provides") {
            None => {}
            Some(Value::Object(modules)) => {
                for (name, module) in modules {
                    self.validate_module(Mode::Provides, name, module, None)?;
                }
            }
            Some(_) => self.error("The \"provides\" field must be an object"),
        }

        match top.get("build") {
            None => {
                if kind == Some("policy-set") {
                    self.error("The \"build\" field is required for projects of type \"policy-set\"");
                }
            }
            Some(Value::Array(modules)) => {
                if modules.is_empty() && !empty_build_list_ok {
                    self.error("The \"build\" list is empty - add modules with 'cfbs add'");
                }
                let mut seen = HashSet::new();
                for (position, module) in modules.iter().enumerate() {
                    let name = module
                        .get("name")
                        .and_then(Value::as_str)
                        .map(str::to_string)
                        .unwrap_or_else(|| format!("#{}", position + 1));
                    if !seen.insert(name.clone()) {
                        self.error(format!("Duplicate module '{name}' in \"build\""));
                    }
                    self.validate_module(Mode::Build, &name, module, None)?;
                }
            }
            Some(_) => self.error("The \"build\" field must be a list"),
        }
        Ok(())
    }

    fn validate_module(
        &mut self,
        mode: Mode,
        name: &str,
        module: &Value,
        siblings: Option<&Map<String, Value>>,
    ) -> Result<()> {
        let at = format!("Module '{name}' in \"{}\"", mode.as_str());
        let Value::Object(obj) = module else {
            self.error(format!("{at}: must be an object"));
            return Ok(());
        };

        if let Some(alias) = obj.get("alias") {
            match (alias.as_str(), siblings) {
                (None, _) => self.error(format!("{at}: \"alias\" must be a string")),
                (Some(target), Some(siblings)) if !siblings.contains_key(target) => {
                    self.error(format!("{at}: alias target '{target}' does not exist"))
                }
                _ => {}
            }
            if obj.len() > 1 {
                self.error(format!("{at}: an alias must not have other keys"));
            }
            return Ok(());
        }

        for key in mode.required_keys() {
            if !obj.contains_key(*key) {
                self.error(format!("{at}: missing required key \"{key}\""));
            }
        }

        for key in ["name", "description", "repo", "url", "by", "added_by"] {
            if let Some(value) = obj.get(key) {
                if !value.is_string() {
                    self.error(format!("{at}: \"{key}\" must be a string"));
                }
            }
        }
        for key in ["tags", "dependencies", "steps"] {
            if let Some(value) = obj.get(key) {
                if !is_string_list(value) {
                    self.error(format!("{at}: \"{key}\" must be a list of strings"));
                }
            }
        }

        if let Some(version) = obj.get("version") {
            match version.as_str() {
                Some(v) if is_valid_version(v) => {}
                _ => self.error(format!("{at}: \"version\" must look like 1.2.3 or 1.2.3-4")),
            }
        }

        if let Some(commit) = obj.get("commit") {
            match commit.as_str() {
                Some(c) if is_commit_hash(c) => {}
                _ => self.error(format!("{at}: \"commit\" must be a full commit hash")),
            }
        }

        if let Some(subdirectory) = obj.get("subdirectory") {
            match subdirectory.as_str() {
                Some(s) if is_relative_subdirectory(s) => {}
                _ => self.error(format!(
                    "{at}: \"subdirectory\" must be a relative path without '..'"
                )),
            }
        }

        if mode == Mode::Build {
            if is_local_module(name) {
                if !self.root.join(name).exists() {
                    self.error(format!("{at}: local module '{name}' does not exist"));
                }
            } else {
                if !obj.contains_key("commit") {
                    self.error(format!("{at}: missing required key \"commit\""));
                }
                if !obj.contains_key("repo") && !obj.contains_key("url") {
                    self.error(format!("{at}: needs a \"repo\" or \"url\""));
                }
            }
        }

        if let Some(Value::Array(steps)) = obj.get("steps") {
            if steps.is_empty() && mode != Mode::Index {
                self.error(format!("{at}: \"steps\" must not be empty"));
            }
            for step in steps.iter().filter_map(Value::as_str) {
                if let Err(e) = BuildStep::from_str(step) {
                    self.error(format!("{at}: {e}"));
                }
            }
        }

        if let Some(Value::Array(dependencies)) = obj.get("dependencies") {
            for dependency in dependencies.iter().filter_map(Value::as_str) {
                if !self.can_reach(mode, dependency, siblings)? {
                    self.error(format!(
                        "{at}: dependency '{dependency}' is not available"
                    ));
                }
            }
        }

        if let Some(input) = obj.get("input") {
            if serde_json::from_value::<Vec<InputEntry>>(input.clone()).is_err() {
                self.error(format!("{at}: \"input\" must be a list of input definitions"));
            }
        }

        Ok(())
    }

    fn can_reach(
        &self,
        mode: Mode,
        dependency: &str,
        siblings: Option<&Map<String, Value>>,
    ) -> Result<bool> {
        if mode == Mode::Index {
            return Ok(siblings.is_some_and(|s| s.contains_key(dependency)));
        }
        let Some(config) = self.config else {
            return Ok(true);
        };
        let build = mode == Mode::Build;
        config.can_reach_dependency(
            dependency,
            SearchIn {
                build,
                provides: !build,
                index: !build,
            },
        )
    }
}

fn is_string_list(value: &Value) -> bool {
    value
        .as_array()
        .is_some_and(|items| items.iter().all(Value::is_string))
}

fn is_relative_subdirectory(path: &str) -> bool {
    !path.is_empty()
        && !path.starts_with('/')
        && !path.starts_with("./")
        && !path.split('/').any(|part| part == "..")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::tests::fixture;
    use serde_json::json;

    fn check(value: Value, dir: &Path) -> Vec<String> {
        let path = dir.join("cfbs.json");
        std::fs::write(&path, value.to_string()).unwrap();
        let mut config = CfbsJson::load(&path, None, &Settings::default()).unwrap();
        config.index = fixture();
        validate_config(&config, false).unwrap()
    }

    fn commit() -> String {
        "c3b7329b240cf7ad062a0a64ee8b607af2cb912a".to_string()
    }

    #[test]
    fn accepts_valid_project() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("local.cf"), "bundle agent x {}").unwrap();
        let errors = check(
            json!({
                "name": "p",
                "type": "policy-set",
                "description": "d",
                "build": [
                    {
                        "name": "autorun",
                        "repo": "https://github.com/cfengine/modules",
                        "version": "1.0.1",
                        "commit": commit(),
                        "subdirectory": "management/autorun",
                        "added_by": "cfbs add",
                        "steps": ["json def.json def.json"]
                    },
                    {
                        "name": "./local.cf",
                        "steps": ["copy ./local.cf services/cfbs/local.cf", "policy_files services/cfbs/local.cf"]
                    }
                ]
            }),
            dir.path(),
        );
        assert!(errors.is_empty(), "{errors:?}");
    }

    #[test]
    fn reports_bad_fields() {
        let dir = tempfile::tempdir().unwrap();
        let errors = check(
            json!({
                "name": "",
                "type": "weird",
                "build": [
                    {
                        "name": "m",
                        "repo": "https://example.com/x",
                        "commit": "main",
                        "version": "1.0",
                        "subdirectory": "../escape",
                        "dependencies": ["missing"],
                        "steps": ["frobnicate x"]
                    }
                ]
            }),
            dir.path(),
        );
        let all = errors.join("\n");
        assert!(all.contains("\"name\" field must not be empty"));
        assert!(all.contains("\"type\" field must be one of"));
        assert!(all.contains("full commit hash"));
        assert!(all.contains("\"version\" must look like"));
        assert!(all.contains("\"subdirectory\" must be a relative path"));
        assert!(all.contains("dependency 'missing' is not available"));
        assert!(all.contains("Unknown build step operation: 'frobnicate'"));
    }

    #[test]
    fn empty_build_list() {
        let dir = tempfile::tempdir().unwrap();
        let value = json!({"name": "p", "type": "policy-set", "build": []});
        let errors = check(value, dir.path());
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("empty"));
    }

    #[test]
    fn reports_missing_local_module_and_duplicates() {
        let dir = tempfile::tempdir().unwrap();
        let errors = check(
            json!({
                "name": "p",
                "build": [
                    {"name": "./gone.cf", "steps": ["copy ./gone.cf services/gone.cf"]},
                    {"name": "./gone.cf", "steps": ["copy ./gone.cf services/gone.cf"]}
                ]
            }),
            dir.path(),
        );
        let all = errors.join("\n");
        assert!(all.contains("Duplicate module './gone.cf'"));
        assert!(all.contains("local module './gone.cf' does not exist"));
    }

    #[test]
    fn reports_wrong_types_instead_of_failing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cfbs.json");
        std::fs::write(
            &path,
            json!({
                "name": "p",
                "git": "yes",
                "build": [
                    {
                        "name": "m",
                        "repo": "https://example.com/x",
                        "commit": commit(),
                        "tags": "x",
                        "dependencies": {},
                        "steps": "copy a b"
                    }
                ]
            })
            .to_string(),
        )
        .unwrap();

        let errors = validate_file(&path, None, &Settings::default(), false).unwrap();
        let all = errors.join("\n");
        assert!(all.contains("The \"git\" field must be true or false"));
        assert!(all.contains("Module 'm' in \"build\": \"tags\" must be a list of strings"));
        assert!(all.contains("\"dependencies\" must be a list of strings"));
        assert!(all.contains("\"steps\" must be a list of strings"));
    }

    #[test]
    fn reports_non_object_modules() {
        let dir = tempfile::tempdir().unwrap();
        let errors = validate_value(
            &json!({"name": 5, "provides": [], "build": ["autorun"]}),
            &dir.path().join("cfbs.json"),
            false,
        )
        .unwrap();
        assert_eq!(
            errors,
            vec![
                "The \"name\" field must be a string",
                "The \"provides\" field must be an object",
                "Module '#1' in \"build\": must be an object",
            ]
        );
    }

    #[test]
    fn missing_file_is_one_message() {
        let dir = tempfile::tempdir().unwrap();
        let errors =
            validate_file(&dir.path().join("cfbs.json"), None, &Settings::default(), false).unwrap();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("does not exist"));
    }
}
