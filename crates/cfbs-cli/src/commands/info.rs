use anyhow::Result;
use serde_json::Value;

use cfbs_core::module::is_local_module;
use cfbs_core::{CfbsError, CfbsJson, Module, ModuleRef};

use crate::session::Session;

/// `Key: value` lines describing a module, in a fixed order.
fn info_lines(label: &str, status: &str, module: &Module) -> Vec<String> {
    let index = module.extra.get("index").map(|index| match index {
        Value::String(location) => location.clone(),
        other => other.to_string(),
    });
    let fields = [
        ("Module", Some(label.to_string())),
        ("Version", module.version.clone()),
        ("Status", Some(status.to_string())),
        ("By", module.by.clone()),
        ("Tags", module.tags.as_ref().map(|t| t.join(", "))),
        ("Repo", module.repo.clone()),
        ("Index", index),
        ("Commit", module.commit.clone()),
        ("Subdirectory", module.subdirectory.clone()),
        ("Dependencies", module.dependencies.as_ref().map(|d| d.join(", "))),
        ("Added By", module.added_by.clone()),
        ("Description", module.description.clone()),
    ];
    fields
        .into_iter()
        .filter_map(|(key, value)| value.map(|value| format!("{key}: {value}")))
        .collect()
}

/// Details of one module, from the build when added, else from the index.
fn describe(session: &Session, config: &CfbsJson, name: &str) -> Result<Vec<String>> {
    if let Some(module) = config.get_module_from_build(name) {
        return Ok(info_lines(name, "Added", module));
    }
    let reference = ModuleRef::parse(name);
    if !is_local_module(name) && config.index.exists(&reference)? {
        let target = config.index.resolve_alias(&reference.name)?.to_string();
        let Some(module) = config.index.get(&target)? else {
            return Ok(vec![format!("Module '{name}' does not exist")]);
        };
        let label = if target == reference.name {
            target.clone()
        } else {
            format!("{target}({})", reference.name)
        };
        let status = if config.module_is_in_build(&target) {
            "Added"
        } else {
            "Not added"
        };
        return Ok(info_lines(&label, status, module));
    }

    let local = if is_local_module(name) {
        name.to_string()
    } else {
        format!("./{name}")
    };
    if let Some(module) = config.get_module_from_build(&local) {
        return Ok(info_lines(&local, "Added", module));
    }
    if session.path(&local).exists() {
        return Ok(vec![format!(
            "Path {local} exists but is not yet added as a module."
        )]);
    }
    Ok(vec![format!("Module '{name}' does not exist")])
}

/// `cfbs info` / `cfbs show`.
pub fn run(session: &Session, modules: &[String]) -> Result<i32> {
    if modules.is_empty() {
        return Err(CfbsError::exit(
            "info/show command requires one or more module names as arguments",
        )
        .into());
    }
    let config = session.load_config()?;
    config.warn_about_unknown_keys();
    for name in modules {
        println!();
        for line in describe(session, &config, name)? {
            println!("{line}");
        }
    }
    println!();
    Ok(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{session_in, write_project};
    use serde_json::json;

    #[test]
    fn describes_index_modules_through_aliases() {
        let dir = tempfile::tempdir().unwrap();
        write_project(dir.path(), json!([]));
        let session = session_in(dir.path());
        let config = session.load_config().unwrap();

        let lines = describe(&session, &config, "git").unwrap();
        assert_eq!(lines[0], "Module: promise-type-git(git)");
        assert_eq!(lines[1], "Version: 0.2.0");
        assert_eq!(lines[2], "Status: Not added");
        assert!(lines.contains(&"Dependencies: library-for-promise-types-in-python".to_string()));
        assert_eq!(lines.last().unwrap(), "Description: Git promise type");

        let lines = describe(&session, &config, "nope").unwrap();
        assert_eq!(lines, vec!["Module 'nope' does not exist"]);
    }

    #[test]
    fn describes_added_and_unadded_local_modules() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.cf"), "").unwrap();
        std::fs::write(dir.path().join("b.cf"), "").unwrap();
        write_project(
            dir.path(),
            json!([{"name": "./a.cf", "added_by": "cfbs add", "steps": ["policy_files ./a.cf"]}]),
        );
        let session = session_in(dir.path());
        let config = session.load_config().unwrap();

        let lines = describe(&session, &config, "a.cf").unwrap();
        assert_eq!(lines[0], "Module: ./a.cf");
        assert!(lines.contains(&"Added By: cfbs add".to_string()));
        assert_eq!(
            describe(&session, &config, "b.cf").unwrap(),
            vec!["Path ./b.cf exists but is not yet added as a module."]
        );
        assert!(run(&session, &[]).is_err());
    }
}
