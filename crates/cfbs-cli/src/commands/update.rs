use std::cmp::Ordering;
use std::path::Path;

use anyhow::Result;
use tracing::{debug, warn};

use cfbs_build::download::clone_url_repo;
use cfbs_core::constants::{ADDED_BY_ADD, INPUT_FILE};
use cfbs_core::input::{ask_for_input, carry_over_responses, InputEntry};
use cfbs_core::json::{read_json, write_json};
use cfbs_core::module::parse_version;
use cfbs_core::{AddReport, CfbsError, CfbsJson, Index, IndexSpec, Module, ModuleRef};

use crate::commands::add::print_report;
use crate::git_magic::{change_summary, Outcome};
use crate::session::Session;

/// Changes collected while updating modules.
#[derive(Debug, Default)]
struct ModuleUpdates {
    changes: Vec<String>,
    files: Vec<String>,
    /// Dependencies introduced by updates, with the module needing them.
    new_deps: Vec<(String, String)>,
}

pub fn run(session: &mut Session, to_update: &[String]) -> Result<Outcome> {
    let mut config = session.require_config()?;
    config.warn_about_unknown_keys();

    let targets: Vec<ModuleRef> = if to_update.is_empty() {
        config
            .build()
            .iter()
            .map(|m| ModuleRef::parse(&m.name))
            .collect()
    } else {
        to_update.iter().map(|m| ModuleRef::parse(m)).collect()
    };

    let mut updates = ModuleUpdates::default();
    let mut updated = 0;
    for mut target in targets {
        if !config.module_is_in_build(&target.name) {
            config.index.translate_alias(&mut target)?;
        }
        let Some(old) = config.get_module_from_build(&target.name) else {
            warn!("Module '{}' not in build. Skipping its update.", target.name);
            continue;
        };
        let Some(new) = newer_module(session, &config, old, &target)? else {
            continue;
        };
        let Some(old) = config.get_module_from_build_mut(&target.name) else {
            continue;
        };
        if update_module(session, old, new, &mut updates)? {
            updated += 1;
        } else {
            println!("Module '{}' already up to date", target.name);
        }
    }

    if !updates.new_deps.is_empty() {
        let mut report = AddReport::default();
        for (dependency, needed_by) in std::mem::take(&mut updates.new_deps) {
            if config.module_is_in_build(&dependency) {
                continue;
            }
            let module = config
                .get_module_for_build(&dependency, &needed_by)?
                .ok_or_else(|| CfbsError::exit(format!("Module '{dependency}' not found")))?;
            config.add_with_dependencies(module, None, &mut report)?;
        }
        print_report(&report);
    }
    config.save()?;

    if updates.changes.is_empty() {
        println!("Modules are already up to date");
        return Ok(Outcome::unchanged(0));
    }
    let msg = change_summary(&format!("Updated {updated} modules"), &updates.changes);
    println!("{msg}\n");
    Ok(Outcome::changed(Some(msg), updates.files))
}

/// The module definition to update `old` to, if there is a newer one.
fn newer_module(
    session: &Session,
    config: &CfbsJson,
    old: &Module,
    target: &ModuleRef,
) -> Result<Option<Module>> {
    let added_by = old.added_by.as_deref().unwrap_or(ADDED_BY_ADD);
    if let Some(url) = &old.url {
        let (path, commit) = clone_url_repo(&session.settings.downloads_dir(), url)?;
        let remote = CfbsJson::load(&path, None, &session.settings)?.with_origin(url, &commit);
        let mut provides = remote.get_provides(added_by)?;
        return Ok(provides.shift_remove(&old.name));
    }

    let Some(old_version) = &old.version else {
        warn!("Module '{}' not updatable. Skipping its update.", old.name);
        debug!("module '{}' has no version attribute", old.name);
        return Ok(None);
    };

    let custom_index = match old.extra.get("index") {
        Some(spec) => Some(Index::new(
            Some(&serde_json::from_value::<IndexSpec>(spec.clone())?),
            &session.settings,
        )),
        None => None,
    };
    let index = custom_index.as_ref().unwrap_or(&config.index);
    let Some(new) = index.get_module_object(target, Some(added_by))? else {
        warn!(
            "Module '{}' not present in the index, cannot update it.",
            old.name
        );
        return Ok(None);
    };
    let Some(new_version) = new.version.clone() else {
        warn!(
            "Module '{}' has no version in the index. Skipping its update.",
            old.name
        );
        return Ok(None);
    };
    let (Ok(old_parsed), Ok(new_parsed)) = (parse_version(old_version), parse_version(&new_version))
    else {
        warn!(
            "Cannot compare version {old_version} of module '{}' with {new_version}. \
             Skipping its update.",
            old.name
        );
        return Ok(None);
    };
    match old_parsed.cmp(&new_parsed) {
        Ordering::Less => Ok(Some(new)),
        Ordering::Equal => {
            println!("Module '{}' already up to date", old.name);
            Ok(None)
        }
        Ordering::Greater => {
            warn!(
                "The requested version of module '{}' is older than current version \
                 ({new_version} < {old_version}). Skipping its update.",
                old.name
            );
            Ok(None)
        }
    }
}

/// Copies the updatable keys of `new` into `old`. Returns false when nothing
/// changed.
fn update_module(
    session: &mut Session,
    old: &mut Module,
    new: Module,
    updates: &mut ModuleUpdates,
) -> Result<bool> {
    let mut merged = old.clone();
    merged.description = new.description;
    merged.tags = new.tags;
    merged.repo = new.repo;
    merged.url = new.url;
    merged.by = new.by;
    merged.version = new.version;
    merged.commit = new.commit;
    merged.subdirectory = new.subdirectory;
    merged.dependencies = new.dependencies;
    merged.steps = new.steps;
    merged.input = new.input;
    if merged == *old {
        return Ok(false);
    }

    for dependency in merged.dependencies() {
        if !old.dependencies().contains(dependency) {
            updates
                .new_deps
                .push((dependency.clone(), merged.name.clone()));
        }
    }
    if merged.input != old.input {
        if let Some(spec) = &merged.input {
            update_input_data(session, &merged.name, spec, updates)?;
        }
    }

    let change = match (&old.version, &merged.version) {
        (Some(from), Some(to)) if from != to => {
            format!("Updated module '{}' from version {from} to version {to}", merged.name)
        }
        _ => match (&old.commit, &merged.commit) {
            (Some(from), Some(to)) if from != to => {
                format!("Updated module '{}' from commit {from} to commit {to}", merged.name)
            }
            _ => format!("Updated module '{}'", merged.name),
        },
    };
    updates.changes.push(change);
    *old = merged;
    Ok(true)
}

/// Rewrites stored input against a changed input definition, keeping answers
/// to unchanged questions and asking the new ones.
fn update_input_data(
    session: &mut Session,
    name: &str,
    spec: &[InputEntry],
    updates: &mut ModuleUpdates,
) -> Result<()> {
    let relative = Path::new(name).join(INPUT_FILE);
    let path = session.path(&relative);
    let Some(stored) = read_json(&path)? else {
        return Ok(());
    };
    let old_data: Vec<InputEntry> = serde_json::from_value(stored)?;
    let mut new_data = spec.to_vec();
    let carried = carry_over_responses(&old_data, &mut new_data);
    debug!("carried over {carried} input responses for '{name}'");
    for entry in new_data.iter_mut().filter(|e| e.response.is_none()) {
        ask_for_input(std::slice::from_mut(entry), &mut session.prompter)?;
    }
    write_json(&path, &serde_json::to_value(&new_data)?)?;
    updates.files.push(relative.to_string_lossy().into_owned());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{build_names, read_project, session_in, write_project};
    use serde_json::json;

    #[test]
    fn updates_older_versions_and_skips_newer_ones() {
        let dir = tempfile::tempdir().unwrap();
        write_project(
            dir.path(),
            json!([
                {
                    "name": "autorun",
                    "version": "1.0.0",
                    "repo": "https://github.com/cfengine/modules",
                    "commit": "a".repeat(40),
                    "added_by": "cfbs add",
                    "steps": ["json def.json def.json"]
                },
                {
                    "name": "library-for-promise-types-in-python",
                    "version": "9.0.0",
                    "repo": "https://github.com/cfengine/modules",
                    "commit": "b".repeat(40),
                    "added_by": "cfbs add",
                    "steps": []
                },
                {"name": "./local.cf", "added_by": "cfbs add", "steps": []}
            ]),
        );
        let mut session = session_in(dir.path());

        let outcome = run(&mut session, &[]).unwrap();
        assert_eq!(
            outcome.msg.as_deref(),
            Some("Updated module 'autorun' from version 1.0.0 to version 1.0.1")
        );
        let project = read_project(dir.path());
        assert_eq!(project["build"][0]["commit"], "c3b7329b240cf7ad062a0a64ee8b607af2cb912a");
        assert_eq!(project["build"][1]["version"], "9.0.0");

        assert!(!run(&mut session, &[]).unwrap().commit);
    }

    #[test]
    fn index_entries_without_a_version_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        write_project(
            dir.path(),
            json!([
                {
                    "name": "unversioned",
                    "version": "1.0.0",
                    "repo": "https://example.com/unversioned",
                    "commit": "a".repeat(40),
                    "added_by": "cfbs add",
                    "steps": [],
                    "index": {
                        "unversioned": {
                            "description": "No version here",
                            "tags": [],
                            "repo": "https://example.com/unversioned",
                            "by": "someone",
                            "commit": "b".repeat(40),
                            "steps": []
                        }
                    }
                },
                {
                    "name": "autorun",
                    "version": "1.0.0",
                    "repo": "https://github.com/cfengine/modules",
                    "commit": "a".repeat(40),
                    "added_by": "cfbs add",
                    "steps": ["json def.json def.json"]
                }
            ]),
        );
        let mut session = session_in(dir.path());

        let outcome = run(&mut session, &[]).unwrap();
        assert!(outcome.commit);
        let project = read_project(dir.path());
        assert_eq!(project["build"][0]["commit"], "a".repeat(40));
        assert_eq!(project["build"][1]["version"], "1.0.1");
    }

    #[test]
    fn new_dependencies_are_added() {
        let dir = tempfile::tempdir().unwrap();
        write_project(
            dir.path(),
            json!([{
                "name": "promise-type-git",
                "version": "0.1.0",
                "repo": "https://github.com/cfengine/modules",
                "commit": "a".repeat(40),
                "added_by": "cfbs add",
                "steps": []
            }]),
        );
        let mut session = session_in(dir.path());

        let outcome = run(&mut session, &["git".to_string()]).unwrap();
        assert!(outcome.commit);
        assert_eq!(
            build_names(dir.path()),
            vec!["promise-type-git", "library-for-promise-types-in-python"]
        );
        assert_eq!(
            read_project(dir.path())["build"][1]["added_by"],
            "promise-type-git"
        );
    }

    #[test]
    fn input_responses_survive_an_update() {
        let dir = tempfile::tempdir().unwrap();
        let old_input = json!([{
            "type": "string",
            "variable": "name",
            "bundle": "greeter",
            "label": "Name",
            "question": "Name?",
            "default": "world"
        }]);
        write_project(
            dir.path(),
            json!([{
                "name": "greeter",
                "version": "0.9.0",
                "repo": "https://github.com/cfengine/modules",
                "commit": "a".repeat(40),
                "added_by": "cfbs add",
                "input": old_input.clone(),
                "steps": ["input ./input.json def.json"]
            }]),
        );
        let mut answered = old_input.clone();
        answered[0]["response"] = json!("Alice");
        write_json(&dir.path().join("greeter/input.json"), &answered).unwrap();
        let mut session = session_in(dir.path());

        let outcome = run(&mut session, &["greeter".to_string()]).unwrap();
        assert_eq!(outcome.files, vec!["greeter/input.json".to_string()]);
        let stored = read_json(&dir.path().join("greeter/input.json")).unwrap().unwrap();
        assert_eq!(stored[0]["question"], "Who should be greeted?");
        assert_eq!(stored[0]["response"], "Alice");
    }
}
