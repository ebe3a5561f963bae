use std::collections::HashSet;

use anyhow::Result;
use tracing::warn;

use cfbs_core::module::is_module_added_manually;
use cfbs_core::{CfbsJson, Module};

use crate::git_magic::Outcome;
use crate::session::Session;

/// Whether a manually added module depends on `this`, directly or through
/// other dependencies.
fn someone_needs_me(this: &Module, build: &[Module], visited: &mut HashSet<String>) -> bool {
    match this.added_by.as_deref() {
        None => return true,
        Some(by) if is_module_added_manually(by) => return true,
        Some(_) => {}
    }
    if !visited.insert(this.name.clone()) {
        return false;
    }
    build
        .iter()
        .filter(|other| other.dependencies().contains(&this.name))
        .any(|other| someone_needs_me(other, build, visited))
}

/// Offers to remove modules that were only added as dependencies of modules
/// no longer in the build. Returns true when modules were removed.
pub fn clean_unused_modules(session: &mut Session, config: &mut CfbsJson) -> Result<bool> {
    if !config.has_build_key() {
        warn!("No \"build\" key with modules - nothing to clean");
        return Ok(false);
    }
    let build = config.build();
    let unused: Vec<Module> = build
        .iter()
        .filter(|module| !someone_needs_me(module, build, &mut HashSet::new()))
        .cloned()
        .collect();
    if unused.is_empty() {
        return Ok(false);
    }

    println!("The following modules were added as dependencies but are no longer needed:");
    for module in &unused {
        println!(
            "{} - {} - added by: {}",
            module.name,
            module.description.as_deref().unwrap_or_default(),
            module.added_by.as_deref().unwrap_or_default()
        );
    }
    if !session
        .prompter
        .yes_no("Do you wish to remove these modules?", true)?
    {
        return Ok(false);
    }
    config
        .build_mut()
        .retain(|module| !unused.iter().any(|u| u.name == module.name));
    config.save()?;
    Ok(true)
}

pub fn run(session: &mut Session) -> Result<Outcome> {
    let mut config = session.require_config()?;
    config.warn_about_unknown_keys();
    if clean_unused_modules(session, &mut config)? {
        Ok(Outcome::changed(None, Vec::new()))
    } else {
        Ok(Outcome::unchanged(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{build_names, session_in, write_project};
    use serde_json::json;

    #[test]
    fn removes_orphaned_dependencies_only() {
        let dir = tempfile::tempdir().unwrap();
        write_project(
            dir.path(),
            json!([
                {"name": "lib", "added_by": "gone", "steps": []},
                {"name": "helper", "added_by": "tool", "steps": []},
                {"name": "tool", "added_by": "cfbs add", "dependencies": ["helper"], "steps": []},
                {"name": "local", "steps": []}
            ]),
        );
        let mut session = session_in(dir.path());

        let outcome = run(&mut session).unwrap();
        assert!(outcome.commit);
        assert_eq!(build_names(dir.path()), vec!["helper", "tool", "local"]);

        assert!(!run(&mut session).unwrap().commit);
    }

    #[test]
    fn dependency_cycles_without_a_manual_root_are_unused() {
        let build: Vec<Module> = serde_json::from_value(json!([
            {"name": "a", "added_by": "b", "dependencies": ["b"]},
            {"name": "b", "added_by": "a", "dependencies": ["a"]}
        ]))
        .unwrap();
        assert!(!someone_needs_me(&build[0], &build, &mut HashSet::new()));
    }
}
