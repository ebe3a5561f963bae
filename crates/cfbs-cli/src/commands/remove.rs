use std::path::Path;

use anyhow::Result;
use tracing::debug;

use cfbs_build::fsutil::rm;
use cfbs_core::constants::{is_supported_uri, INPUT_FILE};
use cfbs_core::module::is_local_module;
use cfbs_core::{CfbsError, CfbsJson, Module};

use crate::commands::clean::clean_unused_modules;
use crate::git_magic::{change_summary, Outcome};
use crate::session::Session;

fn dependents(build: &[Module], name: &str) -> Vec<String> {
    build
        .iter()
        .filter(|m| m.dependencies().iter().any(|d| d == name))
        .map(|m| m.name.clone())
        .collect()
}

fn confirm_removal(session: &mut Session, config: &CfbsJson, name: &str) -> Result<bool> {
    let dependents = dependents(config.build(), name);
    let mut question = format!("Do you wish to remove '{name}'?");
    if !dependents.is_empty() {
        let s = if dependents.len() > 1 { "s" } else { "" };
        question.push_str(&format!(
            " (The module is a dependency of the following module{s}: {})",
            dependents.join(", ")
        ));
    }
    session.prompter.yes_no(&question, true)
}

/// Names to remove from the build for one command line argument.
fn matching_modules(session: &Session, config: &CfbsJson, arg: &str) -> Result<Vec<String>> {
    if is_supported_uri(arg) {
        let matches: Vec<String> = config
            .build()
            .iter()
            .filter(|m| m.url.as_deref() == Some(arg))
            .map(|m| m.name.clone())
            .collect();
        if matches.is_empty() {
            return Err(CfbsError::exit(format!("Could not find module with URL '{arg}'")).into());
        }
        return Ok(matches);
    }
    let name = if !is_local_module(arg) && arg.ends_with(".cf") && session.path(arg).exists() {
        format!("./{arg}")
    } else {
        arg.to_string()
    };
    if config.module_is_in_build(&name) {
        Ok(vec![name])
    } else {
        println!("Module '{name}' not found");
        Ok(Vec::new())
    }
}

pub fn run(session: &mut Session, to_remove: &[String]) -> Result<Outcome> {
    let mut config = session.require_config()?;
    config.warn_about_unknown_keys();
    if !config.has_build_key() {
        return Err(CfbsError::exit(
            "Cannot remove any modules because the \"build\" key is missing from cfbs.json",
        )
        .into());
    }

    let mut removed = 0;
    let mut changes = Vec::new();
    let mut files = Vec::new();
    for arg in to_remove {
        for name in matching_modules(session, &config, arg)? {
            if !confirm_removal(session, &config, &name)? {
                continue;
            }
            println!("Removing module '{name}'");
            config.build_mut().retain(|m| m.name != name);
            changes.push(format!("Removed module '{name}'"));
            removed += 1;
        }

        let input = Path::new(arg).join(INPUT_FILE);
        let input_display = input.to_string_lossy().into_owned();
        if session.path(&input).is_file()
            && session.prompter.yes_no(
                &format!(
                    "Module '{arg}' has input data '{input_display}'. Do you want to remove it?"
                ),
                false,
            )?
        {
            rm(&session.path(input))?;
            debug!("deleted module data '{input_display}'");
            changes.push(format!("Removed input data for module '{arg}'"));
            files.push(input_display);
        }
    }

    config.save()?;
    if removed > 0 {
        clean_unused_modules(session, &mut config)?;
    }
    if changes.is_empty() {
        return Ok(Outcome::unchanged(0));
    }
    let msg = change_summary(&format!("Removed {removed} modules"), &changes);
    Ok(Outcome::changed(Some(msg), files))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{build_names, session_in, write_project};
    use serde_json::json;

    fn project_with_git_module(dir: &Path) {
        write_project(
            dir,
            json!([
                {
                    "name": "library-for-promise-types-in-python",
                    "added_by": "promise-type-git",
                    "steps": []
                },
                {
                    "name": "promise-type-git",
                    "added_by": "cfbs add",
                    "dependencies": ["library-for-promise-types-in-python"],
                    "steps": []
                },
                {
                    "name": "from-url",
                    "url": "https://example.com/repo",
                    "added_by": "cfbs add",
                    "steps": []
                }
            ]),
        );
    }

    #[test]
    fn removing_a_module_cleans_its_dependencies() {
        let dir = tempfile::tempdir().unwrap();
        project_with_git_module(dir.path());
        let mut session = session_in(dir.path());

        let outcome = run(&mut session, &["promise-type-git".to_string()]).unwrap();
        assert_eq!(outcome.msg.as_deref(), Some("Removed module 'promise-type-git'"));
        assert_eq!(build_names(dir.path()), vec!["from-url"]);
    }

    #[test]
    fn removes_by_url_and_reports_unknown_names() {
        let dir = tempfile::tempdir().unwrap();
        project_with_git_module(dir.path());
        let mut session = session_in(dir.path());

        let outcome = run(
            &mut session,
            &["https://example.com/repo".to_string(), "nope".to_string()],
        )
        .unwrap();
        assert!(outcome.commit);
        assert_eq!(build_names(dir.path()).len(), 2);

        assert!(run(&mut session, &["https://example.com/other".to_string()]).is_err());
        assert!(!run(&mut session, &["nope".to_string()]).unwrap().commit);
    }

    #[test]
    fn input_data_is_removed_when_confirmed() {
        let dir = tempfile::tempdir().unwrap();
        project_with_git_module(dir.path());
        std::fs::create_dir_all(dir.path().join("from-url")).unwrap();
        std::fs::write(dir.path().join("from-url/input.json"), "[]\n").unwrap();
        let mut session = session_in(dir.path());
        session.prompter = crate::prompts::Prompter::scripted(&["y", "y"]);

        let outcome = run(&mut session, &["from-url".to_string()]).unwrap();
        assert_eq!(outcome.files, vec!["from-url/input.json".to_string()]);
        assert_eq!(
            outcome.msg.as_deref(),
            Some(
                "Removed 1 modules\n - Removed module 'from-url'\n \
                 - Removed input data for module 'from-url'"
            )
        );
        assert!(!dir.path().join("from-url/input.json").exists());
    }
}
