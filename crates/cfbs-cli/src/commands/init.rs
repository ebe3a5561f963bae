use anyhow::Result;
use tracing::debug;

use cfbs_core::constants::{ADDED_BY_INIT, CFBS_FILE};
use cfbs_core::module::is_valid_version;
use cfbs_core::{CfbsError, CfbsJson, Index, IndexSpec, Project};

use crate::commands::add;
use crate::git_magic::{commit_after_command, git_commit_maybe_prompt, plural_s, quoted_list};
use crate::session::Session;

/// The kernel's hostname, then `/etc/hostname`, then "localhost" where
/// neither file exists (macOS and other non-Linux systems).
fn hostname() -> String {
    std::fs::read_to_string("/proc/sys/kernel/hostname")
        .or_else(|_| std::fs::read_to_string("/etc/hostname"))
        .map(|name| name.trim().to_string())
        .ok()
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| "localhost".to_string())
}

fn wants_git(session: &mut Session) -> Result<bool> {
    if let Some(git) = session.git {
        return Ok(git);
    }
    let question = if cfbs_git::is_git_repo(&session.root) {
        "This is a git repository. Do you want cfbs to make commits to it?"
    } else {
        "Do you want cfbs to initialize a git repository and make commits to it?"
    };
    session.prompter.yes_no(question, true)
}

/// Sets up the repository and commit identity. Returns false after printing
/// why git cannot be used.
fn prepare_git(session: &mut Session, description: &str) -> Result<bool> {
    if !cfbs_git::git_exists() {
        println!("Command 'git' was not found");
        return Ok(false);
    }

    let user_name = match session.identity.name.clone() {
        Some(name) => name,
        None => {
            let current = cfbs_git::get_config(&session.root, "user.name");
            session.prompter.prompt(
                "Please enter user name to use for git commits",
                None,
                Some(current.as_deref().unwrap_or("cfbs")),
            )?
        }
    };
    let user_email = match session.identity.email.clone() {
        Some(email) => email,
        None => {
            let fallback = format!("cfbs@{}", hostname());
            let current = cfbs_git::get_config(&session.root, "user.email");
            session.prompter.prompt(
                "Please enter user email to use for git commits",
                None,
                Some(current.as_deref().unwrap_or(&fallback)),
            )?
        }
    };

    if !cfbs_git::is_git_repo(&session.root) {
        if let Err(e) = cfbs_git::init(&session.root, &user_name, &user_email, description) {
            println!("{e:#}");
            return Ok(false);
        }
    } else {
        let configured = cfbs_git::set_config(&session.root, "user.name", &user_name)
            .and_then(|_| cfbs_git::set_config(&session.root, "user.email", &user_email));
        if configured.is_err() {
            println!("Failed to set Git user name and email");
            return Ok(false);
        }
    }
    Ok(true)
}

/// Module arguments for `cfbs add` selecting the policy set to build on.
fn masterfiles_to_add(session: &mut Session) -> Result<Vec<String>> {
    let Some(masterfiles) = session.masterfiles.clone() else {
        if session.prompter.yes_no(
            "Do you wish to build on top of the default policy set, masterfiles? (Recommended)",
            true,
        )? {
            return Ok(vec!["masterfiles".to_string()]);
        }
        let answer = session.prompter.prompt(
            "Specify policy set to use instead (empty to skip)",
            None,
            Some(""),
        )?;
        return Ok(if answer.is_empty() { Vec::new() } else { vec![answer] });
    };

    if masterfiles == "no" {
        return Ok(Vec::new());
    }
    if is_valid_version(&masterfiles) {
        debug!("--masterfiles={masterfiles} appears to be a version number");
        return Ok(vec![format!("masterfiles@{masterfiles}")]);
    }

    debug!("--masterfiles={masterfiles} appears to be a branch");
    let remote = session.settings.masterfiles_remote.clone();
    let commit = cfbs_git::ls_remote(&remote, &masterfiles)?.ok_or_else(|| {
        CfbsError::exit(format!(
            "Failed to find branch or tag {masterfiles} at remote {remote}"
        ))
    })?;
    debug!("current commit for masterfiles branch {masterfiles} is {commit}");
    Ok(vec![format!("{remote}@{commit}"), "masterfiles".to_string()])
}

/// `cfbs init`: creates `cfbs.json`, optionally a git repository, and adds
/// the policy set to build on.
pub fn run(session: &mut Session) -> Result<i32> {
    if session.is_cfbs_repo() {
        return Err(CfbsError::user(format!("Already initialized - look at {CFBS_FILE}")).into());
    }

    let name = session.prompter.prompt(
        "Please enter the name of this CFEngine Build project",
        None,
        Some("Example project"),
    )?;
    let description = session.prompter.prompt(
        "Please enter the description of this CFEngine Build project",
        None,
        Some("Example description"),
    )?;

    let do_git = wants_git(session)?;
    if do_git && !prepare_git(session, &description)? {
        return Ok(1);
    }

    let project = Project {
        name: name.clone(),
        description: Some(description),
        kind: Some("policy-set".to_string()),
        index: session.index.clone().map(IndexSpec::Location),
        git: Some(do_git),
        build: Some(Vec::new()),
        ..Project::default()
    };
    let index = Index::new(project.index.as_ref(), &session.settings);
    CfbsJson::from_project(&session.cfbs_path(), project, index).save()?;

    if do_git {
        let files = [CFBS_FILE.to_string()];
        if let Err(e) =
            git_commit_maybe_prompt(session, "Initialized a new CFEngine Build project", &files)
        {
            println!("{e:#}");
            std::fs::remove_file(session.cfbs_path())?;
            return Ok(1);
        }
    }
    println!("Initialized an empty project called '{name}' in '{CFBS_FILE}'");

    let to_add = masterfiles_to_add(session)?;
    if to_add.is_empty() {
        return Ok(0);
    }
    let outcome = add::run(session, &to_add, ADDED_BY_INIT)?;
    let message = format!("Added module{} {}", plural_s(&to_add), quoted_list(&to_add));
    commit_after_command(session, &message, outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{read_project, session_in};

    #[test]
    fn hostname_is_a_single_word() {
        let name = hostname();
        assert!(!name.is_empty());
        assert!(!name.contains(char::is_whitespace), "{name:?}");
    }

    #[test]
    fn creates_project_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = session_in(dir.path());
        session.git = Some(false);
        session.masterfiles = Some("no".to_string());

        assert_eq!(run(&mut session).unwrap(), 0);
        let project = read_project(dir.path());
        assert_eq!(project["name"], "Example project");
        assert_eq!(project["type"], "policy-set");
        assert_eq!(project["git"], false);
        assert_eq!(project["build"], serde_json::json!([]));

        let err = run(&mut session).unwrap_err();
        assert_eq!(err.to_string(), "Already initialized - look at cfbs.json");
    }

    #[test]
    fn initializes_git_and_commits() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = session_in(dir.path());
        session.git = Some(true);
        session.masterfiles = Some("no".to_string());
        session.identity = cfbs_git::Identity {
            name: Some("Tester".to_string()),
            email: Some("tester@example.com".to_string()),
        };

        assert_eq!(run(&mut session).unwrap(), 0);
        assert!(cfbs_git::is_git_repo(dir.path()));
        assert_eq!(cfbs_git::head_commit(dir.path()).unwrap().len(), 40);
        assert_eq!(
            cfbs_git::get_config(dir.path(), "user.name").as_deref(),
            Some("Tester")
        );
    }

    #[test]
    fn masterfiles_versions_become_module_references() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = session_in(dir.path());
        session.masterfiles = Some("3.21.0".to_string());
        assert_eq!(masterfiles_to_add(&mut session).unwrap(), vec!["masterfiles@3.21.0"]);
        session.masterfiles = None;
        assert_eq!(masterfiles_to_add(&mut session).unwrap(), vec!["masterfiles"]);
    }
}
