//! Committing project changes after commands that modify it.

use anyhow::Result;
use tracing::{debug, instrument};

use cfbs_core::constants::CFBS_FILE;
use cfbs_core::CfbsError;

use crate::session::Session;

/// What a modifying command did, and which files to commit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Outcome {
    pub rc: i32,
    /// Whether anything changed that should be committed.
    pub commit: bool,
    /// Details to put in the commit message body.
    pub msg: Option<String>,
    /// Files besides `cfbs.json` that were touched, relative to the project root.
    pub files: Vec<String>,
}

impl Outcome {
    pub fn unchanged(rc: i32) -> Self {
        Self {
            rc,
            ..Self::default()
        }
    }

    pub fn changed(msg: Option<String>, files: Vec<String>) -> Self {
        Self {
            rc: 0,
            commit: true,
            msg,
            files,
        }
    }
}

/// `"s"` when more than one thing is named.
pub fn plural_s<T>(items: &[T]) -> &'static str {
    if items.len() > 1 {
        "s"
    } else {
        ""
    }
}

/// `'a', 'b'` for a list of names.
pub fn quoted_list(items: &[String]) -> String {
    items
        .iter()
        .map(|item| format!("'{item}'"))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Commit message details: the single change, or a heading over a list of them.
pub fn change_summary(heading: &str, changes: &[String]) -> String {
    match changes {
        [only] => only.clone(),
        _ => {
            let lines: String = changes.iter().map(|c| format!("\n - {c}")).collect();
            format!("{heading}{lines}")
        }
    }
}

/// Commits `files` with `message`, offering to edit the message when interactive.
///
/// `--git-commit-message` replaces the message.
pub fn git_commit_maybe_prompt(session: &mut Session, message: &str, files: &[String]) -> Result<()> {
    let mut edit = false;
    let message = match &session.commit_message {
        Some(custom) => custom.clone(),
        None => {
            if !session.non_interactive() {
                let question = if message.contains('\n') {
                    let indented: String = message
                        .lines()
                        .filter(|line| !line.is_empty())
                        .map(|line| format!("\t{line}\n"))
                        .collect();
                    format!("The default commit message is:\n\n{indented}\nEdit it?")
                } else {
                    format!("The default commit message is '{message}' - edit it?")
                };
                edit = session.prompter.yes_no(&question, false)?;
            }
            message.to_string()
        }
    };

    let committed = cfbs_git::commit(&session.root, &message, edit, files, &session.identity)
        .map_err(|e| CfbsError::Git(format!("Failed to commit changes: {e:#}")))?;
    debug!("committed: {committed}");
    Ok(())
}

/// Commits the result of a command when the project has git enabled.
///
/// Returns the command's exit code.
#[instrument(skip(session, outcome))]
pub fn commit_after_command(session: &mut Session, message: &str, outcome: Outcome) -> Result<i32> {
    if outcome.rc != 0 || !outcome.commit {
        return Ok(outcome.rc);
    }
    if !session.is_cfbs_repo() || !session.load_config()?.git_enabled() {
        debug!("git is not enabled for this project, not committing");
        return Ok(outcome.rc);
    }

    let mut full_message = message.to_string();
    if let Some(details) = outcome.msg.as_deref().map(str::trim) {
        if !details.is_empty() && details != message {
            full_message = format!("{message}\n\n{details}");
        }
    }

    let mut files = vec![CFBS_FILE.to_string()];
    files.extend(
        outcome
            .files
            .iter()
            .filter(|f| f.as_str() != CFBS_FILE)
            .cloned(),
    );
    git_commit_maybe_prompt(session, &full_message, &files)?;
    Ok(outcome.rc)
}
