//! Thin wrappers around the `git` command line used by cfbs.

use std::path::Path;
use std::process::{Command, Output};

use anyhow::Result;
use tracing::{debug, instrument};

use cfbs_core::CfbsError;

/// Branch created by [`init`].
pub const INITIAL_BRANCH: &str = "main";

fn run_git(dir: Option<&Path>, args: &[&str]) -> Result<Output> {
    let mut command = Command::new("git");
    command.args(args);
    if let Some(dir) = dir {
        command.current_dir(dir);
    }
    debug!("git {}", args.join(" "));
    let output = command
        .output()
        .map_err(|e| CfbsError::Git(format!("failed to run git: {e}")))?;
    Ok(output)
}

fn run_git_checked(dir: Option<&Path>, args: &[&str]) -> Result<String> {
    let output = run_git(dir, args)?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(CfbsError::Git(format!(
            "git {} failed: {}",
            args.first().copied().unwrap_or_default(),
            stderr.trim()
        ))
        .into());
    }
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

/// Whether a usable `git` binary is on the PATH.
pub fn git_exists() -> bool {
    Command::new("git")
        .arg("--version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

/// Check whether a directory is inside a git work tree.
pub fn is_git_repo(dir: &Path) -> bool {
    run_git(Some(dir), &["rev-parse", "--is-inside-work-tree"])
        .map(|o| o.status.success())
        .unwrap_or(false)
}

/// Reads a config value, `None` when unset.
pub fn get_config(dir: &Path, key: &str) -> Option<String> {
    run_git_checked(Some(dir), &["config", "--get", key])
        .ok()
        .filter(|value| !value.is_empty())
}

pub fn set_config(dir: &Path, key: &str, value: &str) -> Result<()> {
    run_git_checked(Some(dir), &["config", key, value])?;
    Ok(())
}

/// Creates a repository with the given identity and description.
#[instrument]
pub fn init(dir: &Path, user_name: &str, user_email: &str, description: &str) -> Result<()> {
    run_git_checked(Some(dir), &["init", "--initial-branch", INITIAL_BRANCH])?;
    set_config(dir, "user.name", user_name)?;
    set_config(dir, "user.email", user_email)?;
    if !description.is_empty() {
        let path = dir.join(".git").join("description");
        std::fs::write(&path, format!("{description}\n"))
            .map_err(|e| CfbsError::Git(format!("failed to write '{}': {e}", path.display())))?;
    }
    Ok(())
}

/// Author identity overriding the repository configuration for one commit.
#[derive(Debug, Clone, Default)]
pub struct Identity {
    pub name: Option<String>,
    pub email: Option<String>,
}

impl Identity {
    fn config_args(&self) -> Vec<String> {
        let mut args = Vec::new();
        if let Some(name) = &self.name {
            args.extend(["-c".to_string(), format!("user.name={name}")]);
        }
        if let Some(email) = &self.email {
            args.extend(["-c".to_string(), format!("user.email={email}")]);
        }
        args
    }
}

/// Stages `files` and commits them.
///
/// Returns false without committing when staging produced no changes.
#[instrument(skip(message, identity))]
pub fn commit(
    dir: &Path,
    message: &str,
    edit: bool,
    files: &[String],
    identity: &Identity,
) -> Result<bool> {
    if files.is_empty() {
        return Ok(false);
    }
    let mut add = vec!["add", "--all", "--"];
    add.extend(files.iter().map(String::as_str));
    run_git_checked(Some(dir), &add)?;

    let staged = run_git(Some(dir), &["diff", "--cached", "--quiet"])?;
    if staged.status.success() {
        debug!("nothing staged, skipping commit");
        return Ok(false);
    }

    let config = identity.config_args();
    let mut args: Vec<&str> = config.iter().map(String::as_str).collect();
    args.extend(["commit", "--message", message]);
    if edit {
        args.push("--edit");
        let status = Command::new("git")
            .args(&args)
            .current_dir(dir)
            .status()
            .map_err(|e| CfbsError::Git(format!("failed to run git: {e}")))?;
        if !status.success() {
            return Err(CfbsError::Git("git commit was aborted".to_string()).into());
        }
        return Ok(true);
    }
    run_git_checked(Some(dir), &args)?;
    Ok(true)
}

/// Resolves a branch or tag on a remote to a commit hash.
pub fn ls_remote(remote: &str, branch: &str) -> Result<Option<String>> {
    let out = run_git_checked(None, &["ls-remote", remote, branch])?;
    Ok(out
        .lines()
        .filter_map(|line| line.split_whitespace().next())
        .map(str::to_string)
        .next())
}

pub fn clone(url: &str, target: &Path) -> Result<()> {
    let target = target.to_string_lossy();
    run_git_checked(None, &["clone", "--quiet", url, &target])?;
    Ok(())
}

pub fn checkout(dir: &Path, commit: &str) -> Result<()> {
    run_git_checked(Some(dir), &["checkout", "--quiet", commit])?;
    Ok(())
}

/// Capture the HEAD commit SHA from a git repository.
pub fn head_commit(dir: &Path) -> Result<String> {
    let sha = run_git_checked(Some(dir), &["rev-parse", "HEAD"])?;
    if sha.is_empty() {
        return Err(CfbsError::Git("git rev-parse HEAD returned empty output".to_string()).into());
    }
    Ok(sha)
}
