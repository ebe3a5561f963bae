use std::path::Path;
use std::process::Command;

use anyhow::{anyhow, Context, Result};
use tracing::debug;

use cfbs_core::CfbsError;

/// Runs a program in `dir`, failing with its combined output on error.
pub fn run_argv(dir: &Path, argv: &[&str]) -> Result<()> {
    let (program, args) = argv
        .split_first()
        .ok_or_else(|| anyhow!("empty command argv"))?;
    debug!("running '{}' in {}", argv.join(" "), dir.display());

    let output = Command::new(program)
        .args(args)
        .current_dir(dir)
        .output()
        .map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => {
                CfbsError::user(format!("This operation requires the '{program}' utility"))
            }
            _ => CfbsError::user(format!("failed to start command '{}': {e}", argv.join(" "))),
        })?;
    if !output.status.success() {
        return Err(CfbsError::user(format!(
            "Command failed - {}\n{}{}",
            argv.join(" "),
            String::from_utf8_lossy(&output.stdout),
            String::from_utf8_lossy(&output.stderr)
        ))
        .into());
    }
    Ok(())
}

/// Runs a shell command line in `dir`, as the `run` build step does.
pub fn sh(command: &str, dir: &Path) -> Result<()> {
    run_argv(dir, &["sh", "-c", command])
        .with_context(|| format!("shell command in '{}' failed", dir.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shell_commands_run_in_directory() {
        let dir = tempfile::tempdir().unwrap();
        sh("echo hi > out.txt", dir.path()).unwrap();
        assert_eq!(std::fs::read_to_string(dir.path().join("out.txt")).unwrap(), "hi\n");
    }

    #[test]
    fn failures_carry_output() {
        let dir = tempfile::tempdir().unwrap();
        let err = sh("echo broken >&2; exit 3", dir.path()).unwrap_err();
        assert!(format!("{err:#}").contains("broken"));
    }

    #[test]
    fn missing_program_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let err = run_argv(dir.path(), &["cfbs-definitely-missing-tool"]).unwrap_err();
        assert!(err.to_string().contains("requires the 'cfbs-definitely-missing-tool' utility"));
    }
}
