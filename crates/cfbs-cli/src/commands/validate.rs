use std::path::{Path, PathBuf};

use anyhow::Result;
use tracing::{error, warn};

use cfbs_core::constants::CFBS_FILE;
use cfbs_core::validate::validate_file;
use cfbs_core::CfbsError;

use crate::session::Session;

/// Validates a project file and logs each problem. Returns 0 when valid.
pub fn validate_and_report(
    session: &Session,
    file: &Path,
    empty_build_list_ok: bool,
) -> Result<i32> {
    let errors = validate_file(
        file,
        session.index.as_deref(),
        &session.settings,
        empty_build_list_ok,
    )?;
    for message in &errors {
        error!("{message}");
    }
    Ok(if errors.is_empty() { 0 } else { 1 })
}

/// Validation before `download` and `build`, which go ahead anyway.
pub fn validate_with_warning(session: &Session) -> Result<()> {
    if validate_and_report(session, &session.cfbs_path(), false)? != 0 {
        warn!(
            "At least one error encountered while validating your cfbs.json file.\n\
             Please see the error messages above and apply fixes accordingly.\n\
             If not fixed, these errors will cause your project to not build in future cfbs versions."
        );
    }
    Ok(())
}

fn project_file(session: &Session, path: &str) -> Result<PathBuf> {
    let full = session.path(path);
    if !full.exists() {
        return Err(CfbsError::user(format!("Specified path '{path}' does not exist")).into());
    }
    if path.ends_with(".json") {
        if !full.is_file() {
            return Err(CfbsError::user(format!(
                "'{path}' is not a file - Please specify a path to a cfbs project file, \
                 ending in .json, or a folder containing a cfbs.json"
            ))
            .into());
        }
        return Ok(full);
    }
    let file = full.join(CFBS_FILE);
    if !file.is_file() {
        return Err(CfbsError::user(format!(
            "No CFBS project file found at '{}'",
            file.display()
        ))
        .into());
    }
    Ok(file)
}

pub fn run(session: &Session, paths: &[String]) -> Result<i32> {
    if paths.is_empty() {
        if !session.is_cfbs_repo() {
            return Err(CfbsError::exit(
                "Cannot validate: this is not a CFBS project. Use `cfbs init` to start a new \
                 project in this directory, or provide a path to a CFBS project to validate.",
            )
            .into());
        }
        return validate_and_report(session, &session.cfbs_path(), false);
    }

    let files = paths
        .iter()
        .map(|path| project_file(session, path))
        .collect::<Result<Vec<_>>>()?;

    let mut rc = 0;
    for file in files {
        if validate_and_report(session, &file, false)? != 0 {
            warn!("Validation of project at path {} failed", file.display());
            rc = 1;
        } else {
            println!("Successfully validated the project at path {}", file.display());
        }
    }
    Ok(rc)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{session_in, write_project};
    use serde_json::json;

    #[test]
    fn validates_current_project() {
        let dir = tempfile::tempdir().unwrap();
        let session = session_in(dir.path());
        assert!(run(&session, &[]).is_err());

        write_project(dir.path(), json!([]));
        assert_eq!(run(&session, &[]).unwrap(), 1);

        write_project(
            dir.path(),
            json!([{
                "name": "autorun",
                "repo": "https://github.com/cfengine/modules",
                "commit": "c3b7329b240cf7ad062a0a64ee8b607af2cb912a",
                "added_by": "cfbs add",
                "steps": ["json def.json def.json"]
            }]),
        );
        assert_eq!(run(&session, &[]).unwrap(), 0);
    }

    #[test]
    fn validates_listed_folders() {
        let dir = tempfile::tempdir().unwrap();
        let sub = dir.path().join("other");
        std::fs::create_dir_all(&sub).unwrap();
        std::fs::write(sub.join("cfbs.json"), r#"{"name": "", "build": []}"#).unwrap();
        let session = session_in(dir.path());

        assert_eq!(run(&session, &["other".to_string()]).unwrap(), 1);
        assert!(run(&session, &["missing".to_string()]).is_err());
        assert!(run(&session, &["other/x.json".to_string()]).is_err());
    }

    #[test]
    fn wrong_types_fail_validation_without_aborting() {
        let dir = tempfile::tempdir().unwrap();
        let session = session_in(dir.path());
        let cases = [
            json!({"name": "p", "git": "yes", "build": []}),
            json!({"name": "p", "build": [{"name": "./a.cf", "tags": "x", "steps": ["copy a.cf a.cf"]}]}),
            json!({"name": "p", "build": [{"name": "./a.cf", "steps": "copy a.cf a.cf"}]}),
            json!({"name": "p", "build": [{"name": "./a.cf", "dependencies": {}, "steps": ["copy a.cf a.cf"]}]}),
        ];
        std::fs::write(dir.path().join("a.cf"), "bundle agent a {}").unwrap();
        for case in cases {
            std::fs::write(dir.path().join("cfbs.json"), case.to_string()).unwrap();
            assert_eq!(run(&session, &[]).unwrap(), 1, "{case}");
            assert_eq!(run(&session, &[".".to_string()]).unwrap(), 1, "{case}");
        }
    }
}
