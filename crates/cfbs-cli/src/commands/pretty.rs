use std::path::Path;

use anyhow::Result;

use cfbs_core::pretty::{pretty_check_file, pretty_file};
use cfbs_core::CfbsError;

use crate::session::Session;

/// Formats JSON files, or with `--check` reports the ones that would change.
pub fn run(session: &Session, files: &[String]) -> Result<i32> {
    if files.is_empty() {
        return Err(CfbsError::exit("Filenames missing for cfbs pretty command").into());
    }
    let sort = !session.keep_order;

    let mut would_change = 0;
    for file in files {
        if !file.ends_with(".json") {
            let name = Path::new(file)
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();
            return Err(CfbsError::exit(format!(
                "cfbs pretty command can only be used with .json files, not '{name}'"
            ))
            .into());
        }
        let path = session.path(file);
        if session.check {
            if !pretty_check_file(&path, sort)? {
                would_change += 1;
                println!("Would reformat {file}");
            }
        } else {
            pretty_file(&path, sort)?;
        }
    }

    if session.check {
        println!("Would reformat {would_change} file(s)");
        return Ok(if would_change > 0 { 1 } else { 0 });
    }
    Ok(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::session_in;

    #[test]
    fn check_reports_without_writing() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = session_in(dir.path());
        session.check = true;
        let ugly = "{\"build\":[],\"name\":\"p\"}";
        std::fs::write(dir.path().join("cfbs.json"), ugly).unwrap();

        assert_eq!(run(&session, &["cfbs.json".to_string()]).unwrap(), 1);
        assert_eq!(std::fs::read_to_string(dir.path().join("cfbs.json")).unwrap(), ugly);

        session.check = false;
        assert_eq!(run(&session, &["cfbs.json".to_string()]).unwrap(), 0);
        session.check = true;
        assert_eq!(run(&session, &["cfbs.json".to_string()]).unwrap(), 0);
    }

    #[test]
    fn rejects_non_json_and_missing_files() {
        let dir = tempfile::tempdir().unwrap();
        let session = session_in(dir.path());
        let err = run(&session, &["notes.txt".to_string()]).unwrap_err();
        assert!(err.to_string().contains("only be used with .json files"));
        let err = run(&session, &["missing.json".to_string()]).unwrap_err();
        assert!(err.to_string().contains("not found"));
    }
}
