use anyhow::Result;

use cfbs_build::download::download_path;
use cfbs_build::fsutil::pad_right;
use cfbs_core::constants::CFBS_FILE;
use cfbs_core::IndexSpec;

use crate::commands::validate::validate_and_report;
use crate::session::Session;

/// Prints the project summary and a table of modules with their download state.
pub fn run(session: &Session) -> Result<i32> {
    session.require_repo()?;
    if validate_and_report(session, &session.cfbs_path(), true)? != 0 {
        return Ok(1);
    }
    let config = session.require_config()?;
    config.warn_about_unknown_keys();

    let project = &config.project;
    println!("Name:        {}", project.name);
    println!("Description: {}", project.description.as_deref().unwrap_or_default());
    println!("File:        {CFBS_FILE}");
    match &project.index {
        Some(IndexSpec::Location(location)) => println!("Index:       {location}"),
        Some(IndexSpec::Inline(_)) => println!("Index:       inline index in cfbs.json"),
        None => {}
    }

    if config.build().is_empty() {
        return Ok(0);
    }
    println!("\nModules:");
    let name_width = config.longest_module_key_length("name");
    let version_width = config.longest_module_key_length("version");
    let downloads = session.settings.downloads_dir();
    for (i, module) in config.build().iter().enumerate() {
        let (version, separator, commit, status) = if module.is_local() {
            ("local".to_string(), ' ', pad_right("", 40), "Copied")
        } else {
            let downloaded = download_path(&downloads, module)?.exists();
            (
                module.version.clone().unwrap_or_default(),
                '/',
                module.commit.clone().unwrap_or_default(),
                if downloaded { "Downloaded" } else { "Not downloaded" },
            )
        };
        println!(
            "{:03} {} @ {} {separator} {commit} ({status})",
            i + 1,
            pad_right(&module.name, name_width),
            pad_right(&version, version_width),
        );
    }
    Ok(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{session_in, write_project};
    use serde_json::json;

    #[test]
    fn reports_valid_and_invalid_projects() {
        let dir = tempfile::tempdir().unwrap();
        let session = session_in(dir.path());
        assert!(run(&session).is_err());

        write_project(dir.path(), json!([]));
        assert_eq!(run(&session).unwrap(), 0);

        std::fs::write(dir.path().join("policy.cf"), "bundle agent main {}\n").unwrap();
        write_project(
            dir.path(),
            json!([
                {"name": "./policy.cf", "added_by": "cfbs add", "steps": ["copy ./policy.cf services/cfbs/policy.cf"]},
                {
                    "name": "autorun",
                    "version": "1.0.1",
                    "repo": "https://github.com/cfengine/modules",
                    "commit": "c3b7329b240cf7ad062a0a64ee8b607af2cb912a",
                    "added_by": "cfbs add",
                    "steps": ["json def.json def.json"]
                }
            ]),
        );
        assert_eq!(run(&session).unwrap(), 0);

        write_project(dir.path(), json!([{"name": "broken", "steps": []}]));
        assert_eq!(run(&session).unwrap(), 1);
    }
}
