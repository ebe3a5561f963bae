use anyhow::Result;
use indexmap::IndexMap;

use cfbs_core::Module;

use crate::session::Session;

#[derive(Debug, Default, PartialEq, Eq)]
struct Found {
    description: String,
    aliases: Vec<String>,
}

/// Index entries grouped by real name, optionally filtered by substrings of
/// the name or one of its aliases.
fn search(index: &IndexMap<String, Module>, terms: &[String]) -> IndexMap<String, Found> {
    let mut results: IndexMap<String, Found> = IndexMap::new();
    for (name, module) in index {
        match &module.alias {
            Some(target) => results
                .entry(target.clone())
                .or_default()
                .aliases
                .push(name.clone()),
            None => {
                results.entry(name.clone()).or_default().description =
                    module.description.clone().unwrap_or_default();
            }
        }
    }
    if terms.is_empty() {
        return results;
    }
    results.retain(|name, found| {
        terms.iter().any(|term| {
            name.contains(term.as_str()) || found.aliases.iter().any(|a| a.contains(term.as_str()))
        })
    });
    results
}

pub fn run(session: &Session, terms: &[String]) -> Result<i32> {
    let config = session.load_config()?;
    let results = search(config.index.modules()?, terms);
    for (name, found) in &results {
        if found.aliases.is_empty() {
            println!("{name} - {}", found.description);
        } else {
            println!("{name} ({}) - {}", found.aliases.join(", "), found.description);
        }
    }
    Ok(if results.is_empty() { 1 } else { 0 })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{inline_index, session_in, write_project};
    use serde_json::json;

    fn index() -> IndexMap<String, Module> {
        let mut modules: IndexMap<String, Module> = serde_json::from_value(inline_index()).unwrap();
        for (name, module) in modules.iter_mut() {
            module.name = name.clone();
        }
        modules
    }

    #[test]
    fn aliases_are_grouped_under_their_target() {
        let results = search(&index(), &[]);
        assert_eq!(results.len(), 4);
        assert_eq!(results["promise-type-git"].aliases, vec!["git"]);
        assert_eq!(results["promise-type-git"].description, "Git promise type");
    }

    #[test]
    fn terms_match_names_and_aliases() {
        let results = search(&index(), &["python".to_string()]);
        assert_eq!(results.keys().collect::<Vec<_>>(), vec!["library-for-promise-types-in-python"]);

        let results = search(&index(), &["git".to_string()]);
        assert_eq!(results.keys().collect::<Vec<_>>(), vec!["promise-type-git"]);
    }

    #[test]
    fn nothing_found_is_an_error_code() {
        let dir = tempfile::tempdir().unwrap();
        write_project(dir.path(), json!([]));
        let session = session_in(dir.path());
        assert_eq!(run(&session, &["autorun".to_string()]).unwrap(), 0);
        assert_eq!(run(&session, &["no-such-thing".to_string()]).unwrap(), 1);
    }
}
