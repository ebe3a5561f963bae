use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use indexmap::IndexMap;
use regex::Regex;
use tracing::debug;

use cfbs_build::download::{clone_url_repo, fetch_archive};
use cfbs_core::constants::{archive_suffix, is_supported_uri};
use cfbs_core::module::{is_local_module, is_module_added_manually};
use cfbs_core::{AddReport, CfbsError, CfbsJson, Module, ModuleRef};

use crate::commands::input::write_module_input;
use crate::git_magic::{change_summary, Outcome};
use crate::session::Session;

/// Adds modules by name, local path, or from a repository/archive URL.
///
/// A URL must come first; the names after it select which of the modules it
/// provides are added.
pub fn run(session: &mut Session, to_add: &[String], added_by: &str) -> Result<Outcome> {
    if to_add.is_empty() {
        return Err(CfbsError::user("Must specify at least one module to add").into());
    }
    let mut config = session.require_config()?;
    config.warn_about_unknown_keys();

    let before: Vec<String> = config.build().iter().map(|m| m.name.clone()).collect();
    let first = &to_add[0];
    let remarked = if archive_suffix(first).is_some() || is_supported_uri(first) {
        add_using_url(session, &mut config, first, &to_add[1..], added_by)?;
        Vec::new()
    } else {
        add_modules(session, &mut config, to_add, added_by)?
    };
    let added: Vec<String> = config
        .build()
        .iter()
        .map(|m| m.name.clone())
        .filter(|name| !before.contains(name))
        .collect();

    let mut files = Vec::new();
    for name in &added {
        let Some(module) = config.get_module_from_build(name) else {
            continue;
        };
        if module.input.is_none() {
            continue;
        }
        let question =
            format!("The added module '{name}' accepts input. Do you want to add it now?");
        if session.prompter.yes_no(&question, false)? {
            let module = module.clone();
            if let Some(path) = write_module_input(session, &module)? {
                files.push(path);
            }
        }
    }
    config.save()?;

    if added.is_empty() && remarked.is_empty() {
        return Ok(Outcome::unchanged(0));
    }
    let message = add_message(&added, &remarked, added_by);
    Ok(Outcome::changed(Some(message), files))
}

/// Commit message details listing the added modules and those now added
/// by `added_by` instead of as a dependency.
fn add_message(added: &[String], remarked: &[String], added_by: &str) -> String {
    let mut changes: Vec<String> = added
        .iter()
        .map(|name| format!("Added module '{name}'"))
        .collect();
    changes.extend(
        remarked
            .iter()
            .map(|name| format!("Module '{name}' is now added by '{added_by}'")),
    );
    let heading = if remarked.is_empty() {
        format!("Added {} modules", added.len())
    } else {
        format!("Changed {} modules", changes.len())
    };
    change_summary(&heading, &changes)
}

pub(crate) fn print_report(report: &AddReport) {
    for name in &report.skipped {
        println!("Skipping already added module '{name}'");
    }
    for added in &report.added {
        match &added.dependency_of {
            Some(parent) => println!("Added module: {} (Dependency of {parent})", added.name),
            None => println!("Added module: {}", added.name),
        }
    }
}

/// `foo.cf` or `policies/` naming an existing path is taken as `./foo.cf`.
fn local_name(session: &Session, text: &str) -> String {
    let looks_local = text.ends_with(".cf") || text.ends_with(".json") || text.ends_with('/');
    if !is_local_module(text) && looks_local && session.path(text).exists() {
        format!("./{text}")
    } else {
        text.to_string()
    }
}

fn add_modules(
    session: &mut Session,
    config: &mut CfbsJson,
    to_add: &[String],
    added_by: &str,
) -> Result<Vec<String>> {
    let mut wanted = Vec::new();
    for text in to_add {
        let mut module = ModuleRef::parse(&local_name(session, text));
        if is_local_module(&module.name) {
            if !session.path(&module.name).exists() {
                return Err(CfbsError::user(format!("Could not find '{}'", module.name)).into());
            }
            wanted.push(module);
            continue;
        }
        config.index.translate_alias(&mut module)?;
        if !config.index.exists(&module)? {
            return Err(CfbsError::exit(format!("Module '{module}' does not exist")).into());
        }
        wanted.push(module);
    }

    // Asking for a module that came in as a dependency makes it a manual addition.
    let mut remarked = Vec::new();
    for module in &wanted {
        if let Some(existing) = config.get_module_from_build_mut(&module.name) {
            if let Some(by) = existing.added_by.as_deref().filter(|by| !is_module_added_manually(by)) {
                debug!("module '{}' was added by '{by}', now by '{added_by}'", module.name);
                existing.added_by = Some(added_by.to_string());
                remarked.push(module.name.clone());
            }
        }
    }

    let mut report = AddReport::default();
    for module in wanted {
        if config.module_is_in_build(&module.name) {
            report.skipped.push(module.name);
            continue;
        }
        let object = if is_local_module(&module.name) {
            local_module_object(session, &module.name, added_by)?
        } else {
            config
                .index
                .get_module_object(&module, Some(added_by))?
                .ok_or_else(|| CfbsError::exit(format!("Module '{module}' does not exist")))?
        };
        config.add_with_dependencies(object, None, &mut report)?;
    }
    print_report(&report);
    Ok(remarked)
}

fn add_using_url(
    session: &mut Session,
    config: &mut CfbsJson,
    url: &str,
    to_add: &[String],
    added_by: &str,
) -> Result<()> {
    let downloads = session.settings.downloads_dir();
    let (config_path, commit) = if archive_suffix(url).is_some() {
        fetch_archive(&downloads, url, session.checksum.as_deref(), None, true)?
    } else {
        clone_url_repo(&downloads, url)?
    };
    let url = match url.rsplit_once('@') {
        Some((base, _)) if url.rfind('@') > url.rfind('.') => base,
        _ => url,
    };

    let remote = CfbsJson::load(&config_path, None, &session.settings)?.with_origin(url, &commit);
    let provides = remote.get_provides(added_by)?;
    let names = if to_add.is_empty() {
        choose_provided(session, url, &provides)?
    } else {
        to_add.to_vec()
    };

    let missing: Vec<&str> = names
        .iter()
        .filter(|name| !provides.contains_key(name.as_str()))
        .map(String::as_str)
        .collect();
    if !missing.is_empty() {
        let available: Vec<&str> = provides.keys().map(String::as_str).collect();
        return Err(CfbsError::exit(format!(
            "Missing modules: {}. Available modules in '{url}': {}",
            missing.join(", "),
            available.join(", ")
        ))
        .into());
    }

    let mut report = AddReport::default();
    for name in names {
        if let Some(module) = provides.get(&name) {
            config.add_with_dependencies(module.clone(), Some(&remote), &mut report)?;
        }
    }
    print_report(&report);
    Ok(())
}

fn choose_provided(
    session: &mut Session,
    url: &str,
    provides: &IndexMap<String, Module>,
) -> Result<Vec<String>> {
    let all: Vec<String> = provides.keys().cloned().collect();
    if provides.len() < 2 || session.non_interactive() {
        return Ok(all);
    }
    println!("Found {} modules in '{url}':", provides.len());
    for (name, module) in provides {
        println!(" - {name}: {}", module.description.as_deref().unwrap_or_default());
    }
    let question = format!("Do you want to add all {} of them?", provides.len());
    if session.prompter.yes_no(&question, true)? {
        return Ok(all);
    }
    let mut chosen = Vec::new();
    for name in all {
        if session.prompter.yes_no(&format!("Do you want to add '{name}'?"), true)? {
            chosen.push(name);
        }
    }
    Ok(chosen)
}

fn bundle_names(policy: &str) -> Result<Vec<String>> {
    let re = Regex::new(r"(?m)^\s*bundle\s+agent\s+([\w.:]+)")?;
    Ok(re
        .captures_iter(policy)
        .map(|c| c[1].to_string())
        .collect())
}

/// Describes a local policy file, directory or augments file as a module.
pub fn local_module_object(session: &mut Session, name: &str, added_by: &str) -> Result<Module> {
    let path = session.path(name);
    let relative = name.trim_start_matches("./");
    let (kind, steps) = if path.is_dir() {
        let target = relative.trim_end_matches('/');
        (
            "subdirectory",
            vec![format!("directory ./ services/cfbs/{target}/")],
        )
    } else if name.ends_with(".cf") {
        let target = format!("services/cfbs/{relative}");
        let mut steps = vec![
            format!("copy {name} {target}"),
            format!("policy_files {target}"),
        ];
        let bundles = bundles_to_run(session, &path)?;
        if !bundles.is_empty() {
            steps.push(format!("bundles {}", bundles.join(" ")));
        }
        ("policy file", steps)
    } else if name.ends_with(".json") {
        ("augments file", vec![format!("json {name} def.json")])
    } else {
        return Err(CfbsError::user(format!(
            "Unsupported local module '{name}': expected a .cf file, a .json file or a directory"
        ))
        .into());
    };

    Ok(Module {
        name: name.to_string(),
        description: Some(format!("Local {kind} added using cfbs command line")),
        tags: Some(vec!["local".to_string()]),
        steps: Some(steps),
        added_by: Some(added_by.to_string()),
        ..Module::default()
    })
}

fn bundles_to_run(session: &mut Session, path: &Path) -> Result<Vec<String>> {
    let policy = fs::read_to_string(path)
        .with_context(|| format!("failed to read '{}'", path.display()))?;
    let bundles = bundle_names(&policy)?;
    let default = bundles.len() == 1;
    let mut chosen = Vec::new();
    for bundle in bundles {
        let question = format!("Do you want to add '{bundle}' to the end of the bundlesequence?");
        if session.prompter.yes_no(&question, default)? {
            chosen.push(bundle);
        }
    }
    Ok(chosen)
}
