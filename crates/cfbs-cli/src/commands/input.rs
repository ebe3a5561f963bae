use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use anyhow::Result;
use serde_json::Value;
use tracing::{debug, error};

use cfbs_core::constants::INPUT_FILE;
use cfbs_core::input::{ask_for_input, same_shape, InputEntry};
use cfbs_core::json::{read_json, write_json};
use cfbs_core::pretty::pretty;
use cfbs_core::{Module, ModuleRef};

use crate::git_magic::Outcome;
use crate::session::Session;

fn input_path(module_name: &str) -> PathBuf {
    Path::new(module_name).join(INPUT_FILE)
}

/// Asks a module's input questions and writes the answers next to `cfbs.json`.
///
/// Returns the written file relative to the project root.
pub fn write_module_input(session: &mut Session, module: &Module) -> Result<Option<String>> {
    let Some(spec) = &module.input else {
        return Ok(None);
    };
    let mut data = spec.clone();
    ask_for_input(&mut data, &mut session.prompter)?;
    let relative = input_path(&module.name);
    write_json(&session.path(&relative), &serde_json::to_value(&data)?)?;
    Ok(Some(relative.to_string_lossy().into_owned()))
}

/// `cfbs input`: collects input for each named module in the build.
pub fn run(session: &mut Session, modules: &[String]) -> Result<Outcome> {
    let config = session.require_config()?;
    config.warn_about_unknown_keys();

    let mut files = Vec::new();
    for name in modules {
        let Some(module) = config.get_module_from_build(name) else {
            println!("Skipping module '{name}', module not found");
            continue;
        };
        if module.input.is_none() {
            println!("Skipping module '{name}', no input needed");
            continue;
        }
        if session.path(input_path(name)).is_file()
            && !session.prompter.yes_no(
                "Input already exists for this module, do you want to overwrite it?",
                false,
            )?
        {
            continue;
        }
        if let Some(path) = write_module_input(session, module)? {
            files.push(path);
        }
    }

    if files.is_empty() {
        return Ok(Outcome::unchanged(0));
    }
    Ok(Outcome::changed(None, files))
}

/// `cfbs set-input`: stores answers read from `source` after checking they
/// match the module's input definition.
pub fn set(session: &mut Session, name: &str, source: &mut dyn Read) -> Result<Outcome> {
    let config = session.require_config()?;
    config.warn_about_unknown_keys();
    let Some(module) = config.get_module_from_build(name) else {
        error!("Module '{name}' not found");
        return Ok(Outcome::unchanged(1));
    };
    let Some(spec) = &module.input else {
        error!("Module '{name}' does not accept input");
        return Ok(Outcome::unchanged(1));
    };

    let mut text = String::new();
    source.read_to_string(&mut text)?;
    let parsed = serde_json::from_str::<Value>(&text).and_then(|value| {
        let entries = serde_json::from_value::<Vec<InputEntry>>(value.clone())?;
        Ok((value, entries))
    });
    let (value, entries) = match parsed {
        Ok(parsed) => parsed,
        Err(e) => {
            error!("Error reading json from input: {e}");
            return Ok(Outcome::unchanged(1));
        }
    };
    debug!("input data for module '{name}': {}", pretty(&value));

    if !same_shape(spec, &entries) {
        error!("Input data for module '{name}' does not conform with input definition");
        return Ok(Outcome::unchanged(1));
    }

    let relative = input_path(name);
    let path = session.path(&relative);
    let changed = read_json(&path)?.as_ref() != Some(&value);
    if changed {
        debug!("input data for '{name}' changed, writing '{}'", path.display());
        write_json(&path, &value)?;
    } else {
        debug!("input data for '{name}' unchanged");
    }
    Ok(Outcome {
        rc: 0,
        commit: changed,
        msg: None,
        files: vec![relative.to_string_lossy().into_owned()],
    })
}

/// `cfbs get-input`: writes stored answers, or the definition when none exist.
pub fn get(session: &Session, name: &str, out: &mut dyn Write) -> Result<i32> {
    let config = session.require_config()?;
    config.warn_about_unknown_keys();
    let module = match config.get_module_from_build(name) {
        Some(module) => Some(module.clone()),
        None => config.index.get_module_object(&ModuleRef::parse(name), None)?,
    };
    let Some(module) = module else {
        error!("Module '{name}' not found");
        return Ok(1);
    };

    let data = match &module.input {
        None => Value::Array(Vec::new()),
        Some(spec) => match read_json(&session.path(input_path(name)))? {
            Some(stored) => {
                debug!("loaded input for '{name}' from file");
                stored
            }
            None => {
                debug!("loaded input from module '{name}' definition");
                serde_json::to_value(spec)?
            }
        },
    };
    if let Err(e) = writeln!(out, "{}", pretty(&data)) {
        error!("Failed to write json: {e}");
        return Ok(1);
    }
    Ok(0)
}
