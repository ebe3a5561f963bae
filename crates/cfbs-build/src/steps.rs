//! Execution of module build steps into `out/masterfiles`.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde_json::{json, Map, Value};
use tracing::{debug, instrument, warn};

use cfbs_core::constants::{INPUT_FILE, OUT_DIR, OUT_MASTERFILES, OUT_STEPS};
use cfbs_core::input::{augment_from_input, InputEntry};
use cfbs_core::json::{merge_json, read_json, write_json, Overwrite};
use cfbs_core::pretty::pretty;
use cfbs_core::{BuildStep, CfbsError, CfbsJson, Module, StepKind};

use crate::download::StagedModule;
use crate::fsutil::{cp, find_files, pad_right, rm};
use crate::process::{run_argv, sh};

/// Recreates `out/` with empty `masterfiles` and `steps` directories.
pub fn init_out_folder(root: &Path) -> Result<()> {
    rm(&root.join(OUT_DIR))?;
    for dir in [OUT_MASTERFILES, OUT_STEPS] {
        let path = root.join(dir);
        fs::create_dir_all(&path)
            .with_context(|| format!("failed to create '{}'", path.display()))?;
    }
    Ok(())
}

/// Parses every step of every module, failing on the first bad one.
pub fn validate_steps(build: &[Module]) -> Result<()> {
    for module in build {
        for step in module.steps() {
            step.parse::<BuildStep>().map_err(|e| {
                CfbsError::user(format!("Module '{}': {e}", module.name))
            })?;
        }
    }
    Ok(())
}

fn as_object(value: Option<Value>) -> Map<String, Value> {
    match value {
        Some(Value::Object(map)) => map,
        _ => Map::new(),
    }
}

/// Merges `augment` into the JSON object stored at `path`.
fn merge_into_file(path: &Path, augment: &Map<String, Value>) -> Result<()> {
    let original = as_object(read_json(path)?);
    let rendered = pretty(&Value::Object(augment.clone()));
    debug!("merging into {}: {rendered}", path.display());
    let mut report = |key: &str, stack: &[String], reason: Overwrite| {
        let location = stack
            .iter()
            .map(String::as_str)
            .chain(std::iter::once(key))
            .collect::<Vec<_>>()
            .join(".");
        match reason {
            Overwrite::TypeMismatch => {
                warn!("'{location}' in {} replaced by a value of another type", path.display())
            }
            Overwrite::Primitive => {
                debug!("'{location}' in {} overwritten", path.display())
            }
        }
    };
    let merged = merge_json(&original, augment, &mut report);
    write_json(path, &Value::Object(merged))
}

/// `.` and `./` as a destination mean the root of `masterfiles`.
fn destination_arg(arg: &str) -> &str {
    match arg {
        "." | "./" => "",
        other => other,
    }
}

struct StepRunner<'a> {
    root: &'a Path,
    destination: PathBuf,
    staged: &'a StagedModule,
    prefix: String,
}

impl StepRunner<'_> {
    fn source(&self, arg: &str) -> PathBuf {
        self.staged.directory.join(arg)
    }

    fn def_json(&self) -> PathBuf {
        self.destination.join("def.json")
    }

    fn run(&self, step: &BuildStep) -> Result<()> {
        let args = &step.args;
        match step.kind {
            StepKind::Copy => {
                let dst = destination_arg(&args[1]);
                println!("{} copy '{}' 'masterfiles/{dst}'", self.prefix, args[0]);
                cp(&self.source(&args[0]), &self.destination.join(dst))
            }
            StepKind::Run => {
                let command = args.join(" ");
                println!("{} run '{command}'", self.prefix);
                sh(&command, &self.staged.directory)
            }
            StepKind::Delete => {
                let quoted: Vec<String> = args.iter().map(|f| format!("'{f}'")).collect();
                println!("{} delete {}", self.prefix, quoted.join(" "));
                for file in args {
                    let path = self.source(file);
                    if !rm(&path)? {
                        println!(
                            "Warning: tried to delete '{}' but path did not exist.",
                            path.display()
                        );
                    }
                }
                Ok(())
            }
            StepKind::Json => self.json(&args[0], destination_arg(&args[1])),
            StepKind::Append => {
                let dst = destination_arg(&args[1]);
                println!("{} append '{}' 'masterfiles/{dst}'", self.prefix, args[0]);
                self.append(&self.source(&args[0]), &self.destination.join(dst))
            }
            StepKind::Directory => self.directory(&args[0], destination_arg(&args[1])),
            StepKind::Input => self.input(&args[0], destination_arg(&args[1])),
            StepKind::PolicyFiles => self.policy_files(args),
            StepKind::Bundles => {
                println!("{} bundles '{}'", self.prefix, args.join("' '"));
                let augment = json!({ "vars": { "control_common_bundlesequence_end": args } });
                merge_into_file(&self.def_json(), &as_object(Some(augment)))
            }
            StepKind::ReplaceVersion => self.replace_version(&args[0], &args[1]),
        }
    }

    fn json(&self, src: &str, dst: &str) -> Result<()> {
        println!("{} json '{src}' 'masterfiles/{dst}'", self.prefix);
        let src_path = self.source(src);
        if !src_path.is_file() {
            return Err(CfbsError::user(format!("'{src}' is not a file")).into());
        }
        let extras = as_object(read_json(&src_path)?);
        if extras.is_empty() {
            println!("Warning: '{src}' looks empty, adding nothing");
        }
        merge_into_file(&self.destination.join(dst), &extras)
    }

    fn append(&self, src: &Path, dst: &Path) -> Result<()> {
        let content =
            fs::read(src).with_context(|| format!("failed to read '{}'", src.display()))?;
        if let Some(parent) = dst.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(dst)
            .with_context(|| format!("failed to open '{}'", dst.display()))?;
        file.write_all(&content)
            .with_context(|| format!("failed to append to '{}'", dst.display()))
    }

    /// Copies a directory tree, merging any `def.json` files instead of copying them.
    fn directory(&self, src: &str, dst: &str) -> Result<()> {
        println!("{} directory '{src}' 'masterfiles/{dst}'", self.prefix);
        let src_path = self.source(src);
        let mut merged = as_object(read_json(&self.def_json())?);
        for entry in walkdir::WalkDir::new(&src_path).sort_by_file_name() {
            let entry = entry.with_context(|| format!("failed to walk '{}'", src_path.display()))?;
            if !entry.file_type().is_file() {
                continue;
            }
            if entry.file_name() == "def.json" {
                let extra = as_object(read_json(entry.path())?);
                merged = merge_json(&merged, &extra, &mut |_, _, _| {});
                continue;
            }
            let relative = entry.path().strip_prefix(&src_path)?;
            let target = self.destination.join(dst).join(relative);
            debug!("copying '{}' to '{}'", entry.path().display(), target.display());
            cp(entry.path(), &target)?;
        }
        write_json(&self.def_json(), &Value::Object(merged))
    }

    fn input(&self, src: &str, dst: &str) -> Result<()> {
        println!("{} input '{src}' 'masterfiles/{dst}'", self.prefix);
        let name = &self.staged.module.name;
        let src = match src.strip_prefix(&format!("{name}/")) {
            Some(rest) => {
                warn!("Deprecated 'input' build step behavior - it should be: 'input ./{INPUT_FILE} def.json'");
                format!("./{rest}")
            }
            None => src.to_string(),
        };
        let src_path = self.root.join(name).join(&src);
        if !src_path.is_file() {
            warn!(
                "Did not find input file '{}', please run 'cfbs input {name}' and then 'cfbs build' again",
                src_path.display()
            );
            return Ok(());
        }
        let data = read_json(&src_path)?.unwrap_or(Value::Array(Vec::new()));
        let entries: Vec<InputEntry> = serde_json::from_value(data)
            .with_context(|| format!("invalid input data in '{}'", src_path.display()))?;
        if entries.is_empty() || entries.iter().any(|e| e.response.is_none()) {
            return Err(CfbsError::exit(format!(
                "Input data '{}' is incomplete",
                src_path.display()
            ))
            .into());
        }
        let augment = augment_from_input(&entries)?;
        merge_into_file(&self.destination.join(dst), &augment)
    }

    fn policy_files(&self, args: &[String]) -> Result<()> {
        let mut files = Vec::new();
        for arg in args {
            let file = arg.strip_prefix("./").unwrap_or(arg);
            if file.ends_with(".cf") {
                files.push(file.to_string());
            } else if file.ends_with('/') {
                for found in find_files(&self.destination.join(file), ".cf")? {
                    let relative = found.strip_prefix(&self.destination)?;
                    files.push(relative.to_string_lossy().to_string());
                }
            } else {
                return Err(CfbsError::user(format!(
                    "Unsupported filetype '{file}' for build step 'policy_files': \
                     Expected directory (*/) of policy file (*.cf)"
                ))
                .into());
            }
        }
        println!("{} policy_files '{}'", self.prefix, files.join("' '"));
        merge_into_file(&self.def_json(), &as_object(Some(json!({ "inputs": files }))))
    }

    fn replace_version(&self, to_replace: &str, filename: &str) -> Result<()> {
        println!("{} replace_version '{to_replace}' '{filename}'", self.prefix);
        let module = &self.staged.module;
        let version = module.version.as_deref().ok_or_else(|| {
            CfbsError::user(format!(
                "Module '{}' has no version for the replace_version step",
                module.name
            ))
        })?;
        let path = self.destination.join(filename);
        let content = fs::read_to_string(&path).map_err(|_| {
            CfbsError::user(format!(
                "Failed to read file '{}' for replace_version step",
                path.display()
            ))
        })?;
        let replaced = content.replacen(to_replace, version, 1);
        if replaced == content {
            return Err(CfbsError::user(format!(
                "Failed to replace version in file '{}' - string '{to_replace}' not found",
                path.display()
            ))
            .into());
        }
        fs::write(&path, replaced).with_context(|| format!("failed to write '{}'", path.display()))
    }
}

/// Drops repeated entries from the `inputs` list of `def.json`, keeping the first.
fn dedup_def_json_inputs(path: &Path) -> Result<()> {
    let Some(Value::Object(mut def)) = read_json(path)? else {
        return Ok(());
    };
    let Some(Value::Array(inputs)) = def.get_mut("inputs") else {
        return Ok(());
    };
    let before = inputs.len();
    let mut seen = Vec::new();
    inputs.retain(|input| {
        if seen.contains(input) {
            return false;
        }
        seen.push(input.clone());
        true
    });
    if inputs.len() != before {
        debug!("removed {} duplicate inputs from def.json", before - inputs.len());
        write_json(path, &Value::Object(def))?;
    }
    Ok(())
}

/// Runs the steps of all staged modules and packs `out/masterfiles.tgz`.
#[instrument(skip_all)]
pub fn perform_build(root: &Path, config: &CfbsJson, staged: &[StagedModule]) -> Result<()> {
    if config.build().is_empty() {
        return Err(CfbsError::exit("No 'build' key found in the configuration").into());
    }
    validate_steps(config.build())?;

    println!("\nSteps:");
    let destination = root.join(OUT_MASTERFILES);
    let width = config.longest_module_key_length("name");
    for module in staged {
        let runner = StepRunner {
            root,
            destination: destination.clone(),
            staged: module,
            prefix: format!(
                "{:03} {} :",
                module.counter,
                pad_right(&module.module.name, width)
            ),
        };
        for step in module.module.steps() {
            let step: BuildStep = step.parse().map_err(|e| CfbsError::user(format!("{e}")))?;
            runner
                .run(&step)
                .with_context(|| format!("build step '{step}' of module '{}' failed", module.module.name))?;
        }
    }

    dedup_def_json_inputs(&destination.join("def.json"))?;

    println!("\nGenerating tarball...");
    run_argv(
        &root.join(OUT_DIR),
        &["tar", "-czf", "masterfiles.tgz", "masterfiles"],
    )?;

    println!("\nBuild complete, ready to deploy 🐿");
    println!(" -> Directory: out/masterfiles");
    println!(" -> Tarball:   out/masterfiles.tgz");
    println!();
    println!("To install on this machine: sudo cfbs install");
    println!("To deploy on remote hub(s): cf-remote deploy --hub hub out/masterfiles.tgz");
    Ok(())
}
