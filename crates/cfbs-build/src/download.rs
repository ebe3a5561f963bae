//! Fetching modules into the download cache and staging them under `out/steps`.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, info, instrument};

use cfbs_core::constants::{archive_suffix, CFBS_FILE, OUT_STEPS};
use cfbs_core::module::is_commit_hash;
use cfbs_core::{CfbsError, CfbsJson, Module, Settings};

use crate::fetch::fetch_url;
use crate::fsutil::{cp, pad_right, rm};
use crate::process::run_argv;

/// A module copied into its own directory under `out/steps`.
#[derive(Debug, Clone)]
pub struct StagedModule {
    pub module: Module,
    pub directory: PathBuf,
    pub counter: usize,
}

/// Options of a download run.
#[derive(Debug, Clone, Copy, Default)]
pub struct DownloadOptions {
    /// Throw away cached copies first.
    pub redownload: bool,
    /// Clone repositories instead of using release archives.
    pub ignore_versions: bool,
}

/// The cache-relative location of a URL: no scheme, user, or `.git` suffix.
pub fn url_path(url: &str) -> String {
    let rest = url.split_once("://").map_or(url, |(_, rest)| rest);
    let rest = rest.split_once('@').map_or(rest, |(user, host)| {
        if user.contains('/') {
            rest
        } else {
            host
        }
    });
    let rest = rest.trim_start_matches('/');
    rest.strip_suffix(".git").unwrap_or(rest).to_string()
}

/// Directory a module's `commit` is downloaded to.
pub fn download_path(downloads: &Path, module: &Module) -> Result<PathBuf> {
    let commit = module.commit.as_deref().ok_or_else(|| {
        CfbsError::exit(format!("module {} must have a commit property", module.name))
    })?;
    if !is_commit_hash(commit) {
        return Err(CfbsError::exit(format!("'{commit}' is not a commit reference")).into());
    }
    let url = module.source_url().ok_or_else(|| {
        CfbsError::exit(format!("module {} must have a repo or url", module.name))
    })?;
    let path = url_path(url);
    let base = match archive_suffix(url) {
        Some(_) => Path::new(&path)
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default(),
        None => PathBuf::from(path),
    };
    Ok(downloads.join(base).join(commit))
}

fn clone_and_checkout(url: &str, target: &Path, commit: &str) -> Result<()> {
    if target.exists() {
        debug!("{} already cloned", target.display());
        return Ok(());
    }
    cfbs_git::clone(url, target)?;
    cfbs_git::checkout(target, commit)
}

/// Clones `url[@commit]` into the cache.
///
/// Returns the path of the repository's `cfbs.json` and the commit it is at.
#[instrument(skip(downloads))]
pub fn clone_url_repo(downloads: &Path, repo_url: &str) -> Result<(PathBuf, String)> {
    let (url, commit) = match repo_url.rsplit_once('@') {
        Some((url, commit)) if repo_url.rfind('@') > repo_url.rfind('.') => {
            if !is_commit_hash(commit) {
                return Err(CfbsError::exit(format!("'{commit}' is not a commit reference")).into());
            }
            (url, Some(commit.to_string()))
        }
        _ => (repo_url, None),
    };

    let repo_dir = downloads.join(url_path(url));
    fs::create_dir_all(&repo_dir)
        .with_context(|| format!("failed to create '{}'", repo_dir.display()))?;

    let (commit, commit_path) = match commit {
        Some(commit) => {
            let commit_path = repo_dir.join(&commit);
            clone_and_checkout(url, &commit_path, &commit)?;
            (commit, commit_path)
        }
        None => {
            let head_path = repo_dir.join("master");
            rm(&head_path)?;
            cfbs_git::clone(url, &head_path)?;
            let commit = cfbs_git::head_commit(&head_path)?;
            let commit_path = repo_dir.join(&commit);
            if commit_path.exists() {
                rm(&head_path)?;
            } else {
                fs::rename(&head_path, &commit_path).with_context(|| {
                    format!("failed to move clone to '{}'", commit_path.display())
                })?;
            }
            (commit, commit_path)
        }
    };

    let json_path = commit_path.join(CFBS_FILE);
    if !json_path.is_file() {
        return Err(CfbsError::exit(format!(
            "Repository '{url}' doesn't contain a valid cfbs.json index file"
        ))
        .into());
    }
    Ok((json_path, commit))
}

fn extract(archive: &Path, suffix: &str, into: &Path) -> Result<()> {
    let archive = archive.to_string_lossy();
    if suffix == ".zip" {
        run_argv(into, &["unzip", "-q", &archive])
    } else {
        run_argv(into, &["tar", "-xf", &archive])
    }
}

/// Moves the contents of a lone top-level directory holding `cfbs.json` up one level.
fn flatten_single_directory(content_dir: &Path) -> Result<()> {
    let entries: Vec<PathBuf> = fs::read_dir(content_dir)?
        .filter_map(|e| e.ok().map(|e| e.path()))
        .collect();
    let [only] = entries.as_slice() else {
        return Ok(());
    };
    if !only.is_dir() || !only.join(CFBS_FILE).exists() {
        return Ok(());
    }
    for item in fs::read_dir(only)? {
        let item = item?;
        fs::rename(item.path(), content_dir.join(item.file_name()))?;
    }
    fs::remove_dir(only)?;
    Ok(())
}

/// Fetches and unpacks an archive into the download cache.
///
/// Unpacks into `directory` when given, else into a directory named after the
/// archive's digest. With `with_index` the archive must provide a `cfbs.json`,
/// whose path is returned; otherwise the content directory is returned.
#[instrument(skip(downloads))]
pub fn fetch_archive(
    downloads: &Path,
    url: &str,
    checksum: Option<&str>,
    directory: Option<&Path>,
    with_index: bool,
) -> Result<(PathBuf, String)> {
    let suffix = archive_suffix(url)
        .ok_or_else(|| CfbsError::Programmer(format!("'{url}' is not a supported archive")))?;
    let relative = PathBuf::from(url_path(url));
    let archive_dir = downloads.join(relative.parent().unwrap_or(Path::new("")));
    fs::create_dir_all(&archive_dir)
        .with_context(|| format!("failed to create '{}'", archive_dir.display()))?;
    let file_name = relative.file_name().unwrap_or_default();
    let archive_path = archive_dir.join(file_name);

    let digest = fetch_url(url, &archive_path, checksum)
        .map_err(|e| CfbsError::user(e.to_string()))?;

    let content_dir = match directory {
        Some(dir) => dir.to_path_buf(),
        None => archive_dir.join(&digest),
    };
    let index_path = content_dir.join(CFBS_FILE);
    if with_index && index_path.exists() {
        rm(&archive_path)?;
        return Ok((index_path, digest));
    }
    fs::create_dir_all(&content_dir)
        .with_context(|| format!("failed to create '{}'", content_dir.display()))?;

    extract(&archive_path, suffix, &content_dir)?;
    rm(&archive_path)?;

    if with_index {
        flatten_single_directory(&content_dir)?;
        if !index_path.exists() {
            return Err(CfbsError::user(format!(
                "Archive '{url}' doesn't contain a valid cfbs.json index file"
            ))
            .into());
        }
        return Ok((index_path, digest));
    }
    Ok((content_dir, digest))
}

/// Stages a `./` module from the project into `out/steps`.
pub fn local_module_copy(
    root: &Path,
    module: &Module,
    counter: usize,
    max_length: usize,
) -> Result<StagedModule> {
    let name = &module.name;
    let source = root.join(name);
    if !source.exists() {
        return Err(CfbsError::exit(format!(
            "Module '{name}' does not exist, expected a local file or directory"
        ))
        .into());
    }
    let pretty_name = name.trim_start_matches("./").trim_end_matches('/');
    let directory = root
        .join(OUT_STEPS)
        .join(format!("{counter:03}_{}_local", pretty_name.replace('/', "_")));
    if source.is_dir() {
        cp(&source, &directory)?;
    } else {
        cp(&source, &directory.join(pretty_name))?;
    }
    println!(
        "{counter:03} {} @ local (Copied)",
        pad_right(pretty_name, max_length)
    );
    Ok(StagedModule {
        module: module.clone(),
        directory,
        counter,
    })
}

fn missing_subdirectory(module: &Module, url: &str, what: &str) -> anyhow::Error {
    CfbsError::exit(format!(
        "Subdirectory '{}' for module '{}' was not found in {what} '{url}': \
         Please check cfbs.json for possible typos.",
        module.subdirectory.as_deref().unwrap_or_default(),
        module.name
    ))
    .into()
}

fn download_module(
    config: &CfbsJson,
    settings: &Settings,
    module: &Module,
    commit_dir: &Path,
    options: DownloadOptions,
) -> Result<()> {
    let commit = module.commit.as_deref().unwrap_or_default();
    let url = module.source_url().unwrap_or_default();
    let url = url.strip_suffix(".git").unwrap_or(url);
    let downloads = settings.downloads_dir();
    let has_subdirectory = module.subdirectory.is_some();

    if archive_suffix(url).is_some() {
        if commit_dir.exists() && has_subdirectory {
            return Err(missing_subdirectory(module, url, "fetched archive"));
        }
        fetch_archive(&downloads, url, Some(commit), Some(commit_dir), false)?;
    } else if module.extra.contains_key("index") || module.url.is_some() || options.ignore_versions
    {
        if commit_dir.exists() && has_subdirectory {
            return Err(missing_subdirectory(module, url, "cloned repository"));
        }
        cfbs_git::clone(url, commit_dir)?;
        cfbs_git::checkout(commit_dir, commit)?;
    } else {
        let versions = config.index.versions().map_err(|_| {
            CfbsError::exit(
                "Downloading CFEngine Build Module Index failed - check your Wi-Fi / network settings.",
            )
        })?;
        let checksum = module
            .version
            .as_deref()
            .and_then(|version| versions.get(&module.name, version))
            .and_then(|entry| entry.archive_sha256.clone())
            .ok_or_else(|| {
                CfbsError::exit(format!(
                    "Cannot verify checksum of the '{}' module",
                    module.name
                ))
            })?;
        let archive_url = format!(
            "{}/{}/{commit}.tar.gz",
            settings.modules_url.trim_end_matches('/'),
            module.name
        );
        fetch_archive(&downloads, &archive_url, Some(&checksum), Some(commit_dir), false)?;
    }
    Ok(())
}

/// Downloads every module of the build into the cache and stages it.
#[instrument(skip_all)]
pub fn download_dependencies(
    root: &Path,
    config: &CfbsJson,
    settings: &Settings,
    options: DownloadOptions,
) -> Result<Vec<StagedModule>> {
    println!("\nModules:");
    let max_length = config.longest_module_key_length("name");
    let downloads = settings.downloads_dir();
    let mut staged = Vec::new();

    for (i, module) in config.build().iter().enumerate() {
        let counter = i + 1;
        if module.is_local() {
            staged.push(local_module_copy(root, module, counter, max_length)?);
            continue;
        }

        let commit_dir = download_path(&downloads, module)?;
        let commit = module.commit.as_deref().unwrap_or_default();
        if options.redownload {
            rm(&commit_dir)?;
        }
        let module_dir = match &module.subdirectory {
            Some(sub) => commit_dir.join(sub),
            None => commit_dir.clone(),
        };
        if !module_dir.exists() {
            info!("downloading {} @ {commit}", module.name);
            download_module(config, settings, module, &commit_dir, options)?;
        }
        if !module_dir.exists() {
            let url = module.source_url().unwrap_or_default();
            return Err(missing_subdirectory(module, url, "download"));
        }

        let directory = root
            .join(OUT_STEPS)
            .join(format!("{counter:03}_{}_{commit}", module.name));
        cp(&module_dir, &directory)?;
        println!(
            "{counter:03} {} @ {commit} (Downloaded)",
            pad_right(&module.name, max_length)
        );
        staged.push(StagedModule {
            module: module.clone(),
            directory,
            counter,
        });
    }
    Ok(staged)
}
