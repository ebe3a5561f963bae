use std::path::PathBuf;

use anyhow::Result;

use cfbs_build::fsutil::{cp, rm};
use cfbs_build::{download_dependencies, init_out_folder, perform_build, DownloadOptions};
use cfbs_core::constants::OUT_MASTERFILES;
use cfbs_core::CfbsError;

use crate::commands::validate::validate_with_warning;
use crate::session::Session;

/// `cfbs download`: fetches every module of the build into the cache.
pub fn download(session: &Session) -> Result<i32> {
    session.require_repo()?;
    validate_with_warning(session)?;
    let config = session.require_config()?;
    let options = DownloadOptions {
        redownload: session.force,
        ignore_versions: session.ignore_versions,
    };
    download_dependencies(&session.root, &config, &session.settings, options)?;
    Ok(0)
}

/// `cfbs build`: stages all modules and assembles `out/masterfiles`.
pub fn build(session: &Session) -> Result<i32> {
    session.require_repo()?;
    validate_with_warning(session)?;
    let config = session.require_config()?;
    init_out_folder(&session.root)?;
    let options = DownloadOptions {
        redownload: false,
        ignore_versions: session.ignore_versions,
    };
    let staged = download_dependencies(&session.root, &config, &session.settings, options)?;
    perform_build(&session.root, &config, &staged)?;
    Ok(0)
}

#[cfg(unix)]
fn running_as_root() -> bool {
    // SAFETY: getuid has no preconditions and always succeeds.
    unsafe { libc::getuid() == 0 }
}

#[cfg(not(unix))]
fn running_as_root() -> bool {
    false
}

fn default_destination() -> Result<String> {
    if running_as_root() {
        return Ok("/var/cfengine/masterfiles".to_string());
    }
    let home = dirs::home_dir()
        .ok_or_else(|| CfbsError::user("Cannot determine the home directory"))?;
    Ok(home.join(".cfagent/inputs").to_string_lossy().into_owned())
}

/// `cfbs install`: copies the built policy set to `destination`, building
/// first when needed.
pub fn install(session: &Session, destination: &[String]) -> Result<i32> {
    if destination.len() > 1 {
        return Err(CfbsError::exit(
            "Only one destination is allowed for command: cfbs install [destination]",
        )
        .into());
    }
    let masterfiles = session.path(OUT_MASTERFILES);
    if !masterfiles.exists() {
        let rc = build(session)?;
        if rc != 0 {
            return Ok(rc);
        }
    }

    let mut destination = match destination.first() {
        Some(destination) => destination.clone(),
        None => default_destination()?,
    };
    if !destination.starts_with('/') && !destination.starts_with("./") {
        destination = format!("./{destination}");
    }
    let target: PathBuf = session.path(&destination);
    rm(&target)?;
    cp(&masterfiles, &target)?;
    println!("Installed to {destination}");
    Ok(0)
}
