use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::debug;

use crate::constants::{
    DEFAULT_INDEX_URL, DEFAULT_MODULES_URL, DEFAULT_VERSIONS_URL, MASTERFILES_REMOTE,
};

/// Environment variable pointing at an alternative settings file.
pub const SETTINGS_ENV: &str = "CFBS_SETTINGS";

/// User level settings, read from `~/.cfengine/cfbs/settings.toml`.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    pub index_url: String,
    pub versions_url: String,
    pub modules_url: String,
    pub masterfiles_remote: String,
    pub cache_dir: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            index_url: DEFAULT_INDEX_URL.to_string(),
            versions_url: DEFAULT_VERSIONS_URL.to_string(),
            modules_url: DEFAULT_MODULES_URL.to_string(),
            masterfiles_remote: MASTERFILES_REMOTE.to_string(),
            cache_dir: None,
        }
    }
}

impl Settings {
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read settings file: {}", path.display()))?;
        let settings = toml::from_str::<Self>(&text)
            .with_context(|| format!("failed to parse TOML settings: {}", path.display()))?;
        Ok(settings)
    }

    /// Loads settings from `$CFBS_SETTINGS` or the default location.
    ///
    /// A missing file is not an error; defaults are used instead.
    pub fn load() -> Result<Self> {
        let path = match std::env::var_os(SETTINGS_ENV) {
            Some(p) => PathBuf::from(p),
            None => cfengine_dir().join("cfbs").join("settings.toml"),
        };
        if !path.is_file() {
            debug!("no settings file at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        Self::load_from_file(&path)
    }

    /// Root of the cfbs cache, `~/.cfengine/cfbs` unless overridden.
    pub fn cache_dir(&self) -> PathBuf {
        match &self.cache_dir {
            Some(dir) => dir.clone(),
            None => cfengine_dir().join("cfbs"),
        }
    }

    pub fn downloads_dir(&self) -> PathBuf {
        self.cache_dir().join("downloads")
    }
}

/// `~/.cfengine`, falling back to the current directory without a home.
pub fn cfengine_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".cfengine")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.toml");
        std::fs::write(&path, "index_url = \"/srv/index.json\"\ncache_dir = \"/tmp/cfbs\"\n")
            .unwrap();

        let settings = Settings::load_from_file(&path).unwrap();
        assert_eq!(settings.index_url, "/srv/index.json");
        assert_eq!(settings.versions_url, DEFAULT_VERSIONS_URL);
        assert_eq!(settings.downloads_dir(), PathBuf::from("/tmp/cfbs/downloads"));
    }

    #[test]
    fn rejects_malformed_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.toml");
        std::fs::write(&path, "index_url = [").unwrap();
        assert!(Settings::load_from_file(&path).is_err());
    }
}
