use std::path::{Path, PathBuf};

use anyhow::Result;

use cfbs_core::constants::CFBS_FILE;
use cfbs_core::{CfbsError, CfbsJson, Settings};
use cfbs_git::Identity;

use crate::prompts::Prompter;

/// Everything a command needs besides its own arguments.
#[derive(Debug)]
pub struct Session {
    /// Directory holding `cfbs.json`.
    pub root: PathBuf,
    pub settings: Settings,
    pub prompter: Prompter,
    /// Index location overriding the project's `index` key.
    pub index: Option<String>,
    /// `--git yes|no`, `None` when not given.
    pub git: Option<bool>,
    pub identity: Identity,
    pub commit_message: Option<String>,
    pub force: bool,
    pub check: bool,
    pub checksum: Option<String>,
    pub keep_order: bool,
    pub ignore_versions: bool,
    pub masterfiles: Option<String>,
}

impl Session {
    pub fn new(root: PathBuf, settings: Settings, non_interactive: bool) -> Self {
        Self {
            root,
            settings,
            prompter: Prompter::new(non_interactive),
            index: None,
            git: None,
            identity: Identity::default(),
            commit_message: None,
            force: false,
            check: false,
            checksum: None,
            keep_order: false,
            ignore_versions: false,
            masterfiles: None,
        }
    }

    pub fn non_interactive(&self) -> bool {
        self.prompter.non_interactive()
    }

    pub fn cfbs_path(&self) -> PathBuf {
        self.root.join(CFBS_FILE)
    }

    pub fn is_cfbs_repo(&self) -> bool {
        self.cfbs_path().is_file()
    }

    /// Resolves a path given on the command line against the project root.
    pub fn path(&self, relative: impl AsRef<Path>) -> PathBuf {
        self.root.join(relative)
    }

    /// Loads `cfbs.json`, or an empty project when there is none.
    pub fn load_config(&self) -> Result<CfbsJson> {
        CfbsJson::load(&self.cfbs_path(), self.index.as_deref(), &self.settings)
    }

    /// Fails outside a project.
    pub fn require_repo(&self) -> Result<()> {
        if !self.is_cfbs_repo() {
            return Err(CfbsError::user(
                "This is not a cfbs repo, to get started, type: cfbs init",
            )
            .into());
        }
        Ok(())
    }

    /// Loads `cfbs.json`, failing outside a project.
    pub fn require_config(&self) -> Result<CfbsJson> {
        self.require_repo()?;
        self.load_config()
    }
}
