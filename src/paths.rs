use anyhow::{Context, Result};
use directories::BaseDirs;
use std::path::{Path, PathBuf};

/// Name of the live directory the Codex CLI reads, relative to home.
pub const CODEX_DIR_NAME: &str = ".codex";

/// All computed paths used by cxprof
#[derive(Debug, Clone)]
pub struct Paths {
    /// ~/.codex
    pub codex_dir: PathBuf,
    /// ~/codex-data
    pub data_dir: PathBuf,
    /// ~/codex-data/accounts
    pub accounts_dir: PathBuf,
    /// ~/codex-data/shared
    pub shared_dir: PathBuf,
    /// ~/codex-data/groups
    pub groups_dir: PathBuf,
    /// ~/codex-data/backups
    pub backups_dir: PathBuf,
    /// ~/.codex-switch
    pub state_dir: PathBuf,
    /// ~/.codex-switch/state.json
    pub state_file: PathBuf,
    /// ~/.codex-switch/sharing.json
    pub sharing_file: PathBuf,
    /// ~/.codex-switch/cxprof.lock
    pub lock_file: PathBuf,
}

impl Paths {
    pub fn new() -> Result<Self> {
        let base_dirs = BaseDirs::new().context("Failed to determine home directory")?;
        Ok(Self::from_home(base_dirs.home_dir()))
    }

    /// Build the full layout under an explicit home directory.
    pub fn from_home(home: &Path) -> Self {
        let data_dir = home.join("codex-data");
        let state_dir = home.join(".codex-switch");

        Self {
            codex_dir: home.join(CODEX_DIR_NAME),
            accounts_dir: data_dir.join("accounts"),
            shared_dir: data_dir.join("shared"),
            groups_dir: data_dir.join("groups"),
            backups_dir: data_dir.join("backups"),
            state_file: state_dir.join("state.json"),
            sharing_file: state_dir.join("sharing.json"),
            lock_file: state_dir.join("cxprof.lock"),
            data_dir,
            state_dir,
        }
    }

    /// Get the snapshot directory of a profile
    pub fn profile_dir(&self, name: &str) -> PathBuf {
        self.accounts_dir.join(name)
    }

    /// Get the shared root of a sharing group
    pub fn group_dir(&self, group: &str) -> PathBuf {
        self.groups_dir.join(group)
    }

    pub fn codex_exists(&self) -> bool {
        self.codex_dir.is_dir()
    }

    /// Check if a path points somewhere inside the cxprof data directory
    pub fn is_in_data_dir(&self, path: &Path) -> bool {
        path.starts_with(&self.data_dir)
    }

    /// Ensure the storage root, state directory and accounts root exist
    pub fn ensure_dirs(&self) -> Result<()> {
        for dir in [&self.data_dir, &self.state_dir, &self.accounts_dir] {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create directory: {}", dir.display()))?;
        }
        Ok(())
    }
}
