//! Session sharing between profiles.
//!
//! When sharing is on, the shareable entries of `~/.codex` are symlinks into a
//! shared root (`~/codex-data/shared`, or `~/codex-data/groups/<group>` in
//! group mode) while `auth.json` and friends stay private to each profile.
//! Turning sharing off copies the shared data back into real files.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::backup::move_to_backups;
use crate::error::ProfileError;
use crate::fs_utils::{copy_path, make_symlink, path_exists, resolve_link};
use crate::items::{ItemStatus, active_items, all_shareable, is_file_item};
use crate::paths::Paths;
use crate::profiles::validate_name;
use crate::state::{ActiveState, OperationLock, write_json_atomic};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SharingMode {
    #[default]
    Disabled,
    Global,
    Group,
}

impl SharingMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disabled => "disabled",
            Self::Global => "global",
            Self::Group => "group",
        }
    }
}

impl fmt::Display for SharingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}


/// Persisted in ~/.codex-switch/sharing.json
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SharingConfig {
    #[serde(default)]
    pub mode: SharingMode,
    #[serde(default)]
    pub include_settings: bool,
    /// account -> group, only consulted in group mode
    #[serde(default)]
    pub groups: BTreeMap<String, String>,
}

impl SharingConfig {
    /// Read the config, falling back to `Disabled` if it is missing or corrupt
    pub fn load(path: &Path) -> Self {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Self::default(),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Unreadable sharing config, sharing treated as disabled");
                return Self::default();
            }
        };

        serde_json::from_str(&content).unwrap_or_else(|e| {
            warn!(path = %path.display(), error = %e, "Corrupt sharing config, sharing treated as disabled");
            Self::default()
        })
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        write_json_atomic(path, self)
    }
}

/// Snapshot of the sharing setup as seen on disk
#[derive(Debug, Clone)]
pub struct SharingStatus {
    pub mode: SharingMode,
    /// Only set in global mode
    pub shared_dir: Option<PathBuf>,
    /// Every known shareable item, mandatory first, in fixed order
    pub items: Vec<(&'static str, ItemStatus)>,
}

/// Reconciles `~/.codex` against the shared root
#[derive(Debug, Clone)]
pub struct SharingManager {
    paths: Paths,
    config: SharingConfig,
}

impl SharingManager {
    /// Build a manager from the config currently on disk
    pub fn load(paths: &Paths) -> Self {
        let config = SharingConfig::load(&paths.sharing_file);
        Self::with_config(paths.clone(), config)
    }

    pub fn with_config(paths: Paths, config: SharingConfig) -> Self {
        Self { paths, config }
    }

    pub fn config(&self) -> &SharingConfig {
        &self.config
    }

    pub fn mode(&self) -> SharingMode {
        self.config.mode
    }

    pub fn is_enabled(&self) -> bool {
        matches!(self.config.mode, SharingMode::Global | SharingMode::Group)
    }

    pub fn save_config(&self) -> Result<()> {
        self.paths.ensure_dirs()?;
        self.config.save(&self.paths.sharing_file)
    }

    /// Share the configured items across all profiles
    pub fn enable(&mut self, include_settings: bool) -> Result<()> {
        self.enable_mode(SharingMode::Global, include_settings)
    }

    /// Share the configured items within each profile's group
    pub fn enable_groups(&mut self, include_settings: bool) -> Result<()> {
        self.enable_mode(SharingMode::Group, include_settings)
    }

    /// Take the operation lock and refresh the config under it
    fn lock_and_reload(&mut self) -> Result<OperationLock> {
        let lock = OperationLock::acquire(&self.paths.lock_file)?;
        self.config = SharingConfig::load(&self.paths.sharing_file);
        Ok(lock)
    }

    fn enable_mode(&mut self, mode: SharingMode, include_settings: bool) -> Result<()> {
        let _lock = self.lock_and_reload()?;

        // Switching between enabled modes retargets every link, so start from real data.
        if self.is_enabled() && (self.config.mode != mode || self.config.include_settings != include_settings) {
            info!(from = %self.config.mode, to = %mode, "Rebuilding shared links for new mode");
            self.remove_symlinks()?;
        }

        let mut next = self.config.clone();
        next.mode = mode;
        next.include_settings = include_settings;
        let next = Self::with_config(self.paths.clone(), next);

        if mode == SharingMode::Global {
            fs::create_dir_all(&self.paths.shared_dir).with_context(|| {
                format!("Failed to create shared directory: {}", self.paths.shared_dir.display())
            })?;
        }

        next.setup_symlinks(self.current_account().as_deref())?;
        next.save_config()?;
        *self = next;

        info!(mode = %mode, include_settings, "Sharing enabled");
        Ok(())
    }

    /// Turn every shared link back into real data and switch sharing off
    pub fn disable(&mut self) -> Result<()> {
        let _lock = self.lock_and_reload()?;

        self.remove_symlinks()?;

        self.config.mode = SharingMode::Disabled;
        self.config.include_settings = false;
        self.save_config()?;

        info!("Sharing disabled");
        Ok(())
    }

    /// Put `account` into `group`; relinks if it is the live account in group mode
    pub fn assign_group(&mut self, account: &str, group: &str) -> Result<()> {
        validate_name(account)?;
        validate_name(group)?;
        let _lock = self.lock_and_reload()?;

        let previous = self
            .config
            .groups
            .insert(account.to_string(), group.to_string());
        self.relink_if_live(account, previous.as_deref() != Some(group))?;
        self.save_config()
    }

    /// Remove `account` from its group; its shared links are materialized if live
    pub fn unassign_group(&mut self, account: &str) -> Result<bool> {
        let _lock = self.lock_and_reload()?;

        let removed = self.config.groups.remove(account).is_some();
        self.relink_if_live(account, removed)?;
        self.save_config()?;
        Ok(removed)
    }

    fn relink_if_live(&self, account: &str, changed: bool) -> Result<()> {
        if !changed || self.config.mode != SharingMode::Group {
            return Ok(());
        }
        if self.current_account().as_deref() != Some(account) {
            return Ok(());
        }

        self.remove_symlinks()?;
        self.setup_symlinks(Some(account))
    }

    fn current_account(&self) -> Option<String> {
        let current = ActiveState::load(&self.paths.state_file).current;
        (!current.is_empty()).then_some(current)
    }

    /// Directory the live items should link into, if any
    pub fn share_target(&self, account: Option<&str>) -> Option<PathBuf> {
        match self.config.mode {
            SharingMode::Global => Some(self.paths.shared_dir.clone()),
            SharingMode::Group => account
                .and_then(|a| self.config.groups.get(a))
                .map(|group| self.paths.group_dir(group)),
            SharingMode::Disabled => None,
        }
    }

    /// Link every configured item of ~/.codex into the share target
    ///
    /// No-op when sharing is disabled, or in group mode when `account` has no
    /// group. Fails with `NotLoggedIn` if there is no live directory to link.
    pub fn setup_symlinks(&self, account: Option<&str>) -> Result<()> {
        if !self.is_enabled() {
            return Ok(());
        }

        let Some(target_dir) = self.share_target(account) else {
            debug!(account = ?account, "No share target for account, leaving links alone");
            return Ok(());
        };

        if !self.paths.codex_exists() {
            return Err(ProfileError::NotLoggedIn(self.paths.codex_dir.clone()).into());
        }

        fs::create_dir_all(&target_dir)
            .with_context(|| format!("Failed to create share target: {}", target_dir.display()))?;

        for item in active_items(self.config.include_settings) {
            self.link_item(item, &target_dir)
                .with_context(|| format!("Failed to set up symlink for {}", item))?;
        }

        debug!(target = %target_dir.display(), "Shared links in place");
        Ok(())
    }

    fn link_item(&self, item: &str, target_dir: &Path) -> Result<()> {
        let live = self.paths.codex_dir.join(item);
        let shared = target_dir.join(item);

        match ItemStatus::detect(&live) {
            ItemStatus::Symlink { target } if resolve_link(&live, &target) == shared => {
                return Ok(());
            }
            ItemStatus::Symlink { .. } | ItemStatus::BrokenSymlink { .. } => {
                fs::remove_file(&live)
                    .with_context(|| format!("Failed to remove stale symlink {}", live.display()))?;
            }
            ItemStatus::Local if !path_exists(&shared) => {
                fs::rename(&live, &shared).with_context(|| {
                    format!("Failed to migrate {} to {}", live.display(), shared.display())
                })?;
                info!(item, to = %shared.display(), "Migrated local data into shared location");
            }
            ItemStatus::Local => {
                // The shared copy wins; the local one is kept aside rather than lost.
                let backup = move_to_backups(&live, &self.paths.backups_dir, item)?;
                warn!(item, backup = ?backup, "Shared copy already exists, local copy moved to backups");
            }
            ItemStatus::Missing => {}
        }

        if !path_exists(&shared) {
            if is_file_item(item) {
                fs::write(&shared, b"")
            } else {
                fs::create_dir_all(&shared)
            }
            .with_context(|| format!("Failed to create {}", shared.display()))?;
        }

        make_symlink(&shared, &live)
    }

    /// Replace every shareable symlink in ~/.codex with a copy of its target
    pub fn remove_symlinks(&self) -> Result<()> {
        for item in all_shareable() {
            let live = self.paths.codex_dir.join(item);
            let target = match ItemStatus::detect(&live) {
                ItemStatus::Symlink { target } | ItemStatus::BrokenSymlink { target } => target,
                _ => continue,
            };
            let source = resolve_link(&live, &target);

            fs::remove_file(&live)
                .with_context(|| format!("Failed to remove symlink {}", live.display()))?;

            if source.exists() {
                copy_path(&source, &live)
                    .with_context(|| format!("Failed to copy shared {} back", item))?;
                debug!(item, from = %source.display(), "Materialized shared item");
            } else {
                warn!(item, target = %source.display(), "Dropped dangling shared link");
            }
        }
        Ok(())
    }

    /// Whether any shareable item of ~/.codex is currently a symlink
    pub fn has_symlinks(&self) -> bool {
        all_shareable().any(|item| ItemStatus::detect(&self.paths.codex_dir.join(item)).is_symlink())
    }

    pub fn status(&self) -> SharingStatus {
        let shared_dir =
            (self.config.mode == SharingMode::Global).then(|| self.paths.shared_dir.clone());
        let items = all_shareable()
            .map(|item| (item, ItemStatus::detect(&self.paths.codex_dir.join(item))))
            .collect();

        SharingStatus {
            mode: self.config.mode,
            shared_dir,
            items,
        }
    }
}
