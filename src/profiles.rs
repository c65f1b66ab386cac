//! Core profile management logic.
//!
//! A profile is a full copy of `~/.codex` stored under
//! `~/codex-data/accounts/<name>/`, with a `.profile.json` sidecar holding its
//! metadata. This module owns:
//! - the [`ProfileRepository`] capability and its directory-backed implementation
//! - profile metadata and name validation
//! - the active-profile pointer updates done by `save`
//!
//! The switch protocol itself lives in [`crate::switch`].

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::{debug, info, warn};

use crate::auth;
use crate::error::ProfileError;
use crate::fs_utils::{copy_dir_recursive, replace_dir};
use crate::paths::Paths;
use crate::state::{ActiveState, OperationLock, write_json_atomic};

/// Metadata sidecar inside every snapshot directory
pub const METADATA_FILE: &str = ".profile.json";

/// A saved account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Profile {
    pub fn new(name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            name: name.into(),
            email: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Read metadata from a snapshot directory
    ///
    /// `Ok(None)` means the directory has no metadata file (profiles made by
    /// hand or by older versions); a corrupt file is an error.
    pub fn read(profile_dir: &Path) -> Result<Option<Self>> {
        let path = profile_dir.join(METADATA_FILE);
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read {}", path.display()));
            }
        };

        serde_json::from_str(&content)
            .map(Some)
            .with_context(|| format!("Failed to parse {}", path.display()))
    }

    /// Write metadata to a snapshot directory
    pub fn write(&self, profile_dir: &Path) -> Result<()> {
        write_json_atomic(&profile_dir.join(METADATA_FILE), self)
    }

    /// Metadata for a snapshot without a sidecar, dated by the directory mtime
    fn synthesize(name: &str, profile_dir: &Path) -> Result<Self> {
        let modified = fs::metadata(profile_dir)
            .and_then(|m| m.modified())
            .with_context(|| format!("Failed to stat {}", profile_dir.display()))?;
        let stamp: DateTime<Utc> = modified.into();

        Ok(Self {
            name: name.to_string(),
            email: None,
            created_at: stamp,
            updated_at: stamp,
        })
    }
}

/// Validate a profile or group name
///
/// Only allows alphanumeric characters, underscores, and hyphens, so a name
/// can never step outside the directory it is joined onto.
pub fn validate_name(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && name.chars().count() <= 64
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');

    if valid {
        Ok(())
    } else {
        Err(ProfileError::InvalidName(name.to_string()).into())
    }
}

/// Storage for profiles and the active-profile pointer
pub trait ProfileRepository {
    /// Every readable profile, sorted by name. Unreadable entries are skipped.
    fn list(&self) -> Result<Vec<Profile>>;

    fn get(&self, name: &str) -> Result<Profile>;

    /// Snapshot the live directory as `name` and make it current.
    fn save(&self, name: &str) -> Result<Profile>;

    /// Remove a profile. The active-profile pointer is left alone.
    fn delete(&self, name: &str) -> Result<()>;

    /// Make `name`'s snapshot the live directory.
    fn activate(&self, name: &str) -> Result<()>;

    /// The active profile, if one is recorded and still exists.
    fn current(&self) -> Option<String>;
}

/// Profiles stored as plain directories under `~/codex-data/accounts`
#[derive(Debug, Clone)]
pub struct DirectoryRepository {
    paths: Paths,
}

impl DirectoryRepository {
    pub fn new(paths: Paths) -> Self {
        Self { paths }
    }

    pub fn paths(&self) -> &Paths {
        &self.paths
    }

    pub fn exists(&self, name: &str) -> bool {
        self.paths.profile_dir(name).is_dir()
    }

    /// The raw state record, including a possibly dangling `current`
    pub fn state(&self) -> ActiveState {
        ActiveState::load(&self.paths.state_file)
    }

    pub(crate) fn ensure_exists(&self, name: &str) -> Result<()> {
        validate_name(name)?;
        if !self.exists(name) {
            return Err(ProfileError::NotFound(name.to_string()).into());
        }
        Ok(())
    }

    /// Replace `name`'s snapshot with a copy of the live directory.
    ///
    /// Does not lock and does not touch the state record; callers do both.
    pub(crate) fn snapshot(&self, name: &str) -> Result<Profile> {
        let profile_dir = self.paths.profile_dir(name);

        // Keep the original creation time across re-saves.
        let created_at = match Profile::read(&profile_dir) {
            Ok(Some(old)) => Some(old.created_at),
            Ok(None) => None,
            Err(e) => {
                warn!(profile = %name, error = %e, "Ignoring unreadable metadata of previous snapshot");
                None
            }
        };

        let mut profile = Profile::new(name);
        if let Some(created_at) = created_at {
            profile.created_at = created_at;
        }
        profile.email = auth::read_email(&self.paths.codex_dir);

        // Dropping the displaced snapshot deletes it.
        let _old = replace_dir(&profile_dir, |staging| {
            copy_dir_recursive(&self.paths.codex_dir, staging)?;
            profile.write(staging)
        })
        .with_context(|| format!("Failed to save profile '{}'", name))?;

        debug!(profile = %name, dir = %profile_dir.display(), "Snapshot written");
        Ok(profile)
    }
}

impl ProfileRepository for DirectoryRepository {
    fn list(&self) -> Result<Vec<Profile>> {
        let entries = match fs::read_dir(&self.paths.accounts_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(e).with_context(|| {
                    format!("Failed to read {}", self.paths.accounts_dir.display())
                });
            }
        };

        let mut profiles = Vec::new();
        for entry in entries {
            let entry = entry.context("Failed to read directory entry")?;
            if !entry.file_type().map(|t| t.is_dir()).unwrap_or(false) {
                continue;
            }
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            // Staging directories of in-flight saves.
            if name.starts_with('.') {
                continue;
            }

            match self.get(&name) {
                Ok(profile) => profiles.push(profile),
                Err(e) => warn!(profile = %name, error = %format!("{e:#}"), "Skipping unreadable profile"),
            }
        }

        profiles.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(profiles)
    }

    fn get(&self, name: &str) -> Result<Profile> {
        self.ensure_exists(name)?;
        let profile_dir = self.paths.profile_dir(name);

        match Profile::read(&profile_dir)? {
            Some(profile) => Ok(profile),
            None => Profile::synthesize(name, &profile_dir),
        }
    }

    fn save(&self, name: &str) -> Result<Profile> {
        validate_name(name)?;
        if !self.paths.codex_exists() {
            return Err(ProfileError::NotLoggedIn(self.paths.codex_dir.clone()).into());
        }

        self.paths.ensure_dirs()?;
        let _lock = OperationLock::acquire(&self.paths.lock_file)?;

        let profile = self.snapshot(name)?;
        ActiveState::record(&self.paths.state_file, name)?;

        info!(profile = %name, "Saved profile");
        Ok(profile)
    }

    fn delete(&self, name: &str) -> Result<()> {
        self.ensure_exists(name)?;
        self.paths.ensure_dirs()?;
        let _lock = OperationLock::acquire(&self.paths.lock_file)?;

        let profile_dir = self.paths.profile_dir(name);
        fs::remove_dir_all(&profile_dir).with_context(|| {
            format!("Failed to remove profile directory: {}", profile_dir.display())
        })?;

        info!(profile = %name, "Deleted profile");
        Ok(())
    }

    fn activate(&self, name: &str) -> Result<()> {
        crate::switch::activate(self, name)
    }

    fn current(&self) -> Option<String> {
        let current = self.state().current;
        if current.is_empty() || validate_name(&current).is_err() || !self.exists(&current) {
            return None;
        }
        Some(current)
    }
}
