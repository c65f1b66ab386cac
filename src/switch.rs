//! Profile switching logic.
//!
//! Activation replaces the whole of `~/.codex` with a profile's snapshot:
//! - The outgoing profile is saved first so no work is lost.
//! - The snapshot is copied into a staging sibling and renamed into place, so
//!   a failed copy never leaves `~/.codex` empty.
//! - Live data nobody owns is moved to backups instead of being deleted.
//! - Shared links are rebuilt, since a snapshot knows nothing of the shared root.

use anyhow::{Context, Result};
use std::path::Path;
use tracing::{debug, info, warn};

use crate::backup::{backup_path, cleanup_old_backups};
use crate::fs_utils::{copy_dir_filtered, replace_dir};
use crate::profiles::{DirectoryRepository, METADATA_FILE, ProfileRepository};
use crate::sharing::SharingManager;
use crate::state::{ActiveState, OperationLock};

/// Switch `~/.codex` to the profile `name`
pub fn activate(repo: &DirectoryRepository, name: &str) -> Result<()> {
    repo.ensure_exists(name)?;

    let paths = repo.paths();
    paths.ensure_dirs()?;
    let _lock = OperationLock::acquire(&paths.lock_file)?;

    let current = repo.current();
    let live_existed = paths.codex_exists();

    // 1. Save the outgoing profile
    let outgoing_saved = match current.as_deref() {
        Some(cur) if cur != name && live_existed => {
            repo.snapshot(cur)
                .with_context(|| format!("Failed to save current profile '{}'", cur))?;
            debug!(profile = %cur, "Saved outgoing profile");
            true
        }
        _ => false,
    };

    // 2. Stage the snapshot and swap it in
    let profile_dir = paths.profile_dir(name);
    let displaced = replace_dir(&paths.codex_dir, |staging| {
        copy_dir_filtered(&profile_dir, staging, |rel| rel == Path::new(METADATA_FILE))
    })
    .with_context(|| format!("Failed to activate profile '{}'", name))?;

    // 3. Whatever was live and not just saved goes to backups
    if let Some(old) = displaced {
        if outgoing_saved {
            drop(old);
        } else {
            let dest = backup_path(&paths.backups_dir, "codex");
            warn!(
                to = %dest.display(),
                "Live directory had unsaved data with no active profile, moved to backups"
            );
            old.keep_as(&dest)?;
            cleanup_old_backups(&paths.backups_dir, "codex")?;
        }
    }

    // 4. Record the switch before touching shared links, so the pointer always
    //    names the profile whose data is live.
    ActiveState::record(&paths.state_file, name)?;

    // 5. Rebuild or drop shared links
    let sharing = SharingManager::load(paths);
    if sharing.is_enabled() {
        sharing
            .setup_symlinks(Some(name))
            .context("Failed to restore shared links")?;
    } else if sharing.has_symlinks() {
        // Saved while sharing was on: make the profile self-contained again.
        sharing
            .remove_symlinks()
            .context("Failed to materialize shared links")?;
    }

    info!(profile = %name, previous = ?current, "Activated profile");
    Ok(())
}
