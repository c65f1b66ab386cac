//! Rotated backups of data cxprof had to displace.
//!
//! Nothing cxprof removes from `~/.codex` on its own initiative is deleted
//! outright: conflicting local copies found while linking shared items, and
//! live directories with no known owner during a switch, are moved here.

use anyhow::{Context, Result};
use chrono::Utc;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::fs_utils::remove_path;

/// Number of backups to keep per prefix
pub const MAX_BACKUPS: usize = 10;

/// Backup name for `prefix` taken now, e.g. `sessions.20250101_120000_123456789.bak`.
pub fn backup_path(backups_dir: &Path, prefix: &str) -> PathBuf {
    let timestamp = Utc::now().format("%Y%m%d_%H%M%S_%f");
    backups_dir.join(format!("{prefix}.{timestamp}.bak"))
}

/// Move `path` into the backups directory and rotate old backups.
///
/// Returns where the data went, or `None` if there was nothing to move.
pub fn move_to_backups(path: &Path, backups_dir: &Path, prefix: &str) -> Result<Option<PathBuf>> {
    if fs::symlink_metadata(path).is_err() {
        return Ok(None);
    }

    fs::create_dir_all(backups_dir).with_context(|| {
        format!("Failed to create backups directory: {}", backups_dir.display())
    })?;

    let dest = backup_path(backups_dir, prefix);
    fs::rename(path, &dest)
        .with_context(|| format!("Failed to back up {} to {}", path.display(), dest.display()))?;
    info!(from = %path.display(), to = %dest.display(), "Moved data into backups");

    cleanup_old_backups(backups_dir, prefix)?;
    Ok(Some(dest))
}

/// Keep only the newest [`MAX_BACKUPS`] backups starting with `prefix`.
pub fn cleanup_old_backups(backups_dir: &Path, prefix: &str) -> Result<()> {
    let wanted = format!("{prefix}.");
    let mut backups: Vec<PathBuf> = fs::read_dir(backups_dir)
        .with_context(|| format!("Failed to read {}", backups_dir.display()))?
        .filter_map(|e| e.ok())
        .filter(|e| {
            e.file_name()
                .to_str()
                .is_some_and(|n| n.starts_with(&wanted) && n.ends_with(".bak"))
        })
        .map(|e| e.path())
        .collect();

    if backups.len() <= MAX_BACKUPS {
        return Ok(());
    }

    // Names embed the timestamp, so lexical order is oldest first.
    backups.sort();

    let to_remove = backups.len() - MAX_BACKUPS;
    for path in backups.iter().take(to_remove) {
        debug!(path = %path.display(), "Rotating out old backup");
        remove_path(path)?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_move_to_backups() {
        let temp = TempDir::new().unwrap();
        let local = temp.path().join("sessions");
        fs::create_dir_all(&local).unwrap();
        fs::write(local.join("a.json"), "a").unwrap();
        let backups = temp.path().join("backups");

        let dest = move_to_backups(&local, &backups, "sessions").unwrap().unwrap();

        assert!(!local.exists());
        assert_eq!(fs::read_to_string(dest.join("a.json")).unwrap(), "a");
        assert!(dest.file_name().unwrap().to_str().unwrap().starts_with("sessions."));
    }

    #[test]
    fn test_move_missing_is_noop() {
        let temp = TempDir::new().unwrap();
        let moved = move_to_backups(&temp.path().join("nope"), temp.path(), "nope").unwrap();
        assert!(moved.is_none());
    }

    #[test]
    fn test_rotation_keeps_newest() {
        let temp = TempDir::new().unwrap();
        for i in 0..(MAX_BACKUPS + 3) {
            fs::write(temp.path().join(format!("history.jsonl.2025010{i:02}.bak")), "").unwrap();
        }
        fs::write(temp.path().join("sessions.20250101.bak"), "").unwrap();

        cleanup_old_backups(temp.path(), "history.jsonl").unwrap();

        let remaining: Vec<_> = fs::read_dir(temp.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().into_string().unwrap())
            .collect();
        assert_eq!(remaining.len(), MAX_BACKUPS + 1);
        assert!(!remaining.contains(&"history.jsonl.202501000.bak".to_string()));
        assert!(remaining.contains(&"sessions.20250101.bak".to_string()));
    }
}
