//! Diagnostic tool for cxprof.
//!
//! Implements `cxprof doctor`, which checks the setup for common issues:
//! - Existence of the live, storage and state directories.
//! - Readability of the state record and whether it points at a real profile.
//! - Sharing configuration and the state of every shared link.
//! - Readability of each profile's metadata.
//!
//! It reports each check with a pass/fail/warn status.

use anstyle::AnsiColor;

use crate::auth::AUTH_FILE;
use crate::items::ItemStatus;
use crate::paths::Paths;
use crate::profiles::{DirectoryRepository, Profile, ProfileRepository};
use crate::sharing::{SharingManager, SharingMode};
use crate::state::ActiveState;
use crate::ui::Ui;

/// Run the doctor diagnostics; returns false if any check failed
pub fn run_doctor(paths: &Paths, ui: &Ui) -> bool {
    ui.section("cxprof Doctor");
    ui.newline();

    let repo = DirectoryRepository::new(paths.clone());
    let mut healthy = true;

    // 1. Directories
    healthy &= check_step(ui, "Directories", || {
        if paths.codex_exists() {
            ui.println(format!(
                "  {} Codex directory exists: {}",
                ui.icon_ok(),
                paths.codex_dir.display()
            ));
        } else {
            // Not an error before the first `codex login`
            ui.println(format!(
                "  {} Codex directory missing: {}",
                ui.icon_warn(),
                paths.codex_dir.display()
            ));
        }

        for (label, dir) in [
            ("Storage directory", &paths.data_dir),
            ("State directory", &paths.state_dir),
        ] {
            if dir.is_dir() {
                ui.println(format!("  {} {} exists: {}", ui.icon_ok(), label, dir.display()));
            } else {
                ui.println(format!(
                    "  {} {} not created yet: {}",
                    ui.icon_info(),
                    label,
                    dir.display()
                ));
            }
        }
        true
    });

    // 2. State
    healthy &= check_step(ui, "State File", || {
        if !paths.state_file.exists() {
            ui.println(format!("  {} State file missing (fresh install?)", ui.icon_warn()));
            return true;
        }

        if let Err(e) = std::fs::read_to_string(&paths.state_file)
            .map_err(anyhow::Error::from)
            .and_then(|raw| Ok(serde_json::from_str::<ActiveState>(&raw)?))
        {
            ui.println(format!("  {} State file corrupt: {}", ui.icon_err(), e));
            return false;
        }
        ui.println(format!("  {} State file readable", ui.icon_ok()));

        let state = repo.state();
        if state.current.is_empty() {
            ui.println(format!("  {} No active profile set", ui.icon_info()));
        } else if repo.current().is_some() {
            ui.println(format!("  {} Active profile: {}", ui.icon_ok(), state.current));
        } else {
            ui.println(format!(
                "  {} Active profile '{}' no longer exists",
                ui.icon_err(),
                state.current
            ));
            return false;
        }
        true
    });

    // 3. Sharing
    healthy &= check_step(ui, "Sharing", || {
        let manager = SharingManager::load(paths);
        let status = manager.status();
        ui.println(format!("  {} Mode: {}", ui.icon_info(), status.mode));

        let mut ok = true;
        for (item, state) in &status.items {
            match state {
                ItemStatus::BrokenSymlink { target } => {
                    ui.println(format!(
                        "  {} {} is a BROKEN symlink to {}",
                        ui.icon_err(),
                        item,
                        target.display()
                    ));
                    ok = false;
                }
                ItemStatus::Symlink { target } if !paths.is_in_data_dir(target) => {
                    ui.println(format!(
                        "  {} {} links outside cxprof storage: {}",
                        ui.icon_warn(),
                        item,
                        target.display()
                    ));
                }
                ItemStatus::Symlink { .. } if !manager.is_enabled() => {
                    ui.println(format!(
                        "  {} {} is still linked although sharing is disabled",
                        ui.icon_warn(),
                        item
                    ));
                }
                _ => {}
            }
        }

        if status.mode == SharingMode::Group {
            let current = repo.current();
            match current.as_deref().map(|c| manager.share_target(Some(c))) {
                Some(None) => ui.println(format!(
                    "  {} Active profile has no group; nothing is shared",
                    ui.icon_warn()
                )),
                Some(Some(dir)) => ui.println(format!(
                    "  {} Sharing through {}",
                    ui.icon_ok(),
                    dir.display()
                )),
                None => {}
            }
        }

        if ok {
            ui.println(format!("  {} Shared links are consistent", ui.icon_ok()));
        }
        ok
    });

    // 4. Profiles
    healthy &= check_step(ui, "Profiles", || {
        let profiles = match repo.list() {
            Ok(p) => p,
            Err(e) => {
                ui.println(format!("  {} Failed to list profiles: {}", ui.icon_err(), e));
                return false;
            }
        };

        let dirs = std::fs::read_dir(&paths.accounts_dir)
            .map(|entries| {
                entries
                    .filter_map(|e| e.ok())
                    .filter(|e| e.path().is_dir())
                    .filter_map(|e| e.file_name().to_str().map(str::to_string))
                    .filter(|n| !n.starts_with('.'))
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();

        if dirs.is_empty() {
            ui.println(format!("  {} No profiles found", ui.icon_warn()));
            return true;
        }

        ui.println(format!("  Found {} profiles:", dirs.len()));
        let mut all_valid = true;

        let mut sorted = dirs;
        sorted.sort();
        for name in sorted {
            let dir = paths.profile_dir(&name);
            if !profiles.iter().any(|p| p.name == name) {
                ui.println(format!("    {} {} (invalid name or unreadable)", ui.icon_err(), name));
                all_valid = false;
                continue;
            }
            match Profile::read(&dir) {
                Ok(Some(_)) if dir.join(AUTH_FILE).exists() => {
                    ui.println(format!("    {} {}", ui.icon_ok(), name));
                }
                Ok(Some(_)) => {
                    ui.println(format!("    {} {} (no auth.json in snapshot)", ui.icon_warn(), name));
                }
                Ok(None) => {
                    ui.println(format!("    {} {} (no metadata; re-save to add it)", ui.icon_warn(), name));
                }
                Err(e) => {
                    ui.println(format!("    {} {} ({})", ui.icon_err(), name, e));
                    all_valid = false;
                }
            }
        }
        all_valid
    });

    healthy
}

fn check_step<F>(ui: &Ui, name: &str, check_fn: F) -> bool
where
    F: FnOnce() -> bool,
{
    ui.println(ui.bold(format!("Checking {}...", name)));
    let success = check_fn();
    if !success {
        ui.println(ui.colored("  Issues detected!", AnsiColor::Red));
    }
    ui.newline();
    success
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs_utils::make_symlink;
    use crate::test_utils::{setup_test_paths, write_live};
    use crate::ui::ColorMode;
    use std::fs;
    use tempfile::TempDir;

    fn test_ui() -> Ui {
        Ui::new(ColorMode::Never, false)
    }

    #[test]
    fn test_fresh_install_is_healthy() {
        let temp_dir = TempDir::new().unwrap();
        let paths = setup_test_paths(&temp_dir);
        assert!(run_doctor(&paths, &test_ui()));
    }

    #[test]
    fn test_saved_profile_is_healthy() {
        let temp_dir = TempDir::new().unwrap();
        let paths = setup_test_paths(&temp_dir);
        write_live(&paths, "auth.json", "{}");
        DirectoryRepository::new(paths.clone()).save("work").unwrap();

        assert!(run_doctor(&paths, &test_ui()));
    }

    #[test]
    fn test_dangling_current_is_reported() {
        let temp_dir = TempDir::new().unwrap();
        let paths = setup_test_paths(&temp_dir);
        ActiveState::record(&paths.state_file, "gone").unwrap();

        assert!(!run_doctor(&paths, &test_ui()));
    }

    #[test]
    fn test_broken_link_is_reported() {
        let temp_dir = TempDir::new().unwrap();
        let paths = setup_test_paths(&temp_dir);
        fs::create_dir_all(&paths.codex_dir).unwrap();
        make_symlink(
            &paths.shared_dir.join("sessions"),
            &paths.codex_dir.join("sessions"),
        )
        .unwrap();

        assert!(!run_doctor(&paths, &test_ui()));
    }

    #[test]
    fn test_corrupt_metadata_is_reported() {
        let temp_dir = TempDir::new().unwrap();
        let paths = setup_test_paths(&temp_dir);
        let dir = paths.profile_dir("broken");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(crate::profiles::METADATA_FILE), "not json").unwrap();

        assert!(!run_doctor(&paths, &test_ui()));
    }
}
