//! High-level command orchestration for the CLI.
//!
//! Each handler here corresponds to a subcommand in `main.rs`. Handlers talk to
//! the user through `crate::ui` and delegate all real work to the profile
//! store (`crate::profiles`) and the sharing engine (`crate::sharing`).

use anstyle::AnsiColor;
use anyhow::{Context, Result};
use inquire::{Confirm, Select};
use std::fmt;
use std::path::Path;

use crate::doctor::run_doctor;
use crate::fs_utils::dir_size;
use crate::items::{ItemStatus, all_shareable};
use crate::paths::Paths;
use crate::profiles::{DirectoryRepository, Profile, ProfileRepository};
use crate::sharing::{SharingManager, SharingMode};
use crate::ui::Ui;

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

fn repository(paths: &Paths) -> DirectoryRepository {
    DirectoryRepository::new(paths.clone())
}

/// List all saved profiles
pub fn list(paths: &Paths, ui: &Ui) -> Result<()> {
    let repo = repository(paths);
    let profiles = repo.list()?;

    if profiles.is_empty() {
        ui.warn("No profiles saved yet.");
        ui.newline();
        ui.println("Save the account you are logged into with:");
        ui.println(format!("  {} save <name>", ui.bold("cxprof")));
        return Ok(());
    }

    let current = repo.current();

    let mut table = ui.simple_table();
    table.set_header(vec![
        ui.header_cell(""),
        ui.header_cell("Profile"),
        ui.header_cell("Email"),
        ui.header_cell("Updated"),
    ]);

    for profile in &profiles {
        let is_active = current.as_deref() == Some(profile.name.as_str());
        let name_cell = if is_active {
            ui.colored_cell(format!("{} (current)", profile.name), AnsiColor::Green)
        } else {
            ui.cell(&profile.name)
        };

        table.add_row(vec![
            ui.cell(ui.active_marker(is_active)),
            name_cell,
            ui.cell(profile.email.as_deref().unwrap_or("-")),
            ui.cell(profile.updated_at.format(TIME_FORMAT).to_string()),
        ]);
    }

    ui.section("Saved Profiles");
    ui.println(table.to_string());

    Ok(())
}

/// Show the current and previous profile
pub fn current(paths: &Paths, ui: &Ui) -> Result<()> {
    let repo = repository(paths);
    let state = repo.state();

    let Some(current) = repo.current() else {
        if state.current.is_empty() {
            ui.info("No active profile tracked.");
        } else {
            ui.warn(format!(
                "State names '{}' but that profile no longer exists.",
                state.current
            ));
        }
        return Ok(());
    };

    let mut table = ui.simple_table();
    table.add_row(vec![ui.cell("Current profile:"), ui.header_cell(&current)]);
    if !state.previous.is_empty() {
        table.add_row(vec![ui.cell("Previous profile:"), ui.cell(&state.previous)]);
    }
    if let Ok(profile) = repo.get(&current)
        && let Some(email) = &profile.email
    {
        table.add_row(vec![ui.cell("Email:"), ui.cell(email)]);
    }

    ui.section("Current Profile");
    ui.println(table.to_string());
    Ok(())
}

/// Show detailed information about a profile
pub fn inspect(paths: &Paths, name: &str, ui: &Ui) -> Result<()> {
    let repo = repository(paths);
    let profile = repo.get(name)?;
    let profile_dir = paths.profile_dir(name);
    let is_current = repo.current().as_deref() == Some(name);

    ui.section(format!("Profile: {}", name));
    ui.newline();

    let mut table = ui.simple_table();
    table.add_row(vec![
        ui.cell("Email:"),
        ui.cell(profile.email.as_deref().unwrap_or("(unknown)")),
    ]);
    table.add_row(vec![
        ui.cell("Created:"),
        ui.cell(profile.created_at.format(TIME_FORMAT).to_string()),
    ]);
    table.add_row(vec![
        ui.cell("Updated:"),
        ui.cell(profile.updated_at.format(TIME_FORMAT).to_string()),
    ]);
    table.add_row(vec![
        ui.cell("Location:"),
        ui.cell(profile_dir.display().to_string()),
    ]);
    table.add_row(vec![ui.cell("Size:"), ui.cell(calculate_size(&profile_dir)?)]);
    if is_current {
        table.add_row(vec![
            ui.cell("Status:"),
            ui.colored_cell("active", AnsiColor::Green),
        ]);
    }
    ui.println(table.to_string());
    ui.newline();

    ui.section("Shareable Items");
    let mut items = ui.simple_table();
    items.set_header(vec![ui.header_cell("Item"), ui.header_cell("In snapshot")]);
    for item in all_shareable() {
        let status = ItemStatus::detect(&profile_dir.join(item));
        items.add_row(vec![ui.cell(item), ui.item_status_cell(&status)]);
    }
    ui.println(items.to_string());

    Ok(())
}

/// Human-readable size of a snapshot directory
fn calculate_size(path: &Path) -> Result<String> {
    let size = dir_size(path)
        .with_context(|| format!("Failed to calculate size for {}", path.display()))?;
    Ok(format_bytes(size))
}

/// Format bytes as human-readable string
fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

/// Save the live ~/.codex as a profile
pub fn save(paths: &Paths, name: &str, ui: &Ui) -> Result<()> {
    let repo = repository(paths);
    let replacing = repo.exists(name);

    let spinner = ui.spinner(format!("Saving current session as '{}'...", name));
    match repo.save(name) {
        Ok(profile) => {
            let verb = if replacing { "Updated" } else { "Saved" };
            let suffix = profile
                .email
                .map(|e| format!(" ({})", e))
                .unwrap_or_default();
            ui.spinner_finish_ok(&spinner, format!("{} profile: {}{}", verb, name, suffix));
            Ok(())
        }
        Err(e) => {
            ui.spinner_finish_err(&spinner, format!("Failed to save: {}", e));
            Err(e)
        }
    }
}

/// Switch to a profile
pub fn use_profile(paths: &Paths, name: &str, ui: &Ui) -> Result<()> {
    let repo = repository(paths);

    if repo.current().as_deref() == Some(name) {
        ui.info(format!("'{}' is already active, reloading its snapshot.", name));
    }

    let spinner = ui.spinner(format!("Switching to profile '{}'...", name));
    match repo.activate(name) {
        Ok(()) => {
            ui.spinner_finish_ok(&spinner, format!("Active profile: {}", name));
            Ok(())
        }
        Err(e) => {
            ui.spinner_finish_err(&spinner, format!("Failed to switch: {}", e));
            Err(e)
        }
    }
}

/// Remove a profile
pub fn remove(paths: &Paths, name: &str, ui: &Ui, force: bool) -> Result<()> {
    let repo = repository(paths);
    repo.get(name)?;

    if !force {
        let confirm = Confirm::new(&format!("Are you sure you want to remove profile '{}'?", name))
            .with_default(false)
            .with_help_message("This permanently deletes the saved snapshot")
            .prompt()
            .context("Confirmation cancelled")?;

        if !confirm {
            ui.warn("Removal cancelled.");
            return Ok(());
        }
    }

    let was_current = repo.current().as_deref() == Some(name);
    repo.delete(name)?;

    ui.ok(format!("Removed profile '{}'", name));
    if was_current {
        ui.warn("That was the active profile; ~/.codex was left as is.");
        ui.println(format!("  Save it again with: cxprof save {}", name));
    }
    Ok(())
}

/// Entry shown by the interactive picker
struct PickerEntry {
    profile: Profile,
    current: bool,
}

impl fmt::Display for PickerEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.profile.name)?;
        if let Some(email) = &self.profile.email {
            write!(f, " <{}>", email)?;
        }
        if self.current {
            write!(f, " (current)")?;
        }
        Ok(())
    }
}

/// Interactive profile picker, run when no subcommand is given
pub fn pick(paths: &Paths, ui: &Ui) -> Result<()> {
    let repo = repository(paths);
    let profiles = repo.list()?;

    if profiles.is_empty() {
        return list(paths, ui);
    }

    let current = repo.current();
    let entries: Vec<PickerEntry> = profiles
        .into_iter()
        .map(|profile| PickerEntry {
            current: current.as_deref() == Some(profile.name.as_str()),
            profile,
        })
        .collect();
    let cursor = entries.iter().position(|e| e.current).unwrap_or(0);

    let selected = Select::new("Switch to which profile?", entries)
        .with_starting_cursor(cursor)
        .with_help_message("↑↓ to move, Enter to switch, Esc to cancel")
        .prompt_skippable()
        .context("Profile selection failed")?;

    match selected {
        Some(entry) if entry.current => {
            ui.info(format!("Staying on '{}'.", entry.profile.name));
            Ok(())
        }
        Some(entry) => use_profile(paths, &entry.profile.name, ui),
        None => {
            ui.info("Cancelled.");
            Ok(())
        }
    }
}

/// Turn session sharing on
pub fn share_enable(paths: &Paths, ui: &Ui, include_settings: bool, groups: bool) -> Result<()> {
    let mut manager = SharingManager::load(paths);
    let mode = if groups {
        SharingMode::Group
    } else {
        SharingMode::Global
    };

    if manager.mode() == mode && manager.config().include_settings == include_settings {
        ui.warn(format!("Sharing is already enabled (mode: {})", mode));
        return Ok(());
    }

    let spinner = ui.spinner("Enabling session sharing...");
    let result = if groups {
        manager.enable_groups(include_settings)
    } else {
        manager.enable(include_settings)
    };
    if let Err(e) = result {
        ui.spinner_finish_err(&spinner, format!("Failed to enable sharing: {}", e));
        return Err(e);
    }
    ui.spinner_finish_ok(&spinner, format!("Session sharing enabled ({} mode)", mode));

    match mode {
        SharingMode::Group => {
            ui.println(ui.dim("Profiles share data with the other members of their group."));
            ui.println(ui.dim("Assign groups with: cxprof share group <profile> <group>"));
        }
        _ => ui.println(ui.dim("All profiles now share sessions and history.")),
    }
    ui.println(ui.dim("auth.json stays private to each profile."));
    Ok(())
}

/// Turn session sharing off, copying shared data back locally
pub fn share_disable(paths: &Paths, ui: &Ui, yes: bool) -> Result<()> {
    let mut manager = SharingManager::load(paths);

    if !manager.is_enabled() && !manager.has_symlinks() {
        ui.info("Sharing is already disabled.");
        return Ok(());
    }

    if !yes {
        let confirm = Confirm::new("Copy shared data into ~/.codex and disable sharing?")
            .with_default(true)
            .prompt()
            .context("Confirmation cancelled")?;

        if !confirm {
            ui.warn("Cancelled.");
            return Ok(());
        }
    }

    manager.disable()?;
    ui.ok("Session sharing disabled");
    ui.println(ui.dim("Shared data has been copied back into ~/.codex."));
    Ok(())
}

/// Show sharing mode and per-item link state
pub fn share_status(paths: &Paths, ui: &Ui) -> Result<()> {
    let manager = SharingManager::load(paths);
    let status = manager.status();

    ui.section("Sharing");
    let mut summary = ui.simple_table();
    summary.add_row(vec![ui.cell("Mode:"), ui.mode_cell(status.mode)]);
    if let Some(shared) = &status.shared_dir {
        summary.add_row(vec![ui.cell("Shared root:"), ui.cell(shared.display().to_string())]);
    }
    if manager.is_enabled() {
        summary.add_row(vec![
            ui.cell("Settings shared:"),
            ui.cell(if manager.config().include_settings { "yes" } else { "no" }),
        ]);
    }
    ui.println(summary.to_string());
    ui.newline();

    let mut items = ui.simple_table();
    items.set_header(vec![ui.header_cell("Item"), ui.header_cell("State")]);
    for (item, state) in &status.items {
        items.add_row(vec![ui.cell(*item), ui.item_status_cell(state)]);
    }
    ui.println(items.to_string());

    let groups = &manager.config().groups;
    if !groups.is_empty() {
        ui.newline();
        ui.section("Groups");
        let mut table = ui.simple_table();
        table.set_header(vec![ui.header_cell("Profile"), ui.header_cell("Group")]);
        for (account, group) in groups {
            table.add_row(vec![ui.cell(account), ui.cell(group)]);
        }
        ui.println(table.to_string());
        if status.mode != SharingMode::Group {
            ui.println(ui.dim("Groups only apply in group mode (cxprof share enable --groups)."));
        }
    }

    Ok(())
}

/// Assign a profile to a sharing group
pub fn share_group(paths: &Paths, ui: &Ui, account: &str, group: &str) -> Result<()> {
    let repo = repository(paths);
    if !repo.exists(account) {
        ui.warn(format!("No saved profile named '{}' yet; assigning anyway.", account));
    }

    let mut manager = SharingManager::load(paths);
    manager.assign_group(account, group)?;
    ui.ok(format!("'{}' now shares with group '{}'", account, group));

    if manager.mode() != SharingMode::Group {
        ui.println(ui.dim("Group mode is not active; enable it with: cxprof share enable --groups"));
    }
    Ok(())
}

/// Remove a profile from its sharing group
pub fn share_ungroup(paths: &Paths, ui: &Ui, account: &str) -> Result<()> {
    let mut manager = SharingManager::load(paths);
    if manager.unassign_group(account)? {
        ui.ok(format!("'{}' no longer belongs to a group", account));
    } else {
        ui.info(format!("'{}' was not in a group", account));
    }
    Ok(())
}

/// Run diagnostics
pub fn doctor(paths: &Paths, ui: &Ui) -> Result<()> {
    if run_doctor(paths, ui) {
        Ok(())
    } else {
        anyhow::bail!("doctor found problems")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProfileError;
    use crate::test_utils::{setup_test_paths, write_live};
    use crate::ui::ColorMode;
    use tempfile::TempDir;

    fn test_ui() -> Ui {
        Ui::new(ColorMode::Never, false)
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.00 KB");
        assert_eq!(format_bytes(3 * 1024 * 1024), "3.00 MB");
    }

    #[test]
    fn test_list_empty() {
        let temp_dir = TempDir::new().unwrap();
        let paths = setup_test_paths(&temp_dir);
        // Should not error, just show "no profiles"
        assert!(list(&paths, &test_ui()).is_ok());
    }

    #[test]
    fn test_save_list_and_inspect() {
        let temp_dir = TempDir::new().unwrap();
        let paths = setup_test_paths(&temp_dir);
        let ui = test_ui();
        write_live(&paths, "auth.json", "{}");
        write_live(&paths, "sessions/a.json", "a");

        save(&paths, "work", &ui).unwrap();

        assert!(paths.profile_dir("work").join("sessions/a.json").exists());
        assert!(list(&paths, &ui).is_ok());
        assert!(inspect(&paths, "work", &ui).is_ok());
        assert!(current(&paths, &ui).is_ok());
    }

    #[test]
    fn test_save_not_logged_in() {
        let temp_dir = TempDir::new().unwrap();
        let paths = setup_test_paths(&temp_dir);

        let err = save(&paths, "work", &test_ui()).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ProfileError>(),
            Some(ProfileError::NotLoggedIn(_))
        ));
    }

    #[test]
    fn test_use_nonexistent() {
        let temp_dir = TempDir::new().unwrap();
        let paths = setup_test_paths(&temp_dir);

        assert!(use_profile(&paths, "nonexistent", &test_ui()).is_err());
    }

    #[test]
    fn test_inspect_nonexistent() {
        let temp_dir = TempDir::new().unwrap();
        let paths = setup_test_paths(&temp_dir);

        assert!(inspect(&paths, "ghost", &test_ui()).is_err());
    }

    #[test]
    fn test_current_no_state() {
        let temp_dir = TempDir::new().unwrap();
        let paths = setup_test_paths(&temp_dir);
        // Should not error
        assert!(current(&paths, &test_ui()).is_ok());
    }

    #[test]
    fn test_remove_forced() {
        let temp_dir = TempDir::new().unwrap();
        let paths = setup_test_paths(&temp_dir);
        let ui = test_ui();
        write_live(&paths, "auth.json", "{}");
        save(&paths, "work", &ui).unwrap();

        remove(&paths, "work", &ui, true).unwrap();
        assert!(!paths.profile_dir("work").exists());
        assert!(remove(&paths, "work", &ui, true).is_err());
    }

    #[test]
    fn test_share_enable_status_disable() {
        let temp_dir = TempDir::new().unwrap();
        let paths = setup_test_paths(&temp_dir);
        let ui = test_ui();
        write_live(&paths, "auth.json", "{}");
        write_live(&paths, "history.jsonl", "line\n");
        save(&paths, "work", &ui).unwrap();

        share_enable(&paths, &ui, false, false).unwrap();
        assert_eq!(SharingManager::load(&paths).mode(), SharingMode::Global);
        assert!(ItemStatus::detect(&paths.codex_dir.join("history.jsonl")).is_symlink());
        // Second enable is a no-op warning
        share_enable(&paths, &ui, false, false).unwrap();
        share_status(&paths, &ui).unwrap();

        share_disable(&paths, &ui, true).unwrap();
        assert_eq!(SharingManager::load(&paths).mode(), SharingMode::Disabled);
        assert_eq!(
            ItemStatus::detect(&paths.codex_dir.join("history.jsonl")),
            ItemStatus::Local
        );
    }

    #[test]
    fn test_share_group_and_ungroup() {
        let temp_dir = TempDir::new().unwrap();
        let paths = setup_test_paths(&temp_dir);
        let ui = test_ui();

        share_group(&paths, &ui, "work", "team").unwrap();
        assert_eq!(
            SharingManager::load(&paths).config().groups.get("work"),
            Some(&"team".to_string())
        );

        share_ungroup(&paths, &ui, "work").unwrap();
        assert!(SharingManager::load(&paths).config().groups.is_empty());
        assert!(share_group(&paths, &ui, "work", "../team").is_err());
    }
}
