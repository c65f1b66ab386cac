//! The fixed entries of `~/.codex` that sharing knows about.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

/// Entries shared whenever sharing is enabled.
pub const SHAREABLE_ITEMS: &[&str] = &[
    "sessions",
    "sqlite",
    "history.jsonl",
    ".codex-global-state.json",
];

/// Entries shared only when settings sharing is requested.
pub const OPTIONAL_SHAREABLE_ITEMS: &[&str] = &["config.toml", "settings.json"];

/// Entries that always stay private to a profile.
pub const PRIVATE_ITEMS: &[&str] = &["auth.json", "license.secret"];

/// Mandatory followed by optional items.
pub fn all_shareable() -> impl Iterator<Item = &'static str> {
    SHAREABLE_ITEMS
        .iter()
        .chain(OPTIONAL_SHAREABLE_ITEMS.iter())
        .copied()
}

/// The items a given sharing configuration links.
pub fn active_items(include_settings: bool) -> Vec<&'static str> {
    if include_settings {
        all_shareable().collect()
    } else {
        SHAREABLE_ITEMS.to_vec()
    }
}

/// Items named with an extension are files, everything else is a directory.
pub fn is_file_item(item: &str) -> bool {
    Path::new(item).extension().is_some()
}

/// What currently sits at an item's path
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemStatus {
    Missing,
    Local,
    Symlink { target: PathBuf },
    BrokenSymlink { target: PathBuf },
}

impl ItemStatus {
    pub fn detect(path: &Path) -> Self {
        match fs::symlink_metadata(path) {
            Ok(meta) if meta.file_type().is_symlink() => {
                let target = fs::read_link(path).unwrap_or_else(|_| PathBuf::from("?"));
                if path.exists() {
                    Self::Symlink { target }
                } else {
                    Self::BrokenSymlink { target }
                }
            }
            Ok(_) => Self::Local,
            Err(_) => Self::Missing,
        }
    }

    pub fn is_symlink(&self) -> bool {
        matches!(self, Self::Symlink { .. } | Self::BrokenSymlink { .. })
    }
}

impl fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Missing => f.write_str("(missing)"),
            Self::Local => f.write_str("(local)"),
            Self::Symlink { target } | Self::BrokenSymlink { target } => {
                write!(f, "{}", target.display())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs_utils::make_symlink;
    use tempfile::TempDir;

    #[test]
    fn test_private_items_never_shareable() {
        for private in PRIVATE_ITEMS {
            assert!(all_shareable().all(|item| item != *private));
        }
    }

    #[test]
    fn test_active_items() {
        assert_eq!(active_items(false), SHAREABLE_ITEMS);
        let with_settings = active_items(true);
        assert_eq!(with_settings.len(), 6);
        assert_eq!(with_settings.last(), Some(&"settings.json"));
    }

    #[test]
    fn test_item_kind() {
        assert!(!is_file_item("sessions"));
        assert!(!is_file_item("sqlite"));
        assert!(is_file_item("history.jsonl"));
        assert!(is_file_item(".codex-global-state.json"));
        assert!(is_file_item("config.toml"));
    }

    #[test]
    fn test_status_detect() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("sessions");
        assert_eq!(ItemStatus::detect(&path), ItemStatus::Missing);
        assert_eq!(ItemStatus::Missing.to_string(), "(missing)");

        fs::create_dir(&path).unwrap();
        assert_eq!(ItemStatus::detect(&path), ItemStatus::Local);
        assert_eq!(ItemStatus::Local.to_string(), "(local)");

        fs::remove_dir(&path).unwrap();
        let shared = temp.path().join("shared");
        fs::create_dir(&shared).unwrap();
        make_symlink(&shared, &path).unwrap();
        let status = ItemStatus::detect(&path);
        assert_eq!(status, ItemStatus::Symlink { target: shared.clone() });
        assert_eq!(status.to_string(), shared.display().to_string());

        fs::remove_dir(&shared).unwrap();
        assert!(matches!(
            ItemStatus::detect(&path),
            ItemStatus::BrokenSymlink { .. }
        ));
    }
}
