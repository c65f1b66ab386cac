//! Test utilities shared across test modules

use crate::paths::Paths;
use std::fs;
use tempfile::TempDir;

/// Create a Paths struct rooted in a temporary home directory
///
/// Mirrors the real ~/.codex, ~/codex-data and ~/.codex-switch layout; nothing
/// is created on disk.
pub fn setup_test_paths(temp_dir: &TempDir) -> Paths {
    Paths::from_home(temp_dir.path())
}

/// Write `content` to `rel` inside the live ~/.codex, creating parents
pub fn write_live(paths: &Paths, rel: &str, content: &str) {
    let path = paths.codex_dir.join(rel);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, content).unwrap();
}
