use anyhow::{Context, Result};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::path::Path;
use tracing::{debug, warn};

/// State stored in ~/.codex-switch/state.json
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct ActiveState {
    /// The profile whose data currently lives in ~/.codex ("" if none)
    #[serde(default)]
    pub current: String,

    /// The profile that was active before `current`
    #[serde(default)]
    pub previous: String,
}

impl ActiveState {
    /// Read state from file, falling back to the default if it is missing or corrupt
    pub fn load(path: &Path) -> Self {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Self::default(),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Unreadable state file, ignoring");
                return Self::default();
            }
        };

        serde_json::from_str(&content).unwrap_or_else(|e| {
            warn!(path = %path.display(), error = %e, "Corrupt state file, ignoring");
            Self::default()
        })
    }

    /// Write state to file atomically: write to a temp file, then rename.
    pub fn write(&self, path: &Path) -> Result<()> {
        write_json_atomic(path, self)
    }

    /// Shift `current` into `previous` and make `name` current.
    pub fn advance(&mut self, name: &str) {
        self.previous = std::mem::take(&mut self.current);
        self.current = name.to_string();
    }

    /// Load, advance and write back in one step.
    pub fn record(path: &Path, name: &str) -> Result<Self> {
        let mut state = Self::load(path);
        state.advance(name);
        state.write(path)?;
        debug!(current = %state.current, previous = %state.previous, "Recorded active profile");
        Ok(state)
    }
}

/// Serialize `value` as pretty JSON into `path` via a sibling temp file.
pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }

    let content = serde_json::to_string_pretty(value)
        .with_context(|| format!("Failed to serialize {}", path.display()))?;

    let temp_path = path.with_extension("json.tmp");
    std::fs::write(&temp_path, &content)
        .with_context(|| format!("Failed to write temp file: {}", temp_path.display()))?;

    std::fs::rename(&temp_path, path).with_context(|| {
        format!(
            "Failed to rename {} -> {}",
            temp_path.display(),
            path.display()
        )
    })
}

/// Exclusive advisory lock held for the duration of a mutating operation.
///
/// The lock is released when the guard is dropped. Acquiring it twice from
/// the same process deadlocks, so locked operations never call each other.
pub struct OperationLock {
    file: File,
}

impl OperationLock {
    /// Open the lock file and block until the exclusive lock is ours
    pub fn acquire(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .with_context(|| format!("Failed to open lock file: {}", path.display()))?;

        file.lock_exclusive()
            .with_context(|| format!("Failed to lock {}", path.display()))?;
        debug!(path = %path.display(), "Acquired operation lock");

        Ok(Self { file })
    }
}

impl Drop for OperationLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}
