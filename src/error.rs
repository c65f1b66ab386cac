use std::path::PathBuf;
use thiserror::Error;

/// Domain errors surfaced by the profile store.
///
/// These travel inside `anyhow::Error`; callers that need to branch on them
/// use `err.downcast_ref::<ProfileError>()`.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ProfileError {
    /// The named profile has no snapshot directory.
    #[error("profile '{0}' not found")]
    NotFound(String),

    /// `save` was called while the live Codex directory does not exist.
    #[error("{} not found - please log in first with 'codex login'", .0.display())]
    NotLoggedIn(PathBuf),

    #[error(
        "invalid name '{0}': only alphanumeric characters, hyphens (-), and underscores (_) are allowed (max 64)"
    )]
    InvalidName(String),
}
