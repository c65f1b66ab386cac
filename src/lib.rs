pub mod auth;
pub mod backup;
pub mod commands;
pub mod doctor;
pub mod error;
pub mod fs_utils;
pub mod items;
pub mod paths;
pub mod profiles;
pub mod sharing;
pub mod state;
pub mod switch;
pub mod ui;

#[cfg(test)]
pub mod test_utils;

pub use error::ProfileError;
pub use profiles::{DirectoryRepository, Profile, ProfileRepository};
