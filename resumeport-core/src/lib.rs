//! Resumeport Core - legacy client resume state to qBittorrent fastresume
//!
//! Reads the legacy client's `resume.dat`, reconstructs per-piece completion
//! and save paths for every torrent, and writes one `.fastresume` record plus
//! a copy of the `.torrent` file per entry into the destination directory.

pub mod bencode;
pub mod config;
pub mod fastresume;
pub mod layout;
pub mod paths;
pub mod pieces;
pub mod priority;
pub mod resume;
pub mod tags;
pub mod text;
pub mod torrent;
pub mod tracing_setup;
pub mod transfer;

use std::path::PathBuf;

// Re-export main types for convenient access
pub use config::MigrationConfig;
pub use layout::{ContentLayout, PathResolveError, ReplaceRule, SavePathResolver};
pub use paths::PathSeparator;
pub use resume::{ResumeError, SourceEntry};
pub use tags::{TagSet, TagsError};
pub use torrent::{InfoHash, TorrentError};
pub use transfer::{MigrationReport, TransferError, TransferOptions, migrate, run_migration};

/// Errors that abort a whole migration run.
///
/// Per-entry problems never surface here; they are collected in the
/// [`MigrationReport`] instead.
#[derive(Debug, thiserror::Error)]
pub enum MigrateError {
    #[error("Source directory {} does not exist", path.display())]
    SourceNotFound { path: PathBuf },

    #[error("Destination directory {} does not exist", path.display())]
    DestinationNotFound { path: PathBuf },

    #[error("Resume database error: {0}")]
    Resume(#[from] ResumeError),

    #[error("Configuration sync error: {0}")]
    Tags(#[from] TagsError),

    #[error("Configuration error: {reason}")]
    Configuration { reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl MigrateError {
    /// Returns a user-friendly error message suitable for display.
    pub fn user_message(&self) -> String {
        match self {
            MigrateError::SourceNotFound { path } => {
                format!("Source directory not found: {}", path.display())
            }
            MigrateError::DestinationNotFound { path } => {
                format!("Destination directory not found: {}", path.display())
            }
            MigrateError::Resume(e) => match e {
                ResumeError::Io { path, .. } => {
                    format!("Could not read {}", path.display())
                }
                ResumeError::Codec(_) => "resume.dat is damaged or not a resume database".to_string(),
                ResumeError::InvalidEntry { key, .. } => format!("Invalid resume entry {key}"),
            },
            MigrateError::Tags(_) => "Could not update the qBittorrent configuration".to_string(),
            MigrateError::Configuration { reason } => format!("Invalid configuration: {reason}"),
            MigrateError::Io(_) => "File system error occurred".to_string(),
        }
    }

    /// Checks if this error is due to user input validation.
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            MigrateError::SourceNotFound { .. }
                | MigrateError::DestinationNotFound { .. }
                | MigrateError::Configuration { .. }
                | MigrateError::Resume(ResumeError::Io { .. })
        )
    }
}

pub type Result<T> = std::result::Result<T, MigrateError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_errors() {
        let missing = MigrateError::DestinationNotFound {
            path: PathBuf::from("/nowhere"),
        };
        assert!(missing.is_user_error());
        assert!(missing.user_message().contains("/nowhere"));

        let damaged = MigrateError::Resume(ResumeError::Codec(bencode::BencodeError::Empty));
        assert!(!damaged.is_user_error());
        assert!(damaged.user_message().contains("damaged"));
    }
}
