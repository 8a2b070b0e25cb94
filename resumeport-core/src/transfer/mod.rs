//! Migration of resume entries into destination records.
//!
//! [`migrate`] is the whole run: load the database, collect tags, fan out one
//! task per entry and sync tags once every task has finished.

mod orchestrator;
mod task;

use std::fmt;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

pub use orchestrator::run_migration;
pub use task::TorrentLocator;

use crate::config::MigrationConfig;
use crate::layout::{PathResolveError, ReplaceRule};
use crate::paths::PathSeparator;
use crate::pieces::PieceError;
use crate::resume::{self, ResumeError};
use crate::tags::{self, TagSet};
use crate::torrent::{InfoHash, TorrentError};
use crate::MigrateError;

/// Everything a run needs besides the entries themselves.
#[derive(Debug, Clone)]
pub struct TransferOptions {
    /// Directory holding `resume.dat` and, usually, the `.torrent` files
    pub source_dir: PathBuf,
    /// qBittorrent `BT_backup` directory
    pub destination_dir: PathBuf,
    /// Extra directories searched for `.torrent` files, in order
    pub search_dirs: Vec<PathBuf>,
    pub replace_rules: Vec<ReplaceRule>,
    pub separator: PathSeparator,
    pub without_labels: bool,
    pub without_tags: bool,
    /// qBittorrent configuration file to merge tags into
    pub config_file: Option<PathBuf>,
    pub concurrency: usize,
    pub libtorrent_version: String,
}

impl TransferOptions {
    pub fn new(source_dir: impl Into<PathBuf>, destination_dir: impl Into<PathBuf>) -> Self {
        Self::with_config(source_dir, destination_dir, &MigrationConfig::default())
    }

    pub fn with_config(
        source_dir: impl Into<PathBuf>,
        destination_dir: impl Into<PathBuf>,
        config: &MigrationConfig,
    ) -> Self {
        Self {
            source_dir: source_dir.into(),
            destination_dir: destination_dir.into(),
            search_dirs: Vec::new(),
            replace_rules: Vec::new(),
            separator: PathSeparator::host(),
            without_labels: false,
            without_tags: false,
            config_file: None,
            concurrency: config.concurrency.effective_limit(),
            libtorrent_version: config.record.libtorrent_version.clone(),
        }
    }
}

/// Per-entry failure.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("Torrent file for {key} not found in any search directory")]
    TorrentNotFound { key: String },

    #[error("Torrent error: {0}")]
    Torrent(#[from] TorrentError),

    #[error("Resume entry error: {0}")]
    Resume(#[from] ResumeError),

    #[error("Save path error: {0}")]
    Path(#[from] PathResolveError),

    #[error("Piece reconstruction error: {0}")]
    Pieces(#[from] PieceError),

    #[error("Failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Task panicked: {reason}")]
    Panicked { reason: String },
}

/// Result of one entry, sent back to the orchestrator.
#[derive(Debug)]
pub enum TransferOutcome {
    Migrated {
        key: String,
        info_hash: InfoHash,
        /// Destination record already existed and was left untouched
        skipped: bool,
    },
    Failed {
        key: String,
        error: TransferError,
    },
}

/// Summary of a run.
#[derive(Debug, Default)]
pub struct MigrationReport {
    pub migrated: usize,
    pub skipped: usize,
    pub failures: Vec<(String, TransferError)>,
    /// Tags newly written to the destination configuration
    pub tags_added: usize,
}

impl MigrationReport {
    pub fn record(&mut self, outcome: TransferOutcome) {
        match outcome {
            TransferOutcome::Migrated { skipped: true, .. } => self.skipped += 1,
            TransferOutcome::Migrated { .. } => self.migrated += 1,
            TransferOutcome::Failed { key, error } => self.failures.push((key, error)),
        }
    }

    /// Entries that ended with a destination record, including skipped ones.
    pub fn succeeded(&self) -> usize {
        self.migrated + self.skipped
    }

    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }
}

impl fmt::Display for MigrationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} succeeded ({} migrated, {} already present), {} failed",
            self.succeeded(),
            self.migrated,
            self.skipped,
            self.failures.len()
        )
    }
}

/// Runs a complete migration.
///
/// # Errors
///
/// - `MigrateError::SourceNotFound` - If the source directory does not exist
/// - `MigrateError::DestinationNotFound` - If the destination directory does not exist
/// - `MigrateError::Resume` - If `resume.dat` cannot be read or decoded
/// - `MigrateError::Tags` - If the configuration file cannot be updated
pub async fn migrate(options: TransferOptions) -> Result<MigrationReport, MigrateError> {
    if !is_dir(&options.source_dir).await {
        return Err(MigrateError::SourceNotFound {
            path: options.source_dir,
        });
    }
    if !is_dir(&options.destination_dir).await {
        return Err(MigrateError::DestinationNotFound {
            path: options.destination_dir,
        });
    }

    let parsed = resume::load_resume_database(&options.source_dir).await?;
    let (entries, invalid): (Vec<_>, Vec<_>) = parsed.into_iter().partition(Result::is_ok);
    let entries: Vec<_> = entries.into_iter().flatten().collect();

    info!(
        entries = entries.len(),
        invalid = invalid.len(),
        "Loaded resume database"
    );

    let tag_set = TagSet::from_entries(&entries);
    let config_file = options.config_file.clone();
    let without_tags = options.without_tags;

    let mut report = run_migration(options, entries).await;

    for error in invalid.into_iter().filter_map(Result::err) {
        let key = match &error {
            ResumeError::InvalidEntry { key, .. } => key.clone(),
            _ => String::new(),
        };
        warn!(%key, %error, "Skipping unreadable resume entry");
        report.record(TransferOutcome::Failed {
            key,
            error: error.into(),
        });
    }

    match config_file {
        Some(path) if !without_tags && !tag_set.is_empty() => {
            report.tags_added = tags::merge_into_config(&path, &tag_set).await?;
            info!(
                added = report.tags_added,
                config = %path.display(),
                "Synchronized tags"
            );
        }
        _ => {}
    }

    Ok(report)
}

async fn is_dir(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .is_ok_and(|metadata| metadata.is_dir())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_counts() {
        let mut report = MigrationReport::default();
        let hash = InfoHash::new([0; 20]);

        report.record(TransferOutcome::Migrated {
            key: "a".to_string(),
            info_hash: hash,
            skipped: false,
        });
        report.record(TransferOutcome::Migrated {
            key: "b".to_string(),
            info_hash: hash,
            skipped: true,
        });
        report.record(TransferOutcome::Failed {
            key: "c".to_string(),
            error: TransferError::TorrentNotFound {
                key: "c".to_string(),
            },
        });

        assert_eq!(report.succeeded(), 2);
        assert!(report.has_failures());
        assert_eq!(
            report.to_string(),
            "2 succeeded (1 migrated, 1 already present), 1 failed"
        );
    }

    #[tokio::test]
    async fn test_missing_destination_is_fatal() {
        let source = tempfile::tempdir().unwrap();
        let options = TransferOptions::new(source.path(), source.path().join("missing"));

        let result = migrate(options).await;
        assert!(matches!(result, Err(MigrateError::DestinationNotFound { .. })));
    }
}
