//! Per-entry pipeline: locate, derive, write.

use std::path::{MAIN_SEPARATOR, Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::{debug, trace};

use super::{TransferError, TransferOptions};
use crate::fastresume::FastResume;
use crate::layout::SavePathResolver;
use crate::paths;
use crate::pieces;
use crate::priority;
use crate::resume::SourceEntry;
use crate::torrent::{InfoHash, MagnetParser, MetadataParser};

const FASTRESUME_EXTENSION: &str = "fastresume";
const TORRENT_EXTENSION: &str = "torrent";

/// Finds the `.torrent` file a resume entry was created from.
#[derive(Debug, Clone)]
pub struct TorrentLocator {
    source_dir: PathBuf,
    search_dirs: Vec<PathBuf>,
}

impl TorrentLocator {
    pub fn new(source_dir: PathBuf, search_dirs: Vec<PathBuf>) -> Self {
        Self {
            source_dir,
            search_dirs,
        }
    }

    /// Paths to try for `key`, in order.
    ///
    /// Absolute keys are tried verbatim first (same machine), then by file
    /// name in the source and search directories. Relative keys are resolved
    /// against the source directory, then each search directory with the full
    /// relative path and finally with the bare file name.
    pub fn candidates(&self, key: &str) -> Vec<PathBuf> {
        let file_name = paths::base_name(key);
        let mut candidates = Vec::new();

        if paths::is_absolute(key) {
            candidates.push(PathBuf::from(key));
            candidates.extend(
                std::iter::once(&self.source_dir)
                    .chain(&self.search_dirs)
                    .map(|dir| dir.join(&file_name)),
            );
        } else {
            let relative = native_relative(key);
            candidates.push(self.source_dir.join(&relative));
            for dir in &self.search_dirs {
                candidates.push(dir.join(&relative));
                candidates.push(dir.join(&file_name));
            }
        }

        let mut unique = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            if !unique.contains(&candidate) {
                unique.push(candidate);
            }
        }
        unique
    }

    pub async fn locate(&self, key: &str) -> Option<PathBuf> {
        for candidate in self.candidates(key) {
            trace!(candidate = %candidate.display(), "Probing torrent location");
            if is_file(&candidate).await {
                return Some(candidate);
            }
        }
        None
    }
}

fn native_relative(key: &str) -> String {
    key.replace(['/', '\\'], &MAIN_SEPARATOR.to_string())
}

async fn is_file(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .is_ok_and(|metadata| metadata.is_file())
}

/// Shared, read-only state of all entry tasks.
#[derive(Debug)]
pub(crate) struct TaskContext {
    pub options: TransferOptions,
    pub resolver: SavePathResolver,
    pub locator: TorrentLocator,
}

impl TaskContext {
    pub fn new(options: TransferOptions) -> Self {
        let resolver = SavePathResolver::new(options.separator, options.replace_rules.clone());
        let locator =
            TorrentLocator::new(options.source_dir.clone(), options.search_dirs.clone());
        Self {
            options,
            resolver,
            locator,
        }
    }

    fn destination_file(&self, info_hash: &InfoHash, extension: &str) -> PathBuf {
        self.options
            .destination_dir
            .join(format!("{}.{extension}", info_hash.to_hex()))
    }
}

/// What happened to one entry that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct MigratedEntry {
    pub info_hash: InfoHash,
    pub skipped: bool,
}

/// Converts one entry and writes its destination files.
///
/// # Errors
///
/// - `TransferError::TorrentNotFound` - If no candidate location holds the torrent file
/// - `TransferError::Torrent` - If the torrent file or magnet link is invalid
/// - `TransferError::Pieces` - If priorities do not match the file list
/// - `TransferError::Path` - If a rename target is out of range
/// - `TransferError::Write` - If a destination file cannot be written
pub(crate) async fn migrate_entry(
    context: &TaskContext,
    entry: &SourceEntry,
) -> Result<MigratedEntry, TransferError> {
    if entry.is_magnet() {
        return migrate_magnet(context, entry).await;
    }

    let torrent_path =
        context
            .locator
            .locate(&entry.key)
            .await
            .ok_or_else(|| TransferError::TorrentNotFound {
                key: entry.key.clone(),
            })?;
    debug!(key = %entry.key, path = %torrent_path.display(), "Found torrent file");

    let source = MetadataParser::parse_torrent_file(&torrent_path).await?;
    let metadata = &source.metadata;
    let fastresume_path = context.destination_file(&source.info_hash, FASTRESUME_EXTENSION);

    if tokio::fs::try_exists(&fastresume_path).await.unwrap_or(false) {
        debug!(key = %entry.key, hash = %source.info_hash, "Destination record exists, skipping");
        return Ok(MigratedEntry {
            info_hash: source.info_hash,
            skipped: true,
        });
    }

    let mut record = base_record(context, entry, source.info_hash);

    let priorities = priority::align_with_padding(
        priority::map_priorities(&entry.priorities, metadata.has_piece_roots),
        &metadata.padding_mask(),
    );
    let multi_file = !metadata.is_single_file();
    record.file_priority = priorities;
    record.apply_state(entry, multi_file);

    record.pieces = pieces::reconstruct_pieces(
        metadata.piece_layout(),
        &metadata.file_lengths(),
        &record.file_priority,
        entry.unfinished,
    )?;

    let resolved = context.resolver.resolve(entry, metadata)?;
    debug!(
        key = %entry.key,
        layout = %resolved.layout,
        save_path = %resolved.save_path,
        mapped = resolved.mapped_files.len(),
        "Resolved save path"
    );
    record.apply_paths(resolved);

    write_file(&fastresume_path, record.encode()).await?;

    let torrent_copy = context.destination_file(&source.info_hash, TORRENT_EXTENSION);
    tokio::fs::copy(&torrent_path, &torrent_copy)
        .await
        .map_err(|source| TransferError::Write {
            path: torrent_copy.clone(),
            source,
        })?;

    Ok(MigratedEntry {
        info_hash: source.info_hash,
        skipped: false,
    })
}

/// Entries added from a magnet link have no torrent file to copy.
async fn migrate_magnet(
    context: &TaskContext,
    entry: &SourceEntry,
) -> Result<MigratedEntry, TransferError> {
    let magnet = MagnetParser::parse_magnet_link(&entry.key)?;
    let fastresume_path = context.destination_file(&magnet.info_hash, FASTRESUME_EXTENSION);

    if tokio::fs::try_exists(&fastresume_path).await.unwrap_or(false) {
        return Ok(MigratedEntry {
            info_hash: magnet.info_hash,
            skipped: true,
        });
    }

    let mut record = base_record(context, entry, magnet.info_hash);
    for tracker in magnet.trackers {
        if !record.trackers.contains(&tracker) {
            record.trackers.push(tracker);
        }
    }
    if record.name.is_none() {
        record.name = magnet.display_name;
    }
    record.apply_state(entry, false);
    record.apply_paths(context.resolver.resolve_magnet(entry));

    write_file(&fastresume_path, record.encode()).await?;

    Ok(MigratedEntry {
        info_hash: magnet.info_hash,
        skipped: false,
    })
}

/// Fields that do not depend on torrent metadata.
fn base_record(context: &TaskContext, entry: &SourceEntry, info_hash: InfoHash) -> FastResume {
    let options = &context.options;
    let mut record = FastResume::new(info_hash, options.libtorrent_version.as_str());

    record.apply_timestamps(entry, unix_now());
    record.apply_labels(entry, options.without_labels, options.without_tags);
    record.trackers = entry.trackers.clone();
    record
}

async fn write_file(path: &Path, contents: Vec<u8>) -> Result<(), TransferError> {
    tokio::fs::write(path, contents)
        .await
        .map_err(|source| TransferError::Write {
            path: path.to_path_buf(),
            source,
        })
}

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| i64::try_from(elapsed.as_secs()).unwrap_or(i64::MAX))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relative_key_candidates() {
        let locator = TorrentLocator::new(
            PathBuf::from("/src"),
            vec![PathBuf::from("/extra")],
        );
        let candidates = locator.candidates("sub\\a.torrent");

        let sep = MAIN_SEPARATOR;
        assert_eq!(
            candidates,
            vec![
                PathBuf::from("/src").join(format!("sub{sep}a.torrent")),
                PathBuf::from("/extra").join(format!("sub{sep}a.torrent")),
                PathBuf::from("/extra").join("a.torrent"),
            ]
        );
    }

    #[test]
    fn test_absolute_key_candidates() {
        let locator = TorrentLocator::new(
            PathBuf::from("/src"),
            vec![PathBuf::from("/extra")],
        );
        let candidates = locator.candidates("C:\\Users\\me\\a.torrent");

        assert_eq!(
            candidates,
            vec![
                PathBuf::from("C:\\Users\\me\\a.torrent"),
                PathBuf::from("/src").join("a.torrent"),
                PathBuf::from("/extra").join("a.torrent"),
            ]
        );
    }

    #[tokio::test]
    async fn test_locate_falls_back_to_search_dir() {
        let source = tempfile::tempdir().unwrap();
        let extra = tempfile::tempdir().unwrap();
        tokio::fs::write(extra.path().join("a.torrent"), b"d4:infode")
            .await
            .unwrap();

        let locator = TorrentLocator::new(
            source.path().to_path_buf(),
            vec![extra.path().to_path_buf()],
        );

        assert_eq!(
            locator.locate("C:\\torrents\\a.torrent").await,
            Some(extra.path().join("a.torrent"))
        );
        assert_eq!(locator.locate("missing.torrent").await, None);
    }

    #[test]
    fn test_locate_ignores_directories() {
        let source = tempfile::tempdir().unwrap();
        std::fs::create_dir(source.path().join("a.torrent")).unwrap();
        let locator = TorrentLocator::new(source.path().to_path_buf(), Vec::new());

        assert_eq!(tokio_test::block_on(locator.locate("a.torrent")), None);
    }
}
