//! Legacy resume database (`resume.dat`) reader.
//!
//! The database is one bencoded dictionary keyed by the metadata file path
//! (relative to the client directory, absolute, or a magnet link). Two keys
//! hold client bookkeeping rather than torrents and are skipped.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::bencode::{BencodeError, BencodeValue};
use crate::text;
use crate::torrent::MagnetParser;

/// File name of the legacy database inside the source directory.
pub const RESUME_FILE_NAME: &str = "resume.dat";

const BOOKKEEPING_KEYS: [&[u8]; 2] = [b".fileguard", b"rec"];

/// Errors that occur while reading the legacy database.
#[derive(Debug, thiserror::Error)]
pub enum ResumeError {
    #[error("Failed to read resume database {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Resume database is not valid bencode: {0}")]
    Codec(#[from] BencodeError),

    #[error("Invalid resume entry {key}: {reason}")]
    InvalidEntry { key: String, reason: String },
}

/// A rename recorded by the legacy client for one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenameTarget {
    pub index: usize,
    pub path: Vec<u8>,
}

/// One torrent's state in the legacy database.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceEntry {
    /// Database key: metadata file path or magnet link
    pub key: String,
    pub caption: Option<String>,
    /// Save path as stored (raw bytes, possibly CESU-8)
    pub path: Vec<u8>,
    pub priorities: Vec<u8>,
    pub label: Option<String>,
    pub labels: Vec<String>,
    pub trackers: Vec<String>,
    pub targets: Vec<RenameTarget>,
    pub started: i64,
    pub added_on: i64,
    pub completed_on: i64,
    pub runtime: i64,
    pub seedtime: i64,
    pub downloaded: i64,
    pub uploaded: i64,
    /// Entry carries the `unfinished` marker
    pub unfinished: bool,
}

impl SourceEntry {
    /// Builds an entry from its database dictionary.
    ///
    /// Optional fields fall back to defaults; only a missing save path or a
    /// malformed rename list rejects the entry.
    ///
    /// # Errors
    ///
    /// - `ResumeError::InvalidEntry` - If the value is not a dictionary or lacks `path`
    pub fn from_bencode(key: &str, value: &BencodeValue) -> Result<Self, ResumeError> {
        let invalid = |reason: &str| ResumeError::InvalidEntry {
            key: key.to_string(),
            reason: reason.to_string(),
        };

        let BencodeValue::Dictionary(dict) = value else {
            return Err(invalid("entry is not a dictionary"));
        };

        let path = dict
            .get(b"path".as_slice())
            .and_then(BencodeValue::as_bytes)
            .ok_or_else(|| invalid("missing save path"))?
            .to_vec();

        let integer = |field: &[u8]| {
            dict.get(field)
                .and_then(BencodeValue::as_integer)
                .unwrap_or_default()
        };
        let string = |field: &[u8]| {
            dict.get(field)
                .and_then(BencodeValue::as_bytes)
                .filter(|bytes| !bytes.is_empty())
                .map(text::decode_text)
        };
        let strings = |field: &[u8]| {
            dict.get(field)
                .map(BencodeValue::flatten_strings)
                .unwrap_or_default()
                .iter()
                .filter(|bytes| !bytes.is_empty())
                .map(|bytes| text::decode_text(bytes))
                .collect::<Vec<_>>()
        };

        let targets = match dict.get(b"targets".as_slice()) {
            Some(targets) => Self::parse_targets(targets).map_err(|reason| invalid(&reason))?,
            None => Vec::new(),
        };

        Ok(Self {
            key: key.to_string(),
            caption: string(b"caption"),
            path,
            priorities: dict
                .get(b"prio".as_slice())
                .and_then(BencodeValue::as_bytes)
                .map(<[u8]>::to_vec)
                .unwrap_or_default(),
            label: string(b"label"),
            labels: strings(b"labels"),
            trackers: strings(b"trackers"),
            targets,
            started: integer(b"started"),
            added_on: integer(b"added_on"),
            completed_on: integer(b"completed_on"),
            runtime: integer(b"runtime"),
            seedtime: integer(b"seedtime"),
            downloaded: integer(b"downloaded"),
            uploaded: integer(b"uploaded"),
            unfinished: dict.contains_key(b"unfinished".as_slice()),
        })
    }

    /// Parses `[[index, path], ...]`.
    fn parse_targets(value: &BencodeValue) -> Result<Vec<RenameTarget>, String> {
        let items = value.as_list().ok_or("targets is not a list")?;

        items
            .iter()
            .map(|item| match item.as_list() {
                Some([BencodeValue::Integer(index), BencodeValue::Bytes(path)]) => {
                    let index = usize::try_from(*index)
                        .map_err(|_| format!("negative target index {index}"))?;
                    Ok(RenameTarget {
                        index,
                        path: path.clone(),
                    })
                }
                _ => Err("malformed target pair".to_string()),
            })
            .collect()
    }

    /// Save path with CESU-8 repaired.
    pub fn decoded_path(&self) -> String {
        text::decode_text(&self.path)
    }

    /// True when the torrent was added from a magnet link without metadata.
    pub fn is_magnet(&self) -> bool {
        MagnetParser::is_magnet(&self.key)
    }

    /// True when the legacy client had the torrent running.
    pub fn is_started(&self) -> bool {
        self.started != 0
    }
}

/// Parses the whole database, one result per torrent key.
///
/// # Errors
///
/// - `ResumeError::Codec` - If the data is not a bencoded dictionary
pub fn parse_resume_database(
    data: &[u8],
) -> Result<Vec<Result<SourceEntry, ResumeError>>, ResumeError> {
    let root: BTreeMap<Vec<u8>, BencodeValue> = BencodeValue::decode_dictionary(data)?;

    Ok(root
        .iter()
        .filter(|(key, _)| !BOOKKEEPING_KEYS.contains(&key.as_slice()))
        .map(|(key, value)| SourceEntry::from_bencode(&text::decode_text(key), value))
        .collect())
}

/// Reads `resume.dat` from `source_dir`.
///
/// # Errors
///
/// - `ResumeError::Io` - If the file cannot be read
/// - `ResumeError::Codec` - If the data is not a bencoded dictionary
pub async fn load_resume_database(
    source_dir: &Path,
) -> Result<Vec<Result<SourceEntry, ResumeError>>, ResumeError> {
    let path = source_dir.join(RESUME_FILE_NAME);
    let data = tokio::fs::read(&path)
        .await
        .map_err(|source| ResumeError::Io {
            path: path.clone(),
            source,
        })?;

    parse_resume_database(&data)
}
