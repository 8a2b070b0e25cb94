//! Torrent metadata files and magnet identifiers.

pub mod magnet;
pub mod metadata;

use std::fmt;

pub use magnet::{MagnetLink, MagnetParser};
pub use metadata::{MetadataParser, TorrentFile, TorrentMetadata, TorrentSource};

use crate::bencode::BencodeError;

/// Content address of a torrent.
///
/// SHA-1 of the raw info dictionary for torrents carrying v1 data, or the
/// first 20 bytes of its SHA-256 for v2-only torrents. Used to name the
/// destination files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InfoHash([u8; 20]);

impl InfoHash {
    /// Creates InfoHash from a 20-byte digest.
    pub fn new(hash: [u8; 20]) -> Self {
        Self(hash)
    }

    /// Returns reference to underlying 20-byte hash.
    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    /// Lowercase hex form used in destination file names.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for InfoHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Errors that can occur while reading torrent metadata.
#[derive(Debug, thiserror::Error)]
pub enum TorrentError {
    #[error("Failed to parse torrent file: {reason}")]
    InvalidTorrentFile { reason: String },

    #[error("Invalid magnet link: {reason}")]
    InvalidMagnet { reason: String },

    #[error("Bencode error: {0}")]
    Codec(#[from] BencodeError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
