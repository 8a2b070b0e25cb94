//! Torrent file parsing and content address calculation

use std::collections::BTreeMap;
use std::path::Path;

use sha1::{Digest, Sha1};
use sha2::Sha256;

use super::{InfoHash, TorrentError};
use crate::bencode::{self, BencodeValue};
use crate::pieces::PieceLayout;

type BencodeDict = BTreeMap<Vec<u8>, BencodeValue>;
type ParseResult<T> = Result<T, TorrentError>;

const PIECE_HASH_LEN: usize = 20;

/// Static description of a torrent, taken from its info dictionary.
///
/// Names and path components are kept as raw bytes because the legacy
/// client may have written them as CESU-8.
#[derive(Debug, Clone, PartialEq)]
pub struct TorrentMetadata {
    pub name: Vec<u8>,
    pub name_utf8: Option<Vec<u8>>,
    pub piece_length: u64,
    pub piece_count: usize,
    pub total_length: u64,
    /// Empty for single-file torrents.
    pub files: Vec<TorrentFile>,
    /// True when the info dictionary carries a v2 `file tree`.
    pub has_piece_roots: bool,
    /// v2-only torrents start every file on a piece boundary.
    pub piece_aligned_files: bool,
}

impl TorrentMetadata {
    /// Name to use for path decisions, preferring the UTF-8 variant.
    pub fn preferred_name(&self) -> &[u8] {
        self.name_utf8.as_deref().unwrap_or(&self.name)
    }

    pub fn is_single_file(&self) -> bool {
        self.files.is_empty()
    }

    pub fn file_lengths(&self) -> Vec<u64> {
        self.files.iter().map(|file| file.length).collect()
    }

    pub fn padding_mask(&self) -> Vec<bool> {
        self.files.iter().map(|file| file.padding).collect()
    }

    pub fn piece_layout(&self) -> PieceLayout {
        PieceLayout {
            piece_length: self.piece_length,
            piece_count: self.piece_count,
            piece_aligned_files: self.piece_aligned_files,
        }
    }
}

/// Individual file within a multi-file torrent.
#[derive(Debug, Clone, PartialEq)]
pub struct TorrentFile {
    pub length: u64,
    pub path: Vec<Vec<u8>>,
    pub path_utf8: Option<Vec<Vec<u8>>>,
    pub padding: bool,
}

impl TorrentFile {
    /// Path components, preferring the UTF-8 variant.
    pub fn preferred_path(&self) -> &[Vec<u8>] {
        self.path_utf8.as_deref().unwrap_or(&self.path)
    }
}

/// A parsed torrent together with the bytes it was read from.
#[derive(Debug, Clone)]
pub struct TorrentSource {
    pub metadata: TorrentMetadata,
    pub info_hash: InfoHash,
    pub raw: Vec<u8>,
}

/// Bencode parsing utilities for torrent metadata extraction.
pub struct MetadataParser;

impl MetadataParser {
    /// Reads and parses a `.torrent` file.
    ///
    /// # Errors
    ///
    /// - `TorrentError::Io` - If the file cannot be read
    /// - Any error from [`MetadataParser::parse_torrent_bytes`]
    pub async fn parse_torrent_file(path: &Path) -> ParseResult<TorrentSource> {
        let raw = tokio::fs::read(path).await?;
        Self::parse_torrent_bytes(raw)
    }

    /// Parses torrent bytes and computes the content address.
    ///
    /// The bytes are decoded once into structured metadata, and the info
    /// dictionary is hashed from its original encoded span.
    ///
    /// # Errors
    ///
    /// - `TorrentError::Codec` - If the bytes are not a bencoded dictionary
    /// - `TorrentError::InvalidTorrentFile` - If required fields are missing or invalid
    pub fn parse_torrent_bytes(raw: Vec<u8>) -> ParseResult<TorrentSource> {
        let root = BencodeValue::decode_dictionary(&raw)?;
        let info = match root.get(b"info".as_slice()) {
            Some(BencodeValue::Dictionary(info)) => info,
            Some(_) => return Err(invalid("Info field must be dictionary")),
            None => return Err(invalid("Missing 'info' field")),
        };

        let metadata = Self::extract_metadata(info)?;

        let info_bytes = bencode::raw_dictionary_value(&raw, b"info")?
            .ok_or_else(|| invalid("Could not find info dictionary in data"))?;
        let info_hash = Self::calculate_info_hash(info_bytes, info.contains_key(b"pieces".as_slice()));

        Ok(TorrentSource {
            metadata,
            info_hash,
            raw,
        })
    }

    /// Hashes the raw info dictionary bytes.
    fn calculate_info_hash(info_bytes: &[u8], has_v1_pieces: bool) -> InfoHash {
        let mut hash = [0u8; 20];
        if has_v1_pieces {
            hash.copy_from_slice(&Sha1::digest(info_bytes));
        } else {
            hash.copy_from_slice(&Sha256::digest(info_bytes)[..20]);
        }
        InfoHash::new(hash)
    }

    fn extract_metadata(info: &BencodeDict) -> ParseResult<TorrentMetadata> {
        let name = Self::extract_bytes(info, b"name")?.to_vec();
        let name_utf8 = Self::optional_bytes(info, b"name.utf-8");

        let piece_length = Self::extract_integer(info, b"piece length")?;
        let piece_length =
            u64::try_from(piece_length).map_err(|_| invalid("Negative piece length"))?;

        let file_tree = info.get(b"file tree".as_slice());
        let has_piece_roots = file_tree.is_some();

        let (files, total_length) = if let Ok(length) = Self::extract_integer(info, b"length") {
            let length = u64::try_from(length).map_err(|_| invalid("Negative file length"))?;
            (Vec::new(), length)
        } else if let Some(BencodeValue::List(files_list)) = info.get(b"files".as_slice()) {
            Self::extract_files_info(files_list)?
        } else if let Some(BencodeValue::Dictionary(tree)) = file_tree {
            Self::extract_file_tree(tree)?
        } else {
            return Err(invalid("Missing 'files', 'length' or 'file tree' field"));
        };

        let piece_aligned_files = has_piece_roots && !info.contains_key(b"pieces".as_slice());
        let piece_count = match info.get(b"pieces".as_slice()) {
            Some(BencodeValue::Bytes(pieces)) => {
                if !pieces.len().is_multiple_of(PIECE_HASH_LEN) {
                    return Err(invalid("Invalid pieces length"));
                }
                pieces.len() / PIECE_HASH_LEN
            }
            Some(_) => return Err(invalid("Invalid pieces field")),
            None if piece_length == 0 => return Err(invalid("Zero piece length")),
            None if piece_aligned_files && !files.is_empty() => files
                .iter()
                .map(|file| file.length.div_ceil(piece_length) as usize)
                .sum(),
            None => total_length.div_ceil(piece_length) as usize,
        };

        Ok(TorrentMetadata {
            name,
            name_utf8,
            piece_length,
            piece_count,
            total_length,
            files,
            has_piece_roots,
            piece_aligned_files,
        })
    }

    /// Extract files information from a v1 file list
    fn extract_files_info(files_list: &[BencodeValue]) -> ParseResult<(Vec<TorrentFile>, u64)> {
        let mut files = Vec::with_capacity(files_list.len());
        let mut total_length = 0u64;

        for file_value in files_list {
            let BencodeValue::Dictionary(file_dict) = file_value else {
                return Err(invalid("Invalid file entry type"));
            };

            let length = Self::extract_integer(file_dict, b"length")?;
            let length = u64::try_from(length).map_err(|_| invalid("Negative file length"))?;
            total_length += length;

            let path = Self::extract_path(file_dict, b"path")?
                .ok_or_else(|| invalid("Missing or invalid path in file"))?;
            let path_utf8 = Self::extract_path(file_dict, b"path.utf-8")?;
            let padding = Self::optional_bytes(file_dict, b"attr")
                .is_some_and(|attr| attr.contains(&b'p'));

            files.push(TorrentFile {
                length,
                path,
                path_utf8,
                padding,
            });
        }

        Ok((files, total_length))
    }

    /// Flattens a v2 file tree depth-first in key order.
    ///
    /// A tree holding a single top-level file describes a single-file
    /// torrent and yields an empty file list.
    fn extract_file_tree(tree: &BencodeDict) -> ParseResult<(Vec<TorrentFile>, u64)> {
        let mut files = Vec::new();
        Self::walk_file_tree(tree, &mut Vec::new(), &mut files)?;

        let total_length = files.iter().map(|file| file.length).sum();
        if files.len() == 1 && files[0].path.len() == 1 {
            files.clear();
        }

        Ok((files, total_length))
    }

    fn walk_file_tree(
        node: &BencodeDict,
        prefix: &mut Vec<Vec<u8>>,
        files: &mut Vec<TorrentFile>,
    ) -> ParseResult<()> {
        for (component, child) in node {
            let BencodeValue::Dictionary(child) = child else {
                return Err(invalid("Invalid file tree node"));
            };

            prefix.push(component.clone());
            match child.get(b"".as_slice()) {
                Some(BencodeValue::Dictionary(leaf)) => {
                    let length = Self::extract_integer(leaf, b"length")?;
                    let length =
                        u64::try_from(length).map_err(|_| invalid("Negative file length"))?;
                    files.push(TorrentFile {
                        length,
                        path: prefix.clone(),
                        path_utf8: None,
                        padding: false,
                    });
                }
                Some(_) => return Err(invalid("Invalid file tree leaf")),
                None => Self::walk_file_tree(child, prefix, files)?,
            }
            prefix.pop();
        }

        Ok(())
    }

    fn extract_path(dict: &BencodeDict, key: &[u8]) -> ParseResult<Option<Vec<Vec<u8>>>> {
        let Some(value) = dict.get(key) else {
            return Ok(None);
        };
        let BencodeValue::List(components) = value else {
            return Err(invalid("Invalid path list"));
        };

        components
            .iter()
            .map(|component| {
                component
                    .as_bytes()
                    .map(<[u8]>::to_vec)
                    .ok_or_else(|| invalid("Invalid path component type"))
            })
            .collect::<ParseResult<Vec<_>>>()
            .map(Some)
    }

    /// Extract bytes from bencode dictionary
    fn extract_bytes<'a>(dict: &'a BencodeDict, key: &[u8]) -> ParseResult<&'a [u8]> {
        match dict.get(key) {
            Some(BencodeValue::Bytes(bytes)) => Ok(bytes),
            _ => Err(invalid(&format!(
                "Missing or invalid field: {:?}",
                String::from_utf8_lossy(key)
            ))),
        }
    }

    fn optional_bytes(dict: &BencodeDict, key: &[u8]) -> Option<Vec<u8>> {
        dict.get(key).and_then(BencodeValue::as_bytes).map(<[u8]>::to_vec)
    }

    /// Extract integer from bencode dictionary
    fn extract_integer(dict: &BencodeDict, key: &[u8]) -> ParseResult<i64> {
        match dict.get(key) {
            Some(BencodeValue::Integer(value)) => Ok(*value),
            _ => Err(invalid(&format!(
                "Missing or invalid integer field: {:?}",
                String::from_utf8_lossy(key)
            ))),
        }
    }
}

fn invalid(reason: &str) -> TorrentError {
    TorrentError::InvalidTorrentFile {
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PIECES_1: &str = "12345678901234567890";

    fn single_file_torrent() -> Vec<u8> {
        format!(
            "d8:announce9:test:80804:infod6:lengthi1000e4:name8:test.txt12:piece lengthi32768e6:pieces20:{PIECES_1}ee"
        )
        .into_bytes()
    }

    #[test]
    fn test_single_file_torrent() {
        let source = MetadataParser::parse_torrent_bytes(single_file_torrent()).unwrap();
        let metadata = &source.metadata;

        assert_eq!(metadata.name, b"test.txt");
        assert_eq!(metadata.piece_length, 32768);
        assert_eq!(metadata.total_length, 1000);
        assert_eq!(metadata.piece_count, 1);
        assert!(metadata.is_single_file());
        assert!(!metadata.has_piece_roots);
    }

    #[test]
    fn test_info_hash_uses_raw_info_bytes() {
        let raw = single_file_torrent();
        let source = MetadataParser::parse_torrent_bytes(raw.clone()).unwrap();

        let start = raw.windows(6).position(|w| w == b"4:info").unwrap() + 6;
        let info = &raw[start..raw.len() - 1];
        assert_eq!(
            source.info_hash.as_bytes().as_slice(),
            Sha1::digest(info).as_slice()
        );
        assert_eq!(source.raw, raw);
    }

    #[test]
    fn test_multi_file_torrent_with_utf8_paths() {
        let raw = format!(
            "d4:infod5:filesld6:lengthi500e4:pathl3:dir5:a.txte10:path.utf-8l3:dir5:b.txteed4:attr1:p6:lengthi12e4:pathl4:.pad2:12eed6:lengthi300e4:pathl5:c.txteee4:name4:root12:piece lengthi512e6:pieces40:{PIECES_1}{PIECES_1}ee"
        )
        .into_bytes();

        let metadata = MetadataParser::parse_torrent_bytes(raw).unwrap().metadata;

        assert_eq!(metadata.total_length, 812);
        assert_eq!(metadata.piece_count, 2);
        assert_eq!(metadata.files.len(), 3);
        assert_eq!(
            metadata.files[0].preferred_path(),
            &[b"dir".to_vec(), b"b.txt".to_vec()]
        );
        assert_eq!(metadata.padding_mask(), vec![false, true, false]);
        assert_eq!(metadata.file_lengths(), vec![500, 12, 300]);
    }

    #[test]
    fn test_v2_file_tree_flattening() {
        let raw = b"d4:infod9:file treed5:a.bind0:d6:lengthi20eee3:subd5:b.bind0:d6:lengthi40eeeee12:meta versioni2e4:name4:root12:piece lengthi16eee".to_vec();

        let source = MetadataParser::parse_torrent_bytes(raw).unwrap();
        let metadata = &source.metadata;

        assert!(metadata.has_piece_roots);
        assert!(metadata.piece_aligned_files);
        assert_eq!(metadata.total_length, 60);
        // 20 bytes take two pieces and 40 bytes take three
        assert_eq!(metadata.piece_count, 5);
        assert_eq!(metadata.files[0].path, vec![b"a.bin".to_vec()]);
        assert_eq!(
            metadata.files[1].path,
            vec![b"sub".to_vec(), b"b.bin".to_vec()]
        );
    }

    #[test]
    fn test_v2_single_file_tree() {
        let raw = b"d4:infod9:file treed5:a.bind0:d6:lengthi20eeee12:meta versioni2e4:name5:a.bin12:piece lengthi16eee".to_vec();
        let metadata = MetadataParser::parse_torrent_bytes(raw).unwrap().metadata;

        assert!(metadata.is_single_file());
        assert_eq!(metadata.piece_count, 2);
    }

    #[test]
    fn test_missing_info_field() {
        let result = MetadataParser::parse_torrent_bytes(b"d8:announce9:test:8080e".to_vec());
        assert!(result.unwrap_err().to_string().contains("Missing 'info' field"));
    }

    #[test]
    fn test_invalid_pieces_length() {
        let raw = b"d4:infod6:lengthi1000e4:name8:test.txt12:piece lengthi32768e6:pieces19:1234567890123456789ee".to_vec();
        let result = MetadataParser::parse_torrent_bytes(raw);
        assert!(result.unwrap_err().to_string().contains("Invalid pieces length"));
    }

    #[test]
    fn test_not_a_dictionary() {
        assert!(MetadataParser::parse_torrent_bytes(b"l4:teste".to_vec()).is_err());
    }

    #[tokio::test]
    async fn test_parse_torrent_file() {
        let temp_dir = tempfile::tempdir().unwrap();
        let file_path = temp_dir.path().join("test.torrent");
        tokio::fs::write(&file_path, single_file_torrent()).await.unwrap();

        let source = MetadataParser::parse_torrent_file(&file_path).await.unwrap();
        assert_eq!(source.metadata.name, b"test.txt");
    }

    #[tokio::test]
    async fn test_nonexistent_file() {
        let result =
            MetadataParser::parse_torrent_file(Path::new("/nonexistent/file.torrent")).await;
        assert!(matches!(result, Err(TorrentError::Io(_))));
    }
}
