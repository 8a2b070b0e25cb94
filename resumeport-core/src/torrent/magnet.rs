//! Magnet link parsing utilities

use data_encoding::BASE32;

use super::{InfoHash, TorrentError};

/// Magnet link components.
///
/// Resume entries added from a magnet link without metadata only carry the
/// link itself; the hash names the destination record.
#[derive(Debug, Clone, PartialEq)]
pub struct MagnetLink {
    pub info_hash: InfoHash,
    pub display_name: Option<String>,
    pub trackers: Vec<String>,
}

/// Magnet link parsing utilities.
pub struct MagnetParser;

impl MagnetParser {
    /// Returns true if `source` looks like a magnet URI.
    pub fn is_magnet(source: &str) -> bool {
        source.starts_with("magnet:")
    }

    /// Parses magnet link to extract torrent information.
    ///
    /// # Errors
    /// - `TorrentError::InvalidMagnet` - Malformed magnet URI or missing btih hash
    pub fn parse_magnet_link(magnet_url: &str) -> Result<MagnetLink, TorrentError> {
        let magnet = magnet_url::Magnet::new(magnet_url).map_err(|e| TorrentError::InvalidMagnet {
            reason: format!("{e}"),
        })?;

        let info_hash = Self::extract_info_hash(magnet_url)?;

        Ok(MagnetLink {
            info_hash,
            display_name: magnet.display_name().map(|s| s.to_string()),
            trackers: magnet.trackers().to_vec(),
        })
    }

    /// Finds the `xt=urn:btih:` parameter in the query string
    fn extract_info_hash(magnet_url: &str) -> Result<InfoHash, TorrentError> {
        let query = magnet_url.split_once('?').map_or("", |(_, query)| query);

        query
            .split('&')
            .find_map(|param| param.strip_prefix("xt=urn:btih:"))
            .ok_or_else(|| TorrentError::InvalidMagnet {
                reason: format!("Missing or invalid info hash in magnet link: {magnet_url}"),
            })
            .and_then(Self::parse_hash_from_string)
    }

    /// Parses a 40-character hex or 32-character base32 hash
    fn parse_hash_from_string(hash_str: &str) -> Result<InfoHash, TorrentError> {
        let mut hash = [0u8; 20];
        match hash_str.len() {
            40 => hex::decode_to_slice(hash_str, &mut hash).map_err(|_| {
                TorrentError::InvalidMagnet {
                    reason: format!("Invalid hex character in hash: {hash_str}"),
                }
            })?,
            32 => Self::decode_base32(hash_str, &mut hash)?,
            other => {
                return Err(TorrentError::InvalidMagnet {
                    reason: format!("Invalid hash length: {other} (expected 40 or 32)"),
                });
            }
        }
        Ok(InfoHash::new(hash))
    }

    fn decode_base32(hash_str: &str, out: &mut [u8; 20]) -> Result<(), TorrentError> {
        let bytes = BASE32
            .decode(hash_str.to_ascii_uppercase().as_bytes())
            .map_err(|_| TorrentError::InvalidMagnet {
                reason: format!("Invalid base32 character in hash: {hash_str}"),
            })?;

        if bytes.len() != out.len() {
            return Err(TorrentError::InvalidMagnet {
                reason: format!("Base32 hash decodes to {} bytes: {hash_str}", bytes.len()),
            });
        }

        out.copy_from_slice(&bytes);
        Ok(())
    }
}
