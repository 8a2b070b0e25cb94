//! Repairs for text written by the legacy client.
//!
//! The legacy client stores characters outside the Basic Multilingual Plane
//! as CESU-8 (two 3-byte surrogate halves) instead of 4-byte UTF-8. Names
//! also have to match what the issuing client writes to disk on Windows,
//! where a fixed set of characters is prohibited.

use std::borrow::Cow;

use crate::paths::PathSeparator;

/// Characters the destination client replaces in names on Windows.
pub const PROHIBITED_CHARS: [char; 9] = ['\\', '/', ':', '*', '?', '"', '<', '>', '|'];

const PROHIBITED_REPLACEMENT: &str = "_";
const CESU8_PAIR_LEN: usize = 6;

/// Rewrites CESU-8 surrogate pairs as 4-byte UTF-8.
///
/// Bytes that are not part of a complete surrogate pair are copied
/// unchanged, so already-valid UTF-8 is returned borrowed.
pub fn repair_cesu8(bytes: &[u8]) -> Cow<'_, [u8]> {
    let Some(first) = find_surrogate_pair(bytes) else {
        return Cow::Borrowed(bytes);
    };

    let mut repaired = Vec::with_capacity(bytes.len());
    repaired.extend_from_slice(&bytes[..first]);

    let mut pos = first;
    while pos < bytes.len() {
        match decode_surrogate_pair(&bytes[pos..]) {
            Some(ch) => {
                let mut encoded = [0u8; 4];
                repaired.extend_from_slice(ch.encode_utf8(&mut encoded).as_bytes());
                pos += CESU8_PAIR_LEN;
            }
            None => {
                repaired.push(bytes[pos]);
                pos += 1;
            }
        }
    }

    Cow::Owned(repaired)
}

/// Returns true if `bytes` contains at least one CESU-8 surrogate pair.
pub fn needs_cesu8_repair(bytes: &[u8]) -> bool {
    find_surrogate_pair(bytes).is_some()
}

/// Repairs CESU-8 and decodes the result, substituting invalid sequences.
pub fn decode_text(bytes: &[u8]) -> String {
    String::from_utf8_lossy(&repair_cesu8(bytes)).into_owned()
}

/// Substitutes characters the destination filesystem rejects.
///
/// Only the Windows separator implies a restricted character set; for `/`
/// the name is returned unchanged.
pub fn replace_prohibited(name: &str, separator: PathSeparator) -> Cow<'_, str> {
    if separator != PathSeparator::Backslash || !name.contains(PROHIBITED_CHARS) {
        return Cow::Borrowed(name);
    }

    Cow::Owned(name.replace(PROHIBITED_CHARS, PROHIBITED_REPLACEMENT))
}

fn find_surrogate_pair(bytes: &[u8]) -> Option<usize> {
    (0..bytes.len()).find(|&pos| decode_surrogate_pair(&bytes[pos..]).is_some())
}

/// Decodes a high/low surrogate pair at the start of `bytes`.
fn decode_surrogate_pair(bytes: &[u8]) -> Option<char> {
    let pair = bytes.get(..CESU8_PAIR_LEN)?;
    let is_continuation = |byte: u8| byte & 0xC0 == 0x80;

    let high_ok = pair[0] == 0xED && (0xA0..=0xAF).contains(&pair[1]) && is_continuation(pair[2]);
    let low_ok = pair[3] == 0xED && (0xB0..=0xBF).contains(&pair[4]) && is_continuation(pair[5]);
    if !high_ok || !low_ok {
        return None;
    }

    let high = 0xD000 | (u32::from(pair[1] & 0x3F) << 6) | u32::from(pair[2] & 0x3F);
    let low = 0xD000 | (u32::from(pair[4] & 0x3F) << 6) | u32::from(pair[5] & 0x3F);
    let code_point = 0x10000 + ((high - 0xD800) << 10) + (low - 0xDC00);

    char::from_u32(code_point)
}
