//! Owned bencode values on top of bencode-rs.
//!
//! Decoding is delegated to bencode-rs; the borrowed tree it produces is
//! converted into [`BencodeValue`], which outlives the input buffer and
//! encodes back to canonical form (sorted keys, no whitespace).

use std::collections::BTreeMap;

/// Errors produced while decoding bencode data.
#[derive(Debug, thiserror::Error)]
pub enum BencodeError {
    #[error("Malformed bencode: {reason}")]
    Malformed { reason: String },

    #[error("Empty bencode data")]
    Empty,

    #[error("Expected dictionary at root")]
    NotADictionary,
}

/// Closed set of bencode value shapes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BencodeValue {
    Integer(i64),
    Bytes(Vec<u8>),
    List(Vec<BencodeValue>),
    Dictionary(BTreeMap<Vec<u8>, BencodeValue>),
}

impl BencodeValue {
    /// Decodes the first bencode value in `data`.
    ///
    /// # Errors
    ///
    /// - `BencodeError::Malformed` - If bencode-rs rejects the input
    /// - `BencodeError::Empty` - If the input holds no value
    pub fn decode(data: &[u8]) -> Result<Self, BencodeError> {
        let parsed = bencode_rs::Value::parse(data).map_err(|e| BencodeError::Malformed {
            reason: format!("{e:?}"),
        })?;

        parsed.first().map(Self::from).ok_or(BencodeError::Empty)
    }

    /// Decodes `data` and requires a dictionary at the root.
    ///
    /// # Errors
    ///
    /// - `BencodeError::NotADictionary` - If the root value is not a dictionary
    /// - Any error from [`BencodeValue::decode`]
    pub fn decode_dictionary(data: &[u8]) -> Result<BTreeMap<Vec<u8>, Self>, BencodeError> {
        match Self::decode(data)? {
            BencodeValue::Dictionary(dict) => Ok(dict),
            _ => Err(BencodeError::NotADictionary),
        }
    }

    /// Encodes the value in canonical form.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        self.encode_into(&mut buf);
        buf
    }

    fn encode_into(&self, buf: &mut Vec<u8>) {
        match self {
            BencodeValue::Integer(value) => {
                let mut digits = itoa::Buffer::new();
                buf.push(b'i');
                buf.extend_from_slice(digits.format(*value).as_bytes());
                buf.push(b'e');
            }
            BencodeValue::Bytes(bytes) => encode_bytes(bytes, buf),
            BencodeValue::List(items) => {
                buf.push(b'l');
                for item in items {
                    item.encode_into(buf);
                }
                buf.push(b'e');
            }
            BencodeValue::Dictionary(dict) => {
                // BTreeMap iteration is already byte-sorted
                buf.push(b'd');
                for (key, value) in dict {
                    encode_bytes(key, buf);
                    value.encode_into(buf);
                }
                buf.push(b'e');
            }
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            BencodeValue::Integer(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            BencodeValue::Bytes(bytes) => Some(bytes),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[BencodeValue]> {
        match self {
            BencodeValue::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_dictionary(&self) -> Option<&BTreeMap<Vec<u8>, BencodeValue>> {
        match self {
            BencodeValue::Dictionary(dict) => Some(dict),
            _ => None,
        }
    }

    /// Looks up `key` when this value is a dictionary.
    pub fn get(&self, key: &[u8]) -> Option<&BencodeValue> {
        self.as_dictionary().and_then(|dict| dict.get(key))
    }

    /// Collects every byte-string leaf in depth-first traversal order.
    ///
    /// Integers are ignored; dictionaries contribute their values, not keys.
    pub fn flatten_strings(&self) -> Vec<Vec<u8>> {
        let mut leaves = Vec::new();
        let mut stack = vec![self];

        while let Some(value) = stack.pop() {
            match value {
                BencodeValue::Bytes(bytes) => leaves.push(bytes.clone()),
                BencodeValue::Integer(_) => {}
                BencodeValue::List(items) => stack.extend(items.iter().rev()),
                BencodeValue::Dictionary(dict) => stack.extend(dict.values().rev()),
            }
        }

        leaves
    }
}

impl From<&bencode_rs::Value<'_>> for BencodeValue {
    fn from(value: &bencode_rs::Value<'_>) -> Self {
        match value {
            bencode_rs::Value::Integer(number) => BencodeValue::Integer(*number),
            bencode_rs::Value::Bytes(bytes) => BencodeValue::Bytes(bytes.to_vec()),
            bencode_rs::Value::List(items) => {
                BencodeValue::List(items.iter().map(Self::from).collect())
            }
            bencode_rs::Value::Dictionary(dict) => BencodeValue::Dictionary(
                dict.iter()
                    .map(|(key, value)| (key.to_vec(), Self::from(value)))
                    .collect(),
            ),
        }
    }
}

impl From<i64> for BencodeValue {
    fn from(value: i64) -> Self {
        BencodeValue::Integer(value)
    }
}

impl From<&str> for BencodeValue {
    fn from(value: &str) -> Self {
        BencodeValue::Bytes(value.as_bytes().to_vec())
    }
}

impl From<String> for BencodeValue {
    fn from(value: String) -> Self {
        BencodeValue::Bytes(value.into_bytes())
    }
}

fn encode_bytes(bytes: &[u8], buf: &mut Vec<u8>) {
    let mut digits = itoa::Buffer::new();
    buf.extend_from_slice(digits.format(bytes.len()).as_bytes());
    buf.push(b':');
    buf.extend_from_slice(bytes);
}

/// Returns the original encoded bytes of `key`'s value in a root dictionary.
///
/// Walks the top-level keys of `data` without re-encoding anything, so the
/// returned slice is exactly what the issuing client hashed.
///
/// # Errors
///
/// - `BencodeError::NotADictionary` - If `data` does not start with a dictionary
/// - `BencodeError::Malformed` - If the structure is truncated or invalid
pub fn raw_dictionary_value<'a>(data: &'a [u8], key: &[u8]) -> Result<Option<&'a [u8]>, BencodeError> {
    if data.first() != Some(&b'd') {
        return Err(BencodeError::NotADictionary);
    }

    let mut pos = 1;
    while pos < data.len() && data[pos] != b'e' {
        let (entry_key, value_start) = read_byte_string(data, pos)?;
        let value_end = find_value_end(data, value_start)?;
        if entry_key == key {
            return Ok(Some(&data[value_start..value_end]));
        }
        pos = value_end;
    }

    if pos >= data.len() {
        return Err(malformed("Incomplete root dictionary"));
    }

    Ok(None)
}

/// Finds the end offset (exclusive) of the value starting at `start`.
///
/// # Errors
///
/// - `BencodeError::Malformed` - If the value is truncated or invalid
pub fn find_value_end(data: &[u8], start: usize) -> Result<usize, BencodeError> {
    let mut pos = start;
    let mut depth = 0usize;

    loop {
        let Some(&marker) = data.get(pos) else {
            return Err(malformed("Unexpected end of data"));
        };

        match marker {
            b'd' | b'l' => {
                depth += 1;
                pos += 1;
                continue;
            }
            b'e' if depth > 0 => {
                depth -= 1;
                pos += 1;
            }
            b'i' => {
                let end = data[pos..]
                    .iter()
                    .position(|&byte| byte == b'e')
                    .ok_or_else(|| malformed("Unterminated integer"))?;
                pos += end + 1;
            }
            b'0'..=b'9' => {
                let (_, next) = read_byte_string(data, pos)?;
                pos = next;
            }
            _ => return Err(malformed("Invalid bencode character")),
        }

        if depth == 0 {
            return Ok(pos);
        }
    }
}

/// Reads a length-prefixed byte string at `pos`, returning it and the next offset.
fn read_byte_string(data: &[u8], pos: usize) -> Result<(&[u8], usize), BencodeError> {
    let colon = data[pos..]
        .iter()
        .position(|&byte| byte == b':')
        .ok_or_else(|| malformed("Invalid string format"))?;

    let length: usize = std::str::from_utf8(&data[pos..pos + colon])
        .ok()
        .and_then(|digits| digits.parse().ok())
        .ok_or_else(|| malformed("Invalid string length"))?;

    let content_start = pos + colon + 1;
    let content_end = content_start
        .checked_add(length)
        .filter(|&end| end <= data.len())
        .ok_or_else(|| malformed("String exceeds data"))?;

    Ok((&data[content_start..content_end], content_end))
}

fn malformed(reason: &str) -> BencodeError {
    BencodeError::Malformed {
        reason: reason.to_string(),
    }
}
