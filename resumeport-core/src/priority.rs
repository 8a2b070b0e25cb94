//! Legacy per-file priority bytes to destination download priorities.

/// Download priority understood by the destination client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FilePriority {
    /// File is not selected for download
    Skip = 0,
    /// Default priority
    Normal = 1,
    /// Highest priority
    High = 6,
}

impl FilePriority {
    /// Maps one raw priority byte. Unknown codes are treated as not selected.
    pub fn from_raw(byte: u8) -> Self {
        match byte {
            1..=8 => FilePriority::Normal,
            9..=15 => FilePriority::High,
            // 0 and 128 mean "don't download"; anything else is unknown
            _ => FilePriority::Skip,
        }
    }

    pub fn as_i64(self) -> i64 {
        self as i64
    }

    pub fn is_wanted(self) -> bool {
        self != FilePriority::Skip
    }
}

/// Converts the raw priority vector into one priority per file.
///
/// Torrents with a v2 piece-root structure store two bytes per file; only
/// the even-indexed byte of each pair carries the priority.
pub fn map_priorities(raw: &[u8], interleaved: bool) -> Vec<FilePriority> {
    if interleaved {
        raw.iter().step_by(2).copied().map(FilePriority::from_raw).collect()
    } else {
        raw.iter().copied().map(FilePriority::from_raw).collect()
    }
}

/// Spreads priorities over a file list that contains padding files.
///
/// Hybrid torrents list pad files the legacy client never stored priorities
/// for. When `priorities` matches the number of real files, pad files are
/// inserted as [`FilePriority::Skip`]; otherwise the input is returned as is.
pub fn align_with_padding(priorities: Vec<FilePriority>, padding: &[bool]) -> Vec<FilePriority> {
    let real_files = padding.iter().filter(|&&is_pad| !is_pad).count();
    if priorities.len() == padding.len() || priorities.len() != real_files {
        return priorities;
    }

    let mut real = priorities.into_iter();
    padding
        .iter()
        .map(|&is_pad| {
            if is_pad {
                FilePriority::Skip
            } else {
                real.next().unwrap_or(FilePriority::Skip)
            }
        })
        .collect()
}
