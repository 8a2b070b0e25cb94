//! Per-piece completion bitmap reconstruction.
//!
//! The legacy database has no per-piece verification data, only per-file
//! priorities. A piece is marked as present when any file crossing it is
//! wanted, which is the rule the destination client applies when it loads
//! partially selected torrents.

use crate::priority::FilePriority;

/// Errors that prevent building a trustworthy bitmap.
#[derive(Debug, thiserror::Error)]
pub enum PieceError {
    #[error("Priority count {priorities} does not match file count {files}")]
    PriorityMismatch { priorities: usize, files: usize },

    #[error("Piece length must be greater than zero")]
    ZeroPieceLength,
}

/// Piece geometry of a torrent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PieceLayout {
    pub piece_length: u64,
    pub piece_count: usize,
    /// Each file starts at a piece boundary, so no piece spans two files.
    pub piece_aligned_files: bool,
}

/// Inclusive, 1-indexed byte interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Offset {
    first: u64,
    last: u64,
}

impl Offset {
    fn piece(index: usize, piece_length: u64) -> Self {
        let index = index as u64;
        Self {
            first: index * piece_length + 1,
            last: (index + 1) * piece_length,
        }
    }

    fn overlaps(&self, other: &Offset) -> bool {
        self.first <= other.last && self.last >= other.first
    }
}

/// Builds the completion bitmap, one byte (0 or 1) per piece.
///
/// `unfinished` wins over everything: no piece is marked. An empty file list
/// denotes a fully verified single-file torrent and marks every piece.
///
/// # Errors
///
/// - `PieceError::PriorityMismatch` - If `priorities` and `file_lengths` differ in length
/// - `PieceError::ZeroPieceLength` - If a multi-file torrent declares a zero piece length
pub fn reconstruct_pieces(
    layout: PieceLayout,
    file_lengths: &[u64],
    priorities: &[FilePriority],
    unfinished: bool,
) -> Result<Vec<u8>, PieceError> {
    if unfinished {
        return Ok(vec![0; layout.piece_count]);
    }

    if file_lengths.is_empty() {
        return Ok(vec![1; layout.piece_count]);
    }

    if priorities.len() != file_lengths.len() {
        return Err(PieceError::PriorityMismatch {
            priorities: priorities.len(),
            files: file_lengths.len(),
        });
    }

    if layout.piece_length == 0 {
        return Err(PieceError::ZeroPieceLength);
    }

    let files = file_offsets(file_lengths, layout);
    let mut pieces = Vec::with_capacity(layout.piece_count);
    let mut cursor = 0;

    for index in 0..layout.piece_count {
        let piece = Offset::piece(index, layout.piece_length);

        // Files ending before this piece end before every later piece too
        while cursor < files.len() && files[cursor].last < piece.first {
            cursor += 1;
        }

        let wanted = files[cursor..]
            .iter()
            .zip(&priorities[cursor..])
            .take_while(|(file, _)| file.first <= piece.last)
            .any(|(file, priority)| file.overlaps(&piece) && priority.is_wanted());

        pieces.push(u8::from(wanted));
    }

    Ok(pieces)
}

fn file_offsets(file_lengths: &[u64], layout: PieceLayout) -> Vec<Offset> {
    let mut total = 0u64;
    file_lengths
        .iter()
        .map(|&length| {
            if layout.piece_aligned_files {
                total = total.next_multiple_of(layout.piece_length);
            }
            let offset = Offset {
                first: total + 1,
                last: total + length,
            };
            total += length;
            offset
        })
        .collect()
}
