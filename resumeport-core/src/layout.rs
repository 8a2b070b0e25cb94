//! Save path and content layout resolution.
//!
//! The legacy client records where a torrent lives on disk but not whether
//! its files sit under a folder named after the torrent. The resolver infers
//! that from the save path and the torrent name, then emits the destination
//! save path and the per-file rename list.

use std::fmt;
use std::str::FromStr;

use tracing::debug;

use crate::paths::{self, PathSeparator};
use crate::resume::{RenameTarget, SourceEntry};
use crate::text;
use crate::torrent::TorrentMetadata;

/// Errors that prevent a trustworthy save path.
#[derive(Debug, thiserror::Error)]
pub enum PathResolveError {
    #[error("Rename target index {index} is out of range for {files} files")]
    TargetOutOfRange { index: usize, files: usize },

    #[error("Invalid replace rule '{rule}': expected FROM,TO")]
    InvalidReplaceRule { rule: String },
}

/// How the destination client lays files out under the save path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentLayout {
    /// Files keep the torrent's own root folder
    Original,
    /// Files are placed directly under the save path
    NoSubfolder,
}

impl ContentLayout {
    pub fn as_str(self) -> &'static str {
        match self {
            ContentLayout::Original => "Original",
            ContentLayout::NoSubfolder => "NoSubfolder",
        }
    }
}

impl fmt::Display for ContentLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Literal substring substitution applied to resolved paths.
///
/// Separators in both halves are normalized to whatever form the path being
/// rewritten uses, so `D:/torrents` matches `D:\torrents\` as well.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplaceRule {
    pub from: String,
    pub to: String,
}

impl ReplaceRule {
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
        }
    }

    /// Rewrites `path`, which must already use `separator` throughout.
    pub fn apply(&self, path: &str, separator: PathSeparator) -> String {
        let from = with_separator(&self.from, separator);
        if from.is_empty() {
            return path.to_string();
        }
        path.replace(&from, &with_separator(&self.to, separator))
    }
}

impl FromStr for ReplaceRule {
    type Err = PathResolveError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once(',') {
            Some((from, to)) if !from.is_empty() => Ok(Self::new(from, to)),
            _ => Err(PathResolveError::InvalidReplaceRule {
                rule: s.to_string(),
            }),
        }
    }
}

/// Path fields of a destination record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPaths {
    pub layout: ContentLayout,
    /// Save path with `/` separators, as the destination client stores it
    pub qbt_save_path: String,
    /// Save path with the target separator
    pub save_path: String,
    /// One entry per file; empty entries keep the torrent's own path
    pub mapped_files: Vec<String>,
}

/// Decides content layout and destination paths for each torrent.
#[derive(Debug, Clone)]
pub struct SavePathResolver {
    separator: PathSeparator,
    rules: Vec<ReplaceRule>,
}

impl SavePathResolver {
    pub fn new(separator: PathSeparator, rules: Vec<ReplaceRule>) -> Self {
        Self { separator, rules }
    }

    pub fn separator(&self) -> PathSeparator {
        self.separator
    }

    /// Paths for an entry added by magnet link, which has no file list yet.
    pub fn resolve_magnet(&self, entry: &SourceEntry) -> ResolvedPaths {
        self.finish(ContentLayout::Original, &entry.decoded_path(), Vec::new())
    }

    /// Paths for an entry whose torrent metadata is available.
    ///
    /// # Errors
    ///
    /// - `PathResolveError::TargetOutOfRange` - If a rename target names a file the torrent lacks
    pub fn resolve(
        &self,
        entry: &SourceEntry,
        metadata: &TorrentMetadata,
    ) -> Result<ResolvedPaths, PathResolveError> {
        let source_path = entry.decoded_path();
        let name = self.sanitize_name(&text::decode_text(metadata.preferred_name()));
        let last_segment = paths::base_name(&source_path);

        if metadata.is_single_file() {
            // The legacy client stores the file path itself for single files
            let save_path = paths::trim_last_segment(&source_path, PathSeparator::Slash);
            let mapped = if last_segment.is_empty() || last_segment == name {
                Vec::new()
            } else {
                vec![self.sanitize_name(&last_segment)]
            };
            return Ok(self.finish(ContentLayout::Original, &save_path, mapped));
        }

        // Only file paths can disqualify the root folder
        let encoding_anomaly = metadata.files.iter().any(|file| {
            file.preferred_path()
                .iter()
                .any(|part| text::needs_cesu8_repair(part))
        });

        debug!(
            key = %entry.key,
            %last_segment,
            %name,
            encoding_anomaly,
            "Resolving content layout"
        );

        if !encoding_anomaly && last_segment == name {
            let save_path = paths::trim_last_segment(&source_path, PathSeparator::Slash);
            let mapped = self.original_mapping(&name, &entry.targets, metadata.files.len())?;
            Ok(self.finish(ContentLayout::Original, &save_path, mapped))
        } else {
            let mapped = self.flattened_mapping(&entry.targets, metadata)?;
            Ok(self.finish(ContentLayout::NoSubfolder, &source_path, mapped))
        }
    }

    /// Only renamed files get a non-empty entry, each rooted at the torrent folder.
    fn original_mapping(
        &self,
        name: &str,
        targets: &[RenameTarget],
        file_count: usize,
    ) -> Result<Vec<String>, PathResolveError> {
        if targets.is_empty() {
            return Ok(Vec::new());
        }

        let mut mapped = vec![String::new(); file_count];
        for target in targets {
            check_index(target.index, file_count)?;
            let target_path = text::decode_text(&target.path);
            mapped[target.index] = if paths::is_absolute(&target_path) {
                self.absolute_mapping(&target_path)
            } else {
                let relative = self.sanitize_relative(&target_path);
                paths::join(&[name, relative.as_str()], self.separator)
            };
        }

        Ok(mapped)
    }

    /// Every file gets an entry; renames then replace entries by index.
    fn flattened_mapping(
        &self,
        targets: &[RenameTarget],
        metadata: &TorrentMetadata,
    ) -> Result<Vec<String>, PathResolveError> {
        let mut mapped: Vec<String> = metadata
            .files
            .iter()
            .map(|file| {
                let parts: Vec<String> = file
                    .preferred_path()
                    .iter()
                    .map(|part| self.sanitize_name(&text::decode_text(part)))
                    .collect();
                paths::join(&parts, self.separator)
            })
            .collect();

        for target in targets {
            check_index(target.index, mapped.len())?;
            let target_path = text::decode_text(&target.path);
            mapped[target.index] = if paths::is_absolute(&target_path) {
                self.absolute_mapping(&target_path)
            } else {
                paths::normalize(&self.sanitize_relative(&target_path), self.separator)
            };
        }

        Ok(mapped)
    }

    /// Keeps the drive or share prefix and sanitizes only the remainder.
    fn absolute_mapping(&self, target_path: &str) -> String {
        let (prefix, remainder) = paths::split_root_prefix(target_path);
        let sanitized = self.sanitize_relative(remainder);
        let rendered = paths::normalize(&format!("{prefix}{sanitized}"), self.separator);

        self.rules
            .iter()
            .fold(rendered, |path, rule| rule.apply(&path, self.separator))
    }

    fn sanitize_name(&self, name: &str) -> String {
        text::replace_prohibited(name, self.separator).into_owned()
    }

    fn sanitize_relative(&self, path: &str) -> String {
        path.split(['/', '\\'])
            .map(|segment| self.sanitize_name(segment))
            .collect::<Vec<_>>()
            .join("/")
    }

    fn finish(
        &self,
        layout: ContentLayout,
        save_path: &str,
        mapped_files: Vec<String>,
    ) -> ResolvedPaths {
        let mut qbt_save_path = paths::normalize(save_path, PathSeparator::Slash);
        if layout == ContentLayout::Original && !qbt_save_path.ends_with('/') {
            qbt_save_path.push('/');
        }

        let qbt_save_path = self
            .rules
            .iter()
            .fold(qbt_save_path, |path, rule| rule.apply(&path, PathSeparator::Slash));
        let save_path = with_separator(&qbt_save_path, self.separator);

        ResolvedPaths {
            layout,
            qbt_save_path,
            save_path,
            mapped_files,
        }
    }
}

fn check_index(index: usize, files: usize) -> Result<(), PathResolveError> {
    if index < files {
        Ok(())
    } else {
        Err(PathResolveError::TargetOutOfRange { index, files })
    }
}

fn with_separator(path: &str, separator: PathSeparator) -> String {
    path.replace(['/', '\\'], separator.as_str())
}
