//! Tag collection and destination configuration sync.
//!
//! The destination client only shows tags it knows from its global
//! configuration, so every label seen in the legacy database is merged into
//! the `Session\Tags` key of the `[BitTorrent]` section.

use std::path::{Path, PathBuf};

use crate::resume::SourceEntry;

const SECTION: &str = "[BitTorrent]";
const TAGS_KEY: &str = "Session\\Tags";
const TAG_SEPARATOR: &str = ", ";

#[derive(Debug, thiserror::Error)]
pub enum TagsError {
    #[error("Failed to read configuration {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to write configuration {}: {source}", path.display())]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Ordered, deduplicated tag list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagSet {
    tags: Vec<String>,
}

impl TagSet {
    /// Collects every label of every entry, first occurrence wins.
    pub fn from_entries<'a>(entries: impl IntoIterator<Item = &'a SourceEntry>) -> Self {
        entries
            .into_iter()
            .flat_map(|entry| entry.labels.iter())
            .fold(Self::default(), |mut set, tag| {
                set.insert(tag);
                set
            })
    }

    /// Returns false if the tag was already present or is blank.
    pub fn insert(&mut self, tag: &str) -> bool {
        let tag = tag.trim();
        if tag.is_empty() || self.contains(tag) {
            return false;
        }
        self.tags.push(tag.to_string());
        true
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.tags.iter().any(|existing| existing == tag)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.tags.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }
}

/// Merges `tags` into the configuration at `path`, creating it if missing.
///
/// Returns the number of tags that were not configured before.
///
/// # Errors
///
/// - `TagsError::Read` - If the file exists but cannot be read
/// - `TagsError::Write` - If the merged file cannot be written
pub async fn merge_into_config(path: &Path, tags: &TagSet) -> Result<usize, TagsError> {
    let content = match tokio::fs::read_to_string(path).await {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
        Err(source) => {
            return Err(TagsError::Read {
                path: path.to_path_buf(),
                source,
            });
        }
    };

    let (merged, added) = merge_tags_text(&content, tags);
    if added == 0 && !content.is_empty() {
        return Ok(0);
    }

    tokio::fs::write(path, merged)
        .await
        .map_err(|source| TagsError::Write {
            path: path.to_path_buf(),
            source,
        })?;

    Ok(added)
}

/// Line-based merge that leaves every unrelated line untouched.
fn merge_tags_text(content: &str, tags: &TagSet) -> (String, usize) {
    let line_ending = if content.contains("\r\n") { "\r\n" } else { "\n" };
    let mut lines: Vec<String> = content.lines().map(str::to_string).collect();

    let section_start = lines.iter().position(|line| line.trim() == SECTION);
    let section_end = section_start.map(|start| {
        lines[start + 1..]
            .iter()
            .position(|line| line.trim_start().starts_with('['))
            .map_or(lines.len(), |offset| start + 1 + offset)
    });

    let key_line = section_start.zip(section_end).and_then(|(start, end)| {
        (start + 1..end).find(|&index| {
            lines[index]
                .split_once('=')
                .is_some_and(|(key, _)| key.trim() == TAGS_KEY)
        })
    });

    let mut merged = TagSet::default();
    if let Some(index) = key_line
        && let Some((_, value)) = lines[index].split_once('=')
    {
        for tag in value.split(',') {
            merged.insert(tag);
        }
    }

    let added = tags.iter().filter(|tag| merged.insert(tag)).count();
    let rendered = format!(
        "{TAGS_KEY}={}",
        merged.iter().collect::<Vec<_>>().join(TAG_SEPARATOR)
    );

    match (key_line, section_start, section_end) {
        (Some(index), _, _) => lines[index] = rendered,
        (None, Some(_), Some(end)) => lines.insert(end, rendered),
        _ => {
            if lines.last().is_some_and(|line| !line.trim().is_empty()) {
                lines.push(String::new());
            }
            lines.push(SECTION.to_string());
            lines.push(rendered);
        }
    }

    let mut output = lines.join(line_ending);
    output.push_str(line_ending);
    (output, added)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tag_set(tags: &[&str]) -> TagSet {
        let mut set = TagSet::default();
        for tag in tags {
            set.insert(tag);
        }
        set
    }

    #[test]
    fn test_tag_set_from_entries() {
        let entries = vec![
            SourceEntry {
                labels: vec!["b".to_string(), "a".to_string()],
                ..SourceEntry::default()
            },
            SourceEntry {
                labels: vec!["a".to_string(), "c".to_string(), " ".to_string()],
                ..SourceEntry::default()
            },
        ];

        let set = TagSet::from_entries(&entries);
        assert_eq!(set.iter().collect::<Vec<_>>(), vec!["b", "a", "c"]);
    }

    #[test]
    fn test_merge_existing_key() {
        let content = "[Core]\nA=1\n\n[BitTorrent]\nSession\\Port=1\nSession\\Tags=old, a\n\n[Other]\nB=2\n";
        let (merged, added) = merge_tags_text(content, &tag_set(&["a", "new"]));

        assert_eq!(added, 1);
        assert_eq!(
            merged,
            "[Core]\nA=1\n\n[BitTorrent]\nSession\\Port=1\nSession\\Tags=old, a, new\n\n[Other]\nB=2\n"
        );
    }

    #[test]
    fn test_merge_inserts_key_into_section() {
        let content = "[BitTorrent]\nSession\\Port=1\n[Other]\nB=2\n";
        let (merged, added) = merge_tags_text(content, &tag_set(&["x"]));

        assert_eq!(added, 1);
        assert_eq!(
            merged,
            "[BitTorrent]\nSession\\Port=1\nSession\\Tags=x\n[Other]\nB=2\n"
        );
    }

    #[test]
    fn test_merge_appends_section() {
        let (merged, _) = merge_tags_text("[Core]\nA=1\n", &tag_set(&["x", "y"]));
        assert_eq!(merged, "[Core]\nA=1\n\n[BitTorrent]\nSession\\Tags=x, y\n");
    }

    #[test]
    fn test_merge_keeps_crlf() {
        let (merged, _) = merge_tags_text("[BitTorrent]\r\nSession\\Tags=a\r\n", &tag_set(&["b"]));
        assert_eq!(merged, "[BitTorrent]\r\nSession\\Tags=a, b\r\n");
    }

    #[tokio::test]
    async fn test_merge_into_missing_config() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("qBittorrent.ini");

        let added = merge_into_config(&path, &tag_set(&["one", "two"])).await.unwrap();
        assert_eq!(added, 2);

        let written = tokio::fs::read_to_string(&path).await.unwrap();
        assert_eq!(written, "[BitTorrent]\nSession\\Tags=one, two\n");

        let added = merge_into_config(&path, &tag_set(&["two"])).await.unwrap();
        assert_eq!(added, 0);
    }
}
