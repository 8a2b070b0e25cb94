//! Path handling independent of the host operating system.
//!
//! Source paths come from a Windows client and destination paths may target
//! either convention, so nothing here touches `std::path`. Paths are parsed
//! into a root plus clean segments and rendered with the requested separator.

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;

static ABSOLUTE_PATH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:[A-Za-z]:[\\/]|[\\/])").expect("valid regex"));

static ROOT_PREFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:[A-Za-z]:[\\/]+|[\\/]{2}[^\\/]+[\\/]+[^\\/]+[\\/]*|[\\/]+)")
        .expect("valid regex")
});

/// Separator used when rendering destination paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathSeparator {
    /// `/`, used by qBittorrent internally and on Unix hosts
    Slash,
    /// `\`, used on Windows hosts
    Backslash,
}

impl PathSeparator {
    /// Separator of the platform this binary was built for.
    pub fn host() -> Self {
        if cfg!(windows) {
            PathSeparator::Backslash
        } else {
            PathSeparator::Slash
        }
    }

    pub fn as_char(self) -> char {
        match self {
            PathSeparator::Slash => '/',
            PathSeparator::Backslash => '\\',
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PathSeparator::Slash => "/",
            PathSeparator::Backslash => "\\",
        }
    }
}

impl FromStr for PathSeparator {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "/" | "unix" => Ok(PathSeparator::Slash),
            "\\" | "windows" => Ok(PathSeparator::Backslash),
            _ => Err(format!("Invalid path separator: {s}")),
        }
    }
}

impl fmt::Display for PathSeparator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Root {
    Relative,
    /// `/...`
    Unix,
    /// `C:` optionally followed by a separator
    Drive { letter: char, rooted: bool },
    /// `\\server\share` or `//server/share`
    Share,
}

#[derive(Debug, Clone)]
struct ParsedPath {
    root: Root,
    segments: Vec<String>,
}

impl ParsedPath {
    fn parse(path: &str) -> Self {
        let unified = path.replace('\\', "/");
        let bytes = unified.as_bytes();

        let (root, rest) = if unified.starts_with("//") {
            (Root::Share, unified.trim_start_matches('/'))
        } else if bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':' {
            let rest = &unified[2..];
            let root = Root::Drive {
                letter: char::from(bytes[0]),
                rooted: rest.starts_with('/'),
            };
            (root, rest)
        } else if unified.starts_with('/') {
            (Root::Unix, unified.as_str())
        } else {
            (Root::Relative, unified.as_str())
        };

        let mut segments: Vec<String> = Vec::new();
        for segment in rest.split('/') {
            match segment {
                "" | "." => {}
                ".." => {
                    let can_pop = segments.last().is_some_and(|last| last != "..");
                    if can_pop {
                        segments.pop();
                    } else if root == Root::Relative {
                        segments.push(segment.to_string());
                    }
                }
                _ => segments.push(segment.to_string()),
            }
        }

        Self { root, segments }
    }

    fn render(&self, separator: PathSeparator) -> String {
        let sep = separator.as_str();
        let body = self.segments.join(sep);

        match &self.root {
            Root::Relative => body,
            Root::Unix => format!("{sep}{body}"),
            Root::Drive { letter, rooted } => {
                if *rooted {
                    format!("{letter}:{sep}{body}")
                } else {
                    format!("{letter}:{body}")
                }
            }
            Root::Share => format!("{sep}{sep}{body}"),
        }
    }
}

/// Returns true for drive-rooted, share (UNC) and Unix-rooted paths.
pub fn is_absolute(path: &str) -> bool {
    ABSOLUTE_PATH.is_match(path)
}

/// Splits an absolute path into its root prefix and the remainder.
///
/// The prefix keeps the drive letter or the `\\server\share` pair intact.
/// Relative paths return an empty prefix.
pub fn split_root_prefix(path: &str) -> (&str, &str) {
    match ROOT_PREFIX.find(path) {
        Some(prefix) => path.split_at(prefix.end()),
        None => ("", path),
    }
}

/// Collapses repeated separators, `.` and `..`, and renders with `separator`.
///
/// Trailing separators are dropped except on bare roots such as `C:\`.
pub fn normalize(path: &str, separator: PathSeparator) -> String {
    ParsedPath::parse(path).render(separator)
}

/// Joins path fragments and normalizes the result.
pub fn join<S: AsRef<str>>(parts: &[S], separator: PathSeparator) -> String {
    let joined = parts
        .iter()
        .map(|part| part.as_ref())
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("/");
    normalize(&joined, separator)
}

/// Last segment of a path in either convention.
pub fn base_name(path: &str) -> String {
    ParsedPath::parse(path)
        .segments
        .pop()
        .unwrap_or_default()
}

/// Removes the last segment and normalizes the remaining parent.
pub fn trim_last_segment(path: &str, separator: PathSeparator) -> String {
    let mut parsed = ParsedPath::parse(path);
    parsed.segments.pop();
    parsed.render(separator)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_absolute() {
        assert!(is_absolute("C:\\dir"));
        assert!(is_absolute("c:/dir"));
        assert!(is_absolute("\\\\server\\share"));
        assert!(is_absolute("//server/share"));
        assert!(is_absolute("/home/user"));

        assert!(!is_absolute("dir/file"));
        assert!(!is_absolute("C:dir"));
        assert!(!is_absolute(""));
    }

    #[test]
    fn test_split_root_prefix() {
        assert_eq!(split_root_prefix("C:\\dl\\a?b"), ("C:\\", "dl\\a?b"));
        assert_eq!(
            split_root_prefix("\\\\nas\\share\\dl\\file"),
            ("\\\\nas\\share\\", "dl\\file")
        );
        assert_eq!(split_root_prefix("/mnt/dl"), ("/", "mnt/dl"));
        assert_eq!(split_root_prefix("dl/file"), ("", "dl/file"));
    }

    #[test]
    fn test_normalize_drive_paths() {
        assert_eq!(normalize("D:\\torrents\\", PathSeparator::Slash), "D:/torrents");
        assert_eq!(normalize("D:/torrents/", PathSeparator::Backslash), "D:\\torrents");
        assert_eq!(normalize("D:\\", PathSeparator::Slash), "D:/");
    }

    #[test]
    fn test_normalize_share_paths() {
        assert_eq!(
            normalize("\\\\nas\\share\\movies\\..\\tv", PathSeparator::Backslash),
            "\\\\nas\\share\\tv"
        );
        assert_eq!(
            normalize("\\\\nas\\share\\tv", PathSeparator::Slash),
            "//nas/share/tv"
        );
    }

    #[test]
    fn test_normalize_unix_and_relative() {
        assert_eq!(normalize("/home//user/./dl/", PathSeparator::Slash), "/home/user/dl");
        assert_eq!(normalize("a/../../b", PathSeparator::Slash), "../b");
        assert_eq!(normalize("/..", PathSeparator::Slash), "/");
    }

    #[test]
    fn test_join() {
        assert_eq!(
            join(&["Name", "sub\\file.mkv"], PathSeparator::Backslash),
            "Name\\sub\\file.mkv"
        );
        assert_eq!(join(&["", "file.mkv"], PathSeparator::Slash), "file.mkv");
    }

    #[test]
    fn test_base_name() {
        assert_eq!(base_name("C:\\dl\\Movie"), "Movie");
        assert_eq!(base_name("/dl/Movie/"), "Movie");
        assert_eq!(base_name("Movie"), "Movie");
        assert_eq!(base_name("C:\\"), "");
    }

    #[test]
    fn test_trim_last_segment() {
        assert_eq!(
            trim_last_segment("D:\\torrents\\file.mkv", PathSeparator::Slash),
            "D:/torrents"
        );
        assert_eq!(trim_last_segment("D:\\file.mkv", PathSeparator::Backslash), "D:\\");
        assert_eq!(
            trim_last_segment("\\\\nas\\share\\dl\\Movie", PathSeparator::Backslash),
            "\\\\nas\\share\\dl"
        );
    }

    #[test]
    fn test_separator_parsing() {
        assert_eq!("/".parse::<PathSeparator>().unwrap(), PathSeparator::Slash);
        assert_eq!("\\".parse::<PathSeparator>().unwrap(), PathSeparator::Backslash);
        assert!("|".parse::<PathSeparator>().is_err());
    }
}
