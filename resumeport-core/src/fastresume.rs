//! Destination state record (`<hash>.fastresume`).
//!
//! Keys and omission rules live in one table, [`FastResume::fields`]; the
//! codec sorts keys on encode.

use crate::bencode::BencodeValue;
use crate::layout::{ContentLayout, ResolvedPaths};
use crate::priority::FilePriority;
use crate::resume::SourceEntry;
use crate::torrent::InfoHash;

const FILE_FORMAT: &str = "libtorrent resume file";
const FILE_VERSION: i64 = 1;
const ALLOCATION: &str = "sparse";
const MAX_CONNECTIONS: i64 = 100;
const MAX_UPLOADS: i64 = 100;
const UNLIMITED_RATE: i64 = -1;
/// Follow the global share ratio limit
const RATIO_LIMIT_GLOBAL: i64 = -2000;
/// Follow the global seeding time limit
const SEEDING_TIME_LIMIT_GLOBAL: i64 = -2;
const SEED_STATUS: i64 = 1;

/// One row of the serialization table.
pub struct FieldSpec {
    pub key: &'static str,
    pub value: BencodeValue,
    pub omit: fn(&BencodeValue) -> bool,
}

fn never(_: &BencodeValue) -> bool {
    false
}

fn if_empty(value: &BencodeValue) -> bool {
    match value {
        BencodeValue::Bytes(bytes) => bytes.is_empty(),
        BencodeValue::List(items) => items.is_empty(),
        BencodeValue::Dictionary(entries) => entries.is_empty(),
        BencodeValue::Integer(_) => false,
    }
}

/// Per-torrent state consumed by the destination client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FastResume {
    pub info_hash: InfoHash,
    pub libtorrent_version: String,

    pub save_path: String,
    pub qbt_save_path: String,
    pub content_layout: ContentLayout,
    pub mapped_files: Vec<String>,

    pub pieces: Vec<u8>,
    pub file_priority: Vec<FilePriority>,

    pub added_time: i64,
    pub completed_time: i64,
    pub finished_time: i64,
    pub active_time: i64,
    pub seeding_time: i64,
    pub total_downloaded: i64,
    pub total_uploaded: i64,

    pub paused: bool,
    pub auto_managed: bool,

    pub trackers: Vec<String>,
    pub name: Option<String>,
    pub category: Option<String>,
    pub tags: Vec<String>,
}

impl FastResume {
    /// Empty record for `info_hash`; derivations fill in the rest.
    pub fn new(info_hash: InfoHash, libtorrent_version: impl Into<String>) -> Self {
        Self {
            info_hash,
            libtorrent_version: libtorrent_version.into(),
            save_path: String::new(),
            qbt_save_path: String::new(),
            content_layout: ContentLayout::Original,
            mapped_files: Vec::new(),
            pieces: Vec::new(),
            file_priority: Vec::new(),
            added_time: 0,
            completed_time: 0,
            finished_time: 0,
            active_time: 0,
            seeding_time: 0,
            total_downloaded: 0,
            total_uploaded: 0,
            paused: true,
            auto_managed: false,
            trackers: Vec::new(),
            name: None,
            category: None,
            tags: Vec::new(),
        }
    }

    /// Running state. Multi-file torrents with a deselected file start paused
    /// so the destination client does not recheck partial data on its own.
    pub fn apply_state(&mut self, entry: &SourceEntry, multi_file: bool) {
        let partially_selected =
            multi_file && self.file_priority.iter().any(|priority| !priority.is_wanted());

        self.paused = !entry.is_started() || partially_selected;
        self.auto_managed = !self.paused;
    }

    /// Timestamps and transfer counters. `now` is seconds since the epoch.
    pub fn apply_timestamps(&mut self, entry: &SourceEntry, now: i64) {
        self.added_time = entry.added_on;
        self.completed_time = entry.completed_on;
        self.finished_time = if entry.completed_on > 0 {
            (now - entry.completed_on).max(0)
        } else {
            0
        };
        self.active_time = entry.runtime;
        self.seeding_time = entry.seedtime;
        self.total_downloaded = entry.downloaded;
        self.total_uploaded = entry.uploaded;
    }

    /// Caption, category and tags.
    pub fn apply_labels(&mut self, entry: &SourceEntry, without_labels: bool, without_tags: bool) {
        self.name = entry.caption.clone();
        if !without_labels {
            self.category = entry.label.clone();
        }
        if !without_tags {
            self.tags = entry.labels.clone();
        }
    }

    pub fn apply_paths(&mut self, resolved: ResolvedPaths) {
        self.content_layout = resolved.layout;
        self.save_path = resolved.save_path;
        self.qbt_save_path = resolved.qbt_save_path;
        self.mapped_files = resolved.mapped_files;
    }

    /// Key, value and omission rule for every field of the record.
    pub fn fields(&self) -> Vec<FieldSpec> {
        let field = |key, value: BencodeValue| FieldSpec {
            key,
            value,
            omit: never,
        };
        let optional = |key, value: BencodeValue| FieldSpec {
            key,
            value,
            omit: if_empty,
        };
        let strings = |items: &[String]| {
            BencodeValue::List(items.iter().map(|item| item.as_str().into()).collect())
        };

        // One tier per tracker
        let tiers = BencodeValue::List(
            self.trackers
                .iter()
                .map(|url| BencodeValue::List(vec![url.as_str().into()]))
                .collect(),
        );
        let priorities = BencodeValue::List(
            self.file_priority
                .iter()
                .map(|priority| priority.as_i64().into())
                .collect(),
        );

        vec![
            field("file-format", FILE_FORMAT.into()),
            field("file-version", FILE_VERSION.into()),
            field("libtorrent-version", self.libtorrent_version.as_str().into()),
            field(
                "info-hash",
                BencodeValue::Bytes(self.info_hash.as_bytes().to_vec()),
            ),
            field("allocation", ALLOCATION.into()),
            field("max_connections", MAX_CONNECTIONS.into()),
            field("max_uploads", MAX_UPLOADS.into()),
            field("download_rate_limit", UNLIMITED_RATE.into()),
            field("upload_rate_limit", UNLIMITED_RATE.into()),
            field("save_path", self.save_path.as_str().into()),
            field("qBt-savePath", self.qbt_save_path.as_str().into()),
            field("qBt-contentLayout", self.content_layout.as_str().into()),
            optional("mapped_files", strings(&self.mapped_files)),
            optional("pieces", BencodeValue::Bytes(self.pieces.clone())),
            optional("file_priority", priorities),
            field("added_time", self.added_time.into()),
            field("completed_time", self.completed_time.into()),
            field("finished_time", self.finished_time.into()),
            field("active_time", self.active_time.into()),
            field("seeding_time", self.seeding_time.into()),
            field("total_downloaded", self.total_downloaded.into()),
            field("total_uploaded", self.total_uploaded.into()),
            field("paused", i64::from(self.paused).into()),
            field("auto_managed", i64::from(self.auto_managed).into()),
            optional("trackers", tiers),
            optional(
                "qBt-name",
                self.name.as_deref().unwrap_or_default().into(),
            ),
            optional(
                "qBt-category",
                self.category.as_deref().unwrap_or_default().into(),
            ),
            optional("qBt-tags", strings(&self.tags)),
            field("qBt-ratioLimit", RATIO_LIMIT_GLOBAL.into()),
            field("qBt-seedingTimeLimit", SEEDING_TIME_LIMIT_GLOBAL.into()),
            field("qBt-seedStatus", SEED_STATUS.into()),
        ]
    }

    /// Dictionary of every field whose omission rule does not fire.
    pub fn to_bencode(&self) -> BencodeValue {
        BencodeValue::Dictionary(
            self.fields()
                .into_iter()
                .filter(|spec| !(spec.omit)(&spec.value))
                .map(|spec| (spec.key.as_bytes().to_vec(), spec.value))
                .collect(),
        )
    }

    pub fn encode(&self) -> Vec<u8> {
        self.to_bencode().encode()
    }
}
