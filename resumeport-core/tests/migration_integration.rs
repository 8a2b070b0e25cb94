//! End-to-end migration over a temporary legacy client directory.

use std::collections::BTreeMap;
use std::path::Path;

use resumeport_core::bencode::BencodeValue;
use resumeport_core::{PathSeparator, ReplaceRule, TransferError, TransferOptions, migrate};
use sha1::{Digest, Sha1};

fn dict(pairs: Vec<(&str, BencodeValue)>) -> BencodeValue {
    BencodeValue::Dictionary(
        pairs
            .into_iter()
            .map(|(key, value)| (key.as_bytes().to_vec(), value))
            .collect::<BTreeMap<_, _>>(),
    )
}

fn bytes(value: &[u8]) -> BencodeValue {
    BencodeValue::Bytes(value.to_vec())
}

fn strings(values: &[&str]) -> BencodeValue {
    BencodeValue::List(values.iter().map(|value| (*value).into()).collect())
}

/// Writes a torrent file and returns its expected hex info hash.
async fn write_torrent(path: &Path, info: BencodeValue) -> String {
    let info_bytes = info.encode();
    let torrent = dict(vec![
        ("announce", "udp://tracker.example:80/".into()),
        ("info", info),
    ]);
    tokio::fs::write(path, torrent.encode()).await.unwrap();
    hex::encode(Sha1::digest(&info_bytes))
}

fn single_file_info() -> BencodeValue {
    dict(vec![
        ("length", 100i64.into()),
        ("name", "movie.mkv".into()),
        ("piece length", 64i64.into()),
        ("pieces", bytes(&[7u8; 40])),
    ])
}

fn multi_file_info() -> BencodeValue {
    let file = |length: i64, name: &str| {
        dict(vec![("length", length.into()), ("path", strings(&[name]))])
    };
    dict(vec![
        (
            "files",
            BencodeValue::List(vec![file(13, "a.bin"), file(7, "b.bin"), file(5, "c.bin")]),
        ),
        ("name", "Album".into()),
        ("piece length", 5i64.into()),
        ("pieces", bytes(&[9u8; 100])),
    ])
}

fn resume_database(magnet: &str) -> BencodeValue {
    dict(vec![
        (".fileguard", "ignored".into()),
        (
            "C:\\Users\\me\\AppData\\uTorrent\\Album.torrent",
            dict(vec![
                ("added_on", 1_600_000_000i64.into()),
                ("completed_on", 0i64.into()),
                ("path", "D:\\torrents\\Album".into()),
                ("prio", bytes(&[8, 0, 8])),
                ("started", 1i64.into()),
            ]),
        ),
        (
            "missing.torrent",
            dict(vec![("path", "D:\\torrents\\missing".into())]),
        ),
        (
            magnet,
            dict(vec![
                ("caption", "Pending".into()),
                ("path", "D:\\torrents\\pending".into()),
                ("started", 0i64.into()),
            ]),
        ),
        ("rec", dict(vec![("x", 1i64.into())])),
        (
            "single.torrent",
            dict(vec![
                ("added_on", 1_500_000_000i64.into()),
                ("completed_on", 1_500_000_100i64.into()),
                ("downloaded", 100i64.into()),
                ("label", "movies".into()),
                ("labels", strings(&["hd", "new"])),
                ("path", "D:\\torrents\\movie.mkv".into()),
                ("prio", bytes(&[8])),
                ("runtime", 300i64.into()),
                ("seedtime", 200i64.into()),
                ("started", 1i64.into()),
                (
                    "trackers",
                    BencodeValue::List(vec![
                        "udp://a.example:80/".into(),
                        strings(&["udp://b.example:80/"]),
                    ]),
                ),
                ("uploaded", 50i64.into()),
            ]),
        ),
    ])
}

async fn read_record(dir: &Path, hash: &str) -> BencodeValue {
    let data = tokio::fs::read(dir.join(format!("{hash}.fastresume")))
        .await
        .unwrap();
    BencodeValue::decode(&data).unwrap()
}

fn text(record: &BencodeValue, key: &str) -> String {
    String::from_utf8(record.get(key.as_bytes()).unwrap().as_bytes().unwrap().to_vec()).unwrap()
}

fn integer(record: &BencodeValue, key: &str) -> i64 {
    record.get(key.as_bytes()).unwrap().as_integer().unwrap()
}

#[tokio::test]
async fn test_full_migration() {
    let source = tempfile::tempdir().unwrap();
    let search = tempfile::tempdir().unwrap();
    let destination = tempfile::tempdir().unwrap();
    let config_file = destination.path().join("qBittorrent.ini");

    let magnet_hash = "0123456789abcdef0123456789abcdef01234567";
    let magnet = format!("magnet:?xt=urn:btih:{magnet_hash}&dn=Pending&tr=udp://m.example:80/");

    let single_hash = write_torrent(&source.path().join("single.torrent"), single_file_info()).await;
    let album_hash = write_torrent(&search.path().join("Album.torrent"), multi_file_info()).await;
    tokio::fs::write(
        source.path().join("resume.dat"),
        resume_database(&magnet).encode(),
    )
    .await
    .unwrap();

    let mut options = TransferOptions::new(source.path(), destination.path());
    options.search_dirs = vec![search.path().to_path_buf()];
    options.replace_rules = vec![ReplaceRule::new("D:/torrents", "E:/newfolder")];
    options.separator = PathSeparator::Backslash;
    options.config_file = Some(config_file.clone());
    options.concurrency = 2;

    let report = migrate(options.clone()).await.unwrap();

    assert_eq!(report.migrated, 3);
    assert_eq!(report.skipped, 0);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].0, "missing.torrent");
    assert!(matches!(
        report.failures[0].1,
        TransferError::TorrentNotFound { .. }
    ));

    // Single-file torrent
    let single = read_record(destination.path(), &single_hash).await;
    assert_eq!(text(&single, "qBt-savePath"), "E:/newfolder/");
    assert_eq!(text(&single, "save_path"), "E:\\newfolder\\");
    assert_eq!(text(&single, "qBt-contentLayout"), "Original");
    assert_eq!(text(&single, "qBt-category"), "movies");
    assert_eq!(
        single.get(b"qBt-tags").unwrap().flatten_strings(),
        vec![b"hd".to_vec(), b"new".to_vec()]
    );
    assert_eq!(single.get(b"pieces").unwrap().as_bytes(), Some([1u8, 1].as_slice()));
    assert_eq!(integer(&single, "paused"), 0);
    assert_eq!(integer(&single, "auto_managed"), 1);
    assert_eq!(integer(&single, "active_time"), 300);
    assert_eq!(integer(&single, "seeding_time"), 200);
    assert_eq!(integer(&single, "total_uploaded"), 50);
    assert!(single.get(b"mapped_files").is_none());
    assert_eq!(
        single.get(b"trackers").unwrap().as_list().unwrap().len(),
        2
    );

    let copied = tokio::fs::read(destination.path().join(format!("{single_hash}.torrent")))
        .await
        .unwrap();
    let original = tokio::fs::read(source.path().join("single.torrent")).await.unwrap();
    assert_eq!(copied, original);

    // Multi-file torrent found by file name in the search directory
    let album = read_record(destination.path(), &album_hash).await;
    assert_eq!(text(&album, "qBt-contentLayout"), "Original");
    assert_eq!(text(&album, "qBt-savePath"), "E:/newfolder/");
    assert_eq!(
        album.get(b"pieces").unwrap().as_bytes(),
        Some([1u8, 1, 1, 0, 1].as_slice())
    );
    let priorities: Vec<i64> = album
        .get(b"file_priority")
        .unwrap()
        .as_list()
        .unwrap()
        .iter()
        .filter_map(BencodeValue::as_integer)
        .collect();
    assert_eq!(priorities, vec![1, 0, 1]);
    // Started but partially selected
    assert_eq!(integer(&album, "paused"), 1);
    assert_eq!(integer(&album, "finished_time"), 0);

    // Magnet entry
    let pending = read_record(destination.path(), magnet_hash).await;
    assert_eq!(text(&pending, "qBt-name"), "Pending");
    assert_eq!(text(&pending, "qBt-savePath"), "E:/newfolder/pending/");
    assert_eq!(integer(&pending, "paused"), 1);
    assert!(pending.get(b"pieces").is_none());
    assert!(
        !destination
            .path()
            .join(format!("{magnet_hash}.torrent"))
            .exists()
    );

    let config = tokio::fs::read_to_string(&config_file).await.unwrap();
    assert!(config.contains("Session\\Tags=hd, new"));
    assert_eq!(report.tags_added, 2);

    // Second run leaves existing records alone
    let rerun = migrate(options).await.unwrap();
    assert_eq!(rerun.migrated, 0);
    assert_eq!(rerun.skipped, 3);
    assert_eq!(rerun.failures.len(), 1);
}

#[tokio::test]
async fn test_damaged_database_is_fatal() {
    let source = tempfile::tempdir().unwrap();
    let destination = tempfile::tempdir().unwrap();
    tokio::fs::write(source.path().join("resume.dat"), b"not bencode")
        .await
        .unwrap();

    let result = migrate(TransferOptions::new(source.path(), destination.path())).await;
    assert!(result.is_err());
}

#[tokio::test]
async fn test_skip_labels_and_tags() {
    let source = tempfile::tempdir().unwrap();
    let destination = tempfile::tempdir().unwrap();
    let config_file = destination.path().join("qBittorrent.ini");

    let hash = write_torrent(&source.path().join("single.torrent"), single_file_info()).await;
    let database = dict(vec![(
        "single.torrent",
        dict(vec![
            ("label", "movies".into()),
            ("labels", strings(&["hd"])),
            ("path", "/data/movie.mkv".into()),
            ("prio", bytes(&[8])),
            ("started", 1i64.into()),
        ]),
    )]);
    tokio::fs::write(source.path().join("resume.dat"), database.encode())
        .await
        .unwrap();

    let mut options = TransferOptions::new(source.path(), destination.path());
    options.separator = PathSeparator::Slash;
    options.without_labels = true;
    options.without_tags = true;
    options.config_file = Some(config_file.clone());

    let report = migrate(options).await.unwrap();
    assert_eq!(report.migrated, 1);

    let record = read_record(destination.path(), &hash).await;
    assert!(record.get(b"qBt-category").is_none());
    assert!(record.get(b"qBt-tags").is_none());
    assert_eq!(text(&record, "save_path"), "/data/");
    assert!(!config_file.exists());
}
