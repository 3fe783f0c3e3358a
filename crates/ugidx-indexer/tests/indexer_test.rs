//! End-to-end indexing runs over scratch trees.

use std::fs::{self, File};
use std::io::Write;
use std::time::Duration;

use ugidx_config::testing::TestTree;
use ugidx_config::Config;
use ugidx_format::{read_index, write_index, EntryFlags, IndexEntry, INDEX_FILENAME};
use ugidx_indexer::{delete_indexes, Indexer, RunMode};

fn prose(len: usize, seed: u32) -> Vec<u8> {
    const WORDS: [&str; 12] = [
        "index", "stream", "window", "filter", "bloom", "table", "noise", "fold", "entry",
        "directory", "archive", "member",
    ];
    let mut state = seed;
    let mut out = Vec::with_capacity(len + 16);
    while out.len() < len {
        state = state.wrapping_mul(1_103_515_245).wrapping_add(12_345);
        out.extend_from_slice(WORDS[(state >> 16) as usize % WORDS.len()].as_bytes());
        out.extend_from_slice(format!("{}", state % 1000).as_bytes());
        out.push(if state % 11 == 0 { b'\n' } else { b' ' });
    }
    out.truncate(len);
    out
}

fn index_of(tree: &TestTree, dir: &str) -> String {
    if dir.is_empty() {
        INDEX_FILENAME.to_string()
    } else {
        format!("{}/{}", dir, INDEX_FILENAME)
    }
}

fn entries(tree: &TestTree, dir: &str) -> Vec<IndexEntry> {
    read_index(&tree.path(&index_of(tree, dir))).unwrap()
}

fn names(entries: &[IndexEntry]) -> Vec<String> {
    entries
        .iter()
        .map(|e| String::from_utf8_lossy(&e.name).into_owned())
        .collect()
}

fn run(config: &Config, tree: &TestTree, mode: RunMode) -> ugidx_indexer::IndexStats {
    Indexer::new(config).unwrap().run(&tree.root, mode).unwrap()
}

fn write_zip(tree: &TestTree, rel: &str, members: &[(&str, &[u8])]) {
    let file = File::create(tree.path(rel)).unwrap();
    let mut writer = zip::ZipWriter::new(file);
    let options = zip::write::SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Deflated);
    for (name, body) in members {
        writer.start_file(*name, options).unwrap();
        writer.write_all(body).unwrap();
    }
    writer.finish().unwrap();
}

fn noise(table: &[u8]) -> f64 {
    let hits: u32 = table.iter().map(|b| b.count_zeros()).sum();
    hits as f64 / (table.len() * 8) as f64
}

fn fold(table: &[u8]) -> Vec<u8> {
    let half = table.len() / 2;
    (0..half).map(|i| table[i] & table[i + half]).collect()
}

#[test]
fn test_second_run_is_a_noop() {
    let tree = TestTree::new().unwrap();
    tree.create_file("a.txt", &prose(4_000, 1)).unwrap();
    tree.create_file("sub/b.txt", &prose(2_000, 2)).unwrap();
    let config = Config::default();

    let first = run(&config, &tree, RunMode::Index);
    assert_eq!(first.dirs_indexed, 2);
    let root_index = tree.read(&index_of(&tree, "")).unwrap();
    let sub_index = tree.read(&index_of(&tree, "sub")).unwrap();

    let second = run(&config, &tree, RunMode::Index);
    assert_eq!(second.dirs_indexed, 0);
    assert_eq!(second.unchanged, 2);
    assert_eq!(tree.read(&index_of(&tree, "")).unwrap(), root_index);
    assert_eq!(tree.read(&index_of(&tree, "sub")).unwrap(), sub_index);

    let check = run(&config, &tree, RunMode::Check);
    assert!(check.is_clean());
}

#[test]
fn test_incremental_update() {
    let tree = TestTree::new().unwrap();
    tree.create_file("a.txt", &prose(3_000, 10)).unwrap();
    tree.create_file("b.txt", &prose(3_000, 20)).unwrap();
    tree.create_file("c.txt", &prose(3_000, 30)).unwrap();
    for name in ["a.txt", "b.txt", "c.txt"] {
        tree.set_mtime(name, 1_000).unwrap();
    }
    let config = Config::default();
    run(&config, &tree, RunMode::Index);
    let before = entries(&tree, "");
    assert_eq!(names(&before), vec!["a.txt", "b.txt", "c.txt"]);

    // Pretend the last run happened at t=2000, then change the directory
    tree.set_mtime(&index_of(&tree, ""), 2_000).unwrap();
    tree.create_file("b.txt", &prose(6_000, 99)).unwrap();
    tree.set_mtime("b.txt", 3_000).unwrap();
    tree.remove_file("c.txt").unwrap();
    tree.create_file("d.txt", &prose(1_000, 40)).unwrap();

    let stats = run(&config, &tree, RunMode::Index);
    assert_eq!(
        (stats.added, stats.modified, stats.deleted, stats.unchanged),
        (1, 1, 1, 1)
    );

    let after = entries(&tree, "");
    assert_eq!(names(&after), vec!["a.txt", "b.txt", "d.txt"]);
    assert_eq!(after[0], before[0]);
    assert_ne!(after[1].fingerprint, before[1].fingerprint);
}

#[test]
fn test_check_mode_never_writes() {
    let tree = TestTree::new().unwrap();
    tree.create_file("a.txt", &prose(2_000, 5)).unwrap();
    tree.set_mtime("a.txt", 1_000).unwrap();
    let config = Config::default();
    run(&config, &tree, RunMode::Index);

    tree.set_mtime(&index_of(&tree, ""), 2_000).unwrap();
    tree.create_file("a.txt", &prose(2_500, 6)).unwrap();
    tree.set_mtime("a.txt", 3_000).unwrap();
    tree.create_file("new.txt", b"new file").unwrap();
    let index_before = tree.read(&index_of(&tree, "")).unwrap();
    let mtime_before = std::fs::metadata(tree.path(&index_of(&tree, "")))
        .unwrap()
        .modified()
        .unwrap();

    let stats = run(&config, &tree, RunMode::Check);
    assert_eq!(stats.dirs_stale, 1);
    assert_eq!((stats.added, stats.modified), (1, 1));
    assert!(!stats.is_clean());

    assert_eq!(tree.read(&index_of(&tree, "")).unwrap(), index_before);
    let mtime_after = std::fs::metadata(tree.path(&index_of(&tree, "")))
        .unwrap()
        .modified()
        .unwrap();
    assert_eq!(mtime_after, mtime_before);
}

#[test]
fn test_archive_fan_out_shrinks() {
    let tree = TestTree::new().unwrap();
    write_zip(
        &tree,
        "bundle.zip",
        &[
            ("one.txt", &prose(800, 1)),
            ("two.txt", &prose(800, 2)),
            ("three.txt", &prose(800, 3)),
        ],
    );
    tree.create_file("plain.txt", &prose(500, 4)).unwrap();
    let mut config = Config::default();
    config.decompress.enabled = true;

    run(&config, &tree, RunMode::Index);
    let first = entries(&tree, "");
    assert_eq!(
        names(&first),
        vec!["bundle.zip", "bundle.zip", "bundle.zip", "plain.txt"]
    );
    assert!(first[..3]
        .iter()
        .all(|e| e.flags.contains(EntryFlags::ARCHIVED | EntryFlags::COMPRESSED)));

    tree.set_mtime("plain.txt", 1_000).unwrap();
    tree.set_mtime(&index_of(&tree, ""), 2_000).unwrap();
    write_zip(
        &tree,
        "bundle.zip",
        &[("one.txt", &prose(800, 1)), ("two.txt", &prose(800, 2))],
    );

    let stats = run(&config, &tree, RunMode::Index);
    assert_eq!((stats.modified, stats.unchanged), (1, 1));
    let second = entries(&tree, "");
    assert_eq!(names(&second), vec!["plain.txt", "bundle.zip", "bundle.zip"]);
    assert_eq!(second[0], first[3]);
}

#[test]
fn test_corrupt_index_forces_reindex() {
    let tree = TestTree::new().unwrap();
    tree.create_file("a.txt", &prose(1_000, 7)).unwrap();
    tree.create_file("b.txt", &prose(1_000, 8)).unwrap();
    let config = Config::default();
    run(&config, &tree, RunMode::Index);
    let good = tree.read(&index_of(&tree, "")).unwrap();

    tree.create_file(&index_of(&tree, ""), b"UG#\x03\0\xFFgarbage").unwrap();
    tree.set_mtime("a.txt", 500).unwrap();
    tree.set_mtime("b.txt", 500).unwrap();
    tree.set_mtime(&index_of(&tree, ""), 1_000).unwrap();

    let stats = run(&config, &tree, RunMode::Index);
    assert_eq!(stats.warnings, 1);
    assert_eq!(stats.added, 2);
    assert_eq!(tree.read(&index_of(&tree, "")).unwrap(), good);
}

#[test]
fn test_ignore_rules_are_scoped() {
    let tree = TestTree::new().unwrap();
    tree.create_file(".gitignore", b"*.log\nbuild/\n").unwrap();
    tree.create_file("root.log", b"log").unwrap();
    tree.create_file("root.txt", b"text").unwrap();
    tree.create_file("build/out.txt", b"built").unwrap();
    tree.create_file("a_sub/.gitignore", b"!keep.log\n").unwrap();
    tree.create_file("a_sub/keep.log", b"kept").unwrap();
    tree.create_file("z_other/drop.log", b"dropped").unwrap();
    tree.create_file("z_other/data.txt", b"data").unwrap();

    let stats = run(&Config::default(), &tree, RunMode::Index);
    assert_eq!(stats.ignored, 3);
    assert_eq!(names(&entries(&tree, "")), vec!["root.txt"]);
    assert_eq!(names(&entries(&tree, "a_sub")), vec!["keep.log"]);
    assert_eq!(names(&entries(&tree, "z_other")), vec!["data.txt"]);
    assert!(!tree.exists(&index_of(&tree, "build")));
}

#[test]
fn test_custom_ignore_file_names() {
    let tree = TestTree::new().unwrap();
    tree.create_file(".gitignore", b"*.txt\n").unwrap();
    tree.create_file(".ugignore", b"*.md\n").unwrap();
    tree.create_file("a.txt", b"text").unwrap();
    tree.create_file("b.md", b"markdown").unwrap();

    let mut config = Config::default();
    config.walk.ignore_files = vec![".ugignore".to_string()];
    run(&config, &tree, RunMode::Index);
    assert_eq!(names(&entries(&tree, "")), vec!["a.txt"]);
}

#[test]
fn test_ten_thousand_byte_example() {
    let tree = TestTree::new().unwrap();
    tree.create_file("doc.txt", &prose(10_000, 42)).unwrap();
    let config = Config::default();

    run(&config, &tree, RunMode::Index);
    let first = tree.read(&index_of(&tree, "")).unwrap();
    let entry = &entries(&tree, "")[0];
    let table = &entry.fingerprint;
    assert!(table.len() < 65_536);
    assert!(table.len() >= 128);
    assert!(noise(table) <= 0.48);
    assert!(table.len() == 128 || noise(&fold(table)) > 0.48);

    run(&config, &tree, RunMode::Index);
    assert_eq!(tree.read(&index_of(&tree, "")).unwrap(), first);

    // A forced rebuild reproduces the same bytes
    let mut forced = config.clone();
    forced.index.force = true;
    let stats = run(&forced, &tree, RunMode::Index);
    assert_eq!(stats.dirs_indexed, 1);
    assert_eq!(tree.read(&index_of(&tree, "")).unwrap(), first);

    // Writing the decoded entries in one batch gives the streamed bytes
    let copy = TestTree::new().unwrap();
    write_index(&copy.root, &entries(&tree, "")).unwrap();
    assert_eq!(copy.read(INDEX_FILENAME).unwrap(), first);
}

#[test]
fn test_binary_and_empty_files() {
    let tree = TestTree::new().unwrap();
    let mut binary = prose(2_000, 3);
    binary[100] = 0;
    tree.create_file("blob.bin", &binary).unwrap();
    tree.create_file("empty.txt", b"").unwrap();

    let mut config = Config::default();
    config.index.skip_binary = true;
    let stats = run(&config, &tree, RunMode::Index);
    assert_eq!(stats.binary_skipped, 1);

    let skipped = entries(&tree, "");
    assert_eq!(names(&skipped), vec!["blob.bin", "empty.txt"]);
    assert!(skipped[0].is_binary() && !skipped[0].has_fingerprint());
    assert!(!skipped[1].is_binary() && !skipped[1].has_fingerprint());

    config.index.skip_binary = false;
    config.index.force = true;
    run(&config, &tree, RunMode::Index);
    let indexed = entries(&tree, "");
    assert!(indexed[0].is_binary() && indexed[0].has_fingerprint());
}

#[test]
fn test_hidden_files_need_opt_in() {
    let tree = TestTree::new().unwrap();
    tree.create_file(".env", b"SECRET=1").unwrap();
    tree.create_file(".config/settings", b"x=1").unwrap();
    tree.create_file("visible.txt", b"hello").unwrap();

    run(&Config::default(), &tree, RunMode::Index);
    assert_eq!(names(&entries(&tree, "")), vec!["visible.txt"]);
    assert!(!tree.exists(&index_of(&tree, ".config")));

    let mut config = Config::default();
    config.walk.hidden = true;
    config.index.force = true;
    run(&config, &tree, RunMode::Index);
    assert_eq!(names(&entries(&tree, "")), vec![".env", "visible.txt"]);
    assert_eq!(names(&entries(&tree, ".config")), vec!["settings"]);
}

#[test]
fn test_delete_then_check_reports_missing() {
    let tree = TestTree::new().unwrap();
    tree.create_file("a/b/c.txt", b"deep").unwrap();
    let config = Config::default();
    run(&config, &tree, RunMode::Index);

    let removed = delete_indexes(&tree.root).unwrap();
    assert_eq!(removed.removed, 3);

    let stats = run(&config, &tree, RunMode::Check);
    assert_eq!(stats.dirs_stale, 3);
}

/// Overwrite a little-endian u16 field of the `nth` record starting with `signature`
fn patch_zip_field(bytes: &mut [u8], signature: &[u8; 4], nth: usize, offset: usize, value: u16) {
    let start = bytes
        .windows(4)
        .enumerate()
        .filter(|(_, w)| w[..] == signature[..])
        .nth(nth)
        .map(|(i, _)| i)
        .unwrap();
    bytes[start + offset..start + offset + 2].copy_from_slice(&value.to_le_bytes());
}

fn write_stored_zip(tree: &TestTree, rel: &str, members: &[(&str, &[u8])]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
    let options = zip::write::SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Stored);
    for (name, body) in members {
        writer.start_file(*name, options).unwrap();
        writer.write_all(body).unwrap();
    }
    let bytes = writer.finish().unwrap().into_inner();
    tree.create_file(rel, &bytes).unwrap();
    bytes
}

#[test]
fn test_unreadable_content_gets_no_entry() {
    let tree = TestTree::new().unwrap();
    tree.create_file("good.txt", &prose(500, 4)).unwrap();
    tree.create_file("bad.gz", b"\x1f\x8bgarbage where a gzip header belongs")
        .unwrap();
    let mut config = Config::default();
    config.decompress.enabled = true;

    let stats = run(&config, &tree, RunMode::Index);
    assert_eq!(stats.warnings, 1);
    assert_eq!(stats.dirs_indexed, 1);
    assert_eq!(stats.content_bytes, 500);
    assert_eq!(names(&entries(&tree, "")), vec!["good.txt"]);

    // Not retried until something in the directory changes
    let again = run(&config, &tree, RunMode::Index);
    assert_eq!(again.dirs_indexed, 0);
    assert_eq!(again.warnings, 0);
}

#[test]
fn test_archive_failing_midway_leaves_no_members() {
    let tree = TestTree::new().unwrap();
    tree.create_file("plain.txt", b"plain words").unwrap();
    let mut bytes = write_stored_zip(
        &tree,
        "bundle.zip",
        &[("a.txt", b"alpha member text"), ("b.txt", b"bravo member text")],
    );
    // Damage the second member so its checksum fails after the first is indexed
    let at = bytes.windows(5).position(|w| w == b"bravo").unwrap();
    bytes[at..at + 5].copy_from_slice(b"BRAVO");
    fs::write(tree.path("bundle.zip"), &bytes).unwrap();

    let mut config = Config::default();
    config.decompress.enabled = true;
    let stats = run(&config, &tree, RunMode::Index);

    assert_eq!(stats.warnings, 1);
    let written = entries(&tree, "");
    assert_eq!(names(&written), vec!["plain.txt"]);
    assert!(written[0].has_fingerprint());
}

#[test]
fn test_unsupported_archive_member_is_binary() {
    let tree = TestTree::new().unwrap();
    let mut bytes = write_stored_zip(
        &tree,
        "bundle.zip",
        &[("a.txt", b"alpha member text"), ("b.txt", b"bravo member text")],
    );
    // Give the second member a compression method no decoder supports
    patch_zip_field(&mut bytes, b"PK\x03\x04", 1, 8, 97);
    patch_zip_field(&mut bytes, b"PK\x01\x02", 1, 10, 97);
    fs::write(tree.path("bundle.zip"), &bytes).unwrap();

    let mut config = Config::default();
    config.decompress.enabled = true;
    let stats = run(&config, &tree, RunMode::Index);
    assert_eq!(stats.warnings, 0);
    assert_eq!(stats.binary_skipped, 1);

    let written = entries(&tree, "");
    assert_eq!(names(&written), vec!["bundle.zip", "bundle.zip"]);
    assert!(written[0].is_archived() && written[0].has_fingerprint());
    assert!(written[1].flags.contains(EntryFlags::ARCHIVED | EntryFlags::BINARY));
    assert!(!written[1].has_fingerprint());
}

#[test]
fn test_write_failure_does_not_stop_the_walk() {
    let tree = TestTree::new().unwrap();
    tree.create_file("a/ok.txt", b"indexed fine").unwrap();
    tree.create_file("b/stuck.txt", b"cannot be indexed").unwrap();
    // A directory squatting on the index name cannot be replaced by a file
    tree.create_dir(&index_of(&tree, "b")).unwrap();
    tree.set_mtime(&index_of(&tree, "b"), 1_000).unwrap();

    let stats = run(&Config::default(), &tree, RunMode::Index);
    assert_eq!(stats.writes_attempted, 3);
    assert_eq!(stats.write_failures, 1);
    assert_eq!(stats.dirs_indexed, 2);
    assert!(stats.warnings >= 1);
    assert!(stats.ensure_written().is_ok());
    assert_eq!(names(&entries(&tree, "a")), vec!["ok.txt"]);

    let leftovers: Vec<_> = fs::read_dir(tree.path("b"))
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .filter(|name| name.starts_with(".ugidx-"))
        .collect();
    assert!(leftovers.is_empty());
}

#[test]
fn test_every_write_failing_is_an_error() {
    let tree = TestTree::new().unwrap();
    tree.create_file("only.txt", b"nowhere to go").unwrap();
    tree.create_dir(INDEX_FILENAME).unwrap();
    tree.set_mtime(INDEX_FILENAME, 1_000).unwrap();

    let stats = run(&Config::default(), &tree, RunMode::Index);
    assert_eq!(stats.writes_attempted, 1);
    assert_eq!(stats.write_failures, 1);
    assert!(stats.ensure_written().is_err());
}

#[test]
fn test_future_dated_file_keeps_directory_stale() {
    let tree = TestTree::new().unwrap();
    tree.create_file("a.txt", b"from tomorrow").unwrap();
    tree.touch_future("a.txt", Duration::from_secs(3_600)).unwrap();
    let config = Config::default();

    let first = run(&config, &tree, RunMode::Index);
    assert_eq!(first.future_mtimes, 1);

    let second = run(&config, &tree, RunMode::Index);
    assert_eq!(second.dirs_indexed, 1);
    assert_eq!(second.modified, 1);
    assert_eq!(second.future_mtimes, 1);
    assert!(!run(&config, &tree, RunMode::Check).is_clean());
}
