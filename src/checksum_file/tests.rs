use super::*;
use filetime::{FileTime, set_file_mtime};
use std::fs;
use tempfile::TempDir;

const FOO_DIGEST: &str = "d3b07384d113edec49eaa6238ad5ff00";
const BAR_DIGEST: &str = "c157a79031e1c40f85931829bc5fc552";

fn fixed() -> ChecksumFileName {
    ChecksumFileName::default()
}

fn open(dir: &Path, checksum_files: &[&str], mode: Mode) -> ChecksumStore {
    open_with(dir, checksum_files, mode, fixed())
}

fn open_with(
    dir: &Path,
    checksum_files: &[&str],
    mode: Mode,
    layout: ChecksumFileName,
) -> ChecksumStore {
    let names: Vec<String> = checksum_files.iter().map(|s| s.to_string()).collect();
    let (store, problems) = ChecksumStore::open(dir, &names, mode, layout, Interrupt::new());
    assert!(problems.is_empty(), "unexpected problems: {problems:?}");
    store
}

fn set_mtime(path: &Path, seconds: i64) {
    set_file_mtime(path, FileTime::from_unix_time(seconds, 0)).unwrap();
}

#[test]
fn test_parse_binary_and_text_lines() {
    assert_eq!(
        parse_line(&format!("{FOO_DIGEST} *foo.txt")),
        Some((FOO_DIGEST.to_string(), "foo.txt"))
    );
    assert_eq!(
        parse_line(&format!("{FOO_DIGEST}  name with spaces")),
        Some((FOO_DIGEST.to_string(), "name with spaces"))
    );
    assert_eq!(
        parse_line(&format!("{} *foo.txt", FOO_DIGEST.to_uppercase())),
        Some((FOO_DIGEST.to_string(), "foo.txt"))
    );
}

#[test]
fn test_parse_rejects_malformed_lines() {
    assert_eq!(parse_line("short *foo.txt"), None);
    assert_eq!(parse_line(&format!("{FOO_DIGEST}*foo.txt")), None);
    assert_eq!(parse_line(&format!("{FOO_DIGEST} *")), None);
    assert_eq!(
        parse_line("zzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzz *foo.txt"),
        None
    );
}

#[test]
fn test_format_line() {
    assert_eq!(
        format_line(FOO_DIGEST, "foo.txt"),
        format!("{FOO_DIGEST} *foo.txt\n")
    );
}

#[test]
fn test_open_loads_entries() {
    let temp = TempDir::new().unwrap();
    let dir = temp.path();
    fs::write(
        dir.join("Checksums.md5"),
        format!("{FOO_DIGEST} *foo.txt\n\n{BAR_DIGEST} *bar.txt\n"),
    )
    .unwrap();

    let store = open(dir, &["Checksums.md5"], Mode::Check);

    assert_eq!(store.entries().len(), 2);
    let entry = &store.entries()["foo.txt"];
    assert_eq!(entry.digest, FOO_DIGEST);
    assert_eq!(entry.source, dir.join("Checksums.md5"));
    assert_eq!(store.verify("foo.txt", FOO_DIGEST), Some(true));
    assert_eq!(store.verify("foo.txt", BAR_DIGEST), Some(false));
    assert_eq!(store.verify("missing.txt", FOO_DIGEST), None);
    assert!(!store.is_modified());
}

#[test]
fn test_open_reports_malformed_lines_and_keeps_the_rest() {
    let temp = TempDir::new().unwrap();
    let dir = temp.path();
    fs::write(
        dir.join("Checksums.md5"),
        format!("garbage\n{FOO_DIGEST} *foo.txt\n"),
    )
    .unwrap();

    let (store, problems) = ChecksumStore::open(
        dir,
        &["Checksums.md5".to_string()],
        Mode::Check,
        fixed(),
        Interrupt::new(),
    );

    assert_eq!(problems.len(), 1);
    assert!(matches!(problems[0], StoreError::MalformedLine { line: 1, .. }));
    assert!(store.entries().contains_key("foo.txt"));
}

#[test]
fn test_unreadable_checksum_file_has_no_entries() {
    let temp = TempDir::new().unwrap();
    let dir = temp.path();
    // A directory with the checksum file's name cannot be read as a file.
    fs::create_dir(dir.join("Checksums.md5")).unwrap();

    let (store, problems) = ChecksumStore::open(
        dir,
        &["Checksums.md5".to_string()],
        Mode::Check,
        fixed(),
        Interrupt::new(),
    );

    assert_eq!(problems.len(), 1);
    assert!(store.entries().is_empty());
}

#[test]
fn test_create_mode_ignores_existing_entries() {
    let temp = TempDir::new().unwrap();
    let dir = temp.path();
    fs::write(dir.join("Checksums.md5"), format!("{BAR_DIGEST} *bar.txt\n")).unwrap();

    let store = open(dir, &["Checksums.md5"], Mode::Create);

    assert!(store.entries().is_empty());
}

#[test]
fn test_create_writes_sorted_file_on_close() {
    let temp = TempDir::new().unwrap();
    let dir = temp.path();
    fs::write(dir.join("Checksums.md5"), "stale content\n").unwrap();

    let mut store = open(dir, &["Checksums.md5"], Mode::Create);
    store.record_hash("foo.txt", FOO_DIGEST).unwrap();
    store.record_hash("bar.txt", BAR_DIGEST).unwrap();
    assert!(store.is_modified());

    let report = store.close().unwrap();

    assert_eq!(report.rewritten, vec![dir.join("Checksums.md5")]);
    assert!(report.errors.is_empty());
    assert_eq!(
        fs::read_to_string(dir.join("Checksums.md5")).unwrap(),
        format!("{BAR_DIGEST} *bar.txt\n{FOO_DIGEST} *foo.txt\n")
    );
}

#[test]
fn test_update_replaces_and_adds_entries() {
    let temp = TempDir::new().unwrap();
    let dir = temp.path();
    fs::write(
        dir.join("Checksums.md5"),
        format!("{BAR_DIGEST} *foo.txt\n"),
    )
    .unwrap();

    let mut store = open(dir, &["Checksums.md5"], Mode::Update);
    store.record_hash("foo.txt", FOO_DIGEST).unwrap();
    store.record_hash("bar.txt", BAR_DIGEST).unwrap();
    store.close().unwrap();

    assert_eq!(
        fs::read_to_string(dir.join("Checksums.md5")).unwrap(),
        format!("{BAR_DIGEST} *bar.txt\n{FOO_DIGEST} *foo.txt\n")
    );
}

#[test]
fn test_remove_entry_rewrites_without_it() {
    let temp = TempDir::new().unwrap();
    let dir = temp.path();
    fs::write(
        dir.join("Checksums.md5"),
        format!("{BAR_DIGEST} *bar.txt\n{FOO_DIGEST} *foo.txt\n"),
    )
    .unwrap();

    let mut store = open(dir, &["Checksums.md5"], Mode::Update);
    store.remove_entry("bar.txt");
    assert!(store.is_modified());
    assert!(!store.entries().contains_key("bar.txt"));
    store.close().unwrap();

    assert_eq!(
        fs::read_to_string(dir.join("Checksums.md5")).unwrap(),
        format!("{FOO_DIGEST} *foo.txt\n")
    );
}

#[test]
fn test_removing_last_entry_deletes_checksum_file() {
    let temp = TempDir::new().unwrap();
    let dir = temp.path();
    fs::write(dir.join("Checksums.md5"), format!("{BAR_DIGEST} *bar.txt\n")).unwrap();

    let mut store = open(dir, &["Checksums.md5"], Mode::Update);
    store.remove_entry("bar.txt");
    let report = store.close().unwrap();

    assert_eq!(report.deleted, vec![dir.join("Checksums.md5")]);
    assert!(!dir.join("Checksums.md5").exists());
}

#[test]
fn test_unmodified_store_leaves_file_untouched() {
    let temp = TempDir::new().unwrap();
    let dir = temp.path();
    // Unsorted on purpose: only modified files are rewritten.
    let content = format!("{FOO_DIGEST} *foo.txt\n{BAR_DIGEST} *bar.txt\n");
    fs::write(dir.join("Checksums.md5"), &content).unwrap();

    let store = open(dir, &["Checksums.md5"], Mode::Update);
    let report = store.close().unwrap();

    assert!(report.rewritten.is_empty());
    assert_eq!(fs::read_to_string(dir.join("Checksums.md5")).unwrap(), content);
}

#[test]
fn test_all_layout_writes_one_file_per_entry() {
    let temp = TempDir::new().unwrap();
    let dir = temp.path();

    let mut store = open_with(dir, &[], Mode::Create, ChecksumFileName::All);
    store.record_hash("foo.txt", FOO_DIGEST).unwrap();
    store.record_hash("bar.txt", BAR_DIGEST).unwrap();
    store.close().unwrap();

    assert_eq!(
        fs::read_to_string(dir.join("foo.txt.md5")).unwrap(),
        format!("{FOO_DIGEST} *foo.txt\n")
    );
    assert_eq!(
        fs::read_to_string(dir.join("bar.txt.md5")).unwrap(),
        format!("{BAR_DIGEST} *bar.txt\n")
    );
}

#[test]
fn test_all_layout_removal_only_touches_owning_file() {
    let temp = TempDir::new().unwrap();
    let dir = temp.path();
    fs::write(dir.join("a.md5"), format!("{FOO_DIGEST} *foo.txt\n")).unwrap();
    fs::write(
        dir.join("b.md5"),
        format!("{BAR_DIGEST} *bar.txt\n{FOO_DIGEST} *baz.txt\n"),
    )
    .unwrap();

    let mut store = open_with(dir, &["a.md5", "b.md5"], Mode::Update, ChecksumFileName::All);
    store.remove_entry("bar.txt");
    let report = store.close().unwrap();

    assert_eq!(report.rewritten, vec![dir.join("b.md5")]);
    assert_eq!(
        fs::read_to_string(dir.join("a.md5")).unwrap(),
        format!("{FOO_DIGEST} *foo.txt\n")
    );
    assert_eq!(
        fs::read_to_string(dir.join("b.md5")).unwrap(),
        format!("{FOO_DIGEST} *baz.txt\n")
    );
}

#[test]
fn test_all_layout_moves_rehashed_entry_to_its_own_file() {
    let temp = TempDir::new().unwrap();
    let dir = temp.path();
    fs::write(
        dir.join("Sums.md5"),
        format!("{BAR_DIGEST} *bar.txt\n{BAR_DIGEST} *foo.txt\n"),
    )
    .unwrap();

    let mut store = open_with(dir, &["Sums.md5"], Mode::Update, ChecksumFileName::All);
    store.record_hash("foo.txt", FOO_DIGEST).unwrap();
    store.close().unwrap();

    assert_eq!(
        fs::read_to_string(dir.join("Sums.md5")).unwrap(),
        format!("{BAR_DIGEST} *bar.txt\n")
    );
    assert_eq!(
        fs::read_to_string(dir.join("foo.txt.md5")).unwrap(),
        format!("{FOO_DIGEST} *foo.txt\n")
    );
}

#[test]
fn test_freshness_compares_with_checksum_file_mtime() {
    let temp = TempDir::new().unwrap();
    let dir = temp.path();
    fs::write(dir.join("old.txt"), "old").unwrap();
    fs::write(dir.join("new.txt"), "new").unwrap();
    fs::write(
        dir.join("Checksums.md5"),
        format!("{BAR_DIGEST} *new.txt\n{FOO_DIGEST} *old.txt\n"),
    )
    .unwrap();
    set_mtime(&dir.join("old.txt"), 1_000_000_000);
    set_mtime(&dir.join("Checksums.md5"), 1_000_000_100);
    set_mtime(&dir.join("new.txt"), 1_000_000_200);

    let store = open(dir, &["Checksums.md5"], Mode::Update);

    assert!(store.is_fresh("old.txt"));
    assert!(!store.is_fresh("new.txt"));
    assert!(!store.is_fresh("unlisted.txt"));
}

#[test]
fn test_equal_mtime_is_not_fresh() {
    let temp = TempDir::new().unwrap();
    let dir = temp.path();
    fs::write(dir.join("foo.txt"), "foo\n").unwrap();
    fs::write(dir.join("Checksums.md5"), format!("{FOO_DIGEST} *foo.txt\n")).unwrap();
    set_mtime(&dir.join("foo.txt"), 1_000_000_000);
    set_mtime(&dir.join("Checksums.md5"), 1_000_000_000);

    let store = open(dir, &["Checksums.md5"], Mode::Update);

    assert!(!store.is_fresh("foo.txt"));
}

#[test]
fn test_delete_all_removes_existing_and_new_files() {
    let temp = TempDir::new().unwrap();
    let dir = temp.path();
    fs::write(dir.join("Checksums.md5"), format!("{BAR_DIGEST} *bar.txt\n")).unwrap();

    let mut store = open(dir, &["Checksums.md5"], Mode::Create);
    store.record_hash("foo.txt", FOO_DIGEST).unwrap();

    let deleted = store.delete_all().unwrap();
    assert_eq!(deleted, vec![dir.join("Checksums.md5")]);
    assert!(!store.is_modified());

    let report = store.close().unwrap();
    assert!(report.rewritten.is_empty());
    assert!(!dir.join("Checksums.md5").exists());
}

#[test]
fn test_drop_persists_recorded_entries() {
    let temp = TempDir::new().unwrap();
    let dir = temp.path();

    {
        let mut store = open(dir, &[], Mode::Create);
        store.record_hash("foo.txt", FOO_DIGEST).unwrap();
    }

    assert_eq!(
        fs::read_to_string(dir.join("Checksums.md5")).unwrap(),
        format!("{FOO_DIGEST} *foo.txt\n")
    );
}

#[test]
fn test_close_after_earlier_interrupt_still_rewrites() {
    let temp = TempDir::new().unwrap();
    let dir = temp.path();
    let interrupt = Interrupt::new();

    let (mut store, _) =
        ChecksumStore::open(dir, &[], Mode::Create, fixed(), interrupt.clone());
    store.record_hash("foo.txt", FOO_DIGEST).unwrap();
    interrupt.trigger();

    let report = store.close().unwrap();

    assert_eq!(report.rewritten, vec![dir.join("Checksums.md5")]);
}

#[test]
fn test_interrupt_during_close_stops_rewriting() {
    let temp = TempDir::new().unwrap();
    let dir = temp.path();
    // Close polls once up front, then once per modified checksum file.
    let interrupt = Interrupt::after_polls(3);

    let (mut store, _) =
        ChecksumStore::open(dir, &[], Mode::Create, ChecksumFileName::All, interrupt);
    store.record_hash("a.txt", FOO_DIGEST).unwrap();
    store.record_hash("b.txt", BAR_DIGEST).unwrap();

    let result = store.close();

    assert!(
        matches!(&result, Err(StoreError::Interrupted(path)) if *path == dir.join("b.txt.md5")),
        "unexpected result: {result:?}"
    );
    assert_eq!(
        fs::read_to_string(dir.join("a.txt.md5")).unwrap(),
        format!("{FOO_DIGEST} *a.txt\n")
    );
}

#[test]
#[cfg(unix)]
fn test_rewrite_keeps_permissions() {
    use std::os::unix::fs::PermissionsExt;

    let temp = TempDir::new().unwrap();
    let dir = temp.path();
    let path = dir.join("Checksums.md5");
    fs::write(&path, format!("{FOO_DIGEST} *foo.txt\n")).unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o640)).unwrap();

    let mut store = open(dir, &["Checksums.md5"], Mode::Update);
    store.record_hash("bar.txt", BAR_DIGEST).unwrap();
    store.close().unwrap();

    let mode = fs::metadata(&path).unwrap().permissions().mode();
    assert_eq!(mode & 0o777, 0o640);
}
