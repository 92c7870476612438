//! Tests for IntegrityChecker
//!
//! These tests verify:
//! - Per-entry verdicts for every record shape
//! - Cross-suppression of backed-up symlinks by retargeted installed links
//! - verify() reports without marking or suppressing
//! - Pluggable checksum oracle

use std::fs;
use std::os::unix::fs::symlink;
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use undolog::crc::CrcOracle;
use undolog::integrity::{IntegrityChecker, Mismatch};
use undolog::log::{LogReader, LogSession, LogWriter};
use undolog::store::BackupStore;

// =============================================================================
// Helper Functions
// =============================================================================

fn setup_generation() -> (TempDir, BackupStore, LogWriter, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let store = BackupStore::new(temp_dir.path().join("backup"));
    let tree = temp_dir.path().join("tree");
    fs::create_dir(&tree).unwrap();
    let writer = LogWriter::init(store.clone(), "1.0", "Checker Test").unwrap();
    (temp_dir, store, writer, tree)
}

fn load(store: &BackupStore) -> LogSession {
    LogReader::new(store).open_session().unwrap()
}

fn install_file(writer: &mut LogWriter, path: &Path, content: &[u8]) {
    fs::write(path, content).unwrap();
    writer.log_installed_file(path).unwrap();
}

fn install_symlink(writer: &mut LogWriter, path: &Path, target: &str) {
    symlink(target, path).unwrap();
    writer
        .log_installed_symlink(path, Path::new(target))
        .unwrap();
}

/// Oracle that reports the same checksum for every file
struct FixedCrc(u32);

impl CrcOracle for FixedCrc {
    fn file_crc(&self, _path: &Path) -> undolog::Result<u32> {
        Ok(self.0)
    }
}

// =============================================================================
// Clean Installation Tests
// =============================================================================

#[test]
fn test_untouched_installation_is_clean() {
    let (_temp, store, mut writer, tree) = setup_generation();
    let conf = tree.join("a.conf");
    fs::write(&conf, b"old").unwrap();
    writer.backup_file(&conf).unwrap();
    install_file(&mut writer, &conf, b"new");
    install_symlink(&mut writer, &tree.join("link"), "a.conf");

    let mut session = load(&store);
    let report = IntegrityChecker::new(&store).check(&mut session);

    assert!(report.is_clean());
    assert_eq!(report.checked, 3);
    assert_eq!(session.valid_count(), 3);
}

// =============================================================================
// Per-Entry Verdict Tests
// =============================================================================

#[test]
fn test_modified_installed_file_is_invalid() {
    let (_temp, store, mut writer, tree) = setup_generation();
    let file = tree.join("lib.so");
    install_file(&mut writer, &file, b"original");
    fs::write(&file, b"edited by user").unwrap();

    let mut session = load(&store);
    let report = IntegrityChecker::new(&store).check(&mut session);

    assert!(!session.entries[0].valid);
    assert!(matches!(
        report.findings[0].mismatch,
        Mismatch::ChecksumChanged { .. }
    ));
}

#[test]
fn test_missing_installed_file_is_invalid() {
    let (_temp, store, mut writer, tree) = setup_generation();
    let file = tree.join("lib.so");
    install_file(&mut writer, &file, b"x");
    fs::remove_file(&file).unwrap();

    let mut session = load(&store);
    let report = IntegrityChecker::new(&store).check(&mut session);

    assert_eq!(report.findings.len(), 1);
    assert_eq!(report.findings[0].mismatch, Mismatch::Missing);
}

#[test]
fn test_installed_symlink_replaced_by_file() {
    let (_temp, store, mut writer, tree) = setup_generation();
    let link = tree.join("link");
    fs::write(tree.join("target"), b"t").unwrap();
    install_symlink(&mut writer, &link, "target");
    fs::remove_file(&link).unwrap();
    fs::write(&link, b"regular").unwrap();

    let mut session = load(&store);
    let report = IntegrityChecker::new(&store).check(&mut session);

    assert_eq!(report.findings[0].mismatch, Mismatch::NotSymlink);
}

#[test]
fn test_dangling_installed_symlink_is_invalid() {
    let (_temp, store, mut writer, tree) = setup_generation();
    install_symlink(&mut writer, &tree.join("link"), "/does/not/exist");

    let mut session = load(&store);
    let report = IntegrityChecker::new(&store).check(&mut session);

    assert!(!session.entries[0].valid);
    assert_eq!(report.findings[0].mismatch, Mismatch::Missing);
}

#[test]
fn test_installed_symlink_whose_target_vanished_is_invalid() {
    let (_temp, store, mut writer, tree) = setup_generation();
    let target = tree.join("libfoo.so.1");
    fs::write(&target, b"lib").unwrap();
    install_symlink(&mut writer, &tree.join("libfoo.so"), "libfoo.so.1");

    let mut session = load(&store);
    assert!(IntegrityChecker::new(&store).check(&mut session).is_clean());

    fs::remove_file(&target).unwrap();
    let mut session = load(&store);
    let report = IntegrityChecker::new(&store).check(&mut session);

    assert_eq!(report.findings[0].mismatch, Mismatch::Missing);
}

#[test]
fn test_missing_slot_is_invalid() {
    let (_temp, store, mut writer, tree) = setup_generation();
    let conf = tree.join("a.conf");
    fs::write(&conf, b"old").unwrap();
    writer.backup_file(&conf).unwrap();
    fs::remove_file(store.slot_path(100)).unwrap();

    let mut session = load(&store);
    let report = IntegrityChecker::new(&store).check(&mut session);

    assert_eq!(
        report.findings[0].mismatch,
        Mismatch::SlotMissing {
            slot: store.slot_path(100)
        }
    );
}

#[test]
fn test_corrupted_slot_is_invalid() {
    let (_temp, store, mut writer, tree) = setup_generation();
    let conf = tree.join("a.conf");
    fs::write(&conf, b"old").unwrap();
    writer.backup_file(&conf).unwrap();
    fs::write(store.slot_path(100), b"tampered").unwrap();

    let mut session = load(&store);
    let report = IntegrityChecker::new(&store).check(&mut session);

    assert!(matches!(
        report.findings[0].mismatch,
        Mismatch::SlotChecksumChanged { .. }
    ));
}

// =============================================================================
// Cross-Suppression Tests
// =============================================================================

#[test]
fn test_retargeted_symlink_suppresses_backed_up_symlink() {
    let (_temp, store, mut writer, tree) = setup_generation();
    let link = tree.join("libfoo.so");
    symlink("libfoo.so.1", &link).unwrap();
    writer.backup_file(&link).unwrap();
    fs::write(tree.join("libfoo.so.2"), b"v2").unwrap();
    fs::write(tree.join("libfoo.so.3"), b"v3").unwrap();
    install_symlink(&mut writer, &link, "libfoo.so.2");

    // Someone else repointed the link after install
    fs::remove_file(&link).unwrap();
    symlink("libfoo.so.3", &link).unwrap();

    let mut session = load(&store);
    let report = IntegrityChecker::new(&store).check(&mut session);

    assert!(!session.entries[0].valid);
    assert!(!session.entries[1].valid);
    assert_eq!(report.findings.len(), 2);
    assert_eq!(report.findings[0].index, 0);
    assert_eq!(report.findings[0].mismatch, Mismatch::SuppressedBySymlink);
    assert!(matches!(
        report.findings[1].mismatch,
        Mismatch::TargetChanged { .. }
    ));
}

#[test]
fn test_suppression_is_filename_keyed() {
    let (_temp, store, mut writer, tree) = setup_generation();
    let a = tree.join("a");
    let b = tree.join("b");
    symlink("old-a", &a).unwrap();
    symlink("old-b", &b).unwrap();
    writer.backup_file(&a).unwrap();
    writer.backup_file(&b).unwrap();
    for target in ["new-a", "new-b", "other"] {
        fs::write(tree.join(target), target).unwrap();
    }
    install_symlink(&mut writer, &a, "new-a");
    install_symlink(&mut writer, &b, "new-b");

    fs::remove_file(&a).unwrap();
    symlink("other", &a).unwrap();

    let mut session = load(&store);
    IntegrityChecker::new(&store).check(&mut session);

    let valid: Vec<bool> = session.entries.iter().map(|e| e.valid).collect();
    assert_eq!(valid, vec![false, true, false, true]);
}

#[test]
fn test_missing_installed_symlink_does_not_suppress() {
    let (_temp, store, mut writer, tree) = setup_generation();
    let link = tree.join("libfoo.so");
    symlink("libfoo.so.1", &link).unwrap();
    writer.backup_file(&link).unwrap();
    install_symlink(&mut writer, &link, "libfoo.so.2");
    fs::remove_file(&link).unwrap();

    let mut session = load(&store);
    IntegrityChecker::new(&store).check(&mut session);

    assert!(session.entries[0].valid);
    assert!(!session.entries[1].valid);
}

// =============================================================================
// Verify Tests
// =============================================================================

#[test]
fn test_verify_does_not_mark_or_suppress() {
    let (_temp, store, mut writer, tree) = setup_generation();
    let link = tree.join("libfoo.so");
    symlink("libfoo.so.1", &link).unwrap();
    writer.backup_file(&link).unwrap();
    install_symlink(&mut writer, &link, "libfoo.so.2");
    fs::remove_file(&link).unwrap();
    fs::write(tree.join("elsewhere"), b"x").unwrap();
    symlink("elsewhere", &link).unwrap();

    let session = load(&store);
    let report = IntegrityChecker::new(&store).verify(&session);

    assert_eq!(report.findings.len(), 1);
    assert_eq!(report.findings[0].index, 1);
    assert_eq!(session.valid_count(), 2);
}

#[test]
fn test_custom_crc_oracle() {
    let (_temp, store, mut writer, tree) = setup_generation();
    install_file(&mut writer, &tree.join("f"), b"data");
    let recorded = crc32fast::hash(b"data");

    let session = load(&store);
    let matching = IntegrityChecker::with_crc(&store, FixedCrc(recorded)).verify(&session);
    let differing = IntegrityChecker::with_crc(&store, FixedCrc(recorded ^ 1)).verify(&session);

    assert!(matching.is_clean());
    assert!(!differing.is_clean());
}
