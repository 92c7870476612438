//! Tests for the log text format
//!
//! These tests verify:
//! - Each record shape survives encode → parse
//! - Filenames with spaces and colons
//! - Malformed headers and records fail with the right line number
//! - Header-only and empty logs

use std::path::PathBuf;

use undolog::log::{
    encode_entry, encode_header, parse_session, EntryTag, Header, LogEntry, Ownership,
    SLOT_BASE,
};
use undolog::UndoError;

// =============================================================================
// Helper Functions
// =============================================================================

fn header() -> Header {
    Header {
        version: "1.0-4706301 (470.63.01)".to_string(),
        description: "Sample Driver".to_string(),
    }
}

fn encode_log(entries: &[LogEntry]) -> Vec<u8> {
    let mut buf = encode_header(&header()).unwrap();
    for entry in entries {
        buf.extend(encode_entry(entry).unwrap());
    }
    buf
}

fn parse_line_error(buf: &[u8]) -> usize {
    match parse_session(buf) {
        Err(UndoError::Parse { line, .. }) => line,
        other => panic!("expected parse error, got {:?}", other),
    }
}

fn own(mode: u32, uid: u32, gid: u32) -> Ownership {
    Ownership { mode, uid, gid }
}

// =============================================================================
// Round Trip Tests
// =============================================================================

#[test]
fn test_all_record_shapes_round_trip() {
    let entries = vec![
        LogEntry::installed_file("/usr/lib/libfoo.so.1", 0xDEADBEEF),
        LogEntry::installed_symlink("/usr/lib/libfoo.so", "libfoo.so.1"),
        LogEntry::backed_up_symlink("/usr/lib/libbar.so", "libbar.so.2", own(0o777, 0, 0)),
        LogEntry::backup_slot(SLOT_BASE, "/etc/sample.conf", 12345, own(0o644, 1000, 100)),
    ];

    let session = parse_session(&encode_log(&entries)).unwrap();

    assert_eq!(session.header, header());
    assert_eq!(session.entries, entries);
}

#[test]
fn test_filenames_with_spaces_and_colons() {
    let entries = vec![
        LogEntry::installed_file("/opt/my app/a:b: c.txt", 1),
        LogEntry::installed_symlink("/opt/link: x", "/target with space:1"),
        LogEntry::backup_slot(SLOT_BASE + 3, "/etc/x y:z", 7, own(0o600, 5, 6)),
    ];

    let session = parse_session(&encode_log(&entries)).unwrap();

    assert_eq!(session.entries[0].filename, PathBuf::from("/opt/my app/a:b: c.txt"));
    assert_eq!(
        session.entries[1].target,
        Some(PathBuf::from("/target with space:1"))
    );
    assert_eq!(session.entries[2].tag, EntryTag::BackupSlot(SLOT_BASE + 3));
    assert_eq!(session.entries[2].filename, PathBuf::from("/etc/x y:z"));
}

#[test]
fn test_mode_written_as_four_octal_digits() {
    let entry = LogEntry::backup_slot(SLOT_BASE, "/etc/a", 42, own(0o100644, 0, 0));
    let text = String::from_utf8(encode_entry(&entry).unwrap()).unwrap();
    assert_eq!(text, "100: /etc/a\n42 0644 0 0\n");
}

#[test]
fn test_newline_in_filename_is_refused() {
    let entry = LogEntry::installed_file("/etc/bad\nname", 1);
    assert!(encode_entry(&entry).is_err());
}

#[test]
fn test_entry_missing_fields_is_an_encode_error() {
    let mut entry = LogEntry::installed_file("/usr/lib/libfoo.so.1", 1);
    entry.crc = None;
    assert!(matches!(encode_entry(&entry), Err(UndoError::Encode(_))));

    let mut entry = LogEntry::installed_symlink("/usr/lib/libfoo.so", "libfoo.so.1");
    entry.target = None;
    assert!(matches!(encode_entry(&entry), Err(UndoError::Encode(_))));
}

#[test]
fn test_multiline_header_is_an_encode_error() {
    let header = Header {
        version: "1.0-1 (1)".to_string(),
        description: "two\nlines".to_string(),
    };
    assert!(matches!(encode_header(&header), Err(UndoError::Encode(_))));
}

#[test]
fn test_parsed_entries_start_valid() {
    let session = parse_session(&encode_log(&[LogEntry::installed_file("/a", 1)])).unwrap();
    assert!(session.entries[0].valid);
}

// =============================================================================
// Header Tests
// =============================================================================

#[test]
fn test_header_only_log_has_no_entries() {
    let session = parse_session(b"1.0-1 (1)\ndesc\n").unwrap();
    assert!(session.entries.is_empty());
    assert_eq!(session.header.description, "desc");
}

#[test]
fn test_empty_log_fails_on_line_one() {
    assert_eq!(parse_line_error(b""), 1);
}

#[test]
fn test_non_utf8_description_is_kept_lossily() {
    let session = parse_session(b"1.0-1 (1)\nSample \xff Driver\n0: /a\n1\n").unwrap();
    assert_eq!(session.header.description, "Sample \u{fffd} Driver");
    assert_eq!(session.entries.len(), 1);
}

#[test]
fn test_unterminated_description_fails() {
    assert_eq!(parse_line_error(b"1.0-1 (1)\ndesc"), 2);
}

#[test]
fn test_missing_description_fails_on_line_two() {
    assert_eq!(parse_line_error(b"1.0-1 (1)\n"), 2);
}

// =============================================================================
// Malformed Record Tests
// =============================================================================

#[test]
fn test_non_digit_tag_fails_with_line_number() {
    let buf = b"v\nd\n0: /a\n1\nx1: /b\n2\n";
    assert_eq!(parse_line_error(buf), 5);
}

#[test]
fn test_header_without_colon_fails() {
    assert_eq!(parse_line_error(b"v\nd\n/etc/foo\n"), 3);
}

#[test]
fn test_reserved_tag_range_is_rejected() {
    assert_eq!(parse_line_error(b"v\nd\n50: /etc/foo\n1 0644 0 0\n"), 3);
}

#[test]
fn test_blank_line_between_records_is_rejected() {
    assert_eq!(parse_line_error(b"v\nd\n0: /a\n1\n\n0: /b\n2\n"), 5);
}

#[test]
fn test_missing_continuation_names_next_line() {
    assert_eq!(parse_line_error(b"v\nd\n0: /a\n"), 4);
}

#[test]
fn test_short_slot_continuation_fails() {
    assert_eq!(parse_line_error(b"v\nd\n100: /etc/a\n123 0644 0\n"), 4);
}

#[test]
fn test_non_octal_mode_fails() {
    assert_eq!(parse_line_error(b"v\nd\n2: /l\nt\n0698 0 0\n"), 5);
}

#[test]
fn test_crc_out_of_range_fails() {
    assert_eq!(parse_line_error(b"v\nd\n0: /a\n99999999999\n"), 4);
}

// =============================================================================
// Truncation Tests
// =============================================================================

#[test]
fn test_slot_record_cut_inside_gid_fails() {
    // Full record ends "123 0644 0 10\n"
    assert_eq!(parse_line_error(b"1.0-1 (1)\ndesc\n100: /etc/x\n123 0644 0 1"), 4);
}

#[test]
fn test_symlink_target_cut_off_fails() {
    assert_eq!(
        parse_line_error(b"1.0-1 (1)\ndesc\n1: /usr/lib/libfoo.so\nlibfoo.so.47"),
        4
    );
}

#[test]
fn test_record_header_cut_off_fails() {
    assert_eq!(parse_line_error(b"1.0-1 (1)\ndesc\n0: /a\n1\n0: /usr/li"), 5);
}
