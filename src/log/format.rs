//! Log text format
//!
//! Encoding and decoding of the header and the four record shapes.
//!
//! ## Record Layout
//! ```text
//! InstalledFile     0: <filename>      <crc>
//! InstalledSymlink  1: <filename>      <target>
//! BackedUpSymlink   2: <filename>      <target> / <mode> <uid> <gid>
//! BackupSlot(n)     n: <filename>      <crc> <mode> <uid> <gid>
//! ```
//!
//! Lines are raw bytes split on `\n`; there is no escaping, so paths
//! containing a newline are refused at encode time.

use std::ffi::OsStr;
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};

use crate::error::{Result, UndoError};

use super::entry::{EntryTag, Header, LogEntry, LogSession, Ownership};

/// Permission bits kept from a recorded mode
pub const PERM_MASK: u32 = 0o7777;

// =============================================================================
// Encoding
// =============================================================================

/// Encode the two header lines
pub fn encode_header(header: &Header) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(header.version.len() + header.description.len() + 2);
    push_line(&mut out, header.version.as_bytes(), "version")?;
    push_line(&mut out, header.description.as_bytes(), "description")?;
    Ok(out)
}

/// Encode one record (header line plus continuation lines)
pub fn encode_entry(entry: &LogEntry) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    let name = entry.filename.as_os_str().as_bytes();
    check_single_line(name, &entry.filename)?;

    out.extend_from_slice(format!("{}: ", entry.tag.number()).as_bytes());
    out.extend_from_slice(name);
    out.push(b'\n');

    match entry.tag {
        EntryTag::InstalledFile => {
            let crc = required(entry.crc, entry, "crc")?;
            out.extend_from_slice(format!("{}\n", crc).as_bytes());
        }
        EntryTag::InstalledSymlink => {
            push_target(&mut out, entry)?;
        }
        EntryTag::BackedUpSymlink => {
            push_target(&mut out, entry)?;
            let own = required(entry.ownership, entry, "ownership")?;
            out.extend_from_slice(
                format!("{:04o} {} {}\n", own.mode & PERM_MASK, own.uid, own.gid).as_bytes(),
            );
        }
        EntryTag::BackupSlot(_) => {
            let crc = required(entry.crc, entry, "crc")?;
            let own = required(entry.ownership, entry, "ownership")?;
            out.extend_from_slice(
                format!("{} {:04o} {} {}\n", crc, own.mode & PERM_MASK, own.uid, own.gid)
                    .as_bytes(),
            );
        }
    }

    Ok(out)
}

fn push_target(out: &mut Vec<u8>, entry: &LogEntry) -> Result<()> {
    let target = entry.target.as_ref().ok_or_else(|| missing(entry, "target"))?;
    let bytes = target.as_os_str().as_bytes();
    check_single_line(bytes, target)?;
    out.extend_from_slice(bytes);
    out.push(b'\n');
    Ok(())
}

fn push_line(out: &mut Vec<u8>, bytes: &[u8], what: &'static str) -> Result<()> {
    if bytes.contains(&b'\n') {
        return Err(UndoError::Encode(format!("{} must be a single line", what)));
    }
    out.extend_from_slice(bytes);
    out.push(b'\n');
    Ok(())
}

fn check_single_line(bytes: &[u8], path: &Path) -> Result<()> {
    if bytes.contains(&b'\n') {
        return Err(UndoError::io_at(
            "record",
            path,
            std::io::Error::new(std::io::ErrorKind::InvalidInput, "path contains a newline"),
        ));
    }
    Ok(())
}

fn required<T: Copy>(value: Option<T>, entry: &LogEntry, what: &'static str) -> Result<T> {
    value.ok_or_else(|| missing(entry, what))
}

fn missing(entry: &LogEntry, what: &'static str) -> UndoError {
    UndoError::Encode(format!(
        "{:?} entry for '{}' has no {}",
        entry.tag,
        entry.filename.display(),
        what
    ))
}

// =============================================================================
// Decoding
// =============================================================================

/// Bounds-checked line scanner over a loaded log buffer
///
/// Only newline-terminated lines count; an unterminated final line is a
/// parse error.
pub struct LineScanner<'a> {
    buf: &'a [u8],
    pos: usize,
    line: usize,
}

impl<'a> LineScanner<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0, line: 0 }
    }

    /// Next line and its 1-based number
    ///
    /// Every line the writer emits ends in `\n`, so a non-empty remainder
    /// without one is a line cut off by truncation.
    pub fn next_line(&mut self) -> Result<Option<(usize, &'a [u8])>> {
        if self.pos >= self.buf.len() {
            return Ok(None);
        }
        let rest = &self.buf[self.pos..];
        let nl = rest
            .iter()
            .position(|&b| b == b'\n')
            .ok_or_else(|| UndoError::parse(self.line + 1, "line is cut off"))?;
        self.pos += nl + 1;
        self.line += 1;
        Ok(Some((self.line, &rest[..nl])))
    }

    /// Next line, or a parse error naming the line that should follow
    pub fn expect_line(&mut self, what: &str) -> Result<(usize, &'a [u8])> {
        let expected = self.line + 1;
        self.next_line()?
            .ok_or_else(|| UndoError::parse(expected, format!("missing {}", what)))
    }

    /// Fraction of the buffer consumed so far
    pub fn fraction(&self) -> f32 {
        if self.buf.is_empty() {
            1.0
        } else {
            self.pos as f32 / self.buf.len() as f32
        }
    }
}

/// Parse a complete log buffer into a session
///
/// Any malformed record aborts the whole parse; no partial session is
/// ever returned.
pub fn parse_session(buf: &[u8]) -> Result<LogSession> {
    parse_session_with(buf, |_| {})
}

/// Parse a complete log buffer, calling `on_record` with the consumed
/// fraction after each record
pub fn parse_session_with(buf: &[u8], mut on_record: impl FnMut(f32)) -> Result<LogSession> {
    let mut scanner = LineScanner::new(buf);
    let header = parse_header(&mut scanner)?;

    let mut entries = Vec::new();
    while let Some((line_no, line)) = scanner.next_line()? {
        entries.push(parse_record(&mut scanner, line_no, line)?);
        on_record(scanner.fraction());
    }

    Ok(LogSession { header, entries })
}

/// Parse only the version and description lines
pub fn parse_header(scanner: &mut LineScanner<'_>) -> Result<Header> {
    let (_, version) = scanner.expect_line("version line")?;
    let (_, description) = scanner.expect_line("description line")?;
    let version = String::from_utf8_lossy(version).into_owned();
    let description = String::from_utf8_lossy(description).into_owned();
    Ok(Header {
        version,
        description,
    })
}

fn parse_record(scanner: &mut LineScanner<'_>, line_no: usize, line: &[u8]) -> Result<LogEntry> {
    let (number, filename) = parse_first_line(line_no, line)?;
    let tag = EntryTag::from_number(number)
        .ok_or_else(|| UndoError::parse(line_no, format!("unknown record tag {}", number)))?;

    let entry = match tag {
        EntryTag::InstalledFile => {
            let (n, line) = scanner.expect_line("checksum")?;
            let crc = parse_crc(n, line)?;
            LogEntry::installed_file(filename, crc)
        }
        EntryTag::InstalledSymlink => {
            let (_, target) = scanner.expect_line("symlink target")?;
            LogEntry::installed_symlink(filename, path_from(target))
        }
        EntryTag::BackedUpSymlink => {
            let (_, target) = scanner.expect_line("symlink target")?;
            let target = path_from(target);
            let (n, line) = scanner.expect_line("mode, uid and gid")?;
            let ownership = parse_mode_uid_gid(n, line)?;
            LogEntry::backed_up_symlink(filename, target, ownership)
        }
        EntryTag::BackupSlot(slot) => {
            let (n, line) = scanner.expect_line("checksum, mode, uid and gid")?;
            let (crc, ownership) = parse_crc_mode_uid_gid(n, line)?;
            LogEntry::backup_slot(slot, filename, crc, ownership)
        }
    };

    Ok(entry)
}

/// Split `<digits>: <filename>` at the first colon
pub fn parse_first_line(line_no: usize, line: &[u8]) -> Result<(u64, PathBuf)> {
    let colon = line
        .iter()
        .position(|&b| b == b':')
        .ok_or_else(|| UndoError::parse(line_no, "record header has no ':'"))?;

    let digits = &line[..colon];
    if digits.is_empty() || !digits.iter().all(u8::is_ascii_digit) {
        return Err(UndoError::parse(line_no, "record tag is not a number"));
    }
    let number = parse_decimal::<u64>(line_no, digits, "record tag")?;

    let rest = &line[colon + 1..];
    let start = rest
        .iter()
        .position(|b| !is_c_space(*b))
        .unwrap_or(rest.len());

    Ok((number, path_from(&rest[start..])))
}

fn parse_crc(line_no: usize, line: &[u8]) -> Result<u32> {
    let fields = split_fields(line_no, line, 1, "checksum")?;
    parse_decimal(line_no, fields[0], "checksum")
}

fn parse_mode_uid_gid(line_no: usize, line: &[u8]) -> Result<Ownership> {
    let fields = split_fields(line_no, line, 3, "mode, uid and gid")?;
    Ok(Ownership {
        mode: parse_octal(line_no, fields[0])?,
        uid: parse_decimal(line_no, fields[1], "uid")?,
        gid: parse_decimal(line_no, fields[2], "gid")?,
    })
}

fn parse_crc_mode_uid_gid(line_no: usize, line: &[u8]) -> Result<(u32, Ownership)> {
    let fields = split_fields(line_no, line, 4, "checksum, mode, uid and gid")?;
    let crc = parse_decimal(line_no, fields[0], "checksum")?;
    let ownership = Ownership {
        mode: parse_octal(line_no, fields[1])?,
        uid: parse_decimal(line_no, fields[2], "uid")?,
        gid: parse_decimal(line_no, fields[3], "gid")?,
    };
    Ok((crc, ownership))
}

fn split_fields<'a>(
    line_no: usize,
    line: &'a [u8],
    count: usize,
    what: &str,
) -> Result<Vec<&'a [u8]>> {
    let fields: Vec<&[u8]> = line
        .split(|b| is_c_space(*b))
        .filter(|f| !f.is_empty())
        .collect();
    if fields.len() != count {
        return Err(UndoError::parse(
            line_no,
            format!("expected {} ({} fields), found {}", what, count, fields.len()),
        ));
    }
    Ok(fields)
}

fn parse_decimal<T: std::str::FromStr>(line_no: usize, field: &[u8], what: &str) -> Result<T> {
    if field.is_empty() || !field.iter().all(u8::is_ascii_digit) {
        return Err(UndoError::parse(line_no, format!("{} is not a number", what)));
    }
    std::str::from_utf8(field)
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| UndoError::parse(line_no, format!("{} is out of range", what)))
}

fn parse_octal(line_no: usize, field: &[u8]) -> Result<u32> {
    if field.is_empty() || !field.iter().all(|b| (b'0'..=b'7').contains(b)) {
        return Err(UndoError::parse(line_no, "mode is not an octal number"));
    }
    std::str::from_utf8(field)
        .ok()
        .and_then(|s| u32::from_str_radix(s, 8).ok())
        .ok_or_else(|| UndoError::parse(line_no, "mode is out of range"))
}

fn path_from(bytes: &[u8]) -> PathBuf {
    PathBuf::from(OsStr::from_bytes(bytes))
}

/// Whitespace as understood by C `isspace`
fn is_c_space(b: u8) -> bool {
    matches!(b, b' ' | b'\t' | b'\n' | b'\x0b' | b'\x0c' | b'\r')
}
