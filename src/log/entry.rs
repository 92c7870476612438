//! Log entry definitions
//!
//! Defines the recorded filesystem events and the in-memory session.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Tag number of an installed regular file
pub const INSTALLED_FILE: u64 = 0;

/// Tag number of an installed symlink
pub const INSTALLED_SYMLINK: u64 = 1;

/// Tag number of a symlink that was removed and recorded
pub const BACKED_UP_SYMLINK: u64 = 2;

/// First backup slot number; tags below this (other than the three
/// above) are never valid.
pub const SLOT_BASE: u64 = 100;

/// Discriminant of a log entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntryTag {
    InstalledFile,
    InstalledSymlink,
    BackedUpSymlink,
    /// Regular file moved into the backup root as slot `n`
    BackupSlot(u64),
}

impl EntryTag {
    /// Numeric tag as written on the record header line
    pub fn number(self) -> u64 {
        match self {
            EntryTag::InstalledFile => INSTALLED_FILE,
            EntryTag::InstalledSymlink => INSTALLED_SYMLINK,
            EntryTag::BackedUpSymlink => BACKED_UP_SYMLINK,
            EntryTag::BackupSlot(n) => n,
        }
    }

    /// Map a header number back to a tag
    ///
    /// Returns `None` for the reserved gap between the fixed tags and
    /// [`SLOT_BASE`].
    pub fn from_number(n: u64) -> Option<Self> {
        match n {
            INSTALLED_FILE => Some(EntryTag::InstalledFile),
            INSTALLED_SYMLINK => Some(EntryTag::InstalledSymlink),
            BACKED_UP_SYMLINK => Some(EntryTag::BackedUpSymlink),
            n if n >= SLOT_BASE => Some(EntryTag::BackupSlot(n)),
            _ => None,
        }
    }

    /// True for entries removed by the removal pass
    pub fn is_installed(self) -> bool {
        matches!(self, EntryTag::InstalledFile | EntryTag::InstalledSymlink)
    }
}

/// Recorded permission bits and ownership
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ownership {
    pub mode: u32,
    pub uid: u32,
    pub gid: u32,
}

/// One recorded filesystem event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub tag: EntryTag,

    /// Original location the entry concerns
    pub filename: PathBuf,

    /// Symlink destination (InstalledSymlink, BackedUpSymlink)
    pub target: Option<PathBuf>,

    /// Checksum (InstalledFile, BackupSlot)
    pub crc: Option<u32>,

    /// Prior mode/uid/gid (BackedUpSymlink, BackupSlot)
    pub ownership: Option<Ownership>,

    /// Integrity verdict; invalid entries are skipped by both passes
    #[serde(default = "default_valid")]
    pub valid: bool,
}

fn default_valid() -> bool {
    true
}

impl LogEntry {
    pub fn installed_file(filename: impl Into<PathBuf>, crc: u32) -> Self {
        Self {
            tag: EntryTag::InstalledFile,
            filename: filename.into(),
            target: None,
            crc: Some(crc),
            ownership: None,
            valid: true,
        }
    }

    pub fn installed_symlink(filename: impl Into<PathBuf>, target: impl Into<PathBuf>) -> Self {
        Self {
            tag: EntryTag::InstalledSymlink,
            filename: filename.into(),
            target: Some(target.into()),
            crc: None,
            ownership: None,
            valid: true,
        }
    }

    pub fn backed_up_symlink(
        filename: impl Into<PathBuf>,
        target: impl Into<PathBuf>,
        ownership: Ownership,
    ) -> Self {
        Self {
            tag: EntryTag::BackedUpSymlink,
            filename: filename.into(),
            target: Some(target.into()),
            crc: None,
            ownership: Some(ownership),
            valid: true,
        }
    }

    pub fn backup_slot(
        slot: u64,
        filename: impl Into<PathBuf>,
        crc: u32,
        ownership: Ownership,
    ) -> Self {
        Self {
            tag: EntryTag::BackupSlot(slot),
            filename: filename.into(),
            target: None,
            crc: Some(crc),
            ownership: Some(ownership),
            valid: true,
        }
    }

    /// Recorded symlink target, or an empty path for entries without one
    pub fn target_or_empty(&self) -> &Path {
        self.target.as_deref().unwrap_or_else(|| Path::new(""))
    }
}

/// Header lines written once at session start
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    /// Raw version line (see [`crate::log::LegacyVersionCodec`])
    pub version: String,
    pub description: String,
}

/// One parsed generation of the log
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogSession {
    pub header: Header,

    /// Chronological install order; order matters to both passes
    pub entries: Vec<LogEntry>,
}

impl LogSession {
    /// True if any entry is an installed file at exactly `path`
    pub fn records_installed_file(&self, path: &Path) -> bool {
        self.entries
            .iter()
            .any(|e| e.tag == EntryTag::InstalledFile && e.filename == path)
    }

    /// Number of entries currently marked valid
    pub fn valid_count(&self) -> usize {
        self.entries.iter().filter(|e| e.valid).count()
    }
}
