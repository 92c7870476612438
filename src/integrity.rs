//! Integrity Checker
//!
//! Revalidates recorded entries against the current disk state.
//!
//! Validity is computed in two passes so the outcome does not depend on
//! scan order:
//! 1. every entry is judged on its own
//! 2. backed-up symlinks are invalidated when an installed symlink of the
//!    same name was found pointing somewhere else (restoring over a link
//!    the first pass decided to leave alone would undo that decision)

use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{error, info};

use crate::crc::{Crc32, CrcOracle};
use crate::log::{EntryTag, LogEntry, LogSession};
use crate::progress::{NoProgress, Progress};
use crate::store::BackupStore;

/// Why an entry no longer matches what was recorded
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Mismatch {
    /// The installed path is gone
    Missing,

    /// The path exists but could not be read
    Unreadable { error: String },

    ChecksumChanged { recorded: u32, current: u32 },

    /// An installed symlink was replaced by something else
    NotSymlink,

    TargetChanged { recorded: PathBuf, current: PathBuf },

    SlotMissing { slot: PathBuf },

    SlotChecksumChanged {
        slot: PathBuf,
        recorded: u32,
        current: u32,
    },

    /// Backed-up symlink whose installed replacement changed target
    SuppressedBySymlink,
}

/// One invalid entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Finding {
    /// Position of the entry in the session
    pub index: usize,
    pub filename: PathBuf,
    pub mismatch: Mismatch,
}

/// Outcome of checking a whole session
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IntegrityReport {
    /// Number of entries examined
    pub checked: usize,
    pub findings: Vec<Finding>,
}

impl IntegrityReport {
    /// Logical AND of every entry's validity
    pub fn is_clean(&self) -> bool {
        self.findings.is_empty()
    }
}

/// Compares log entries with the filesystem
pub struct IntegrityChecker<'a, C: CrcOracle = Crc32> {
    store: &'a BackupStore,
    crc: C,
    progress: &'a dyn Progress,
}

impl<'a> IntegrityChecker<'a, Crc32> {
    pub fn new(store: &'a BackupStore) -> Self {
        Self::with_crc(store, Crc32)
    }
}

impl<'a, C: CrcOracle> IntegrityChecker<'a, C> {
    pub fn with_crc(store: &'a BackupStore, crc: C) -> Self {
        Self {
            store,
            crc,
            progress: &NoProgress,
        }
    }

    pub fn with_progress(mut self, progress: &'a dyn Progress) -> Self {
        self.progress = progress;
        self
    }

    /// Judge a single entry in isolation
    pub fn evaluate(&self, entry: &LogEntry) -> Option<Mismatch> {
        match entry.tag {
            EntryTag::InstalledFile => self.evaluate_installed_file(entry),
            EntryTag::InstalledSymlink => evaluate_installed_symlink(entry),
            // The original link was deleted at backup time; nothing to compare
            EntryTag::BackedUpSymlink => None,
            EntryTag::BackupSlot(slot) => self.evaluate_slot(entry, slot),
        }
    }

    /// Mark every entry valid or invalid ahead of an uninstall
    ///
    /// Every entry is evaluated; the report is advisory and only shapes
    /// warning text.
    pub fn check(&self, session: &mut LogSession) -> IntegrityReport {
        self.progress.begin("Validating previous installation");
        let total = session.entries.len().max(1) as f32;

        // Pass 1: per-entry verdicts
        let mut findings = Vec::new();
        let mut retargeted: HashSet<PathBuf> = HashSet::new();
        for (index, entry) in session.entries.iter_mut().enumerate() {
            let verdict = self.evaluate(entry);
            entry.valid = verdict.is_none();

            if let Some(mismatch) = verdict {
                info!(
                    "{}; '{}' will not be uninstalled",
                    describe(&entry.filename, &mismatch),
                    entry.filename.display()
                );
                if matches!(mismatch, Mismatch::TargetChanged { .. }) {
                    retargeted.insert(entry.filename.clone());
                }
                findings.push(Finding {
                    index,
                    filename: entry.filename.clone(),
                    mismatch,
                });
            }
            self.progress
                .update(index as f32 / total, &entry.filename.to_string_lossy());
        }

        // Pass 2: suppress backed-up symlinks shadowed by a retargeted link
        for (index, entry) in session.entries.iter_mut().enumerate() {
            if entry.tag == EntryTag::BackedUpSymlink
                && entry.valid
                && retargeted.contains(&entry.filename)
            {
                entry.valid = false;
                info!(
                    "Backed up symlink '{}' will not be restored",
                    entry.filename.display()
                );
                findings.push(Finding {
                    index,
                    filename: entry.filename.clone(),
                    mismatch: Mismatch::SuppressedBySymlink,
                });
            }
        }
        findings.sort_by_key(|f| f.index);

        self.progress.end("done.");
        IntegrityReport {
            checked: session.entries.len(),
            findings,
        }
    }

    /// Self-consistency check of an installation
    ///
    /// Same per-entry rules as [`check`](Self::check) but nothing is
    /// marked and no suppression is applied; every problem is reported at
    /// error level.
    pub fn verify(&self, session: &LogSession) -> IntegrityReport {
        self.progress.begin("Validating installation");
        let total = session.entries.len().max(1) as f32;

        let mut findings = Vec::new();
        for (index, entry) in session.entries.iter().enumerate() {
            if let Some(mismatch) = self.evaluate(entry) {
                error!("{}", describe(&entry.filename, &mismatch));
                findings.push(Finding {
                    index,
                    filename: entry.filename.clone(),
                    mismatch,
                });
            }
            self.progress
                .update(index as f32 / total, &entry.filename.to_string_lossy());
        }

        self.progress.end("done.");
        IntegrityReport {
            checked: session.entries.len(),
            findings,
        }
    }

    fn evaluate_installed_file(&self, entry: &LogEntry) -> Option<Mismatch> {
        let recorded = entry.crc?;
        if let Err(e) = fs::metadata(&entry.filename) {
            return Some(missing_or_unreadable(e));
        }
        match self.crc.file_crc(&entry.filename) {
            Ok(current) if current == recorded => None,
            Ok(current) => Some(Mismatch::ChecksumChanged { recorded, current }),
            Err(e) => Some(Mismatch::Unreadable {
                error: e.to_string(),
            }),
        }
    }

    fn evaluate_slot(&self, entry: &LogEntry, slot: u64) -> Option<Mismatch> {
        let recorded = entry.crc?;
        let slot_path = self.store.slot_path(slot);
        if fs::metadata(&slot_path).is_err() {
            return Some(Mismatch::SlotMissing { slot: slot_path });
        }
        match self.crc.file_crc(&slot_path) {
            Ok(current) if current == recorded => None,
            Ok(current) => Some(Mismatch::SlotChecksumChanged {
                slot: slot_path,
                recorded,
                current,
            }),
            Err(e) => Some(Mismatch::Unreadable {
                error: e.to_string(),
            }),
        }
    }
}

fn evaluate_installed_symlink(entry: &LogEntry) -> Option<Mismatch> {
    // Existence follows the link: a dangling link counts as missing
    if let Err(e) = fs::metadata(&entry.filename) {
        return Some(missing_or_unreadable(e));
    }
    let meta = match fs::symlink_metadata(&entry.filename) {
        Ok(meta) => meta,
        Err(e) => return Some(missing_or_unreadable(e)),
    };
    if !meta.file_type().is_symlink() {
        return Some(Mismatch::NotSymlink);
    }
    match fs::read_link(&entry.filename) {
        Ok(current) if current.as_path() == entry.target_or_empty() => None,
        Ok(current) => Some(Mismatch::TargetChanged {
            recorded: entry.target_or_empty().to_path_buf(),
            current,
        }),
        Err(e) => Some(Mismatch::Unreadable {
            error: e.to_string(),
        }),
    }
}

fn missing_or_unreadable(e: io::Error) -> Mismatch {
    if e.kind() == io::ErrorKind::NotFound {
        Mismatch::Missing
    } else {
        Mismatch::Unreadable {
            error: e.to_string(),
        }
    }
}

/// Human readable description of a finding
pub fn describe(filename: &Path, mismatch: &Mismatch) -> String {
    let name = filename.display();
    match mismatch {
        Mismatch::Missing => format!("The installed file '{}' no longer exists", name),
        Mismatch::Unreadable { error } => format!("Unable to access '{}' ({})", name, error),
        Mismatch::ChecksumChanged { recorded, current } => format!(
            "The installed file '{}' has a different checksum ({}) than when it was installed ({})",
            name, current, recorded
        ),
        Mismatch::NotSymlink => {
            format!("The installed symbolic link '{}' is no longer a symbolic link", name)
        }
        Mismatch::TargetChanged { recorded, current } => format!(
            "The installed symbolic link '{}' has target '{}', but it was installed with target '{}'",
            name,
            current.display(),
            recorded.display()
        ),
        Mismatch::SlotMissing { slot } => format!(
            "The backed up file '{}' (saved as '{}') no longer exists",
            name,
            slot.display()
        ),
        Mismatch::SlotChecksumChanged {
            slot,
            recorded,
            current,
        } => format!(
            "Backed up file '{}' (saved as '{}') has a different checksum ({}) than when it was backed up ({})",
            name,
            slot.display(),
            current,
            recorded
        ),
        Mismatch::SuppressedBySymlink => format!(
            "The symbolic link '{}' was replaced since install; its backup is kept",
            name
        ),
    }
}
