//! Backup Store
//!
//! Owns the backup root and its numbered slots.
//!
//! ## Responsibilities
//! - Recreate the root with restrictive permissions for a new generation
//! - Move displaced regular files into slots and back out again
//! - Discover existing slots on resume
//! - Detect permission tampering before the log is trusted

use std::fs::{self, File, OpenOptions};
use std::io;
use std::os::unix::fs::{DirBuilderExt, OpenOptionsExt, PermissionsExt};
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::{Result, UndoError};
use crate::log::SLOT_BASE;

/// Mode of the backup root: owner read/write/execute only
pub const ROOT_MODE: u32 = 0o700;

/// Mode of the log file: owner read/write only
pub const LOG_MODE: u32 = 0o600;

/// Bits compared by the tamper check
const PERM_MASK: u32 = 0o7777;

/// Numbered-slot storage inside a fixed root directory
#[derive(Debug, Clone)]
pub struct BackupStore {
    root: PathBuf,
}

impl BackupStore {
    // =========================================================================
    // Internal Path Constants
    // =========================================================================
    pub const LOG_FILENAME: &'static str = "log";
    pub const MKDIR_LOG_FILENAME: &'static str = "dirs";

    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn log_path(&self) -> PathBuf {
        self.root.join(Self::LOG_FILENAME)
    }

    pub fn mkdir_log_path(&self) -> PathBuf {
        self.root.join(Self::MKDIR_LOG_FILENAME)
    }

    /// Path of slot `n` inside the root
    pub fn slot_path(&self, slot: u64) -> PathBuf {
        self.root.join(slot.to_string())
    }

    /// True if the root directory is present
    pub fn exists(&self) -> bool {
        self.root.is_dir()
    }

    // =========================================================================
    // Generation Lifecycle
    // =========================================================================

    /// Wipe any prior generation and create an empty root (mode 0700)
    pub fn recreate(&self) -> Result<()> {
        if fs::symlink_metadata(&self.root).is_ok() {
            debug!(root = %self.root.display(), "removing previous backup generation");
            fs::remove_dir_all(&self.root)
                .map_err(|e| UndoError::io_at("remove directory", &self.root, e))?;
        }
        self.create_root()
    }

    /// Create the root if it is missing, leaving an existing one alone
    pub fn ensure_root(&self) -> Result<()> {
        if self.exists() {
            return Ok(());
        }
        self.create_root()
    }

    fn create_root(&self) -> Result<()> {
        fs::DirBuilder::new()
            .recursive(true)
            .mode(ROOT_MODE)
            .create(&self.root)
            .map_err(|e| UndoError::io_at("create directory", &self.root, e))?;

        // DirBuilder's mode is filtered through the umask
        fs::set_permissions(&self.root, fs::Permissions::from_mode(ROOT_MODE))
            .map_err(|e| UndoError::io_at("set permissions on", &self.root, e))?;
        Ok(())
    }

    /// Create (truncating) the log file with mode 0600
    pub fn create_log(&self) -> Result<File> {
        let path = self.log_path();
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .mode(LOG_MODE)
            .open(&path)
            .map_err(|e| UndoError::io_at("create backup log file", &path, e))?;
        file.set_permissions(fs::Permissions::from_mode(LOG_MODE))
            .map_err(|e| UndoError::io_at("set permissions on", &path, e))?;
        Ok(file)
    }

    /// Open the log for appending; it must already exist
    pub fn open_log_append(&self) -> Result<File> {
        let path = self.log_path();
        OpenOptions::new()
            .append(true)
            .open(&path)
            .map_err(|e| UndoError::io_at("open backup log file", &path, e))
    }

    /// Open the mkdir log for appending, creating root and file lazily
    pub fn open_mkdir_log_append(&self) -> Result<File> {
        self.ensure_root()?;
        let path = self.mkdir_log_path();
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| UndoError::io_at("open mkdir log file", &path, e))
    }

    /// Remove the whole root
    pub fn remove(&self) -> Result<()> {
        fs::remove_dir_all(&self.root)
            .map_err(|e| UndoError::io_at("remove directory", &self.root, e))
    }

    // =========================================================================
    // Tamper Detection
    // =========================================================================

    /// Check the root and log file still carry the modes they were created with
    pub fn verify_permissions(&self) -> Result<()> {
        check_mode(&self.root, ROOT_MODE)?;
        check_mode(&self.log_path(), LOG_MODE)
    }

    // =========================================================================
    // Slots
    // =========================================================================

    /// Move `source` into slot `slot`
    pub fn stash(&self, source: &Path, slot: u64) -> Result<PathBuf> {
        let dest = self.slot_path(slot);
        move_file(source, &dest).map_err(|e| UndoError::io_at("backup file", source, e))?;
        Ok(dest)
    }

    /// Move slot `slot` back to `dest`, consuming the slot file
    pub fn restore(&self, slot: u64, dest: &Path) -> Result<()> {
        let source = self.slot_path(slot);
        move_file(&source, dest).map_err(|e| UndoError::io_at("restore file", dest, e))
    }

    /// Slot numbers physically present in the root, ascending
    pub fn discover_slots(&self) -> Result<Vec<u64>> {
        let mut slots = Vec::new();
        let dir = match fs::read_dir(&self.root) {
            Ok(dir) => dir,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(slots),
            Err(e) => return Err(UndoError::io_at("read directory", &self.root, e)),
        };

        for entry in dir {
            let entry = entry?;
            if let Some(slot) = Self::parse_slot(&entry.path()) {
                slots.push(slot);
            }
        }

        slots.sort_unstable();
        Ok(slots)
    }

    /// Next free slot: max existing + 1, or [`SLOT_BASE`] when empty
    pub fn next_free_slot(&self) -> Result<u64> {
        Self::slot_after(self.discover_slots()?.last().copied())
    }

    /// Slot following `highest`, or [`SLOT_BASE`] when nothing is taken
    pub fn slot_after(highest: Option<u64>) -> Result<u64> {
        match highest {
            None => Ok(SLOT_BASE),
            Some(n) => n.checked_add(1).ok_or(UndoError::SlotsExhausted(n)),
        }
    }

    /// "104" → Some(104); anything else (log, dirs) → None
    fn parse_slot(path: &Path) -> Option<u64> {
        let name = path.file_name()?.to_str()?;
        if !name.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        name.parse().ok().filter(|&n| n >= SLOT_BASE)
    }
}

/// Permission bits of `path` (not following symlinks)
pub fn mode_of(path: &Path) -> Result<u32> {
    let meta = fs::symlink_metadata(path).map_err(|e| UndoError::io_at("stat", path, e))?;
    Ok(meta.permissions().mode() & PERM_MASK)
}

fn check_mode(path: &Path, expected: u32) -> Result<()> {
    let actual = mode_of(path)?;
    if actual != expected {
        warn!(path = %path.display(), expected, actual, "permission tampering detected");
        return Err(UndoError::PermissionTamper {
            path: path.to_path_buf(),
            expected,
            actual,
        });
    }
    Ok(())
}

/// Rename `source` to `dest`, copying across filesystems when rename fails
///
/// The copy keeps content and permission bits; the source is unlinked only
/// after the copy succeeds. If the copy also fails the rename error is
/// returned.
pub fn move_file(source: &Path, dest: &Path) -> io::Result<()> {
    let rename_err = match fs::rename(source, dest) {
        Ok(()) => return Ok(()),
        Err(e) => e,
    };

    match fs::symlink_metadata(source) {
        Ok(meta) if meta.is_file() => {}
        _ => return Err(rename_err),
    }

    debug!(
        source = %source.display(),
        dest = %dest.display(),
        error = %rename_err,
        "rename failed, falling back to copy"
    );

    if fs::copy(source, dest).is_err() {
        let _ = fs::remove_file(dest);
        return Err(rename_err);
    }
    fs::remove_file(source)
}
