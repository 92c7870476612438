//! Log Writer
//!
//! Records install-time mutations. Every call opens the log for append,
//! writes one record and closes it again, so a crash between calls
//! always leaves a parseable log.

use std::fs::{self, File};
use std::io::{self, Write};
use std::os::unix::fs::MetadataExt;
use std::path::Path;

use tracing::{debug, info};

use crate::crc::{Crc32, CrcOracle};
use crate::error::{Result, UndoError};
use crate::store::BackupStore;

use super::entry::{EntryTag, Header, LogEntry, Ownership};
use super::format::{encode_entry, encode_header, PERM_MASK};
use super::reader::LogReader;
use super::version::LegacyVersionCodec;

/// Appends records to the current generation's log
pub struct LogWriter<C: CrcOracle = Crc32> {
    store: BackupStore,
    crc: C,

    /// Next backup slot; starts at SLOT_BASE and only grows
    next_slot: u64,
}

impl LogWriter<Crc32> {
    /// Start a new generation (see [`LogWriter::init_with`])
    pub fn init(store: BackupStore, version: &str, description: &str) -> Result<Self> {
        Self::init_with(store, Crc32, version, description)
    }

    /// Continue the generation already on disk
    pub fn resume(store: BackupStore) -> Result<Self> {
        Self::resume_with(store, Crc32)
    }
}

impl<C: CrcOracle> LogWriter<C> {
    /// Start a new generation
    ///
    /// 1. Delete any existing backup root
    /// 2. Recreate it with mode 0700
    /// 3. Create the log with mode 0600 and write the header
    pub fn init_with(store: BackupStore, crc: C, version: &str, description: &str) -> Result<Self> {
        let header = Header {
            version: LegacyVersionCodec::encode(version),
            description: description.to_string(),
        };
        let bytes = encode_header(&header)?;

        store.recreate()?;
        let file = store.create_log()?;
        write_and_close(file, &bytes, &store.log_path())?;

        info!(
            root = %store.root().display(),
            version,
            "initialized backup log"
        );

        let next_slot = store.next_free_slot()?;
        Ok(Self {
            store,
            crc,
            next_slot,
        })
    }

    /// Continue the generation already on disk
    ///
    /// The slot counter resumes after the highest slot either recorded in
    /// the log or present as a file, so a slot whose file went missing is
    /// never handed out twice.
    pub fn resume_with(store: BackupStore, crc: C) -> Result<Self> {
        let log = store.log_path();
        if !log.is_file() {
            return Err(UndoError::io_at(
                "open backup log file",
                log,
                io::Error::from(io::ErrorKind::NotFound),
            ));
        }

        let session = LogReader::new(&store).open_session()?;
        let logged = session
            .entries
            .iter()
            .filter_map(|e| match e.tag {
                EntryTag::BackupSlot(n) => Some(n),
                _ => None,
            })
            .max();
        let on_disk = store.discover_slots()?.last().copied();
        let next_slot = BackupStore::slot_after(logged.max(on_disk))?;
        debug!(next_slot, "resumed backup log");
        Ok(Self {
            store,
            crc,
            next_slot,
        })
    }

    /// Move `path` out of the way and record how to put it back
    ///
    /// - missing path: no-op, returns `Ok(None)`
    /// - regular file: moved into the next slot with its checksum
    /// - symlink: target recorded, link deleted
    /// - anything else: [`UndoError::UnsupportedFileType`]
    pub fn backup_file(&mut self, path: &Path) -> Result<Option<LogEntry>> {
        let meta = match fs::symlink_metadata(path) {
            Ok(meta) => meta,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(UndoError::io_at("determine properties for", path, e)),
        };

        let ownership = Ownership {
            mode: meta.mode() & PERM_MASK,
            uid: meta.uid(),
            gid: meta.gid(),
        };
        let file_type = meta.file_type();

        let entry = if file_type.is_file() {
            let crc = self.crc.file_crc(path)?;
            let slot = self.next_slot;
            let entry = LogEntry::backup_slot(slot, path, crc, ownership);
            let bytes = encode_entry(&entry)?;

            let following = BackupStore::slot_after(Some(slot))?;

            let mut log = self.store.open_log_append()?;
            self.store.stash(path, slot)?;
            self.next_slot = following;
            append(&mut log, &bytes, &self.store.log_path())?;
            debug!(path = %path.display(), slot, crc, "backed up file");
            entry
        } else if file_type.is_symlink() {
            let target =
                fs::read_link(path).map_err(|e| UndoError::io_at("read symlink", path, e))?;
            let entry = LogEntry::backed_up_symlink(path, target, ownership);
            let bytes = encode_entry(&entry)?;

            let mut log = self.store.open_log_append()?;
            fs::remove_file(path)
                .map_err(|e| UndoError::io_at("remove symbolic link", path, e))?;
            append(&mut log, &bytes, &self.store.log_path())?;
            debug!(path = %path.display(), "backed up symlink");
            entry
        } else if file_type.is_dir() {
            return Err(UndoError::UnsupportedFileType {
                path: path.to_path_buf(),
                kind: "directory",
            });
        } else {
            return Err(UndoError::UnsupportedFileType {
                path: path.to_path_buf(),
                kind: "special file",
            });
        };

        Ok(Some(entry))
    }

    /// Record a freshly installed regular file with its checksum
    pub fn log_installed_file(&mut self, path: &Path) -> Result<LogEntry> {
        let crc = self.crc.file_crc(path)?;
        let entry = LogEntry::installed_file(path, crc);
        self.append_entry(&entry)?;
        Ok(entry)
    }

    /// Record a freshly created symlink
    pub fn log_installed_symlink(&mut self, path: &Path, target: &Path) -> Result<LogEntry> {
        let entry = LogEntry::installed_symlink(path, target);
        self.append_entry(&entry)?;
        Ok(entry)
    }

    /// Append created directories to the mkdir log, one per line
    pub fn log_created_directories<I, P>(&mut self, paths: I) -> Result<()>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        use std::os::unix::ffi::OsStrExt;

        let mut bytes = Vec::new();
        for path in paths {
            let raw = path.as_ref().as_os_str().as_bytes();
            if raw.contains(&b'\n') {
                return Err(UndoError::io_at(
                    "record",
                    path.as_ref(),
                    io::Error::new(io::ErrorKind::InvalidInput, "path contains a newline"),
                ));
            }
            bytes.extend_from_slice(raw);
            bytes.push(b'\n');
        }
        if bytes.is_empty() {
            return Ok(());
        }

        let file = self.store.open_mkdir_log_append()?;
        write_and_close(file, &bytes, &self.store.mkdir_log_path())
    }

    /// Slot number the next backed-up file will get
    pub fn next_slot(&self) -> u64 {
        self.next_slot
    }

    pub fn store(&self) -> &BackupStore {
        &self.store
    }

    fn append_entry(&self, entry: &LogEntry) -> Result<()> {
        let bytes = encode_entry(entry)?;
        let file = self.store.open_log_append()?;
        write_and_close(file, &bytes, &self.store.log_path())
    }
}

fn append(file: &mut File, bytes: &[u8], path: &Path) -> Result<()> {
    file.write_all(bytes)
        .and_then(|_| file.sync_data())
        .map_err(|e| UndoError::io_at("write backup log file", path, e))
}

/// Write, flush to disk and drop the handle
fn write_and_close(mut file: File, bytes: &[u8], path: &Path) -> Result<()> {
    append(&mut file, bytes, path)
}
