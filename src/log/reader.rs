//! Log Reader
//!
//! Loads a persisted log into an ordered in-memory session.

use std::fs::{self, File};
use std::io::{BufRead, BufReader, Read};

use tracing::{debug, error};

use crate::error::{Result, UndoError};
use crate::progress::{NoProgress, Progress};
use crate::store::BackupStore;

use super::entry::{Header, LogSession};
use super::format::{parse_header, parse_session_with, LineScanner};

/// Reads the log of the generation in a backup store
pub struct LogReader<'a> {
    store: &'a BackupStore,
    progress: &'a dyn Progress,
}

impl<'a> LogReader<'a> {
    pub fn new(store: &'a BackupStore) -> Self {
        Self {
            store,
            progress: &NoProgress,
        }
    }

    /// Report parse progress to `progress`
    pub fn with_progress(mut self, progress: &'a dyn Progress) -> Self {
        self.progress = progress;
        self
    }

    /// Load and fully parse the log
    ///
    /// 1. Root and log must carry their creation modes (else
    ///    [`UndoError::PermissionTamper`])
    /// 2. The whole file is read into an owned buffer
    /// 3. Header, then records until the buffer is exhausted; any
    ///    malformed record fails the whole read
    pub fn open_session(&self) -> Result<LogSession> {
        let root = self.store.root();
        fs::metadata(root).map_err(|e| UndoError::io_at("get properties of", root, e))?;
        self.store.verify_permissions()?;

        let path = self.store.log_path();
        let buf = {
            let mut file =
                File::open(&path).map_err(|e| UndoError::io_at("open backup log file", &path, e))?;
            let mut buf = Vec::new();
            file.read_to_end(&mut buf)
                .map_err(|e| UndoError::io_at("read backup log file", &path, e))?;
            buf
        };

        self.progress.begin("Parsing log file");
        match parse_session_with(&buf, |fraction| self.progress.update(fraction, "")) {
            Ok(session) => {
                self.progress.end("done.");
                debug!(
                    entries = session.entries.len(),
                    bytes = buf.len(),
                    "parsed backup log"
                );
                Ok(session)
            }
            Err(e) => {
                self.progress.end("error.");
                error!(path = %path.display(), "{}", e);
                Err(e)
            }
        }
    }

    /// Read only the version and description lines
    ///
    /// No permission checks and no record parsing: this backs cheap
    /// "what is installed" queries.
    pub fn peek_header(&self) -> Result<Header> {
        let path = self.store.log_path();
        let file =
            File::open(&path).map_err(|e| UndoError::io_at("open backup log file", &path, e))?;
        let mut reader = BufReader::new(file);

        let mut head = Vec::new();
        for _ in 0..2 {
            let n = reader
                .read_until(b'\n', &mut head)
                .map_err(|e| UndoError::io_at("read backup log file", &path, e))?;
            if n == 0 {
                break;
            }
        }

        parse_header(&mut LineScanner::new(&head))
    }
}
