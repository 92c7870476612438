//! Directory Janitor
//!
//! Removes directories created during install, deepest first, using the
//! flat mkdir log. Non-empty directories are expected and tolerated.

use std::collections::HashSet;
use std::ffi::OsStr;
use std::fs;
use std::io;
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::DirectoryOrder;
use crate::error::{Result, UndoError};
use crate::store::BackupStore;

/// Outcome of a directory cleanup
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct JanitorReport {
    /// False when the session predates the mkdir log
    pub log_found: bool,
    pub removed: Vec<PathBuf>,
    pub failed: Vec<(PathBuf, String)>,
}

pub struct DirectoryJanitor<'a> {
    store: &'a BackupStore,
    order: DirectoryOrder,
}

impl<'a> DirectoryJanitor<'a> {
    pub fn new(store: &'a BackupStore, order: DirectoryOrder) -> Self {
        Self { store, order }
    }

    /// rmdir every logged directory except the backup root itself
    ///
    /// Only a failure to read the mkdir log is an error; individual
    /// `rmdir` failures land in the report.
    pub fn run(&self) -> Result<JanitorReport> {
        let path = self.store.mkdir_log_path();
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("no mkdir log; nothing to clean up");
                return Ok(JanitorReport::default());
            }
            Err(e) => return Err(UndoError::io_at("read mkdir log file", &path, e)),
        };

        let lines = bytes
            .split(|&b| b == b'\n')
            .map(|line| PathBuf::from(OsStr::from_bytes(line)));

        let mut report = JanitorReport {
            log_found: true,
            ..Default::default()
        };

        for dir in order_directories(lines, self.order) {
            if dir.as_path() == self.store.root() {
                continue;
            }
            match fs::remove_dir(&dir) {
                Ok(()) => {
                    debug!(dir = %dir.display(), "removed directory");
                    report.removed.push(dir);
                }
                Err(e) => {
                    info!("Failed to delete the directory '{}' ({})", dir.display(), e);
                    report.failed.push((dir, e.to_string()));
                }
            }
        }

        if !report.failed.is_empty() {
            warn!("Failed to delete some directories created during installation");
        }
        Ok(report)
    }
}

/// Distinct, non-empty paths in removal order
///
/// Both orders use a stable sort, so ties keep their first-seen order.
/// [`DirectoryOrder::LegacyLength`] compares string lengths only and can
/// interleave unrelated trees; [`DirectoryOrder::PathDepth`] counts
/// components.
pub fn order_directories<I>(paths: I, order: DirectoryOrder) -> Vec<PathBuf>
where
    I: IntoIterator<Item = PathBuf>,
{
    let mut seen = HashSet::new();
    let mut dirs: Vec<PathBuf> = paths
        .into_iter()
        .filter(|p| !p.as_os_str().is_empty())
        .filter(|p| seen.insert(p.clone()))
        .collect();

    match order {
        DirectoryOrder::LegacyLength => {
            dirs.sort_by_key(|p| std::cmp::Reverse(p.as_os_str().len()))
        }
        DirectoryOrder::PathDepth => dirs.sort_by_key(|p| std::cmp::Reverse(depth(p))),
    }
    dirs
}

fn depth(path: &Path) -> usize {
    path.components().count()
}
