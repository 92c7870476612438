//! Engine Module
//!
//! Facade the surrounding installer talks to.
//!
//! ## Responsibilities
//! - Start a new generation and record install-time mutations
//! - Report what is currently installed
//! - Run a full uninstall or a self-consistency check
//!
//! ## Concurrency Model
//!
//! All calls on one `Engine` are serialized by `op_lock`. The backup root
//! is a singleton on disk, so callers in different processes must still
//! serialize install and uninstall runs themselves.

use std::path::Path;

use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::Result;
use crate::integrity::{IntegrityChecker, IntegrityReport};
use crate::log::{LegacyVersionCodec, LogEntry, LogReader, LogWriter};
use crate::progress::{Progress, TracingProgress};
use crate::store::BackupStore;
use crate::system::{HostSystem, SystemIntegration};
use crate::uninstall::{UninstallEngine, UninstallOptions, UninstallOutcome};

/// Version and description of the recorded installation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstalledPackage {
    pub version: String,
    pub description: String,
}

/// The install/uninstall engine
pub struct Engine {
    config: Config,
    store: BackupStore,
    system: Box<dyn SystemIntegration + Send + Sync>,
    progress: Box<dyn Progress + Send + Sync>,

    /// Live writer for the generation being recorded by this process
    writer: Mutex<Option<LogWriter>>,

    /// Serializes every operation
    op_lock: Mutex<()>,
}

impl Engine {
    /// Create an engine using the host system and tracing progress
    ///
    /// Nothing is touched on disk until an operation is called.
    pub fn open(config: Config) -> Self {
        let system = HostSystem::from_config(&config);
        Self::with_collaborators(config, Box::new(system), Box::new(TracingProgress))
    }

    /// Create an engine with explicit collaborators
    pub fn with_collaborators(
        config: Config,
        system: Box<dyn SystemIntegration + Send + Sync>,
        progress: Box<dyn Progress + Send + Sync>,
    ) -> Self {
        let store = BackupStore::new(&config.backup_root);
        Self {
            config,
            store,
            system,
            progress,
            writer: Mutex::new(None),
            op_lock: Mutex::new(()),
        }
    }

    // =========================================================================
    // Install Side
    // =========================================================================

    /// Start a new generation, destroying the previous backup
    pub fn begin_install(&self, version: &str, description: &str) -> Result<()> {
        let _guard = self.op_lock.lock();
        let writer = LogWriter::init(self.store.clone(), version, description)?;
        *self.writer.lock() = Some(writer);
        Ok(())
    }

    /// Move `path` out of the way before it is overwritten
    ///
    /// Returns the recorded entry, or `None` if nothing was there.
    pub fn backup_file(&self, path: &Path) -> Result<Option<LogEntry>> {
        self.with_writer(|w| w.backup_file(path))
    }

    /// Record a freshly installed regular file
    pub fn log_installed_file(&self, path: &Path) -> Result<LogEntry> {
        self.with_writer(|w| w.log_installed_file(path))
    }

    /// Record a freshly created symlink
    pub fn log_installed_symlink(&self, path: &Path, target: &Path) -> Result<LogEntry> {
        self.with_writer(|w| w.log_installed_symlink(path, target))
    }

    /// Record directories created during install
    pub fn log_created_directories<P: AsRef<Path>>(&self, paths: &[P]) -> Result<()> {
        self.with_writer(|w| w.log_created_directories(paths))
    }

    /// Run `f` on the live writer, resuming it from disk if needed
    fn with_writer<T>(&self, f: impl FnOnce(&mut LogWriter) -> Result<T>) -> Result<T> {
        let _guard = self.op_lock.lock();
        let mut slot = self.writer.lock();
        match &mut *slot {
            Some(writer) => f(writer),
            None => {
                let mut writer = LogWriter::resume(self.store.clone())?;
                let result = f(&mut writer);
                *slot = Some(writer);
                result
            }
        }
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Version and description of the current installation, if any
    ///
    /// Reads only the log header. A missing log, or a version line from
    /// an older writer, means nothing is installed.
    pub fn installed(&self) -> Result<Option<InstalledPackage>> {
        let _guard = self.op_lock.lock();
        self.installed_locked()
    }

    fn installed_locked(&self) -> Result<Option<InstalledPackage>> {
        let header = match LogReader::new(&self.store).peek_header() {
            Ok(header) => header,
            Err(e) if e.is_not_found() => return Ok(None),
            Err(e) => {
                debug!("unreadable log header: {}", e);
                return Ok(None);
            }
        };

        match LegacyVersionCodec::decode(&header.version) {
            Ok(version) => Ok(Some(InstalledPackage {
                version,
                description: header.description,
            })),
            Err(e) => {
                warn!("{}", e);
                Ok(None)
            }
        }
    }

    /// True if `path` is recorded as an installed file
    pub fn is_installed_file(&self, path: &Path) -> Result<bool> {
        let _guard = self.op_lock.lock();
        let session = LogReader::new(&self.store).open_session()?;
        Ok(session.records_installed_file(path))
    }

    /// Check every entry of the current installation against disk
    pub fn verify(&self) -> Result<IntegrityReport> {
        let _guard = self.op_lock.lock();
        let session = LogReader::new(&self.store)
            .with_progress(self.progress.as_ref())
            .open_session()?;
        let report = IntegrityChecker::new(&self.store)
            .with_progress(self.progress.as_ref())
            .verify(&session);
        if report.is_clean() {
            info!(entries = report.checked, "installation is consistent");
        }
        Ok(report)
    }

    // =========================================================================
    // Uninstall
    // =========================================================================

    /// Uninstall the current installation
    ///
    /// With nothing recorded this reports
    /// [`UninstallOutcome::NothingInstalled`] rather than failing, so it is
    /// safe to call twice in a row.
    pub fn uninstall(&self, options: UninstallOptions) -> Result<UninstallOutcome> {
        let _guard = self.op_lock.lock();

        let Some(installed) = self.installed_locked()? else {
            info!("There is no installation currently recorded.");
            return Ok(UninstallOutcome::NothingInstalled);
        };

        info!(
            "Uninstalling {} ({})",
            installed.description, installed.version
        );
        let outcome = UninstallEngine::new(&self.config, &self.store, self.system.as_ref())
            .with_progress(self.progress.as_ref())
            .run(&installed.version, options)?;

        // The generation is gone; a stale writer must not append to it
        *self.writer.lock() = None;

        if let UninstallOutcome::Completed(report) = &outcome {
            info!(
                removed = report.removal.completed,
                restored = report.restoration.completed,
                clean = report.is_clean(),
                "Uninstallation of {} ({}) is complete.",
                installed.description,
                installed.version
            );
        }
        Ok(outcome)
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &BackupStore {
        &self.store
    }
}
