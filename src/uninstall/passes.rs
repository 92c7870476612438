//! Uninstall Engine
//!
//! Replays a parsed session backwards onto the filesystem.
//!
//! ## Sequence
//! 1. pre-uninstall hook
//! 2. DKMS module removal (if registered for the version)
//! 3. Pass A: delete installed files and symlinks
//! 4. Pass B: recreate backed-up symlinks, move slots back into place
//! 5. Directory cleanup, then removal of the backup root
//! 6. Kernel module unload, dependency and library cache rebuilds
//! 7. post-uninstall hook
//!
//! Entries marked invalid by the integrity check are skipped in both
//! passes. Per-entry failures are collected, never propagated.

use std::fs;
use std::os::unix::fs::{chown, lchown, symlink, PermissionsExt};
use std::path::PathBuf;

use serde::Serialize;
use tracing::{info, warn};

use crate::config::Config;
use crate::error::Result;
use crate::integrity::{IntegrityChecker, IntegrityReport};
use crate::log::{EntryTag, Header, LogEntry, LogReader, LogSession, PERM_MASK};
use crate::progress::{NoProgress, Progress};
use crate::store::BackupStore;
use crate::system::{HookPhase, SystemIntegration};

use super::janitor::{DirectoryJanitor, JanitorReport};

const ALTERED_INSTALLATION: &str = "The installation has been altered since it was \
    initially installed; this may happen, for example, if the same files were since \
    installed by a different mechanism. The uninstall will proceed as best it can.";

/// Per-call uninstall switches
#[derive(Debug, Clone, Copy, Default)]
pub struct UninstallOptions {
    /// Skip the module dependency rebuild (e.g. a fresh install follows)
    pub skip_depmod: bool,
}

/// A single entry that could not be removed or restored
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntryFailure {
    pub filename: PathBuf,
    pub error: String,
}

/// Result of one pass over the entries
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PassReport {
    /// Entries the pass acted on successfully
    pub completed: usize,
    pub failures: Vec<EntryFailure>,
}

/// Aggregated outcome of a full uninstall
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UninstallReport {
    pub header: Header,
    pub integrity: IntegrityReport,
    pub removal: PassReport,
    pub restoration: PassReport,
    pub directories: JanitorReport,
    pub root_removed: bool,

    /// Non-fatal problems from hooks and system integration steps
    pub system_warnings: Vec<String>,
}

impl UninstallReport {
    /// True when nothing needed a warning
    pub fn is_clean(&self) -> bool {
        self.integrity.is_clean()
            && self.removal.failures.is_empty()
            && self.restoration.failures.is_empty()
            && self.directories.failed.is_empty()
            && self.root_removed
            && self.system_warnings.is_empty()
    }
}

/// What an uninstall call found
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum UninstallOutcome {
    /// No backup root; a previous uninstall already ran or nothing was installed
    NothingInstalled,
    Completed(Box<UninstallReport>),
}

/// Two-pass replay of a session
pub struct UninstallEngine<'a> {
    config: &'a Config,
    store: &'a BackupStore,
    system: &'a dyn SystemIntegration,
    progress: &'a dyn Progress,
}

impl<'a> UninstallEngine<'a> {
    pub fn new(
        config: &'a Config,
        store: &'a BackupStore,
        system: &'a dyn SystemIntegration,
    ) -> Self {
        Self {
            config,
            store,
            system,
            progress: &NoProgress,
        }
    }

    pub fn with_progress(mut self, progress: &'a dyn Progress) -> Self {
        self.progress = progress;
        self
    }

    /// Locate, parse and check the log, then uninstall `version`
    ///
    /// Fails only when the log cannot be trusted (missing, tampered,
    /// malformed); everything after parsing is best effort.
    pub fn run(&self, version: &str, options: UninstallOptions) -> Result<UninstallOutcome> {
        if !self.store.exists() {
            info!("No installation backed up.");
            return Ok(UninstallOutcome::NothingInstalled);
        }

        let mut session = LogReader::new(self.store)
            .with_progress(self.progress)
            .open_session()?;

        let integrity = IntegrityChecker::new(self.store)
            .with_progress(self.progress)
            .check(&mut session);
        if !integrity.is_clean() {
            warn!("{}", ALTERED_INSTALLATION);
        }

        let report = self.execute(&session, integrity, version, options);
        Ok(UninstallOutcome::Completed(Box::new(report)))
    }

    /// Run every uninstall step over an already checked session
    pub fn execute(
        &self,
        session: &LogSession,
        integrity: IntegrityReport,
        version: &str,
        options: UninstallOptions,
    ) -> UninstallReport {
        let mut system_warnings = Vec::new();

        if let Err(e) = self.system.run_hook(HookPhase::PreUninstall) {
            warn!("pre-uninstall hook failed: {}", e);
            system_warnings.push(format!("pre-uninstall hook failed: {}", e));
        }

        self.progress.begin(&format!(
            "Uninstalling {} ({})",
            session.header.description, version
        ));

        if self.system.dkms_module_installed(version) {
            info!("DKMS module detected; removing...");
            if let Err(e) = self.system.remove_dkms_module(version) {
                warn!("Failed to remove installed DKMS module: {}", e);
                system_warnings.push(format!("failed to remove DKMS module: {}", e));
            }
        }

        let removal = self.remove_installed(session);
        let restoration = self.restore_backups(session, integrity.is_clean());

        if !removal.failures.is_empty() {
            warn!("Failed to remove some installed files/symlinks");
        }
        if !restoration.failures.is_empty() {
            warn!("Failed to restore some backed up files/symlinks, and/or their attributes");
        }

        let janitor = DirectoryJanitor::new(self.store, self.config.directory_order);
        let directories = match janitor.run() {
            Ok(report) => report,
            Err(e) => {
                info!("Unable to delete directories created by previous installation: {}", e);
                JanitorReport::default()
            }
        };

        self.progress.end("done.");

        let root_removed = match self.store.remove() {
            Ok(()) => true,
            Err(e) => {
                info!("{}", e);
                false
            }
        };

        self.integrate_system(options, &mut system_warnings);

        if let Err(e) = self.system.run_hook(HookPhase::PostUninstall) {
            warn!("post-uninstall hook failed: {}", e);
            system_warnings.push(format!("post-uninstall hook failed: {}", e));
        }

        UninstallReport {
            header: session.header.clone(),
            integrity,
            removal,
            restoration,
            directories,
            root_removed,
            system_warnings,
        }
    }

    /// Pass A: delete every valid installed file and symlink
    pub fn remove_installed(&self, session: &LogSession) -> PassReport {
        let mut report = PassReport::default();
        let total = (session.entries.len() * 2).max(1) as f32;

        for (i, entry) in session.entries.iter().enumerate() {
            if !entry.valid || !entry.tag.is_installed() {
                continue;
            }
            let what = match entry.tag {
                EntryTag::InstalledSymlink => "symlink",
                _ => "file",
            };
            match fs::remove_file(&entry.filename) {
                Ok(()) => report.completed += 1,
                Err(e) => {
                    info!(
                        "Unable to remove installed {} '{}' ({})",
                        what,
                        entry.filename.display(),
                        e
                    );
                    report.failures.push(failure(entry, e));
                }
            }
            self.progress
                .update(i as f32 / total, &entry.filename.to_string_lossy());
        }

        report
    }

    /// Pass B: put every valid backed-up symlink and file back
    ///
    /// A symlink that cannot be recreated counts as a failure only when
    /// `check_ok`; otherwise the tree is already known to be altered and
    /// the problem is only logged.
    pub fn restore_backups(&self, session: &LogSession, check_ok: bool) -> PassReport {
        let mut report = PassReport::default();
        let n = session.entries.len();
        let total = (n * 2).max(1) as f32;

        for (i, entry) in session.entries.iter().enumerate() {
            if !entry.valid {
                continue;
            }
            let outcome = match entry.tag {
                EntryTag::InstalledFile | EntryTag::InstalledSymlink => continue,
                EntryTag::BackedUpSymlink => self.restore_symlink(entry, check_ok),
                EntryTag::BackupSlot(slot) => self.restore_slot(entry, slot),
            };
            match outcome {
                Ok(()) => report.completed += 1,
                Err(Some(failure)) => report.failures.push(failure),
                Err(None) => {}
            }
            self.progress
                .update((i + n) as f32 / total, &entry.filename.to_string_lossy());
        }

        report
    }

    fn restore_symlink(
        &self,
        entry: &LogEntry,
        check_ok: bool,
    ) -> std::result::Result<(), Option<EntryFailure>> {
        let target = entry.target_or_empty();
        if let Err(e) = symlink(target, &entry.filename) {
            info!(
                "Unable to restore symbolic link {} -> {} ({})",
                entry.filename.display(),
                target.display(),
                e
            );
            return Err(check_ok.then(|| failure(entry, e)));
        }

        // Symlink permission bits are not meaningful; only ownership is restored
        if let Some(own) = entry.ownership {
            if let Err(e) = lchown(&entry.filename, Some(own.uid), Some(own.gid)) {
                info!(
                    "Unable to restore owner ({}) and group ({}) for symbolic link '{}' ({})",
                    own.uid,
                    own.gid,
                    entry.filename.display(),
                    e
                );
                return Err(Some(failure(entry, e)));
            }
        }
        Ok(())
    }

    fn restore_slot(
        &self,
        entry: &LogEntry,
        slot: u64,
    ) -> std::result::Result<(), Option<EntryFailure>> {
        if let Err(e) = self.store.restore(slot, &entry.filename) {
            info!("Unable to restore file '{}': {}", entry.filename.display(), e);
            return Err(Some(failure(entry, e)));
        }

        let Some(own) = entry.ownership else {
            return Ok(());
        };
        if let Err(e) = chown(&entry.filename, Some(own.uid), Some(own.gid)) {
            info!(
                "Unable to restore owner ({}) and group ({}) for file '{}' ({})",
                own.uid,
                own.gid,
                entry.filename.display(),
                e
            );
            return Err(Some(failure(entry, e)));
        }
        let mode = own.mode & PERM_MASK;
        if let Err(e) = fs::set_permissions(&entry.filename, fs::Permissions::from_mode(mode)) {
            info!(
                "Unable to restore permissions {:04o} for file '{}' ({})",
                mode,
                entry.filename.display(),
                e
            );
            return Err(Some(failure(entry, e)));
        }
        Ok(())
    }

    /// Kernel module unload and cache rebuilds; every failure is a warning
    fn integrate_system(&self, options: UninstallOptions, warnings: &mut Vec<String>) {
        if !self.config.skip_module_unload {
            for module in &self.config.kernel_modules {
                if !self.system.kernel_module_loaded(module) {
                    continue;
                }
                if let Err(e) = self.system.unload_kernel_module(module) {
                    info!("Unable to unload kernel module '{}': {}", module, e);
                    warnings.push(format!("failed to unload kernel module '{}'", module));
                }
            }
        }

        if !self.config.rebuild_caches {
            return;
        }

        let mut ok = true;
        if !options.skip_depmod {
            ok &= matches!(
                self.system.rebuild_module_dependencies(&self.config.kernel_name),
                Ok(out) if out.success()
            );
        }
        ok &= matches!(self.system.rebuild_library_cache(), Ok(out) if out.success());

        if !ok {
            warn!(
                "An error occurred while rebuilding module dependencies or the library \
                 cache after uninstallation: your system may have stale state involving \
                 recently uninstalled files."
            );
            warnings.push("module dependency or library cache rebuild failed".to_string());
        }
    }
}

fn failure(entry: &LogEntry, error: impl std::fmt::Display) -> EntryFailure {
    EntryFailure {
        filename: entry.filename.clone(),
        error: error.to_string(),
    }
}
