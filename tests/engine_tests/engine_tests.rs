//! Tests for Engine
//!
//! These tests verify:
//! - Install-side recording through the facade
//! - Installed package queries (info, find)
//! - verify() on clean and altered installations
//! - Uninstall, including a second uninstall in a row
//! - Writer resume across engine instances

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use tempfile::TempDir;
use undolog::progress::NoProgress;
use undolog::system::{CommandOutput, HookPhase, SystemIntegration};
use undolog::uninstall::{UninstallOptions, UninstallOutcome};
use undolog::{Config, Engine, InstalledPackage};

// =============================================================================
// Helper Functions
// =============================================================================

/// System double that only records hook invocations
#[derive(Clone, Default)]
struct HookRecorder {
    hooks: Arc<Mutex<Vec<HookPhase>>>,
}

impl SystemIntegration for HookRecorder {
    fn run_hook(&self, phase: HookPhase) -> undolog::Result<()> {
        self.hooks.lock().push(phase);
        Ok(())
    }

    fn dkms_module_installed(&self, _version: &str) -> bool {
        false
    }

    fn remove_dkms_module(&self, _version: &str) -> undolog::Result<()> {
        Ok(())
    }

    fn kernel_module_loaded(&self, _name: &str) -> bool {
        false
    }

    fn unload_kernel_module(&self, _name: &str) -> undolog::Result<()> {
        Ok(())
    }

    fn rebuild_module_dependencies(&self, _kernel: &str) -> undolog::Result<CommandOutput> {
        Ok(CommandOutput {
            status: Some(0),
            output: String::new(),
        })
    }

    fn rebuild_library_cache(&self) -> undolog::Result<CommandOutput> {
        Ok(CommandOutput {
            status: Some(0),
            output: String::new(),
        })
    }
}

fn setup_engine() -> (TempDir, Engine, HookRecorder, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let (engine, recorder) = open_engine(temp_dir.path());
    let tree = temp_dir.path().join("tree");
    fs::create_dir(&tree).unwrap();
    (temp_dir, engine, recorder, tree)
}

fn open_engine(dir: &Path) -> (Engine, HookRecorder) {
    let config = Config::builder().backup_root(dir.join("backup")).build();
    let recorder = HookRecorder::default();
    let engine = Engine::with_collaborators(
        config,
        Box::new(recorder.clone()),
        Box::new(NoProgress),
    );
    (engine, recorder)
}

// =============================================================================
// Query Tests
// =============================================================================

#[test]
fn test_nothing_installed_initially() {
    let (_temp, engine, _hooks, _tree) = setup_engine();
    assert_eq!(engine.installed().unwrap(), None);
}

#[test]
fn test_installed_reports_version_and_description() {
    let (_temp, engine, _hooks, _tree) = setup_engine();

    engine.begin_install("470.63.01", "Sample Driver").unwrap();

    assert_eq!(
        engine.installed().unwrap(),
        Some(InstalledPackage {
            version: "470.63.01".to_string(),
            description: "Sample Driver".to_string(),
        })
    );
}

#[test]
fn test_old_style_version_line_means_nothing_installed() {
    let (_temp, engine, _hooks, _tree) = setup_engine();
    engine.begin_install("1.0", "d").unwrap();
    let log = engine.store().log_path();
    fs::write(&log, b"1.0\nold writer\n").unwrap();
    fs::set_permissions(&log, fs::Permissions::from_mode(0o600)).unwrap();

    assert_eq!(engine.installed().unwrap(), None);
}

#[test]
fn test_is_installed_file() {
    let (_temp, engine, _hooks, tree) = setup_engine();
    let lib = tree.join("lib.so");
    fs::write(&lib, b"lib").unwrap();

    engine.begin_install("1.0", "d").unwrap();
    engine.log_installed_file(&lib).unwrap();

    assert!(engine.is_installed_file(&lib).unwrap());
    assert!(!engine.is_installed_file(&tree.join("other.so")).unwrap());
}

#[test]
fn test_verify_clean_and_altered() {
    let (_temp, engine, _hooks, tree) = setup_engine();
    let lib = tree.join("lib.so");
    fs::write(&lib, b"lib").unwrap();
    engine.begin_install("1.0", "d").unwrap();
    engine.log_installed_file(&lib).unwrap();

    assert!(engine.verify().unwrap().is_clean());

    fs::write(&lib, b"changed").unwrap();
    let report = engine.verify().unwrap();
    assert_eq!(report.findings.len(), 1);
    assert_eq!(report.findings[0].filename, lib);
}

// =============================================================================
// Install/Uninstall Tests
// =============================================================================

#[test]
fn test_install_then_uninstall_restores_tree() {
    let (_temp, engine, hooks, tree) = setup_engine();
    let conf = tree.join("sample.conf");
    fs::write(&conf, b"original").unwrap();
    let dir = tree.join("newdir");

    engine.begin_install("2.0", "Sample").unwrap();
    engine.backup_file(&conf).unwrap();
    fs::write(&conf, b"installed").unwrap();
    engine.log_installed_file(&conf).unwrap();
    fs::create_dir(&dir).unwrap();
    engine.log_created_directories(&[&dir]).unwrap();

    let outcome = engine.uninstall(UninstallOptions::default()).unwrap();

    let UninstallOutcome::Completed(report) = outcome else {
        panic!("expected a completed uninstall");
    };
    assert!(report.is_clean());
    assert_eq!(report.directories.removed, vec![dir.clone()]);
    assert_eq!(fs::read(&conf).unwrap(), b"original");
    assert!(!dir.exists());
    assert!(!engine.store().exists());
    assert_eq!(
        *hooks.hooks.lock(),
        vec![HookPhase::PreUninstall, HookPhase::PostUninstall]
    );
}

#[test]
fn test_second_uninstall_is_nothing_installed() {
    let (_temp, engine, hooks, _tree) = setup_engine();
    engine.begin_install("1.0", "d").unwrap();

    engine.uninstall(UninstallOptions::default()).unwrap();
    let outcome = engine.uninstall(UninstallOptions::default()).unwrap();

    assert_eq!(outcome, UninstallOutcome::NothingInstalled);
    assert_eq!(hooks.hooks.lock().len(), 2);
}

#[test]
fn test_recording_after_uninstall_fails() {
    let (_temp, engine, _hooks, tree) = setup_engine();
    let lib = tree.join("lib.so");
    fs::write(&lib, b"lib").unwrap();
    engine.begin_install("1.0", "d").unwrap();
    engine.uninstall(UninstallOptions::default()).unwrap();

    assert!(engine.log_installed_file(&lib).is_err());
}

#[test]
fn test_new_engine_resumes_generation() {
    let temp = TempDir::new().unwrap();
    let tree = temp.path().join("tree");
    fs::create_dir(&tree).unwrap();
    for name in ["a", "b"] {
        fs::write(tree.join(name), name).unwrap();
    }

    let (first, _) = open_engine(temp.path());
    first.begin_install("1.0", "d").unwrap();
    first.backup_file(&tree.join("a")).unwrap();
    drop(first);

    let (second, _) = open_engine(temp.path());
    let entry = second.backup_file(&tree.join("b")).unwrap().unwrap();

    assert_eq!(entry.tag.number(), 101);
    assert!(second.store().slot_path(100).exists());
    assert!(second.store().slot_path(101).exists());
}

#[test]
fn test_begin_install_replaces_generation() {
    let (_temp, engine, _hooks, tree) = setup_engine();
    let a = tree.join("a");
    fs::write(&a, b"a").unwrap();
    engine.begin_install("1.0", "first").unwrap();
    engine.backup_file(&a).unwrap();

    engine.begin_install("2.0", "second").unwrap();

    assert!(!engine.store().slot_path(100).exists());
    assert_eq!(engine.installed().unwrap().unwrap().version, "2.0");
}
