//! System integration
//!
//! Everything the uninstall needs from the host OS beyond plain file
//! operations: hooks, DKMS, kernel modules and cache rebuilds. The
//! uninstall engine only talks to [`SystemIntegration`]; [`HostSystem`]
//! is the process-spawning implementation.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::{debug, info};

use crate::config::Config;
use crate::error::{Result, UndoError};

/// Hook invoked around an uninstall
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookPhase {
    PreUninstall,
    PostUninstall,
}

impl HookPhase {
    /// Executable name looked up in the hook directory
    pub fn name(self) -> &'static str {
        match self {
            HookPhase::PreUninstall => "pre-uninstall",
            HookPhase::PostUninstall => "post-uninstall",
        }
    }
}

impl fmt::Display for HookPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Captured result of an external command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub status: Option<i32>,
    pub output: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.status == Some(0)
    }
}

/// Host operations the uninstall delegates
pub trait SystemIntegration {
    /// Run the hook for `phase` if one is installed
    fn run_hook(&self, phase: HookPhase) -> Result<()>;

    /// True if a DKMS module is registered for `version`
    fn dkms_module_installed(&self, version: &str) -> bool;

    fn remove_dkms_module(&self, version: &str) -> Result<()>;

    fn kernel_module_loaded(&self, name: &str) -> bool;

    fn unload_kernel_module(&self, name: &str) -> Result<()>;

    /// Regenerate kernel module dependency data for `kernel`
    fn rebuild_module_dependencies(&self, kernel: &str) -> Result<CommandOutput>;

    /// Regenerate the shared library cache
    fn rebuild_library_cache(&self) -> Result<CommandOutput>;
}

/// [`SystemIntegration`] backed by real processes
#[derive(Debug, Clone)]
pub struct HostSystem {
    hooks_dir: PathBuf,
    depmod: PathBuf,
    ldconfig: PathBuf,
    rmmod: PathBuf,
    dkms: PathBuf,
    dkms_module: String,
}

impl HostSystem {
    pub fn from_config(config: &Config) -> Self {
        Self {
            hooks_dir: config.hooks_dir.clone(),
            depmod: config.depmod.clone(),
            ldconfig: config.ldconfig.clone(),
            rmmod: config.rmmod.clone(),
            dkms: config.dkms.clone(),
            dkms_module: config.dkms_module.clone(),
        }
    }
}

impl SystemIntegration for HostSystem {
    fn run_hook(&self, phase: HookPhase) -> Result<()> {
        let hook = self.hooks_dir.join(phase.name());
        if !hook.is_file() {
            debug!(hook = %hook.display(), "no hook installed");
            return Ok(());
        }
        let out = run(Command::new(&hook), &hook)?;
        info!(hook = %phase, status = ?out.status, "ran hook");
        Ok(())
    }

    fn dkms_module_installed(&self, version: &str) -> bool {
        if self.dkms_module.is_empty() {
            return false;
        }
        let mut cmd = Command::new(&self.dkms);
        cmd.args(["status", "-m", self.dkms_module.as_str(), "-v", version]);
        match run(cmd, &self.dkms) {
            Ok(out) => out.success() && !out.output.trim().is_empty(),
            Err(_) => false,
        }
    }

    fn remove_dkms_module(&self, version: &str) -> Result<()> {
        let mut cmd = Command::new(&self.dkms);
        cmd.args(["remove", "-m", self.dkms_module.as_str(), "-v", version, "--all"]);
        check(run(cmd, &self.dkms)?, &self.dkms)
    }

    fn kernel_module_loaded(&self, name: &str) -> bool {
        let Ok(modules) = fs::read_to_string("/proc/modules") else {
            return false;
        };
        modules
            .lines()
            .filter_map(|line| line.split_whitespace().next())
            .any(|loaded| loaded == name)
    }

    fn unload_kernel_module(&self, name: &str) -> Result<()> {
        let mut cmd = Command::new(&self.rmmod);
        cmd.arg(name);
        check(run(cmd, &self.rmmod)?, &self.rmmod)
    }

    fn rebuild_module_dependencies(&self, kernel: &str) -> Result<CommandOutput> {
        let mut cmd = Command::new(&self.depmod);
        cmd.arg("-a");
        if !kernel.is_empty() {
            cmd.arg(kernel);
        }
        run(cmd, &self.depmod)
    }

    fn rebuild_library_cache(&self) -> Result<CommandOutput> {
        run(Command::new(&self.ldconfig), &self.ldconfig)
    }
}

/// Spawn `cmd`, capturing stdout and stderr together
fn run(mut cmd: Command, program: &Path) -> Result<CommandOutput> {
    debug!(command = ?cmd, "running");
    let out = cmd
        .output()
        .map_err(|e| UndoError::io_at("run", program, e))?;

    let mut output = String::from_utf8_lossy(&out.stdout).into_owned();
    output.push_str(&String::from_utf8_lossy(&out.stderr));
    Ok(CommandOutput {
        status: out.status.code(),
        output,
    })
}

fn check(out: CommandOutput, program: &Path) -> Result<()> {
    if out.success() {
        return Ok(());
    }
    Err(UndoError::io_at(
        "run",
        program,
        std::io::Error::new(
            std::io::ErrorKind::Other,
            format!("exit status {:?}: {}", out.status, out.output.trim()),
        ),
    ))
}
