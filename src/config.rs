//! Configuration for undolog
//!
//! Centralized configuration with sensible defaults.

use std::path::PathBuf;

/// Main configuration for an undolog installation
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Backup Store Configuration
    // -------------------------------------------------------------------------
    /// Singleton directory holding the current generation
    /// Internal structure:
    ///   {backup_root}/
    ///     ├── log          (mutation log, mode 0600)
    ///     ├── dirs         (created directories, one per line)
    ///     └── 100, 101...  (backup slots)
    pub backup_root: PathBuf,

    // -------------------------------------------------------------------------
    // Uninstall Configuration
    // -------------------------------------------------------------------------
    /// Ordering used when removing created directories
    pub directory_order: DirectoryOrder,

    /// Skip unloading kernel modules after uninstall
    pub skip_module_unload: bool,

    /// Kernel modules to unload after uninstall
    pub kernel_modules: Vec<String>,

    /// Run the module dependency and shared library cache rebuilds
    pub rebuild_caches: bool,

    /// Kernel release passed to the module dependency rebuild
    pub kernel_name: String,

    /// Directory searched for `pre-uninstall` / `post-uninstall` hooks
    pub hooks_dir: PathBuf,

    // -------------------------------------------------------------------------
    // External Tools
    // -------------------------------------------------------------------------
    pub depmod: PathBuf,
    pub ldconfig: PathBuf,
    pub rmmod: PathBuf,
    pub dkms: PathBuf,

    /// DKMS module name; empty disables DKMS handling
    pub dkms_module: String,
}

/// Order in which logged directories are removed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirectoryOrder {
    /// Longest path string first (compatible with older uninstallers)
    LegacyLength,

    /// Most path components first
    PathDepth,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backup_root: PathBuf::from("/var/lib/undolog"),
            directory_order: DirectoryOrder::LegacyLength,
            skip_module_unload: false,
            kernel_modules: Vec::new(),
            rebuild_caches: false,
            kernel_name: String::new(),
            hooks_dir: PathBuf::from("/usr/lib/undolog"),
            depmod: PathBuf::from("/sbin/depmod"),
            ldconfig: PathBuf::from("/sbin/ldconfig"),
            rmmod: PathBuf::from("/sbin/rmmod"),
            dkms: PathBuf::from("/usr/sbin/dkms"),
            dkms_module: String::new(),
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the backup root (log, mkdir log and slots live here)
    pub fn backup_root(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.backup_root = path.into();
        self
    }

    /// Set the directory removal order
    pub fn directory_order(mut self, order: DirectoryOrder) -> Self {
        self.config.directory_order = order;
        self
    }

    /// Skip unloading kernel modules after uninstall
    pub fn skip_module_unload(mut self, skip: bool) -> Self {
        self.config.skip_module_unload = skip;
        self
    }

    /// Set the kernel modules unloaded after uninstall
    pub fn kernel_modules<I, S>(mut self, modules: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.kernel_modules = modules.into_iter().map(Into::into).collect();
        self
    }

    /// Rebuild module dependencies and the library cache after uninstall
    pub fn rebuild_caches(mut self, rebuild: bool) -> Self {
        self.config.rebuild_caches = rebuild;
        self
    }

    /// Set the kernel release handed to the dependency rebuild
    pub fn kernel_name(mut self, name: impl Into<String>) -> Self {
        self.config.kernel_name = name.into();
        self
    }

    /// Set the hook directory
    pub fn hooks_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.hooks_dir = path.into();
        self
    }

    pub fn depmod(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.depmod = path.into();
        self
    }

    pub fn ldconfig(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.ldconfig = path.into();
        self
    }

    pub fn rmmod(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.rmmod = path.into();
        self
    }

    pub fn dkms(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.dkms = path.into();
        self
    }

    pub fn dkms_module(mut self, name: impl Into<String>) -> Self {
        self.config.dkms_module = name.into();
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
