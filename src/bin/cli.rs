//! undolog CLI
//!
//! Records install-time mutations and uninstalls them again.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::{fmt, EnvFilter};

use undolog::uninstall::{UninstallOptions, UninstallOutcome};
use undolog::{Config, DirectoryOrder, Engine};

/// undolog CLI
#[derive(Parser, Debug)]
#[command(name = "undolog")]
#[command(about = "Install-time mutation log and uninstaller")]
#[command(version)]
struct Args {
    /// Backup root directory
    #[arg(short, long, global = true, default_value = "/var/lib/undolog")]
    root: PathBuf,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start a new generation (destroys the previous backup)
    Init {
        /// Version being installed
        version: String,

        /// Free-text description
        description: String,
    },

    /// Move existing files out of the way before installing over them
    Backup {
        paths: Vec<PathBuf>,
    },

    /// Record freshly installed files
    InstalledFile {
        paths: Vec<PathBuf>,
    },

    /// Record a freshly created symlink
    InstalledSymlink {
        path: PathBuf,
        target: PathBuf,
    },

    /// Record directories created during install
    Mkdir {
        paths: Vec<PathBuf>,
    },

    /// Undo the recorded installation
    Uninstall {
        /// Do not rebuild kernel module dependencies
        #[arg(long)]
        skip_depmod: bool,

        /// Do not unload kernel modules
        #[arg(long)]
        skip_module_unload: bool,

        /// Rebuild module dependencies and the library cache afterwards
        #[arg(long)]
        rebuild_caches: bool,

        /// Kernel modules to unload afterwards
        #[arg(long = "unload", value_name = "MODULE")]
        modules: Vec<String>,

        /// Remove directories deepest-first by component count
        #[arg(long)]
        depth_order: bool,
    },

    /// Show the installed version and description
    Info,

    /// Check the installation against the log
    Check,

    /// Exit successfully if PATH is a recorded installed file
    Find {
        path: PathBuf,
    },
}

fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,undolog=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    match run(args) {
        Ok(code) => code,
        Err(e) => {
            tracing::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> undolog::Result<ExitCode> {
    let mut builder = Config::builder().backup_root(&args.root);
    if let Commands::Uninstall {
        skip_module_unload,
        rebuild_caches,
        modules,
        depth_order,
        ..
    } = &args.command
    {
        builder = builder
            .skip_module_unload(*skip_module_unload)
            .rebuild_caches(*rebuild_caches)
            .kernel_modules(modules.clone());
        if *depth_order {
            builder = builder.directory_order(DirectoryOrder::PathDepth);
        }
    }
    let engine = Engine::open(builder.build());
    let json = args.json;

    match args.command {
        Commands::Init {
            version,
            description,
        } => {
            engine.begin_install(&version, &description)?;
        }
        Commands::Backup { paths } => {
            for path in paths {
                match engine.backup_file(&path)? {
                    Some(entry) => emit(json, &entry, || {
                        format!("backed up {}", entry.filename.display())
                    }),
                    None => tracing::debug!(path = %path.display(), "nothing to back up"),
                }
            }
        }
        Commands::InstalledFile { paths } => {
            for path in paths {
                engine.log_installed_file(&path)?;
            }
        }
        Commands::InstalledSymlink { path, target } => {
            engine.log_installed_symlink(&path, &target)?;
        }
        Commands::Mkdir { paths } => {
            engine.log_created_directories(&paths)?;
        }
        Commands::Uninstall { skip_depmod, .. } => {
            let outcome = engine.uninstall(UninstallOptions { skip_depmod })?;
            emit(json, &outcome, || match &outcome {
                UninstallOutcome::NothingInstalled => "Nothing to uninstall.".to_string(),
                UninstallOutcome::Completed(report) => format!(
                    "Uninstalled {} ({} removed, {} restored){}",
                    report.header.description,
                    report.removal.completed,
                    report.restoration.completed,
                    if report.is_clean() { "" } else { " with warnings" }
                ),
            });
        }
        Commands::Info => {
            let installed = engine.installed()?;
            emit(json, &installed, || match &installed {
                Some(p) => format!(
                    "The currently installed package is: '{}' (version: {}).",
                    p.description, p.version
                ),
                None => "There is no package currently installed.".to_string(),
            });
            if installed.is_none() {
                return Ok(ExitCode::FAILURE);
            }
        }
        Commands::Check => {
            let report = engine.verify()?;
            emit(json, &report, || {
                if report.is_clean() {
                    format!("All {} entries are consistent.", report.checked)
                } else {
                    format!(
                        "{} of {} entries do not match the log.",
                        report.findings.len(),
                        report.checked
                    )
                }
            });
            if !report.is_clean() {
                return Ok(ExitCode::FAILURE);
            }
        }
        Commands::Find { path } => {
            if !engine.is_installed_file(&path)? {
                return Ok(ExitCode::FAILURE);
            }
        }
    }

    Ok(ExitCode::SUCCESS)
}

/// Print `value` as JSON, or the human message
fn emit<T: Serialize>(json: bool, value: &T, message: impl FnOnce() -> String) {
    if json {
        match serde_json::to_string_pretty(value) {
            Ok(text) => println!("{}", text),
            Err(e) => tracing::error!("Unable to encode JSON: {}", e),
        }
    } else {
        println!("{}", message());
    }
}
