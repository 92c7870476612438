//! # undolog
//!
//! A filesystem-mutation log and replay engine for installers:
//! - Append-only text log of every destructive change made during install
//! - Numbered backup slots for displaced files
//! - CRC-32 tamper detection before anything is undone
//! - Best-effort two-pass uninstall that restores as much as it can
//!
//! ## Architecture Overview
//!
//! ```text
//!   install time                          uninstall time
//! ┌──────────────┐                    ┌──────────────────┐
//! │  LogWriter   │                    │    LogReader     │
//! └──────┬───────┘                    └────────┬─────────┘
//!        │                                     │
//!        ▼                                     ▼
//! ┌──────────────┐   log, dirs,       ┌──────────────────┐
//! │ BackupStore  │◄──── slots ───────►│ IntegrityChecker │
//! └──────────────┘                    └────────┬─────────┘
//!                                              │
//!                                              ▼
//!                                     ┌──────────────────┐
//!                                     │ UninstallEngine  │
//!                                     │  pass A, pass B  │
//!                                     └────────┬─────────┘
//!                                              │
//!                                              ▼
//!                                     ┌──────────────────┐
//!                                     │ DirectoryJanitor │
//!                                     └──────────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod config;
pub mod error;

pub mod crc;
pub mod engine;
pub mod integrity;
pub mod log;
pub mod progress;
pub mod store;
pub mod system;
pub mod uninstall;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use config::{Config, DirectoryOrder};
pub use engine::{Engine, InstalledPackage};
pub use error::{Result, UndoError};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of undolog
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
