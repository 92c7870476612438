//! Uninstall Module
//!
//! Turns a recorded session back into the pre-install filesystem.
//!
//! ## Responsibilities
//! - Remove installed artifacts (pass A)
//! - Restore backed-up artifacts (pass B)
//! - Remove directories created during install
//! - Delegate host-level cleanup to [`crate::system::SystemIntegration`]

mod janitor;
mod passes;

pub use janitor::{order_directories, DirectoryJanitor, JanitorReport};
pub use passes::{
    EntryFailure, PassReport, UninstallEngine, UninstallOptions, UninstallOutcome,
    UninstallReport,
};
