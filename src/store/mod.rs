//! Store Module
//!
//! On-disk backup root for one install generation.
//!
//! ## Layout
//! ```text
//! {backup_root}/         (0700)
//! ├── log                (0600, see crate::log)
//! ├── dirs               (created directories, one path per line)
//! ├── 100                (byte-for-byte copy of a displaced file)
//! ├── 101
//! └── ...
//! ```

mod backup;

pub use backup::{mode_of, move_file, BackupStore, LOG_MODE, ROOT_MODE};
