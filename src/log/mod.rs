//! Mutation Log Module
//!
//! Append-only record of every destructive change made during install.
//!
//! ## Responsibilities
//! - Record backups, installed files/symlinks and created directories
//! - Parse the log back into an ordered session for uninstall
//! - Keep the first line readable by older readers
//!
//! ## File Format
//! ```text
//! ┌─────────────────────────────────────────┐
//! │ 1.0-<digits> (<version>)                │  line 1
//! │ <description>                           │  line 2
//! ├─────────────────────────────────────────┤
//! │ <tag>: <filename>                       │  record header
//! │ <continuation line(s) per tag>          │
//! ├─────────────────────────────────────────┤
//! │ ...                                     │
//! └─────────────────────────────────────────┘
//! ```

mod entry;
mod format;
mod reader;
mod version;
mod writer;

pub use entry::{
    EntryTag, Header, LogEntry, LogSession, Ownership, BACKED_UP_SYMLINK, INSTALLED_FILE,
    INSTALLED_SYMLINK, SLOT_BASE,
};
pub use format::{
    encode_entry, encode_header, parse_first_line, parse_header, parse_session, LineScanner,
    PERM_MASK,
};
pub use reader::LogReader;
pub use version::LegacyVersionCodec;
pub use writer::LogWriter;
