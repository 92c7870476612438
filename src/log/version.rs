//! Backwards-compatible version line
//!
//! Older readers expect `MAJOR.MINOR-DIGITS` on the first log line and
//! stop reading after the digits. The line is written as
//! `1.0-<digits of version> (<version>)` so that both generations can
//! pull out what they understand, e.g. `1.0-105917 (105.9.17)`.

use crate::error::{Result, UndoError};

/// Encoder/decoder for the log's first line
pub struct LegacyVersionCodec;

impl LegacyVersionCodec {
    /// Build the version line for `version`
    pub fn encode(version: &str) -> String {
        let digits: String = version.chars().filter(|c| c.is_ascii_digit()).collect();
        format!("1.0-{} ({})", digits, version)
    }

    /// Extract the true version from a version line
    ///
    /// Fails for lines written by older writers, which carry no
    /// parenthesized version.
    pub fn decode(line: &str) -> Result<String> {
        let open = line
            .find('(')
            .ok_or_else(|| UndoError::VersionFormat(line.to_string()))?;
        let inner = &line[open + 1..];
        let close = inner
            .rfind(')')
            .ok_or_else(|| UndoError::VersionFormat(line.to_string()))?;
        Ok(inner[..close].to_string())
    }
}
