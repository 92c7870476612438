//! File checksums
//!
//! CRC-32 of a file's bytes, behind a narrow trait so tests can swap it.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use crate::error::{Result, UndoError};

/// Computes a 32-bit checksum of a file's contents
pub trait CrcOracle {
    fn file_crc(&self, path: &Path) -> Result<u32>;
}

/// CRC-32 (IEEE) backed by `crc32fast`
#[derive(Debug, Clone, Copy, Default)]
pub struct Crc32;

impl CrcOracle for Crc32 {
    fn file_crc(&self, path: &Path) -> Result<u32> {
        let file = File::open(path).map_err(|e| UndoError::io_at("open", path, e))?;
        let mut reader = BufReader::with_capacity(64 * 1024, file);
        let mut hasher = crc32fast::Hasher::new();
        let mut chunk = [0u8; 64 * 1024];

        loop {
            let n = reader
                .read(&mut chunk)
                .map_err(|e| UndoError::io_at("read", path, e))?;
            if n == 0 {
                break;
            }
            hasher.update(&chunk[..n]);
        }

        Ok(hasher.finalize())
    }
}
