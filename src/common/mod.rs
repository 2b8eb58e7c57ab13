//! Common types shared by the walker and the archive writers.

use std::fs::File;
use std::io::{self, Read};
use std::path::{Component, Path, PathBuf};

use crate::error::{ArchiverError, Result};

/// Where the bytes of an entry come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    /// Inline bytes supplied by the caller.
    Content(Vec<u8>),
    /// A file on disk, opened only when the entry is written.
    File(PathBuf),
}

impl Payload {
    /// Opens the payload for reading. File payloads are opened lazily here,
    /// immediately before the entry is written.
    pub fn open(&self) -> Result<Box<dyn Read + '_>> {
        match self {
            Payload::Content(bytes) => Ok(Box::new(bytes.as_slice())),
            Payload::File(path) => {
                let file = File::open(path).map_err(|e| ArchiverError::io(e, path))?;
                Ok(Box::new(file))
            }
        }
    }

    /// Number of bytes the payload will yield.
    pub fn len(&self) -> Result<u64> {
        match self {
            Payload::Content(bytes) => Ok(bytes.len() as u64),
            Payload::File(path) => std::fs::metadata(path)
                .map(|m| m.len())
                .map_err(|e| ArchiverError::io(e, path)),
        }
    }

    /// Reads the whole payload into memory.
    pub fn read_all(&self) -> Result<Vec<u8>> {
        match self {
            Payload::Content(bytes) => Ok(bytes.clone()),
            Payload::File(path) => read_file(path),
        }
    }
}

/// Reads `path` completely, tagging failures with the path.
pub fn read_file(path: &Path) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    File::open(path)
        .and_then(|mut f| f.read_to_end(&mut buf))
        .map_err(|e: io::Error| ArchiverError::io(e, path))?;
    Ok(buf)
}

/// One logical item to be written into an archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    /// Forward-slash path inside the archive. Never empty.
    pub archive_path: String,
    pub payload: Payload,
    /// Modification time in seconds since the Unix epoch.
    pub mod_time: u64,
    /// Permission bits, before any uniform override is applied.
    pub mode: u32,
}

impl ArchiveEntry {
    pub fn from_content(archive_path: impl Into<String>, content: Vec<u8>, mode: u32) -> Self {
        Self {
            archive_path: archive_path.into(),
            payload: Payload::Content(content),
            mod_time: 0,
            mode,
        }
    }
}

/// Joins archive path components with `/`, skipping empty ones.
pub fn join_archive_path(prefix: &str, rel: &str) -> String {
    match (prefix.is_empty(), rel.is_empty()) {
        (true, _) => rel.to_string(),
        (false, true) => prefix.to_string(),
        (false, false) => format!("{}/{}", prefix.trim_end_matches('/'), rel),
    }
}

/// Converts a relative filesystem path into archive form (forward slashes).
pub fn to_archive_path(rel: &Path) -> String {
    rel.components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}
