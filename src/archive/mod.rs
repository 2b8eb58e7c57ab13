//! # Archive Writers
//!
//! The two supported containers, ZIP and gzip-compressed TAR, share one
//! contract ([`ArchiveWriter`]): scoped ownership of the output file, the four
//! entry sources, and a uniform permission override. What differs between the
//! formats is their metadata policy, spelled out per format in
//! [`Normalization`] rather than assumed to be the same.
//!
//! [`Archiver`] is the closed set of writers, selected by [`ArchiveFormat`].

pub mod tar_gz;
pub mod zip;

use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::common::{ArchiveEntry, Payload};
use crate::error::{ArchiverError, Result};
use crate::fsx;
use crate::matcher::ExclusionSet;
use crate::walk;

pub use self::tar_gz::TarGzArchiver;
pub use self::zip::ZipArchiver;

/// Supported container formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ArchiveFormat {
    #[serde(rename = "zip")]
    Zip,
    #[serde(rename = "tar.gz")]
    TarGz,
}

impl ArchiveFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            ArchiveFormat::Zip => "zip",
            ArchiveFormat::TarGz => "tar.gz",
        }
    }
}

impl fmt::Display for ArchiveFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ArchiveFormat {
    type Err = ArchiverError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "zip" => Ok(ArchiveFormat::Zip),
            "tar.gz" => Ok(ArchiveFormat::TarGz),
            other => Err(ArchiverError::UnsupportedFormat(other.to_string())),
        }
    }
}

/// Per-format metadata policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Normalization {
    /// Mode of entries built from inline content.
    pub content_mode: u32,
    /// Mode the format forces onto every entry, if any.
    pub fixed_mode: Option<u32>,
    /// Keep the source modification time of directory-walk entries.
    pub preserve_walk_mtime: bool,
}

impl Normalization {
    /// ZIP with metadata normalisation: stored, 1981-01-01, 0644.
    pub const ZIP_NORMALIZED: Normalization = Normalization {
        content_mode: 0o644,
        fixed_mode: Some(0o644),
        preserve_walk_mtime: false,
    };

    /// ZIP without normalisation: deflated, DOS-epoch timestamp, real modes.
    pub const ZIP_PLAIN: Normalization = Normalization {
        content_mode: 0o644,
        fixed_mode: None,
        preserve_walk_mtime: false,
    };

    /// TAR+GZIP: walked files keep their mtime and mode, content gets 0600 at time zero.
    pub const TAR_GZ: Normalization = Normalization {
        content_mode: 0o600,
        fixed_mode: None,
        preserve_walk_mtime: true,
    };
}

/// Caller-facing knobs of a single build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArchiveOptions {
    /// Uniform permission bits stored on every entry, overriding everything else.
    pub output_file_mode: Option<u32>,
    /// ZIP only: store uncompressed with a fixed timestamp and mode.
    pub normalize_metadata: bool,
}

impl Default for ArchiveOptions {
    fn default() -> Self {
        Self { output_file_mode: None, normalize_metadata: true }
    }
}

/// Resolved metadata rules for one open archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryPolicy {
    pub normalization: Normalization,
    pub output_file_mode: Option<u32>,
}

impl EntryPolicy {
    /// Final mode for an entry whose natural mode is `natural`.
    pub fn mode_for(&self, natural: u32) -> u32 {
        self.output_file_mode
            .or(self.normalization.fixed_mode)
            .unwrap_or(natural)
    }
}

/// Tracks the archive paths already written so a second entry for the same
/// path fails instead of shadowing the first.
#[derive(Debug, Default)]
pub(crate) struct WrittenPaths(HashSet<String>);

impl WrittenPaths {
    pub(crate) fn claim(&mut self, archive_path: &str) -> Result<()> {
        if archive_path.is_empty() {
            return Err(ArchiverError::InvalidRequest("archive entry path must not be empty".into()));
        }
        if !self.0.insert(archive_path.to_string()) {
            return Err(ArchiverError::DuplicateEntry(archive_path.to_string()));
        }
        Ok(())
    }

    pub(crate) fn len(&self) -> usize {
        self.0.len()
    }
}

/// The writer contract shared by both formats.
///
/// Implementors only serialise a fully-resolved entry ([`append`]) and close
/// their streams ([`finish`]); the entry sources are provided here once.
/// Dropping a writer without calling `finish` still closes the file.
///
/// [`append`]: ArchiveWriter::append
/// [`finish`]: ArchiveWriter::finish
pub trait ArchiveWriter: Sized {
    fn policy(&self) -> EntryPolicy;

    fn output_path(&self) -> &Path;

    /// Writes one entry as-is. `entry.mode` and `entry.mod_time` are final.
    fn append(&mut self, entry: &ArchiveEntry) -> Result<()>;

    /// Number of entries written so far.
    fn entry_count(&self) -> usize;

    /// Flushes and closes every layered stream and the output file.
    fn finish(self) -> Result<()>;

    /// Applies the uniform mode override and writes `entry`.
    fn write_entry(&mut self, mut entry: ArchiveEntry) -> Result<()> {
        entry.mode = self.policy().mode_for(entry.mode);
        debug!(path = %entry.archive_path, mode = %format_args!("{:o}", entry.mode), "writing entry");
        self.append(&entry)
    }

    /// Writes a single entry from in-memory bytes at time zero.
    fn write_from_content(&mut self, content: &[u8], archive_path: &str) -> Result<()> {
        let mode = self.policy().normalization.content_mode;
        self.write_entry(ArchiveEntry::from_content(archive_path, content.to_vec(), mode))
    }

    /// Writes one file from disk, named by its base name, at time zero.
    fn write_from_file(&mut self, source: &Path) -> Result<()> {
        let meta = fs::metadata(source).map_err(|e| ArchiverError::InvalidSource {
            path: source.to_path_buf(),
            reason: e.to_string(),
        })?;
        if !meta.is_file() {
            return Err(ArchiverError::InvalidSource {
                path: source.to_path_buf(),
                reason: "not a regular file".into(),
            });
        }
        let archive_path = source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| ArchiverError::InvalidSource {
                path: source.to_path_buf(),
                reason: "path has no file name".into(),
            })?;
        self.write_entry(ArchiveEntry {
            archive_path,
            payload: Payload::File(source.to_path_buf()),
            mod_time: 0,
            mode: fsx::permission_bits(&meta),
        })
    }

    /// Walks `root` and writes every entry in walk order.
    ///
    /// The archive being written is never added to itself, even when the
    /// output path lies inside `root`.
    fn write_from_directory(
        &mut self,
        root: &Path,
        excludes: &ExclusionSet,
        exclude_symlink_directories: bool,
    ) -> Result<usize> {
        let preserve = self.policy().normalization.preserve_walk_mtime;
        let own_output = fs::canonicalize(self.output_path()).ok();
        let entries = walk::walk(root, excludes, exclude_symlink_directories)?;

        let mut count = 0;
        for mut entry in entries {
            if let (Some(own), Payload::File(source)) = (&own_output, &entry.payload) {
                if source == own {
                    debug!(path = %entry.archive_path, "skipping the archive being written");
                    continue;
                }
            }
            if !preserve {
                entry.mod_time = 0;
            }
            self.write_entry(entry)?;
            count += 1;
        }
        if count == 0 {
            return Err(ArchiverError::EmptyArchive { path: root.to_path_buf() });
        }
        Ok(count)
    }

    /// Writes one entry per named block, in sorted name order whatever order
    /// the caller supplied them in.
    fn write_from_named_content<I, K, V>(&mut self, blocks: I) -> Result<usize>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: AsRef<[u8]>,
    {
        let mode = self.policy().normalization.content_mode;
        let mut entries: Vec<ArchiveEntry> = blocks
            .into_iter()
            .map(|(name, content)| ArchiveEntry::from_content(name, content.as_ref().to_vec(), mode))
            .collect();
        entries.sort_by(|a, b| a.archive_path.cmp(&b.archive_path));
        let count = entries.len();
        for entry in entries {
            self.write_entry(entry)?;
        }
        Ok(count)
    }
}

/// One open archive of either format.
pub enum Archiver {
    Zip(ZipArchiver),
    TarGz(TarGzArchiver),
}

impl Archiver {
    /// Opens (creating or truncating) `output_path` for `format`.
    pub fn create(format: ArchiveFormat, output_path: &Path, options: ArchiveOptions) -> Result<Self> {
        Ok(match format {
            ArchiveFormat::Zip => Archiver::Zip(ZipArchiver::create(output_path, options)?),
            ArchiveFormat::TarGz => Archiver::TarGz(TarGzArchiver::create(output_path, options)?),
        })
    }

    pub fn entry_count(&self) -> usize {
        match self {
            Archiver::Zip(w) => w.entry_count(),
            Archiver::TarGz(w) => w.entry_count(),
        }
    }

    pub fn write_from_content(&mut self, content: &[u8], archive_path: &str) -> Result<()> {
        match self {
            Archiver::Zip(w) => w.write_from_content(content, archive_path),
            Archiver::TarGz(w) => w.write_from_content(content, archive_path),
        }
    }

    pub fn write_from_file(&mut self, source: &Path) -> Result<()> {
        match self {
            Archiver::Zip(w) => w.write_from_file(source),
            Archiver::TarGz(w) => w.write_from_file(source),
        }
    }

    pub fn write_from_directory(
        &mut self,
        root: &Path,
        excludes: &ExclusionSet,
        exclude_symlink_directories: bool,
    ) -> Result<usize> {
        match self {
            Archiver::Zip(w) => w.write_from_directory(root, excludes, exclude_symlink_directories),
            Archiver::TarGz(w) => w.write_from_directory(root, excludes, exclude_symlink_directories),
        }
    }

    pub fn write_from_named_content<I, K, V>(&mut self, blocks: I) -> Result<usize>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: AsRef<[u8]>,
    {
        match self {
            Archiver::Zip(w) => w.write_from_named_content(blocks),
            Archiver::TarGz(w) => w.write_from_named_content(blocks),
        }
    }

    pub fn finish(self) -> Result<()> {
        match self {
            Archiver::Zip(w) => w.finish(),
            Archiver::TarGz(w) => w.finish(),
        }
    }
}

pub(crate) fn create_output(output_path: &Path) -> Result<fs::File> {
    fs::File::create(output_path).map_err(|e| ArchiverError::io(e, output_path))
}
