//! ZIP writer.
//!
//! Normalised archives (the default) store entries uncompressed, stamp them
//! 1981-01-01 00:00:00 and give them mode `0644`. Without normalisation
//! entries are deflated and carry the DOS epoch (1980-01-01 00:00:00) as
//! their timestamp. In both modes the timestamp never comes from the source.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use ::zip::write::FileOptions;
use ::zip::{CompressionMethod, DateTime, ZipWriter};
use tracing::debug;

use super::{create_output, ArchiveOptions, ArchiveWriter, EntryPolicy, Normalization, WrittenPaths};
use crate::common::ArchiveEntry;
use crate::error::{ArchiverError, Result};

/// Entries at or above this size need ZIP64 extra fields.
const ZIP64_THRESHOLD: u64 = u32::MAX as u64;

/// Writes one ZIP file. Owns the output handle until [`ArchiveWriter::finish`].
pub struct ZipArchiver {
    writer: ZipWriter<BufWriter<File>>,
    output_path: PathBuf,
    policy: EntryPolicy,
    method: CompressionMethod,
    timestamp: DateTime,
    written: WrittenPaths,
}

/// 1981-01-01 00:00:00, the fixed timestamp of normalised entries.
pub fn normalized_timestamp() -> Result<DateTime> {
    DateTime::from_date_and_time(1981, 1, 1, 0, 0, 0)
        .map_err(|_| ArchiverError::InvalidRequest("invalid fixed ZIP timestamp".into()))
}

impl ZipArchiver {
    pub fn create(output_path: &Path, options: ArchiveOptions) -> Result<Self> {
        let (normalization, method, timestamp) = if options.normalize_metadata {
            (Normalization::ZIP_NORMALIZED, CompressionMethod::Stored, normalized_timestamp()?)
        } else {
            (Normalization::ZIP_PLAIN, CompressionMethod::Deflated, DateTime::default())
        };
        let file = create_output(output_path)?;
        debug!(path = %output_path.display(), ?method, "opened zip archive");

        Ok(Self {
            writer: ZipWriter::new(BufWriter::new(file)),
            output_path: output_path.to_path_buf(),
            policy: EntryPolicy { normalization, output_file_mode: options.output_file_mode },
            method,
            timestamp,
            written: WrittenPaths::default(),
        })
    }

    fn write_error(&self, source: io::Error) -> ArchiverError {
        ArchiverError::io(source, &self.output_path)
    }
}

impl ArchiveWriter for ZipArchiver {
    fn policy(&self) -> EntryPolicy {
        self.policy
    }

    fn output_path(&self) -> &Path {
        &self.output_path
    }

    fn append(&mut self, entry: &ArchiveEntry) -> Result<()> {
        self.written.claim(&entry.archive_path)?;

        let options = FileOptions::default()
            .compression_method(self.method)
            .last_modified_time(self.timestamp)
            .unix_permissions(entry.mode)
            .large_file(entry.payload.len()? >= ZIP64_THRESHOLD);

        self.writer
            .start_file(entry.archive_path.as_str(), options)
            .map_err(|e| zip_error(e, &self.output_path))?;
        let mut reader = entry.payload.open()?;
        io::copy(&mut reader, &mut self.writer).map_err(|e| self.write_error(e))?;
        Ok(())
    }

    fn entry_count(&self) -> usize {
        self.written.len()
    }

    fn finish(mut self) -> Result<()> {
        let mut inner = self.writer.finish().map_err(|e| zip_error(e, &self.output_path))?;
        inner.flush().map_err(|e| self.write_error(e))?;
        debug!(path = %self.output_path.display(), entries = self.written.len(), "closed zip archive");
        Ok(())
    }
}

fn zip_error(err: ::zip::result::ZipError, path: &Path) -> ArchiverError {
    match ArchiverError::from(err) {
        ArchiverError::Io { source, .. } => ArchiverError::io(source, path),
        other => other,
    }
}
