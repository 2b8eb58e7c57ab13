//! # Build Pipeline
//!
//! Runs a validated request end to end: check the source, open the writer for
//! the format, write from the selected source, close, then size and hash the
//! finished file.
//!
//! Once a request has validated, a failed build never leaves a file at
//! `output_path`; whatever was written (or an archive from an earlier run) is
//! removed before the error is returned. The one exception is a `source_file`
//! that is the output itself: that is rejected without touching it.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::archive::Archiver;
use crate::checksum::{self, Checksums};
use crate::config::{ArchiveRequest, BuildPlan, EntrySource};
use crate::error::{ArchiverError, Result};

/// What a successful build reports back to the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveOutput {
    pub output_path: PathBuf,
    pub output_size: u64,
    pub entry_count: usize,
    pub output_sha: String,
    pub output_sha256: String,
    pub output_base64sha256: String,
    pub output_md5: String,
    pub output_sha512: String,
    pub output_base64sha512: String,
}

impl ArchiveOutput {
    fn new(output_path: PathBuf, output_size: u64, entry_count: usize, sums: Checksums) -> Self {
        Self {
            output_path,
            output_size,
            entry_count,
            output_sha: sums.sha,
            output_sha256: sums.sha256,
            output_base64sha256: sums.base64sha256,
            output_md5: sums.md5,
            output_sha512: sums.sha512,
            output_base64sha512: sums.base64sha512,
        }
    }
}

/// Validates `request` and builds it.
pub fn build_archive(request: &ArchiveRequest) -> Result<ArchiveOutput> {
    let plan = request.validate()?;
    execute(&plan)
}

/// Builds an already validated plan.
pub fn execute(plan: &BuildPlan) -> Result<ArchiveOutput> {
    reject_output_as_source(plan)?;

    let entry_count = match prepare_and_write(plan) {
        Ok(count) => count,
        Err(err) => {
            remove_failed_output(&plan.output_path);
            return Err(err);
        }
    };

    let output_size = fs::metadata(&plan.output_path)
        .map(|m| m.len())
        .map_err(|e| ArchiverError::io(e, &plan.output_path))?;
    let sums = checksum::file_checksums(&plan.output_path)?;

    info!(
        path = %plan.output_path.display(),
        format = %plan.format,
        source = plan.source.kind(),
        entries = entry_count,
        size = output_size,
        sha256 = %sums.sha256,
        "archive built"
    );
    Ok(ArchiveOutput::new(plan.output_path.clone(), output_size, entry_count, sums))
}

fn prepare_and_write(plan: &BuildPlan) -> Result<usize> {
    check_source(&plan.source)?;
    ensure_parent_dir(&plan.output_path)?;
    write_archive(plan)
}

fn write_archive(plan: &BuildPlan) -> Result<usize> {
    let mut archiver = Archiver::create(plan.format, &plan.output_path, plan.options)?;

    match &plan.source {
        EntrySource::Named(blocks) => {
            archiver.write_from_named_content(blocks.iter().map(|(name, content)| (name.as_str(), content.as_slice())))?;
        }
        EntrySource::Content { content, filename } => archiver.write_from_content(content, filename)?,
        EntrySource::File(path) => archiver.write_from_file(path)?,
        EntrySource::Directory { root, excludes, exclude_symlink_directories } => {
            archiver.write_from_directory(root, excludes, *exclude_symlink_directories)?;
        }
    }

    let count = archiver.entry_count();
    archiver.finish()?;
    Ok(count)
}

/// Rejects a missing source, or one of the wrong kind, before the output is opened.
fn check_source(source: &EntrySource) -> Result<()> {
    let (path, want_dir) = match source {
        EntrySource::File(path) => (path, false),
        EntrySource::Directory { root, .. } => (root, true),
        EntrySource::Named(_) | EntrySource::Content { .. } => return Ok(()),
    };
    let meta = fs::metadata(path).map_err(|e| ArchiverError::InvalidSource {
        path: path.clone(),
        reason: e.to_string(),
    })?;
    match (want_dir, meta.is_dir()) {
        (true, false) => Err(ArchiverError::InvalidSource { path: path.clone(), reason: "not a directory".into() }),
        (false, true) => Err(ArchiverError::InvalidSource { path: path.clone(), reason: "is a directory".into() }),
        _ => Ok(()),
    }
}

/// Opening the output truncates it, so a `source_file` that is the output
/// would be read back empty.
fn reject_output_as_source(plan: &BuildPlan) -> Result<()> {
    let EntrySource::File(source) = &plan.source else {
        return Ok(());
    };
    match (fs::canonicalize(source), fs::canonicalize(&plan.output_path)) {
        (Ok(a), Ok(b)) if a == b => Err(ArchiverError::InvalidSource {
            path: source.clone(),
            reason: "source file is the output archive".into(),
        }),
        _ => Ok(()),
    }
}

fn ensure_parent_dir(output_path: &Path) -> Result<()> {
    match output_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => {
            fs::create_dir_all(parent).map_err(|e| ArchiverError::io(e, parent))
        }
        _ => Ok(()),
    }
}

fn remove_failed_output(output_path: &Path) {
    match fs::remove_file(output_path) {
        Ok(()) => warn!(path = %output_path.display(), "removed output of failed build"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %output_path.display(), error = %e, "could not remove output of failed build"),
    }
}
