//! # Tree Walker
//!
//! Enumerates a source directory into an ordered list of [`ArchiveEntry`]s.
//!
//! Traversal is lexical by file name at every level, so the produced order only
//! depends on the names on disk. Symlinked directories are expanded in place:
//! the walker pushes a new [`WalkContext`] whose root is the resolved real
//! directory and whose archive prefix is the symlink's own archive path, and
//! pops it once that subtree is exhausted. The frame stack is explicit so the
//! expansion bound and the loop check stay visible in one place.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::debug;
use walkdir::{DirEntry, WalkDir};

use crate::common::{join_archive_path, read_file, to_archive_path, ArchiveEntry, Payload};
use crate::error::{ArchiverError, Result};
use crate::fsx;
use crate::matcher::ExclusionSet;
use crate::symlink;

/// Maximum number of nested symlinked-directory expansions.
pub const MAX_EXPANSION_DEPTH: usize = 40;

/// State for one walk root: the real directory being enumerated and the
/// archive path its entries are placed under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalkContext {
    pub real_root: PathBuf,
    pub prefix: String,
}

struct Frame {
    ctx: WalkContext,
    iter: walkdir::IntoIter,
}

impl Frame {
    fn new(ctx: WalkContext) -> Self {
        let iter = WalkDir::new(&ctx.real_root)
            .min_depth(1)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter();
        Self { ctx, iter }
    }
}

enum Step {
    Skip,
    Emit(ArchiveEntry),
    Descend(WalkContext),
    Defer(ArchiverError),
}

/// Walks `root` and returns every entry to archive, in archive order.
///
/// Fails with [`ArchiverError::EmptyArchive`] when nothing survives the
/// exclusions. With `exclude_symlink_directories` set, symlinked directories
/// are neither expanded nor emitted; the read failure they cause is reported
/// after the walk, unless the walk came up empty.
pub fn walk(root: &Path, excludes: &ExclusionSet, exclude_symlink_directories: bool) -> Result<Vec<ArchiveEntry>> {
    let real_root = checked_root(root)?;
    debug!(root = %real_root.display(), excludes = ?excludes.patterns(), "walking source directory");
    let mut frames = vec![Frame::new(WalkContext { real_root, prefix: String::new() })];
    let mut entries = Vec::new();
    let mut deferred: Option<ArchiverError> = None;

    while let Some(frame) = frames.last_mut() {
        let Some(next) = frame.iter.next() else {
            frames.pop();
            continue;
        };
        let dir_entry = next.map_err(walkdir_error)?;

        let rel = dir_entry.path().strip_prefix(&frame.ctx.real_root).unwrap_or(dir_entry.path());
        let archive_path = join_archive_path(&frame.ctx.prefix, &to_archive_path(rel));

        if excludes.is_excluded(&archive_path) {
            debug!(path = %archive_path, "excluded");
            if dir_entry.file_type().is_dir() {
                frame.iter.skip_current_dir();
            }
            continue;
        }

        let step = if exclude_symlink_directories {
            classify_without_dir_links(&dir_entry, archive_path)?
        } else {
            classify(&dir_entry, archive_path, &frames)?
        };

        match step {
            Step::Skip => {}
            Step::Emit(entry) => {
                debug!(path = %entry.archive_path, "collected");
                entries.push(entry);
            }
            Step::Descend(ctx) => {
                debug!(prefix = %ctx.prefix, root = %ctx.real_root.display(), "expanding symlinked directory");
                frames.push(Frame::new(ctx));
            }
            Step::Defer(err) => {
                debug!(error = %err, "symlinked directory not expanded");
                deferred.get_or_insert(err);
            }
        }
    }

    if entries.is_empty() {
        return Err(ArchiverError::EmptyArchive { path: root.to_path_buf() });
    }
    if let Some(err) = deferred {
        return Err(err);
    }
    Ok(entries)
}

fn checked_root(root: &Path) -> Result<PathBuf> {
    let meta = fs::metadata(root).map_err(|e| ArchiverError::InvalidSource {
        path: root.to_path_buf(),
        reason: e.to_string(),
    })?;
    if !meta.is_dir() {
        return Err(ArchiverError::InvalidSource {
            path: root.to_path_buf(),
            reason: "not a directory".into(),
        });
    }
    fs::canonicalize(root).map_err(|e| ArchiverError::io(e, root))
}

/// Default policy: every symlink is resolved, directories are expanded.
fn classify(dir_entry: &DirEntry, archive_path: String, frames: &[Frame]) -> Result<Step> {
    let file_type = dir_entry.file_type();
    if file_type.is_dir() {
        return Ok(Step::Skip);
    }
    if file_type.is_file() {
        let meta = dir_entry.metadata().map_err(walkdir_error)?;
        return Ok(Step::Emit(file_entry(archive_path, dir_entry.path().to_path_buf(), &meta)));
    }
    if !file_type.is_symlink() {
        debug!(path = %archive_path, "skipping special file");
        return Ok(Step::Skip);
    }

    let resolved = symlink::resolve(dir_entry.path())?;
    if !resolved.is_dir {
        let meta = fs::metadata(&resolved.real_path).map_err(|e| ArchiverError::io(e, &resolved.real_path))?;
        return Ok(Step::Emit(file_entry(archive_path, resolved.real_path, &meta)));
    }

    let target = &resolved.real_path;
    let loops_back = dir_entry.path().starts_with(target)
        || frames.iter().any(|f| f.ctx.real_root.starts_with(target));
    if loops_back || frames.len() > MAX_EXPANSION_DEPTH {
        return Err(ArchiverError::SymlinkCycle {
            path: dir_entry.path().to_path_buf(),
            hops: frames.len(),
        });
    }
    Ok(Step::Descend(WalkContext { real_root: resolved.real_path, prefix: archive_path }))
}

/// `exclude_symlink_directories` policy: symlinks are read as plain files.
/// A link to a file reads transparently; a link to a directory fails the read.
fn classify_without_dir_links(dir_entry: &DirEntry, archive_path: String) -> Result<Step> {
    let file_type = dir_entry.file_type();
    if file_type.is_dir() {
        return Ok(Step::Skip);
    }
    if !file_type.is_file() && !file_type.is_symlink() {
        debug!(path = %archive_path, "skipping special file");
        return Ok(Step::Skip);
    }

    let path = dir_entry.path();
    let meta = fs::metadata(path).map_err(|source| ArchiverError::SymlinkResolution {
        path: path.to_path_buf(),
        source,
    })?;
    if !meta.is_dir() {
        return Ok(Step::Emit(file_entry(archive_path, path.to_path_buf(), &meta)));
    }

    let err = match read_file(path) {
        Err(err) => err,
        Ok(_) => ArchiverError::io(io::Error::new(io::ErrorKind::Other, "is a directory"), path),
    };
    Ok(Step::Defer(err))
}

fn file_entry(archive_path: String, source: PathBuf, meta: &fs::Metadata) -> ArchiveEntry {
    ArchiveEntry {
        archive_path,
        payload: Payload::File(source),
        mod_time: fsx::modified_secs(meta),
        mode: fsx::permission_bits(meta),
    }
}

fn walkdir_error(err: walkdir::Error) -> ArchiverError {
    let path = err.path().map(Path::to_path_buf).unwrap_or_default();
    let source = err
        .into_io_error()
        .unwrap_or_else(|| io::Error::new(io::ErrorKind::Other, "directory walk failed"));
    ArchiverError::Io { source, path }
}
