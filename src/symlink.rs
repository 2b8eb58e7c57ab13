//! Bounded symlink resolution.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::error::{ArchiverError, Result};

/// Maximum number of links followed in one chain before giving up.
pub const MAX_SYMLINK_HOPS: usize = 255;

/// The final target of a symlink chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedLink {
    /// Canonical path of the target.
    pub real_path: PathBuf,
    pub is_dir: bool,
    /// Number of links followed to reach `real_path`.
    pub hops: usize,
}

/// Resolves `path` through its whole symlink chain with the default hop bound.
pub fn resolve(path: &Path) -> Result<ResolvedLink> {
    resolve_bounded(path, MAX_SYMLINK_HOPS)
}

/// Resolves `path` through at most `max_hops` links.
///
/// Relative link targets are interpreted against the directory holding the
/// link. Once a non-link is reached the path is canonicalised, which also
/// resolves symlinked parent directories.
pub fn resolve_bounded(path: &Path, max_hops: usize) -> Result<ResolvedLink> {
    let mut current = path.to_path_buf();
    let mut hops = 0;

    loop {
        let meta = fs::symlink_metadata(&current).map_err(|source| ArchiverError::SymlinkResolution {
            path: path.to_path_buf(),
            source,
        })?;
        if !meta.file_type().is_symlink() {
            break;
        }
        if hops >= max_hops {
            return Err(ArchiverError::SymlinkCycle { path: path.to_path_buf(), hops });
        }
        let target = fs::read_link(&current).map_err(|source| ArchiverError::SymlinkResolution {
            path: path.to_path_buf(),
            source,
        })?;
        current = if target.is_absolute() {
            target
        } else {
            current.parent().unwrap_or_else(|| Path::new("")).join(target)
        };
        hops += 1;
    }

    let real_path = fs::canonicalize(&current).map_err(|source| resolution_error(path, source))?;
    let target_meta = fs::metadata(&real_path).map_err(|source| resolution_error(path, source))?;

    Ok(ResolvedLink { real_path, is_dir: target_meta.is_dir(), hops })
}

fn resolution_error(path: &Path, source: io::Error) -> ArchiverError {
    if is_loop_error(&source) {
        return ArchiverError::SymlinkCycle { path: path.to_path_buf(), hops: MAX_SYMLINK_HOPS };
    }
    ArchiverError::SymlinkResolution { path: path.to_path_buf(), source }
}

// ELOOP: the OS gave up on a loop through a parent component.
#[cfg(target_os = "linux")]
fn is_loop_error(err: &io::Error) -> bool {
    err.raw_os_error() == Some(40)
}

#[cfg(target_os = "macos")]
fn is_loop_error(err: &io::Error) -> bool {
    err.raw_os_error() == Some(62)
}

#[cfg(not(any(target_os = "linux", target_os = "macos")))]
fn is_loop_error(_err: &io::Error) -> bool {
    false
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::os::unix::fs::symlink;
    use tempfile::tempdir;

    #[test]
    fn test_resolve_file_link() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        fs::write(dir.path().join("target.txt"), b"payload")?;
        symlink("target.txt", dir.path().join("link.txt"))?;

        let resolved = resolve(&dir.path().join("link.txt"))?;
        assert!(!resolved.is_dir);
        assert_eq!(resolved.hops, 1);
        assert_eq!(resolved.real_path, fs::canonicalize(dir.path().join("target.txt"))?);
        Ok(())
    }

    #[test]
    fn test_resolve_chain_to_directory() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        fs::create_dir(dir.path().join("realdir"))?;
        symlink(dir.path().join("realdir"), dir.path().join("inner"))?;
        symlink("inner", dir.path().join("outer"))?;

        let resolved = resolve(&dir.path().join("outer"))?;
        assert!(resolved.is_dir);
        assert_eq!(resolved.hops, 2);
        assert_eq!(resolved.real_path, fs::canonicalize(dir.path().join("realdir"))?);
        Ok(())
    }

    #[test]
    fn test_dangling_link_is_resolution_error() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        symlink("missing.txt", dir.path().join("dangling"))?;

        match resolve(&dir.path().join("dangling")) {
            Err(ArchiverError::SymlinkResolution { .. }) => Ok(()),
            other => panic!("expected SymlinkResolution, got {:?}", other),
        }
    }

    #[test]
    fn test_link_loop_is_cycle_error() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        symlink("b", dir.path().join("a"))?;
        symlink("a", dir.path().join("b"))?;

        match resolve(&dir.path().join("a")) {
            Err(ArchiverError::SymlinkCycle { hops, .. }) => assert_eq!(hops, MAX_SYMLINK_HOPS),
            other => panic!("expected SymlinkCycle, got {:?}", other),
        }
        Ok(())
    }

    #[test]
    fn test_hop_bound_is_configurable() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        fs::write(dir.path().join("t"), b"x")?;
        symlink("t", dir.path().join("l1"))?;
        symlink("l1", dir.path().join("l2"))?;
        symlink("l2", dir.path().join("l3"))?;

        assert!(resolve_bounded(&dir.path().join("l3"), 3).is_ok());
        assert!(matches!(
            resolve_bounded(&dir.path().join("l3"), 2),
            Err(ArchiverError::SymlinkCycle { hops: 2, .. })
        ));
        Ok(())
    }
}
