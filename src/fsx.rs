//! Cross-platform filesystem metadata helpers.
//!
//! On Unix the real permission bits are read from the inode. Windows has no
//! POSIX mode, so files are reported as `0644` (or `0444` when read-only) and
//! directories as `0755`, which keeps archives built there reproducible.

use std::fs::Metadata;
use std::time::UNIX_EPOCH;

/// Permission bits (`0o7777` mask) of `metadata`.
#[cfg(unix)]
pub fn permission_bits(metadata: &Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode() & 0o7777
}

#[cfg(not(unix))]
pub fn permission_bits(metadata: &Metadata) -> u32 {
    if metadata.is_dir() {
        0o755
    } else if metadata.permissions().readonly() {
        0o444
    } else {
        0o644
    }
}

/// Modification time in whole seconds since the Unix epoch.
/// Timestamps before 1970 (or unavailable ones) clamp to 0.
pub fn modified_secs(metadata: &Metadata) -> u64 {
    metadata
        .modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
