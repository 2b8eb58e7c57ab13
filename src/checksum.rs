//! Checksums of a finished archive file.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use md5::Md5;
use serde::{Deserialize, Serialize};
use sha1::Sha1;
use sha2::{Digest, Sha256, Sha512};

use crate::error::{ArchiverError, Result};

const BUF_SZ: usize = 64 * 1024;

/// Digests of one file, in the encodings the host exposes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checksums {
    /// SHA-1, hex.
    pub sha: String,
    pub sha256: String,
    pub base64sha256: String,
    pub md5: String,
    pub sha512: String,
    pub base64sha512: String,
}

/// Streams `path` once through every digest.
pub fn file_checksums(path: &Path) -> Result<Checksums> {
    let file = File::open(path).map_err(|e| ArchiverError::io(e, path))?;
    let mut reader = BufReader::new(file);

    let mut sha1 = Sha1::new();
    let mut sha256 = Sha256::new();
    let mut sha512 = Sha512::new();
    let mut md5 = Md5::new();

    let mut buf = vec![0u8; BUF_SZ];
    loop {
        let n = reader.read(&mut buf).map_err(|e| ArchiverError::io(e, path))?;
        if n == 0 {
            break;
        }
        sha1.update(&buf[..n]);
        sha256.update(&buf[..n]);
        sha512.update(&buf[..n]);
        md5.update(&buf[..n]);
    }

    let sha256 = sha256.finalize();
    let sha512 = sha512.finalize();
    Ok(Checksums {
        sha: hex::encode(sha1.finalize()),
        sha256: hex::encode(&sha256),
        base64sha256: STANDARD.encode(&sha256),
        md5: hex::encode(md5.finalize()),
        sha512: hex::encode(&sha512),
        base64sha512: STANDARD.encode(&sha512),
    })
}
