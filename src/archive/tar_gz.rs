//! gzip-compressed TAR writer.
//!
//! Headers are GNU-format with uid/gid 0 and no owner names. The gzip header
//! carries no file name and a zero mtime, so the compressed stream depends only
//! on the tar bytes.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use flate2::write::GzEncoder;
use flate2::{Compression, GzBuilder};
use tar::{Builder, EntryType, Header};
use tracing::debug;

use super::{create_output, ArchiveOptions, ArchiveWriter, EntryPolicy, Normalization, WrittenPaths};
use crate::common::ArchiveEntry;
use crate::error::{ArchiverError, Result};

type TarStream = Builder<GzEncoder<BufWriter<File>>>;

/// Writes one `.tar.gz` file. Owns the output handle until [`ArchiveWriter::finish`].
pub struct TarGzArchiver {
    builder: TarStream,
    output_path: PathBuf,
    policy: EntryPolicy,
    written: WrittenPaths,
}

impl TarGzArchiver {
    /// `normalize_metadata` has no effect here; TAR+GZIP always follows
    /// [`Normalization::TAR_GZ`].
    pub fn create(output_path: &Path, options: ArchiveOptions) -> Result<Self> {
        let file = create_output(output_path)?;
        let encoder = GzBuilder::new()
            .mtime(0)
            .write(BufWriter::new(file), Compression::default());
        debug!(path = %output_path.display(), "opened tar.gz archive");

        Ok(Self {
            builder: Builder::new(encoder),
            output_path: output_path.to_path_buf(),
            policy: EntryPolicy {
                normalization: Normalization::TAR_GZ,
                output_file_mode: options.output_file_mode,
            },
            written: WrittenPaths::default(),
        })
    }

    fn write_error(&self, source: io::Error) -> ArchiverError {
        ArchiverError::io(source, &self.output_path)
    }
}

impl ArchiveWriter for TarGzArchiver {
    fn policy(&self) -> EntryPolicy {
        self.policy
    }

    fn output_path(&self) -> &Path {
        &self.output_path
    }

    fn append(&mut self, entry: &ArchiveEntry) -> Result<()> {
        self.written.claim(&entry.archive_path)?;

        let mut header = Header::new_gnu();
        header.set_entry_type(EntryType::Regular);
        header.set_size(entry.payload.len()?);
        header.set_mode(entry.mode);
        header.set_mtime(entry.mod_time);
        header.set_uid(0);
        header.set_gid(0);

        let reader = entry.payload.open()?;
        self.builder
            .append_data(&mut header, &entry.archive_path, reader)
            .map_err(|e| self.write_error(e))
    }

    fn entry_count(&self) -> usize {
        self.written.len()
    }

    fn finish(self) -> Result<()> {
        let output_path = self.output_path;
        let io_err = |e| ArchiverError::io(e, &output_path);
        let encoder = self.builder.into_inner().map_err(io_err)?;
        let mut inner = encoder.finish().map_err(io_err)?;
        inner.flush().map_err(io_err)?;
        debug!(path = %output_path.display(), entries = self.written.len(), "closed tar.gz archive");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::read::GzDecoder;
    use std::fs;
    use std::io::Read;
    use tempfile::tempdir;

    struct TarRecord {
        path: String,
        content: String,
        mode: u32,
        mtime: u64,
    }

    fn read_back(path: &Path) -> Result<Vec<TarRecord>, Box<dyn std::error::Error>> {
        let mut archive = tar::Archive::new(GzDecoder::new(File::open(path)?));
        let mut out = Vec::new();
        for entry in archive.entries()? {
            let mut entry = entry?;
            let mut content = String::new();
            entry.read_to_string(&mut content)?;
            out.push(TarRecord {
                path: entry.path()?.to_string_lossy().into_owned(),
                content,
                mode: entry.header().mode()?,
                mtime: entry.header().mtime()?,
            });
        }
        Ok(out)
    }

    #[test]
    fn test_content_defaults_to_0600_at_time_zero() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let out = dir.path().join("out.tar.gz");

        let mut tgz = TarGzArchiver::create(&out, ArchiveOptions::default())?;
        tgz.write_from_content(b"This is some content", "content.txt")?;
        tgz.finish()?;

        let records = read_back(&out)?;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].path, "content.txt");
        assert_eq!(records[0].content, "This is some content");
        assert_eq!(records[0].mode, 0o600);
        assert_eq!(records[0].mtime, 0);
        Ok(())
    }

    #[test]
    fn test_directory_walk_preserves_mtime() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let src = dir.path().join("src");
        fs::create_dir(&src)?;
        fs::write(src.join("a.txt"), "a")?;
        filetime::set_file_mtime(src.join("a.txt"), filetime::FileTime::from_unix_time(1_600_000_000, 0))?;
        let out = dir.path().join("out.tar.gz");

        let mut tgz = TarGzArchiver::create(&out, ArchiveOptions::default())?;
        tgz.write_from_directory(&src, &crate::matcher::ExclusionSet::empty(), false)?;
        tgz.finish()?;

        let records = read_back(&out)?;
        assert_eq!(records[0].path, "a.txt");
        assert_eq!(records[0].mtime, 1_600_000_000);
        Ok(())
    }

    #[test]
    fn test_output_file_mode_overrides_everything() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let out = dir.path().join("out.tar.gz");

        let options = ArchiveOptions { output_file_mode: Some(0o640), ..ArchiveOptions::default() };
        let mut tgz = TarGzArchiver::create(&out, options)?;
        tgz.write_from_named_content([("b.txt", b"b".to_vec()), ("a.txt", b"a".to_vec())])?;
        tgz.finish()?;

        let records = read_back(&out)?;
        let summary: Vec<(&str, &str, u32)> =
            records.iter().map(|r| (r.path.as_str(), r.content.as_str(), r.mode)).collect();
        assert_eq!(summary, vec![("a.txt", "a", 0o640), ("b.txt", "b", 0o640)]);
        Ok(())
    }

    #[test]
    fn test_gzip_header_is_stable() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let out = dir.path().join("out.tar.gz");

        let mut tgz = TarGzArchiver::create(&out, ArchiveOptions::default())?;
        tgz.write_from_content(b"x", "x.txt")?;
        tgz.finish()?;

        let bytes = fs::read(&out)?;
        assert_eq!(&bytes[..2], &[0x1f, 0x8b]);
        // MTIME field of the gzip member header.
        assert_eq!(&bytes[4..8], &[0, 0, 0, 0]);
        Ok(())
    }
}
