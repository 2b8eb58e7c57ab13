use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::Read;
use std::path::Path;

use flate2::read::GzDecoder;
use filetime::FileTime;
use reproarch::{build_archive, ArchiveRequest, ArchiverError, SourceBlock};
use tempfile::tempdir;

type TestResult = Result<(), Box<dyn std::error::Error>>;

/// name -> (content, mode)
fn zip_contents(path: &Path) -> Result<BTreeMap<String, (String, u32)>, Box<dyn std::error::Error>> {
    let mut archive = zip::ZipArchive::new(File::open(path)?)?;
    let mut out = BTreeMap::new();
    for i in 0..archive.len() {
        let mut file = archive.by_index(i)?;
        let mut content = String::new();
        file.read_to_string(&mut content)?;
        out.insert(file.name().to_string(), (content, file.unix_mode().unwrap_or(0) & 0o7777));
    }
    Ok(out)
}

fn tar_names(path: &Path) -> Result<Vec<String>, Box<dyn std::error::Error>> {
    let mut archive = tar::Archive::new(GzDecoder::new(File::open(path)?));
    let mut names = Vec::new();
    for entry in archive.entries()? {
        names.push(entry?.path()?.to_string_lossy().into_owned());
    }
    Ok(names)
}

/// name -> mode, for either format.
fn entry_modes(path: &Path) -> Result<BTreeMap<String, u32>, Box<dyn std::error::Error>> {
    if path.extension().is_some_and(|ext| ext == "zip") {
        return Ok(zip_contents(path)?.into_iter().map(|(name, (_, mode))| (name, mode)).collect());
    }
    let mut archive = tar::Archive::new(GzDecoder::new(File::open(path)?));
    let mut out = BTreeMap::new();
    for entry in archive.entries()? {
        let entry = entry?;
        out.insert(entry.path()?.to_string_lossy().into_owned(), entry.header().mode()? & 0o7777);
    }
    Ok(out)
}

fn fixtures(root: &Path) -> std::io::Result<()> {
    fs::create_dir_all(root)?;
    fs::write(root.join("file1.txt"), "This is file 1")?;
    fs::write(root.join("file2.txt"), "This is file 2")?;
    fs::write(root.join("file3.txt"), "This is file 3")
}

fn content_request(output: &Path) -> ArchiveRequest {
    let mut request = ArchiveRequest::new("zip", output);
    request.source_content = Some("This is some content".into());
    request.source_content_filename = Some("content.txt".into());
    request
}

#[test]
fn content_zip_is_byte_identical_across_runs() -> TestResult {
    let dir = tempdir()?;
    let first = build_archive(&content_request(&dir.path().join("a/content.zip")))?;
    let second = build_archive(&content_request(&dir.path().join("b/content.zip")))?;

    assert_eq!(fs::read(&first.output_path)?, fs::read(&second.output_path)?);
    assert_eq!(first.output_sha256, second.output_sha256);
    assert_eq!(first.output_base64sha512, second.output_base64sha512);
    Ok(())
}

#[test]
fn fixture_exclusion_keeps_file1_and_file3() -> TestResult {
    let dir = tempdir()?;
    let src = dir.path().join("fixtures");
    fixtures(&src)?;

    for format in ["zip", "tar.gz"] {
        let out = dir.path().join(format!("fixtures.{format}"));
        let mut request = ArchiveRequest::new(format, &out);
        request.source_dir = Some(src.clone());
        request.excludes = vec!["file2.txt".into()];

        let output = build_archive(&request)?;
        assert_eq!(output.entry_count, 2);

        let names: Vec<String> = if format == "zip" {
            zip_contents(&out)?.into_keys().collect()
        } else {
            tar_names(&out)?
        };
        assert_eq!(names, vec!["file1.txt", "file3.txt"], "{format}");
    }
    Ok(())
}

#[test]
fn zip_ignores_source_mtimes() -> TestResult {
    let dir = tempdir()?;
    let src = dir.path().join("fixtures");
    fixtures(&src)?;
    let out = dir.path().join("out.zip");
    let mut request = ArchiveRequest::new("zip", &out);
    request.source_dir = Some(src.clone());

    let before = build_archive(&request)?;
    for name in ["file1.txt", "file2.txt", "file3.txt"] {
        filetime::set_file_mtime(src.join(name), FileTime::from_unix_time(2_000_000_000, 0))?;
    }
    let after = build_archive(&request)?;

    assert_eq!(before.output_sha256, after.output_sha256);
    Ok(())
}

#[test]
fn tar_walk_is_idempotent() -> TestResult {
    let dir = tempdir()?;
    let src = dir.path().join("tree");
    fixtures(&src.join("nested/deeper"))?;
    fs::write(src.join("top.txt"), "top")?;

    let mut request = ArchiveRequest::new("tar.gz", dir.path().join("one.tar.gz"));
    request.source_dir = Some(src.clone());
    let one = build_archive(&request)?;
    request.output_path = dir.path().join("two.tar.gz");
    let two = build_archive(&request)?;

    assert_eq!(fs::read(&one.output_path)?, fs::read(&two.output_path)?);
    assert_eq!(
        tar_names(&one.output_path)?,
        vec![
            "nested/deeper/file1.txt",
            "nested/deeper/file2.txt",
            "nested/deeper/file3.txt",
            "top.txt",
        ]
    );
    Ok(())
}

#[test]
fn named_sources_are_written_in_sorted_order() -> TestResult {
    let dir = tempdir()?;
    let out = dir.path().join("out.tar.gz");
    let mut request = ArchiveRequest::new("tar.gz", &out);
    request.source = ["zeta.txt", "alpha/b.txt", "alpha.txt", "Beta.txt"]
        .iter()
        .map(|name| SourceBlock { filename: name.to_string(), content: format!("body of {name}") })
        .collect();

    build_archive(&request)?;
    assert_eq!(tar_names(&out)?, vec!["Beta.txt", "alpha.txt", "alpha/b.txt", "zeta.txt"]);
    Ok(())
}

#[test]
fn output_file_mode_applies_to_every_source_kind() -> TestResult {
    let dir = tempdir()?;
    let src = dir.path().join("fixtures");
    fixtures(&src)?;

    for format in ["zip", "tar.gz"] {
        let out = |name: &str| dir.path().join(format!("{name}.{format}"));
        let mut requests = Vec::new();
        let mut by_dir = ArchiveRequest::new(format, out("dir"));
        by_dir.source_dir = Some(src.clone());
        requests.push(by_dir);
        let mut by_file = ArchiveRequest::new(format, out("file"));
        by_file.source_file = Some(src.join("file1.txt"));
        requests.push(by_file);
        let mut by_content = content_request(&out("content"));
        by_content.format = format.into();
        requests.push(by_content);
        let mut by_blocks = ArchiveRequest::new(format, out("blocks"));
        by_blocks.source = vec![SourceBlock { filename: "x.sh".into(), content: "#!/bin/sh".into() }];
        requests.push(by_blocks);

        for mut request in requests {
            request.output_file_mode = Some("0755".into());
            let output = build_archive(&request)?;
            let modes = entry_modes(&output.output_path)?;
            assert!(!modes.is_empty());
            for (name, mode) in modes {
                assert_eq!(mode, 0o755, "{name} in {}", output.output_path.display());
            }
        }
    }
    Ok(())
}

#[test]
fn output_file_mode_is_stored_identically_by_both_formats() -> TestResult {
    let dir = tempdir()?;

    for format in ["zip", "tar.gz"] {
        let mut request = content_request(&dir.path().join(format!("open.{format}")));
        request.format = format.into();
        request.output_file_mode = Some("0777".into());
        let output = build_archive(&request)?;
        assert_eq!(entry_modes(&output.output_path)?.get("content.txt"), Some(&0o777), "{format}");

        let out = dir.path().join(format!("setuid.{format}"));
        let mut request = content_request(&out);
        request.format = format.into();
        request.output_file_mode = Some("4755".into());
        let err = build_archive(&request).unwrap_err();
        assert!(matches!(err, ArchiverError::InvalidFileMode(_)), "{format}: {err:?}");
        assert!(!out.exists());
    }
    Ok(())
}

#[test]
fn output_inside_source_dir_is_not_archived() -> TestResult {
    let dir = tempdir()?;
    let src = dir.path().join("fixtures");
    fixtures(&src)?;
    let out = src.join("self.zip");
    let mut request = ArchiveRequest::new("zip", &out);
    request.source_dir = Some(src);

    let output = build_archive(&request)?;
    assert_eq!(output.entry_count, 3);
    assert!(!zip_contents(&out)?.contains_key("self.zip"));
    Ok(())
}

#[test]
fn empty_directory_is_an_error() -> TestResult {
    let dir = tempdir()?;
    let src = dir.path().join("empty");
    fs::create_dir(&src)?;
    let out = dir.path().join("out.zip");
    let mut request = ArchiveRequest::new("zip", &out);
    request.source_dir = Some(src);

    let err = build_archive(&request).unwrap_err();
    assert!(matches!(err, ArchiverError::EmptyArchive { .. }), "{err:?}");
    assert!(!out.exists());
    Ok(())
}

#[cfg(unix)]
mod symlinks {
    use super::*;
    use std::os::unix::fs::symlink;

    fn linked_root(root: &Path) -> std::io::Result<()> {
        fs::create_dir_all(root.join("realdir"))?;
        fs::write(root.join("realdir/a.txt"), "a")?;
        symlink("realdir", root.join("linkdir"))
    }

    #[test]
    fn symlinked_directory_is_expanded_under_link_name() -> TestResult {
        let dir = tempdir()?;
        let root = dir.path().join("root");
        linked_root(&root)?;
        let out = dir.path().join("out.zip");
        let mut request = ArchiveRequest::new("zip", &out);
        request.source_dir = Some(root);

        build_archive(&request)?;
        let names: Vec<String> = zip_contents(&out)?.into_keys().collect();
        assert_eq!(names, vec!["linkdir/a.txt", "realdir/a.txt"]);
        Ok(())
    }

    #[test]
    fn exclude_symlink_directories_fails_the_build() -> TestResult {
        let dir = tempdir()?;
        let root = dir.path().join("root");
        linked_root(&root)?;
        let out = dir.path().join("out.zip");
        let mut request = ArchiveRequest::new("zip", &out);
        request.source_dir = Some(root);
        request.exclude_symlink_directories = true;

        assert!(build_archive(&request).is_err());
        assert!(!out.exists());
        Ok(())
    }

    #[test]
    fn symlinked_file_is_archived_with_target_content() -> TestResult {
        let dir = tempdir()?;
        let root = dir.path().join("root");
        fs::create_dir(&root)?;
        fs::write(dir.path().join("outside.txt"), "outside")?;
        symlink(dir.path().join("outside.txt"), root.join("inside.txt"))?;
        let out = dir.path().join("out.zip");
        let mut request = ArchiveRequest::new("zip", &out);
        request.source_dir = Some(root);

        build_archive(&request)?;
        let contents = zip_contents(&out)?;
        assert_eq!(contents.get("inside.txt").map(|(c, _)| c.as_str()), Some("outside"));
        Ok(())
    }
}
