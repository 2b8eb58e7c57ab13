//! Declarative build requests.
//!
//! An [`ArchiveRequest`] is what the host hands over: a format, exactly one
//! entry source and an output path. [`ArchiveRequest::validate`] checks it and
//! compiles it into a [`BuildPlan`] the pipeline can execute.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::archive::{ArchiveFormat, ArchiveOptions};
use crate::error::{ArchiverError, Result};
use crate::matcher::ExclusionSet;

/// One `{filename, content}` pair of a multi-source request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SourceBlock {
    pub filename: String,
    pub content: String,
}

/// A build request as supplied by the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ArchiveRequest {
    /// `"zip"` or `"tar.gz"`.
    #[serde(rename = "type")]
    pub format: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub source: Vec<SourceBlock>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_content_filename: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_file: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_dir: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub excludes: Vec<String>,
    #[serde(default)]
    pub exclude_symlink_directories: bool,
    pub output_path: PathBuf,
    /// Octal permission string applied to every entry, e.g. `"0644"`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_file_mode: Option<String>,
    /// ZIP only. See [`ArchiveOptions::normalize_metadata`].
    #[serde(default = "default_normalize")]
    pub normalize_metadata: bool,
}

fn default_normalize() -> bool {
    true
}

/// The entry source a request selected.
#[derive(Debug, Clone)]
pub enum EntrySource {
    /// Explicit named blocks; written in sorted name order.
    Named(Vec<(String, Vec<u8>)>),
    Content { content: Vec<u8>, filename: String },
    File(PathBuf),
    Directory {
        root: PathBuf,
        excludes: ExclusionSet,
        exclude_symlink_directories: bool,
    },
}

impl EntrySource {
    pub fn kind(&self) -> &'static str {
        match self {
            EntrySource::Named(_) => "source",
            EntrySource::Content { .. } => "source_content",
            EntrySource::File(_) => "source_file",
            EntrySource::Directory { .. } => "source_dir",
        }
    }
}

/// A validated request, ready to build.
#[derive(Debug, Clone)]
pub struct BuildPlan {
    pub format: ArchiveFormat,
    pub source: EntrySource,
    pub output_path: PathBuf,
    pub options: ArchiveOptions,
}

impl ArchiveRequest {
    /// A request for `format` writing to `output_path` with no source selected yet.
    pub fn new(format: impl Into<String>, output_path: impl Into<PathBuf>) -> Self {
        Self {
            format: format.into(),
            source: Vec::new(),
            source_content: None,
            source_content_filename: None,
            source_file: None,
            source_dir: None,
            excludes: Vec::new(),
            exclude_symlink_directories: false,
            output_path: output_path.into(),
            output_file_mode: None,
            normalize_metadata: true,
        }
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let json = fs::read_to_string(path).map_err(|e| ArchiverError::io(e, path))?;
        Self::from_json(&json)
    }

    /// Checks the request and compiles its exclusion patterns. Nothing is
    /// written to disk here.
    pub fn validate(&self) -> Result<BuildPlan> {
        let format: ArchiveFormat = self.format.parse()?;

        if self.output_path.as_os_str().is_empty() {
            return Err(ArchiverError::InvalidRequest("output_path must not be empty".into()));
        }

        let has_content = self.source_content.is_some() || self.source_content_filename.is_some();
        let selected = [
            !self.source.is_empty(),
            has_content,
            self.source_file.is_some(),
            self.source_dir.is_some(),
        ]
        .iter()
        .filter(|s| **s)
        .count();
        if selected != 1 {
            return Err(ArchiverError::InvalidRequest(format!(
                "exactly one of source, source_content, source_file or source_dir must be set ({} given)",
                selected
            )));
        }

        if self.source_dir.is_none() && (!self.excludes.is_empty() || self.exclude_symlink_directories) {
            return Err(ArchiverError::InvalidRequest(
                "excludes and exclude_symlink_directories require source_dir".into(),
            ));
        }

        let source = if let Some(root) = &self.source_dir {
            EntrySource::Directory {
                root: root.clone(),
                excludes: ExclusionSet::new(self.excludes.as_slice())?,
                exclude_symlink_directories: self.exclude_symlink_directories,
            }
        } else if let Some(file) = &self.source_file {
            EntrySource::File(file.clone())
        } else if has_content {
            match (&self.source_content, &self.source_content_filename) {
                (Some(content), Some(filename)) if !filename.is_empty() => EntrySource::Content {
                    content: content.clone().into_bytes(),
                    filename: filename.clone(),
                },
                _ => {
                    return Err(ArchiverError::InvalidRequest(
                        "source_content and a non-empty source_content_filename must be set together".into(),
                    ))
                }
            }
        } else {
            if let Some(block) = self.source.iter().find(|b| b.filename.is_empty()) {
                return Err(ArchiverError::InvalidRequest(format!(
                    "source block with content of {} byte(s) has an empty filename",
                    block.content.len()
                )));
            }
            EntrySource::Named(
                self.source
                    .iter()
                    .map(|b| (b.filename.clone(), b.content.clone().into_bytes()))
                    .collect(),
            )
        };

        let output_file_mode = self.output_file_mode.as_deref().map(parse_file_mode).transpose()?;

        Ok(BuildPlan {
            format,
            source,
            output_path: self.output_path.clone(),
            options: ArchiveOptions { output_file_mode, normalize_metadata: self.normalize_metadata },
        })
    }
}

/// Parses an octal permission string (`"0644"`, `"755"`, `"0o600"`).
///
/// Only the nine `rwx` bits are accepted. ZIP external attributes cannot carry
/// setuid, setgid or sticky, so those would be stored differently per format.
pub fn parse_file_mode(mode: &str) -> Result<u32> {
    let trimmed = mode.trim();
    let digits = trimmed.strip_prefix("0o").unwrap_or(trimmed);
    match u32::from_str_radix(digits, 8) {
        Ok(bits) if !digits.is_empty() && bits <= 0o777 => Ok(bits),
        _ => Err(ArchiverError::InvalidFileMode(mode.to_string())),
    }
}
