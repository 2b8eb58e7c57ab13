//! # reproarch Core Library
//!
//! Builds byte-for-byte reproducible ZIP and gzip-compressed TAR archives from
//! inline content, a single file, or a directory tree.
//!
//! It is used by the `reproarch` command-line application, and its public API
//! can be embedded by any host that describes archives declaratively.
//!
//! ## Key Modules
//!
//! - [`matcher`]: glob exclusion patterns matched on archive paths.
//! - [`symlink`]: bounded symlink resolution.
//! - [`walk`]: deterministic directory traversal with symlinked-directory expansion.
//! - [`archive`]: the ZIP and TAR+GZIP writers and their metadata policies.
//! - [`pipeline`]: request -> archive -> size and checksums.
//!
//! ## Examples
//!
//! ```no_run
//! use reproarch::{build_archive, ArchiveRequest};
//!
//! let mut request = ArchiveRequest::new("zip", "dist/content.zip");
//! request.source_content = Some("This is some content".into());
//! request.source_content_filename = Some("content.txt".into());
//!
//! let output = build_archive(&request)?;
//! println!("{} bytes, sha256 {}", output.output_size, output.output_sha256);
//! # Ok::<(), reproarch::ArchiverError>(())
//! ```

pub mod archive;
pub mod checksum;
pub mod cli;
pub mod cli_runner;
pub mod common;
pub mod config;
pub mod error;
pub mod matcher;
pub mod pipeline;
pub mod symlink;
pub mod walk;

// Cross-platform filesystem metadata helpers
pub mod fsx;

pub use archive::{ArchiveFormat, ArchiveOptions, ArchiveWriter, Archiver};
pub use common::{ArchiveEntry, Payload};
pub use config::{ArchiveRequest, BuildPlan, EntrySource, SourceBlock};
pub use error::ArchiverError;
pub use matcher::ExclusionSet;
pub use pipeline::{build_archive, ArchiveOutput};
