//! Runs a parsed command line: sets up logging, turns the arguments into an
//! [`ArchiveRequest`], builds it and prints the [`ArchiveOutput`] as JSON.
//!
//! [`ArchiveOutput`]: crate::pipeline::ArchiveOutput

use std::fs;

use tracing_subscriber::EnvFilter;

use crate::cli::{self, Commands, SourceSpec};
use crate::config::{ArchiveRequest, SourceBlock};
use crate::error::{ArchiverError, Result};
use crate::pipeline;

/// Public entry for running CLI logic.
pub fn run_cli_app() -> Result<(), Box<dyn std::error::Error>> {
    let args = cli::run()?;
    init_logging(args.verbose);

    let request = match args.command {
        Commands::Apply { request } => ArchiveRequest::from_path(&request)?,
        create @ Commands::Create { .. } => create_request(create)?,
    };

    let output = pipeline::build_archive(&request)?;
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

/// Logs go to stderr so stdout stays a single JSON document.
fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    // A subscriber may already be installed when embedded; keep that one.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Maps `create` arguments onto the same request shape `apply` reads from JSON.
pub fn create_request(command: Commands) -> Result<ArchiveRequest> {
    let Commands::Create {
        format,
        output,
        source_dir,
        excludes,
        exclude_symlink_directories,
        source_file,
        content,
        content_filename,
        sources,
        output_file_mode,
        normalize,
    } = command
    else {
        return Err(ArchiverError::InvalidRequest("expected the create command".into()));
    };

    let mut request = ArchiveRequest::new(format, output);
    request.source = sources.iter().map(source_block).collect::<Result<_>>()?;
    request.source_content = content;
    request.source_content_filename = content_filename;
    request.source_file = source_file;
    request.source_dir = source_dir;
    request.excludes = excludes;
    request.exclude_symlink_directories = exclude_symlink_directories;
    request.output_file_mode = output_file_mode;
    request.normalize_metadata = normalize;
    Ok(request)
}

fn source_block(spec: &SourceSpec) -> Result<SourceBlock> {
    let content = fs::read_to_string(&spec.file).map_err(|e| ArchiverError::io(e, &spec.file))?;
    Ok(SourceBlock { filename: spec.name.clone(), content })
}
