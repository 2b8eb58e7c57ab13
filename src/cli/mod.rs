use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Log every entry as it is written or skipped (overrides RUST_LOG).
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Clone, Debug)]
pub enum Commands {
    /// Build a reproducible archive from exactly one source.
    #[command(alias = "c")]
    Create {
        /// Archive format: "zip" or "tar.gz".
        #[arg(long = "type", default_value = "zip")]
        format: String,

        /// The path for the output archive file. Missing parent directories are created.
        #[arg(short, long)]
        output: PathBuf,

        /// Archive every file under this directory.
        #[arg(long)]
        source_dir: Option<PathBuf>,

        /// Glob pattern matched against archive paths; matching entries are left out. Repeatable.
        #[arg(long = "exclude", requires = "source_dir")]
        excludes: Vec<String>,

        /// Do not expand symlinked directories; reading them fails the build instead.
        #[arg(long, requires = "source_dir")]
        exclude_symlink_directories: bool,

        /// Archive a single file under its base name.
        #[arg(long)]
        source_file: Option<PathBuf>,

        /// Archive this text as a single entry (needs --content-filename).
        #[arg(long, requires = "content_filename")]
        content: Option<String>,

        /// Archive path of the --content entry.
        #[arg(long, requires = "content")]
        content_filename: Option<String>,

        /// Named entry as NAME=FILE; the file's text becomes the entry's content. Repeatable.
        #[arg(long = "source", value_parser = parse_source_spec)]
        sources: Vec<SourceSpec>,

        /// Octal permission bits stored on every entry (e.g. 0644).
        #[arg(long)]
        output_file_mode: Option<String>,

        /// Keep ZIP entries deflated with the DOS-epoch timestamp instead of stored at 1981-01-01.
        #[arg(long = "no-normalize", action = clap::ArgAction::SetFalse, default_value_t = true)]
        normalize: bool,
    },

    /// Build an archive from a JSON request document.
    #[command(alias = "a")]
    Apply {
        /// The request file (same field names as the host schema).
        #[arg(required = true)]
        request: PathBuf,
    },
}

/// A `--source NAME=FILE` argument.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SourceSpec {
    pub name: String,
    pub file: PathBuf,
}

fn parse_source_spec(raw: &str) -> Result<SourceSpec, String> {
    match raw.split_once('=') {
        Some((name, file)) if !name.is_empty() && !file.is_empty() => Ok(SourceSpec {
            name: name.to_string(),
            file: PathBuf::from(file),
        }),
        _ => Err(format!("expected NAME=FILE, got '{}'", raw)),
    }
}

/// Parses command-line arguments using `clap`.
///
/// This is the main entry point for the CLI logic.
pub fn run() -> Result<Args, Box<dyn std::error::Error>> {
    Ok(Args::try_parse()?)
}
