//! Command-line surface of the `psarc` binary.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "psarc", author, version, about = "PSARC archive tool", long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Clone, Debug)]
pub enum Commands {
    /// Create a new archive from files matching the given patterns.
    #[command(alias = "c")]
    Create {
        /// The path for the output archive file.
        archive: PathBuf,

        /// One or more file patterns (globs, braces and ~ are expanded).
        #[arg(required = true)]
        patterns: Vec<String>,

        /// Block size in bytes.
        #[arg(long, default_value_t = crate::common::DEFAULT_BLOCK_SIZE)]
        block_size: u64,

        /// Compress blocks with zlib.
        #[arg(long)]
        zlib: bool,

        /// Compress blocks with LZMA.
        #[arg(long, conflicts_with = "zlib")]
        lzma: bool,

        /// Compression level (zlib 1-9, lzma preset 0-9).
        #[arg(long, value_parser = clap::value_parser!(u32).range(0..=9))]
        level: Option<u32>,

        /// Extreme compression (lzma only).
        #[arg(long)]
        extreme: bool,

        /// Match patterns case-insensitively and mark the archive as
        /// case-insensitive.
        #[arg(long, short = 'I')]
        ignore_case: bool,

        /// Store absolute paths in the archive.
        #[arg(long, short = 'A')]
        absolute_paths: bool,

        /// Base directory for source files.
        #[arg(long, short = 's')]
        source_dir: Option<PathBuf>,

        /// Recurse into matched directories.
        #[arg(long, short = 'r')]
        recursive: bool,

        /// Store only basenames, dropping directory components.
        #[arg(long, short = 'T')]
        trim_paths: bool,

        /// Overwrite the archive if it already exists.
        #[arg(long, short = 'y')]
        overwrite: bool,

        /// Number of compression threads. 0 compresses synchronously.
        /// [default: CPU count]
        #[arg(long, short = 'n')]
        threads: Option<usize>,

        /// Report format.
        #[arg(long, short = 'o', value_enum, default_value_t = OutputFormat::Standard)]
        output_format: OutputFormat,

        /// Report each file in detail.
        #[arg(long, short = 'v')]
        verbose: bool,
    },

    /// Extract files from an archive.
    #[command(alias = "x")]
    Extract {
        /// The archive file to extract.
        archive: PathBuf,

        /// Specific file names to extract. If empty, everything is extracted.
        patterns: Vec<String>,

        /// Directory where extracted files are placed.
        #[arg(long, short = 't')]
        target_dir: Option<PathBuf>,

        /// Extract basenames only, without creating directories.
        #[arg(long, short = 'T')]
        trim_paths: bool,

        /// Overwrite existing files.
        #[arg(long, short = 'y')]
        overwrite: bool,

        /// Silently skip files that already exist instead of failing them.
        #[arg(long, short = 'S')]
        skip_existing_files: bool,

        /// Report format.
        #[arg(long, short = 'o', value_enum, default_value_t = OutputFormat::Standard)]
        output_format: OutputFormat,

        /// Report each file in detail.
        #[arg(long, short = 'v')]
        verbose: bool,
    },

    /// List the contents of an archive.
    #[command(alias = "l")]
    List {
        /// The archive file to list.
        archive: PathBuf,

        /// Report format.
        #[arg(long, short = 'o', value_enum, default_value_t = OutputFormat::Standard)]
        output_format: OutputFormat,

        /// Include digests, methods and sizes per file.
        #[arg(long, short = 'v')]
        verbose: bool,
    },

    /// Show archive totals and flags.
    #[command(alias = "i")]
    Info {
        /// The archive file to inspect.
        archive: PathBuf,

        /// Report format.
        #[arg(long, short = 'o', value_enum, default_value_t = OutputFormat::Standard)]
        output_format: OutputFormat,
    },
}

/// Report output formats.
#[derive(ValueEnum, Copy, Clone, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    Standard,
    Json,
    Csv,
    Xml,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            OutputFormat::Standard => "standard",
            OutputFormat::Json => "json",
            OutputFormat::Csv => "csv",
            OutputFormat::Xml => "xml",
        })
    }
}
