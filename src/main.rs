//! Main entry point for the psarc CLI app.

use std::fs;
use std::process::ExitCode;

use clap::Parser;

use psarc::cli::{Args, Commands};
use psarc::codec::CodecParams;
use psarc::common::{ArchiveFlags, Codec, APP_NAME};
use psarc::create::{self, CreateOptions};
use psarc::extract::{Archive, ExtractOptions};
use psarc::fileset::{FileSet, MatchFlags};
use psarc::wire;

fn main() -> ExitCode {
    let args = Args::parse();
    match run(args.command) {
        Ok(code) => code,
        Err(message) => {
            eprintln!("{APP_NAME}: {message}");
            ExitCode::FAILURE
        }
    }
}

fn run(command: Commands) -> Result<ExitCode, String> {
    match command {
        Commands::Create {
            archive,
            patterns,
            block_size,
            zlib,
            lzma,
            level,
            extreme,
            ignore_case,
            absolute_paths,
            source_dir,
            recursive,
            trim_paths,
            overwrite,
            threads,
            output_format,
            verbose,
        } => {
            let codec = if lzma {
                Codec::Lzma
            } else if zlib {
                Codec::Zlib
            } else {
                Codec::Store
            };
            if wire::item_width(block_size).is_none() {
                return Err(format!("invalid block size {block_size}"));
            }
            if level == Some(0) && codec != Codec::Lzma {
                return Err("compression level 0 is only valid for lzma".into());
            }
            if extreme && codec != Codec::Lzma {
                return Err("extreme compression is only valid for lzma".into());
            }

            if let Some(parent) = archive.parent() {
                if !parent.as_os_str().is_empty() {
                    fs::create_dir_all(parent)
                        .map_err(|e| format!("cannot create '{}': {e}", parent.display()))?;
                }
            }

            let mut files = FileSet::new(source_dir);
            let match_flags = MatchFlags { recursive, ignore_case };
            for pattern in &patterns {
                files.add_pattern(pattern, match_flags);
            }

            let opts = CreateOptions {
                params: CodecParams::new(codec, level, extreme),
                block_size,
                flags: ArchiveFlags { ignore_case, absolute_paths },
                trim_paths,
                overwrite,
                threads: threads.unwrap_or_else(num_cpus::get),
                verbose,
                format: output_format,
            };
            create::create_archive(&archive, &files, &opts).map_err(|e| e.to_string())?;
            Ok(ExitCode::SUCCESS)
        }

        Commands::Extract {
            archive,
            patterns,
            target_dir,
            trim_paths,
            overwrite,
            skip_existing_files,
            output_format,
            verbose,
        } => {
            if let Some(dir) = &target_dir {
                fs::create_dir_all(dir)
                    .map_err(|e| format!("cannot create '{}': {e}", dir.display()))?;
            }
            let mut archive = Archive::open(&archive).map_err(|e| e.to_string())?;
            let opts = ExtractOptions {
                target_dir,
                trim_paths,
                overwrite,
                skip_existing: skip_existing_files,
                verbose,
                format: output_format,
            };
            let stats = archive.extract(&patterns, &opts);
            Ok(if stats.errors > 0 { ExitCode::from(2) } else { ExitCode::SUCCESS })
        }

        Commands::List { archive, output_format, verbose } => {
            let archive = Archive::open(&archive).map_err(|e| e.to_string())?;
            archive.list(output_format, verbose);
            Ok(ExitCode::SUCCESS)
        }

        Commands::Info { archive, output_format } => {
            let archive = Archive::open(&archive).map_err(|e| e.to_string())?;
            archive.info(output_format);
            Ok(ExitCode::SUCCESS)
        }
    }
}
