//! Command handlers

pub mod blob;
pub mod cat;
pub mod extract;
pub mod info;
pub mod list;
pub mod registry;

use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::process::ExitCode;

use anyhow::Context;
use gcfkit_formats::cache::{CacheFile, CacheOptions};

use crate::{Commands, OutputFormat};

/// Run a command
///
/// Returns the process exit code; commands that partially succeed (such as
/// extraction with failed files) report failure through it.
pub fn handle(
    cmd: Commands,
    options: &CacheOptions,
    format: OutputFormat,
) -> anyhow::Result<ExitCode> {
    match cmd {
        Commands::Info { archive } => info::handle(&archive, options, format),
        Commands::List { archive, path } => {
            list::handle(&archive, path.as_deref(), options, format)
        }
        Commands::Extract {
            archive,
            destination,
            path,
            minimum,
            flat,
            contains,
        } => extract::handle(
            &archive,
            &destination,
            &extract::Selection {
                path: path.as_deref(),
                minimum,
                keep_structure: !flat,
                contains: contains.as_deref(),
            },
            options,
            format,
        ),
        Commands::Cat {
            archive,
            path,
            text,
        } => cat::handle(&archive, &path, text, options),
        Commands::Blob {
            file,
            no_recurse,
            max_depth,
        } => blob::handle(&file, !no_recurse, max_depth, format),
        Commands::Registry { file, path } => registry::handle(&file, path.as_deref(), format),
    }
}

/// Open and parse an archive, attaching its content folder when present
pub(crate) fn open_archive(
    path: &Path,
    options: &CacheOptions,
) -> anyhow::Result<CacheFile<BufReader<File>>> {
    CacheFile::open_path(path, options.clone())
        .with_context(|| format!("opening archive {}", path.display()))
}
