use std::io::{self, Write};
use std::path::Path;
use std::process::ExitCode;

use anyhow::Context;
use gcfkit_formats::cache::CacheOptions;

use super::open_archive;

pub fn handle(
    archive: &Path,
    path: &str,
    text: bool,
    options: &CacheOptions,
) -> anyhow::Result<ExitCode> {
    let mut cache = open_archive(archive, options)?;
    let mode = if text { "r" } else { "rb" };
    let mut handle = cache.open(path, mode)?;

    let stdout = io::stdout();
    let mut out = stdout.lock();
    io::copy(&mut handle, &mut out).with_context(|| format!("reading {path}"))?;
    out.flush()?;

    Ok(ExitCode::SUCCESS)
}
