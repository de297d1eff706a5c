use std::path::Path;
use std::process::ExitCode;

use gcfkit_formats::cache::{CacheOptions, DirectoryTree, FileFilter, NodeId};
use tracing::info;

use super::open_archive;
use crate::OutputFormat;
use crate::output::{OutputStyle, format_size, format_success, format_warning};

/// What to extract and how to lay it out
#[derive(Debug, Clone, Copy, Default)]
pub struct Selection<'a> {
    /// Folder or file inside the archive, root when unset
    pub path: Option<&'a str>,
    /// Minimum-footprint extraction
    pub minimum: bool,
    /// Recreate the archive folder layout
    pub keep_structure: bool,
    /// Substring the archive path must contain
    pub contains: Option<&'a str>,
}

pub fn handle(
    archive: &Path,
    destination: &Path,
    selection: &Selection<'_>,
    options: &CacheOptions,
    format: OutputFormat,
) -> anyhow::Result<ExitCode> {
    let mut cache = open_archive(archive, options)?;

    let report = if selection.minimum {
        cache.extract_minimum_footprint(destination, selection.keep_structure)?
    } else {
        let start = match selection.path {
            Some(path) => cache.tree().find(path)?,
            None => NodeId::ROOT,
        };
        let needle = selection.contains.map(str::to_lowercase);
        let matches_needle = |tree: &DirectoryTree, id: NodeId| {
            needle
                .as_deref()
                .is_some_and(|needle| tree.path(id).to_lowercase().contains(needle))
        };
        let filter = needle
            .is_some()
            .then_some(&matches_needle as FileFilter<'_>);
        cache.extract(start, destination, true, selection.keep_structure, filter)?
    };
    info!(
        "Extracted {} files ({} bytes) to {}",
        report.extracted.len(),
        report.bytes_written,
        destination.display()
    );

    if format.is_json() {
        let value = serde_json::json!({
            "extracted": report.extracted,
            "bytes_written": report.bytes_written,
            "failures": report
                .failures
                .iter()
                .map(|failure| serde_json::json!({
                    "path": failure.path,
                    "error": failure.error.to_string(),
                }))
                .collect::<Vec<_>>(),
        });
        println!("{}", format.render_json(&value)?);
    } else {
        let style = OutputStyle::new();
        println!(
            "{}",
            format_success(
                &format!(
                    "Extracted {} files ({})",
                    report.extracted.len(),
                    format_size(report.bytes_written)
                ),
                &style
            )
        );
        for failure in &report.failures {
            eprintln!("{}", format_warning(&format!("failed: {failure}"), &style));
        }
    }

    if report.is_success() {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::FAILURE)
    }
}
