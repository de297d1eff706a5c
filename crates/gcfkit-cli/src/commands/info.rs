use std::path::Path;
use std::process::ExitCode;

use anyhow::Context;
use gcfkit_formats::cache::{CacheFile, CacheOptions, CollectingObserver};

use crate::OutputFormat;
use crate::output::{
    OutputStyle, format_key_value, format_size, format_success, format_warning,
    print_section_header,
};

pub fn handle(
    archive: &Path,
    options: &CacheOptions,
    format: OutputFormat,
) -> anyhow::Result<ExitCode> {
    let mut observer = CollectingObserver::new();
    let cache = CacheFile::open_path_with_observer(archive, options.clone(), &mut observer)
        .with_context(|| format!("opening archive {}", archive.display()))?;

    let header = cache.header();
    let tree = cache.tree();
    let file_count = tree.iter().filter(|(_, node)| node.is_file()).count();
    let folder_count = tree.len() - file_count;
    let completeness = if cache.is_gcf() {
        Some(cache.completeness()?)
    } else {
        None
    };

    if format.is_json() {
        let value = serde_json::json!({
            "cache_type": format!("{:?}", cache.cache_type()),
            "application_id": header.application_id,
            "application_version": header.application_version,
            "format_version": header.format_version,
            "file_size": header.file_size,
            "sector_size": header.sector_size,
            "sector_count": header.sector_count,
            "files": file_count,
            "folders": folder_count,
            "total_size": tree.size(tree.root()),
            "minimum_footprint_files": cache.manifest().minimum_footprint.len(),
            "user_config_files": cache.manifest().user_config.len(),
            "completeness": completeness,
            "ncf_folder": cache.options().ncf_folder(),
            "advisories": observer
                .advisories
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>(),
        });
        println!("{}", format.render_json(&value)?);
        return Ok(ExitCode::SUCCESS);
    }

    let style = OutputStyle::new();
    print_section_header(&format!("{:?} archive", cache.cache_type()), &style);
    let rows = [
        ("Application", header.application_id.to_string()),
        ("Version", header.application_version.to_string()),
        ("Format version", header.format_version.to_string()),
        ("Declared size", format_size(u64::from(header.file_size))),
        ("Sector size", header.sector_size.to_string()),
        ("Sector count", header.sector_count.to_string()),
        ("Files", file_count.to_string()),
        ("Folders", folder_count.to_string()),
        ("Content size", format_size(tree.size(tree.root()))),
        (
            "Minimum footprint",
            cache.manifest().minimum_footprint.len().to_string(),
        ),
        ("User config", cache.manifest().user_config.len().to_string()),
    ];
    for (key, value) in rows {
        println!("{}", format_key_value(key, &value, &style));
    }
    if let Some(completeness) = completeness {
        println!(
            "{}",
            format_key_value("Complete", &format!("{:.1}%", completeness * 100.0), &style)
        );
    }
    if cache.is_ncf() {
        let folder = cache.options().ncf_folder().unwrap_or_default();
        let state = if cache.mirror().is_some() {
            "found"
        } else {
            "missing"
        };
        println!(
            "{}",
            format_key_value("Content folder", &format!("{folder} ({state})"), &style)
        );
    }

    if observer.advisories.is_empty() {
        println!("\n{}", format_success("No advisories", &style));
    } else {
        print_section_header("Advisories", &style);
        for advisory in &observer.advisories {
            println!("{}", format_warning(&advisory.to_string(), &style));
        }
    }

    Ok(ExitCode::SUCCESS)
}
