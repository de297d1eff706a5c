use std::path::Path;
use std::process::ExitCode;

use comfy_table::Cell;
use gcfkit_formats::cache::{CacheOptions, DirectoryTree, NodeId};

use super::open_archive;
use crate::OutputFormat;
use crate::output::{OutputStyle, create_table, numeric_cell};

/// Nodes below `start` in depth-first manifest order, `start` excluded
fn walk(tree: &DirectoryTree, start: NodeId) -> Vec<NodeId> {
    let mut out = Vec::new();
    let mut stack: Vec<NodeId> = tree.children(start).iter().rev().copied().collect();
    while let Some(id) = stack.pop() {
        out.push(id);
        stack.extend(tree.children(id).iter().rev());
    }
    out
}

pub fn handle(
    archive: &Path,
    path: Option<&str>,
    options: &CacheOptions,
    format: OutputFormat,
) -> anyhow::Result<ExitCode> {
    let cache = open_archive(archive, options)?;
    let tree = cache.tree();
    let start = match path {
        Some(path) => tree.find(path)?,
        None => tree.root(),
    };
    let nodes = if tree[start].is_file() {
        vec![start]
    } else {
        walk(tree, start)
    };

    if format.is_json() {
        let entries: Vec<_> = nodes
            .iter()
            .map(|&id| {
                let node = &tree[id];
                serde_json::json!({
                    "path": tree.path(id),
                    "folder": node.is_folder(),
                    "size": tree.size(id),
                    "available": node.file().map(|info| info.available_size),
                    "fragmented": node.file().map(|info| info.is_fragmented),
                    "flags": node.flags.names(),
                    "user_config": node.is_user_config(),
                    "minimum_footprint": node.is_minimum_footprint(),
                })
            })
            .collect();
        println!(
            "{}",
            format.render_json(&serde_json::Value::Array(entries))?
        );
        return Ok(ExitCode::SUCCESS);
    }

    let style = OutputStyle::new();
    let mut table = create_table(&["Path", "Size", "Available", "Flags"], &style);
    for id in nodes {
        let node = &tree[id];
        let mut path = tree.path(id);
        if node.is_folder() {
            path.push('\\');
        }

        let mut flags = node.flags.names();
        if node.is_user_config() && !flags.contains(&"user-config") {
            flags.push("user-config");
        }
        if node.is_minimum_footprint() {
            flags.push("minimum-footprint");
        }
        if node.file().is_some_and(|info| info.is_fragmented) {
            flags.push("fragmented");
        }

        let available = match node.file() {
            Some(info) if cache.is_gcf() => numeric_cell(info.available_size),
            _ => Cell::new(""),
        };
        table.add_row(vec![
            Cell::new(path),
            numeric_cell(tree.size(id)),
            available,
            Cell::new(flags.join(", ")),
        ]);
    }
    println!("{table}");

    Ok(ExitCode::SUCCESS)
}
