//! Writing archive content to disk
//!
//! A failure on one file is recorded in the [`ExtractReport`] and the
//! remaining files are still written. Only a destination that cannot be
//! created aborts the whole extraction.

use std::fmt;
use std::fs::{self, File};
use std::io::{BufWriter, Read, Seek, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, trace, warn};

use super::directory::{DirectoryTree, NodeId};
use super::error::{CacheError, CacheResult};
use super::stream::{OpenMode, SectorStream};
use super::CacheFile;

/// Bytes copied per read while extracting
const COPY_CHUNK_SIZE: usize = 1024 * 1024;

/// Predicate selecting which files to extract
pub type FileFilter<'f> = &'f dyn Fn(&DirectoryTree, NodeId) -> bool;

/// A file or folder that could not be written
#[derive(Debug)]
pub struct ExtractFailure {
    /// Archive path
    pub path: String,
    /// What went wrong
    pub error: CacheError,
}

impl fmt::Display for ExtractFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.error)
    }
}

/// Outcome of an extraction
#[derive(Debug, Default)]
pub struct ExtractReport {
    /// Files written, in extraction order
    pub extracted: Vec<PathBuf>,
    /// Files and folders that failed
    pub failures: Vec<ExtractFailure>,
    /// Total bytes written
    pub bytes_written: u64,
}

impl ExtractReport {
    /// Whether nothing failed
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

impl<R: Read + Seek> CacheFile<R> {
    /// Extract the files below `folder`
    ///
    /// With `keep_structure`, files land at their archive path below
    /// `destination`; otherwise directly in `destination`. Subfolders are
    /// only visited when `recursive`, and a subfolder none of whose files
    /// pass `filter` is skipped without creating it.
    pub fn extract(
        &mut self,
        folder: NodeId,
        destination: impl AsRef<Path>,
        recursive: bool,
        keep_structure: bool,
        filter: Option<FileFilter<'_>>,
    ) -> CacheResult<ExtractReport> {
        self.require_gcf("extraction")?;
        let destination = destination.as_ref();
        let node = self
            .tree
            .get(folder)
            .ok_or_else(|| CacheError::NotFound(format!("node {}", folder.index())))?;
        fs::create_dir_all(destination)?;

        let mut report = ExtractReport::default();
        if node.is_file() {
            if filter.is_none_or(|f| f(&self.tree, folder)) {
                self.extract_into(folder, destination, keep_structure, &mut report);
            }
            return Ok(report);
        }

        let mut pending = vec![folder];
        while let Some(current) = pending.pop() {
            if keep_structure {
                let dir = destination.join(self.tree.sys_path(current));
                if let Err(e) = fs::create_dir_all(&dir) {
                    self.record_failure(current, e.into(), &mut report);
                    continue;
                }
            }

            let children = self.tree.children(current).to_vec();
            let mut subfolders = Vec::new();
            for child in children {
                let tree = &self.tree;
                if tree[child].is_folder() {
                    let wanted = filter.is_none_or(|f| {
                        tree.all_files(child).into_iter().any(|id| f(tree, id))
                    });
                    if recursive && wanted {
                        subfolders.push(child);
                    }
                } else if filter.is_none_or(|f| f(tree, child)) {
                    self.extract_into(child, destination, keep_structure, &mut report);
                }
            }
            pending.extend(subfolders.into_iter().rev());
        }

        debug!(
            "Extracted {} files ({} bytes), {} failures",
            report.extracted.len(),
            report.bytes_written,
            report.failures.len()
        );
        Ok(report)
    }

    /// Extract the minimum-footprint files of the archive
    ///
    /// A user-config file that already exists at its target is left alone.
    pub fn extract_minimum_footprint(
        &mut self,
        destination: impl AsRef<Path>,
        keep_structure: bool,
    ) -> CacheResult<ExtractReport> {
        let destination = destination.as_ref();
        let filter = |tree: &DirectoryTree, id: NodeId| {
            let node = &tree[id];
            node.is_minimum_footprint()
                && !(node.is_user_config()
                    && extract_target(tree, id, destination, keep_structure).exists())
        };
        self.extract(
            NodeId::ROOT,
            destination,
            true,
            keep_structure,
            Some(&filter as FileFilter<'_>),
        )
    }

    /// Write one file, returning where it was written
    pub fn extract_file(
        &mut self,
        id: NodeId,
        destination: impl AsRef<Path>,
        keep_structure: bool,
    ) -> CacheResult<PathBuf> {
        let target = extract_target(&self.tree, id, destination.as_ref(), keep_structure);
        if keep_structure && let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut stream = self.stream(id, OpenMode::Binary)?;
        let mut output = BufWriter::new(File::create(&target)?);
        if let Err(e) = copy_stream(&mut stream, &mut output) {
            drop(output);
            if let Err(remove) = fs::remove_file(&target) {
                trace!("Could not remove partial file {}: {remove}", target.display());
            }
            return Err(e);
        }
        trace!("Wrote {}", target.display());
        Ok(target)
    }

    fn extract_into(
        &mut self,
        id: NodeId,
        destination: &Path,
        keep_structure: bool,
        report: &mut ExtractReport,
    ) {
        match self.extract_file(id, destination, keep_structure) {
            Ok(path) => {
                report.bytes_written += u64::from(self.tree[id].item_size);
                report.extracted.push(path);
            }
            Err(e) => self.record_failure(id, e, report),
        }
    }

    fn record_failure(&self, id: NodeId, error: CacheError, report: &mut ExtractReport) {
        let path = self.tree.path(id);
        warn!("Failed to extract {path}: {error}");
        report.failures.push(ExtractFailure { path, error });
    }
}

fn copy_stream<R: Read + Seek, W: Write>(
    stream: &mut SectorStream<'_, R>,
    output: &mut W,
) -> CacheResult<()> {
    while stream.position() < stream.len() {
        let remaining = stream.len() - stream.position();
        let chunk = stream.read_bytes(remaining.min(COPY_CHUNK_SIZE as u64) as usize)?;
        output.write_all(&chunk)?;
    }
    output.flush()?;
    Ok(())
}

/// Where a file is written
fn extract_target(
    tree: &DirectoryTree,
    id: NodeId,
    destination: &Path,
    keep_structure: bool,
) -> PathBuf {
    if keep_structure {
        destination.join(tree.sys_path(id))
    } else {
        destination.join(&tree[id].name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_success() {
        let mut report = ExtractReport::default();
        assert!(report.is_success());

        report.failures.push(ExtractFailure {
            path: "maps\\start.bsp".to_string(),
            error: CacheError::NotFound("sector 9".to_string()),
        });
        assert!(!report.is_success());
        assert_eq!(
            report.failures[0].to_string(),
            "maps\\start.bsp: not found: sector 9"
        );
    }
}
