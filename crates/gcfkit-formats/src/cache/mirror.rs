//! External filesystem mirror for NCF content
//!
//! NCF archives carry only the directory tree. File content lives in a
//! folder on disk laid out like the archive.

use std::collections::HashMap;
use std::fmt;
use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use tracing::debug;
use walkdir::WalkDir;

use super::directory::PATH_SEPARATOR;

/// Size and permissions of a mirrored file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MirrorStat {
    /// Size in bytes
    pub size: u64,
    /// Whether the file is read-only
    pub read_only: bool,
}

/// Source of NCF file content, addressed by archive path
pub trait FilesystemMirror: fmt::Debug {
    /// Open a file for reading
    fn open(&self, path: &str) -> io::Result<Box<dyn Read>>;

    /// Size and permissions of a file
    fn stat(&self, path: &str) -> io::Result<MirrorStat>;

    /// Size of a file
    fn size(&self, path: &str) -> io::Result<u64> {
        Ok(self.stat(path)?.size)
    }
}

/// Mirror backed by a directory on disk
///
/// Lookups try the exact path first and then fall back to a
/// case-insensitive match, since the content was laid out on a
/// case-insensitive filesystem.
#[derive(Debug, Clone)]
pub struct DirectoryMirror {
    root: PathBuf,
    folded: HashMap<String, PathBuf>,
}

impl DirectoryMirror {
    /// Index the files below `root`
    pub fn new(root: impl Into<PathBuf>) -> io::Result<Self> {
        let root = root.into();
        if !root.is_dir() {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("mirror folder {} does not exist", root.display()),
            ));
        }

        let mut folded = HashMap::new();
        for entry in WalkDir::new(&root).into_iter().flatten() {
            if !entry.file_type().is_file() {
                continue;
            }
            if let Ok(relative) = entry.path().strip_prefix(&root) {
                folded.insert(fold(&archive_path(relative)), entry.path().to_path_buf());
            }
        }
        debug!("Indexed {} mirror files below {}", folded.len(), root.display());

        Ok(Self { root, folded })
    }

    /// Mirror folder
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Number of files found below the root
    pub fn file_count(&self) -> usize {
        self.folded.len()
    }

    /// On-disk location of an archive path
    pub fn resolve(&self, path: &str) -> io::Result<PathBuf> {
        let mut exact = self.root.clone();
        for segment in path.split(['\\', '/']).filter(|s| !s.is_empty()) {
            if segment == "." || segment == ".." {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("invalid path segment in {path:?}"),
                ));
            }
            exact.push(segment);
        }
        if exact.is_file() {
            return Ok(exact);
        }

        self.folded.get(&fold(path)).cloned().ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("{path} is not present in {}", self.root.display()),
            )
        })
    }
}

impl FilesystemMirror for DirectoryMirror {
    fn open(&self, path: &str) -> io::Result<Box<dyn Read>> {
        Ok(Box::new(File::open(self.resolve(path)?)?))
    }

    fn stat(&self, path: &str) -> io::Result<MirrorStat> {
        let metadata = fs::metadata(self.resolve(path)?)?;
        Ok(MirrorStat {
            size: metadata.len(),
            read_only: metadata.permissions().readonly(),
        })
    }
}

/// Render a relative OS path with the archive separator
fn archive_path(relative: &Path) -> String {
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join(&PATH_SEPARATOR.to_string())
}

/// Case-folded lookup key
fn fold(path: &str) -> String {
    path.split(['\\', '/'])
        .filter(|s| !s.is_empty())
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(&PATH_SEPARATOR.to_string())
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    fn mirror_with_file() -> (tempfile::TempDir, DirectoryMirror) {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("Maps")).unwrap();
        fs::write(dir.path().join("Maps").join("Start.bsp"), b"level").unwrap();
        let mirror = DirectoryMirror::new(dir.path()).unwrap();
        (dir, mirror)
    }

    #[test]
    fn test_exact_lookup() {
        let (_dir, mirror) = mirror_with_file();
        assert_eq!(mirror.file_count(), 1);
        assert_eq!(mirror.size("Maps\\Start.bsp").unwrap(), 5);

        let mut content = String::new();
        mirror
            .open("Maps/Start.bsp")
            .unwrap()
            .read_to_string(&mut content)
            .unwrap();
        assert_eq!(content, "level");
    }

    #[test]
    fn test_case_insensitive_fallback() {
        let (_dir, mirror) = mirror_with_file();
        let stat = mirror.stat("maps\\START.BSP").unwrap();
        assert_eq!(stat.size, 5);
        assert!(!stat.read_only);
    }

    #[test]
    fn test_missing_and_escaping_paths() {
        let (_dir, mirror) = mirror_with_file();
        assert_eq!(
            mirror.resolve("maps\\other.bsp").unwrap_err().kind(),
            io::ErrorKind::NotFound
        );
        assert_eq!(
            mirror.resolve("..\\secret").unwrap_err().kind(),
            io::ErrorKind::InvalidInput
        );
    }

    #[test]
    fn test_missing_root() {
        let dir = tempfile::tempdir().unwrap();
        assert!(DirectoryMirror::new(dir.path().join("absent")).is_err());
    }
}
