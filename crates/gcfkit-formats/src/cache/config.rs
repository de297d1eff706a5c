//! Options controlling how cache files are parsed and resolved

use std::path::Path;

use serde::{Deserialize, Serialize};

/// Default location of NCF content, relative to the archive's folder
pub const DEFAULT_NCF_FOLDER_PATTERN: &str = "common/{NAME}";

/// Cache file options
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheOptions {
    /// Folder holding NCF content
    ///
    /// `{NAME}` is replaced by the archive name without its extension and
    /// `{FILE}` by the full archive name. Relative patterns are resolved
    /// against the archive's folder.
    pub ncf_folder_pattern: String,
    /// Archive file name
    pub source_name: Option<String>,
    /// Treat a block table checksum mismatch as fatal
    pub strict_block_checksum: bool,
    /// Check the manifest checksum and report a mismatch
    pub verify_manifest_checksum: bool,
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self {
            ncf_folder_pattern: DEFAULT_NCF_FOLDER_PATTERN.to_string(),
            source_name: None,
            strict_block_checksum: false,
            verify_manifest_checksum: true,
        }
    }
}

impl CacheOptions {
    /// Set the NCF folder pattern
    #[must_use]
    pub fn with_ncf_folder_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.ncf_folder_pattern = pattern.into();
        self
    }

    /// Set the archive file name
    #[must_use]
    pub fn with_source_name(mut self, name: impl Into<String>) -> Self {
        self.source_name = Some(name.into());
        self
    }

    /// Make the block table checksum fatal
    #[must_use]
    pub fn with_strict_block_checksum(mut self, strict: bool) -> Self {
        self.strict_block_checksum = strict;
        self
    }

    /// Enable or disable the manifest checksum check
    #[must_use]
    pub fn with_verify_manifest_checksum(mut self, verify: bool) -> Self {
        self.verify_manifest_checksum = verify;
        self
    }

    /// NCF content folder for the configured archive name
    ///
    /// Returns `None` without a source name when the pattern needs one.
    pub fn ncf_folder(&self) -> Option<String> {
        let pattern = &self.ncf_folder_pattern;
        if !pattern.contains("{NAME}") && !pattern.contains("{FILE}") {
            return Some(pattern.clone());
        }

        let file = self.source_name.as_deref()?;
        let stem = Path::new(file)
            .file_stem()
            .map_or_else(|| file.to_string(), |s| s.to_string_lossy().into_owned());
        Some(pattern.replace("{FILE}", file).replace("{NAME}", &stem))
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = CacheOptions::default();
        assert_eq!(options.ncf_folder_pattern, "common/{NAME}");
        assert!(!options.strict_block_checksum);
        assert!(options.verify_manifest_checksum);
        assert_eq!(options.ncf_folder(), None);
    }

    #[test]
    fn test_folder_pattern() {
        let options = CacheOptions::default().with_source_name("half-life 2 content.ncf");
        assert_eq!(
            options.ncf_folder().as_deref(),
            Some("common/half-life 2 content")
        );

        let options = options.with_ncf_folder_pattern("/mirror/{FILE}");
        assert_eq!(
            options.ncf_folder().as_deref(),
            Some("/mirror/half-life 2 content.ncf")
        );

        let options = CacheOptions::default().with_ncf_folder_pattern("/fixed");
        assert_eq!(options.ncf_folder().as_deref(), Some("/fixed"));
    }

    #[test]
    fn test_partial_json() {
        let options: CacheOptions =
            serde_json::from_str(r#"{"strict_block_checksum": true}"#).unwrap();
        assert!(options.strict_block_checksum);
        assert_eq!(options.ncf_folder_pattern, DEFAULT_NCF_FOLDER_PATTERN);

        let json = serde_json::to_string(&options).unwrap();
        let back: CacheOptions = serde_json::from_str(&json).unwrap();
        assert_eq!(back, options);
    }
}
