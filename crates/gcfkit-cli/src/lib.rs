//! gcfkit command-line library
//!
//! Command definitions and handlers for the `gcfkit` binary.

pub mod commands;
pub mod output;

use std::path::PathBuf;

use clap::Subcommand;

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Show archive header fields, counts and parse advisories
    Info {
        /// GCF or NCF archive
        archive: PathBuf,
    },

    /// List the directory tree of an archive
    List {
        /// GCF or NCF archive
        archive: PathBuf,

        /// Folder inside the archive to list from
        path: Option<String>,
    },

    /// Extract archive content to a directory
    Extract {
        /// GCF archive
        archive: PathBuf,

        /// Destination directory
        #[arg(short = 'o', long = "output")]
        destination: PathBuf,

        /// Folder or file inside the archive to extract
        #[arg(short, long)]
        path: Option<String>,

        /// Only extract minimum-footprint files, keeping existing user configs
        #[arg(long, conflicts_with = "contains")]
        minimum: bool,

        /// Write every file directly into the destination
        #[arg(long)]
        flat: bool,

        /// Only extract files whose archive path contains this text
        #[arg(long)]
        contains: Option<String>,
    },

    /// Write a file's content to stdout
    Cat {
        /// GCF or NCF archive
        archive: PathBuf,

        /// File path inside the archive
        path: String,

        /// Open in text mode (strips carriage returns)
        #[arg(long)]
        text: bool,
    },

    /// Dump a blob tree
    Blob {
        /// Blob file
        file: PathBuf,

        /// Keep values that look like trees as raw bytes
        #[arg(long)]
        no_recurse: bool,

        /// Maximum nesting depth
        #[arg(long, default_value_t = 64)]
        max_depth: usize,
    },

    /// Show keys and values of a client registry blob
    Registry {
        /// Registry blob file
        file: PathBuf,

        /// Key path below the root, segments separated by `\` or `/`
        path: Option<String>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Plain text output
    Text,
    /// JSON output
    Json,
    /// Pretty-printed JSON
    JsonPretty,
}

impl OutputFormat {
    /// Render a JSON value according to the format
    pub fn render_json(self, value: &serde_json::Value) -> serde_json::Result<String> {
        match self {
            Self::JsonPretty => serde_json::to_string_pretty(value),
            Self::Json | Self::Text => serde_json::to_string(value),
        }
    }

    pub fn is_json(self) -> bool {
        matches!(self, Self::Json | Self::JsonPretty)
    }
}
