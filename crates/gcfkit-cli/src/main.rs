use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use gcfkit_formats::cache::CacheOptions;
use tracing::Level;
use tracing_subscriber::EnvFilter;

use gcfkit_cli::{Commands, OutputFormat, commands};

#[derive(Parser)]
#[command(
    name = "gcfkit",
    about = "Inspect and extract Steam GCF/NCF cache archives and blob trees",
    version,
    long_about = "A command-line tool for reading Steam cache archives (GCF with sector content, NCF with content on disk) and the nested key/value blob format."
)]
struct Cli {
    /// Set the logging level
    #[arg(short, long, value_enum, global = true, default_value = "warn")]
    log_level: LogLevel,

    /// Path to a JSON archive options file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Output format
    #[arg(long, value_enum, global = true, default_value = "text")]
    format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl From<LogLevel> for Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => Self::TRACE,
            LogLevel::Debug => Self::DEBUG,
            LogLevel::Info => Self::INFO,
            LogLevel::Warn => Self::WARN,
            LogLevel::Error => Self::ERROR,
        }
    }
}

fn load_options(path: Option<&PathBuf>) -> anyhow::Result<CacheOptions> {
    let Some(path) = path else {
        return Ok(CacheOptions::default());
    };
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading config {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing config {}", path.display()))
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // RUST_LOG takes precedence over --log-level
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(Level::from(cli.log_level).as_str()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let result = load_options(cli.config.as_ref())
        .and_then(|options| commands::handle(cli.command, &options, cli.format));

    match result {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}
