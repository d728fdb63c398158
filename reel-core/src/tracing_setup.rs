//! Tracing setup for Reel
//!
//! The console shows what the operator asked for. The run log under
//! `logs/` always records everything, including per-chunk reads, so an
//! aborted transfer can be reconstructed after the fact.

use std::fs::{File, create_dir_all};
use std::path::{Path, PathBuf};

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, fmt};

/// File name of the run log, truncated at every start.
pub const RUN_LOG_NAME: &str = "reel-last-run.log";

/// Connection-level crates that would drown out transfer logs below `warn`.
const NOISY_TARGETS: &[&str] = &["hyper", "hyper_util", "tower_http", "mio"];

/// Installs the console and run-log layers as the global subscriber.
///
/// `RUST_LOG`, when set, replaces the console filter. Returns the path of
/// the run log (`logs_dir` defaults to `./logs`).
///
/// # Errors
///
/// - `std::io::Error` - The logs directory or run log could not be created,
///   or a global subscriber is already installed
pub fn init_tracing(console_level: Level, logs_dir: Option<&Path>) -> std::io::Result<PathBuf> {
    let (log_file_path, log_file) = open_run_log(logs_dir.unwrap_or_else(|| Path::new("logs")))?;

    let console_layer = fmt::layer()
        .with_target(true)
        .with_thread_names(false)
        .with_file(false)
        .with_line_number(false)
        .with_filter(console_filter(console_level));

    let file_layer = fmt::layer()
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .with_ansi(false)
        .with_writer(log_file)
        .with_filter(quieted_filter(Level::TRACE));

    tracing_subscriber::registry()
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(std::io::Error::other)?;

    tracing::info!(
        "Logging to console at {} and to {}",
        console_level,
        log_file_path.display()
    );
    Ok(log_file_path)
}

fn open_run_log(logs_dir: &Path) -> std::io::Result<(PathBuf, File)> {
    create_dir_all(logs_dir)?;
    let path = logs_dir.join(RUN_LOG_NAME);
    let file = File::create(&path)?;
    Ok((path, file))
}

fn console_filter(level: Level) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| quieted_filter(level))
}

/// `level` for Reel's own targets, at most `warn` for connection plumbing.
fn quieted_filter(level: Level) -> EnvFilter {
    let mut directives = level.as_str().to_ascii_lowercase();
    let plumbing = level.min(Level::WARN).as_str().to_ascii_lowercase();
    for target in NOISY_TARGETS {
        directives.push_str(&format!(",{target}={plumbing}"));
    }
    EnvFilter::new(directives)
}

/// Console verbosity chosen on the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum CliLogLevel {
    Error,
    Warn,
    /// Startup, shutdown and one line per stream request
    Info,
    /// Adds transfer outcomes, rejected ranges and disconnects
    Debug,
    /// Adds every chunk read
    Trace,
}

impl CliLogLevel {
    /// Converts to the matching `tracing` level.
    ///
    /// # Examples
    /// ```
    /// use reel_core::tracing_setup::CliLogLevel;
    ///
    /// assert_eq!(CliLogLevel::Debug.as_tracing_level(), tracing::Level::DEBUG);
    /// ```
    pub fn as_tracing_level(self) -> Level {
        match self {
            CliLogLevel::Error => Level::ERROR,
            CliLogLevel::Warn => Level::WARN,
            CliLogLevel::Info => Level::INFO,
            CliLogLevel::Debug => Level::DEBUG,
            CliLogLevel::Trace => Level::TRACE,
        }
    }
}

impl std::fmt::Display for CliLogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.as_tracing_level().as_str().to_ascii_lowercase())
    }
}
