//! Tracing setup for resumeport
//!
//! Console output at the level the user picked, plus a full trace of the run
//! on disk so a failed entry can be diagnosed after the fact.

use std::fs::{File, create_dir_all};
use std::path::Path;

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, fmt};

/// File the full trace of the latest run is written to.
pub const LOG_FILE_NAME: &str = "resumeport-last-run.log";

/// Installs the global subscriber for a migration run.
///
/// Per-entry outcomes reach stderr at `console_level`; every event from this
/// crate, including per-file path decisions, lands in `LOG_FILE_NAME` under
/// `logs_dir` (`./logs` when absent), replacing the previous run's file.
///
/// # Errors
///
/// - `Box<dyn std::error::Error>` - If the trace file or its directory cannot be created
pub fn init_tracing(
    console_level: Level,
    logs_dir: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    let logs_path = logs_dir.unwrap_or_else(|| Path::new("logs"));

    create_dir_all(logs_path)?;
    let log_file_path = logs_path.join(LOG_FILE_NAME);
    let log_file = File::create(&log_file_path)?;

    // RUST_LOG wins over --log-level
    let console_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(console_level.to_string()));

    let console_layer = fmt::layer()
        .with_target(false)
        .with_file(false)
        .with_line_number(false)
        .with_writer(std::io::stderr)
        .with_filter(console_filter);

    let file_filter = EnvFilter::new("resumeport_core=trace,resumeport=trace,info");

    let file_layer = fmt::layer()
        .with_target(true)
        .with_thread_ids(true)
        .with_thread_names(true)
        .with_file(true)
        .with_line_number(true)
        .with_ansi(false)
        .with_writer(log_file)
        .with_filter(file_filter);

    tracing_subscriber::registry()
        .with(console_layer)
        .with(file_layer)
        .init();

    tracing::debug!(
        console = %console_level,
        trace_file = %log_file_path.display(),
        "Tracing initialized"
    );

    Ok(())
}

/// Console verbosity accepted by `--log-level`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum CliLogLevel {
    Error,
    /// Failed entries only
    Warn,
    /// One line per migrated entry
    Info,
    /// Layout and lookup decisions
    Debug,
    Trace,
}

impl CliLogLevel {
    const ALL: [CliLogLevel; 5] = [
        CliLogLevel::Error,
        CliLogLevel::Warn,
        CliLogLevel::Info,
        CliLogLevel::Debug,
        CliLogLevel::Trace,
    ];

    /// ```
    /// use resumeport_core::tracing_setup::CliLogLevel;
    ///
    /// assert_eq!(CliLogLevel::Warn.as_tracing_level(), tracing::Level::WARN);
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

    pub fn as_str(self) -> &'static str {
        match self {
            CliLogLevel::Error => "error",
            CliLogLevel::Warn => "warn",
            CliLogLevel::Info => "info",
            CliLogLevel::Debug => "debug",
            CliLogLevel::Trace => "trace",
        }
    }
}

impl std::str::FromStr for CliLogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|level| level.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("Invalid log level: {s}"))
    }
}

impl std::fmt::Display for CliLogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_level_parsing() {
        assert_eq!(
            "WARN".parse::<CliLogLevel>().unwrap().as_tracing_level(),
            Level::WARN
        );
        assert_eq!(CliLogLevel::Debug.to_string(), "debug");
        assert!("verbose".parse::<CliLogLevel>().is_err());
        for level in CliLogLevel::ALL {
            assert_eq!(level.to_string().parse::<CliLogLevel>(), Ok(level));
        }
    }
}
