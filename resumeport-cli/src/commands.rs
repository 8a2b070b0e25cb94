//! CLI command implementation

use std::path::PathBuf;

use anyhow::Context;
use clap::Args;
use resumeport_core::tracing_setup::CliLogLevel;
use resumeport_core::{
    MigrateError, MigrationConfig, MigrationReport, PathSeparator, ReplaceRule, TransferOptions,
};

/// Migration arguments
#[derive(Args, Debug)]
pub struct MigrateArgs {
    /// Directory containing resume.dat and the .torrent files
    #[arg(short, long)]
    pub source: PathBuf,

    /// qBittorrent BT_backup directory
    #[arg(short, long)]
    pub destination: PathBuf,

    /// qBittorrent.ini to merge tags into
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Additional directory to search for .torrent files (repeatable)
    #[arg(short = 't', long = "search")]
    pub search: Vec<PathBuf>,

    /// Path replacement rule FROM,TO applied to save paths (repeatable)
    #[arg(short, long = "replace", value_parser = parse_replace_rule)]
    pub replace: Vec<ReplaceRule>,

    /// Separator of the machine running qBittorrent: "/" or "\"
    #[arg(long, value_parser = parse_separator)]
    pub sep: Option<PathSeparator>,

    /// Do not export labels as categories
    #[arg(long)]
    pub without_labels: bool,

    /// Do not export labels as tags
    #[arg(long)]
    pub without_tags: bool,

    /// Number of torrents processed concurrently
    #[arg(short, long)]
    pub jobs: Option<usize>,

    /// Console log level
    #[arg(long, value_enum, default_value_t = CliLogLevel::Info)]
    pub log_level: CliLogLevel,

    /// Directory for the full trace of the run
    #[arg(long)]
    pub logs_dir: Option<PathBuf>,
}

fn parse_replace_rule(value: &str) -> Result<ReplaceRule, String> {
    value.parse().map_err(|e| format!("{e}"))
}

fn parse_separator(value: &str) -> Result<PathSeparator, String> {
    value.parse()
}

impl MigrateArgs {
    /// Builds run options from arguments on top of `config`.
    pub fn to_options(&self, config: &MigrationConfig) -> TransferOptions {
        let mut options = TransferOptions::with_config(&self.source, &self.destination, config);

        options.search_dirs = self.search.clone();
        options.replace_rules = self.replace.clone();
        options.without_labels = self.without_labels;
        options.without_tags = self.without_tags;
        options.config_file = self.config.clone();
        if let Some(separator) = self.sep {
            options.separator = separator;
        }
        if let Some(jobs) = self.jobs {
            options.concurrency = jobs.max(1);
        }

        options
    }
}

/// Runs the migration and prints the summary.
///
/// # Errors
/// - `MigrateError` - Source or destination missing, or resume.dat unreadable
pub async fn run_migrate(args: &MigrateArgs) -> anyhow::Result<MigrationReport> {
    let options = args.to_options(&MigrationConfig::from_env());

    println!(
        "Migrating {} -> {}",
        options.source_dir.display(),
        options.destination_dir.display()
    );

    let report = resumeport_core::migrate(options)
        .await
        .map_err(|e: MigrateError| {
            tracing::error!(error = %e, "Migration aborted");
            anyhow::Error::new(e)
        })
        .context("Migration aborted")?;

    print_summary(&report);
    Ok(report)
}

fn print_summary(report: &MigrationReport) {
    println!("{report}");
    for (key, error) in &report.failures {
        println!("  FAILED {key}: {error}");
    }
    if report.tags_added > 0 {
        println!("Added {} tags to the qBittorrent configuration", report.tags_added);
    }
}
