//! Resumeport CLI
//!
//! Moves torrents from the legacy client's resume.dat into qBittorrent.

mod commands;

use std::process::ExitCode;

use clap::Parser;
use resumeport_core::MigrateError;
use resumeport_core::tracing_setup::init_tracing;

/// Exit status when some entries could not be migrated.
const EXIT_ENTRY_FAILURES: u8 = 1;
/// Exit status when the run could not start.
const EXIT_FATAL: u8 = 2;

#[derive(Parser)]
#[command(name = "resumeport", version)]
#[command(about = "Migrate torrents from a uTorrent resume.dat to qBittorrent")]
struct Cli {
    #[command(flatten)]
    args: commands::MigrateArgs,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = init_tracing(cli.args.log_level.as_tracing_level(), cli.args.logs_dir.as_deref())
    {
        eprintln!("Failed to initialize logging: {e}");
        return ExitCode::from(EXIT_FATAL);
    }

    match commands::run_migrate(&cli.args).await {
        Ok(report) if report.has_failures() => ExitCode::from(EXIT_ENTRY_FAILURES),
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            match e.downcast_ref::<MigrateError>() {
                Some(migrate_error) => eprintln!("Error: {}", migrate_error.user_message()),
                None => eprintln!("Error: {e:#}"),
            }
            ExitCode::from(EXIT_FATAL)
        }
    }
}
