//! Platform Backup - Main entry point
//!
//! Backs up or restores an Ops Manager installation and its runtime.

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use platform_backup::{
    config::Config, run_backup_pipeline, run_restore_pipeline, utils, ConnectionBucket,
};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Back up the Ops Manager installation and the runtime's persistence
    Backup(TargetArgs),

    /// Restore a previous backup from the destination directory
    Restore(TargetArgs),
}

#[derive(Args, Debug)]
struct TargetArgs {
    /// Ops Manager hostname or IP
    #[arg(long, env = "OPSMAN_HOST")]
    opsmanager_host: String,

    /// Ops Manager admin user (web/API)
    #[arg(long, env = "OPSMAN_ADMIN_USER")]
    admin_user: String,

    /// Ops Manager admin password (web/API)
    #[arg(long, env = "OPSMAN_ADMIN_PASS", hide_env_values = true)]
    admin_pass: String,

    /// Ops Manager VM user (SSH)
    #[arg(long, env = "OPSMAN_SSH_USER", default_value = "tempest")]
    opsmanager_user: String,

    /// Ops Manager VM password (SSH)
    #[arg(long, env = "OPSMAN_SSH_PASS", hide_env_values = true)]
    opsmanager_pass: String,

    /// Directory holding the backup
    #[arg(long, env = "BACKUP_DESTINATION")]
    destination: PathBuf,
}

impl TargetArgs {
    fn into_bucket(self) -> ConnectionBucket {
        ConnectionBucket::new(
            self.opsmanager_host,
            self.admin_user,
            self.admin_pass,
            self.opsmanager_user,
            self.opsmanager_pass,
            self.destination,
        )
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // .env is optional
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    // Load configuration
    let config = if let Some(config_path) = &cli.config {
        Config::from_file(config_path)?
    } else {
        Config::default()
    };

    // Initialize logging
    let log_level = cli.log_level.as_deref().unwrap_or(&config.log.level);
    utils::logger::init(log_level)?;

    let pipeline = config.pipeline.pinned();
    tracing::info!(
        "Starting platform-backup v{} (release: {:?})",
        env!("CARGO_PKG_VERSION"),
        pipeline.resolved_release()
    );

    let started = std::time::Instant::now();

    // ssh2 and the blocking HTTP client stay off the async runtime
    match cli.command {
        Command::Backup(target) => {
            let conn = target.into_bucket();
            tokio::task::spawn_blocking(move || run_backup_pipeline(&conn, &pipeline)).await??;
        }
        Command::Restore(target) => {
            let conn = target.into_bucket();
            tokio::task::spawn_blocking(move || run_restore_pipeline(&conn, &pipeline)).await??;
        }
    }

    tracing::info!("Done in {:.1}s", started.elapsed().as_secs_f64());
    Ok(())
}
