//! oxide-backup CLI
//!
//! Command-line tool for backing up and restoring configured databases.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use sqlx::{Connection, SqliteConnection};
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

use oxide_backup::archive;
use oxide_backup::config::{ConnectionConfig, DEFAULT_CONFIG_FILE};
use oxide_backup::legacy::LegacyScriptMigrator;
use oxide_backup::prelude::*;

/// Dump, restore and rotate SQLite database backups.
#[derive(Parser)]
#[command(name = "oxide-backup")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Back up one or more configured databases.
    Backup {
        /// Connection configuration file.
        #[arg(short, long, env = "OXIDE_BACKUP_CONFIG", default_value = DEFAULT_CONFIG_FILE)]
        config: PathBuf,

        /// Connection ids to back up (all if not specified).
        #[arg(short, long = "id")]
        ids: Vec<String>,

        /// Directory receiving one sub-directory per connection.
        #[arg(short, long)]
        target_dir: Option<PathBuf>,

        /// Number of backups kept per connection (0 keeps all).
        #[arg(short, long, default_value_t = DEFAULT_RETENTION_LIMIT)]
        limit: usize,

        /// Write a portable dump archive instead of a database copy.
        #[arg(long)]
        dump: bool,

        /// Seconds to wait before starting.
        #[arg(long)]
        delay: Option<u64>,
    },

    /// Restore a dump archive into a configured database.
    Restore {
        /// Connection configuration file.
        #[arg(short, long, env = "OXIDE_BACKUP_CONFIG", default_value = DEFAULT_CONFIG_FILE)]
        config: PathBuf,

        /// Connection id to restore into (first configured if not specified).
        #[arg(short, long)]
        id: Option<String>,

        /// Dump archive to restore.
        #[arg(short, long)]
        file: PathBuf,

        /// Seconds to wait before starting.
        #[arg(long)]
        delay: Option<u64>,
    },

    /// Rewrite the script of a legacy database before opening it.
    MigrateLegacy {
        /// Directory holding the database files.
        #[arg(short, long)]
        dir: PathBuf,

        /// Database name (file name without extension).
        #[arg(short, long)]
        name: String,
    },
}

/// Default directory receiving backups.
const DEFAULT_TARGET_DIR: &str = "backups";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let log_level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .without_time()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Commands::Backup {
            config,
            ids,
            target_dir,
            limit,
            dump,
            delay,
        } => {
            let strategy = if dump {
                BackupStrategy::Dump
            } else {
                BackupStrategy::RawCopy
            };
            wait(delay).await;
            backup(&config, &ids, target_dir, limit, strategy).await?;
        }

        Commands::Restore {
            config,
            id,
            file,
            delay,
        } => {
            wait(delay).await;
            restore(&config, id.as_deref(), &file).await?;
        }

        Commands::MigrateLegacy { dir, name } => {
            let outcome = LegacyScriptMigrator::new(&dir, &name).run()?;
            info!(database = %name, outcome = ?outcome, "Legacy check finished");
        }
    }

    Ok(())
}

async fn wait(delay: Option<u64>) {
    if let Some(seconds) = delay.filter(|s| *s > 0) {
        info!("Waiting for {} seconds...", seconds);
        tokio::time::sleep(Duration::from_secs(seconds)).await;
    }
}

async fn connect(connection: &ConnectionConfig) -> anyhow::Result<SqliteConnection> {
    SqliteConnection::connect(&connection.url)
        .await
        .with_context(|| format!("Can't connect to '{}'", connection.id))
}

async fn backup(
    config: &Path,
    ids: &[String],
    target_dir: Option<PathBuf>,
    limit: usize,
    strategy: BackupStrategy,
) -> anyhow::Result<()> {
    let config = ManagerConfig::load(config)?;

    let target_dir = match target_dir {
        Some(dir) if !dir.is_dir() => {
            bail!("The target directory '{}' does not exist", dir.display())
        }
        Some(dir) => dir,
        None => {
            let dir = PathBuf::from(DEFAULT_TARGET_DIR);
            std::fs::create_dir_all(&dir)?;
            dir
        }
    };

    let connections: Vec<&ConnectionConfig> = if ids.is_empty() {
        config.connections().iter().collect()
    } else {
        ids.iter()
            .filter_map(|id| match config.connection(id) {
                Ok(connection) => Some(connection),
                Err(e) => {
                    error!("{}", e);
                    None
                }
            })
            .collect()
    };
    if connections.is_empty() {
        bail!("No known connection to back up");
    }

    let lob_ids = Arc::new(LobIdGenerator::from_clock());
    let mut count = 0;
    for connection in connections {
        info!(id = %connection.id, strategy = ?strategy, "Creating backup");

        let backup_dir = target_dir.join(&connection.id);
        let mut conn = connect(connection).await?;
        strategy
            .run(&mut conn, SqliteDialect::new(), &backup_dir, Arc::clone(&lob_ids))
            .await
            .with_context(|| format!("Backup failed for '{}'", connection.id))?;
        conn.close().await?;
        count += 1;

        for removed in enforce_retention(&backup_dir, limit) {
            info!(id = %connection.id, file = %removed.display(), "Removed outdated backup");
        }
    }

    if count == 1 {
        info!("One backup was saved at '{}'.", target_dir.display());
    } else {
        info!("{} backups were saved at '{}'.", count, target_dir.display());
    }
    Ok(())
}

async fn restore(config: &Path, id: Option<&str>, file: &Path) -> anyhow::Result<()> {
    let config = ManagerConfig::load(config)?;
    let connection = match id {
        Some(id) => config.connection(id)?,
        None => config
            .first()
            .context("The configuration does not contain any connections")?,
    };
    if !file.is_file() {
        bail!("The archive '{}' does not exist", file.display());
    }

    let temp = tempfile::Builder::new().prefix("restore").tempdir()?;
    archive::unpack(file, temp.path()).context("Can't uncompress the archive")?;

    info!(id = %connection.id, archive = %file.display(), "Restoring database");
    let mut conn = connect(connection).await?;
    let summary = DatabaseRestorer::new(SqliteDialect::new())
        .clear_existing(true)
        .restore(&mut conn, temp.path())
        .await
        .with_context(|| format!("Restore failed for '{}'", connection.id))?;
    conn.close().await?;

    info!(
        id = %connection.id,
        tables = summary.tables.len(),
        lobs = summary.patches,
        "Restore finished"
    );
    Ok(())
}
