//! Backup strategies.
//!
//! A backup writes one artifact into the backup directory of a connection:
//!
//! - [`BackupStrategy::Dump`] dumps into `<dir>/temp` and packs it as
//!   `db-<stamp>.tar.gz`.
//! - [`BackupStrategy::RawCopy`] asks the engine for a copy of the database
//!   file, `db-<stamp>.sqlite3`.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Local};
use sqlx::SqliteConnection;
use tracing::{info, warn};

use crate::archive;
use crate::dialect::DumpDialect;
use crate::dump::DatabaseDumper;
use crate::error::Result;
use crate::lob::LobIdGenerator;

/// Timestamp pattern of artifact names.
pub const STAMP_FORMAT: &str = "%Y%m%dT%H%M%S";
/// Name of the temporary dump directory inside a backup directory.
pub const TEMP_DIR: &str = "temp";

/// How a backup is taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackupStrategy {
    /// Portable dump archive.
    Dump,
    /// Engine-side copy of the database file.
    #[default]
    RawCopy,
}

impl BackupStrategy {
    /// Returns the artifact name for a backup taken at `now`.
    #[must_use]
    pub fn artifact_name(self, now: &DateTime<Local>) -> String {
        let stamp = now.format(STAMP_FORMAT);
        match self {
            Self::Dump => format!("db-{stamp}.tar.gz"),
            Self::RawCopy => format!("db-{stamp}.sqlite3"),
        }
    }

    /// Takes a backup into `backup_dir` and returns the artifact path.
    pub async fn run<D: DumpDialect + Clone>(
        self,
        conn: &mut SqliteConnection,
        dialect: D,
        backup_dir: &Path,
        ids: Arc<LobIdGenerator>,
    ) -> Result<PathBuf> {
        fs::create_dir_all(backup_dir)?;
        let artifact = backup_dir.join(self.artifact_name(&Local::now()));

        match self {
            Self::Dump => dump_archive(conn, dialect, backup_dir, &artifact, ids).await?,
            Self::RawCopy => {
                let target = artifact.to_string_lossy();
                sqlx::query(&dialect.backup_to_sql(&target))
                    .execute(&mut *conn)
                    .await?;
            }
        }

        info!(artifact = %artifact.display(), strategy = ?self, "Backup written");
        Ok(artifact)
    }
}

async fn dump_archive<D: DumpDialect + Clone>(
    conn: &mut SqliteConnection,
    dialect: D,
    backup_dir: &Path,
    artifact: &Path,
    ids: Arc<LobIdGenerator>,
) -> Result<()> {
    let temp = backup_dir.join(TEMP_DIR);
    if temp.exists() {
        fs::remove_dir_all(&temp)?;
    }

    let dumper = DatabaseDumper::new(dialect, ids);
    let outcome = dumper
        .dump(conn, &temp)
        .await
        .and_then(|_| archive::pack(&temp, artifact).map(|_| ()));

    if let Err(e) = fs::remove_dir_all(&temp) {
        warn!(dir = %temp.display(), error = %e, "Can't remove temporary dump directory");
    }
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use sqlx::Connection;

    use crate::dialect::SqliteDialect;

    #[test]
    fn test_artifact_names() {
        let now = Local.with_ymd_and_hms(2024, 1, 5, 10, 4, 9).unwrap();
        assert_eq!(
            BackupStrategy::Dump.artifact_name(&now),
            "db-20240105T100409.tar.gz"
        );
        assert_eq!(
            BackupStrategy::RawCopy.artifact_name(&now),
            "db-20240105T100409.sqlite3"
        );
    }

    #[tokio::test]
    async fn test_dump_strategy_leaves_only_the_archive() {
        let mut conn = SqliteConnection::connect("sqlite::memory:").await.unwrap();
        sqlx::query("CREATE TABLE t (id INTEGER PRIMARY KEY, v TEXT)")
            .execute(&mut conn)
            .await
            .unwrap();
        sqlx::query("INSERT INTO t VALUES (1, 'x')")
            .execute(&mut conn)
            .await
            .unwrap();

        let dir = tempfile::tempdir().unwrap();
        let artifact = BackupStrategy::Dump
            .run(
                &mut conn,
                SqliteDialect::new(),
                dir.path(),
                Arc::new(LobIdGenerator::starting_after(0)),
            )
            .await
            .unwrap();

        assert!(artifact.is_file());
        assert!(!dir.path().join(TEMP_DIR).exists());
        let entries: Vec<_> = fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }

    #[tokio::test]
    async fn test_raw_copy_strategy() {
        let mut conn = SqliteConnection::connect("sqlite::memory:").await.unwrap();
        sqlx::query("CREATE TABLE t (id INTEGER PRIMARY KEY)")
            .execute(&mut conn)
            .await
            .unwrap();
        sqlx::query("INSERT INTO t VALUES (7)")
            .execute(&mut conn)
            .await
            .unwrap();

        let dir = tempfile::tempdir().unwrap();
        let artifact = BackupStrategy::RawCopy
            .run(
                &mut conn,
                SqliteDialect::new(),
                dir.path(),
                Arc::new(LobIdGenerator::starting_after(0)),
            )
            .await
            .unwrap();

        let url = format!("sqlite:{}", artifact.display());
        let mut copy = SqliteConnection::connect(&url).await.unwrap();
        let id: i64 = sqlx::query_scalar("SELECT id FROM t")
            .fetch_one(&mut copy)
            .await
            .unwrap();
        assert_eq!(id, 7);
    }
}
