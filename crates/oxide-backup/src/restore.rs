//! Restoring dump directories.
//!
//! Rows are replayed one `INSERT` at a time, with each cell converted by
//! [`literal_for`] according to the live column type. A failing insert aborts
//! the restore.
//!
//! A whole directory is restored with referential integrity switched off.
//! Integrity is switched back on and storage is compacted afterwards, whether
//! or not the restore succeeded.

use std::collections::HashSet;
use std::path::Path;

use sqlx::SqliteConnection;
use tracing::{debug, error, info, warn};

use crate::coerce::literal_for;
use crate::dialect::DumpDialect;
use crate::error::{BackupError, Result};
use crate::lob::replay_patch_script;
use crate::manifest::{csv_reader, DumpManifest};
use crate::schema::{ColumnType, SchemaInspector};
use crate::sequence::{RealignedSequence, SequenceRealigner};

/// Restores single tables from their dump files.
#[derive(Debug, Clone)]
pub struct TableRestorer<D: DumpDialect> {
    inspector: SchemaInspector<D>,
}

impl<D: DumpDialect> TableRestorer<D> {
    /// Creates a new table restorer.
    pub fn new(dialect: D) -> Self {
        Self {
            inspector: SchemaInspector::new(dialect),
        }
    }

    /// Inserts every record of `path` into `table` and returns the row count.
    ///
    /// Header names are matched against the live columns ignoring case.
    /// Headers without a live column are left out of the inserts.
    pub async fn restore_table(
        &self,
        conn: &mut SqliteConnection,
        table: &str,
        path: &Path,
    ) -> Result<u64> {
        info!(table = %table, "Restoring table");

        let mut reader = csv_reader(path)?;
        let headers = reader.headers()?.clone();
        check_unique_headers(path, headers.iter())?;

        let live = self.inspector.describe(conn, table).await?;
        if live.columns.is_empty() {
            return Err(BackupError::InvalidDump {
                path: path.to_path_buf(),
                message: format!("table '{table}' does not exist"),
            });
        }

        let dialect = self.inspector.dialect();
        let mut columns: Vec<(usize, ColumnType)> = Vec::new();
        let mut names = Vec::new();
        for (index, header) in headers.iter().enumerate() {
            match live.column(header) {
                Some(column) => {
                    columns.push((index, column.column_type));
                    names.push(dialect.quote_identifier(&column.name));
                }
                None => warn!(table = %table, column = %header, "Column not found, skipping"),
            }
        }
        if columns.is_empty() {
            return Err(BackupError::InvalidDump {
                path: path.to_path_buf(),
                message: format!("no header matches a column of '{table}'"),
            });
        }

        let prefix = format!(
            "INSERT INTO {} ({}) VALUES (",
            dialect.quote_identifier(&live.name),
            names.join(", ")
        );

        let mut count = 0u64;
        for record in reader.records() {
            let record = record?;
            let values: Vec<String> = columns
                .iter()
                .map(|(index, column_type)| {
                    literal_for(*column_type, record.get(*index).unwrap_or_default())
                })
                .collect();
            let sql = format!("{prefix}{})", values.join(", "));

            if let Err(source) = sqlx::query(&sql).execute(&mut *conn).await {
                error!(table = %table, statement = %sql, error = %source, "INSERT query failed");
                return Err(BackupError::Insert {
                    table: table.to_string(),
                    source,
                });
            }
            count += 1;
        }

        debug!(table = %table, rows = count, "Table restored");
        Ok(count)
    }
}

fn check_unique_headers<'a>(path: &Path, headers: impl Iterator<Item = &'a str>) -> Result<()> {
    let mut seen = HashSet::new();
    for header in headers {
        if !seen.insert(header.to_ascii_lowercase()) {
            return Err(BackupError::InvalidDump {
                path: path.to_path_buf(),
                message: format!("duplicate column '{header}' in header"),
            });
        }
    }
    Ok(())
}

/// Result of a directory restore.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RestoreSummary {
    /// Restored tables with their row counts, in restore order.
    pub tables: Vec<(String, u64)>,
    /// Number of executed patch script statements.
    pub patches: usize,
    /// Sequences that were restarted.
    pub sequences: Vec<RealignedSequence>,
}

/// Restores a whole dump directory.
#[derive(Debug, Clone)]
pub struct DatabaseRestorer<D: DumpDialect + Clone> {
    dialect: D,
    tables: TableRestorer<D>,
    sequences: SequenceRealigner<D>,
    clear_existing: bool,
}

impl<D: DumpDialect + Clone> DatabaseRestorer<D> {
    /// Creates a restorer that loads into the existing rows.
    pub fn new(dialect: D) -> Self {
        Self {
            tables: TableRestorer::new(dialect.clone()),
            sequences: SequenceRealigner::new(dialect.clone()),
            dialect,
            clear_existing: false,
        }
    }

    /// Deletes every row of every table before loading.
    #[must_use]
    pub fn clear_existing(mut self, enabled: bool) -> Self {
        self.clear_existing = enabled;
        self
    }

    /// Restores `directory` into `conn`.
    ///
    /// Table files are loaded in name order, then the LOB patch script is
    /// replayed and sequences are realigned. A restore error takes precedence
    /// over errors while re-enabling integrity or compacting.
    pub async fn restore(
        &self,
        conn: &mut SqliteConnection,
        directory: &Path,
    ) -> Result<RestoreSummary> {
        let manifest = DumpManifest::new(directory);
        if !manifest.root().is_dir() {
            return Err(BackupError::InvalidDump {
                path: directory.to_path_buf(),
                message: "not a directory".to_string(),
            });
        }

        sqlx::query(self.dialect.referential_integrity_sql(false))
            .execute(&mut *conn)
            .await?;
        debug!("Referential integrity disabled");

        let outcome = self.restore_contents(conn, &manifest).await;
        let cleanup = self.leave_bracket(conn).await;

        match (outcome, cleanup) {
            (Ok(summary), Ok(())) => {
                info!(
                    directory = %directory.display(),
                    tables = summary.tables.len(),
                    "Restore finished"
                );
                Ok(summary)
            }
            (Ok(_), Err(e)) | (Err(e), Ok(())) => Err(e),
            (Err(e), Err(cleanup)) => {
                error!(error = %cleanup, "Cleanup after failed restore failed as well");
                Err(e)
            }
        }
    }

    async fn restore_contents(
        &self,
        conn: &mut SqliteConnection,
        manifest: &DumpManifest,
    ) -> Result<RestoreSummary> {
        if self.clear_existing {
            let inspector = SchemaInspector::new(self.dialect.clone());
            for table in inspector.tables(conn).await? {
                debug!(table = %table, "Clearing table");
                sqlx::query(&self.dialect.clear_table_sql(&table))
                    .execute(&mut *conn)
                    .await?;
            }
        }

        let mut tables = Vec::new();
        for (table, path) in manifest.table_files()? {
            let rows = self.tables.restore_table(conn, &table, &path).await?;
            tables.push((table, rows));
        }

        let patches = replay_patch_script(conn, manifest).await?;
        let sequences = self.sequences.realign(conn).await?;

        Ok(RestoreSummary {
            tables,
            patches,
            sequences,
        })
    }

    async fn leave_bracket(&self, conn: &mut SqliteConnection) -> Result<()> {
        let enabled = sqlx::query(self.dialect.referential_integrity_sql(true))
            .execute(&mut *conn)
            .await;
        let compacted = sqlx::query(self.dialect.compact_sql())
            .execute(&mut *conn)
            .await;

        enabled?;
        debug!("Referential integrity enabled");
        compacted?;
        Ok(())
    }
}
