//! Large object export and patch script replay.
//!
//! LOB values are not inlined into table files. Each non-NULL value goes to
//! its own file under `lobs/` and one `UPDATE ... WHERE <primary key>` line
//! is appended to the patch script, which re-attaches the file content after
//! the table rows have been restored.
//!
//! File names come from a [`LobIdGenerator`], never from row keys. Share one
//! generator (via `Arc`) between exporters that may write into the same
//! directory concurrently. A name already present in `lobs/` is never
//! overwritten: the exporter draws the next id instead.

use std::borrow::Cow;
use std::fs::{self, OpenOptions};
use std::io::{BufWriter, ErrorKind, Write};
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};

use futures::TryStreamExt;
use regex::Regex;
use sqlx::SqliteConnection;
use tracing::{debug, info, warn};

use crate::dialect::DumpDialect;
use crate::error::{BackupError, Result};
use crate::manifest::{DumpManifest, LOBS_DIR};
use crate::schema::{ColumnInfo, ColumnType, SchemaInspector, TableDescriptor};
use crate::value::CellValue;

/// Encoding tag written for character LOBs.
pub const TEXT_ENCODING: &str = "UTF-8";

/// Hands out strictly increasing LOB file ids.
///
/// The counter is advanced under a mutex, so ids are unique across every
/// thread and task holding the same generator.
#[derive(Debug)]
pub struct LobIdGenerator {
    last: Mutex<u64>,
}

impl LobIdGenerator {
    /// Creates a generator whose first id is `last + 1`.
    #[must_use]
    pub fn starting_after(last: u64) -> Self {
        Self {
            last: Mutex::new(last),
        }
    }

    /// Creates a generator seeded with the current time in milliseconds.
    ///
    /// Ids of an earlier run may still overlap. [`LobExporter`] skips names
    /// that already exist.
    #[must_use]
    pub fn from_clock() -> Self {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX / 2));
        Self::starting_after(millis)
    }

    /// Returns the next id.
    pub fn next_id(&self) -> u64 {
        let mut last = self.last.lock().unwrap_or_else(PoisonError::into_inner);
        *last += 1;
        *last
    }
}

impl Default for LobIdGenerator {
    fn default() -> Self {
        Self::from_clock()
    }
}

/// Kind of large object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LobKind {
    /// Binary data, written verbatim.
    Binary,
    /// Character data, written as UTF-8.
    Text,
}

impl LobKind {
    /// Returns the LOB kind for a column type, if it is a LOB type.
    #[must_use]
    pub fn from_column_type(column_type: ColumnType) -> Option<Self> {
        match column_type {
            ColumnType::LargeBinary => Some(Self::Binary),
            ColumnType::LargeText => Some(Self::Text),
            _ => None,
        }
    }

    /// Returns the file extension used for this kind.
    #[must_use]
    pub fn extension(self) -> &'static str {
        match self {
            Self::Binary => "blob",
            Self::Text => "clob",
        }
    }
}

/// An exported LOB value, pending its patch script line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LobReference {
    /// Owning table.
    pub table: String,
    /// LOB column.
    pub column: String,
    /// Primary key predicate, already rendered as SQL.
    pub predicate: String,
    /// File path relative to the dump directory, `/`-separated.
    pub path: String,
    /// Kind of the exported value.
    pub kind: LobKind,
}

impl LobReference {
    /// Renders the patch script statement for this reference.
    pub fn to_patch_statement(&self, dialect: &impl DumpDialect) -> String {
        let load = match self.kind {
            LobKind::Binary => format!("LOAD_FILE({})", dialect.quote_string(&self.path)),
            LobKind::Text => format!(
                "LOAD_FILE({}, {})",
                dialect.quote_string(&self.path),
                dialect.quote_string(TEXT_ENCODING)
            ),
        };
        format!(
            "UPDATE {} SET {} = {} WHERE {};",
            dialect.quote_identifier(&self.table),
            dialect.quote_identifier(&self.column),
            load,
            self.predicate
        )
    }
}

/// Counters reported by [`LobExporter::export`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LobExportSummary {
    /// LOB values written to files.
    pub exported: usize,
    /// Rows skipped because of an empty or unsupported primary key.
    pub skipped_rows: usize,
    /// LOB columns skipped because their table has no primary key.
    pub skipped_columns: usize,
    /// LOB values that failed to export.
    pub failed: usize,
}

/// Exports BLOB and CLOB column values into separate files.
#[derive(Debug, Clone)]
pub struct LobExporter<D: DumpDialect + Clone> {
    inspector: SchemaInspector<D>,
    ids: Arc<LobIdGenerator>,
}

impl<D: DumpDialect + Clone> LobExporter<D> {
    /// Creates a new exporter drawing file ids from `ids`.
    pub fn new(dialect: D, ids: Arc<LobIdGenerator>) -> Self {
        Self {
            inspector: SchemaInspector::new(dialect),
            ids,
        }
    }

    fn dialect(&self) -> &D {
        self.inspector.dialect()
    }

    /// Exports every LOB column of every base table.
    ///
    /// The patch script is appended to, never truncated. A patch script that
    /// is still empty afterwards is removed.
    pub async fn export(
        &self,
        conn: &mut SqliteConnection,
        manifest: &DumpManifest,
    ) -> Result<LobExportSummary> {
        let lobs_dir = manifest.create_lobs_dir()?;
        let patch_path = manifest.patch_script();
        let mut summary = LobExportSummary::default();

        {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&patch_path)?;
            let mut patch = BufWriter::new(file);

            for table_name in self.inspector.tables(conn).await? {
                let table = self.inspector.describe(conn, &table_name).await?;
                let columns: Vec<ColumnInfo> = table.lob_columns().cloned().collect();
                for column in &columns {
                    self.export_column(conn, &mut patch, &lobs_dir, &table, column, &mut summary)
                        .await?;
                }
            }

            patch.flush()?;
        }

        if fs::metadata(&patch_path)?.len() == 0 {
            fs::remove_file(&patch_path)?;
        }

        info!(
            exported = summary.exported,
            failed = summary.failed,
            skipped_rows = summary.skipped_rows,
            "LOB export finished"
        );
        Ok(summary)
    }

    async fn export_column(
        &self,
        conn: &mut SqliteConnection,
        patch: &mut impl Write,
        lobs_dir: &Path,
        table: &TableDescriptor,
        column: &ColumnInfo,
        summary: &mut LobExportSummary,
    ) -> Result<()> {
        let Some(kind) = LobKind::from_column_type(column.column_type) else {
            return Ok(());
        };

        if table.primary_key.is_empty() {
            warn!(
                table = %table.name,
                column = %column.name,
                "Can't export LOBs from a table without primary key"
            );
            summary.skipped_columns += 1;
            return Ok(());
        }

        debug!(table = %table.name, column = %column.name, "Exporting LOB column");
        let sql = self
            .dialect()
            .lob_scan_sql(&table.name, &table.primary_key, &column.name);
        let mut rows = sqlx::query(&sql).fetch(&mut *conn);

        while let Some(row) = rows.try_next().await? {
            let Some(predicate) = self.key_predicate(table, &row)? else {
                summary.skipped_rows += 1;
                continue;
            };

            let value = match CellValue::from_row(&row, table.primary_key.len()) {
                Ok(CellValue::Null) => continue,
                Ok(value) => value,
                Err(e) => {
                    log_lob_failure(table, column, &predicate, &e);
                    summary.failed += 1;
                    continue;
                }
            };

            let exported = self
                .write_lob(lobs_dir, kind, &value)
                .and_then(|file_name| {
                    let reference = LobReference {
                        table: table.name.clone(),
                        column: column.name.clone(),
                        predicate: predicate.clone(),
                        path: format!("{LOBS_DIR}/{file_name}"),
                        kind,
                    };
                    writeln!(patch, "{}", reference.to_patch_statement(self.dialect()))?;
                    Ok(())
                });

            match exported {
                Ok(()) => summary.exported += 1,
                Err(e) => {
                    log_lob_failure(table, column, &predicate, &e);
                    summary.failed += 1;
                }
            }
        }

        Ok(())
    }

    /// Builds the `WHERE` predicate identifying a row by its primary key.
    ///
    /// Returns `None` (after logging) if a key value is NULL or of a type that
    /// can't be rendered as a literal.
    fn key_predicate(
        &self,
        table: &TableDescriptor,
        row: &sqlx::sqlite::SqliteRow,
    ) -> Result<Option<String>> {
        let mut conditions = Vec::with_capacity(table.primary_key.len());
        for (index, key) in table.primary_key.iter().enumerate() {
            let literal = match CellValue::from_row(row, index)? {
                value @ (CellValue::Integer(_) | CellValue::Real(_)) => value.to_string(),
                CellValue::Text(s) => text_key_literal(self.dialect(), &s),
                CellValue::Null => {
                    warn!(table = %table.name, column = %key, "Empty primary key");
                    return Ok(None);
                }
                CellValue::Blob(_) => {
                    warn!(
                        table = %table.name,
                        column = %key,
                        "Unsupported type of primary key"
                    );
                    return Ok(None);
                }
            };
            conditions.push(format!(
                "{} = {}",
                self.dialect().quote_identifier(key),
                literal
            ));
        }
        Ok(Some(conditions.join(" AND ")))
    }

    /// Writes one LOB value to a fresh file and returns its file name.
    fn write_lob(&self, lobs_dir: &Path, kind: LobKind, value: &CellValue) -> Result<String> {
        let bytes = lob_bytes(kind, value)?;
        let (file_name, path, mut file) = loop {
            let file_name = format!("{}.{}", self.ids.next_id(), kind.extension());
            let path = lobs_dir.join(&file_name);
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(file) => break (file_name, path, file),
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    debug!(file = %file_name, "LOB file name taken, drawing next id");
                }
                Err(e) => return Err(e.into()),
            }
        };
        let written = file.write_all(&bytes).and_then(|()| file.sync_all());
        if let Err(e) = written {
            drop(file);
            let _ = fs::remove_file(&path);
            return Err(e.into());
        }
        Ok(file_name)
    }
}

/// Renders a text key literal that fits on one patch script line.
///
/// Line breaks are spliced in as `char(10)` and `char(13)`.
fn text_key_literal(dialect: &impl DumpDialect, value: &str) -> String {
    if !value.contains(['\n', '\r']) {
        return dialect.quote_string(value);
    }

    let mut parts = Vec::new();
    let mut run = String::new();
    for c in value.chars() {
        if c == '\n' || c == '\r' {
            if !run.is_empty() {
                parts.push(dialect.quote_string(&run));
                run.clear();
            }
            parts.push(format!("char({})", u32::from(c)));
        } else {
            run.push(c);
        }
    }
    if !run.is_empty() {
        parts.push(dialect.quote_string(&run));
    }
    format!("({})", parts.join(" || "))
}

fn lob_bytes(kind: LobKind, value: &CellValue) -> Result<Cow<'_, [u8]>> {
    match (kind, value) {
        (_, CellValue::Text(s)) => Ok(Cow::Borrowed(s.as_bytes())),
        (LobKind::Binary, CellValue::Blob(b)) => Ok(Cow::Borrowed(b)),
        (LobKind::Text, CellValue::Blob(b)) => std::str::from_utf8(b)
            .map(|_| Cow::Borrowed(b.as_slice()))
            .map_err(|_| BackupError::UnsupportedEncoding("CLOB value is not UTF-8".into())),
        (_, other) => Ok(Cow::Owned(other.to_string().into_bytes())),
    }
}

fn log_lob_failure(
    table: &TableDescriptor,
    column: &ColumnInfo,
    predicate: &str,
    error: &BackupError,
) {
    warn!(
        table = %table.name,
        column = %column.name,
        primary_key = %predicate,
        error = %error,
        "Can't write LOB"
    );
}

/// Matches one `LOAD_FILE` patch statement.
const PATCH_PATTERN: &str = r"^UPDATE\s+(.+?)\s+SET\s+(.+?)\s*=\s*LOAD_FILE\(\s*'((?:[^']|'')*)'\s*(?:,\s*'([^']*)'\s*)?\)\s+WHERE\s+(.+?)\s*;?\s*$";

/// Replays a LOB patch script against `conn`.
///
/// `LOAD_FILE` statements are executed as parameterized updates with the
/// file content read relative to the dump directory. Any other non-blank
/// line is executed verbatim. Returns the number of executed statements.
pub async fn replay_patch_script(
    conn: &mut SqliteConnection,
    manifest: &DumpManifest,
) -> Result<usize> {
    let script_path = manifest.patch_script();
    if !script_path.is_file() {
        return Ok(0);
    }

    let pattern = Regex::new(PATCH_PATTERN)?;
    let script = fs::read_to_string(&script_path)?;
    let mut executed = 0;

    for line in script.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with("--") {
            continue;
        }

        let Some(caps) = pattern.captures(line) else {
            sqlx::query(line).execute(&mut *conn).await?;
            executed += 1;
            continue;
        };

        let relative = caps[3].replace("''", "'");
        let file = manifest.root().join(&relative);
        let content = fs::read(&file).map_err(|e| BackupError::InvalidDump {
            path: file.clone(),
            message: format!("referenced LOB file is not readable: {e}"),
        })?;

        let sql = format!("UPDATE {} SET {} = ? WHERE {}", &caps[1], &caps[2], &caps[5]);
        match caps.get(4).map(|m| m.as_str()) {
            None => {
                sqlx::query(&sql).bind(content).execute(&mut *conn).await?;
            }
            Some(encoding) if is_utf8(encoding) => {
                let text = String::from_utf8(content).map_err(|_| BackupError::InvalidDump {
                    path: file.clone(),
                    message: "character LOB is not valid UTF-8".to_string(),
                })?;
                sqlx::query(&sql).bind(text).execute(&mut *conn).await?;
            }
            Some(encoding) => return Err(BackupError::UnsupportedEncoding(encoding.to_string())),
        }
        executed += 1;
    }

    info!(statements = executed, "LOB patch script replayed");
    Ok(executed)
}

fn is_utf8(encoding: &str) -> bool {
    encoding.eq_ignore_ascii_case("UTF-8") || encoding.eq_ignore_ascii_case("UTF8")
}
