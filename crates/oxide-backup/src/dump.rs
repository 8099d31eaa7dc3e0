//! Table dumps.
//!
//! Every base table is scanned with `SELECT *` and written to
//! `<table>.csv`: a header row with the column names, then one record per
//! row. BLOB cells are written as the `NULL` placeholder; their content is
//! exported separately by the [`LobExporter`]. CLOB cells are inlined.

use std::borrow::Cow;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use futures::TryStreamExt;
use sqlx::SqliteConnection;
use tracing::{debug, info, warn};

use crate::dialect::DumpDialect;
use crate::error::Result;
use crate::lob::{LobExportSummary, LobExporter, LobIdGenerator};
use crate::manifest::{csv_writer, DumpManifest};
use crate::schema::{ColumnType, SchemaInspector, TableDescriptor};
use crate::value::{CellValue, NULL_LITERAL};

/// Renders a cell for a table file.
#[must_use]
pub fn render_cell(column_type: ColumnType, value: &CellValue) -> Cow<'_, str> {
    match (column_type, value) {
        (ColumnType::LargeBinary, _) | (_, CellValue::Null | CellValue::Blob(_)) => {
            Cow::Borrowed(NULL_LITERAL)
        }
        (_, CellValue::Text(s)) => Cow::Borrowed(s.as_str()),
        (_, other) => Cow::Owned(other.to_string()),
    }
}

/// Writes the rows of single tables into delimited files.
#[derive(Debug, Clone)]
pub struct TableDumper<D: DumpDialect> {
    inspector: SchemaInspector<D>,
}

impl<D: DumpDialect> TableDumper<D> {
    /// Creates a new table dumper.
    pub fn new(dialect: D) -> Self {
        Self {
            inspector: SchemaInspector::new(dialect),
        }
    }

    /// Dumps one table into `path` and returns the number of rows written.
    pub async fn dump_table(
        &self,
        conn: &mut SqliteConnection,
        table: &TableDescriptor,
        path: &Path,
    ) -> Result<u64> {
        info!(table = %table.name, "Dumping table");

        let mut writer = csv_writer(path)?;
        writer.write_record(table.column_names())?;

        let types: Vec<ColumnType> = table.columns.iter().map(|c| c.column_type).collect();
        let sql = self.inspector.dialect().select_all_sql(&table.name);
        let mut rows = sqlx::query(&sql).fetch(&mut *conn);
        let mut count = 0u64;
        let mut blob_warned = vec![false; types.len()];

        while let Some(row) = rows.try_next().await? {
            let mut record = Vec::with_capacity(types.len());
            for (index, column_type) in types.iter().enumerate() {
                let value = CellValue::from_row(&row, index)?;
                if matches!(value, CellValue::Blob(_))
                    && !column_type.is_lob()
                    && !blob_warned[index]
                {
                    warn!(
                        table = %table.name,
                        column = %table.columns[index].name,
                        "Binary value in a non-LOB column is written as NULL"
                    );
                    blob_warned[index] = true;
                }
                record.push(render_cell(*column_type, &value).into_owned());
            }
            writer.write_record(&record)?;
            count += 1;
        }

        writer.flush()?;
        debug!(table = %table.name, rows = count, "Table dumped");
        Ok(count)
    }

    /// Dumps every base table in alphabetical order.
    ///
    /// The first failing table aborts the dump. Files already written stay on
    /// disk.
    pub async fn dump_tables(
        &self,
        conn: &mut SqliteConnection,
        manifest: &DumpManifest,
    ) -> Result<Vec<(String, u64)>> {
        let mut dumped = Vec::new();
        for name in self.inspector.tables(conn).await? {
            let table = self.inspector.describe(conn, &name).await?;
            let rows = self
                .dump_table(conn, &table, &manifest.table_file(&name))
                .await?;
            dumped.push((name, rows));
        }
        Ok(dumped)
    }

    /// Writes the DDL of the database into the schema script.
    pub async fn dump_schema(
        &self,
        conn: &mut SqliteConnection,
        manifest: &DumpManifest,
    ) -> Result<()> {
        let statements = self.inspector.schema_script(conn).await?;
        let mut script = String::new();
        for statement in statements {
            script.push_str(statement.trim_end_matches(';'));
            script.push_str(";\n");
        }
        fs::write(manifest.schema_script(), script)?;
        Ok(())
    }
}

/// Result of a full dump.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DumpSummary {
    /// Dumped tables with their row counts, in dump order.
    pub tables: Vec<(String, u64)>,
    /// LOB export counters, if LOBs were exported.
    pub lobs: Option<LobExportSummary>,
}

/// Dumps a whole database into a dump directory.
#[derive(Debug, Clone)]
pub struct DatabaseDumper<D: DumpDialect + Clone> {
    tables: TableDumper<D>,
    lobs: LobExporter<D>,
    with_lobs: bool,
}

impl<D: DumpDialect + Clone> DatabaseDumper<D> {
    /// Creates a dumper that exports LOBs with ids drawn from `ids`.
    pub fn new(dialect: D, ids: Arc<LobIdGenerator>) -> Self {
        Self {
            tables: TableDumper::new(dialect.clone()),
            lobs: LobExporter::new(dialect, ids),
            with_lobs: true,
        }
    }

    /// Enables or disables LOB export.
    #[must_use]
    pub fn with_lobs(mut self, enabled: bool) -> Self {
        self.with_lobs = enabled;
        self
    }

    /// Writes schema script, table files and LOBs into `directory`.
    pub async fn dump(
        &self,
        conn: &mut SqliteConnection,
        directory: &Path,
    ) -> Result<DumpSummary> {
        let manifest = DumpManifest::new(directory);
        manifest.create()?;

        self.tables.dump_schema(conn, &manifest).await?;
        let tables = self.tables.dump_tables(conn, &manifest).await?;
        let lobs = if self.with_lobs {
            Some(self.lobs.export(conn, &manifest).await?)
        } else {
            None
        };

        info!(
            directory = %directory.display(),
            tables = tables.len(),
            "Dump finished"
        );
        Ok(DumpSummary { tables, lobs })
    }
}
