//! Schema introspection.
//!
//! Tables, primary keys and column types are read from the live catalog on
//! every call. Nothing is cached: the schema may change between runs.

use sqlx::SqliteConnection;

use crate::dialect::DumpDialect;
use crate::error::Result;

/// Runtime classification of a column's SQL type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColumnType {
    /// Character data (CHAR, VARCHAR, TEXT, ...).
    Text,
    /// Numbers, booleans and anything without a more specific class.
    Numeric,
    /// Date only.
    Date,
    /// Time of day, with or without zone.
    Time,
    /// Timestamp without zone.
    Timestamp,
    /// Timestamp with zone offset.
    TimestampTz,
    /// Binary large object.
    LargeBinary,
    /// Character large object.
    LargeText,
    /// No matching live column.
    Unsupported,
}

impl ColumnType {
    /// Classifies a declared column type such as `VARCHAR(255)` or
    /// `TIMESTAMP WITH TIME ZONE`.
    #[must_use]
    pub fn from_declared(declared: &str) -> Self {
        let upper = declared.trim().to_ascii_uppercase();
        let base = upper
            .split('(')
            .next()
            .unwrap_or_default()
            .trim()
            .to_string();

        let with_zone = upper.contains("WITH TIME ZONE");
        match base.as_str() {
            "CLOB" | "NCLOB" | "LONGTEXT" | "MEDIUMTEXT" | "CHARACTER LARGE OBJECT"
            | "NATIONAL CHARACTER LARGE OBJECT" => Self::LargeText,
            "BLOB" | "TINYBLOB" | "LONGBLOB" | "MEDIUMBLOB" | "BINARY LARGE OBJECT" | "BYTEA"
            | "VARBINARY" | "LONGVARBINARY" => Self::LargeBinary,
            _ if base.starts_with("BINARY") => Self::LargeBinary,
            "TIMESTAMPTZ" => Self::TimestampTz,
            "DATETIME" => Self::Timestamp,
            "DATE" => Self::Date,
            "TIMETZ" => Self::Time,
            _ if base.starts_with("TIMESTAMP") => {
                if with_zone {
                    Self::TimestampTz
                } else {
                    Self::Timestamp
                }
            }
            _ if base.starts_with("TIME") => Self::Time,
            "TEXT" | "CHAR" | "VARCHAR" | "NCHAR" | "NVARCHAR" | "LONGVARCHAR"
            | "LONGNVARCHAR" | "XML" | "JSON" | "UUID" | "STRING" => Self::Text,
            _ if base.starts_with("CHARACTER")
                || base.starts_with("NATIONAL")
                || base.starts_with("VARYING") =>
            {
                Self::Text
            }
            _ => Self::Numeric,
        }
    }

    /// Returns whether values of this type are exported as separate LOB files.
    #[must_use]
    pub fn is_lob(self) -> bool {
        matches!(self, Self::LargeBinary | Self::LargeText)
    }
}

/// A column as reported by the live catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnInfo {
    /// Column name.
    pub name: String,
    /// Declared type, verbatim.
    pub declared_type: String,
    /// Classification of the declared type.
    pub column_type: ColumnType,
}

/// A table with its primary key and column types.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableDescriptor {
    /// Table name.
    pub name: String,
    /// Primary key columns ordered by key sequence.
    pub primary_key: Vec<String>,
    /// Columns in table order.
    pub columns: Vec<ColumnInfo>,
}

impl TableDescriptor {
    /// Looks up a column by name, ignoring case.
    #[must_use]
    pub fn column(&self, name: &str) -> Option<&ColumnInfo> {
        self.columns
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name))
    }

    /// Returns the classification of a column, or
    /// [`ColumnType::Unsupported`] if the table has no such column.
    #[must_use]
    pub fn column_type(&self, name: &str) -> ColumnType {
        self.column(name)
            .map_or(ColumnType::Unsupported, |c| c.column_type)
    }

    /// Returns the column names in table order.
    #[must_use]
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// Returns the LOB columns of this table.
    pub fn lob_columns(&self) -> impl Iterator<Item = &ColumnInfo> {
        self.columns.iter().filter(|c| c.column_type.is_lob())
    }
}

/// Reads tables, keys and column types from a live connection.
#[derive(Debug, Clone)]
pub struct SchemaInspector<D: DumpDialect> {
    dialect: D,
}

impl<D: DumpDialect> SchemaInspector<D> {
    /// Creates a new inspector.
    pub fn new(dialect: D) -> Self {
        Self { dialect }
    }

    /// Returns the dialect.
    #[must_use]
    pub fn dialect(&self) -> &D {
        &self.dialect
    }

    /// Lists base tables in alphabetical order.
    pub async fn tables(&self, conn: &mut SqliteConnection) -> Result<Vec<String>> {
        let rows: Vec<(String,)> = sqlx::query_as(self.dialect.list_tables_sql())
            .fetch_all(&mut *conn)
            .await?;
        Ok(rows.into_iter().map(|(name,)| name).collect())
    }

    /// Describes a single table.
    ///
    /// A table without columns in the catalog yields an empty descriptor.
    pub async fn describe(
        &self,
        conn: &mut SqliteConnection,
        table: &str,
    ) -> Result<TableDescriptor> {
        let rows: Vec<(String, String, i64)> =
            sqlx::query_as(&self.dialect.table_columns_sql(table))
                .fetch_all(&mut *conn)
                .await?;

        let mut keys: Vec<(i64, String)> = rows
            .iter()
            .filter(|(_, _, pk)| *pk > 0)
            .map(|(name, _, pk)| (*pk, name.clone()))
            .collect();
        keys.sort_by_key(|(seq, _)| *seq);

        let columns = rows
            .into_iter()
            .map(|(name, declared_type, _)| ColumnInfo {
                column_type: ColumnType::from_declared(&declared_type),
                name,
                declared_type,
            })
            .collect();

        Ok(TableDescriptor {
            name: table.to_string(),
            primary_key: keys.into_iter().map(|(_, name)| name).collect(),
            columns,
        })
    }

    /// Returns the primary key columns of a table, ordered by key sequence.
    pub async fn primary_key(
        &self,
        conn: &mut SqliteConnection,
        table: &str,
    ) -> Result<Vec<String>> {
        Ok(self.describe(conn, table).await?.primary_key)
    }

    /// Lists sequence names in alphabetical order.
    pub async fn sequences(&self, conn: &mut SqliteConnection) -> Result<Vec<String>> {
        let catalog: Option<(String,)> = sqlx::query_as(self.dialect.sequence_catalog_sql())
            .fetch_optional(&mut *conn)
            .await?;
        if catalog.is_none() {
            return Ok(Vec::new());
        }

        let rows: Vec<(String,)> = sqlx::query_as(self.dialect.list_sequences_sql())
            .fetch_all(&mut *conn)
            .await?;
        Ok(rows.into_iter().map(|(name,)| name).collect())
    }

    /// Returns the DDL statements that recreate the schema.
    pub async fn schema_script(&self, conn: &mut SqliteConnection) -> Result<Vec<String>> {
        let rows: Vec<(String,)> = sqlx::query_as(self.dialect.schema_script_sql())
            .fetch_all(&mut *conn)
            .await?;
        Ok(rows.into_iter().map(|(sql,)| sql).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::SqliteDialect;
    use sqlx::Connection;

    async fn create_test_connection() -> SqliteConnection {
        SqliteConnection::connect("sqlite::memory:")
            .await
            .expect("Failed to open in-memory SQLite database")
    }

    #[test]
    fn test_classify_declared_types() {
        assert_eq!(ColumnType::from_declared("VARCHAR(255)"), ColumnType::Text);
        assert_eq!(ColumnType::from_declared("text"), ColumnType::Text);
        assert_eq!(
            ColumnType::from_declared("CHARACTER VARYING(10)"),
            ColumnType::Text
        );
        assert_eq!(ColumnType::from_declared("INTEGER"), ColumnType::Numeric);
        assert_eq!(ColumnType::from_declared("DECIMAL(10,2)"), ColumnType::Numeric);
        assert_eq!(ColumnType::from_declared(""), ColumnType::Numeric);
        assert_eq!(ColumnType::from_declared("DATE"), ColumnType::Date);
        assert_eq!(ColumnType::from_declared("TIME"), ColumnType::Time);
        assert_eq!(
            ColumnType::from_declared("TIME WITH TIME ZONE"),
            ColumnType::Time
        );
        assert_eq!(ColumnType::from_declared("DATETIME"), ColumnType::Timestamp);
        assert_eq!(ColumnType::from_declared("TIMESTAMP(3)"), ColumnType::Timestamp);
        assert_eq!(
            ColumnType::from_declared("TIMESTAMP WITH TIME ZONE"),
            ColumnType::TimestampTz
        );
        assert_eq!(ColumnType::from_declared("TIMESTAMPTZ"), ColumnType::TimestampTz);
        assert_eq!(ColumnType::from_declared("BLOB"), ColumnType::LargeBinary);
        assert_eq!(ColumnType::from_declared("clob"), ColumnType::LargeText);
        assert_eq!(ColumnType::from_declared("VARBINARY(16)"), ColumnType::LargeBinary);
        assert_eq!(ColumnType::from_declared("BINARY(8)"), ColumnType::LargeBinary);
        assert_eq!(ColumnType::from_declared("BINARY VARYING(8)"), ColumnType::LargeBinary);
        assert_eq!(ColumnType::from_declared("bytea"), ColumnType::LargeBinary);
    }

    #[tokio::test]
    async fn test_tables_are_sorted() {
        let mut conn = create_test_connection().await;
        for sql in [
            "CREATE TABLE zebra (id INTEGER PRIMARY KEY)",
            "CREATE TABLE apple (id INTEGER PRIMARY KEY)",
            "CREATE TABLE mango (id INTEGER PRIMARY KEY)",
        ] {
            sqlx::query(sql).execute(&mut conn).await.unwrap();
        }

        let inspector = SchemaInspector::new(SqliteDialect::new());
        let tables = inspector.tables(&mut conn).await.unwrap();
        assert_eq!(tables, vec!["apple", "mango", "zebra"]);
    }

    #[tokio::test]
    async fn test_describe_composite_key_order() {
        let mut conn = create_test_connection().await;
        sqlx::query(
            "CREATE TABLE grants (subject TEXT, owner INTEGER, granted DATETIME, \
             PRIMARY KEY (owner, subject))",
        )
        .execute(&mut conn)
        .await
        .unwrap();

        let inspector = SchemaInspector::new(SqliteDialect::new());
        let table = inspector.describe(&mut conn, "grants").await.unwrap();

        assert_eq!(table.primary_key, vec!["owner", "subject"]);
        assert_eq!(table.column_names(), vec!["subject", "owner", "granted"]);
        assert_eq!(table.column_type("GRANTED"), ColumnType::Timestamp);
        assert_eq!(table.column_type("missing"), ColumnType::Unsupported);
    }

    #[tokio::test]
    async fn test_sequences_without_autoincrement() {
        let mut conn = create_test_connection().await;
        sqlx::query("CREATE TABLE plain (id INTEGER PRIMARY KEY)")
            .execute(&mut conn)
            .await
            .unwrap();

        let inspector = SchemaInspector::new(SqliteDialect::new());
        assert!(inspector.sequences(&mut conn).await.unwrap().is_empty());

        sqlx::query("CREATE TABLE counted (id INTEGER PRIMARY KEY AUTOINCREMENT)")
            .execute(&mut conn)
            .await
            .unwrap();
        sqlx::query("INSERT INTO counted DEFAULT VALUES")
            .execute(&mut conn)
            .await
            .unwrap();
        assert_eq!(inspector.sequences(&mut conn).await.unwrap(), vec!["counted"]);
    }
}
