//! Database dialect implementations.
//!
//! Each dialect knows the catalog queries and administrative statements
//! that dump, restore and backup need from a specific database system.
//! Everything else goes through plain SQL.

mod sqlite;

pub use sqlite::SqliteDialect;

/// Trait for database-specific SQL used by the dump and restore engine.
pub trait DumpDialect: Send + Sync {
    /// Returns the dialect name.
    fn name(&self) -> &'static str;

    /// Query listing base table names in ascending order.
    ///
    /// The first result column must hold the table name.
    fn list_tables_sql(&self) -> &'static str;

    /// Query describing the columns of a table.
    ///
    /// Result columns: `name` (TEXT), `type` (declared type, TEXT) and
    /// `pk` (1-based position in the primary key, 0 if not part of it),
    /// ordered by column position.
    fn table_columns_sql(&self, table: &str) -> String;

    /// Query returning a single row if the sequence catalog exists.
    fn sequence_catalog_sql(&self) -> &'static str;

    /// Query listing sequence names in ascending order.
    fn list_sequences_sql(&self) -> &'static str;

    /// Prefix that maps a sequence name to its owning table.
    fn sequence_prefix(&self) -> &'static str;

    /// Statement restarting a sequence so `next` is the next value handed out.
    fn restart_sequence_sql(&self, sequence: &str, next: i64) -> String;

    /// Statement toggling referential integrity checks.
    fn referential_integrity_sql(&self, enabled: bool) -> &'static str;

    /// Statement compacting the database storage.
    fn compact_sql(&self) -> &'static str;

    /// Statement asking the server to write a copy of the database to `path`.
    fn backup_to_sql(&self, path: &str) -> String;

    /// Query returning one DDL statement per row in the first column.
    fn schema_script_sql(&self) -> &'static str;

    /// Query selecting the maximum value of a key column.
    fn max_value_sql(&self, table: &str, column: &str) -> String {
        format!(
            "SELECT MAX({}) FROM {}",
            self.quote_identifier(column),
            self.quote_identifier(table)
        )
    }

    /// Query scanning every row and column of a table.
    fn select_all_sql(&self, table: &str) -> String {
        format!("SELECT * FROM {}", self.quote_identifier(table))
    }

    /// Statement removing every row of a table.
    fn clear_table_sql(&self, table: &str) -> String {
        format!("DELETE FROM {}", self.quote_identifier(table))
    }

    /// Query selecting the primary key columns followed by a LOB column,
    /// ordered by the primary key.
    fn lob_scan_sql(&self, table: &str, primary_key: &[String], column: &str) -> String {
        let keys: Vec<String> = primary_key
            .iter()
            .map(|c| self.quote_identifier(c))
            .collect();
        format!(
            "SELECT {}, {} FROM {} ORDER BY {}",
            keys.join(", "),
            self.quote_identifier(column),
            self.quote_identifier(table),
            keys.join(", ")
        )
    }

    /// Quote an identifier (table name, column name, etc.).
    fn quote_identifier(&self, name: &str) -> String {
        format!("\"{}\"", name.replace('"', "\"\""))
    }

    /// Quote a string literal.
    fn quote_string(&self, value: &str) -> String {
        format!("'{}'", value.replace('\'', "''"))
    }
}
