//! SQLite dialect.
//!
//! SQLite has no named sequences. `AUTOINCREMENT` tables keep their last
//! handed-out key in the `sqlite_sequence` catalog, one row per table, so
//! the sequence name is the table name itself and the prefix is empty.
//! Referential integrity is a per-connection pragma.

use super::DumpDialect;

/// SQLite dump dialect.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteDialect;

impl SqliteDialect {
    /// Creates a new SQLite dialect.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl DumpDialect for SqliteDialect {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn list_tables_sql(&self) -> &'static str {
        "SELECT name FROM sqlite_master \
         WHERE type = 'table' AND name NOT LIKE 'sqlite_%' \
         ORDER BY name ASC"
    }

    fn table_columns_sql(&self, table: &str) -> String {
        format!(
            "SELECT name, type, pk FROM pragma_table_info({}) ORDER BY cid",
            self.quote_string(table)
        )
    }

    fn sequence_catalog_sql(&self) -> &'static str {
        "SELECT name FROM sqlite_master WHERE type = 'table' AND name = 'sqlite_sequence'"
    }

    fn list_sequences_sql(&self) -> &'static str {
        "SELECT name FROM sqlite_sequence ORDER BY name ASC"
    }

    fn sequence_prefix(&self) -> &'static str {
        ""
    }

    fn restart_sequence_sql(&self, sequence: &str, next: i64) -> String {
        // sqlite_sequence stores the last value handed out, not the next one.
        format!(
            "UPDATE sqlite_sequence SET seq = {} WHERE name = {}",
            next - 1,
            self.quote_string(sequence)
        )
    }

    fn referential_integrity_sql(&self, enabled: bool) -> &'static str {
        if enabled {
            "PRAGMA foreign_keys = ON"
        } else {
            "PRAGMA foreign_keys = OFF"
        }
    }

    fn compact_sql(&self) -> &'static str {
        "VACUUM"
    }

    fn backup_to_sql(&self, path: &str) -> String {
        format!("VACUUM INTO {}", self.quote_string(path))
    }

    fn schema_script_sql(&self) -> &'static str {
        "SELECT sql FROM sqlite_master \
         WHERE sql IS NOT NULL AND name NOT LIKE 'sqlite_%' \
         ORDER BY CASE type WHEN 'table' THEN 0 ELSE 1 END, name"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_identifier() {
        let dialect = SqliteDialect::new();
        assert_eq!(dialect.quote_identifier("users"), "\"users\"");
        assert_eq!(dialect.quote_identifier("we\"ird"), "\"we\"\"ird\"");
    }

    #[test]
    fn test_quote_string() {
        let dialect = SqliteDialect::new();
        assert_eq!(dialect.quote_string("O'Brien"), "'O''Brien'");
    }

    #[test]
    fn test_restart_sequence_stores_previous_value() {
        let dialect = SqliteDialect::new();
        assert_eq!(
            dialect.restart_sequence_sql("users", 43),
            "UPDATE sqlite_sequence SET seq = 42 WHERE name = 'users'"
        );
        assert_eq!(
            dialect.restart_sequence_sql("users", 1),
            "UPDATE sqlite_sequence SET seq = 0 WHERE name = 'users'"
        );
    }

    #[test]
    fn test_lob_scan_sql() {
        let dialect = SqliteDialect::new();
        let sql = dialect.lob_scan_sql(
            "images",
            &["owner".to_string(), "idx".to_string()],
            "data",
        );
        assert_eq!(
            sql,
            "SELECT \"owner\", \"idx\", \"data\" FROM \"images\" ORDER BY \"owner\", \"idx\""
        );
    }

    #[test]
    fn test_backup_to_sql() {
        let dialect = SqliteDialect::new();
        assert_eq!(
            dialect.backup_to_sql("/var/backups/it's.sqlite3"),
            "VACUUM INTO '/var/backups/it''s.sqlite3'"
        );
    }
}
