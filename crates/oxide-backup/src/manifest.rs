//! Dump directory layout.
//!
//! ```text
//! <dump>/
//!   <table>.csv      one delimited file per table
//!   schema.sql       DDL of every table
//!   lobs.sql         LOB patch script (optional, append-only)
//!   lobs/
//!     <id>.blob
//!     <id>.clob
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use csv::{QuoteStyle, ReaderBuilder, WriterBuilder};

use crate::error::Result;

/// Extension of table files.
pub const TABLE_EXTENSION: &str = "csv";
/// Name of the LOB directory.
pub const LOBS_DIR: &str = "lobs";
/// Name of the LOB patch script.
pub const PATCH_SCRIPT: &str = "lobs.sql";
/// Name of the schema script.
pub const SCHEMA_SCRIPT: &str = "schema.sql";

/// Paths inside a dump directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DumpManifest {
    root: PathBuf,
}

impl DumpManifest {
    /// Creates a manifest for the given dump directory.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Returns the dump directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns the file holding the rows of `table`.
    #[must_use]
    pub fn table_file(&self, table: &str) -> PathBuf {
        self.root.join(format!("{table}.{TABLE_EXTENSION}"))
    }

    /// Returns the LOB directory.
    #[must_use]
    pub fn lobs_dir(&self) -> PathBuf {
        self.root.join(LOBS_DIR)
    }

    /// Returns the LOB patch script.
    #[must_use]
    pub fn patch_script(&self) -> PathBuf {
        self.root.join(PATCH_SCRIPT)
    }

    /// Returns the schema script.
    #[must_use]
    pub fn schema_script(&self) -> PathBuf {
        self.root.join(SCHEMA_SCRIPT)
    }

    /// Creates the dump directory if it doesn't exist.
    pub fn create(&self) -> Result<()> {
        fs::create_dir_all(&self.root)?;
        Ok(())
    }

    /// Creates the LOB directory if it doesn't exist.
    pub fn create_lobs_dir(&self) -> Result<PathBuf> {
        let dir = self.lobs_dir();
        fs::create_dir_all(&dir)?;
        Ok(dir)
    }

    /// Lists `(table, file)` pairs for every table file, sorted by table name.
    ///
    /// The extension is matched case-insensitively.
    pub fn table_files(&self) -> Result<Vec<(String, PathBuf)>> {
        let mut files = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let path = entry?.path();
            if !path.is_file() {
                continue;
            }
            let is_table = path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| e.eq_ignore_ascii_case(TABLE_EXTENSION));
            if !is_table {
                continue;
            }
            if let Some(table) = path.file_stem().and_then(|s| s.to_str()) {
                files.push((table.to_string(), path.clone()));
            }
        }
        files.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(files)
    }
}

/// Builds the writer used for table files.
///
/// Fields are quoted only when they contain the delimiter, the quote
/// character or a line break. Embedded quotes are doubled.
pub fn csv_writer(path: &Path) -> Result<csv::Writer<fs::File>> {
    Ok(WriterBuilder::new()
        .quote_style(QuoteStyle::Necessary)
        .double_quote(true)
        .from_path(path)?)
}

/// Builds the reader used for table files. The first record is the header.
pub fn csv_reader(path: &Path) -> Result<csv::Reader<fs::File>> {
    Ok(ReaderBuilder::new()
        .has_headers(true)
        .double_quote(true)
        .from_path(path)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_files_sorted_and_filtered() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = DumpManifest::new(dir.path());
        for name in ["orders.csv", "Accounts.CSV", "lobs.sql", "notes.txt"] {
            fs::write(dir.path().join(name), "").unwrap();
        }
        manifest.create_lobs_dir().unwrap();

        let tables: Vec<String> = manifest
            .table_files()
            .unwrap()
            .into_iter()
            .map(|(t, _)| t)
            .collect();
        assert_eq!(tables, vec!["Accounts", "orders"]);
    }

    #[test]
    fn test_minimal_quoting() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.csv");
        let mut writer = csv_writer(&path).unwrap();
        writer
            .write_record(["plain", "a,b", "say \"hi\"", "two\nlines"])
            .unwrap();
        writer.flush().unwrap();
        drop(writer);

        let written = fs::read_to_string(&path).unwrap();
        assert_eq!(written, "plain,\"a,b\",\"say \"\"hi\"\"\",\"two\nlines\"\n");
    }
}
