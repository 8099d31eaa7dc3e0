//! Runtime cell values.

use std::fmt;

use sqlx::sqlite::SqliteRow;
use sqlx::{Row, TypeInfo, ValueRef};

use crate::error::Result;

/// Literal written for NULL cells and LOB placeholders.
pub const NULL_LITERAL: &str = "NULL";

/// A single cell read from a result row, tagged by its storage class.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    /// SQL NULL.
    Null,
    /// Integer value.
    Integer(i64),
    /// Floating point value.
    Real(f64),
    /// Text value.
    Text(String),
    /// Binary value.
    Blob(Vec<u8>),
}

impl CellValue {
    /// Decodes the cell at `index` using the storage class the driver reports
    /// for this particular value.
    pub fn from_row(row: &SqliteRow, index: usize) -> Result<Self> {
        let raw = row.try_get_raw(index)?;
        if raw.is_null() {
            return Ok(Self::Null);
        }

        let storage = raw.type_info().name().to_ascii_uppercase();
        let value = match storage.as_str() {
            "INTEGER" | "BOOLEAN" => Self::Integer(row.try_get(index)?),
            "REAL" => Self::Real(row.try_get(index)?),
            "BLOB" => Self::Blob(row.try_get(index)?),
            _ => Self::Text(row.try_get(index)?),
        };
        Ok(value)
    }

    /// Returns whether this is SQL NULL.
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str(NULL_LITERAL),
            Self::Integer(i) => write!(f, "{i}"),
            Self::Real(r) => write!(f, "{r}"),
            Self::Text(s) => f.write_str(s),
            Self::Blob(b) => f.write_str(&String::from_utf8_lossy(b)),
        }
    }
}
