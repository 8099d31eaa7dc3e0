//! Error types for dump, restore and backup operations.

use std::path::PathBuf;

/// Errors that can occur while dumping, restoring or maintaining backups.
#[derive(Debug, thiserror::Error)]
pub enum BackupError {
    /// Database error while querying or executing statements.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// IO error (reading/writing dump files, LOB files, backups).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to read or write a delimited table file.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Invalid regular expression.
    #[error("Pattern error: {0}")]
    Pattern(#[from] regex::Error),

    /// The connection configuration is missing or unusable.
    #[error("Invalid configuration '{path}': {message}")]
    Config {
        /// Path to the configuration file.
        path: PathBuf,
        /// Error message.
        message: String,
    },

    /// A connection id is not defined in the configuration file.
    #[error("Connection '{0}' is not defined in the configuration")]
    UnknownConnection(String),

    /// A dump directory or one of its files is malformed.
    #[error("Invalid dump '{path}': {message}")]
    InvalidDump {
        /// Offending file or directory.
        path: PathBuf,
        /// Error message.
        message: String,
    },

    /// An INSERT failed while restoring a table.
    #[error("Restoring table '{table}' failed: {source}")]
    Insert {
        /// Table being restored.
        table: String,
        /// Underlying database error.
        #[source]
        source: sqlx::Error,
    },

    /// Writing or reading an archive failed.
    #[error("Archive '{path}' failed: {source}")]
    Archive {
        /// Archive file.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// A LOB could not be exported.
    #[error("Can't export LOB {table}.{column} ({predicate}): {message}")]
    Lob {
        /// Owning table.
        table: String,
        /// LOB column.
        column: String,
        /// Primary key predicate of the row.
        predicate: String,
        /// Error message.
        message: String,
    },

    /// A character LOB uses an encoding we can't decode.
    #[error("Unsupported LOB encoding: {0}")]
    UnsupportedEncoding(String),
}

/// Result type for backup operations.
pub type Result<T> = std::result::Result<T, BackupError>;
