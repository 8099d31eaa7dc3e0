//! Database dump, restore and backup retention for SQLite.
//!
//! `oxide-backup` serializes every table of a live database into a portable
//! directory of delimited files, restores such a directory with type-aware
//! literal conversion, and keeps a bounded history of backups per
//! connection.
//!
//! # Architecture
//!
//! - **Schema** - Lists tables, primary keys and column types from the live catalog
//! - **Dump** - Writes one `<table>.csv` per table plus a `schema.sql`
//! - **Lob** - Exports BLOB/CLOB values to `lobs/` and writes the `lobs.sql` patch script
//! - **Archive** - Packs a dump directory into a `.tar.gz` and unpacks it again
//! - **Restore** - Replays table files as inserts, then the patch script
//! - **Sequence** - Restarts `AUTOINCREMENT` counters after a restore
//! - **Retention** - Deletes the oldest backups beyond a limit
//! - **Legacy** - Rewrites scripts of legacy database versions
//! - **Dialect** - Database-specific catalog queries and statements
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use oxide_backup::prelude::*;
//! use sqlx::{Connection, SqliteConnection};
//!
//! let mut source = SqliteConnection::connect("sqlite:app.sqlite3").await?;
//! DatabaseDumper::new(SqliteDialect::new(), Arc::new(LobIdGenerator::default()))
//!     .dump(&mut source, "dump".as_ref())
//!     .await?;
//!
//! let mut target = SqliteConnection::connect("sqlite:copy.sqlite3").await?;
//! DatabaseRestorer::new(SqliteDialect::new())
//!     .clear_existing(true)
//!     .restore(&mut target, "dump".as_ref())
//!     .await?;
//! ```
//!
//! # CLI Usage
//!
//! ```bash
//! # Back up every configured connection as a dump archive
//! oxide-backup backup --config manager.conf --dump
//!
//! # Restore an archive into the first configured connection
//! oxide-backup restore --config manager.conf --file backups/main/db-20240105T100409.tar.gz
//!
//! # Rewrite the script of a legacy database
//! oxide-backup migrate-legacy --dir data --name main
//! ```

pub mod archive;
pub mod coerce;
pub mod config;
pub mod dialect;
pub mod dump;
pub mod error;
pub mod legacy;
pub mod lob;
pub mod manifest;
pub mod restore;
pub mod retention;
pub mod schema;
pub mod sequence;
pub mod strategy;
pub mod value;

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::coerce::literal_for;
    pub use crate::config::{ConnectionConfig, ManagerConfig};
    pub use crate::dialect::{DumpDialect, SqliteDialect};
    pub use crate::dump::{DatabaseDumper, DumpSummary, TableDumper};
    pub use crate::error::{BackupError, Result};
    pub use crate::legacy::{LegacyScriptMigrator, MigrationOutcome};
    pub use crate::lob::{replay_patch_script, LobExporter, LobIdGenerator};
    pub use crate::manifest::DumpManifest;
    pub use crate::restore::{DatabaseRestorer, RestoreSummary, TableRestorer};
    pub use crate::retention::{enforce_retention, DEFAULT_RETENTION_LIMIT};
    pub use crate::schema::{ColumnType, SchemaInspector, TableDescriptor};
    pub use crate::sequence::SequenceRealigner;
    pub use crate::strategy::BackupStrategy;
    pub use crate::value::CellValue;
}
