#![allow(dead_code)]

use std::fs;
use std::path::Path;

use oxide_backup::manifest::DumpManifest;
use sqlx::{Connection, Executor, SqliteConnection};

pub async fn connect() -> SqliteConnection {
    SqliteConnection::connect("sqlite::memory:")
        .await
        .expect("Failed to open in-memory SQLite database")
}

pub async fn execute(conn: &mut SqliteConnection, sql: &str) {
    conn.execute(sqlx::raw_sql(sql))
        .await
        .unwrap_or_else(|e| panic!("Failed to execute: {sql}\nError: {e:?}"));
}

/// Opens an empty database with the schema recorded in a dump.
pub async fn connect_with_schema(dump: &Path) -> SqliteConnection {
    let script = fs::read_to_string(DumpManifest::new(dump).schema_script())
        .expect("Dump has no schema script");
    let mut conn = connect().await;
    execute(&mut conn, &script).await;
    conn
}

pub async fn count(conn: &mut SqliteConnection, table: &str) -> i64 {
    sqlx::query_scalar(&format!("SELECT COUNT(*) FROM \"{table}\""))
        .fetch_one(conn)
        .await
        .unwrap()
}
