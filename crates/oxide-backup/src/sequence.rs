//! Sequence realignment after a bulk load.

use sqlx::SqliteConnection;
use tracing::{debug, info, warn};

use crate::dialect::DumpDialect;
use crate::error::Result;
use crate::schema::SchemaInspector;

/// A sequence restart that was applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RealignedSequence {
    /// Sequence name.
    pub sequence: String,
    /// Owning table.
    pub table: String,
    /// Next value the sequence hands out.
    pub next: i64,
}

/// Restarts every table sequence at `MAX(key) + 1`.
///
/// Only sequences named `<prefix><table>` whose table has a single-column
/// primary key are realigned. Restarting is idempotent.
#[derive(Debug, Clone)]
pub struct SequenceRealigner<D: DumpDialect> {
    inspector: SchemaInspector<D>,
}

impl<D: DumpDialect> SequenceRealigner<D> {
    /// Creates a new realigner.
    pub fn new(dialect: D) -> Self {
        Self {
            inspector: SchemaInspector::new(dialect),
        }
    }

    /// Realigns all sequences and returns the applied restarts.
    pub async fn realign(&self, conn: &mut SqliteConnection) -> Result<Vec<RealignedSequence>> {
        let dialect = self.inspector.dialect();
        let prefix = dialect.sequence_prefix();
        let mut realigned = Vec::new();

        for sequence in self.inspector.sequences(conn).await? {
            let Some(table) = sequence.strip_prefix(prefix) else {
                debug!(sequence = %sequence, "Sequence is not owned by a table");
                continue;
            };

            let key = self.inspector.primary_key(conn, table).await?;
            let [column] = key.as_slice() else {
                warn!(
                    sequence = %sequence,
                    table = %table,
                    key_columns = key.len(),
                    "Can't realign sequence, table needs a single-column primary key"
                );
                continue;
            };

            let max: Option<i64> = sqlx::query_scalar(&dialect.max_value_sql(table, column))
                .fetch_one(&mut *conn)
                .await?;
            let next = max.map_or(1, |m| m + 1);

            sqlx::query(&dialect.restart_sequence_sql(&sequence, next))
                .execute(&mut *conn)
                .await?;
            info!(sequence = %sequence, next, "Sequence realigned");

            realigned.push(RealignedSequence {
                table: table.to_string(),
                sequence,
                next,
            });
        }

        Ok(realigned)
    }
}
