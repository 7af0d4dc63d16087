//! The demo unit of work: list a table, write a batch, list it again.

use dbpool::{ConnectionPoolManager, Driver, PoolError, Row};

/// Table the demo reads and writes.
pub const TABLE: &str = "demo_items";

/// Rows written by every run. Re-running replaces them.
pub const SAMPLE_ROWS: [(i64, &str); 3] = [(1, "Python"), (2, "Hello"), (3, "world")];

/// Creates [`TABLE`] if it is missing, upserts [`SAMPLE_ROWS`], and returns
/// the table contents ordered by id.
///
/// # Errors
///
/// Returns the first [`PoolError`] any pool call reports.
pub fn run<D: Driver>(pool: &ConnectionPoolManager<D>) -> Result<Vec<Row>, PoolError> {
    pool.execute(
        format!("CREATE TABLE IF NOT EXISTS {TABLE} (id INTEGER PRIMARY KEY, content TEXT NOT NULL)"),
        (),
    )?;

    let before = pool.fetch_all(format!("SELECT * FROM {TABLE} ORDER BY id"), ())?;
    tracing::info!(rows = before.len(), table = TABLE, "read existing rows");

    pool.execute_many(
        format!("INSERT OR REPLACE INTO {TABLE} (id, content) VALUES (:1, :2)"),
        SAMPLE_ROWS,
    )?;
    tracing::info!(rows = SAMPLE_ROWS.len(), table = TABLE, "wrote sample rows");

    pool.fetch_all(format!("SELECT * FROM {TABLE} ORDER BY id"), ())
}
