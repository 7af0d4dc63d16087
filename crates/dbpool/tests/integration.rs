use std::thread;

use dbpool::{ConnectionPoolManager, Params, PoolConfig, PoolError, Row, SqliteDriver, Value};
use tempfile::TempDir;

fn sqlite_pool(size: u32) -> (TempDir, ConnectionPoolManager<SqliteDriver>) {
    let dir = tempfile::tempdir().expect("failed to create temp dir");
    let config = PoolConfig::new("127.0.0.1", 1521, "app", "secret")
        .with_service_name("integration")
        .with_fixed_size(size);
    let pool = ConnectionPoolManager::new(config, SqliteDriver::new(dir.path()))
        .expect("failed to create pool");
    (dir, pool)
}

fn create_table(pool: &ConnectionPoolManager<SqliteDriver>) {
    pool.execute(
        "CREATE TABLE t (id INTEGER PRIMARY KEY, content TEXT NOT NULL)",
        (),
    )
    .expect("failed to create table");
}

#[test]
fn execute_many_then_fetch_all_round_trip() {
    let (_dir, pool) = sqlite_pool(2);
    create_table(&pool);

    pool.execute_many(
        "INSERT INTO t (id, content) VALUES (:1, :2)",
        [(2, "b"), (1, "a")],
    )
    .expect("failed to insert batch");

    let rows = pool
        .fetch_all("SELECT * FROM t ORDER BY id", ())
        .expect("failed to fetch rows");
    assert_eq!(
        rows,
        vec![
            Row::new(vec![Value::Integer(1), Value::from("a")]),
            Row::new(vec![Value::Integer(2), Value::from("b")]),
        ]
    );
}

#[test]
fn fetch_one_on_empty_result_is_none() {
    let (_dir, pool) = sqlite_pool(1);
    create_table(&pool);

    let row = pool
        .fetch_one("SELECT content FROM t WHERE id = :1", (42,))
        .expect("query should succeed");
    assert_eq!(row, None);
}

#[test]
fn fetch_one_reads_only_the_first_row() {
    let (_dir, pool) = sqlite_pool(1);

    // Evaluating the second row overflows.
    let row = pool
        .fetch_one(
            "SELECT CASE WHEN x = 2 THEN abs(x - 2 - 9223372036854775807 - 1) ELSE x END \
             FROM (SELECT 1 AS x UNION ALL SELECT 2)",
            (),
        )
        .expect("first row should be returned");
    assert_eq!(row, Some(Row::new(vec![Value::Integer(1)])));
    assert_eq!(pool.status().idle, 1);
}

#[test]
fn question_mark_counts_match_bind_indexes() {
    let (_dir, pool) = sqlite_pool(1);

    let err = pool
        .fetch_one("SELECT ?, ?1", (5, 6))
        .expect_err("extra value must be rejected");
    assert!(matches!(err, PoolError::Bind(_)), "got {err:?}");

    let err = pool
        .fetch_one("SELECT ?2", (5,))
        .expect_err("missing value must be rejected");
    assert!(matches!(err, PoolError::Bind(_)), "got {err:?}");

    let row = pool
        .fetch_one("SELECT ?, ?1", (5,))
        .expect("query should succeed")
        .expect("row");
    assert_eq!(row.values(), &[Value::Integer(5), Value::Integer(5)]);

    let row = pool
        .fetch_one("SELECT ?2, ?1", (1, 2))
        .expect("query should succeed")
        .expect("row");
    assert_eq!(row.values(), &[Value::Integer(2), Value::Integer(1)]);
}

#[test]
fn at_and_dollar_parameters_bind_by_name() {
    let (_dir, pool) = sqlite_pool(1);

    let row = pool
        .fetch_one(
            "SELECT @left - $right",
            Params::named([("left", 10), ("right", 4)]),
        )
        .expect("query should succeed")
        .expect("row");
    assert_eq!(row[0], Value::Integer(6));
}

#[test]
fn named_parameters_bind_by_name() {
    let (_dir, pool) = sqlite_pool(1);
    create_table(&pool);

    pool.execute(
        "INSERT INTO t (id, content) VALUES (:id, :content)",
        Params::named([("content", Value::from("named")), ("id", Value::Integer(7))]),
    )
    .expect("insert should succeed");

    let row = pool
        .fetch_one(
            "SELECT content FROM t WHERE id = :id",
            Params::named([("id", 7)]),
        )
        .expect("query should succeed")
        .expect("row should exist");
    assert_eq!(row[0].as_str(), Some("named"));
}

#[test]
fn constraint_violation_does_not_leak_connection() {
    let (_dir, pool) = sqlite_pool(2);
    create_table(&pool);
    pool.execute("INSERT INTO t (id, content) VALUES (:1, :2)", (1, "a"))
        .expect("insert should succeed");

    let before = pool.status().idle;
    let err = pool
        .execute("INSERT INTO t (id, content) VALUES (:1, :2)", (1, "dup"))
        .expect_err("duplicate key should fail");
    assert!(matches!(err, PoolError::Statement(_)), "got {err:?}");
    assert_eq!(pool.status().idle, before);

    // The reset connection does not hold a write lock: other writes proceed.
    pool.execute("INSERT INTO t (id, content) VALUES (:1, :2)", (2, "b"))
        .expect("insert after failure should succeed");
    let count = pool
        .fetch_one("SELECT COUNT(*) FROM t", ())
        .expect("count should succeed")
        .expect("count row");
    assert_eq!(count[0], Value::Integer(2));
}

#[test]
fn failed_batch_leaves_no_partial_rows() {
    let (_dir, pool) = sqlite_pool(1);
    create_table(&pool);

    let err = pool
        .execute_many(
            "INSERT INTO t (id, content) VALUES (:1, :2)",
            vec![
                Params::from((1, "a")),
                Params::from((2, "b")),
                Params::from((1, "dup")),
            ],
        )
        .expect_err("batch should fail");
    assert!(matches!(err, PoolError::Statement(_)));

    let rows = pool.fetch_all("SELECT id FROM t", ()).expect("fetch");
    assert!(rows.is_empty(), "uncommitted rows must not be visible");
}

#[test]
fn malformed_sql_is_a_statement_error() {
    let (_dir, pool) = sqlite_pool(1);
    let err = pool
        .fetch_all("SELEC * FROM nowhere", ())
        .expect_err("should fail");
    assert!(matches!(err, PoolError::Statement(_)));
    assert_eq!(pool.status().idle, 1);
}

#[test]
fn concurrent_writers_all_commit() {
    let (_dir, pool) = sqlite_pool(4);
    create_table(&pool);

    thread::scope(|s| {
        for worker in 0..8_i64 {
            let pool = &pool;
            s.spawn(move || {
                for i in 0..10_i64 {
                    let id = worker * 100 + i;
                    pool.execute(
                        "INSERT INTO t (id, content) VALUES (:1, :2)",
                        (id, format!("w{worker}")),
                    )
                    .expect("concurrent insert should succeed");
                }
            });
        }
    });

    let count = pool
        .fetch_one("SELECT COUNT(*) FROM t", ())
        .expect("count should succeed")
        .expect("count row");
    assert_eq!(count[0], Value::Integer(80));
    assert_eq!(pool.status().idle, 4);
}

#[test]
fn session_init_runs_on_every_connection() {
    let dir = tempfile::tempdir().expect("failed to create temp dir");
    let config = PoolConfig::new("127.0.0.1", 1521, "app", "secret")
        .with_service_name("session")
        .with_fixed_size(3)
        .with_session_init("CREATE TEMP TABLE session_marker (opened_by TEXT)")
        .with_session_init("INSERT INTO session_marker VALUES ('pool')");
    let pool = ConnectionPoolManager::new(config, SqliteDriver::new(dir.path()))
        .expect("failed to create pool");

    // Temp tables are per connection; every leased connection must have one.
    thread::scope(|s| {
        for _ in 0..3 {
            s.spawn(|| {
                let row = pool
                    .fetch_one("SELECT opened_by FROM session_marker", ())
                    .expect("marker table should exist")
                    .expect("marker row should exist");
                assert_eq!(row[0].as_str(), Some("pool"));
            });
        }
    });
}

#[test]
fn bad_session_init_fails_construction() {
    let dir = tempfile::tempdir().expect("failed to create temp dir");
    let config = PoolConfig::new("127.0.0.1", 1521, "app", "secret")
        .with_sid("session")
        .with_fixed_size(1)
        .with_session_init("NOT VALID SQL");
    let err = ConnectionPoolManager::new(config, SqliteDriver::new(dir.path()))
        .expect_err("should fail");
    assert!(matches!(err, PoolError::Init(_)));
}

#[test]
fn sid_and_service_name_pick_service_name_file() {
    let dir = tempfile::tempdir().expect("failed to create temp dir");
    let config = PoolConfig::new("127.0.0.1", 1521, "app", "secret")
        .with_sid("by_sid")
        .with_service_name("by_service")
        .with_fixed_size(1);
    let pool = ConnectionPoolManager::new(config, SqliteDriver::new(dir.path()))
        .expect("failed to create pool");

    assert_eq!(pool.dsn().database().as_str(), "by_service");
    assert!(dir.path().join("by_service.db").exists());
    assert!(!dir.path().join("by_sid.db").exists());
}
