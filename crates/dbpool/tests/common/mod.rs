//! In-process driver for exercising the pool without a database.
//!
//! Statements are interpreted by their text:
//!
//! | Text | Effect |
//! |------|--------|
//! | `sleep :1` | holds the connection for the given milliseconds |
//! | `fail` | statement error |
//! | `lose connection` | connection-lost error |
//! | `reject session` | authentication error |
//! | `panic` | panics inside the operation |
//! | `select one` | one row `[1]` |
//! | anything else | succeeds with no rows |

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use dbpool::{
    ConnectTarget, Cursor, Driver, DriverConnection, DriverError, DriverErrorKind, Params,
    PoolConfig, Row, Statement, Value,
};

/// Counters shared by a driver and every connection it opens.
#[derive(Debug, Default)]
pub struct MockState {
    pub opened: AtomicUsize,
    pub closed: AtomicUsize,
    pub active: AtomicUsize,
    pub peak: AtomicUsize,
    pub commits: AtomicUsize,
    pub resets: AtomicUsize,
    pub pings: AtomicUsize,
    pub unreachable: AtomicBool,
}

impl MockState {
    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn commits(&self) -> usize {
        self.commits.load(Ordering::SeqCst)
    }

    pub fn resets(&self) -> usize {
        self.resets.load(Ordering::SeqCst)
    }

    pub fn pings(&self) -> usize {
        self.pings.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone)]
pub struct MockDriver {
    pub state: Arc<MockState>,
    password: String,
}

impl MockDriver {
    /// A driver that accepts `password`.
    pub fn new(password: &str) -> Self {
        Self {
            state: Arc::new(MockState::default()),
            password: password.to_string(),
        }
    }
}

impl Driver for MockDriver {
    type Connection = MockConnection;

    fn connect(&self, target: &ConnectTarget) -> Result<MockConnection, DriverError> {
        if self.state.unreachable.load(Ordering::SeqCst) {
            return Err(DriverError::new(
                DriverErrorKind::Unreachable,
                format!("no listener at {}", target.dsn),
            ));
        }
        if target.password != self.password {
            return Err(DriverError::new(
                DriverErrorKind::Authentication,
                "invalid username/password; logon denied",
            ));
        }
        self.state.opened.fetch_add(1, Ordering::SeqCst);
        Ok(MockConnection {
            state: Arc::clone(&self.state),
        })
    }
}

#[derive(Debug)]
pub struct MockConnection {
    state: Arc<MockState>,
}

impl Drop for MockConnection {
    fn drop(&mut self) {
        self.state.closed.fetch_add(1, Ordering::SeqCst);
    }
}

impl DriverConnection for MockConnection {
    type Cursor<'c> = MockCursor<'c>;

    fn cursor(&mut self) -> Result<MockCursor<'_>, DriverError> {
        Ok(MockCursor {
            state: &self.state,
            rows: Vec::new(),
        })
    }

    fn commit(&mut self) -> Result<(), DriverError> {
        self.state.commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn reset(&mut self) -> Result<(), DriverError> {
        self.state.resets.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn ping(&mut self) -> Result<(), DriverError> {
        self.state.pings.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

pub struct MockCursor<'c> {
    state: &'c MockState,
    rows: Vec<Row>,
}

impl Cursor for MockCursor<'_> {
    fn execute(&mut self, statement: &Statement, params: &Params) -> Result<(), DriverError> {
        self.rows.clear();
        match statement.text() {
            "sleep :1" => {
                let ms = match params {
                    Params::Positional(values) => values[0].as_i64().unwrap_or(0),
                    _ => 0,
                };
                let now = self.state.active.fetch_add(1, Ordering::SeqCst) + 1;
                self.state.peak.fetch_max(now, Ordering::SeqCst);
                thread::sleep(Duration::from_millis(ms as u64));
                self.state.active.fetch_sub(1, Ordering::SeqCst);
                Ok(())
            }
            "fail" => Err(DriverError::statement("ORA-00900: invalid SQL statement")),
            "lose connection" => Err(DriverError::connection_lost(
                "ORA-03113: end-of-file on communication channel",
            )),
            "reject session" => Err(DriverError::new(
                DriverErrorKind::Authentication,
                "ORA-28000: the account is locked",
            )),
            "panic" => panic!("statement blew up"),
            "select one" => {
                self.rows.push(Row::new(vec![Value::Integer(1)]));
                Ok(())
            }
            _ => Ok(()),
        }
    }

    fn execute_many(
        &mut self,
        statement: &Statement,
        batches: &[Params],
    ) -> Result<(), DriverError> {
        for params in batches {
            self.execute(statement, params)?;
        }
        Ok(())
    }

    fn fetch_one(&mut self) -> Result<Option<Row>, DriverError> {
        Ok(if self.rows.is_empty() {
            None
        } else {
            Some(self.rows.remove(0))
        })
    }

    fn fetch_all(&mut self) -> Result<Vec<Row>, DriverError> {
        Ok(std::mem::take(&mut self.rows))
    }
}

/// A fixed-size config the mock driver accepts.
pub fn mock_config(size: u32) -> PoolConfig {
    PoolConfig::new("db.test", 1521, "app", "secret")
        .with_service_name("mock")
        .with_fixed_size(size)
        .with_init_timeout_ms(5_000)
}

/// Polls `check` until it holds or `timeout` passes.
pub fn wait_until(timeout: Duration, mut check: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if check() {
            return true;
        }
        thread::sleep(Duration::from_millis(10));
    }
    check()
}
