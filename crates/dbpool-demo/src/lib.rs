//! Example caller for the `dbpool` connection pool.
//!
//! Loads a [`config::Config`], builds a pool over the bundled SQLite driver,
//! and runs the [`workload`] against it.

pub mod config;
pub mod workload;
