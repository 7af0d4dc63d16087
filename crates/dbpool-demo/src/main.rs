//! Demo binary: runs one unit of work through a managed connection pool.
//!
//! Loads configuration, builds a pool over the bundled SQLite driver, writes
//! and reads a small table, prints the rows as JSON, and shuts the pool down.

use dbpool::{ConnectionPoolManager, SqliteDriver};
use dbpool_demo::{config, workload};
use tracing_subscriber::EnvFilter;

fn resolve_config_path() -> (Option<String>, &'static str) {
    if let Some(path) = std::env::args()
        .nth(1)
        .filter(|value| !value.trim().is_empty())
    {
        return (Some(path), "cli-arg");
    }

    if let Ok(path) = std::env::var("DBPOOL_CONFIG_PATH") {
        if !path.trim().is_empty() {
            return (Some(path), "env-var");
        }
    }

    (None, "default")
}

fn main() {
    let (resolved_config_path, config_source) = resolve_config_path();
    let selected_config_path = resolved_config_path.as_deref().or(Some("config.toml"));

    let config = config::load_config(selected_config_path)
        .expect("failed to load configuration; the demo cannot start without valid config");

    let filter =
        EnvFilter::try_new(&config.logging.level).unwrap_or_else(|_| EnvFilter::new("info"));

    if config.logging.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    tracing::info!(
        source = config_source,
        path = selected_config_path.unwrap_or("<none>"),
        "resolved startup configuration path"
    );

    std::fs::create_dir_all(&config.storage.data_dir)
        .expect("failed to create storage.data_dir");

    let pool = ConnectionPoolManager::new(config.pool, SqliteDriver::new(&config.storage.data_dir))
        .expect("failed to create connection pool; check the [pool] section of the config");

    match workload::run(&pool) {
        Ok(rows) => {
            let json = serde_json::to_string_pretty(&rows).expect("rows serialize to JSON");
            println!("{json}");
        }
        Err(e) => tracing::error!(error = %e, "demo workload failed"),
    }

    pool.shutdown();
    tracing::info!("dbpool demo finished");
}
