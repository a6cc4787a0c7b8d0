#[cfg(feature = "rusqlite")]
mod sqlite;

#[cfg(feature = "rusqlite")]
pub use sqlite::SweepStore;

use crate::report::SweepReport;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConnectionError {
    #[cfg(feature = "rusqlite")]
    #[error("SQLite error: {0}")]
    SQLite(rusqlite::Error),
    #[cfg(not(feature = "rusqlite"))]
    #[error("hpcsweep was built without database support, enable the `rusqlite` feature")]
    Unsupported,
}

/// Store a finished sweep in the database at `path` and return the id of its sweep row
#[cfg(feature = "rusqlite")]
pub fn persist(path: &Path, report: &SweepReport) -> Result<i64, ConnectionError> {
    let mut store = SweepStore::open(path)?;
    store.init()?;
    let id = store.store(report)?;
    store.close()?;

    Ok(id)
}

#[cfg(not(feature = "rusqlite"))]
pub fn persist(path: &Path, _report: &SweepReport) -> Result<i64, ConnectionError> {
    tracing::error!("Cannot store results in {path:?}");

    Err(ConnectionError::Unsupported)
}

// one row per invocation, runs and series points reference it
pub const SQL_SCHEMA: [&str; 3] = [
    "create table if not exists sweeps (
    id integer primary key,
    kind text not null,
    metric_label text not null,
    objective text not null,
    host text not null,
    created text not null,
    comment text
);",
    "create table if not exists runs (
    id integer primary key,
    sweep integer not null references sweeps (id),
    job_id text not null,
    label text not null,
    workspace text not null,
    artifact text not null,
    matches integer not null,
    selected real
);",
    "create table if not exists points (
    id integer primary key,
    sweep integer not null references sweeps (id),
    position integer not null,
    label text not null,
    value real not null,
    samples integer not null,
    speedup real,
    efficiency real
);",
];
pub const SQL_SCHEMA_NUMBER: usize = SQL_SCHEMA.len();
