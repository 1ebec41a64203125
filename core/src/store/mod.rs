//! SQLite persistence layer.
//!
//! RULE: Only the store talks to the database.
//! The planner and orchestrator go through `ResultStore`, placement goes
//! through `EntitySource`; neither executes SQL directly.

use crate::{
    error::FedsimResult,
    planner::TrialFilter,
    record::TrialRecord,
    types::Seed,
};
use rusqlite::Connection;
use std::collections::BTreeSet;

mod entities;
mod results;

pub use entities::EntityCatalog;

/// Persistent cache of completed trials.
pub trait ResultStore {
    /// Every stored record matching `filter`, ascending by seed.
    fn find_matching(&self, filter: &TrialFilter) -> FedsimResult<Vec<TrialRecord>>;

    /// Store `records` in one write. Records already present (same identity,
    /// config and seed) are skipped. Returns the number actually inserted.
    fn insert_many(&self, records: &[TrialRecord]) -> FedsimResult<usize>;

    fn existing_seeds(&self, filter: &TrialFilter) -> FedsimResult<BTreeSet<Seed>> {
        Ok(self.find_matching(filter)?.into_iter().map(|r| r.seed).collect())
    }
}

pub struct SimStore {
    conn: Connection,
    path: Option<String>, // None for :memory:, Some(path) for file
}

impl SimStore {
    pub fn open(path: &str) -> FedsimResult<Self> {
        let conn = Connection::open_with_flags(
            path,
            rusqlite::OpenFlags::SQLITE_OPEN_READ_WRITE
                | rusqlite::OpenFlags::SQLITE_OPEN_CREATE
                | rusqlite::OpenFlags::SQLITE_OPEN_URI,
        )?;
        // WAL mode only for real files (shared-memory and :memory: ignore it).
        let _ = conn.execute_batch("PRAGMA journal_mode=WAL;");
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        Ok(Self {
            conn,
            path: Some(path.to_string()),
        })
    }

    /// Open an in-memory database (used in tests).
    pub fn in_memory() -> FedsimResult<Self> {
        let conn = Connection::open(":memory:")?;
        Ok(Self { conn, path: None })
    }

    /// Reopen a new connection to the same database, for use from another
    /// thread. For in-memory databases this returns a new, isolated database.
    pub fn reopen(&self) -> FedsimResult<Self> {
        match &self.path {
            Some(p) => Self::open(p),
            None => Self::in_memory(),
        }
    }

    /// Apply all schema migrations in order. Safe to run on every start.
    pub fn migrate(&self) -> FedsimResult<()> {
        self.conn
            .execute_batch(include_str!("../../../migrations/001_results.sql"))?;
        self.conn
            .execute_batch(include_str!("../../../migrations/002_entities.sql"))?;
        Ok(())
    }
}
