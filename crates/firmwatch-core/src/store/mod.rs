//! Persistence boundary for people, roster history and movements.
//!
//! Every write is idempotent by a stable key (person external id, roster
//! entry id, movement content), so a failed batch can be retried safely.

pub mod file;
pub mod memory;

use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::models::{CanonicalPerson, CurrentRosterEntry, MovementRecord, RosterEntry};

pub use file::JsonFileStore;
pub use memory::{MemoryStore, RosterData};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Failed to read store file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write store file {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Store file {path} is corrupt: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to serialize store snapshot: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[async_trait]
pub trait RosterStore: Send + Sync {
    /// Number of current roster entries for `organization`.
    async fn count_current_roster_size(&self, organization: &str) -> Result<u32, StoreError>;

    /// Current roster entries for `organization`, joined with the person's name.
    async fn current_roster_entries(&self, organization: &str) -> Result<Vec<CurrentRosterEntry>, StoreError>;

    /// Most recent LEAVE for `external_id` at any organization other than
    /// `excluding_organization`, detected at or after `since`.
    async fn find_recent_leave(
        &self,
        external_id: &str,
        excluding_organization: &str,
        since: DateTime<Utc>,
    ) -> Result<Option<MovementRecord>, StoreError>;

    /// Insert or refresh persons by external id. Returns the number written.
    async fn upsert_persons(&self, persons: &[CanonicalPerson]) -> Result<usize, StoreError>;

    /// Insert entries whose id is not yet stored. Returns the number inserted.
    async fn insert_roster_entries(&self, entries: &[RosterEntry]) -> Result<usize, StoreError>;

    /// Append movements not already recorded. Returns the number inserted.
    async fn insert_movements(&self, movements: &[MovementRecord]) -> Result<usize, StoreError>;

    /// Mark entries as no longer current. Returns the number that changed.
    async fn deactivate_roster_entries(&self, ids: &[Uuid], ended_at: DateTime<Utc>) -> Result<usize, StoreError>;

    /// Rows the directory listed for `organization` at its last completed
    /// crawl, before validation and the off-target filter.
    async fn last_listed_count(&self, organization: &str) -> Result<Option<u32>, StoreError>;

    async fn record_listed_count(&self, organization: &str, count: u32) -> Result<(), StoreError>;
}
