//! JSON snapshot store.
//!
//! The whole store lives in one `roster.json` under the data directory,
//! wrapped with the time it was written. Every write rewrites the snapshot
//! through a temporary file and a rename.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

use super::memory::RosterData;
use super::{RosterStore, StoreError};
use crate::models::{CanonicalPerson, CurrentRosterEntry, MovementRecord, RosterEntry};

const STORE_FILE: &str = "roster.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot<T> {
    pub data: T,
    pub saved_at: DateTime<Utc>,
}

impl<T> Snapshot<T> {
    pub fn new(data: T) -> Self {
        Self {
            data,
            saved_at: Utc::now(),
        }
    }
}

pub struct JsonFileStore {
    path: PathBuf,
    data: Mutex<RosterData>,
}

impl JsonFileStore {
    /// Open (or start) the store in `data_dir`.
    pub fn open(data_dir: &Path) -> Result<Self, StoreError> {
        std::fs::create_dir_all(data_dir).map_err(|source| StoreError::Write {
            path: data_dir.to_path_buf(),
            source,
        })?;

        let path = data_dir.join(STORE_FILE);
        let data = Self::load(&path)?.map(|s| s.data).unwrap_or_default();
        debug!(
            path = %path.display(),
            persons = data.persons.len(),
            roster_entries = data.roster_entries.len(),
            movements = data.movements.len(),
            "Opened store"
        );

        Ok(Self {
            path,
            data: Mutex::new(data),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(path: &Path) -> Result<Option<Snapshot<RosterData>>, StoreError> {
        if !path.exists() {
            return Ok(None);
        }

        let contents = std::fs::read_to_string(path).map_err(|source| StoreError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let snapshot = serde_json::from_str(&contents).map_err(|source| StoreError::Corrupt {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Some(snapshot))
    }

    fn save(&self, data: &RosterData) -> Result<(), StoreError> {
        let contents = serde_json::to_string_pretty(&Snapshot::new(data))?;
        let tmp = self.path.with_extension("json.tmp");
        let write_err = |source| StoreError::Write {
            path: self.path.clone(),
            source,
        };
        std::fs::write(&tmp, contents).map_err(write_err)?;
        std::fs::rename(&tmp, &self.path).map_err(write_err)
    }

    /// Apply `change` and persist if it reported any effect.
    async fn write<F>(&self, change: F) -> Result<usize, StoreError>
    where
        F: FnOnce(&mut RosterData) -> usize + Send,
    {
        let mut data = self.data.lock().await;
        let mut updated = data.clone();
        let changed = change(&mut updated);
        if changed > 0 {
            self.save(&updated)?;
            *data = updated;
        }
        Ok(changed)
    }
}

#[async_trait]
impl RosterStore for JsonFileStore {
    async fn count_current_roster_size(&self, organization: &str) -> Result<u32, StoreError> {
        Ok(self.data.lock().await.count_current(organization))
    }

    async fn current_roster_entries(&self, organization: &str) -> Result<Vec<CurrentRosterEntry>, StoreError> {
        Ok(self.data.lock().await.current_entries(organization))
    }

    async fn find_recent_leave(
        &self,
        external_id: &str,
        excluding_organization: &str,
        since: DateTime<Utc>,
    ) -> Result<Option<MovementRecord>, StoreError> {
        Ok(self.data.lock().await.recent_leave(external_id, excluding_organization, since))
    }

    async fn upsert_persons(&self, persons: &[CanonicalPerson]) -> Result<usize, StoreError> {
        self.write(|data| data.upsert_persons(persons)).await
    }

    async fn insert_roster_entries(&self, entries: &[RosterEntry]) -> Result<usize, StoreError> {
        self.write(|data| data.insert_roster_entries(entries)).await
    }

    async fn insert_movements(&self, movements: &[MovementRecord]) -> Result<usize, StoreError> {
        self.write(|data| data.insert_movements(movements)).await
    }

    async fn deactivate_roster_entries(&self, ids: &[Uuid], ended_at: DateTime<Utc>) -> Result<usize, StoreError> {
        self.write(|data| data.deactivate(ids, ended_at)).await
    }

    async fn last_listed_count(&self, organization: &str) -> Result<Option<u32>, StoreError> {
        Ok(self.data.lock().await.listed_count(organization))
    }

    async fn record_listed_count(&self, organization: &str, count: u32) -> Result<(), StoreError> {
        self.write(|data| data.record_listed_count(organization, count)).await?;
        Ok(())
    }
}
