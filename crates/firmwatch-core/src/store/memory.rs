use std::collections::{BTreeMap, HashSet};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{RosterStore, StoreError};
use crate::models::{CanonicalPerson, CurrentRosterEntry, MovementKind, MovementRecord, RosterEntry};

/// The full store contents. Shared by the in-memory and file stores.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RosterData {
    pub persons: BTreeMap<String, CanonicalPerson>,
    #[serde(rename = "rosterEntries")]
    pub roster_entries: Vec<RosterEntry>,
    pub movements: Vec<MovementRecord>,
    /// Rows the directory listed for each organization at its last crawl
    #[serde(default, rename = "listedCounts")]
    pub listed_counts: BTreeMap<String, u32>,
}

impl RosterData {
    fn current_for<'a>(&'a self, organization: &'a str) -> impl Iterator<Item = &'a RosterEntry> + 'a {
        self.roster_entries
            .iter()
            .filter(move |e| e.is_current && e.organization == organization)
    }

    pub fn count_current(&self, organization: &str) -> u32 {
        self.current_for(organization).count() as u32
    }

    pub fn current_entries(&self, organization: &str) -> Vec<CurrentRosterEntry> {
        self.current_for(organization)
            .map(|entry| CurrentRosterEntry {
                person_name: self
                    .persons
                    .get(&entry.external_id)
                    .map(|p| p.name.clone())
                    .unwrap_or_else(|| entry.external_id.clone()),
                entry: entry.clone(),
            })
            .collect()
    }

    pub fn recent_leave(
        &self,
        external_id: &str,
        excluding_organization: &str,
        since: DateTime<Utc>,
    ) -> Option<MovementRecord> {
        self.movements
            .iter()
            .filter(|m| {
                m.kind == MovementKind::Leave
                    && m.external_id == external_id
                    && m.detected_at >= since
                    && m.from_organization.as_deref().is_some_and(|o| o != excluding_organization)
            })
            // max_by_key keeps the last of equal keys, i.e. the latest insert
            .max_by_key(|m| m.detected_at)
            .cloned()
    }

    pub fn upsert_persons(&mut self, persons: &[CanonicalPerson]) -> usize {
        for person in persons {
            self.persons.insert(person.external_id.clone(), person.clone());
        }
        persons.len()
    }

    pub fn insert_roster_entries(&mut self, entries: &[RosterEntry]) -> usize {
        let mut known: HashSet<Uuid> = self.roster_entries.iter().map(|e| e.id).collect();
        let before = self.roster_entries.len();
        for entry in entries {
            if known.insert(entry.id) {
                self.roster_entries.push(entry.clone());
            }
        }
        self.roster_entries.len() - before
    }

    pub fn insert_movements(&mut self, movements: &[MovementRecord]) -> usize {
        let mut known: HashSet<_> = self.movements.iter().map(|m| m.dedup_key()).collect();
        let before = self.movements.len();
        for movement in movements {
            if known.insert(movement.dedup_key()) {
                self.movements.push(movement.clone());
            }
        }
        self.movements.len() - before
    }

    pub fn listed_count(&self, organization: &str) -> Option<u32> {
        self.listed_counts.get(organization).copied()
    }

    pub fn record_listed_count(&mut self, organization: &str, count: u32) -> usize {
        match self.listed_counts.insert(organization.to_string(), count) {
            Some(previous) if previous == count => 0,
            _ => 1,
        }
    }

    pub fn deactivate(&mut self, ids: &[Uuid], ended_at: DateTime<Utc>) -> usize {
        let ids: HashSet<&Uuid> = ids.iter().collect();
        let mut changed = 0;
        for entry in self.roster_entries.iter_mut().filter(|e| ids.contains(&e.id)) {
            if entry.is_current {
                entry.close(ended_at);
                changed += 1;
            }
        }
        changed
    }
}

/// Volatile store used by tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryStore {
    data: Mutex<RosterData>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_data(data: RosterData) -> Self {
        Self { data: Mutex::new(data) }
    }

    /// Copy of the current contents.
    pub async fn snapshot(&self) -> RosterData {
        self.data.lock().await.clone()
    }
}

#[async_trait]
impl RosterStore for MemoryStore {
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
        Ok(self.data.lock().await.upsert_persons(persons))
    }

    async fn insert_roster_entries(&self, entries: &[RosterEntry]) -> Result<usize, StoreError> {
        Ok(self.data.lock().await.insert_roster_entries(entries))
    }

    async fn insert_movements(&self, movements: &[MovementRecord]) -> Result<usize, StoreError> {
        Ok(self.data.lock().await.insert_movements(movements))
    }

    async fn deactivate_roster_entries(&self, ids: &[Uuid], ended_at: DateTime<Utc>) -> Result<usize, StoreError> {
        Ok(self.data.lock().await.deactivate(ids, ended_at))
    }

    async fn last_listed_count(&self, organization: &str) -> Result<Option<u32>, StoreError> {
        Ok(self.data.lock().await.listed_count(organization))
    }

    async fn record_listed_count(&self, organization: &str, count: u32) -> Result<(), StoreError> {
        self.data.lock().await.record_listed_count(organization, count);
        Ok(())
    }
}
