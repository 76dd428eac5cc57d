//! Movement classification: diff a fresh roster scrape against the persisted
//! current roster.
//!
//! Leavers become LEAVE events. A joiner becomes a TRANSFER when the same
//! person left a different organization within [`TRANSFER_WINDOW_DAYS`]
//! before the detection time, otherwise a JOIN.
//!
//! The lookback only sees LEAVE events that are already persisted, so the
//! order in which organizations are processed matters: a person moving from
//! A to B is a TRANSFER when A is processed before B, and a JOIN at B plus a
//! later LEAVE at A otherwise. Batches process organizations in
//! configuration order so the outcome is deterministic.

use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::debug;
use uuid::Uuid;

use crate::models::{CurrentRosterEntry, MovementKind, MovementRecord, RawRecord};
use crate::store::{RosterStore, StoreError};

/// How far back a LEAVE can be and still pair with a JOIN as a transfer
pub const TRANSFER_WINDOW_DAYS: i64 = 30;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Classification {
    pub movements: Vec<MovementRecord>,
    /// Current entries of people no longer listed
    #[serde(rename = "rosterEntryIdsToDeactivate")]
    pub roster_entry_ids_to_deactivate: Vec<Uuid>,
    /// Current entries of people still listed, replaced by this scrape's entries
    #[serde(rename = "supersededEntryIds")]
    pub superseded_entry_ids: Vec<Uuid>,
    #[serde(rename = "leaveCount")]
    pub leave_count: usize,
    #[serde(rename = "joinCount")]
    pub join_count: usize,
    #[serde(rename = "transferCount")]
    pub transfer_count: usize,
}

impl Classification {
    pub fn is_empty(&self) -> bool {
        self.movements.is_empty()
    }

    fn count(&mut self) {
        let (mut leaves, mut joins, mut transfers) = (0, 0, 0);
        for movement in &self.movements {
            match movement.kind {
                MovementKind::Leave => leaves += 1,
                MovementKind::Join => joins += 1,
                MovementKind::Transfer => transfers += 1,
            }
        }
        self.leave_count = leaves;
        self.join_count = joins;
        self.transfer_count = transfers;
    }
}

pub struct MovementClassifier<'a, S: RosterStore + ?Sized> {
    store: &'a S,
}

impl<'a, S: RosterStore + ?Sized> MovementClassifier<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    /// Classify `scraped` (validated records for `organization`) against the
    /// persisted current roster.
    ///
    /// `organization` must be the normalized name used for roster entries.
    /// With no current roster the scrape is a baseline and nothing is emitted.
    pub async fn classify(
        &self,
        organization: &str,
        scraped: &[RawRecord],
        detected_at: DateTime<Utc>,
    ) -> Result<Classification, StoreError> {
        if self.store.count_current_roster_size(organization).await? == 0 {
            debug!(organization = %organization, "No current roster, treating scrape as baseline");
            return Ok(Classification::default());
        }

        let prior = self.store.current_roster_entries(organization).await?;
        let mut prior_by_id: BTreeMap<&str, Vec<&CurrentRosterEntry>> = BTreeMap::new();
        for current in &prior {
            prior_by_id.entry(current.entry.external_id.as_str()).or_default().push(current);
        }

        let mut seen = HashSet::new();
        let new_ids: Vec<(&str, &RawRecord)> = scraped
            .iter()
            .map(|r| (r.external_id.trim(), r))
            .filter(|(id, _)| seen.insert(*id))
            .collect();
        let new_set: HashSet<&str> = new_ids.iter().map(|(id, _)| *id).collect();

        let mut result = Classification::default();

        // Leavers, in external id order
        for (id, entries) in &prior_by_id {
            if new_set.contains(id) {
                result.superseded_entry_ids.extend(entries.iter().map(|c| c.entry.id));
                continue;
            }
            result
                .movements
                .push(MovementRecord::leave(*id, entries[0].person_name.clone(), organization, detected_at));
            result.roster_entry_ids_to_deactivate.extend(entries.iter().map(|c| c.entry.id));
        }

        // Joiners, in scrape order
        let since = detected_at - Duration::days(TRANSFER_WINDOW_DAYS);
        for (id, record) in new_ids {
            if prior_by_id.contains_key(id) {
                continue;
            }
            let name = record.name.trim();
            let movement = match self.store.find_recent_leave(id, organization, since).await? {
                Some(leave) => {
                    let from = leave.from_organization.unwrap_or_default();
                    debug!(external_id = %id, from = %from, to = %organization, "Transfer correlated");
                    MovementRecord::transfer(id, name, from, organization, detected_at)
                }
                None => MovementRecord::join(id, name, organization, detected_at),
            };
            result.movements.push(movement);
        }

        result.count();
        Ok(result)
    }
}
