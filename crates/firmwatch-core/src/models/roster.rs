use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One person's affiliation with one organization, current or historical.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RosterEntry {
    pub id: Uuid,
    #[serde(rename = "externalId")]
    pub external_id: String,
    pub organization: String,
    #[serde(rename = "roleTitle")]
    pub role_title: Option<String>,
    #[serde(rename = "isCurrent")]
    pub is_current: bool,
    #[serde(rename = "startedAt")]
    pub started_at: DateTime<Utc>,
    #[serde(rename = "endedAt")]
    pub ended_at: Option<DateTime<Utc>>,
}

impl RosterEntry {
    /// A fresh current entry observed at `started_at`
    pub fn current(
        external_id: impl Into<String>,
        organization: impl Into<String>,
        role_title: Option<String>,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            external_id: external_id.into(),
            organization: organization.into(),
            role_title,
            is_current: true,
            started_at,
            ended_at: None,
        }
    }

    /// Close the entry. Closing an already closed entry keeps its first end marker.
    pub fn close(&mut self, ended_at: DateTime<Utc>) {
        if self.is_current {
            self.is_current = false;
            self.ended_at = Some(ended_at);
        }
    }
}

/// A current roster entry joined with the person's display name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrentRosterEntry {
    pub entry: RosterEntry,
    #[serde(rename = "personName")]
    pub person_name: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_close_sets_end_marker_once() {
        let start = Utc::now();
        let mut entry = RosterEntry::current("S1", "로고스", None, start);
        assert!(entry.is_current);

        let first_end = start + Duration::days(1);
        entry.close(first_end);
        assert!(!entry.is_current);
        assert_eq!(entry.ended_at, Some(first_end));

        entry.close(start + Duration::days(2));
        assert_eq!(entry.ended_at, Some(first_end));
    }

    #[test]
    fn test_current_entries_get_distinct_ids() {
        let now = Utc::now();
        let a = RosterEntry::current("S1", "로고스", None, now);
        let b = RosterEntry::current("S1", "로고스", None, now);
        assert_ne!(a.id, b.id);
    }
}
