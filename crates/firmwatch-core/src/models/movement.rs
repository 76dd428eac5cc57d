use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MovementKind {
    Join,
    Leave,
    Transfer,
}

impl std::fmt::Display for MovementKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MovementKind::Join => write!(f, "JOIN"),
            MovementKind::Leave => write!(f, "LEAVE"),
            MovementKind::Transfer => write!(f, "TRANSFER"),
        }
    }
}

/// An append-only membership event.
///
/// The constructors are the only way the classifier builds records, so the
/// origin/destination shape always matches the kind:
/// - LEAVE: origin set, destination empty
/// - JOIN: origin `None`, destination set
/// - TRANSFER: both set
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovementRecord {
    #[serde(rename = "externalId")]
    pub external_id: String,
    #[serde(rename = "personName")]
    pub person_name: String,
    #[serde(rename = "fromOrganization")]
    pub from_organization: Option<String>,
    #[serde(rename = "toOrganization")]
    pub to_organization: String,
    pub kind: MovementKind,
    #[serde(rename = "detectedAt")]
    pub detected_at: DateTime<Utc>,
}

impl MovementRecord {
    pub fn leave(
        external_id: impl Into<String>,
        person_name: impl Into<String>,
        from: impl Into<String>,
        detected_at: DateTime<Utc>,
    ) -> Self {
        Self {
            external_id: external_id.into(),
            person_name: person_name.into(),
            from_organization: Some(from.into()),
            to_organization: String::new(),
            kind: MovementKind::Leave,
            detected_at,
        }
    }

    pub fn join(
        external_id: impl Into<String>,
        person_name: impl Into<String>,
        to: impl Into<String>,
        detected_at: DateTime<Utc>,
    ) -> Self {
        Self {
            external_id: external_id.into(),
            person_name: person_name.into(),
            from_organization: None,
            to_organization: to.into(),
            kind: MovementKind::Join,
            detected_at,
        }
    }

    pub fn transfer(
        external_id: impl Into<String>,
        person_name: impl Into<String>,
        from: impl Into<String>,
        to: impl Into<String>,
        detected_at: DateTime<Utc>,
    ) -> Self {
        Self {
            external_id: external_id.into(),
            person_name: person_name.into(),
            from_organization: Some(from.into()),
            to_organization: to.into(),
            kind: MovementKind::Transfer,
            detected_at,
        }
    }

    /// Whether origin and destination have the shape required by the kind
    pub fn is_well_formed(&self) -> bool {
        let has_origin = self
            .from_organization
            .as_deref()
            .map(|o| !o.is_empty())
            .unwrap_or(false);
        match self.kind {
            MovementKind::Leave => has_origin && self.to_organization.is_empty(),
            MovementKind::Join => self.from_organization.is_none() && !self.to_organization.is_empty(),
            MovementKind::Transfer => has_origin && !self.to_organization.is_empty(),
        }
    }

    /// Key used by stores to make movement inserts idempotent
    pub fn dedup_key(&self) -> (String, MovementKind, Option<String>, String, DateTime<Utc>) {
        (
            self.external_id.clone(),
            self.kind,
            self.from_organization.clone(),
            self.to_organization.clone(),
            self.detected_at,
        )
    }
}
