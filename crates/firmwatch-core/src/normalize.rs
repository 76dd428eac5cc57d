//! Record validation and reshaping.
//!
//! Turns crawler output into the two persisted shapes and canonicalizes
//! organization names so that roster comparisons can use plain equality.

use std::collections::HashSet;
use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::Serialize;
use thiserror::Error;

use crate::models::{CanonicalPerson, RawRecord, RosterEntry};
use crate::utils::collapse_whitespace;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum RequiredField {
    ExternalId,
    Name,
    Organization,
    ProfileUrl,
}

impl std::fmt::Display for RequiredField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RequiredField::ExternalId => write!(f, "external id"),
            RequiredField::Name => write!(f, "name"),
            RequiredField::Organization => write!(f, "organization"),
            RequiredField::ProfileUrl => write!(f, "profile url"),
        }
    }
}

fn join_fields(fields: &[RequiredField]) -> String {
    fields.iter().map(|f| f.to_string()).collect::<Vec<_>>().join(", ")
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("missing required field(s): {}", join_fields(.missing))]
pub struct ValidationError {
    pub missing: Vec<RequiredField>,
}

/// A record that failed validation, kept for reporting.
#[derive(Debug, Clone)]
pub struct InvalidRecord {
    pub record: RawRecord,
    pub error: ValidationError,
}

#[derive(Debug, Clone, Default)]
pub struct Partition {
    pub valid: Vec<RawRecord>,
    pub invalid: Vec<InvalidRecord>,
}

/// Check that every required field is present and non-blank.
pub fn validate(raw: &RawRecord) -> Result<(), ValidationError> {
    let checks = [
        (RequiredField::ExternalId, &raw.external_id),
        (RequiredField::Name, &raw.name),
        (RequiredField::Organization, &raw.organization),
        (RequiredField::ProfileUrl, &raw.profile_url),
    ];

    let missing: Vec<RequiredField> = checks
        .iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(field, _)| *field)
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(ValidationError { missing })
    }
}

pub fn partition_valid(records: Vec<RawRecord>) -> Partition {
    let mut partition = Partition::default();
    for record in records {
        match validate(&record) {
            Ok(()) => partition.valid.push(record),
            Err(error) => partition.invalid.push(InvalidRecord { record, error }),
        }
    }
    partition
}

/// Keep the first record for each external id. Returns the kept records and
/// the number dropped.
pub fn dedupe_by_external_id(records: Vec<RawRecord>) -> (Vec<RawRecord>, usize) {
    let mut seen = HashSet::new();
    let before = records.len();
    let kept: Vec<RawRecord> = records
        .into_iter()
        .filter(|r| seen.insert(r.external_id.clone()))
        .collect();
    let dropped = before - kept.len();
    (kept, dropped)
}

fn non_blank(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Split a validated record into the person and the roster observation.
pub fn to_canonical(raw: &RawRecord, observed_at: DateTime<Utc>) -> (CanonicalPerson, RosterEntry) {
    let external_id = raw.external_id.trim().to_string();

    let person = CanonicalPerson {
        external_id: external_id.clone(),
        name: raw.name.trim().to_string(),
        alias: non_blank(&raw.alias),
        birth_year: raw.birth_year,
        gender: non_blank(&raw.gender),
        credential_type: non_blank(&raw.credential_type),
        credential_number: raw.credential_number,
        profile_url: raw.profile_url.trim().to_string(),
    };

    let entry = RosterEntry::current(
        external_id,
        normalize_organization_name(&raw.organization),
        non_blank(&raw.role_title),
        observed_at,
    );

    (person, entry)
}

// ============================================================================
// Organization names
// ============================================================================

const LEGAL_FORMS: &str = r"법무법인(?:\s*\(\s*유한?\s*\))?|법무조합|법률사무소|특허법인(?:\s*\(\s*유한?\s*\))?|유한회사|주식회사|\(\s*유한?\s*\)|\(\s*주\s*\)|\b(?i:LLC|LLP)\b";

fn leading_legal_form() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(&format!(r"^(?:{})\s*", LEGAL_FORMS)).expect("leading legal form pattern")
    })
}

fn trailing_legal_form() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(&format!(r"\s*(?:{})$", LEGAL_FORMS)).expect("trailing legal form pattern")
    })
}

fn trailing_parenthetical() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s*\([^()]*\)$").expect("trailing parenthetical pattern"))
}

fn strip_noise_once(name: &str) -> String {
    let mut s = collapse_whitespace(name);

    // "로고스 / 금융팀" -> "로고스"
    if let Some(idx) = s.find('/') {
        s.truncate(idx);
    }

    let s = leading_legal_form().replace(s.trim(), "").into_owned();
    let s = trailing_parenthetical().replace(s.trim(), "").into_owned();
    let s = trailing_legal_form().replace(s.trim(), "").into_owned();

    collapse_whitespace(&s)
}

/// Canonical organization name: legal-entity forms, trailing branch-office
/// parentheticals and "/department" suffixes removed, whitespace collapsed.
///
/// If stripping would leave nothing, the whitespace-collapsed input is kept.
/// The function is idempotent.
pub fn normalize_organization_name(name: &str) -> String {
    let mut current = collapse_whitespace(name);
    loop {
        let next = strip_noise_once(&current);
        if next == current {
            break;
        }
        current = next;
    }

    if current.is_empty() {
        collapse_whitespace(name)
    } else {
        current
    }
}

/// Whether a record's printed organization is the organization that was searched for.
pub fn matches_organization(record: &RawRecord, organization: &str) -> bool {
    normalize_organization_name(&record.organization) == normalize_organization_name(organization)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(id: &str, name: &str) -> RawRecord {
        RawRecord {
            external_id: id.to_string(),
            name: name.to_string(),
            organization: "법무법인(유) 로고스".to_string(),
            profile_url: format!("/Info/ContentView?sid={}", id),
            role_title: Some("변호사".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_validate_ok() {
        assert!(validate(&raw("S1", "Kim")).is_ok());
    }

    #[test]
    fn test_validate_lists_all_missing_fields() {
        let record = RawRecord {
            name: "  ".to_string(),
            ..Default::default()
        };
        let err = validate(&record).unwrap_err();
        assert_eq!(
            err.missing,
            vec![
                RequiredField::ExternalId,
                RequiredField::Name,
                RequiredField::Organization,
                RequiredField::ProfileUrl,
            ]
        );
        assert!(err.to_string().contains("external id, name"));
    }

    #[test]
    fn test_partition_valid() {
        let mut bad = raw("S2", "Lee");
        bad.profile_url.clear();
        let partition = partition_valid(vec![raw("S1", "Kim"), bad]);
        assert_eq!(partition.valid.len(), 1);
        assert_eq!(partition.invalid.len(), 1);
        assert_eq!(partition.invalid[0].error.missing, vec![RequiredField::ProfileUrl]);
        for record in &partition.valid {
            assert!(!record.external_id.is_empty());
            assert!(!record.name.is_empty());
            assert!(!record.organization.is_empty());
            assert!(!record.profile_url.is_empty());
        }
    }

    #[test]
    fn test_dedupe_keeps_first() {
        let mut second = raw("S1", "Kim (dup)");
        second.role_title = None;
        let (kept, dropped) = dedupe_by_external_id(vec![raw("S1", "Kim"), raw("S2", "Lee"), second]);
        assert_eq!(dropped, 1);
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].name, "Kim");
    }

    #[test]
    fn test_to_canonical_splits_record() {
        let mut record = raw(" S1 ", "Kim");
        record.alias = Some(" ".to_string());
        record.birth_year = Some(1991);
        let observed = Utc::now();
        let (person, entry) = to_canonical(&record, observed);

        assert_eq!(person.external_id, "S1");
        assert_eq!(person.alias, None);
        assert_eq!(person.birth_year, Some(1991));
        assert_eq!(entry.external_id, "S1");
        assert_eq!(entry.organization, "로고스");
        assert_eq!(entry.role_title.as_deref(), Some("변호사"));
        assert!(entry.is_current);
        assert_eq!(entry.started_at, observed);
        assert_eq!(entry.ended_at, None);
    }

    #[test]
    fn test_normalize_strips_legal_forms() {
        assert_eq!(normalize_organization_name("법무법인(유) 로고스"), "로고스");
        assert_eq!(normalize_organization_name("법무법인(유한) 태평양"), "태평양");
        assert_eq!(normalize_organization_name("법무법인 ( 유한 ) 세종"), "세종");
        assert_eq!(normalize_organization_name("김앤장 법률사무소"), "김앤장");
        assert_eq!(normalize_organization_name("법무법인 율촌"), "율촌");
        assert_eq!(normalize_organization_name("Barun LLC"), "Barun");
        assert_eq!(normalize_organization_name("Dallc"), "Dallc");
        assert_eq!(normalize_organization_name("Kollp LLP"), "Kollp");
    }

    #[test]
    fn test_normalize_strips_branch_and_department() {
        assert_eq!(normalize_organization_name("법무법인 세종 (부산분사무소)"), "세종");
        assert_eq!(normalize_organization_name("법무법인 광장 / 기업법무팀"), "광장");
        assert_eq!(normalize_organization_name("법무법인(유한) 화우(서울) / 송무"), "화우");
        assert_eq!(normalize_organization_name("  대륙아주   "), "대륙아주");
    }

    #[test]
    fn test_normalize_keeps_name_when_everything_is_noise() {
        assert_eq!(normalize_organization_name("법무법인"), "법무법인");
        assert_eq!(normalize_organization_name(" (유) "), "(유)");
        assert_eq!(normalize_organization_name(""), "");
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let samples = [
            "법무법인(유) 로고스",
            "법무법인 세종 (부산분사무소)",
            "김앤장 법률사무소 / 금융",
            "/abc",
            "법무법인",
            "(유) (주) 원",
            "A (B (C))",
            "  x  / y / z ",
            "법무법인법무법인 지평",
        ];
        for s in samples {
            let once = normalize_organization_name(s);
            assert_eq!(normalize_organization_name(&once), once, "input: {:?}", s);
        }
    }

    #[test]
    fn test_matches_organization() {
        let record = raw("S1", "Kim");
        assert!(matches_organization(&record, "로고스"));
        assert!(matches_organization(&record, "법무법인 로고스"));
        assert!(!matches_organization(&record, "광장"));
    }
}
