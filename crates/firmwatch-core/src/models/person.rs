use serde::{Deserialize, Serialize};

/// A directory row as extracted by the crawler, before validation.
///
/// Fields are kept as printed by the directory. `organization` still carries
/// legal-entity and department noise; see
/// [`normalize_organization_name`](crate::normalize::normalize_organization_name).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawRecord {
    #[serde(rename = "externalId")]
    pub external_id: String,
    pub name: String,
    pub alias: Option<String>,
    #[serde(rename = "birthYear")]
    pub birth_year: Option<i32>,
    pub gender: Option<String>,
    #[serde(rename = "credentialType")]
    pub credential_type: Option<String>,
    #[serde(rename = "credentialNumber")]
    pub credential_number: Option<u32>,
    #[serde(rename = "roleTitle")]
    pub role_title: Option<String>,
    pub organization: String,
    #[serde(rename = "profileUrl")]
    pub profile_url: String,
}

impl RawRecord {
    /// Name with the alias in parentheses, as the directory prints it
    pub fn display_name(&self) -> String {
        match self.alias.as_deref().filter(|a| !a.is_empty()) {
            Some(alias) => format!("{}({})", self.name, alias),
            None => self.name.clone(),
        }
    }
}

/// The stable identity of a person, keyed by the directory's external id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalPerson {
    #[serde(rename = "externalId")]
    pub external_id: String,
    pub name: String,
    pub alias: Option<String>,
    #[serde(rename = "birthYear")]
    pub birth_year: Option<i32>,
    pub gender: Option<String>,
    #[serde(rename = "credentialType")]
    pub credential_type: Option<String>,
    #[serde(rename = "credentialNumber")]
    pub credential_number: Option<u32>,
    #[serde(rename = "profileUrl")]
    pub profile_url: String,
}

impl CanonicalPerson {
    /// Credential label and number joined for display, e.g. "변호사시험 8"
    pub fn credential_display(&self) -> Option<String> {
        match (&self.credential_type, self.credential_number) {
            (Some(label), Some(number)) => Some(format!("{} {}", label, number)),
            (Some(label), None) => Some(label.clone()),
            (None, Some(number)) => Some(number.to_string()),
            (None, None) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn person() -> CanonicalPerson {
        CanonicalPerson {
            external_id: "S1".to_string(),
            name: "강검윤".to_string(),
            alias: None,
            birth_year: Some(1991),
            gender: Some("남자".to_string()),
            credential_type: Some("변호사시험".to_string()),
            credential_number: Some(8),
            profile_url: "/Info/ContentView?sid=S1".to_string(),
        }
    }

    #[test]
    fn test_display_name_with_alias() {
        let raw = RawRecord {
            name: "강검윤".to_string(),
            alias: Some("姜鈐允".to_string()),
            ..Default::default()
        };
        assert_eq!(raw.display_name(), "강검윤(姜鈐允)");
    }

    #[test]
    fn test_display_name_ignores_empty_alias() {
        let raw = RawRecord {
            name: "Kim".to_string(),
            alias: Some(String::new()),
            ..Default::default()
        };
        assert_eq!(raw.display_name(), "Kim");
    }

    #[test]
    fn test_credential_display() {
        let mut p = person();
        assert_eq!(p.credential_display().as_deref(), Some("변호사시험 8"));

        p.credential_number = None;
        assert_eq!(p.credential_display().as_deref(), Some("변호사시험"));

        p.credential_type = None;
        assert_eq!(p.credential_display(), None);
    }

    #[test]
    fn test_serde_uses_camel_case_keys() {
        let json = serde_json::to_value(person()).unwrap();
        assert_eq!(json["externalId"], "S1");
        assert_eq!(json["credentialNumber"], 8);
    }
}
