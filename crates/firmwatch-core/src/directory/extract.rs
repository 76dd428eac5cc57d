//! Text heuristics for the directory's display strings.
//!
//! Each function takes the visible text of one element and returns `None`
//! when the text does not have the expected shape. A failed match means the
//! field is absent, never that the crawl failed.

use std::sync::OnceLock;

use regex::Regex;

use crate::utils::collapse_whitespace;

macro_rules! pattern {
    ($name:ident, $re:expr) => {
        fn $name() -> &'static Regex {
            static RE: OnceLock<Regex> = OnceLock::new();
            RE.get_or_init(|| Regex::new($re).expect(concat!("invalid pattern: ", stringify!($name))))
        }
    };
}

pattern!(identity_re, r"^(.+?)\s*\((.+?)\)$");
pattern!(demographics_re, r"(\d{4})\s*년생?\s*/\s*(남자|여자|남|여)\s*(?:/\s*(.*))?$");
pattern!(credential_re, r"^(.*?\D)\s*(\d+)\s*[^\d\s]*$");
pattern!(current_role_re, r"현직\s*:\s*(.+?)\s*/\s*(.+)$");
pattern!(external_id_re, r"[?&]sid=([A-Za-z0-9]+)");
pattern!(page_indicator_re, r"(\d+)\s*/\s*(\d+)");
pattern!(result_count_re, r"검색결과\s*([\d,]+)\s*건");

/// Name and optional alias from `"<name>(<alias>)"`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub name: String,
    pub alias: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Credential {
    pub label: String,
    pub number: Option<u32>,
}

/// Fields from `"<year>년생 / <gender> / <credential-description>"`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Demographics {
    pub birth_year: Option<i32>,
    pub gender: Option<String>,
    pub credential: Option<Credential>,
}

/// Fields from `"현직 : <title> / <organization>"`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrentRole {
    pub title: String,
    pub organization: String,
}

/// `current / total` as shown next to the result count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageIndicator {
    pub current: u32,
    pub total: u32,
}

pub fn parse_identity(text: &str) -> Option<Identity> {
    let text = collapse_whitespace(text);
    if text.is_empty() {
        return None;
    }

    match identity_re().captures(&text) {
        Some(caps) => Some(Identity {
            name: caps[1].trim().to_string(),
            alias: Some(caps[2].trim().to_string()).filter(|a| !a.is_empty()),
        }),
        None => Some(Identity { name: text, alias: None }),
    }
}

/// Split a credential description into label and sequence number.
///
/// "변호사시험 8" -> ("변호사시험", 8); "사법연수원 31기" -> ("사법연수원", 31).
/// A unit suffix such as `기` or `회` after the number is dropped.
pub fn parse_credential(text: &str) -> Option<Credential> {
    let text = collapse_whitespace(text);
    if text.is_empty() {
        return None;
    }

    if let Some(caps) = credential_re().captures(&text) {
        let label = caps[1].trim();
        if let Ok(number) = caps[2].parse::<u32>() {
            if !label.is_empty() {
                return Some(Credential {
                    label: label.to_string(),
                    number: Some(number),
                });
            }
        }
    }

    Some(Credential { label: text, number: None })
}

pub fn parse_demographics(text: &str) -> Option<Demographics> {
    let text = collapse_whitespace(text);
    let caps = demographics_re().captures(&text)?;

    Some(Demographics {
        birth_year: caps[1].parse().ok(),
        gender: Some(caps[2].to_string()),
        credential: caps.get(3).and_then(|m| parse_credential(m.as_str())),
    })
}

pub fn parse_current_role(text: &str) -> Option<CurrentRole> {
    let text = collapse_whitespace(text);
    let caps = current_role_re().captures(&text)?;

    let title = caps[1].trim().to_string();
    let organization = caps[2].trim().to_string();
    if title.is_empty() || organization.is_empty() {
        return None;
    }
    Some(CurrentRole { title, organization })
}

/// The `sid` query parameter of a profile link.
pub fn external_id_from_url(url: &str) -> Option<String> {
    external_id_re()
        .captures(url)
        .map(|caps| caps[1].to_string())
}

pub fn parse_page_indicator(text: &str) -> Option<PageIndicator> {
    let caps = page_indicator_re().captures(text)?;
    let current = caps[1].parse().ok()?;
    let total = caps[2].parse().ok()?;
    Some(PageIndicator { current, total })
}

/// Total number of results from `"검색결과 1,245 건"`.
pub fn parse_result_count(text: &str) -> Option<u32> {
    let caps = result_count_re().captures(text)?;
    caps[1].replace(',', "").parse().ok()
}
