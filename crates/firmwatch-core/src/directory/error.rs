use std::time::Duration;

use thiserror::Error;

use crate::utils::truncate_string;

/// The search interface could not be driven. Fatal for the organization's crawl.
#[derive(Error, Debug)]
pub enum NavigationError {
    #[error("search input `{0}` not found on the search page")]
    SearchInputNotFound(String),

    #[error("search submit control not found")]
    SubmitControlNotFound,

    #[error("search form has not been loaded")]
    SearchNotOpened,

    #[error("no results view has been loaded")]
    NoResultsLoaded,

    #[error("timed out after {waited:?} during {step}")]
    Timeout { step: &'static str, waited: Duration },

    #[error("session already closed")]
    SessionClosed,
}

#[derive(Error, Debug)]
pub enum CrawlError {
    #[error("Navigation failed: {0}")]
    Navigation(#[from] NavigationError),

    #[error("Page {page} could not be parsed: {reason}")]
    PageExtraction { page: u32, reason: String },

    #[error("Page {page}: indicator did not change within {waited:?}")]
    PageTimeout { page: u32, waited: Duration },

    #[error("No pagination control leads to page {0}")]
    NoRouteToPage(u32),

    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Rate limited - please wait before retrying")]
    RateLimited,

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

impl CrawlError {
    pub fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        let truncated = truncate_string(body, MAX_ERROR_BODY_LENGTH);
        match status.as_u16() {
            403 => CrawlError::AccessDenied(truncated),
            404 => CrawlError::NotFound(truncated),
            429 => CrawlError::RateLimited,
            500..=599 => CrawlError::ServerError(truncated),
            _ => CrawlError::InvalidResponse(format!("Status {}: {}", status, truncated)),
        }
    }

    pub fn is_navigation(&self) -> bool {
        matches!(self, CrawlError::Navigation(_))
    }
}

/// A headcount probe that did not produce a count.
#[derive(Error, Debug)]
#[error("headcount probe for {organization} failed: {source}")]
pub struct ProbeError {
    pub organization: String,
    #[source]
    pub source: CrawlError,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_status_maps_codes() {
        assert!(matches!(
            CrawlError::from_status(reqwest::StatusCode::TOO_MANY_REQUESTS, ""),
            CrawlError::RateLimited
        ));
        assert!(matches!(
            CrawlError::from_status(reqwest::StatusCode::BAD_GATEWAY, "upstream"),
            CrawlError::ServerError(ref body) if body == "upstream"
        ));
        assert!(matches!(
            CrawlError::from_status(reqwest::StatusCode::FORBIDDEN, "blocked"),
            CrawlError::AccessDenied(_)
        ));
    }

    #[test]
    fn test_from_status_truncates_body() {
        let body = "x".repeat(2000);
        match CrawlError::from_status(reqwest::StatusCode::INTERNAL_SERVER_ERROR, &body) {
            CrawlError::ServerError(msg) => assert_eq!(msg.chars().count(), MAX_ERROR_BODY_LENGTH),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_navigation_errors_are_flagged() {
        let err: CrawlError = NavigationError::SubmitControlNotFound.into();
        assert!(err.is_navigation());
        assert!(!CrawlError::NoRouteToPage(3).is_navigation());
    }
}
