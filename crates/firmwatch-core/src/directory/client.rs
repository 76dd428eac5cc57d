//! HTTP session against the directory search interface.
//!
//! `HttpNavigator` keeps a cookie-carrying reqwest client and the last
//! document it loaded. Form submission and pagination are replayed as plain
//! requests built from the parsed markup.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, Client, RequestBuilder};
use tracing::{debug, warn};
use url::Url;

use super::error::{CrawlError, NavigationError};
use super::markup::{self, PagerLink, SearchForm, SEARCH_INPUT_SELECTOR};
use super::navigator::{Navigator, SessionFactory};
use crate::config::{Config, ConfigError};

/// Maximum number of retries for rate-limited (429) requests.
const MAX_RATE_LIMIT_RETRIES: u32 = 3;

/// Initial backoff delay in milliseconds for rate limiting.
const INITIAL_BACKOFF_MS: u64 = 1000;

const USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0 Safari/537.36";
const ACCEPT_LANGUAGE: &str = "ko-KR,ko;q=0.9,en-US;q=0.8,en;q=0.7";

fn browser_headers() -> header::HeaderMap {
    let mut headers = header::HeaderMap::new();
    headers.insert(header::USER_AGENT, header::HeaderValue::from_static(USER_AGENT));
    headers.insert(
        header::ACCEPT,
        header::HeaderValue::from_static("text/html,application/xhtml+xml;q=0.9,*/*;q=0.8"),
    );
    headers.insert(header::ACCEPT_LANGUAGE, header::HeaderValue::from_static(ACCEPT_LANGUAGE));
    headers
}

/// A submitted search, kept so script-driven pagers can be replayed.
#[derive(Debug, Clone)]
struct Submission {
    target: Url,
    is_post: bool,
    fields: Vec<(String, String)>,
}

/// Form fields sent when searching for `query`.
fn submission_fields(form: &SearchForm, query: &str) -> Result<Vec<(String, String)>, NavigationError> {
    let submit = form.submit.as_ref().ok_or(NavigationError::SubmitControlNotFound)?;

    let mut fields: Vec<(String, String)> = form
        .hidden_fields
        .iter()
        .filter(|(name, _)| *name != form.query_field)
        .cloned()
        .collect();
    fields.push((form.query_field.clone(), query.to_string()));
    if let Some(ref name) = submit.name {
        fields.push((name.clone(), submit.value.clone()));
    }
    Ok(fields)
}

/// Replace (or add) the page parameter of a submission.
fn with_page(fields: &[(String, String)], page_param: &str, page: u32) -> Vec<(String, String)> {
    let mut fields: Vec<(String, String)> = fields.iter().filter(|(name, _)| name != page_param).cloned().collect();
    fields.push((page_param.to_string(), page.to_string()));
    fields
}

pub struct HttpNavigator {
    /// `None` once the session is closed
    client: Option<Client>,
    search_url: Url,
    page_param: String,
    current_url: Url,
    markup: Option<String>,
    form: Option<SearchForm>,
    submission: Option<Submission>,
}

impl HttpNavigator {
    pub fn new(client: Client, search_url: Url, page_param: impl Into<String>) -> Self {
        Self {
            client: Some(client),
            current_url: search_url.clone(),
            search_url,
            page_param: page_param.into(),
            markup: None,
            form: None,
            submission: None,
        }
    }

    fn client(&self) -> Result<&Client, CrawlError> {
        self.client
            .as_ref()
            .ok_or_else(|| NavigationError::SessionClosed.into())
    }

    /// Send a request, retrying 429 responses with exponential backoff.
    async fn send_with_retry<F>(&self, build: F) -> Result<(Url, String), CrawlError>
    where
        F: Fn(&Client) -> RequestBuilder + Send + Sync,
    {
        let client = self.client()?;
        let mut retries = 0;
        let mut backoff_ms = INITIAL_BACKOFF_MS;

        loop {
            let response = build(client).send().await?;
            let status = response.status();

            if status.is_success() {
                let final_url = response.url().clone();
                let body = response.text().await?;
                return Ok((final_url, body));
            }

            if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
                retries += 1;
                if retries > MAX_RATE_LIMIT_RETRIES {
                    return Err(CrawlError::RateLimited);
                }
                warn!(url = %response.url(), retry = retries, backoff_ms = backoff_ms, "Rate limited, backing off");
                tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                backoff_ms *= 2;
                continue;
            }

            let body = response.text().await.unwrap_or_default();
            return Err(CrawlError::from_status(status, &body));
        }
    }

    async fn load(&mut self, submission: &Submission) -> Result<(), CrawlError> {
        let (url, body) = self
            .send_with_retry(|client| {
                if submission.is_post {
                    client.post(submission.target.clone()).form(&submission.fields)
                } else {
                    client.get(submission.target.clone()).query(&submission.fields)
                }
            })
            .await?;
        self.current_url = url;
        self.markup = Some(body);
        Ok(())
    }

    async fn get(&mut self, target: Url) -> Result<(), CrawlError> {
        debug!(url = %target, "GET");
        let (url, body) = self.send_with_retry(|client| client.get(target.clone())).await?;
        self.current_url = url;
        self.markup = Some(body);
        Ok(())
    }

    /// Activate a pager control. Returns `false` when there is nothing to follow.
    async fn follow(&mut self, link: PagerLink) -> Result<bool, CrawlError> {
        if let Some(href) = link.href {
            let target = self.current_url.join(&href)?;
            self.get(target).await?;
            return Ok(true);
        }

        let (Some(page), Some(submission)) = (link.page, self.submission.clone()) else {
            return Ok(false);
        };
        let paged = Submission {
            fields: with_page(&submission.fields, &self.page_param, page),
            ..submission
        };
        debug!(page, "replaying search for script-driven pager");
        self.load(&paged).await?;
        Ok(true)
    }

    fn markup(&self) -> Result<&str, CrawlError> {
        self.client()?;
        self.markup
            .as_deref()
            .ok_or_else(|| NavigationError::NoResultsLoaded.into())
    }
}

#[async_trait]
impl Navigator for HttpNavigator {
    async fn open_search(&mut self) -> Result<(), CrawlError> {
        self.get(self.search_url.clone()).await?;
        let form = markup::parse_search_form(self.markup()?, SEARCH_INPUT_SELECTOR)?;
        self.form = Some(form);
        Ok(())
    }

    async fn submit_search(&mut self, query: &str) -> Result<(), CrawlError> {
        self.client()?;
        let form = self.form.as_ref().ok_or(NavigationError::SearchNotOpened)?;
        let fields = submission_fields(form, query)?;
        let target = match form.action {
            Some(ref action) => self.current_url.join(action)?,
            None => self.current_url.clone(),
        };
        let submission = Submission {
            target,
            is_post: form.is_post,
            fields,
        };

        self.load(&submission).await?;
        self.submission = Some(submission);
        Ok(())
    }

    async fn current_markup(&mut self) -> Result<String, CrawlError> {
        self.markup().map(str::to_string)
    }

    async fn click_page_link(&mut self, page: u32) -> Result<bool, CrawlError> {
        match markup::pager_link(self.markup()?, page) {
            Some(link) => self.follow(link).await,
            None => Ok(false),
        }
    }

    async fn click_next(&mut self) -> Result<bool, CrawlError> {
        let html = self.markup()?;
        let Some(mut link) = markup::next_link(html) else {
            return Ok(false);
        };
        if link.href.is_none() && link.page.is_none() {
            link.page = markup::page_indicator(html).map(|i| i.current + 1);
        }
        self.follow(link).await
    }

    async fn close(&mut self) -> Result<(), CrawlError> {
        self.client = None;
        self.markup = None;
        self.form = None;
        self.submission = None;
        Ok(())
    }
}

/// Builds one [`HttpNavigator`] per organization, each with its own cookie jar.
#[derive(Debug, Clone)]
pub struct HttpSessionFactory {
    search_url: Url,
    page_param: String,
    request_timeout: Duration,
}

impl HttpSessionFactory {
    pub fn new(config: &Config) -> Result<Self, ConfigError> {
        Ok(Self {
            search_url: config.search_url()?,
            page_param: config.page_query_param.clone(),
            request_timeout: config.pacing.navigation_timeout(),
        })
    }
}

#[async_trait]
impl SessionFactory for HttpSessionFactory {
    type Session = HttpNavigator;

    async fn open_session(&self) -> Result<HttpNavigator, CrawlError> {
        let client = Client::builder()
            .cookie_store(true)
            .default_headers(browser_headers())
            .timeout(self.request_timeout)
            .build()?;
        Ok(HttpNavigator::new(client, self.search_url.clone(), self.page_param.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::markup::SubmitControl;

    fn form(submit: Option<SubmitControl>) -> SearchForm {
        SearchForm {
            action: Some("/Info/ContentMain/LawyerList".to_string()),
            is_post: false,
            query_field: "sWork".to_string(),
            hidden_fields: vec![
                ("menu".to_string(), "lawyer".to_string()),
                ("sWork".to_string(), "stale".to_string()),
            ],
            submit,
        }
    }

    #[test]
    fn test_submission_fields() {
        let fields = submission_fields(
            &form(Some(SubmitControl {
                name: Some("btnSearch".to_string()),
                value: "검색".to_string(),
            })),
            "로고스",
        )
        .unwrap();
        assert_eq!(
            fields,
            vec![
                ("menu".to_string(), "lawyer".to_string()),
                ("sWork".to_string(), "로고스".to_string()),
                ("btnSearch".to_string(), "검색".to_string()),
            ]
        );
    }

    #[test]
    fn test_submission_requires_submit_control() {
        let err = submission_fields(&form(None), "로고스").unwrap_err();
        assert!(matches!(err, NavigationError::SubmitControlNotFound));
    }

    #[test]
    fn test_with_page_replaces_parameter() {
        let fields = vec![
            ("sWork".to_string(), "로고스".to_string()),
            ("pageIndex".to_string(), "1".to_string()),
        ];
        let paged = with_page(&fields, "pageIndex", 4);
        assert_eq!(
            paged,
            vec![
                ("sWork".to_string(), "로고스".to_string()),
                ("pageIndex".to_string(), "4".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_closed_session_rejects_calls() {
        let factory = HttpSessionFactory::new(&Config::default()).unwrap();
        let mut session = factory.open_session().await.unwrap();
        session.close().await.unwrap();

        let err = session.current_markup().await.unwrap_err();
        assert!(matches!(err, CrawlError::Navigation(NavigationError::SessionClosed)));
        let err = session.submit_search("로고스").await.unwrap_err();
        assert!(matches!(err, CrawlError::Navigation(NavigationError::SessionClosed)));
    }

    #[tokio::test]
    async fn test_submit_before_open_fails() {
        let factory = HttpSessionFactory::new(&Config::default()).unwrap();
        let mut session = factory.open_session().await.unwrap();
        let err = session.submit_search("로고스").await.unwrap_err();
        assert!(matches!(err, CrawlError::Navigation(NavigationError::SearchNotOpened)));
        let err = session.current_markup().await.unwrap_err();
        assert!(matches!(err, CrawlError::Navigation(NavigationError::NoResultsLoaded)));
    }
}
