//! The browser-like session contract the crawler and probe drive.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;

use super::error::{CrawlError, NavigationError};

/// One interactive session against the directory search interface.
///
/// Implementations hold the session state (cookies, current document).
/// Callers own the session value and must call [`Navigator::close`] when done;
/// the crawler and probe do this on every exit path.
#[async_trait]
pub trait Navigator: Send {
    /// Load the search page and make sure the query input is present.
    async fn open_search(&mut self) -> Result<(), CrawlError>;

    /// Enter `query` into the search input and activate the submit control.
    async fn submit_search(&mut self, query: &str) -> Result<(), CrawlError>;

    /// Markup of the view currently shown.
    async fn current_markup(&mut self) -> Result<String, CrawlError>;

    /// Activate the pager's direct link for `page`. `Ok(false)` if the pager
    /// does not show that page number.
    async fn click_page_link(&mut self, page: u32) -> Result<bool, CrawlError>;

    /// Activate the pager's "next" control. `Ok(false)` if there is none.
    async fn click_next(&mut self) -> Result<bool, CrawlError>;

    /// Release the session. Further calls fail with `SessionClosed`.
    async fn close(&mut self) -> Result<(), CrawlError>;
}

/// Opens fresh sessions, one per organization.
#[async_trait]
pub trait SessionFactory: Send + Sync {
    type Session: Navigator;

    async fn open_session(&self) -> Result<Self::Session, CrawlError>;
}

/// Run a navigation step with an upper bound on how long it may suspend.
pub(crate) async fn bounded<T, F>(step: &'static str, limit: Duration, fut: F) -> Result<T, CrawlError>
where
    F: Future<Output = Result<T, CrawlError>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(NavigationError::Timeout { step, waited: limit }.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_bounded_times_out() {
        let result: Result<(), CrawlError> = bounded("open search", Duration::from_secs(1), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;

        match result {
            Err(CrawlError::Navigation(NavigationError::Timeout { step, waited })) => {
                assert_eq!(step, "open search");
                assert_eq!(waited, Duration::from_secs(1));
            }
            other => panic!("expected timeout, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_bounded_passes_through() {
        let result = bounded("submit", Duration::from_secs(1), async { Ok(7) }).await;
        assert_eq!(result.unwrap(), 7);
    }
}
