//! Multi-page crawl of one organization's directory listing.
//!
//! The crawl is an explicit state machine. [`CrawlRun::advance`] performs one
//! step and returns the next state with the records that step extracted; the
//! driver in [`DirectoryCrawler::crawl_organization`] just loops until `Done`.
//!
//! ```text
//! Idle -> SessionReady -> FormSubmitted -> ResultsLoaded
//!      -> PageParsed <-> Paginating -> ... -> Done
//!                  \-> Failed(page) -> Done
//! ```
//!
//! Errors before `ResultsLoaded` abort the crawl. From `ResultsLoaded` on, a
//! page that cannot be reached or parsed moves to `Failed` and the records
//! gathered so far are kept.

use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::error::CrawlError;
use super::markup;
use super::navigator::{bounded, Navigator};
use crate::config::Pacing;
use crate::models::RawRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrawlState {
    Idle,
    SessionReady,
    FormSubmitted,
    /// First results page is showing; `total_pages` as read from the indicator
    ResultsLoaded { total_pages: u32 },
    Paginating { target: u32, total_pages: u32 },
    PageParsed { page: u32, total_pages: u32 },
    Failed { page: u32 },
    Done,
}

/// Outcome of one [`CrawlRun::advance`] call.
#[derive(Debug)]
pub struct Step {
    pub next: CrawlState,
    pub records: Vec<RawRecord>,
}

impl Step {
    fn to(next: CrawlState) -> Self {
        Self { next, records: Vec::new() }
    }
}

/// Reported once per parsed page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CrawlProgress {
    pub page: u32,
    pub total_pages: u32,
    pub records_so_far: usize,
}

/// Rows gathered by one crawl, with the total the directory claimed.
#[derive(Debug, Clone, Default)]
pub struct CrawlOutput {
    pub records: Vec<RawRecord>,
    /// `검색결과 <n> 건` on the first results page, if shown
    pub result_count: Option<u32>,
    /// Every result page was parsed
    pub complete: bool,
}

impl CrawlOutput {
    /// Listed rows that were never read, e.g. after a failed page or a page cap.
    pub fn unread(&self) -> u32 {
        self.result_count
            .map_or(0, |total| total.saturating_sub(self.records.len() as u32))
    }

    /// Row count to compare the next headcount probe against.
    ///
    /// A complete crawl adopts the directory's own total; a partial one keeps
    /// the rows actually read so the next probe sees a difference.
    pub fn listed(&self) -> u32 {
        let read = self.records.len() as u32;
        match self.result_count {
            Some(total) if self.complete => total,
            _ => read,
        }
    }
}

/// Callback for [`CrawlProgress`] updates.
pub type ProgressFn<'a> = &'a (dyn Fn(CrawlProgress) + Sync);

/// Borrowed state of one organization's crawl.
pub struct CrawlRun<'a, N: Navigator> {
    session: &'a mut N,
    organization: &'a str,
    pacing: &'a Pacing,
    max_pages: Option<u32>,
    result_count: Option<u32>,
    complete: bool,
}

impl<'a, N: Navigator> CrawlRun<'a, N> {
    pub fn new(session: &'a mut N, organization: &'a str, pacing: &'a Pacing, max_pages: Option<u32>) -> Self {
        Self {
            session,
            organization,
            pacing,
            max_pages,
            result_count: None,
            complete: false,
        }
    }

    /// Result total read when the first results page loaded.
    pub fn result_count(&self) -> Option<u32> {
        self.result_count
    }

    /// Last page to visit given the discovered total.
    fn last_page(&self, total_pages: u32) -> u32 {
        match self.max_pages {
            Some(cap) => total_pages.min(cap.max(1)),
            None => total_pages,
        }
    }

    /// Perform one step of the crawl.
    pub async fn advance(&mut self, state: CrawlState) -> Result<Step, CrawlError> {
        let nav_timeout = self.pacing.navigation_timeout();

        match state {
            CrawlState::Idle => {
                bounded("open search", nav_timeout, self.session.open_search()).await?;
                Ok(Step::to(CrawlState::SessionReady))
            }
            CrawlState::SessionReady => {
                bounded("submit search", nav_timeout, self.session.submit_search(self.organization)).await?;
                Ok(Step::to(CrawlState::FormSubmitted))
            }
            CrawlState::FormSubmitted => {
                tokio::time::sleep(self.pacing.settle_delay()).await;
                let html = bounded("read results", nav_timeout, self.session.current_markup()).await?;
                let total_pages = markup::page_indicator(&html).map(|i| i.total.max(1)).unwrap_or(1);
                self.result_count = markup::result_count(&html);
                info!(
                    organization = %self.organization,
                    total_pages,
                    results = ?self.result_count,
                    "Results loaded"
                );
                Ok(Step::to(CrawlState::ResultsLoaded { total_pages }))
            }
            CrawlState::ResultsLoaded { total_pages } => Ok(self.parse_current(1, total_pages).await),
            CrawlState::PageParsed { page, total_pages } => {
                if page >= self.last_page(total_pages) {
                    self.complete = page >= total_pages;
                    return Ok(Step::to(CrawlState::Done));
                }
                tokio::time::sleep(self.pacing.page_delay()).await;
                Ok(Step::to(CrawlState::Paginating {
                    target: page + 1,
                    total_pages,
                }))
            }
            CrawlState::Paginating { target, total_pages } => match self.go_to_page(target).await {
                Ok(()) => Ok(self.parse_current(target, total_pages).await),
                Err(e) => {
                    warn!(organization = %self.organization, page = target, error = %e, "Could not reach page");
                    Ok(Step::to(CrawlState::Failed { page: target }))
                }
            },
            CrawlState::Failed { page } => {
                warn!(organization = %self.organization, page, "Crawl truncated, keeping records from earlier pages");
                Ok(Step::to(CrawlState::Done))
            }
            CrawlState::Done => Ok(Step::to(CrawlState::Done)),
        }
    }

    /// Read and parse the page currently shown. Never fails the crawl.
    async fn parse_current(&mut self, page: u32, total_pages: u32) -> Step {
        let nav_timeout = self.pacing.navigation_timeout();
        let parsed = match bounded("read page", nav_timeout, self.session.current_markup()).await {
            Ok(html) => markup::parse_results_page(&html, page),
            Err(e) => Err(e),
        };

        match parsed {
            Ok(results) => {
                if results.rows_dropped() > 0 {
                    debug!(
                        organization = %self.organization,
                        page,
                        dropped = results.rows_dropped(),
                        "Dropped rows without id, name or role"
                    );
                }
                Step {
                    next: CrawlState::PageParsed { page, total_pages },
                    records: results.records,
                }
            }
            Err(e) => {
                warn!(organization = %self.organization, page, error = %e, "Page extraction failed");
                Step::to(CrawlState::Failed { page })
            }
        }
    }

    async fn current_page(&mut self, target: u32) -> Result<u32, CrawlError> {
        let html = bounded("read page", self.pacing.navigation_timeout(), self.session.current_markup()).await?;
        markup::page_indicator(&html)
            .map(|i| i.current)
            .ok_or_else(|| CrawlError::PageExtraction {
                page: target,
                reason: "page indicator missing".to_string(),
            })
    }

    /// Poll the page indicator until `reached(current)` holds, within the wait timeout.
    async fn wait_for_indicator(&mut self, target: u32, reached: impl Fn(u32) -> bool) -> Result<(), CrawlError> {
        let wait = self.pacing.wait_timeout();
        let deadline = Instant::now() + wait;

        loop {
            let html = bounded("read page", self.pacing.navigation_timeout(), self.session.current_markup()).await?;
            if let Some(indicator) = markup::page_indicator(&html) {
                if reached(indicator.current) {
                    return Ok(());
                }
            }
            if Instant::now() >= deadline {
                return Err(CrawlError::PageTimeout { page: target, waited: wait });
            }
            tokio::time::sleep(self.pacing.poll_interval()).await;
        }
    }

    /// Navigate to `target`: the direct pager link if shown, else "next" until
    /// the indicator reaches it.
    async fn go_to_page(&mut self, target: u32) -> Result<(), CrawlError> {
        let nav_timeout = self.pacing.navigation_timeout();

        if bounded("page link", nav_timeout, self.session.click_page_link(target)).await? {
            return self.wait_for_indicator(target, |current| current >= target).await;
        }

        loop {
            let before = self.current_page(target).await?;
            if before >= target {
                return Ok(());
            }
            if !bounded("next page", nav_timeout, self.session.click_next()).await? {
                return Err(CrawlError::NoRouteToPage(target));
            }
            self.wait_for_indicator(target, |current| current > before).await?;
        }
    }
}

pub struct DirectoryCrawler {
    pacing: Pacing,
}

impl DirectoryCrawler {
    pub fn new(pacing: Pacing) -> Self {
        Self { pacing }
    }

    /// Crawl every result page for `organization` and return the extracted rows.
    ///
    /// The session is consumed and closed on every exit path. Fails only when
    /// the search could not be run; later page failures truncate the result.
    pub async fn crawl_organization<N: Navigator>(
        &self,
        mut session: N,
        organization: &str,
        on_progress: Option<ProgressFn<'_>>,
        max_pages: Option<u32>,
    ) -> Result<CrawlOutput, CrawlError> {
        let started = Instant::now();
        let result = self.drive(&mut session, organization, on_progress, max_pages).await;

        if let Err(e) = session.close().await {
            warn!(organization = %organization, error = %e, "Failed to close session");
        }

        match result {
            Ok(ref output) => info!(
                organization = %organization,
                records = output.records.len(),
                elapsed = %crate::utils::format_elapsed(started.elapsed().as_millis() as u64),
                "Crawl finished"
            ),
            Err(ref e) => warn!(organization = %organization, error = %e, "Crawl aborted"),
        }
        result
    }

    async fn drive<N: Navigator>(
        &self,
        session: &mut N,
        organization: &str,
        on_progress: Option<ProgressFn<'_>>,
        max_pages: Option<u32>,
    ) -> Result<CrawlOutput, CrawlError> {
        let mut run = CrawlRun::new(session, organization, &self.pacing, max_pages);
        let mut state = CrawlState::Idle;
        let mut records = Vec::new();

        while state != CrawlState::Done {
            let step = run.advance(state).await?;
            debug!(organization = %organization, from = ?state, to = ?step.next, "Crawl step");
            records.extend(step.records);

            if let CrawlState::PageParsed { page, total_pages } = step.next {
                if let Some(report) = on_progress {
                    report(CrawlProgress {
                        page,
                        total_pages,
                        records_so_far: records.len(),
                    });
                }
            }
            state = step.next;
        }

        Ok(CrawlOutput {
            records,
            result_count: run.result_count(),
            complete: run.complete,
        })
    }
}
