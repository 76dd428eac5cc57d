//! Headcount probe: one search, one read of the result counter, no paging.

use tracing::{debug, warn};

use super::error::{CrawlError, ProbeError};
use super::markup;
use super::navigator::{bounded, Navigator};
use crate::config::Pacing;
use crate::models::HeadcountComparison;
use crate::store::{RosterStore, StoreError};

pub struct HeadcountProbe {
    pacing: Pacing,
}

impl HeadcountProbe {
    pub fn new(pacing: Pacing) -> Self {
        Self { pacing }
    }

    /// Number of directory results for `organization`.
    ///
    /// A results view without the `검색결과 <n> 건` counter reads as 0. The
    /// session is closed before returning.
    pub async fn probe_headcount<N: Navigator>(&self, mut session: N, organization: &str) -> Result<u32, ProbeError> {
        let result = self.read_count(&mut session, organization).await;

        if let Err(e) = session.close().await {
            warn!(organization = %organization, error = %e, "Failed to close probe session");
        }

        result.map_err(|source| ProbeError {
            organization: organization.to_string(),
            source,
        })
    }

    async fn read_count<N: Navigator>(&self, session: &mut N, organization: &str) -> Result<u32, CrawlError> {
        let nav_timeout = self.pacing.navigation_timeout();
        bounded("open search", nav_timeout, session.open_search()).await?;
        bounded("submit search", nav_timeout, session.submit_search(organization)).await?;
        tokio::time::sleep(self.pacing.settle_delay()).await;

        let html = bounded("read results", nav_timeout, session.current_markup()).await?;
        let count = markup::result_count(&html);
        if count.is_none() {
            debug!(organization = %organization, "No result counter shown, reading as 0");
        }
        Ok(count.unwrap_or(0))
    }
}

/// Compare a probed count with what the directory listed at the last crawl.
///
/// The probe counts every search hit, so the baseline is the unfiltered row
/// count recorded by the last completed crawl. Stores without one fall back
/// to the current roster size.
pub async fn compare_headcount<S: RosterStore + ?Sized>(
    store: &S,
    organization: &str,
    probed: u32,
) -> Result<HeadcountComparison, StoreError> {
    let previous = match store.last_listed_count(organization).await? {
        Some(listed) => listed,
        None => store.count_current_roster_size(organization).await?,
    };
    Ok(HeadcountComparison::new(organization, probed, previous))
}
