//! A scripted lawyer directory for end-to-end tests.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use firmwatch_core::models::{CanonicalPerson, CurrentRosterEntry, MovementRecord, RosterEntry};
use firmwatch_core::{Config, CrawlError, MemoryStore, Navigator, NavigationError, RosterStore, SessionFactory, StoreError};

pub const PAGE_SIZE: usize = 2;

#[derive(Debug, Clone)]
pub struct Listing {
    pub id: String,
    pub name: String,
    /// Organization as printed on the row
    pub printed_org: String,
}

pub fn listing(id: &str, printed_org: &str) -> Listing {
    Listing {
        id: id.to_string(),
        name: format!("변호사{}", id),
        printed_org: printed_org.to_string(),
    }
}

#[derive(Default)]
struct DirectoryState {
    /// Search query -> rows returned
    results: HashMap<String, Vec<Listing>>,
    /// Queries whose search page has no query input
    broken_search: HashSet<String>,
    /// (query, page) pairs rendered as an error page
    broken_pages: HashSet<(String, u32)>,
}

/// Shared directory contents; clone handles to edit between runs.
#[derive(Clone, Default)]
pub struct FakeDirectory {
    state: Arc<Mutex<DirectoryState>>,
}

impl FakeDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, query: &str, rows: Vec<Listing>) {
        self.state.lock().unwrap().results.insert(query.to_string(), rows);
    }

    pub fn break_search(&self, query: &str) {
        self.state.lock().unwrap().broken_search.insert(query.to_string());
    }

    pub fn break_page(&self, query: &str, page: u32) {
        self.state.lock().unwrap().broken_pages.insert((query.to_string(), page));
    }

    fn render(&self, query: &str, page: u32) -> String {
        let state = self.state.lock().unwrap();
        if state.broken_pages.contains(&(query.to_string(), page)) {
            return "<html><body>일시적인 오류가 발생했습니다</body></html>".to_string();
        }

        let rows = state.results.get(query).cloned().unwrap_or_default();
        let total_pages = rows.len().div_ceil(PAGE_SIZE).max(1) as u32;
        let start = (page as usize - 1) * PAGE_SIZE;
        let items: String = rows
            .iter()
            .skip(start)
            .take(PAGE_SIZE)
            .map(|l| {
                format!(
                    r#"<li><h3><a href="/Info/ContentView?sid={id}">{name}</a></h3>
                       <div><span>1985년생 / 남자 / 사법시험 40</span></div>
                       <p class="co_searchResults_summary">현직 : 변호사 / {org}</p></li>"#,
                    id = l.id,
                    name = l.name,
                    org = l.printed_org
                )
            })
            .collect();
        let pager: String = (1..=total_pages)
            .map(|p| format!(r##"<a href="#" class="navPage">{}</a>"##, p))
            .collect();

        format!(
            r##"<html><body>
               <div class="search_top"><div class="count">검색결과 {count} 건 <span>{page} / {total_pages}</span></div></div>
               <ol class="list">{items}</ol>
               <div class="navigationLinks">{pager}<a class="navNext" href="#">다음</a></div>
               </body></html>"##,
            count = rows.len(),
        )
    }

    fn row_count(&self, query: &str) -> usize {
        self.state.lock().unwrap().results.get(query).map(Vec::len).unwrap_or(0)
    }
}

pub struct FakeSession {
    directory: FakeDirectory,
    query: Option<String>,
    page: u32,
    opened: bool,
    closed: bool,
    closes: Arc<Mutex<usize>>,
}

#[async_trait]
impl Navigator for FakeSession {
    async fn open_search(&mut self) -> Result<(), CrawlError> {
        self.opened = true;
        Ok(())
    }

    async fn submit_search(&mut self, query: &str) -> Result<(), CrawlError> {
        if !self.opened {
            return Err(NavigationError::SearchNotOpened.into());
        }
        if self.directory.state.lock().unwrap().broken_search.contains(query) {
            return Err(NavigationError::SearchInputNotFound("#sWork".to_string()).into());
        }
        self.query = Some(query.to_string());
        self.page = 1;
        Ok(())
    }

    async fn current_markup(&mut self) -> Result<String, CrawlError> {
        if self.closed {
            return Err(NavigationError::SessionClosed.into());
        }
        let query = self.query.as_deref().ok_or(NavigationError::NoResultsLoaded)?;
        Ok(self.directory.render(query, self.page))
    }

    async fn click_page_link(&mut self, page: u32) -> Result<bool, CrawlError> {
        let query = self.query.clone().ok_or(NavigationError::NoResultsLoaded)?;
        let total = self.directory.row_count(&query).div_ceil(PAGE_SIZE).max(1) as u32;
        if page >= 1 && page <= total {
            self.page = page;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    async fn click_next(&mut self) -> Result<bool, CrawlError> {
        let page = self.page + 1;
        self.click_page_link(page).await
    }

    async fn close(&mut self) -> Result<(), CrawlError> {
        self.closed = true;
        *self.closes.lock().unwrap() += 1;
        Ok(())
    }
}

/// Opens [`FakeSession`]s and counts how many were opened and closed.
#[derive(Clone, Default)]
pub struct FakeFactory {
    pub directory: FakeDirectory,
    pub opened: Arc<Mutex<usize>>,
    pub closed: Arc<Mutex<usize>>,
}

impl FakeFactory {
    pub fn new(directory: FakeDirectory) -> Self {
        Self {
            directory,
            ..Default::default()
        }
    }

    pub fn opened(&self) -> usize {
        *self.opened.lock().unwrap()
    }

    pub fn closed(&self) -> usize {
        *self.closed.lock().unwrap()
    }
}

#[async_trait]
impl SessionFactory for FakeFactory {
    type Session = FakeSession;

    async fn open_session(&self) -> Result<FakeSession, CrawlError> {
        *self.opened.lock().unwrap() += 1;
        Ok(FakeSession {
            directory: self.directory.clone(),
            query: None,
            page: 1,
            opened: false,
            closed: false,
            closes: self.closed.clone(),
        })
    }
}

pub fn test_config(organizations: &[&str]) -> Config {
    Config {
        organizations: organizations.iter().map(|s| s.to_string()).collect(),
        data_dir: Some(std::env::temp_dir().join("firmwatch-tests")),
        ..Config::default()
    }
}

/// Memory store whose movement inserts fail for one organization.
pub struct FlakyStore {
    pub inner: MemoryStore,
    pub fail_movements_for: String,
}

#[async_trait]
impl RosterStore for FlakyStore {
    async fn count_current_roster_size(&self, organization: &str) -> Result<u32, StoreError> {
        self.inner.count_current_roster_size(organization).await
    }

    async fn current_roster_entries(&self, organization: &str) -> Result<Vec<CurrentRosterEntry>, StoreError> {
        self.inner.current_roster_entries(organization).await
    }

    async fn find_recent_leave(
        &self,
        external_id: &str,
        excluding_organization: &str,
        since: DateTime<Utc>,
    ) -> Result<Option<MovementRecord>, StoreError> {
        self.inner.find_recent_leave(external_id, excluding_organization, since).await
    }

    async fn upsert_persons(&self, persons: &[CanonicalPerson]) -> Result<usize, StoreError> {
        self.inner.upsert_persons(persons).await
    }

    async fn insert_roster_entries(&self, entries: &[RosterEntry]) -> Result<usize, StoreError> {
        self.inner.insert_roster_entries(entries).await
    }

    async fn insert_movements(&self, movements: &[MovementRecord]) -> Result<usize, StoreError> {
        let target = movements
            .iter()
            .any(|m| m.from_organization.as_deref() == Some(self.fail_movements_for.as_str()) || m.to_organization == self.fail_movements_for);
        if target {
            return Err(StoreError::Write {
                path: "movements".into(),
                source: std::io::Error::new(std::io::ErrorKind::Other, "disk full"),
            });
        }
        self.inner.insert_movements(movements).await
    }

    async fn deactivate_roster_entries(&self, ids: &[Uuid], ended_at: DateTime<Utc>) -> Result<usize, StoreError> {
        self.inner.deactivate_roster_entries(ids, ended_at).await
    }

    async fn last_listed_count(&self, organization: &str) -> Result<Option<u32>, StoreError> {
        self.inner.last_listed_count(organization).await
    }

    async fn record_listed_count(&self, organization: &str, count: u32) -> Result<(), StoreError> {
        self.inner.record_listed_count(organization, count).await
    }
}
