//! Two-phase batch: probe every organization's headcount, then crawl and
//! classify only the organizations whose count moved.
//!
//! Each organization is one unit of work. A crawl or store failure is
//! recorded in that organization's [`OrganizationResult`] and the batch moves
//! on to the next one.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::classifier::MovementClassifier;
use crate::config::{Config, ConfigError};
use crate::directory::{
    compare_headcount, CrawlError, CrawlProgress, DirectoryCrawler, HeadcountProbe, SessionFactory,
};
use crate::models::{HeadcountComparison, HeadcountSummary, RawRecord};
use crate::normalize::{dedupe_by_external_id, matches_organization, normalize_organization_name, partition_valid, to_canonical};
use crate::store::{RosterStore, StoreError};
use crate::utils::format_elapsed;

#[derive(Error, Debug)]
pub enum BatchError {
    #[error(transparent)]
    Crawl(#[from] CrawlError),

    #[error("Store write failed: {0}")]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScrapedCounts {
    pub total: usize,
    pub valid: usize,
    pub invalid: usize,
    pub duplicates: usize,
    #[serde(rename = "offTarget")]
    pub off_target: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SavedCounts {
    pub persons: usize,
    #[serde(rename = "rosterEntries")]
    pub roster_entries: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MovementCounts {
    pub joins: usize,
    pub leaves: usize,
    pub transfers: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrganizationResult {
    pub organization: String,
    pub success: bool,
    pub scraped: ScrapedCounts,
    pub saved: SavedCounts,
    pub movements: MovementCounts,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(rename = "durationMs")]
    pub duration_ms: u64,
}

impl OrganizationResult {
    fn new(organization: &str) -> Self {
        Self {
            organization: organization.to_string(),
            success: false,
            scraped: ScrapedCounts::default(),
            saved: SavedCounts::default(),
            movements: MovementCounts::default(),
            error: None,
            duration_ms: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    #[serde(rename = "startedAt")]
    pub started_at: DateTime<Utc>,
    #[serde(rename = "finishedAt")]
    pub finished_at: DateTime<Utc>,
    pub headcounts: Vec<HeadcountComparison>,
    #[serde(rename = "headcountSummary")]
    pub headcount_summary: HeadcountSummary,
    /// Organizations skipped because their headcount did not change
    pub skipped: Vec<String>,
    pub results: Vec<OrganizationResult>,
    #[serde(rename = "successCount")]
    pub success_count: usize,
    #[serde(rename = "failureCount")]
    pub failure_count: usize,
    pub movements: MovementCounts,
    #[serde(rename = "durationMs")]
    pub duration_ms: u64,
}

/// Per-run knobs set by the caller.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Crawl every organization without probing first
    pub skip_probe: bool,
    pub max_pages: Option<u32>,
    /// Restrict the run to these organizations (configuration order otherwise)
    pub only: Option<Vec<String>>,
}

pub struct BatchRunner<F: SessionFactory, S: RosterStore + ?Sized> {
    config: Config,
    factory: F,
    store: Arc<S>,
    crawler: DirectoryCrawler,
    probe: HeadcountProbe,
}

impl<F: SessionFactory, S: RosterStore + ?Sized> BatchRunner<F, S> {
    /// Fails when the configuration does not pass its pre-flight check.
    pub fn new(config: Config, factory: F, store: Arc<S>) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            crawler: DirectoryCrawler::new(config.pacing.clone()),
            probe: HeadcountProbe::new(config.pacing.clone()),
            config,
            factory,
            store,
        })
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    fn organizations(&self, options: &RunOptions) -> Vec<String> {
        match options.only {
            Some(ref only) => only
                .iter()
                .map(|o| o.trim().to_string())
                .filter(|o| !o.is_empty())
                .collect(),
            None => self.config.organizations(),
        }
    }

    /// Probe one organization. Failures yield a comparison marked changed.
    pub async fn probe_organization(&self, organization: &str) -> HeadcountComparison {
        let key = normalize_organization_name(organization);

        let probed = match self.factory.open_session().await {
            Ok(session) => self
                .probe
                .probe_headcount(session, organization)
                .await
                .map_err(|e| e.to_string()),
            Err(e) => Err(format!("could not open session: {}", e)),
        };

        let comparison = match probed {
            Ok(count) => compare_headcount(self.store.as_ref(), &key, count)
                .await
                .map(|mut c| {
                    c.organization = organization.to_string();
                    c
                })
                .unwrap_or_else(|e| HeadcountComparison::probe_failed(organization, e.to_string())),
            Err(message) => HeadcountComparison::probe_failed(organization, message),
        };

        if comparison.probe_error.is_some() {
            warn!(organization = %organization, "{}", comparison.describe());
        } else {
            info!(organization = %organization, "{}", comparison.describe());
        }
        comparison
    }

    /// Probe phase over `organizations`, paced by the probe gap.
    pub async fn probe_all(&self, organizations: &[String]) -> Vec<HeadcountComparison> {
        let mut comparisons = Vec::with_capacity(organizations.len());
        for (i, organization) in organizations.iter().enumerate() {
            if i > 0 {
                tokio::time::sleep(self.config.pacing.probe_gap()).await;
            }
            comparisons.push(self.probe_organization(organization).await);
        }
        comparisons
    }

    /// Crawl, normalize, classify and persist one organization.
    pub async fn process_organization(&self, organization: &str, max_pages: Option<u32>) -> OrganizationResult {
        let started = Instant::now();
        let mut result = OrganizationResult::new(organization);

        match self.crawl_and_persist(organization, max_pages, &mut result).await {
            Ok(()) => result.success = true,
            Err(e) => {
                warn!(organization = %organization, error = %e, "Organization failed");
                result.error = Some(e.to_string());
            }
        }

        result.duration_ms = started.elapsed().as_millis() as u64;
        info!(
            organization = %organization,
            success = result.success,
            valid = result.scraped.valid,
            joins = result.movements.joins,
            leaves = result.movements.leaves,
            transfers = result.movements.transfers,
            elapsed = %format_elapsed(result.duration_ms),
            "Organization processed"
        );
        result
    }

    async fn crawl_and_persist(
        &self,
        organization: &str,
        max_pages: Option<u32>,
        result: &mut OrganizationResult,
    ) -> Result<(), BatchError> {
        let session = self.factory.open_session().await?;
        let report = |p: CrawlProgress| {
            info!(
                organization = %organization,
                page = p.page,
                total_pages = p.total_pages,
                records = p.records_so_far,
                "Page parsed"
            );
        };
        let crawl = self
            .crawler
            .crawl_organization(session, organization, Some(&report), max_pages)
            .await?;
        if !crawl.complete {
            warn!(
                organization = %organization,
                read = crawl.records.len(),
                listed = ?crawl.result_count,
                "Partial crawl: people on unread pages will be recorded as leavers"
            );
        }
        let listed = crawl.listed();
        let raw = crawl.records;
        result.scraped.total = raw.len();

        let records = self.screen(organization, raw, &mut result.scraped);

        let key = normalize_organization_name(organization);
        let detected_at = Utc::now();
        let classification = MovementClassifier::new(self.store.as_ref())
            .classify(&key, &records, detected_at)
            .await?;

        let (persons, entries): (Vec<_>, Vec<_>) = records
            .iter()
            .map(|r| {
                let (person, mut entry) = to_canonical(r, detected_at);
                // roster rows are keyed by the organization searched for
                entry.organization = key.clone();
                (person, entry)
            })
            .unzip();

        result.saved.persons = self.store.upsert_persons(&persons).await?;
        result.saved.roster_entries = self.store.insert_roster_entries(&entries).await?;
        self.store.insert_movements(&classification.movements).await?;

        let retired: Vec<_> = classification
            .roster_entry_ids_to_deactivate
            .iter()
            .chain(&classification.superseded_entry_ids)
            .copied()
            .collect();
        let closed = self.store.deactivate_roster_entries(&retired, detected_at).await?;
        debug!(organization = %organization, closed, "Closed previous roster entries");

        // baseline for the next probe, which counts every listed row
        self.store.record_listed_count(&key, listed).await?;

        result.movements = MovementCounts {
            joins: classification.join_count,
            leaves: classification.leave_count,
            transfers: classification.transfer_count,
        };
        Ok(())
    }

    /// Validation, de-duplication and the off-target filter.
    fn screen(&self, organization: &str, raw: Vec<RawRecord>, counts: &mut ScrapedCounts) -> Vec<RawRecord> {
        let partition = partition_valid(raw);
        counts.invalid = partition.invalid.len();
        if !partition.invalid.is_empty() {
            warn!(organization = %organization, invalid = partition.invalid.len(), "Invalid records dropped");
            for bad in &partition.invalid {
                debug!(external_id = %bad.record.external_id, error = %bad.error, "Invalid record");
            }
        }

        let (unique, duplicates) = dedupe_by_external_id(partition.valid);
        counts.duplicates = duplicates;

        let records: Vec<RawRecord> = if self.config.strict_organization_match {
            let (on_target, off_target): (Vec<_>, Vec<_>) =
                unique.into_iter().partition(|r| matches_organization(r, organization));
            counts.off_target = off_target.len();
            if !off_target.is_empty() {
                debug!(organization = %organization, off_target = off_target.len(), "Rows from other organizations dropped");
            }
            on_target
        } else {
            unique
        };

        counts.valid = records.len();
        records
    }

    /// Full batch: probe phase, then crawl phase over changed organizations.
    pub async fn run(&self, options: &RunOptions) -> RunSummary {
        let started_at = Utc::now();
        let started = Instant::now();
        let organizations = self.organizations(options);
        info!(organizations = organizations.len(), skip_probe = options.skip_probe, "Batch starting");

        let headcounts = if options.skip_probe {
            Vec::new()
        } else {
            self.probe_all(&organizations).await
        };

        let (to_crawl, skipped): (Vec<String>, Vec<String>) = if options.skip_probe {
            (organizations, Vec::new())
        } else {
            organizations
                .into_iter()
                .zip(&headcounts)
                .fold((Vec::new(), Vec::new()), |(mut crawl, mut skip), (org, c)| {
                    if c.changed {
                        crawl.push(org);
                    } else {
                        skip.push(org);
                    }
                    (crawl, skip)
                })
        };
        if !skipped.is_empty() {
            info!(skipped = skipped.len(), "Unchanged organizations skipped");
        }

        let mut results = Vec::with_capacity(to_crawl.len());
        for (i, organization) in to_crawl.iter().enumerate() {
            if i > 0 {
                tokio::time::sleep(self.config.pacing.organization_delay()).await;
            }
            results.push(self.process_organization(organization, options.max_pages).await);
        }

        let summary = summarize(started_at, started, headcounts, skipped, results);
        info!(
            success = summary.success_count,
            failed = summary.failure_count,
            joins = summary.movements.joins,
            leaves = summary.movements.leaves,
            transfers = summary.movements.transfers,
            elapsed = %format_elapsed(summary.duration_ms),
            "Batch finished"
        );
        summary
    }
}

fn summarize(
    started_at: DateTime<Utc>,
    started: Instant,
    headcounts: Vec<HeadcountComparison>,
    skipped: Vec<String>,
    results: Vec<OrganizationResult>,
) -> RunSummary {
    let success_count = results.iter().filter(|r| r.success).count();
    let movements = results.iter().fold(MovementCounts::default(), |acc, r| MovementCounts {
        joins: acc.joins + r.movements.joins,
        leaves: acc.leaves + r.movements.leaves,
        transfers: acc.transfers + r.movements.transfers,
    });

    RunSummary {
        started_at,
        finished_at: Utc::now(),
        headcount_summary: HeadcountSummary::from_comparisons(&headcounts),
        headcounts,
        skipped,
        failure_count: results.len() - success_count,
        success_count,
        results,
        movements,
        duration_ms: started.elapsed().as_millis() as u64,
    }
}
