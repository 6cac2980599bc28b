//! Drives one job through its pages.
//!
//! The crawler owns the job's lifecycle writes: it moves the record to
//! `running`, appends items page by page, and writes exactly one terminal
//! state. Fetch failures, empty pages and blocked pages with nothing to
//! extract end the crawl but still complete the job; only unexpected errors
//! fail it. Every page of a job goes through one transport session.

use std::fmt;
use std::time::Duration;

use uuid::Uuid;

use crate::error::AppError;
use crate::fetcher::{FetchStats, PageFetcher};
use crate::job::{CrawlStats, JobStatus};
use crate::job_store::JobStore;
use crate::models::ExtractedItem;
use crate::runner::{JobEvent, JobReporter};
use crate::site::SiteProfile;
use crate::traits::{ExtractionAdapter, Sleeper, Transport};
use crate::util::jitter;

/// Random pause added on top of each job's inter-page delay.
#[derive(Debug, Clone)]
pub struct PacingConfig {
    pub jitter: Duration,
}

impl PacingConfig {
    pub fn new(jitter: Duration) -> Self {
        Self { jitter }
    }

    pub fn effective_delay(&self, delay: Duration) -> Duration {
        if self.jitter.is_zero() {
            return delay;
        }
        delay + jitter(self.jitter)
    }
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            jitter: Duration::from_millis(500),
        }
    }
}

/// Why the page loop ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    PageLimit { pages: u32 },
    /// Selectors matched nothing: end of results or a changed layout.
    NoItems { page: u32 },
    Blocked { page: u32 },
    FetchFailed { page: u32, reason: String },
}

impl StopReason {
    pub fn is_blocked(&self) -> bool {
        matches!(self, StopReason::Blocked { .. })
    }
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopReason::PageLimit { pages } => write!(f, "reached the limit of {pages} pages"),
            StopReason::NoItems { page } => write!(f, "no items found on page {page}"),
            StopReason::Blocked { page } => {
                write!(f, "stopped at page {page}: blocked by the site")
            }
            StopReason::FetchFailed { page, reason } => {
                write!(f, "stopped at page {page}: {reason}")
            }
        }
    }
}

#[derive(Clone)]
pub struct Crawler<T, X, S>
where
    T: Transport,
    X: ExtractionAdapter,
    S: Sleeper,
{
    fetcher: PageFetcher<T, S>,
    extractor: X,
    store: JobStore,
    pacing: PacingConfig,
}

impl<T, X, S> Crawler<T, X, S>
where
    T: Transport,
    X: ExtractionAdapter,
    S: Sleeper,
{
    pub fn new(fetcher: PageFetcher<T, S>, extractor: X, store: JobStore) -> Self {
        Self {
            fetcher,
            extractor,
            store,
            pacing: PacingConfig::default(),
        }
    }

    pub fn with_pacing(mut self, pacing: PacingConfig) -> Self {
        self.pacing = pacing;
        self
    }

    pub fn store(&self) -> &JobStore {
        &self.store
    }

    pub fn fetcher(&self) -> &PageFetcher<T, S> {
        &self.fetcher
    }

    /// Run job `job_id` to a terminal state and return that state.
    ///
    /// `Err` means no terminal state could be written, normally because the
    /// job was deleted while it ran.
    pub async fn run(
        &self,
        job_id: Uuid,
        profile: &SiteProfile,
        reporter: &dyn JobReporter,
    ) -> Result<JobStatus, AppError> {
        self.store.mark_running(job_id)?;
        reporter.report(JobEvent::Started {
            job_id,
            site: &profile.key,
        });

        match self.crawl(job_id, profile, reporter).await {
            Ok(reason) => {
                let total = self.store.get(job_id).map(|r| r.items.len()).unwrap_or(0);
                self.store
                    .complete(job_id, format!("Completed: {total} items collected ({reason})"))?;
                reporter.report(JobEvent::Completed {
                    job_id,
                    total_items: total,
                    reason: &reason,
                });
                Ok(JobStatus::Completed)
            }
            Err(AppError::NotFound(id)) => {
                tracing::info!(%job_id, "Job removed while crawling, stopping");
                Err(AppError::NotFound(id))
            }
            Err(e) => {
                let error = e.to_string();
                self.store.fail(job_id, &error)?;
                reporter.report(JobEvent::Failed {
                    job_id,
                    error: &error,
                });
                Ok(JobStatus::Failed)
            }
        }
    }

    async fn crawl(
        &self,
        job_id: Uuid,
        profile: &SiteProfile,
        reporter: &dyn JobReporter,
    ) -> Result<StopReason, AppError> {
        let config = self
            .store
            .get(job_id)
            .ok_or_else(|| AppError::NotFound(job_id.to_string()))?
            .config;

        let session = self.fetcher.open_session()?;
        if let Some(warmup) = &profile.warmup_url {
            self.fetcher.warm_up(warmup, &session).await;
        }

        for page in 1..=config.max_pages {
            let url = profile.page_url(&config.search_term, page)?;
            self.store.set_progress(
                job_id,
                format!("Processing page {page} of {}", config.max_pages),
            )?;

            let fetched = match self.fetcher.fetch(&url, &session).await {
                Ok(fetched) => fetched,
                Err(failure) => {
                    self.record_fetch(job_id, &failure.stats, None)?;
                    tracing::warn!(%job_id, page, reason = %failure.reason, "Page fetch gave up");
                    return Ok(StopReason::FetchFailed {
                        page,
                        reason: failure.reason,
                    });
                }
            };
            let proxy = fetched.proxy.as_ref().map(|p| p.to_string());
            self.record_fetch(job_id, &fetched.stats, proxy.clone())?;

            // Block heuristics give false positives, so the markup is still extracted.
            if fetched.blocked {
                tracing::warn!(%job_id, page, %url, "Page looks blocked, extracting anyway");
                self.store.update_stats(job_id, |stats| stats.possible_captcha = true)?;
                self.store
                    .set_progress(job_id, format!("Possible captcha or block on page {page}"))?;
            }

            let extraction = self.extractor.extract(&fetched.document, profile)?;
            let usable = !fetched.blocked || !extraction.records.is_empty();
            let fallback = extraction.fallback_selector.clone();
            self.store.update_stats(job_id, |stats| {
                if usable {
                    stats.pages_fetched += 1;
                }
                stats.primary_selector_hits = extraction.primary_hits;
                if fallback.is_some() {
                    stats.fallback_selector = fallback;
                }
            })?;

            if page == 1 || extraction.records.is_empty() {
                self.store.save_page_html(job_id, page, &fetched.document)?;
            }
            if extraction.records.is_empty() {
                if fetched.blocked {
                    return Ok(StopReason::Blocked { page });
                }
                return Ok(StopReason::NoItems { page });
            }

            let items: Vec<ExtractedItem> = extraction
                .records
                .into_iter()
                .filter_map(|raw| ExtractedItem::from_raw(raw, &profile.name, page))
                .collect();
            let new_items = items.len();
            let total_items = self.store.append_items(job_id, items)?;
            reporter.report(JobEvent::PageDone {
                job_id,
                page,
                new_items,
                total_items,
                proxy: proxy.as_deref(),
            });

            if page < config.max_pages {
                self.fetcher
                    .sleeper()
                    .sleep(self.pacing.effective_delay(config.delay()))
                    .await;
            }
        }

        Ok(StopReason::PageLimit {
            pages: config.max_pages,
        })
    }

    fn record_fetch(
        &self,
        job_id: Uuid,
        fetch: &FetchStats,
        proxy: Option<String>,
    ) -> Result<(), AppError> {
        self.store.update_stats(job_id, |stats: &mut CrawlStats| {
            stats.requests += fetch.requests;
            stats.retries += fetch.retries;
            stats.rotations += fetch.rotations;
            stats.blocked_responses += fetch.blocked_responses;
            stats.transport_errors += fetch.transport_errors;
            if proxy.is_some() {
                stats.last_proxy = proxy;
            }
        })
    }
}
