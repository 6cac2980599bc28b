use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use hermes_core::error::AppError;
use hermes_core::job::{CrawlStats, CreateJobRequest, JobRecord, JobSummary};
use hermes_core::job_store::JobMetrics;
use hermes_core::models::ExtractedItem;
use hermes_core::proxy::ProxyPoolStats;
use hermes_core::site::{PaginationRule, SiteProfile};

// ---------------------------------------------------------------------------
// Jobs
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct CreateJobBody {
    /// Site key, see `GET /v1/sites`
    pub site: String,
    /// Free-text product search
    pub search_term: String,
    /// Pages to crawl, 1 to 100 (default 10)
    pub max_pages: Option<u32>,
    /// Seconds to wait between pages, 0 to 60 (default 1.0)
    pub delay: Option<f64>,
}

impl CreateJobBody {
    pub fn into_request(self) -> Result<CreateJobRequest, AppError> {
        let mut request = CreateJobRequest::new(self.site, self.search_term);
        request.max_pages = self.max_pages;
        if let Some(delay) = self.delay {
            let delay = Duration::try_from_secs_f64(delay).map_err(|_| {
                AppError::InvalidRequest(format!(
                    "delay must be a non-negative number of seconds, got {delay}"
                ))
            })?;
            request = request.with_delay(delay);
        }
        Ok(request)
    }
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct CreateJobResponse {
    pub job_id: Uuid,
    pub status: String,
    pub message: String,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct ItemResponse {
    pub name: String,
    pub raw_price: Option<String>,
    pub normalized_price: Option<f64>,
    pub link: Option<String>,
    pub site: String,
    pub page: u32,
}

impl From<ExtractedItem> for ItemResponse {
    fn from(item: ExtractedItem) -> Self {
        Self {
            name: item.name,
            raw_price: item.raw_price,
            normalized_price: item.normalized_price,
            link: item.link,
            site: item.site,
            page: item.page,
        }
    }
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct JobResponse {
    pub id: Uuid,
    pub status: String,
    pub progress: String,
    pub site: String,
    pub search_term: String,
    pub max_pages: u32,
    pub delay: f64,
    pub total_items: usize,
    pub items: Vec<ItemResponse>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl From<JobRecord> for JobResponse {
    fn from(job: JobRecord) -> Self {
        Self {
            id: job.id,
            status: job.status.to_string(),
            progress: job.progress,
            site: job.config.site,
            search_term: job.config.search_term,
            max_pages: job.config.max_pages,
            delay: job.config.delay_secs,
            total_items: job.items.len(),
            items: job.items.into_iter().map(ItemResponse::from).collect(),
            error: job.error,
            created_at: job.created_at,
            started_at: job.started_at,
            completed_at: job.completed_at,
        }
    }
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct JobSummaryResponse {
    pub id: Uuid,
    pub status: String,
    pub site: String,
    pub search_term: String,
    pub total_items: usize,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl From<JobSummary> for JobSummaryResponse {
    fn from(job: JobSummary) -> Self {
        Self {
            id: job.id,
            status: job.status.to_string(),
            site: job.site,
            search_term: job.search_term,
            total_items: job.total_items,
            created_at: job.created_at,
            completed_at: job.completed_at,
        }
    }
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct JobListResponse {
    pub jobs: Vec<JobSummaryResponse>,
    pub total: usize,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct ItemsResponse {
    pub job_id: Uuid,
    pub total: usize,
    pub items: Vec<ItemResponse>,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct StatsResponse {
    pub pages_fetched: u32,
    pub requests: u32,
    pub retries: u32,
    pub rotations: u32,
    pub blocked_responses: u32,
    pub transport_errors: u32,
    pub primary_selector_hits: usize,
    pub fallback_selector: Option<String>,
    pub last_proxy: Option<String>,
    /// A page looked blocked but was still extracted.
    pub possible_captcha: bool,
}

impl From<CrawlStats> for StatsResponse {
    fn from(s: CrawlStats) -> Self {
        Self {
            pages_fetched: s.pages_fetched,
            requests: s.requests,
            retries: s.retries,
            rotations: s.rotations,
            blocked_responses: s.blocked_responses,
            transport_errors: s.transport_errors,
            primary_selector_hits: s.primary_selector_hits,
            fallback_selector: s.fallback_selector,
            last_proxy: s.last_proxy,
            possible_captcha: s.possible_captcha,
        }
    }
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct ProxyStatsResponse {
    pub total: usize,
    pub eligible: usize,
    pub failed: Vec<String>,
}

impl From<ProxyPoolStats> for ProxyStatsResponse {
    fn from(p: ProxyPoolStats) -> Self {
        Self {
            total: p.total,
            eligible: p.eligible,
            failed: p.failed,
        }
    }
}

/// Diagnostics for a single job.
#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct JobDebugResponse {
    pub job_id: Uuid,
    pub status: String,
    pub progress: String,
    pub error: Option<String>,
    pub site: String,
    pub search_term: String,
    pub max_pages: u32,
    pub total_items: usize,
    /// Pages whose markup can be fetched from `/v1/jobs/{id}/html/{page}`.
    pub saved_pages: Vec<u32>,
    pub stats: StatsResponse,
    pub proxies: ProxyStatsResponse,
}

// ---------------------------------------------------------------------------
// Sites
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct SiteResponse {
    pub key: String,
    pub name: String,
    pub search_url: String,
    /// `path_offset` or `query_param`
    pub pagination: String,
}

impl From<&SiteProfile> for SiteResponse {
    fn from(site: &SiteProfile) -> Self {
        let pagination = match site.pagination {
            PaginationRule::PathOffset { .. } => "path_offset",
            PaginationRule::QueryParam { .. } => "query_param",
        };
        Self {
            key: site.key.clone(),
            name: site.name.clone(),
            search_url: site.search_url.clone(),
            pagination: pagination.to_string(),
        }
    }
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct SiteListResponse {
    pub sites: Vec<SiteResponse>,
}

// ---------------------------------------------------------------------------
// Metrics & health
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct MetricsResponse {
    pub total_jobs: usize,
    pub pending: usize,
    pub running: usize,
    pub completed: usize,
    pub failed: usize,
    /// Averages over finished jobs only
    pub avg_items_per_job: Option<f64>,
    pub max_items: Option<usize>,
    pub min_items: Option<usize>,
    pub in_flight: usize,
    pub proxies: ProxyStatsResponse,
}

impl MetricsResponse {
    pub fn new(jobs: JobMetrics, in_flight: usize, proxies: ProxyPoolStats) -> Self {
        Self {
            total_jobs: jobs.total_jobs,
            pending: jobs.pending,
            running: jobs.running,
            completed: jobs.completed,
            failed: jobs.failed,
            avg_items_per_job: jobs.avg_items_per_job,
            max_items: jobs.max_items,
            min_items: jobs.min_items,
            in_flight,
            proxies: proxies.into(),
        }
    }
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct HealthResponse {
    pub status: &'static str,
    pub jobs: usize,
    pub in_flight: usize,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}
