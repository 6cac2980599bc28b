use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::ExtractedItem;
use crate::site::SiteRegistry;

pub const DEFAULT_MAX_PAGES: u32 = 10;
pub const MAX_PAGES_LIMIT: u32 = 100;
pub const DEFAULT_DELAY: Duration = Duration::from_secs(1);
pub const MAX_DELAY: Duration = Duration::from_secs(60);

/// Status of a crawl job. Transitions only move forward:
/// `pending → running → {completed, failed}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    /// Whether moving from `self` to `next` respects the lifecycle order.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (JobStatus::Pending, JobStatus::Running)
                | (JobStatus::Pending, JobStatus::Failed)
                | (JobStatus::Running, JobStatus::Completed)
                | (JobStatus::Running, JobStatus::Failed)
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(JobStatus::Pending),
            "running" => Ok(JobStatus::Running),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            _ => Err(format!("Unknown job status: {}", s)),
        }
    }
}

/// Immutable parameters of a job, fixed at creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobConfig {
    pub site: String,
    pub search_term: String,
    pub max_pages: u32,
    /// Pause between pages, in seconds.
    pub delay_secs: f64,
}

impl JobConfig {
    pub fn delay(&self) -> Duration {
        Duration::try_from_secs_f64(self.delay_secs).unwrap_or(DEFAULT_DELAY)
    }
}

/// Diagnostics accumulated while crawling.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrawlStats {
    pub pages_fetched: u32,
    pub requests: u32,
    pub retries: u32,
    pub rotations: u32,
    pub blocked_responses: u32,
    pub transport_errors: u32,
    /// Item-selector matches on the most recent page.
    pub primary_selector_hits: usize,
    pub fallback_selector: Option<String>,
    pub last_proxy: Option<String>,
    /// Some page classified as blocked; its markup was still extracted.
    #[serde(default)]
    pub possible_captcha: bool,
}

/// A crawl job as seen by API callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    pub id: Uuid,
    pub status: JobStatus,
    pub progress: String,
    pub items: Vec<ExtractedItem>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub config: JobConfig,
    #[serde(default)]
    pub stats: CrawlStats,
    /// Markup of page 1 and of pages that yielded no items, truncated, by page.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub page_html: BTreeMap<u32, String>,
}

impl JobRecord {
    pub fn new(config: JobConfig) -> Self {
        Self {
            id: Uuid::new_v4(),
            status: JobStatus::Pending,
            progress: "Job created, waiting to start".to_string(),
            items: Vec::new(),
            error: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            config,
            stats: CrawlStats::default(),
            page_html: BTreeMap::new(),
        }
    }

    pub fn summary(&self) -> JobSummary {
        JobSummary {
            id: self.id,
            status: self.status,
            site: self.config.site.clone(),
            search_term: self.config.search_term.clone(),
            total_items: self.items.len(),
            created_at: self.created_at,
            completed_at: self.completed_at,
        }
    }
}

/// Lightweight row for job listings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSummary {
    pub id: Uuid,
    pub status: JobStatus,
    pub site: String,
    pub search_term: String,
    pub total_items: usize,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Request to create a new crawl job.
#[derive(Debug, Clone)]
pub struct CreateJobRequest {
    pub site: String,
    pub search_term: String,
    pub max_pages: Option<u32>,
    pub delay: Option<Duration>,
}

impl CreateJobRequest {
    pub fn new(site: impl Into<String>, search_term: impl Into<String>) -> Self {
        Self {
            site: site.into(),
            search_term: search_term.into(),
            max_pages: None,
            delay: None,
        }
    }

    pub fn with_max_pages(mut self, max: u32) -> Self {
        self.max_pages = Some(max);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Check the request against the known sites and limits, producing the job config.
    pub fn validate(&self, sites: &SiteRegistry) -> Result<JobConfig, AppError> {
        sites.get(&self.site)?;

        let search_term = self.search_term.trim();
        if search_term.is_empty() {
            return Err(AppError::InvalidRequest(
                "Search term must not be empty".to_string(),
            ));
        }

        let max_pages = self.max_pages.unwrap_or(DEFAULT_MAX_PAGES);
        if max_pages == 0 || max_pages > MAX_PAGES_LIMIT {
            return Err(AppError::InvalidRequest(format!(
                "max_pages must be between 1 and {MAX_PAGES_LIMIT}, got {max_pages}"
            )));
        }

        let delay = self.delay.unwrap_or(DEFAULT_DELAY);
        if delay > MAX_DELAY {
            return Err(AppError::InvalidRequest(format!(
                "delay must be at most {}s",
                MAX_DELAY.as_secs()
            )));
        }

        Ok(JobConfig {
            site: self.site.clone(),
            search_term: search_term.to_string(),
            max_pages,
            delay_secs: delay.as_secs_f64(),
        })
    }
}
