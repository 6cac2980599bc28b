//! In-memory job table keyed by job id.
//!
//! Each job's crawler is the only writer of its record; API handlers only read.
//! Every mutation happens inside one write-lock critical section, so readers
//! never observe a terminal status without its `completed_at`.

use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;
use crate::job::{CrawlStats, JobConfig, JobRecord, JobStatus, JobSummary};
use crate::models::ExtractedItem;
use crate::util::truncate_on_char_boundary;

/// Bytes of page markup kept per saved page.
pub const PAGE_HTML_LIMIT: usize = 200_000;

/// Error recorded on jobs that were still in flight when the process stopped.
pub const INTERRUPTED_ERROR: &str = "Job interrupted before completion (process restarted)";

/// Everything the persistence gateway needs to save or restore the table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobSnapshot {
    pub jobs: Vec<JobRecord>,
    #[serde(default)]
    pub saved_at: Option<DateTime<Utc>>,
}

/// Job counts by status plus item statistics over finished jobs.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct JobMetrics {
    pub total_jobs: usize,
    pub pending: usize,
    pub running: usize,
    pub completed: usize,
    pub failed: usize,
    pub avg_items_per_job: Option<f64>,
    pub max_items: Option<usize>,
    pub min_items: Option<usize>,
}

#[derive(Clone, Default)]
pub struct JobStore {
    inner: Arc<RwLock<HashMap<Uuid, JobRecord>>>,
}

impl JobStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<Uuid, JobRecord>> {
        self.inner.read().unwrap_or_else(|poisoned| {
            tracing::warn!("Recovered from poisoned job store lock");
            poisoned.into_inner()
        })
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<Uuid, JobRecord>> {
        self.inner.write().unwrap_or_else(|poisoned| {
            tracing::warn!("Recovered from poisoned job store lock");
            poisoned.into_inner()
        })
    }

    /// Insert a fresh pending record for `config`.
    pub fn create(&self, config: JobConfig) -> JobRecord {
        let record = JobRecord::new(config);
        self.write().insert(record.id, record.clone());
        record
    }

    pub fn get(&self, id: Uuid) -> Option<JobRecord> {
        self.read().get(&id).cloned()
    }

    pub fn contains(&self, id: Uuid) -> bool {
        self.read().contains_key(&id)
    }

    /// Summaries, oldest first.
    pub fn list(&self) -> Vec<JobSummary> {
        let mut jobs: Vec<JobSummary> = self.read().values().map(JobRecord::summary).collect();
        jobs.sort_by_key(|j| j.created_at);
        jobs
    }

    pub fn delete(&self, id: Uuid) -> bool {
        self.write().remove(&id).is_some()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn metrics(&self) -> JobMetrics {
        let jobs = self.read();
        let mut metrics = JobMetrics {
            total_jobs: jobs.len(),
            ..Default::default()
        };
        let mut finished_counts = Vec::new();
        for job in jobs.values() {
            match job.status {
                JobStatus::Pending => metrics.pending += 1,
                JobStatus::Running => metrics.running += 1,
                JobStatus::Completed => metrics.completed += 1,
                JobStatus::Failed => metrics.failed += 1,
            }
            if job.status.is_terminal() {
                finished_counts.push(job.items.len());
            }
        }
        if !finished_counts.is_empty() {
            let sum: usize = finished_counts.iter().sum();
            metrics.avg_items_per_job = Some(sum as f64 / finished_counts.len() as f64);
            metrics.max_items = finished_counts.iter().copied().max();
            metrics.min_items = finished_counts.iter().copied().min();
        }
        metrics
    }

    fn update<T>(
        &self,
        id: Uuid,
        f: impl FnOnce(&mut JobRecord) -> Result<T, AppError>,
    ) -> Result<T, AppError> {
        let mut jobs = self.write();
        let record = jobs
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(id.to_string()))?;
        f(record)
    }

    fn transition(record: &mut JobRecord, next: JobStatus) -> Result<(), AppError> {
        if !record.status.can_transition_to(next) {
            return Err(AppError::InvalidTransition(format!(
                "job {} cannot move from {} to {}",
                record.id, record.status, next
            )));
        }
        record.status = next;
        Ok(())
    }

    pub fn mark_running(&self, id: Uuid) -> Result<(), AppError> {
        self.update(id, |record| {
            Self::transition(record, JobStatus::Running)?;
            record.started_at = Some(Utc::now());
            record.progress = "Starting crawl".to_string();
            Ok(())
        })
    }

    /// Overwrite the progress line of a job that has not finished yet.
    pub fn set_progress(&self, id: Uuid, progress: impl Into<String>) -> Result<(), AppError> {
        self.update(id, |record| {
            if record.status.is_terminal() {
                return Err(AppError::InvalidTransition(format!(
                    "job {} is {}; progress is frozen",
                    record.id, record.status
                )));
            }
            record.progress = progress.into();
            Ok(())
        })
    }

    /// Append items to a running job. Returns the new total.
    pub fn append_items(&self, id: Uuid, items: Vec<ExtractedItem>) -> Result<usize, AppError> {
        self.update(id, |record| {
            if record.status != JobStatus::Running {
                return Err(AppError::InvalidTransition(format!(
                    "job {} is {}; items can only be appended while running",
                    record.id, record.status
                )));
            }
            record.items.extend(items);
            Ok(record.items.len())
        })
    }

    pub fn update_stats(&self, id: Uuid, f: impl FnOnce(&mut CrawlStats)) -> Result<(), AppError> {
        self.update(id, |record| {
            f(&mut record.stats);
            Ok(())
        })
    }

    /// Keep the first [`PAGE_HTML_LIMIT`] bytes of a page's markup for later inspection.
    pub fn save_page_html(&self, id: Uuid, page: u32, html: &str) -> Result<(), AppError> {
        let html = truncate_on_char_boundary(html, PAGE_HTML_LIMIT).to_string();
        self.update(id, |record| {
            record.page_html.insert(page, html);
            Ok(())
        })
    }

    /// Terminal success. Sets status, `completed_at` and the final progress together.
    pub fn complete(&self, id: Uuid, progress: impl Into<String>) -> Result<(), AppError> {
        self.update(id, |record| {
            Self::transition(record, JobStatus::Completed)?;
            record.completed_at = Some(Utc::now());
            record.progress = progress.into();
            Ok(())
        })
    }

    /// Terminal failure. Keeps the last progress line and any items already collected.
    pub fn fail(&self, id: Uuid, error: impl Into<String>) -> Result<(), AppError> {
        self.update(id, |record| {
            Self::transition(record, JobStatus::Failed)?;
            record.completed_at = Some(Utc::now());
            record.error = Some(error.into());
            Ok(())
        })
    }

    pub fn snapshot(&self) -> JobSnapshot {
        let mut jobs: Vec<JobRecord> = self.read().values().cloned().collect();
        jobs.sort_by_key(|j| j.created_at);
        JobSnapshot {
            jobs,
            saved_at: Some(Utc::now()),
        }
    }

    /// Load records from a snapshot. Jobs that never reached a terminal state are
    /// marked failed, since nothing is driving them any more. Returns that count.
    pub fn restore(&self, snapshot: JobSnapshot) -> usize {
        let mut interrupted = 0;
        let mut jobs = self.write();
        for mut record in snapshot.jobs {
            if !record.status.is_terminal() {
                record.status = JobStatus::Failed;
                record.error = Some(INTERRUPTED_ERROR.to_string());
                record.completed_at = Some(Utc::now());
                interrupted += 1;
            }
            jobs.insert(record.id, record);
        }
        interrupted
    }
}
