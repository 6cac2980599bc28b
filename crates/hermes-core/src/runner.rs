use std::sync::Arc;

use tokio::sync::{Mutex, watch};
use tokio_util::task::TaskTracker;
use uuid::Uuid;

use crate::crawler::{Crawler, StopReason};
use crate::error::AppError;
use crate::job::{CreateJobRequest, JobRecord, JobSummary};
use crate::job_store::{JobMetrics, JobStore};
use crate::proxy::ProxyPoolStats;
use crate::site::{SiteProfile, SiteRegistry};
use crate::traits::{ExtractionAdapter, Sleeper, SnapshotStore, Transport};

/// Events emitted while jobs move through their lifecycle.
#[derive(Debug, Clone)]
pub enum JobEvent<'a> {
    Submitted {
        job_id: Uuid,
        site: &'a str,
        search_term: &'a str,
    },
    Started {
        job_id: Uuid,
        site: &'a str,
    },
    PageDone {
        job_id: Uuid,
        page: u32,
        new_items: usize,
        total_items: usize,
        proxy: Option<&'a str>,
    },
    Completed {
        job_id: Uuid,
        total_items: usize,
        reason: &'a StopReason,
    },
    Failed {
        job_id: Uuid,
        error: &'a str,
    },
    Deleted {
        job_id: Uuid,
    },
    Restored {
        total: usize,
        interrupted: usize,
    },
    ShuttingDown {
        in_flight: usize,
    },
    Stopped,
}

/// Trait for receiving job events (decoupled logging).
pub trait JobReporter: Send + Sync {
    fn report(&self, event: JobEvent<'_>) {
        let _ = event;
    }
}

/// Reporter that uses the `tracing` crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingJobReporter;

impl JobReporter for TracingJobReporter {
    fn report(&self, event: JobEvent<'_>) {
        match event {
            JobEvent::Submitted {
                job_id,
                site,
                search_term,
            } => {
                tracing::info!(%job_id, %site, %search_term, "Job submitted");
            }
            JobEvent::Started { job_id, site } => {
                tracing::info!(%job_id, %site, "Crawl started");
            }
            JobEvent::PageDone {
                job_id,
                page,
                new_items,
                total_items,
                proxy,
            } => {
                tracing::debug!(
                    %job_id,
                    page,
                    new_items,
                    total_items,
                    proxy = proxy.unwrap_or("direct"),
                    "Page processed"
                );
            }
            JobEvent::Completed {
                job_id,
                total_items,
                reason,
            } => {
                tracing::info!(%job_id, total_items, blocked = reason.is_blocked(), %reason, "Job completed");
            }
            JobEvent::Failed { job_id, error } => {
                tracing::warn!(%job_id, %error, "Job failed");
            }
            JobEvent::Deleted { job_id } => {
                tracing::info!(%job_id, "Job deleted");
            }
            JobEvent::Restored { total, interrupted } => {
                tracing::info!(total, interrupted, "Jobs restored from snapshot");
            }
            JobEvent::ShuttingDown { in_flight } => {
                tracing::info!(in_flight, "Runner shutting down, waiting for jobs");
            }
            JobEvent::Stopped => {
                tracing::info!("Runner stopped");
            }
        }
    }
}

/// Accepts job requests and runs each one as its own task.
///
/// Clones share the job table, the proxy pool, the task tracker and the
/// snapshot lock.
#[derive(Clone)]
pub struct JobRunner<T, X, S, P>
where
    T: Transport,
    X: ExtractionAdapter,
    S: Sleeper,
    P: SnapshotStore,
{
    crawler: Crawler<T, X, S>,
    sites: Arc<SiteRegistry>,
    snapshots: P,
    tracker: TaskTracker,
    /// Jobs spawned and not yet finished, including their final persist.
    running: Arc<watch::Sender<usize>>,
    /// Held from taking a snapshot until it is saved, so saves land in order.
    persist_lock: Arc<Mutex<()>>,
    reporter: Arc<dyn JobReporter>,
}

impl<T, X, S, P> JobRunner<T, X, S, P>
where
    T: Transport + 'static,
    X: ExtractionAdapter + 'static,
    S: Sleeper + 'static,
    P: SnapshotStore + 'static,
{
    pub fn new(crawler: Crawler<T, X, S>, sites: SiteRegistry, snapshots: P) -> Self {
        Self {
            crawler,
            sites: Arc::new(sites),
            snapshots,
            tracker: TaskTracker::new(),
            running: Arc::new(watch::Sender::new(0)),
            persist_lock: Arc::new(Mutex::new(())),
            reporter: Arc::new(TracingJobReporter),
        }
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn JobReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn store(&self) -> &JobStore {
        self.crawler.store()
    }

    pub fn sites(&self) -> &SiteRegistry {
        &self.sites
    }

    /// Validate, record and start a job. Returns the record as created (pending).
    pub async fn submit(&self, request: CreateJobRequest) -> Result<JobRecord, AppError> {
        if self.tracker.is_closed() {
            return Err(AppError::InvalidRequest(
                "Runner is shutting down and accepts no new jobs".to_string(),
            ));
        }
        let config = request.validate(&self.sites)?;
        let profile = self.sites.get(&config.site)?.clone();

        let record = self.store().create(config);
        self.reporter.report(JobEvent::Submitted {
            job_id: record.id,
            site: &record.config.site,
            search_term: &record.config.search_term,
        });
        self.persist().await;
        self.spawn(record.id, profile);
        Ok(record)
    }

    fn spawn(&self, job_id: Uuid, profile: SiteProfile) {
        let runner = self.clone();
        self.running.send_modify(|n| *n += 1);
        self.tracker.spawn(async move {
            // Run the crawl in an inner task so a panic surfaces as a JoinError.
            let crawl = {
                let runner = runner.clone();
                tokio::spawn(async move {
                    runner
                        .crawler
                        .run(job_id, &profile, runner.reporter.as_ref())
                        .await
                })
            };

            match crawl.await {
                Ok(Ok(_status)) => {}
                Ok(Err(AppError::NotFound(_))) => {}
                Ok(Err(e)) => {
                    tracing::error!(%job_id, error = %e, "Failed to record job outcome");
                }
                Err(join_error) => {
                    let error = if join_error.is_panic() {
                        "Crawl task panicked".to_string()
                    } else {
                        format!("Crawl task aborted: {join_error}")
                    };
                    if runner.store().fail(job_id, &error).is_ok() {
                        runner.reporter.report(JobEvent::Failed {
                            job_id,
                            error: &error,
                        });
                    }
                }
            }
            runner.persist().await;
            runner.running.send_modify(|n| *n = n.saturating_sub(1));
        });
    }

    pub fn get(&self, id: Uuid) -> Option<JobRecord> {
        self.store().get(id)
    }

    pub fn list(&self) -> Vec<JobSummary> {
        self.store().list()
    }

    /// Remove a job. A running crawl notices on its next write and stops.
    pub async fn delete(&self, id: Uuid) -> bool {
        let removed = self.store().delete(id);
        if removed {
            self.reporter.report(JobEvent::Deleted { job_id: id });
            self.persist().await;
        }
        removed
    }

    pub fn metrics(&self) -> JobMetrics {
        self.store().metrics()
    }

    pub fn proxy_stats(&self) -> ProxyPoolStats {
        self.crawler.fetcher().pool().stats()
    }

    /// Jobs currently being crawled.
    pub fn in_flight(&self) -> usize {
        *self.running.borrow()
    }

    /// Load the persisted job table. Jobs that were mid-crawl are marked failed.
    pub async fn restore(&self) -> Result<usize, AppError> {
        let snapshot = self.snapshots.load().await?;
        let total = snapshot.jobs.len();
        let interrupted = self.store().restore(snapshot);
        self.reporter.report(JobEvent::Restored { total, interrupted });
        if interrupted > 0 {
            self.persist().await;
        }
        Ok(total)
    }

    /// Wait until no job is running. Submissions stay open meanwhile; jobs
    /// submitted before this returns are waited for too.
    pub async fn wait_idle(&self) {
        let mut running = self.running.subscribe();
        // The sender lives in `self`, so the channel cannot close here.
        let _ = running.wait_for(|n| *n == 0).await;
    }

    /// Stop accepting jobs, wait for running ones, and write a final snapshot.
    pub async fn shutdown(&self) {
        self.tracker.close();
        self.reporter.report(JobEvent::ShuttingDown {
            in_flight: self.in_flight(),
        });
        self.tracker.wait().await;
        self.persist().await;
        self.reporter.report(JobEvent::Stopped);
    }

    async fn persist(&self) {
        let _guard = self.persist_lock.lock().await;
        if let Err(e) = self.snapshots.save(&self.store().snapshot()).await {
            tracing::error!(error = %e, "Failed to persist job snapshot");
        }
    }
}
