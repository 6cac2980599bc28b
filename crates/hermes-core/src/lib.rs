pub mod classifier;
pub mod config;
pub mod crawler;
pub mod error;
pub mod fetcher;
pub mod job;
pub mod job_store;
pub mod models;
pub mod proxy;
pub mod retry;
pub mod runner;
pub mod site;
pub mod traits;
pub mod util;

#[cfg(test)]
pub mod testutil;

pub use classifier::{Classification, FetchOutcome, ResponseClassifier, TransportErrorKind};
pub use config::EngineConfig;
pub use crawler::{Crawler, PacingConfig, StopReason};
pub use error::AppError;
pub use fetcher::{FetcherConfig, PageFetcher, PageResult, TerminalFailure};
pub use job::{CreateJobRequest, JobConfig, JobRecord, JobStatus, JobSummary};
pub use job_store::{JobMetrics, JobSnapshot, JobStore};
pub use models::{ExtractedItem, RawRecord, compute_hash, normalize_price};
pub use proxy::{ProxyEndpoint, ProxyPool};
pub use retry::{RetryAction, RetryPolicy};
pub use runner::{JobEvent, JobReporter, JobRunner, TracingJobReporter};
pub use site::{SiteProfile, SiteRegistry};
pub use traits::{ExtractionAdapter, Sleeper, SnapshotStore, TokioSleeper, Transport};
