use std::future::Future;
use std::time::Duration;

use thiserror::Error;

use crate::classifier::TransportErrorKind;
use crate::error::AppError;
use crate::job_store::JobSnapshot;
use crate::models::RawRecord;
use crate::proxy::ProxyEndpoint;
use crate::site::SiteProfile;

/// One outbound GET, fully described.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    pub url: String,
    pub headers: Vec<(String, String)>,
    /// `None` means the direct connection.
    pub proxy: Option<ProxyEndpoint>,
    pub timeout: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
    pub elapsed: Duration,
}

/// A request that produced no HTTP response.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind} error: {message}")]
pub struct TransportError {
    pub kind: TransportErrorKind,
    pub message: String,
    pub elapsed: Duration,
}

impl TransportError {
    pub fn new(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            elapsed: Duration::ZERO,
        }
    }

    pub fn with_elapsed(mut self, elapsed: Duration) -> Self {
        self.elapsed = elapsed;
        self
    }
}

/// Issues HTTP requests, optionally through a proxy.
///
/// Requests go through a session opened once per job, so state the site sets
/// on one page (cookies) is sent with the next.
pub trait Transport: Send + Sync + Clone {
    type Session: Send + Sync;

    fn open_session(&self) -> Result<Self::Session, AppError>;

    fn request(
        &self,
        session: &Self::Session,
        request: &PageRequest,
    ) -> impl Future<Output = Result<HttpResponse, TransportError>> + Send;
}

/// Turns a result page into raw records using a site's selectors.
///
/// An empty vector means "nothing matched" (end of results or a layout the
/// selectors no longer fit). `Err` is reserved for documents or profiles the
/// adapter cannot work with at all.
pub trait ExtractionAdapter: Send + Sync + Clone {
    fn extract(&self, document: &str, profile: &SiteProfile) -> Result<Extraction, AppError>;
}

/// Records from one page plus which selector produced them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Extraction {
    pub records: Vec<RawRecord>,
    /// Elements matched by the primary item selector.
    pub primary_hits: usize,
    /// Set when the primary selector missed and a fallback matched.
    pub fallback_selector: Option<String>,
}

impl Extraction {
    pub fn primary(records: Vec<RawRecord>) -> Self {
        Self {
            primary_hits: records.len(),
            records,
            fallback_selector: None,
        }
    }
}

/// Suspends the current task. Injected so retry and pacing logic can be tested
/// without real delays.
pub trait Sleeper: Send + Sync + Clone {
    fn sleep(&self, duration: Duration) -> impl Future<Output = ()> + Send;
}

/// Sleeps on the tokio timer.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        if !duration.is_zero() {
            tokio::time::sleep(duration).await;
        }
    }
}

/// Persistence gateway for the job table, called at lifecycle boundaries only.
pub trait SnapshotStore: Send + Sync + Clone {
    fn save(&self, snapshot: &JobSnapshot) -> impl Future<Output = Result<(), AppError>> + Send;

    /// Load the last saved snapshot; an empty snapshot when nothing was saved yet.
    fn load(&self) -> impl Future<Output = Result<JobSnapshot, AppError>> + Send;
}

/// A no-op SnapshotStore for use when persistence is not needed.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSnapshotStore;

impl SnapshotStore for NullSnapshotStore {
    async fn save(&self, _snapshot: &JobSnapshot) -> Result<(), AppError> {
        Ok(())
    }

    async fn load(&self) -> Result<JobSnapshot, AppError> {
        Ok(JobSnapshot::default())
    }
}
