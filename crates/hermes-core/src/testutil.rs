//! Test utilities: mock implementations of the core traits.
//!
//! Handwritten mocks for dependency injection in unit tests.
//! All mocks use `Arc<Mutex<_>>` for interior mutability, allowing
//! test assertions on recorded calls.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::classifier::TransportErrorKind;
use crate::error::AppError;
use crate::job_store::JobSnapshot;
use crate::models::RawRecord;
use crate::runner::{JobEvent, JobReporter};
use crate::site::SiteProfile;
use crate::traits::{
    Extraction, ExtractionAdapter, HttpResponse, PageRequest, Sleeper, SnapshotStore, Transport,
    TransportError,
};

// ---------------------------------------------------------------------------
// Page fixtures
// ---------------------------------------------------------------------------

fn filler() -> String {
    "<p>".to_string() + &"lorem ipsum dolor sit amet ".repeat(30) + "</p>"
}

/// A result page with `count` items named `"{prefix} 1"` .. `"{prefix} {count}"`.
/// Long enough to pass the short-body check.
pub fn listing_page_named(prefix: &str, count: usize) -> String {
    let items: String = (1..=count)
        .map(|i| {
            format!(
                "<li class=\"item\" data-name=\"{prefix} {i}\" data-price=\"R$ {i}9,90\" data-link=\"/p/{i}\"></li>\n"
            )
        })
        .collect();
    format!("<html><head><title>Results</title></head><body><ul>\n{items}</ul>{}</body></html>", filler())
}

pub fn listing_page(count: usize) -> String {
    listing_page_named("Item", count)
}

/// A normal-looking page with no listings.
pub fn empty_page() -> String {
    listing_page(0)
}

/// A 200 response carrying a captcha wall.
pub fn block_page() -> String {
    format!(
        "<html><body><h1>Please solve the CAPTCHA to continue</h1>{}</body></html>",
        filler()
    )
}

// ---------------------------------------------------------------------------
// MockTransport
// ---------------------------------------------------------------------------

/// Mock transport that replays scripted responses in order and records requests.
/// Once the script runs out every request gets an empty 404.
#[derive(Clone, Default)]
pub struct MockTransport {
    responses: Arc<Mutex<VecDeque<Result<HttpResponse, TransportError>>>>,
    requests: Arc<Mutex<Vec<PageRequest>>>,
    sessions: Arc<Mutex<Vec<usize>>>,
    opened: Arc<Mutex<usize>>,
}

/// Numbered in the order sessions were opened, starting at 1.
#[derive(Debug)]
pub struct MockSession(pub usize);

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_status(self, status: u16, body: &str) -> Self {
        self.responses.lock().unwrap().push_back(Ok(HttpResponse {
            status,
            body: body.to_string(),
            elapsed: Duration::from_millis(5),
        }));
        self
    }

    pub fn push_ok(self, body: &str) -> Self {
        self.push_status(200, body)
    }

    pub fn push_transport(self, kind: TransportErrorKind) -> Self {
        self.responses
            .lock()
            .unwrap()
            .push_back(Err(TransportError::new(kind, "scripted failure")));
        self
    }

    pub fn requests(&self) -> Vec<PageRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Session number of every request, in request order.
    pub fn session_ids(&self) -> Vec<usize> {
        self.sessions.lock().unwrap().clone()
    }
}

impl Transport for MockTransport {
    type Session = MockSession;

    fn open_session(&self) -> Result<MockSession, AppError> {
        let mut opened = self.opened.lock().unwrap();
        *opened += 1;
        Ok(MockSession(*opened))
    }

    async fn request(
        &self,
        session: &MockSession,
        request: &PageRequest,
    ) -> Result<HttpResponse, TransportError> {
        self.requests.lock().unwrap().push(request.clone());
        self.sessions.lock().unwrap().push(session.0);
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Ok(HttpResponse {
                status: 404,
                body: String::new(),
                elapsed: Duration::ZERO,
            }))
    }
}

// ---------------------------------------------------------------------------
// MockExtractor
// ---------------------------------------------------------------------------

/// Mock extractor that reads the `data-*` attributes written by [`listing_page`].
#[derive(Clone, Default)]
pub struct MockExtractor {
    failures: Arc<Mutex<VecDeque<AppError>>>,
    panic: bool,
}

impl MockExtractor {
    pub fn markup() -> Self {
        Self::default()
    }

    /// Return `error` from the next call instead of parsing.
    pub fn fail_next(self, error: AppError) -> Self {
        self.failures.lock().unwrap().push_back(error);
        self
    }

    /// Panics on every call.
    pub fn panicking() -> Self {
        Self {
            panic: true,
            ..Self::default()
        }
    }
}

fn attr(fragment: &str, name: &str) -> Option<String> {
    let start = fragment.find(&format!("{name}=\""))? + name.len() + 2;
    let len = fragment[start..].find('"')?;
    Some(fragment[start..start + len].to_string())
}

impl ExtractionAdapter for MockExtractor {
    fn extract(&self, document: &str, _profile: &SiteProfile) -> Result<Extraction, AppError> {
        if self.panic {
            panic!("mock extractor panic");
        }
        if let Some(error) = self.failures.lock().unwrap().pop_front() {
            return Err(error);
        }
        let records = document
            .split("<li class=\"item\"")
            .skip(1)
            .map(|fragment| {
                RawRecord::new(
                    attr(fragment, "data-name"),
                    attr(fragment, "data-price"),
                    attr(fragment, "data-link"),
                )
            })
            .collect();
        Ok(Extraction::primary(records))
    }
}

// ---------------------------------------------------------------------------
// RecordingSleeper
// ---------------------------------------------------------------------------

/// Sleeper that returns immediately and records every requested duration.
#[derive(Clone, Default)]
pub struct RecordingSleeper {
    calls: Arc<Mutex<Vec<Duration>>>,
}

impl RecordingSleeper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<Duration> {
        self.calls.lock().unwrap().clone()
    }
}

impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        self.calls.lock().unwrap().push(duration);
        tokio::task::yield_now().await;
    }
}

// ---------------------------------------------------------------------------
// MockReporter
// ---------------------------------------------------------------------------

/// Reporter that records event names.
#[derive(Default)]
pub struct MockReporter {
    events: Mutex<Vec<String>>,
}

impl MockReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }
}

impl JobReporter for MockReporter {
    fn report(&self, event: JobEvent<'_>) {
        let name = match event {
            JobEvent::Submitted { .. } => "submitted",
            JobEvent::Started { .. } => "started",
            JobEvent::PageDone { .. } => "page_done",
            JobEvent::Completed { .. } => "completed",
            JobEvent::Failed { .. } => "failed",
            JobEvent::Deleted { .. } => "deleted",
            JobEvent::Restored { .. } => "restored",
            JobEvent::ShuttingDown { .. } => "shutting_down",
            JobEvent::Stopped => "stopped",
        };
        self.events.lock().unwrap().push(name.to_string());
    }
}

// ---------------------------------------------------------------------------
// MockSnapshotStore
// ---------------------------------------------------------------------------

/// In-memory snapshot store that counts saves.
#[derive(Clone, Default)]
pub struct MockSnapshotStore {
    snapshot: Arc<Mutex<Option<JobSnapshot>>>,
    saves: Arc<Mutex<usize>>,
    first_save_delay: Arc<Mutex<Option<Duration>>>,
}

impl MockSnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_snapshot(snapshot: JobSnapshot) -> Self {
        Self {
            snapshot: Arc::new(Mutex::new(Some(snapshot))),
            ..Self::default()
        }
    }

    /// The first save sleeps for `delay` before storing its snapshot.
    pub fn with_first_save_delay(self, delay: Duration) -> Self {
        *self.first_save_delay.lock().unwrap() = Some(delay);
        self
    }

    pub fn last(&self) -> Option<JobSnapshot> {
        self.snapshot.lock().unwrap().clone()
    }

    pub fn saves(&self) -> usize {
        *self.saves.lock().unwrap()
    }
}

impl SnapshotStore for MockSnapshotStore {
    async fn save(&self, snapshot: &JobSnapshot) -> Result<(), AppError> {
        let delay = self.first_save_delay.lock().unwrap().take();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        *self.snapshot.lock().unwrap() = Some(snapshot.clone());
        *self.saves.lock().unwrap() += 1;
        Ok(())
    }

    async fn load(&self) -> Result<JobSnapshot, AppError> {
        Ok(self.last().unwrap_or_default())
    }
}
