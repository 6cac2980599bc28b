//! Single-page fetch with classification, backoff and proxy rotation.

use std::time::Duration;

use thiserror::Error;

use crate::classifier::{Classification, FetchOutcome, ResponseClassifier};
use crate::error::AppError;
use crate::proxy::{ProxyEndpoint, ProxyPool};
use crate::retry::{AttemptState, RetryAction, RetryPolicy};
use crate::traits::{PageRequest, Sleeper, Transport};
use crate::util::random_index;

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

pub const DEFAULT_USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/122.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/121.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.3 Safari/605.1.15",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:123.0) Gecko/20100101 Firefox/123.0",
];

const BASE_HEADERS: &[(&str, &str)] = &[
    (
        "Accept",
        "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8",
    ),
    ("Accept-Language", "pt-BR,pt;q=0.9,en-US;q=0.8,en;q=0.7"),
    ("Cache-Control", "no-cache"),
    ("Pragma", "no-cache"),
    ("Referer", "https://www.google.com"),
];

#[derive(Debug, Clone)]
pub struct FetcherConfig {
    pub timeout: Duration,
    /// One is picked at random for every request.
    pub user_agents: Vec<String>,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_REQUEST_TIMEOUT,
            user_agents: DEFAULT_USER_AGENTS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl FetcherConfig {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Browser-like request headers with a randomly chosen user agent.
    pub fn identity_headers(&self) -> Vec<(String, String)> {
        let mut headers: Vec<(String, String)> = BASE_HEADERS
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        if !self.user_agents.is_empty() {
            let ua = &self.user_agents[random_index(self.user_agents.len())];
            headers.push(("User-Agent".to_string(), ua.clone()));
        }
        headers
    }
}

/// Counters for one page fetch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchStats {
    pub requests: u32,
    pub retries: u32,
    pub rotations: u32,
    pub blocked_responses: u32,
    pub transport_errors: u32,
}

#[derive(Debug, Clone)]
pub struct PageResult {
    pub document: String,
    /// The document is the block page that ended the fetch.
    pub blocked: bool,
    /// Endpoint that served the document; `None` for the direct connection.
    pub proxy: Option<ProxyEndpoint>,
    pub stats: FetchStats,
}

/// The fetch produced nothing worth extracting.
#[derive(Debug, Clone, Error)]
#[error("failed to fetch {url}: {reason}")]
pub struct TerminalFailure {
    pub url: String,
    pub reason: String,
    pub stats: FetchStats,
}

/// Fetches one page, retrying and rotating proxies as the policy dictates.
#[derive(Clone)]
pub struct PageFetcher<T, S>
where
    T: Transport,
    S: Sleeper,
{
    transport: T,
    pool: ProxyPool,
    classifier: ResponseClassifier,
    policy: RetryPolicy,
    sleeper: S,
    config: FetcherConfig,
}

impl<T, S> PageFetcher<T, S>
where
    T: Transport,
    S: Sleeper,
{
    pub fn new(
        transport: T,
        pool: ProxyPool,
        classifier: ResponseClassifier,
        policy: RetryPolicy,
        sleeper: S,
        config: FetcherConfig,
    ) -> Self {
        Self {
            transport,
            pool,
            classifier,
            policy,
            sleeper,
            config,
        }
    }

    pub fn pool(&self) -> &ProxyPool {
        &self.pool
    }

    pub fn sleeper(&self) -> &S {
        &self.sleeper
    }

    fn build_request(&self, url: &str, proxy: Option<ProxyEndpoint>) -> PageRequest {
        PageRequest {
            url: url.to_string(),
            headers: self.config.identity_headers(),
            proxy,
            timeout: self.config.timeout,
        }
    }

    pub fn open_session(&self) -> Result<T::Session, AppError> {
        self.transport.open_session()
    }

    /// Single request to seed `session` before the first page. The outcome is
    /// only logged; a failed warm-up never stops the crawl.
    pub async fn warm_up(&self, url: &str, session: &T::Session) {
        let request = self.build_request(url, self.pool.next());
        match self.transport.request(session, &request).await {
            Ok(response) => tracing::debug!(%url, status = response.status, "Session warm-up"),
            Err(e) => tracing::debug!(%url, error = %e, "Session warm-up failed"),
        }
    }

    pub async fn fetch(&self, url: &str, session: &T::Session) -> Result<PageResult, TerminalFailure> {
        let mut stats = FetchStats::default();
        let mut tried: Vec<ProxyEndpoint> = Vec::new();
        let mut proxy = self.pool.next();
        tried.extend(proxy.clone());
        let mut retries = 0;
        // Last HTTP body with its proxy and classification.
        let mut last_document: Option<(String, Option<ProxyEndpoint>, Classification)> = None;
        let mut last_reason = String::from("no response");

        loop {
            let request = self.build_request(url, proxy.clone());
            stats.requests += 1;

            let outcome = match self.transport.request(session, &request).await {
                Ok(response) => FetchOutcome::http(response.status, response.body, response.elapsed),
                Err(e) => {
                    stats.transport_errors += 1;
                    last_reason = e.to_string();
                    FetchOutcome::transport(e.kind, e.elapsed)
                }
            };

            let classification = self.classifier.classify(&outcome);
            if classification == Classification::Blocked {
                stats.blocked_responses += 1;
            }

            tracing::debug!(
                %url,
                proxy = proxy.as_ref().map(|p| p.as_str()).unwrap_or("direct"),
                status = ?outcome.status,
                bytes = outcome.body_len(),
                elapsed_ms = outcome.elapsed.as_millis() as u64,
                %classification,
                "Fetch attempt"
            );

            let transport_failed = outcome.is_transport_error();
            if let Some(code) = outcome.status_code() {
                last_reason = format!("HTTP {code} ({classification})");
                last_document = Some((outcome.body, proxy.clone(), classification));
            }

            let state = AttemptState {
                retries,
                total_attempts: stats.requests,
                can_rotate: self.pool.has_eligible_excluding(&tried),
            };

            match self.policy.next_action(&state, classification) {
                RetryAction::Accept => {
                    let document = last_document.map(|(doc, _, _)| doc).unwrap_or_default();
                    return Ok(PageResult {
                        document,
                        blocked: false,
                        proxy,
                        stats,
                    });
                }
                RetryAction::Wait(delay) => {
                    retries += 1;
                    stats.retries += 1;
                    tracing::debug!(%url, retry = retries, delay_ms = delay.as_millis() as u64, "Backing off");
                    self.sleeper.sleep(delay).await;
                }
                RetryAction::RotateAndRetry => {
                    if transport_failed && let Some(current) = &proxy {
                        self.pool.mark_failed(current);
                    }
                    match self.pool.next_excluding(&tried) {
                        Some(next) => {
                            tracing::info!(%url, proxy = %next, %classification, "Rotating proxy");
                            tried.push(next.clone());
                            proxy = Some(next);
                            retries = 0;
                            stats.rotations += 1;
                        }
                        // Another job may have failed the last candidate meanwhile.
                        None => return Self::stop_page(url, last_document, last_reason, stats),
                    }
                }
                RetryAction::StopPage => {
                    return Self::stop_page(url, last_document, last_reason, stats);
                }
                RetryAction::StopJob => {
                    tracing::warn!(%url, attempts = stats.requests, "Attempt cap reached");
                    return Err(TerminalFailure {
                        url: url.to_string(),
                        reason: format!(
                            "gave up after {} attempts, last: {last_reason}",
                            stats.requests
                        ),
                        stats,
                    });
                }
            }
        }
    }

    fn stop_page(
        url: &str,
        last_document: Option<(String, Option<ProxyEndpoint>, Classification)>,
        last_reason: String,
        stats: FetchStats,
    ) -> Result<PageResult, TerminalFailure> {
        match last_document {
            Some((document, proxy, classification)) => Ok(PageResult {
                document,
                blocked: classification == Classification::Blocked,
                proxy,
                stats,
            }),
            None => Err(TerminalFailure {
                url: url.to_string(),
                reason: last_reason,
                stats,
            }),
        }
    }
}
