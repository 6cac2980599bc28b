use std::path::PathBuf;
use std::time::Duration;

use crate::classifier::{DEFAULT_MIN_BODY_LEN, ResponseClassifier};
use crate::error::AppError;
use crate::fetcher::{DEFAULT_REQUEST_TIMEOUT, FetcherConfig, PageFetcher};
use crate::proxy::ProxyPool;
use crate::retry::RetryPolicy;
use crate::site::SiteRegistry;
use crate::traits::{Sleeper, Transport};

/// Crawl engine settings shared by every job.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Raw comma-separated proxy list; empty means direct connections only.
    pub proxies: String,
    pub retry: RetryPolicy,
    pub request_timeout: Duration,
    pub min_body_len: usize,
    /// Extra site profiles merged over the built-in ones.
    pub sites_file: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            proxies: String::new(),
            retry: RetryPolicy::default(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            min_body_len: DEFAULT_MIN_BODY_LEN,
            sites_file: None,
        }
    }
}

impl EngineConfig {
    /// Read configuration from environment variables.
    ///
    /// - `HERMES_PROXIES` (optional, `host:port,socks5://host:port`)
    /// - `HERMES_MAX_RETRIES` (optional, defaults to 3)
    /// - `HERMES_BACKOFF_BASE` (optional, defaults to 1.5)
    /// - `HERMES_REQUEST_TIMEOUT_SECS` (optional, defaults to 15)
    /// - `HERMES_MIN_BODY_BYTES` (optional, defaults to 512)
    /// - `HERMES_SITES_FILE` (optional, JSON array of site profiles)
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, AppError> {
        let defaults = Self::default();

        let max_retries = parse_var(&lookup, "HERMES_MAX_RETRIES", defaults.retry.max_retries)?;

        let backoff_base: f64 =
            parse_var(&lookup, "HERMES_BACKOFF_BASE", defaults.retry.backoff_base)?;
        if !backoff_base.is_finite() || backoff_base < 1.0 {
            return Err(AppError::ConfigError(format!(
                "HERMES_BACKOFF_BASE must be a number >= 1.0, got {backoff_base}"
            )));
        }

        let timeout_secs: u64 = parse_var(
            &lookup,
            "HERMES_REQUEST_TIMEOUT_SECS",
            defaults.request_timeout.as_secs(),
        )?;
        if timeout_secs == 0 {
            return Err(AppError::ConfigError(
                "HERMES_REQUEST_TIMEOUT_SECS must be at least 1".into(),
            ));
        }

        let min_body_len = parse_var(&lookup, "HERMES_MIN_BODY_BYTES", defaults.min_body_len)?;

        Ok(Self {
            proxies: lookup("HERMES_PROXIES").unwrap_or_default(),
            retry: RetryPolicy {
                max_retries,
                backoff_base,
                ..defaults.retry
            },
            request_timeout: Duration::from_secs(timeout_secs),
            min_body_len,
            sites_file: lookup("HERMES_SITES_FILE")
                .filter(|p| !p.trim().is_empty())
                .map(PathBuf::from),
        })
    }

    pub fn proxy_pool(&self) -> ProxyPool {
        ProxyPool::from_list(&self.proxies)
    }

    pub fn classifier(&self) -> ResponseClassifier {
        ResponseClassifier::new(self.min_body_len)
    }

    pub fn fetcher_config(&self) -> FetcherConfig {
        FetcherConfig::default().with_timeout(self.request_timeout)
    }

    /// Built-in site profiles, plus those in `sites_file` when set.
    pub fn site_registry(&self) -> Result<SiteRegistry, AppError> {
        match &self.sites_file {
            Some(path) => SiteRegistry::builtin_with_file(path),
            None => Ok(SiteRegistry::builtin()),
        }
    }

    /// A page fetcher with a fresh proxy pool built from this configuration.
    pub fn page_fetcher<T: Transport, S: Sleeper>(
        &self,
        transport: T,
        sleeper: S,
    ) -> PageFetcher<T, S> {
        PageFetcher::new(
            transport,
            self.proxy_pool(),
            self.classifier(),
            self.retry.clone(),
            sleeper,
            self.fetcher_config(),
        )
    }
}

fn parse_var<V: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: V,
) -> Result<V, AppError> {
    match lookup(key) {
        None => Ok(default),
        Some(raw) if raw.trim().is_empty() => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| AppError::ConfigError(format!("Invalid {key} '{raw}'"))),
    }
}
