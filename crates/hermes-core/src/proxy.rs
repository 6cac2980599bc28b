//! Shared round-robin proxy pool.
//!
//! Endpoints live in a fixed arena; the cursor and the failed set refer to arena
//! indices. `next()` scans forward from the cursor and skips failed entries, so
//! rotation is deterministic for a given call sequence regardless of which job
//! is asking.

use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

/// One outbound network identity, as a proxy URL (`http://host:port`, `socks5://...`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProxyEndpoint(String);

impl ProxyEndpoint {
    /// Accepts `host:port` or a full URL; bare addresses get `http://`.
    pub fn new(raw: &str) -> Self {
        let raw = raw.trim();
        if raw.contains("://") {
            Self(raw.to_string())
        } else {
            Self(format!("http://{raw}"))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProxyEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Default)]
struct PoolInner {
    endpoints: Vec<ProxyEndpoint>,
    failed: HashSet<usize>,
    cursor: usize,
}

impl PoolInner {
    /// First eligible index at or after the cursor that passes `accept`.
    fn scan(&self, accept: impl Fn(&ProxyEndpoint) -> bool) -> Option<usize> {
        let len = self.endpoints.len();
        (0..len)
            .map(|offset| (self.cursor + offset) % len)
            .find(|idx| !self.failed.contains(idx) && accept(&self.endpoints[*idx]))
    }

    fn take(&mut self, idx: usize) -> ProxyEndpoint {
        self.cursor = (idx + 1) % self.endpoints.len();
        self.endpoints[idx].clone()
    }
}

/// Snapshot of pool health for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProxyPoolStats {
    pub total: usize,
    pub eligible: usize,
    pub failed: Vec<String>,
}

/// Thread-safe proxy rotation shared by all jobs. Clones share state.
#[derive(Clone, Default)]
pub struct ProxyPool {
    inner: Arc<Mutex<PoolInner>>,
}

impl fmt::Debug for ProxyPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxyPool")
            .field("stats", &self.stats())
            .finish()
    }
}

impl ProxyPool {
    pub fn new(endpoints: Vec<ProxyEndpoint>) -> Self {
        let mut unique = Vec::with_capacity(endpoints.len());
        for endpoint in endpoints {
            if !unique.contains(&endpoint) {
                unique.push(endpoint);
            }
        }
        Self {
            inner: Arc::new(Mutex::new(PoolInner {
                endpoints: unique,
                ..Default::default()
            })),
        }
    }

    /// An empty pool: every fetch goes out over the direct connection.
    pub fn direct() -> Self {
        Self::default()
    }

    /// Parse a comma-separated list such as `host1:8080,socks5://host2:1080`.
    pub fn from_list(raw: &str) -> Self {
        Self::new(
            raw.split(',')
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(ProxyEndpoint::new)
                .collect(),
        )
    }

    /// Acquires the inner mutex lock, recovering from poison if necessary.
    fn lock_inner(&self) -> std::sync::MutexGuard<'_, PoolInner> {
        self.inner.lock().unwrap_or_else(|poisoned| {
            tracing::warn!("Recovered from poisoned proxy pool mutex");
            poisoned.into_inner()
        })
    }

    /// Next eligible endpoint in round-robin order. `None` means "connect directly".
    pub fn next(&self) -> Option<ProxyEndpoint> {
        let mut inner = self.lock_inner();
        let idx = inner.scan(|_| true)?;
        Some(inner.take(idx))
    }

    /// Like [`next`](Self::next) but never returns one of `exclude`.
    pub fn next_excluding(&self, exclude: &[ProxyEndpoint]) -> Option<ProxyEndpoint> {
        let mut inner = self.lock_inner();
        let idx = inner.scan(|e| !exclude.contains(e))?;
        Some(inner.take(idx))
    }

    pub fn has_eligible_excluding(&self, exclude: &[ProxyEndpoint]) -> bool {
        self.lock_inner().scan(|e| !exclude.contains(e)).is_some()
    }

    /// Remove an endpoint from rotation. Idempotent; unknown endpoints are ignored.
    pub fn mark_failed(&self, endpoint: &ProxyEndpoint) {
        let mut inner = self.lock_inner();
        if let Some(idx) = inner.endpoints.iter().position(|e| e == endpoint)
            && inner.failed.insert(idx)
        {
            tracing::warn!(proxy = %endpoint, "Proxy removed from rotation");
        }
    }

    pub fn len(&self) -> usize {
        self.lock_inner().endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn eligible_count(&self) -> usize {
        let inner = self.lock_inner();
        inner.endpoints.len() - inner.failed.len()
    }

    pub fn stats(&self) -> ProxyPoolStats {
        let inner = self.lock_inner();
        let mut failed: Vec<usize> = inner.failed.iter().copied().collect();
        failed.sort_unstable();
        ProxyPoolStats {
            total: inner.endpoints.len(),
            eligible: inner.endpoints.len() - inner.failed.len(),
            failed: failed
                .into_iter()
                .map(|idx| inner.endpoints[idx].to_string())
                .collect(),
        }
    }
}
