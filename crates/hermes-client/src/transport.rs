use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use hermes_core::classifier::TransportErrorKind;
use hermes_core::error::AppError;
use hermes_core::proxy::ProxyEndpoint;
use hermes_core::traits::{HttpResponse, PageRequest, Transport, TransportError};
use reqwest::Client;
use reqwest::cookie::Jar;

/// HTTP transport using reqwest.
///
/// Each job gets a [`ReqwestSession`] with its own cookie jar, so cookies a
/// site sets on one page go out with the next and never leak between jobs.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReqwestTransport;

impl ReqwestTransport {
    pub fn new() -> Self {
        Self
    }
}

/// Per-job connection state.
///
/// reqwest binds proxies at client construction, so one client is built per
/// proxy endpoint on first use and cached. All of them share the session's jar.
pub struct ReqwestSession {
    jar: Arc<Jar>,
    direct: Client,
    proxied: Mutex<HashMap<ProxyEndpoint, Client>>,
}

impl ReqwestSession {
    pub fn new() -> Result<Self, AppError> {
        let jar = Arc::new(Jar::default());
        let direct = Client::builder()
            .cookie_provider(jar.clone())
            .build()
            .map_err(|e| AppError::HttpError(e.to_string()))?;
        Ok(Self {
            jar,
            direct,
            proxied: Mutex::new(HashMap::new()),
        })
    }

    fn client_for(&self, proxy: Option<&ProxyEndpoint>) -> Result<Client, TransportError> {
        let Some(endpoint) = proxy else {
            return Ok(self.direct.clone());
        };

        let mut cache = self.proxied.lock().unwrap_or_else(|poisoned| {
            tracing::warn!("Recovered from poisoned proxy client cache");
            poisoned.into_inner()
        });
        if let Some(client) = cache.get(endpoint) {
            return Ok(client.clone());
        }

        let client = reqwest::Proxy::all(endpoint.as_str())
            .and_then(|p| {
                Client::builder()
                    .proxy(p)
                    .cookie_provider(self.jar.clone())
                    .build()
            })
            .map_err(|e| {
                TransportError::new(
                    TransportErrorKind::Connect,
                    format!("invalid proxy {endpoint}: {e}"),
                )
            })?;
        cache.insert(endpoint.clone(), client.clone());
        Ok(client)
    }
}

fn classify_error(e: &reqwest::Error) -> TransportErrorKind {
    if e.is_timeout() {
        TransportErrorKind::Timeout
    } else if e.is_builder() || e.is_decode() || e.is_body() {
        TransportErrorKind::Malformed
    } else {
        // Connection refused, DNS, TLS and proxy handshake failures.
        TransportErrorKind::Connect
    }
}

impl Transport for ReqwestTransport {
    type Session = ReqwestSession;

    fn open_session(&self) -> Result<ReqwestSession, AppError> {
        ReqwestSession::new()
    }

    async fn request(
        &self,
        session: &ReqwestSession,
        request: &PageRequest,
    ) -> Result<HttpResponse, TransportError> {
        let client = session.client_for(request.proxy.as_ref())?;
        let started = Instant::now();

        let mut builder = client.get(&request.url).timeout(request.timeout);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let response = builder.send().await.map_err(|e| {
            TransportError::new(classify_error(&e), e.to_string()).with_elapsed(started.elapsed())
        })?;

        let status = response.status().as_u16();
        let body = response.text().await.map_err(|e| {
            let kind = if e.is_timeout() {
                TransportErrorKind::Timeout
            } else {
                TransportErrorKind::Malformed
            };
            TransportError::new(kind, format!("failed to read response body: {e}"))
                .with_elapsed(started.elapsed())
        })?;

        Ok(HttpResponse {
            status,
            body,
            elapsed: started.elapsed(),
        })
    }
}
