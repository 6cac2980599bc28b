use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use tempfile::TempDir;
use tower::ServiceExt;
use wiremock::MockServer;

use hermes_core::EngineConfig;
use hermes_core::site::{PaginationRule, Selectors, SiteProfile, SiteRegistry};
use hermes_server::routes;
use hermes_server::state::{AppState, Runner, build_runner};
use hermes_store::FileSnapshotStore;

pub const TEST_API_KEY: &str = "test-secret-key";
pub const TEST_SITE: &str = "mockshop";

pub struct TestApp {
    pub router: Router,
    pub runner: Runner,
    pub server: MockServer,
    pub jobs_file: std::path::PathBuf,
    _dir: TempDir,
}

/// A storefront served by `server`, paginated with `?page=N`.
pub fn mock_profile(server: &MockServer) -> SiteProfile {
    SiteProfile {
        key: TEST_SITE.into(),
        name: "Mock Shop".into(),
        search_url: format!("{}/search?q={{term}}", server.uri()),
        link_base: Some(server.uri()),
        selectors: Selectors {
            item: "div.card".into(),
            fallback_items: Vec::new(),
            name: ".title".into(),
            price: ".price".into(),
            link: "a.product".into(),
        },
        pagination: PaginationRule::QueryParam {
            param: "page".into(),
        },
        warmup_url: None,
    }
}

/// A result page with `count` product cards, padded past the short-body threshold.
pub fn cards_page(count: usize) -> String {
    let cards: String = (1..=count)
        .map(|i| {
            format!(
                r#"<div class="card"><a class="product" href="/p/{i}"><span class="title">Smart TV {i}</span></a><span class="price">R$ {i}.199,90</span></div>"#
            )
        })
        .collect();
    let filler = "<p>Resultados da busca</p>".repeat(40);
    format!("<html><body>{cards}{filler}</body></html>")
}

pub async fn setup_test_app() -> TestApp {
    setup(Some(TEST_API_KEY.to_string())).await
}

pub async fn setup_test_app_no_auth() -> TestApp {
    setup(None).await
}

async fn setup(api_key: Option<String>) -> TestApp {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let jobs_file = dir.path().join("jobs.json");

    let mut sites = SiteRegistry::builtin();
    sites.insert(mock_profile(&server));

    let runner = build_runner(
        &EngineConfig::default(),
        sites,
        FileSnapshotStore::new(jobs_file.clone()),
    );
    let state = Arc::new(AppState {
        runner: runner.clone(),
        api_key,
    });

    TestApp {
        router: routes::router(state),
        runner,
        server,
        jobs_file,
        _dir: dir,
    }
}

impl TestApp {
    /// Send one request with the test bearer token and decode the JSON body (Null when empty).
    pub async fn send(&self, request: Request<Body>) -> (StatusCode, serde_json::Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        let json = if body.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&body).unwrap()
        };
        (status, json)
    }

    pub async fn get(&self, uri: &str) -> (StatusCode, serde_json::Value) {
        self.send(authed(Request::get(uri)).body(Body::empty()).unwrap())
            .await
    }

    /// GET with the test bearer token, returning the raw body and its content type.
    pub async fn get_text(&self, uri: &str) -> (StatusCode, String, String) {
        let request = authed(Request::get(uri)).body(Body::empty()).unwrap();
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let content_type = response
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        (status, String::from_utf8(body.to_vec()).unwrap(), content_type)
    }

    pub async fn post_json(&self, uri: &str, body: serde_json::Value) -> (StatusCode, serde_json::Value) {
        self.send(
            authed(Request::post(uri))
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
    }

    pub async fn delete(&self, uri: &str) -> (StatusCode, serde_json::Value) {
        self.send(authed(Request::delete(uri)).body(Body::empty()).unwrap())
            .await
    }
}

fn authed(builder: axum::http::request::Builder) -> axum::http::request::Builder {
    builder.header("authorization", format!("Bearer {TEST_API_KEY}"))
}
