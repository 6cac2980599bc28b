use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::json;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, ResponseTemplate};

use crate::integration::common::{
    TEST_SITE, TestApp, cards_page, setup_test_app, setup_test_app_no_auth,
};

/// Page 1 lists `count` products, page 2 is an empty result page.
async fn mount_two_pages(app: &TestApp, count: usize) {
    Mock::given(method("GET"))
        .and(path("/search"))
        .and(query_param("page", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_string(cards_page(0)))
        .with_priority(1)
        .mount(&app.server)
        .await;
    Mock::given(method("GET"))
        .and(path("/search"))
        .respond_with(ResponseTemplate::new(200).set_body_string(cards_page(count)))
        .mount(&app.server)
        .await;
}

async fn submit(app: &TestApp, max_pages: u32) -> String {
    let (status, json) = app
        .post_json(
            "/v1/jobs",
            json!({ "site": TEST_SITE, "search_term": "tv", "max_pages": max_pages, "delay": 0 }),
        )
        .await;
    assert_eq!(status, StatusCode::ACCEPTED, "{json}");
    json["job_id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn health_is_public() {
    let app = setup_test_app().await;

    let (status, json) = app
        .send(Request::get("/health").body(Body::empty()).unwrap())
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "healthy");
    assert_eq!(json["jobs"], 0);
}

#[tokio::test]
async fn unauthenticated_request_returns_401() {
    let app = setup_test_app().await;

    let (status, json) = app
        .send(Request::get("/v1/jobs").body(Body::empty()).unwrap())
        .await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json["error"], "unauthorized");
}

#[tokio::test]
async fn wrong_api_key_returns_401() {
    let app = setup_test_app().await;

    let (status, _) = app
        .send(
            Request::get("/v1/jobs")
                .header("authorization", "Bearer wrong-key")
                .body(Body::empty())
                .unwrap(),
        )
        .await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn no_api_key_configured_leaves_routes_open() {
    let app = setup_test_app_no_auth().await;

    let (status, json) = app
        .send(Request::get("/v1/jobs").body(Body::empty()).unwrap())
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["total"], 0);
}

#[tokio::test]
async fn create_job_rejects_invalid_requests() {
    let app = setup_test_app().await;

    let cases = [
        json!({ "site": "aliexpress", "search_term": "tv" }),
        json!({ "site": TEST_SITE, "search_term": "   " }),
        json!({ "site": TEST_SITE, "search_term": "tv", "max_pages": 0 }),
        json!({ "site": TEST_SITE, "search_term": "tv", "max_pages": 101 }),
        json!({ "site": TEST_SITE, "search_term": "tv", "delay": -1.0 }),
    ];
    for body in cases {
        let (status, json) = app.post_json("/v1/jobs", body.clone()).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");
        assert_eq!(json["error"], "validation_error", "{body}");
    }

    assert_eq!(app.runner.list().len(), 0);
}

#[tokio::test]
async fn unknown_job_returns_404() {
    let app = setup_test_app().await;
    let id = uuid::Uuid::new_v4();

    for uri in [
        format!("/v1/jobs/{id}"),
        format!("/v1/jobs/{id}/items"),
        format!("/v1/jobs/{id}/debug"),
        format!("/v1/jobs/{id}/html/1"),
    ] {
        let (status, json) = app.get(&uri).await;
        assert_eq!(status, StatusCode::NOT_FOUND, "{uri}");
        assert_eq!(json["error"], "not_found");
    }

    let (status, _) = app.delete(&format!("/v1/jobs/{id}")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn crawl_runs_to_completion() {
    let app = setup_test_app().await;
    mount_two_pages(&app, 3).await;

    let id = submit(&app, 5).await;
    app.runner.wait_idle().await;

    let (status, job) = app.get(&format!("/v1/jobs/{id}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(job["status"], "completed");
    assert_eq!(job["total_items"], 3);
    assert!(job["progress"].as_str().unwrap().contains("3 items"));
    assert!(job["completed_at"].is_string());

    let (status, items) = app.get(&format!("/v1/jobs/{id}/items")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(items["total"], 3);
    let first = &items["items"][0];
    assert_eq!(first["name"], "Smart TV 1");
    assert_eq!(first["raw_price"], "R$ 1.199,90");
    assert_eq!(first["normalized_price"], 1199.9);
    assert_eq!(first["site"], "Mock Shop");
    assert_eq!(first["page"], 1);
    assert_eq!(
        first["link"].as_str().unwrap(),
        format!("{}/p/1", app.server.uri())
    );

    let (status, debug) = app.get(&format!("/v1/jobs/{id}/debug")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(debug["stats"]["requests"], 2);
    assert_eq!(debug["stats"]["pages_fetched"], 2);
    assert_eq!(debug["stats"]["primary_selector_hits"], 0);
    assert_eq!(debug["max_pages"], 5);
    assert_eq!(debug["proxies"]["total"], 0);
}

#[tokio::test]
async fn first_and_empty_pages_are_served_as_html() {
    let app = setup_test_app().await;
    mount_two_pages(&app, 2).await;

    let id = submit(&app, 5).await;
    app.runner.wait_idle().await;

    let (_, debug) = app.get(&format!("/v1/jobs/{id}/debug")).await;
    assert_eq!(debug["saved_pages"], json!([1, 2]));

    let (status, body, content_type) = app.get_text(&format!("/v1/jobs/{id}/html/1")).await;
    assert_eq!(status, StatusCode::OK);
    assert!(content_type.starts_with("text/html"));
    assert_eq!(body, cards_page(2));

    let (status, body, _) = app.get_text(&format!("/v1/jobs/{id}/html/2")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, cards_page(0));

    let (status, json) = app.get(&format!("/v1/jobs/{id}/html/3")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["error"], "not_found");
}

#[tokio::test]
async fn false_positive_block_still_collects_items() {
    let app = setup_test_app().await;
    let page = cards_page(3).replace("</body>", "<footer>protected by reCAPTCHA</footer></body>");
    Mock::given(method("GET"))
        .and(path("/search"))
        .respond_with(ResponseTemplate::new(200).set_body_string(page))
        .mount(&app.server)
        .await;

    let id = submit(&app, 1).await;
    app.runner.wait_idle().await;

    let (_, job) = app.get(&format!("/v1/jobs/{id}")).await;
    assert_eq!(job["status"], "completed");
    assert_eq!(job["total_items"], 3);

    let (_, debug) = app.get(&format!("/v1/jobs/{id}/debug")).await;
    assert_eq!(debug["stats"]["possible_captcha"], true);
    assert_eq!(debug["stats"]["blocked_responses"], 1);
}

#[tokio::test]
async fn list_and_metrics_reflect_finished_jobs() {
    let app = setup_test_app().await;
    mount_two_pages(&app, 4).await;

    submit(&app, 3).await;
    submit(&app, 3).await;
    app.runner.wait_idle().await;

    let (status, list) = app.get("/v1/jobs").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list["total"], 2);
    assert_eq!(list["jobs"][0]["site"], TEST_SITE);
    assert_eq!(list["jobs"][0]["total_items"], 4);

    let (status, metrics) = app.get("/v1/metrics").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(metrics["total_jobs"], 2);
    assert_eq!(metrics["completed"], 2);
    assert_eq!(metrics["avg_items_per_job"], 4.0);
    assert_eq!(metrics["in_flight"], 0);
}

#[tokio::test]
async fn items_conflict_until_completed_and_delete_removes_job() {
    let app = setup_test_app().await;
    Mock::given(method("GET"))
        .and(path("/search"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(cards_page(2))
                .set_delay(Duration::from_secs(5)),
        )
        .mount(&app.server)
        .await;

    let id = submit(&app, 1).await;

    let (status, json) = app.get(&format!("/v1/jobs/{id}/items")).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["error"], "conflict");

    let (status, json) = app.delete(&format!("/v1/jobs/{id}")).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert!(json.is_null());

    let (status, _) = app.get(&format!("/v1/jobs/{id}")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn finished_jobs_are_persisted() {
    let app = setup_test_app().await;
    mount_two_pages(&app, 1).await;

    let id = submit(&app, 2).await;
    app.runner.wait_idle().await;

    let raw = std::fs::read_to_string(&app.jobs_file).unwrap();
    let snapshot: serde_json::Value = serde_json::from_str(&raw).unwrap();
    let job = &snapshot["jobs"][0];
    assert_eq!(job["id"], id.as_str());
    assert_eq!(job["status"], "completed");
}

#[tokio::test]
async fn sites_lists_builtin_and_custom_profiles() {
    let app = setup_test_app().await;

    let (status, json) = app.get("/v1/sites").await;
    assert_eq!(status, StatusCode::OK);

    let keys: Vec<&str> = json["sites"]
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["key"].as_str().unwrap())
        .collect();
    assert_eq!(keys, vec!["mercado_livre", "amazon", "ebay", TEST_SITE]);
    assert_eq!(json["sites"][3]["pagination"], "query_param");
}
