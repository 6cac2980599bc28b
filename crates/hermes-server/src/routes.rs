use std::sync::Arc;

use axum::Router;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::middleware;
use axum::response::{Html, IntoResponse};
use axum::routing::get;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;
use uuid::Uuid;

use hermes_core::error::AppError;
use hermes_core::job::{JobRecord, JobStatus};

use crate::auth::require_api_key;
use crate::dto::{
    CreateJobBody, CreateJobResponse, HealthResponse, ItemResponse, ItemsResponse,
    JobDebugResponse, JobListResponse, JobResponse, JobSummaryResponse, MetricsResponse,
    SiteListResponse, SiteResponse,
};
use crate::error::ApiError;
use crate::openapi::ApiDoc;
use crate::state::AppState;

/// Build the full router with all routes and middleware.
pub fn router(state: Arc<AppState>) -> Router {
    let api = Router::new()
        .route("/v1/jobs", get(list_jobs).post(create_job))
        .route("/v1/jobs/{id}", get(get_job).delete(delete_job))
        .route("/v1/jobs/{id}/items", get(get_job_items))
        .route("/v1/jobs/{id}/debug", get(get_job_debug))
        .route("/v1/jobs/{id}/html/{page}", get(get_job_page_html))
        .route("/v1/sites", get(list_sites))
        .route("/v1/metrics", get(metrics))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            require_api_key,
        ));

    let public = Router::new()
        .route("/health", get(health))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()));

    public.merge(api).with_state(state)
}

fn find_job(state: &AppState, id: Uuid) -> Result<JobRecord, ApiError> {
    state
        .runner
        .get(id)
        .ok_or_else(|| AppError::NotFound(id.to_string()).into())
}

// ---------------------------------------------------------------------------
// Jobs
// ---------------------------------------------------------------------------

#[utoipa::path(
    post,
    path = "/v1/jobs",
    request_body = CreateJobBody,
    responses(
        (status = 202, description = "Job accepted", body = CreateJobResponse),
        (status = 400, description = "Unknown site or invalid parameters", body = crate::dto::ErrorResponse),
        (status = 401, description = "Unauthorized"),
    ),
    security(("bearer" = [])),
    tag = "jobs"
)]
pub async fn create_job(
    State(state): State<Arc<AppState>>,
    axum::Json(body): axum::Json<CreateJobBody>,
) -> Result<impl IntoResponse, ApiError> {
    let request = body.into_request()?;
    let job = state.runner.submit(request).await?;

    let response = CreateJobResponse {
        job_id: job.id,
        status: job.status.to_string(),
        message: format!(
            "Crawl of {} for '{}' started",
            job.config.site, job.config.search_term
        ),
    };

    Ok((StatusCode::ACCEPTED, axum::Json(response)))
}

#[utoipa::path(
    get,
    path = "/v1/jobs",
    responses(
        (status = 200, description = "All jobs, oldest first", body = JobListResponse),
        (status = 401, description = "Unauthorized"),
    ),
    security(("bearer" = [])),
    tag = "jobs"
)]
pub async fn list_jobs(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let jobs: Vec<JobSummaryResponse> = state
        .runner
        .list()
        .into_iter()
        .map(JobSummaryResponse::from)
        .collect();
    let total = jobs.len();

    axum::Json(JobListResponse { jobs, total })
}

#[utoipa::path(
    get,
    path = "/v1/jobs/{id}",
    params(
        ("id" = Uuid, Path, description = "Job ID")
    ),
    responses(
        (status = 200, description = "Job details", body = JobResponse),
        (status = 404, description = "Not found", body = crate::dto::ErrorResponse),
        (status = 401, description = "Unauthorized"),
    ),
    security(("bearer" = [])),
    tag = "jobs"
)]
pub async fn get_job(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let job = find_job(&state, id)?;
    Ok(axum::Json(JobResponse::from(job)))
}

#[utoipa::path(
    delete,
    path = "/v1/jobs/{id}",
    params(
        ("id" = Uuid, Path, description = "Job ID")
    ),
    responses(
        (status = 204, description = "Job deleted"),
        (status = 404, description = "Not found", body = crate::dto::ErrorResponse),
        (status = 401, description = "Unauthorized"),
    ),
    security(("bearer" = [])),
    tag = "jobs"
)]
pub async fn delete_job(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    if state.runner.delete(id).await {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::NotFound(id.to_string()).into())
    }
}

#[utoipa::path(
    get,
    path = "/v1/jobs/{id}/items",
    params(
        ("id" = Uuid, Path, description = "Job ID")
    ),
    responses(
        (status = 200, description = "Items collected by a completed job", body = ItemsResponse),
        (status = 404, description = "Not found", body = crate::dto::ErrorResponse),
        (status = 409, description = "Job has not completed", body = crate::dto::ErrorResponse),
        (status = 401, description = "Unauthorized"),
    ),
    security(("bearer" = [])),
    tag = "jobs"
)]
pub async fn get_job_items(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let job = find_job(&state, id)?;
    if job.status != JobStatus::Completed {
        return Err(AppError::InvalidTransition(format!(
            "Job {id} is {}, items are available once it completes",
            job.status
        ))
        .into());
    }

    let items: Vec<ItemResponse> = job.items.into_iter().map(ItemResponse::from).collect();
    Ok(axum::Json(ItemsResponse {
        job_id: id,
        total: items.len(),
        items,
    }))
}

#[utoipa::path(
    get,
    path = "/v1/jobs/{id}/debug",
    params(
        ("id" = Uuid, Path, description = "Job ID")
    ),
    responses(
        (status = 200, description = "Progress, crawl statistics and proxy health", body = JobDebugResponse),
        (status = 404, description = "Not found", body = crate::dto::ErrorResponse),
        (status = 401, description = "Unauthorized"),
    ),
    security(("bearer" = [])),
    tag = "jobs"
)]
pub async fn get_job_debug(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let job = find_job(&state, id)?;

    Ok(axum::Json(JobDebugResponse {
        job_id: job.id,
        status: job.status.to_string(),
        progress: job.progress,
        error: job.error,
        site: job.config.site,
        search_term: job.config.search_term,
        max_pages: job.config.max_pages,
        total_items: job.items.len(),
        saved_pages: job.page_html.keys().copied().collect(),
        stats: job.stats.into(),
        proxies: state.runner.proxy_stats().into(),
    }))
}

#[utoipa::path(
    get,
    path = "/v1/jobs/{id}/html/{page}",
    params(
        ("id" = Uuid, Path, description = "Job ID"),
        ("page" = u32, Path, description = "Result page number")
    ),
    responses(
        (status = 200, description = "Saved markup of the first page or of a page without items", content_type = "text/html", body = String),
        (status = 404, description = "Job not found or page not saved", body = crate::dto::ErrorResponse),
        (status = 401, description = "Unauthorized"),
    ),
    security(("bearer" = [])),
    tag = "jobs"
)]
pub async fn get_job_page_html(
    State(state): State<Arc<AppState>>,
    Path((id, page)): Path<(Uuid, u32)>,
) -> Result<impl IntoResponse, ApiError> {
    let mut job = find_job(&state, id)?;
    job.page_html.remove(&page).map(Html).ok_or_else(|| {
        ApiError::from(AppError::NotFound(format!(
            "no saved markup for page {page} of job {id}"
        )))
    })
}

// ---------------------------------------------------------------------------
// Sites
// ---------------------------------------------------------------------------

#[utoipa::path(
    get,
    path = "/v1/sites",
    responses(
        (status = 200, description = "Configured site profiles", body = SiteListResponse),
        (status = 401, description = "Unauthorized"),
    ),
    security(("bearer" = [])),
    tag = "sites"
)]
pub async fn list_sites(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let sites = state
        .runner
        .sites()
        .list()
        .iter()
        .map(SiteResponse::from)
        .collect();

    axum::Json(SiteListResponse { sites })
}

// ---------------------------------------------------------------------------
// Metrics & health
// ---------------------------------------------------------------------------

#[utoipa::path(
    get,
    path = "/v1/metrics",
    responses(
        (status = 200, description = "Job counts and item statistics", body = MetricsResponse),
        (status = 401, description = "Unauthorized"),
    ),
    security(("bearer" = [])),
    tag = "system"
)]
pub async fn metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let runner = &state.runner;
    axum::Json(MetricsResponse::new(
        runner.metrics(),
        runner.in_flight(),
        runner.proxy_stats(),
    ))
}

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse),
    ),
    tag = "system"
)]
pub async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    axum::Json(HealthResponse {
        status: "healthy",
        jobs: state.runner.store().len(),
        in_flight: state.runner.in_flight(),
    })
}
