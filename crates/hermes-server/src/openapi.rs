use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Hermes API",
        version = "0.1.0",
        description = "Paginated product-listing crawler with retry, block detection and proxy rotation."
    ),
    paths(
        crate::routes::create_job,
        crate::routes::list_jobs,
        crate::routes::get_job,
        crate::routes::delete_job,
        crate::routes::get_job_items,
        crate::routes::get_job_debug,
        crate::routes::get_job_page_html,
        crate::routes::list_sites,
        crate::routes::metrics,
        crate::routes::health,
    ),
    components(schemas(
        crate::dto::CreateJobBody,
        crate::dto::CreateJobResponse,
        crate::dto::ItemResponse,
        crate::dto::JobResponse,
        crate::dto::JobSummaryResponse,
        crate::dto::JobListResponse,
        crate::dto::ItemsResponse,
        crate::dto::StatsResponse,
        crate::dto::ProxyStatsResponse,
        crate::dto::JobDebugResponse,
        crate::dto::SiteResponse,
        crate::dto::SiteListResponse,
        crate::dto::MetricsResponse,
        crate::dto::HealthResponse,
        crate::dto::ErrorResponse,
    )),
    tags(
        (name = "jobs", description = "Crawl job management"),
        (name = "sites", description = "Supported storefronts"),
        (name = "system", description = "Health and metrics"),
    ),
    modifiers(&SecurityAddon)
)]
pub struct ApiDoc;

/// Registers the bearer token scheme referenced by the `/v1` paths.
struct SecurityAddon;

impl utoipa::Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer",
                utoipa::openapi::security::SecurityScheme::Http(
                    utoipa::openapi::security::HttpBuilder::new()
                        .scheme(utoipa::openapi::security::HttpAuthScheme::Bearer)
                        .bearer_format("token")
                        .description(Some("API key. Set via HERMES_API_KEY environment variable."))
                        .build(),
                ),
            );
        }
    }
}
