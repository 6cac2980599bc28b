use hermes_client::{ReqwestTransport, SelectorExtractor};
use hermes_core::crawler::Crawler;
use hermes_core::job_store::JobStore;
use hermes_core::runner::JobRunner;
use hermes_core::site::SiteRegistry;
use hermes_core::traits::TokioSleeper;
use hermes_core::EngineConfig;
use hermes_store::FileSnapshotStore;

/// The job runner as wired for production: reqwest transport, CSS selector
/// extraction, tokio timers and a JSON snapshot file.
pub type Runner = JobRunner<ReqwestTransport, SelectorExtractor, TokioSleeper, FileSnapshotStore>;

/// Shared application state, available to all route handlers via `State<Arc<AppState>>`.
pub struct AppState {
    pub runner: Runner,
    /// Bearer token required on `/v1` routes (None = open access).
    pub api_key: Option<String>,
}

/// Assemble a runner from engine settings.
pub fn build_runner(
    engine: &EngineConfig,
    sites: SiteRegistry,
    snapshots: FileSnapshotStore,
) -> Runner {
    let fetcher = engine.page_fetcher(ReqwestTransport::new(), TokioSleeper);
    let crawler = Crawler::new(fetcher, SelectorExtractor::new(), JobStore::new());
    JobRunner::new(crawler, sites, snapshots)
}
