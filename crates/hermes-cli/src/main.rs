use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

use hermes_client::{ReqwestTransport, SelectorExtractor};
use hermes_core::classifier::FetchOutcome;
use hermes_core::traits::{ExtractionAdapter, NullSnapshotStore, PageRequest, SnapshotStore, Transport};
use hermes_core::{
    Crawler, CreateJobRequest, EngineConfig, ExtractedItem, JobRunner, JobStatus, JobStore,
    ProxyEndpoint, TokioSleeper, compute_hash,
};
use hermes_store::FileSnapshotStore;

const SAMPLE_CHARS: usize = 300;

#[derive(Parser)]
#[command(name = "hermes", version, about = "Paginated product-listing crawler")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    Json,
    Csv,
}

#[derive(Subcommand)]
enum Commands {
    /// Crawl one search in-process and print the collected items
    Crawl {
        /// Site key (see `hermes sites`)
        #[arg(short, long)]
        site: String,

        /// Search term
        #[arg(short, long)]
        term: String,

        /// Number of result pages to crawl (1-100)
        #[arg(short, long, default_value_t = 10)]
        max_pages: u32,

        /// Seconds to wait between pages
        #[arg(short, long, default_value_t = 1.0)]
        delay: f64,

        /// Output format
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Json)]
        format: OutputFormat,

        /// Write items to this file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// List the configured site profiles
    Sites,

    /// Send a single request and show how the response classifies
    Probe {
        /// URL to fetch; alternatively use --site and --term
        #[arg(short, long, conflicts_with_all = ["site", "term"])]
        url: Option<String>,

        /// Site key used to build the search URL
        #[arg(short, long, requires = "term")]
        site: Option<String>,

        /// Search term used to build the search URL
        #[arg(short, long, requires = "site")]
        term: Option<String>,

        /// Result page to fetch when building the URL from a site
        #[arg(short, long, default_value_t = 1)]
        page: u32,

        /// Route the request through this proxy
        #[arg(long)]
        proxy: Option<String>,
    },

    /// List the jobs stored in a snapshot file
    Jobs {
        /// Snapshot file written by hermes-server
        #[arg(short, long, env = "HERMES_JOBS_FILE", default_value = "jobs_data.json")]
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("hermes_core=info".parse()?))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let engine = EngineConfig::from_env()?;

    match cli.command {
        Commands::Crawl {
            site,
            term,
            max_pages,
            delay,
            format,
            output,
        } => {
            let delay = Duration::try_from_secs_f64(delay)
                .with_context(|| format!("Invalid delay: {delay}"))?;
            let request = CreateJobRequest::new(site, term)
                .with_max_pages(max_pages)
                .with_delay(delay);
            let items = cmd_crawl(&engine, request).await?;
            match output {
                Some(path) => {
                    let file = std::fs::File::create(&path)
                        .with_context(|| format!("Failed to create {}", path.display()))?;
                    write_items(&items, format, file)?;
                    tracing::info!(path = %path.display(), items = items.len(), "Items written");
                }
                None => write_items(&items, format, std::io::stdout().lock())?,
            }
        }
        Commands::Sites => cmd_sites(&engine)?,
        Commands::Probe {
            url,
            site,
            term,
            page,
            proxy,
        } => {
            cmd_probe(&engine, url, site.zip(term), page, proxy).await?;
        }
        Commands::Jobs { file } => cmd_jobs(file).await?,
    }

    Ok(())
}

async fn cmd_crawl(engine: &EngineConfig, request: CreateJobRequest) -> Result<Vec<ExtractedItem>> {
    let crawler = Crawler::new(
        engine.page_fetcher(ReqwestTransport::new(), TokioSleeper),
        SelectorExtractor::new(),
        JobStore::new(),
    );
    let runner = JobRunner::new(crawler, engine.site_registry()?, NullSnapshotStore);

    let job = runner.submit(request).await?;
    runner.shutdown().await;

    let job = runner
        .get(job.id)
        .with_context(|| format!("Job {} disappeared", job.id))?;
    tracing::info!(
        pages = job.stats.pages_fetched,
        requests = job.stats.requests,
        retries = job.stats.retries,
        blocked = job.stats.blocked_responses,
        possible_captcha = job.stats.possible_captcha,
        "{}",
        job.progress
    );

    if job.status == JobStatus::Failed {
        bail!(
            "Crawl failed after {} items: {}",
            job.items.len(),
            job.error.unwrap_or_default()
        );
    }
    Ok(job.items)
}

fn write_items(items: &[ExtractedItem], format: OutputFormat, mut out: impl Write) -> Result<()> {
    match format {
        OutputFormat::Json => {
            serde_json::to_writer_pretty(&mut out, items)?;
            writeln!(out)?;
        }
        OutputFormat::Csv => {
            let mut writer = csv::Writer::from_writer(out);
            for item in items {
                writer.serialize(item)?;
            }
            writer.flush()?;
        }
    }
    Ok(())
}

fn cmd_sites(engine: &EngineConfig) -> Result<()> {
    let sites = engine.site_registry()?;
    for site in sites.list() {
        println!("{:<16} {:<16} {}", site.key, site.name, site.search_url);
    }
    Ok(())
}

async fn cmd_probe(
    engine: &EngineConfig,
    url: Option<String>,
    search: Option<(String, String)>,
    page: u32,
    proxy: Option<String>,
) -> Result<()> {
    let sites = engine.site_registry()?;
    let (url, profile) = match (url, search) {
        (Some(url), _) => (url, None),
        (None, Some((site, term))) => {
            let profile = sites.get(&site)?;
            (profile.page_url(&term, page)?, Some(profile))
        }
        (None, None) => bail!("Pass either --url or --site with --term"),
    };

    let config = engine.fetcher_config();
    let request = PageRequest {
        url: url.clone(),
        headers: config.identity_headers(),
        proxy: proxy.as_deref().map(ProxyEndpoint::new),
        timeout: config.timeout,
    };

    tracing::info!(%url, proxy = proxy.as_deref().unwrap_or("direct"), "Probing");
    let transport = ReqwestTransport::new();
    let session = transport
        .open_session()
        .context("Failed to create HTTP client")?;
    let outcome = match transport.request(&session, &request).await {
        Ok(response) => FetchOutcome::http(response.status, response.body, response.elapsed),
        Err(e) => {
            println!("transport error: {} ({})", e.message, e.kind);
            FetchOutcome::transport(e.kind, e.elapsed)
        }
    };
    let classification = engine.classifier().classify(&outcome);

    println!("url:            {url}");
    match outcome.status_code() {
        Some(code) => println!("status:         {code}"),
        None => println!("status:         -"),
    }
    println!("elapsed:        {} ms", outcome.elapsed.as_millis());
    println!("length:         {} bytes", outcome.body_len());
    println!("sha256:         {}", compute_hash(&outcome.body));
    println!("classification: {classification}");

    if let Some(profile) = profile
        && !outcome.is_transport_error()
    {
        let extraction = SelectorExtractor::new().extract(&outcome.body, profile)?;
        println!(
            "records:        {} (primary hits {}, fallback {})",
            extraction.records.len(),
            extraction.primary_hits,
            extraction.fallback_selector.as_deref().unwrap_or("none")
        );
    }

    let sample: String = outcome.body.chars().take(SAMPLE_CHARS).collect();
    if !sample.is_empty() {
        println!("\n{sample}");
    }
    Ok(())
}

async fn cmd_jobs(file: PathBuf) -> Result<()> {
    let store = FileSnapshotStore::new(file.clone());
    let snapshot = store.load().await?;

    if snapshot.jobs.is_empty() {
        println!("No jobs in {}", file.display());
        return Ok(());
    }

    for job in &snapshot.jobs {
        println!(
            "  [{:<9}] {} {} '{}' ({} items, created {})",
            job.status.as_str(),
            job.id,
            job.config.site,
            job.config.search_term,
            job.items.len(),
            job.created_at.format("%Y-%m-%d %H:%M:%S UTC"),
        );
        if let Some(error) = &job.error {
            println!("              error: {error}");
        }
    }

    match snapshot.saved_at {
        Some(saved_at) => println!(
            "\nTotal: {} jobs (saved {})",
            snapshot.jobs.len(),
            saved_at.format("%Y-%m-%d %H:%M:%S UTC")
        ),
        None => println!("\nTotal: {} jobs", snapshot.jobs.len()),
    }
    Ok(())
}
