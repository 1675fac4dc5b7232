use std::time::Duration;

use anyhow::Result;
use clap::{Args, Parser, Subcommand, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use appvoc_client::{ConcurrentFetcher, SessionFetcher};
use appvoc_core::categories::{self, CATEGORIES};
use appvoc_core::throttle::{BurstThrottle, LatencyThrottle};
use appvoc_core::traits::JobStore;
use appvoc_core::{
    AppDataController, ControllerKind, Director, HarvestConfig, HarvestSummary, HeaderRotator,
    ProxyPool, RatingController, ReviewController, TracingReporter,
};
use appvoc_db::{Database, DatabaseConfig};

#[derive(Parser)]
#[command(name = "appvoc", version, about = "App Store harvester")]
struct Cli {
    #[command(flatten)]
    harvest: HarvestArgs,

    #[command(subcommand)]
    command: Commands,
}

/// Overrides for `APPVOC_*` settings.
#[derive(Args)]
struct HarvestArgs {
    /// Pages per search or review harvester
    #[arg(long, global = true)]
    max_pages: Option<u64>,

    /// Search results per page
    #[arg(long, global = true)]
    page_size: Option<u64>,

    /// Per-request timeout in seconds
    #[arg(long, global = true)]
    timeout_secs: Option<u64>,

    /// Concurrent requests during rating lookups
    #[arg(long, global = true)]
    max_concurrency: Option<usize>,

    /// App ids per rating lookup batch
    #[arg(long, global = true)]
    batch_size: Option<usize>,

    /// Consecutive failed batches tolerated before a run is abandoned
    #[arg(long, global = true)]
    failure_threshold: Option<u32>,

    /// Minimum ratings an app needs before its reviews are harvested
    #[arg(long, global = true)]
    min_ratings: Option<i64>,
}

#[derive(Subcommand)]
enum Commands {
    /// Search for apps by term, resuming any unfinished project
    Appdata {
        /// Search terms, harvested in order
        #[arg(short, long = "term", required = true, num_args = 1..)]
        terms: Vec<String>,
    },

    /// Harvest rating histograms for every seeded category
    Rating,

    /// Harvest reviews for every seeded category
    Review,

    /// Manage category jobs
    Jobs {
        #[command(subcommand)]
        action: JobsAction,
    },

    /// Show term projects and their progress
    Projects,
}

#[derive(Subcommand)]
enum JobsAction {
    /// Create one job per category, skipping categories that already have one
    Seed {
        #[arg(value_enum)]
        controller: Target,

        /// Category ids (defaults to every top-level genre)
        #[arg(long, value_delimiter = ',')]
        categories: Vec<i64>,
    },

    /// List jobs and their status
    List {
        #[arg(value_enum)]
        controller: Target,
    },

    /// Delete all jobs and runs for a controller
    Clear {
        #[arg(value_enum)]
        controller: Target,
    },
}

/// Controllers that work through category jobs.
#[derive(Clone, Copy, ValueEnum)]
enum Target {
    Rating,
    Review,
}

impl From<Target> for ControllerKind {
    fn from(target: Target) -> Self {
        match target {
            Target::Rating => ControllerKind::Rating,
            Target::Review => ControllerKind::Review,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("appvoc=info".parse()?))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let db = connect_db().await?;

    match cli.command {
        Commands::Appdata { terms } => {
            let config = harvest_config(&cli.harvest)?;
            let controller = AppDataController::new(
                db.project_repo(),
                db.app_repo(),
                session_fetcher(&config)?,
                config,
            );
            let summary = controller
                .run(&terms, shutdown_token(), &TracingReporter)
                .await
                .map_err(|e| anyhow::anyhow!(e))?;
            print_summary(ControllerKind::AppData, &summary);
        }
        Commands::Rating => {
            let config = harvest_config(&cli.harvest)?;
            let controller = RatingController::new(
                Director::new(db.job_repo()),
                db.app_repo(),
                db.rating_repo(),
                concurrent_fetcher(&config)?,
                config,
            );
            let summary = controller
                .run(shutdown_token(), &TracingReporter)
                .await
                .map_err(|e| anyhow::anyhow!(e))?;
            print_summary(ControllerKind::Rating, &summary);
        }
        Commands::Review => {
            let config = harvest_config(&cli.harvest)?;
            let controller = ReviewController::new(
                Director::new(db.job_repo()),
                db.app_repo(),
                db.review_repo(),
                db.cursor_repo(),
                session_fetcher(&config)?,
                config,
            );
            let summary = controller
                .run(shutdown_token(), &TracingReporter)
                .await
                .map_err(|e| anyhow::anyhow!(e))?;
            print_summary(ControllerKind::Review, &summary);
        }
        Commands::Jobs { action } => cmd_jobs(action, &db).await?,
        Commands::Projects => cmd_projects(&db).await?,
    }

    Ok(())
}

/// Connect to PostgreSQL using DATABASE_URL and apply migrations.
async fn connect_db() -> Result<Database> {
    let config = DatabaseConfig::from_env().map_err(|e| anyhow::anyhow!(e))?;
    let db = Database::connect(&config)
        .await
        .map_err(|e| anyhow::anyhow!(e))?;
    db.migrate().await.map_err(|e| anyhow::anyhow!(e))?;
    Ok(db)
}

/// Cancelled on Ctrl+C so the running controller can close its run cleanly.
fn shutdown_token() -> CancellationToken {
    let token = CancellationToken::new();
    let child = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Shutdown signal received, finishing current batch");
            child.cancel();
        }
    });
    token
}

fn harvest_config(args: &HarvestArgs) -> Result<HarvestConfig> {
    let mut config = HarvestConfig::from_env().map_err(|e| anyhow::anyhow!(e))?;
    if let Some(max_pages) = args.max_pages {
        config = config.with_max_pages(max_pages);
    }
    if let Some(page_size) = args.page_size {
        config = config.with_page_size(page_size);
    }
    if let Some(secs) = args.timeout_secs {
        config = config.with_timeout(Duration::from_secs(secs));
    }
    if let Some(max_concurrency) = args.max_concurrency {
        config = config.with_max_concurrency(max_concurrency);
    }
    if let Some(batch_size) = args.batch_size {
        config = config.with_batch_size(batch_size);
    }
    if let Some(threshold) = args.failure_threshold {
        config = config.with_failure_threshold(threshold);
    }
    if let Some(min_ratings) = args.min_ratings {
        config = config.with_min_ratings(min_ratings);
    }
    Ok(config)
}

fn session_fetcher(config: &HarvestConfig) -> Result<SessionFetcher<LatencyThrottle, HeaderRotator>> {
    let proxies = ProxyPool::from_env().map_err(|e| anyhow::anyhow!(e))?;
    let headers = HeaderRotator::browser();
    tracing::info!(
        proxies = proxies.len(),
        headers = headers.pool_size(),
        "Serial fetcher ready"
    );
    Ok(SessionFetcher::new(
        LatencyThrottle::new(config.latency_throttle.clone()),
        headers,
        proxies,
    )
    .with_timeout(config.timeout)
    .with_retries(config.session_retries))
}

fn concurrent_fetcher(
    config: &HarvestConfig,
) -> Result<ConcurrentFetcher<BurstThrottle, HeaderRotator>> {
    let proxies = ProxyPool::from_env().map_err(|e| anyhow::anyhow!(e))?;
    let headers = HeaderRotator::browser();
    tracing::info!(
        proxies = proxies.len(),
        headers = headers.pool_size(),
        max_concurrency = config.max_concurrency,
        "Concurrent fetcher ready"
    );
    Ok(ConcurrentFetcher::new(
        BurstThrottle::new(config.burst_throttle.clone()),
        headers,
        proxies,
        config.max_concurrency,
    )
    .with_timeout(config.timeout)
    .with_retries(config.retries))
}

fn print_summary(controller: ControllerKind, summary: &HarvestSummary) {
    println!(
        "{controller}: {} run(s), {} completed, {} items, {} errors",
        summary.runs, summary.completed, summary.items, summary.errors
    );
    if summary.abandoned {
        println!("{controller}: stopped early; rerun to resume");
    }
}

async fn cmd_jobs(action: JobsAction, db: &Database) -> Result<()> {
    let jobs = db.job_repo();

    match action {
        JobsAction::Seed {
            controller,
            categories: ids,
        } => {
            let selected = if ids.is_empty() {
                CATEGORIES.to_vec()
            } else {
                categories::resolve(&ids).map_err(|e| anyhow::anyhow!(e))?
            };
            let created = Director::new(jobs)
                .seed(controller.into(), &selected)
                .await
                .map_err(|e| anyhow::anyhow!(e))?;
            println!(
                "Seeded {created} job(s) for {} of {} categories",
                ControllerKind::from(controller),
                selected.len()
            );
        }
        JobsAction::List { controller } => {
            let kind = ControllerKind::from(controller);
            let listed = jobs.list_jobs(kind).await.map_err(|e| anyhow::anyhow!(e))?;
            if listed.is_empty() {
                println!("No jobs for {kind}. Run `appvoc jobs seed` first.");
                return Ok(());
            }

            println!("Jobs for {kind}:\n");
            for job in &listed {
                let completed = job
                    .completed
                    .map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
                    .unwrap_or_else(|| "-".to_string());
                println!(
                    "  {:>5}  {:<24} {:<12} runs={:<3} completed={}",
                    job.category_id, job.category, job.status, job.runs, completed
                );
            }
            let done = listed.iter().filter(|j| j.complete).count();
            println!("\nTotal: {} job(s), {done} complete", listed.len());
        }
        JobsAction::Clear { controller } => {
            let kind = ControllerKind::from(controller);
            let removed = jobs
                .delete_jobs(kind)
                .await
                .map_err(|e| anyhow::anyhow!(e))?;
            println!("Deleted {removed} job(s) for {kind}");
        }
    }

    Ok(())
}

async fn cmd_projects(db: &Database) -> Result<()> {
    let projects = db
        .project_repo()
        .list_projects(ControllerKind::AppData)
        .await
        .map_err(|e| anyhow::anyhow!(e))?;

    if projects.is_empty() {
        println!("No projects yet. Run `appvoc appdata --term <TERM>` to start one.");
        return Ok(());
    }

    for project in &projects {
        println!(
            "  {:<24} {:<12} pages={:<5} apps={:<7} resume_page={}",
            project.term,
            project.status,
            project.pages,
            project.apps,
            project.start_page()
        );
    }
    println!("\nTotal: {} project(s)", projects.len());

    Ok(())
}
