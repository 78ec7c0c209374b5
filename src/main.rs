use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use triage::config::AppConfig;
use triage::embedding::{Embedder, HttpEmbedder};
use triage::index::{self, VectorIndex};
use triage::ingest::{load_issues_file, Ingestor};
use triage::platform::github::GitHubPlatform;
use triage::platform::Platform;
use triage::server::{create_router, AppState};
use triage::shutdown::{graceful_shutdown, wait_for_shutdown};
use triage::workflow::WorkflowOrchestrator;

#[derive(Parser)]
#[command(name = "issue-triage", about = "Safety-screened GitHub issue triage with hybrid retrieval")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP service (triage endpoint and GitHub webhooks)
    Serve {
        /// Ingest this JSON corpus before serving (useful with the memory index)
        #[arg(long)]
        seed: Option<PathBuf>,
    },
    /// Triage one issue and print the final state as JSON
    Triage {
        #[arg(long)]
        title: String,
        #[arg(long, default_value = "")]
        body: String,
    },
    /// Load issue comments into the vector index
    Ingest {
        /// JSON file holding an array of issue records
        #[arg(long, conflicts_with = "repo", required_unless_present = "repo")]
        file: Option<PathBuf>,
        /// GitHub repository to fetch, as owner/name
        #[arg(long)]
        repo: Option<String>,
        /// Maximum number of issues to fetch from GitHub
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Create the collection and payload indexes if missing
    InitIndex,
    /// Delete the collection and every indexed point
    DropIndex {
        /// Required; deletion cannot be undone
        #[arg(long)]
        yes: bool,
    },
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer()).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.json_logs);

    let config = AppConfig::load(cli.config.as_deref())?;
    let index = index::from_config(&config.index);

    match cli.command {
        Command::Serve { seed } => {
            if let Some(path) = seed {
                ingest_file(&config, Arc::clone(&index), &path).await?;
            }
            serve(config, index).await
        }
        Command::Triage { title, body } => {
            let orchestrator = WorkflowOrchestrator::from_config(&config, index)?;
            let state = orchestrator.process_issue(&title, &body).await;

            if let Some(summary) = state.validation_summary.as_ref() {
                tracing::warn!(
                    validation_type = %summary.validation_type,
                    reason = %summary.failure_reason,
                    score = ?summary.score,
                    spans = summary.error_spans.as_ref().map_or(0, Vec::len),
                    "Issue blocked"
                );
            }
            for error in &state.errors {
                tracing::warn!(error = %error, "Stage error");
            }

            println!("{}", serde_json::to_string_pretty(&state)?);
            Ok(())
        }
        Command::Ingest { file, repo, limit } => {
            index.ensure_collection().await?;
            match (file, repo) {
                (Some(path), _) => ingest_file(&config, index, &path).await,
                (None, Some(repo)) => ingest_repo(&config, index, &repo, limit).await,
                (None, None) => anyhow::bail!("either --file or --repo is required"),
            }
        }
        Command::InitIndex => {
            index.ensure_collection().await?;
            tracing::info!(collection = %config.index.collection_name(), "Index ready");
            Ok(())
        }
        Command::DropIndex { yes } => {
            if !yes {
                anyhow::bail!(
                    "refusing to delete collection {} without --yes",
                    config.index.collection_name()
                );
            }
            index.delete_collection().await?;
            tracing::info!(collection = %config.index.collection_name(), "Index dropped");
            Ok(())
        }
    }
}

async fn serve(config: AppConfig, index: Arc<dyn VectorIndex>) -> anyhow::Result<()> {
    tracing::info!(
        host = %config.server.host,
        port = %config.server.port,
        index = ?config.index.backend,
        "Starting issue triage server"
    );

    let state = Arc::new(AppState::from_config(config.clone(), index)?);
    if state.platform.is_none() {
        tracing::info!("No [github] section configured; webhooks are disabled");
    }

    let queue_state = Arc::clone(&state);
    tokio::spawn(async move {
        triage::queue::run_queue_processor(queue_state).await;
    });

    let app = create_router(Arc::clone(&state));

    let listener = tokio::net::TcpListener::bind(format!(
        "{}:{}",
        config.server.host, config.server.port
    ))
    .await?;

    tracing::info!("Listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(wait_for_shutdown())
        .await?;

    graceful_shutdown(&state).await;

    Ok(())
}

fn ingestor(config: &AppConfig, index: Arc<dyn VectorIndex>) -> Ingestor {
    let embedder: Arc<dyn Embedder> = Arc::new(HttpEmbedder::new(&config.embedding));
    Ingestor::new(embedder, index, &config.ingest)
}

async fn ingest_file(config: &AppConfig, index: Arc<dyn VectorIndex>, path: &Path) -> anyhow::Result<()> {
    let issues = load_issues_file(path)
        .await
        .with_context(|| format!("reading corpus {}", path.display()))?;
    let report = ingestor(config, index).ingest(&issues).await?;
    tracing::info!(report = ?report, "Ingestion finished");
    Ok(())
}

async fn ingest_repo(
    config: &AppConfig,
    index: Arc<dyn VectorIndex>,
    repo: &str,
    limit: Option<usize>,
) -> anyhow::Result<()> {
    let github = config
        .github
        .as_ref()
        .context("a [github] section with a token is required to ingest from GitHub")?;
    let platform = GitHubPlatform::new(github)?;
    let issues = platform.list_issues_with_comments(repo, limit).await?;
    let report = ingestor(config, index).ingest(&issues).await?;
    tracing::info!(repo, report = ?report, "Ingestion finished");
    Ok(())
}
