use clap::{Parser, Subcommand};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use docgraph::config::Config;
use docgraph::graph::{GraphAccess, MemoryGraph};
use docgraph::llm::{HttpLlm, LlmGateway, PromptAudit};
use docgraph::news::{NewsGenerator, NewsProcessor};
use docgraph::pipeline::queue::{WorkQueue, GROUP_INGESTION};
use docgraph::pipeline::{Orchestrator, PipelineDeps};
use docgraph::pipeline::progress::ProgressTracker;
use docgraph::store::{KvStore, LocalBlobStore, Settings, TABLE_NEWS};
use docgraph::web::{AppState, WebServer};

#[derive(Parser)]
#[command(name = "docgraph")]
#[command(about = "Document ingestion and entity-graph pipeline", long_about = None)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(long, default_value = "docgraph.toml")]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the workers and the web API
    Serve,

    /// Stage a page-text document (JSON array of pages, or plain text) and
    /// run it through the pipeline
    Ingest {
        /// Local file to ingest
        file: std::path::PathBuf,
        #[arg(long, default_value = "documents")]
        bucket: String,
    },

    /// Stage a news article and process it
    News {
        /// Local article file
        file: std::path::PathBuf,
        #[arg(long, default_value = "news")]
        bucket: String,
    },

    /// Synthesize fictional news articles from graph entities and process
    /// them
    GenerateNews {
        #[arg(long, default_value_t = 10)]
        count: usize,
    },

    /// List graph entities with their INTERESTED flags
    Entities,

    /// Print processing status records
    Status,
}

struct App {
    store: KvStore,
    blob: Arc<LocalBlobStore>,
    document_queue: Arc<WorkQueue>,
    news_queue: Arc<WorkQueue>,
    orchestrator: Arc<Orchestrator>,
    news_processor: Arc<NewsProcessor>,
    news_generator: Arc<NewsGenerator>,
    access: Arc<GraphAccess>,
    config: Config,
}

/// Copy a local file into the blob store under its basename.
async fn stage_blob(app: &App, bucket: &str, file: &std::path::Path) -> anyhow::Result<String> {
    use docgraph::store::BlobStore;
    let bytes = tokio::fs::read(file).await?;
    let key = file
        .file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.to_string())
        .ok_or_else(|| anyhow::anyhow!("file has no usable name: {}", file.display()))?;
    app.blob.put(bucket, &key, bytes).await?;
    Ok(key)
}

fn build_app(config: Config) -> anyhow::Result<App> {
    let store = if config.storage.persistent {
        KvStore::persistent(&config.storage.data_dir)?
    } else {
        KvStore::in_memory()
    };
    let blob = Arc::new(LocalBlobStore::new(format!(
        "{}/blobs",
        config.storage.data_dir
    )));
    let transport = Arc::new(HttpLlm::new(&config.llm)?);
    let audit = PromptAudit::new(&store, config.storage.prompt_ttl_secs);
    let gateway = Arc::new(LlmGateway::new(transport, audit, &config.llm));
    let backend = Arc::new(MemoryGraph::new());
    let access = Arc::new(GraphAccess::new(backend, gateway.clone()));

    let visibility = Duration::from_secs(config.queue.visibility_timeout_secs);
    let document_queue = Arc::new(WorkQueue::fifo(visibility, config.queue.max_receives));
    let news_queue = Arc::new(WorkQueue::standard(visibility, config.queue.max_receives));

    let orchestrator = Arc::new(Orchestrator::new(PipelineDeps {
        store: store.clone(),
        blob: blob.clone(),
        queue: document_queue.clone(),
        gateway: gateway.clone(),
        access: access.clone(),
        config: config.clone(),
    }));
    let news_processor = Arc::new(NewsProcessor::new(
        &store,
        gateway.clone(),
        access.clone(),
        blob.clone(),
        news_queue.clone(),
        &config.news,
        config.queue.poll_interval_ms,
    ));
    let news_generator = Arc::new(NewsGenerator::new(
        gateway,
        access.clone(),
        blob.clone(),
        news_queue.clone(),
        "news",
    ));

    Ok(App {
        store,
        blob,
        document_queue,
        news_queue,
        orchestrator,
        news_processor,
        news_generator,
        access,
        config,
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = Config::load_or_default(&cli.config);

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.logging.level)),
        )
        .init();

    let app = build_app(config)?;

    match cli.command {
        Commands::Serve => {
            for _ in 0..app.config.queue.document_workers {
                tokio::spawn(app.orchestrator.clone().run());
            }
            for _ in 0..app.config.queue.news_workers {
                tokio::spawn(app.news_processor.clone().run());
            }
            info!(
                document_workers = app.config.queue.document_workers,
                news_workers = app.config.queue.news_workers,
                "workers started"
            );

            let state = AppState {
                progress: ProgressTracker::new(&app.store),
                access: app.access.clone(),
                settings: Settings::new(&app.store),
                news_queue: app.news_queue.clone(),
                news_table: app.store.table(TABLE_NEWS),
            };
            let server = WebServer::new(state, &app.config.web);
            server.start().await.map_err(|e| anyhow::anyhow!(e.to_string()))?;
        }
        Commands::Ingest { file, bucket } => {
            let key = stage_blob(&app, &bucket, &file).await?;
            let body = serde_json::json!({ "S3_BUCKET": bucket, "S3_KEY": key }).to_string();
            app.document_queue.send(body, Some(GROUP_INGESTION));
            info!(key, "document enqueued");
            // Drain the queue in-process so the CLI is useful standalone.
            while app.orchestrator.poll_once().await? {}
        }
        Commands::News { file, bucket } => {
            let key = stage_blob(&app, &bucket, &file).await?;
            let body = serde_json::json!({
                "Records": [{ "s3": { "bucket": { "name": bucket }, "object": { "key": key } } }]
            })
            .to_string();
            app.news_queue.send(body, None);
            info!(key, "news article enqueued");
            while app.news_processor.poll_once().await? {}
        }
        Commands::GenerateNews { count } => {
            let keys = app.news_generator.generate(count).await?;
            info!(articles = keys.len(), "generated, processing");
            while app.news_processor.poll_once().await? {}
        }
        Commands::Entities => {
            for entity in app.access.get_entities().await? {
                println!(
                    "{}\t{}\t{}\t{}",
                    entity.id, entity.label, entity.name, entity.interested
                );
            }
        }
        Commands::Status => {
            let tracker = ProgressTracker::new(&app.store);
            for view in tracker.list() {
                println!(
                    "{}\t{}\t{}/{}\t{}\t{}",
                    view.record.file_name,
                    view.status,
                    view.record.completed_step_count,
                    view.record.total_step_count,
                    view.progress_percentage,
                    view.record.datetime_started
                );
            }
        }
    }

    Ok(())
}
