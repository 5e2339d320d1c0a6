use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

use genmedia_core::config::AppConfig;
use genmedia_core::graph::WorkflowGraph;
use genmedia_core::media::encode_base64;
use genmedia_core::traits::{ArtifactStore, GenerationProvider};
use genmedia_core::types::{ArtifactKind, GenerationRequest, ImageRequest, JobStatus};
use genmedia_gateway::{AppState, GatewayServer};
use genmedia_graph::{GraphResolver, WorkflowService};
use genmedia_jobs::{ImageService, JobHandle, JobOrchestrator};
use genmedia_provider::RetryPolicy;
use genmedia_store::{Database, SqliteArtifactStore, SqliteWorkflowRepository};

/// Owner recorded for jobs started from the command line.
const CLI_OWNER: &str = "local";

#[derive(Parser)]
#[command(
    name = "genmedia",
    version,
    about = "Media generation jobs, artifact library and workflow graphs"
)]
struct Cli {
    /// Path to config file (defaults to ~/.genmedia/config.toml)
    #[arg(short, long, env = "GENMEDIA_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP gateway
    Serve,
    /// Submit a generation job
    Generate {
        #[command(subcommand)]
        kind: GenerateKind,
    },
    /// Check the status of a submitted operation
    Status {
        /// Provider operation name
        operation: String,
        /// Keep polling until the job finishes
        #[arg(long)]
        wait: bool,
    },
    /// Resolve artifact references in a workflow graph file
    Resolve {
        /// JSON file holding `{"nodes": [...], "edges": [...]}`
        graph: PathBuf,
    },
}

#[derive(Subcommand)]
enum GenerateKind {
    /// Generate a video
    Video {
        #[arg(long)]
        prompt: String,
        #[arg(long, default_value = "16:9")]
        aspect_ratio: String,
        #[arg(long, default_value = "8")]
        duration: u32,
        #[arg(long)]
        no_audio: bool,
        /// Wait for completion instead of printing the operation name
        #[arg(long)]
        wait: bool,
    },
    /// Generate images and save them to the library
    Image {
        #[arg(long)]
        prompt: String,
        #[arg(long, default_value = "1:1")]
        aspect_ratio: String,
        #[arg(long, default_value = "1K")]
        resolution: String,
        /// Reference image files used as visual ingredients
        #[arg(long = "reference")]
        references: Vec<PathBuf>,
    },
}

/// Everything the commands share, built once from config.
struct Services {
    config: AppConfig,
    store: Arc<SqliteArtifactStore>,
    db: Arc<Database>,
}

impl Services {
    fn open(config: AppConfig) -> anyhow::Result<Self> {
        let db_path = config.storage.data_dir().join("genmedia.db");
        let db = Arc::new(
            Database::open(&db_path)
                .with_context(|| format!("opening database at {}", db_path.display()))?,
        );
        let store = Arc::new(SqliteArtifactStore::from_config(db.clone(), &config.storage));
        Ok(Self { config, store, db })
    }

    fn provider(&self) -> anyhow::Result<Arc<dyn GenerationProvider>> {
        let provider = genmedia_provider::create_provider(&self.config.provider)
            .context("creating generation provider")?;
        Ok(Arc::new(provider))
    }

    fn retry(&self) -> RetryPolicy {
        RetryPolicy::from_config(&self.config.retry)
    }

    fn orchestrator(&self) -> anyhow::Result<JobOrchestrator> {
        Ok(JobOrchestrator::new(self.provider()?, self.store.clone(), self.retry()))
    }

    fn images(&self) -> anyhow::Result<ImageService> {
        Ok(ImageService::new(self.provider()?, self.store.clone(), self.retry()))
    }

    fn resolver(&self) -> GraphResolver {
        GraphResolver::from_config(self.store.clone(), &self.config.resolver)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("genmedia=info,warn")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;
    let services = Services::open(config)?;

    match cli.command {
        Commands::Serve => serve(services).await,
        Commands::Generate {
            kind:
                GenerateKind::Video {
                    prompt,
                    aspect_ratio,
                    duration,
                    no_audio,
                    wait,
                },
        } => {
            let mut request = GenerationRequest::video(prompt);
            request.aspect_ratio = aspect_ratio;
            request.duration_seconds = duration;
            request.generate_audio = !no_audio;
            generate(&services, request, wait).await
        }
        Commands::Generate {
            kind:
                GenerateKind::Image {
                    prompt,
                    aspect_ratio,
                    resolution,
                    references,
                },
        } => {
            let mut request = ImageRequest::new(prompt);
            request.aspect_ratio = aspect_ratio;
            request.resolution = resolution;
            for path in &references {
                let bytes = std::fs::read(path)
                    .with_context(|| format!("reading reference {}", path.display()))?;
                request.reference_images.push(encode_base64(&bytes));
            }
            generate_images(&services, request).await
        }
        Commands::Status { operation, wait } => status(&services, operation, wait).await,
        Commands::Resolve { graph } => resolve(&services, &graph).await,
    }
}

fn load_config(path: Option<&Path>) -> anyhow::Result<AppConfig> {
    let path = path.map(Path::to_path_buf).unwrap_or_else(AppConfig::default_path);
    AppConfig::load(&path).with_context(|| format!("loading config from {}", path.display()))
}

/// Cancellation token that fires on Ctrl-C.
fn ctrl_c_token(what: &'static str) -> CancellationToken {
    let cancel = CancellationToken::new();
    let cancel_clone = cancel.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Stopping {}...", what);
        cancel_clone.cancel();
    });
    cancel
}

async fn serve(services: Services) -> anyhow::Result<()> {
    let provider = services.provider()?;
    let jobs = JobOrchestrator::new(provider.clone(), services.store.clone(), services.retry());
    let images = ImageService::new(provider, services.store.clone(), services.retry());
    let workflows = WorkflowService::new(
        Arc::new(SqliteWorkflowRepository::new(services.db.clone())),
        services.resolver(),
    );
    let files_dir = services.store.blob_root().to_path_buf();
    let store: Arc<dyn ArtifactStore> = services.store.clone();

    let state = AppState {
        config: services.config.gateway.clone(),
        jobs,
        images,
        store,
        workflows,
    };
    info!(bind = %state.config.bind, "Starting gateway");
    let server = GatewayServer::new(state, Some(files_dir));

    // Graceful shutdown on Ctrl-C
    let cancel = ctrl_c_token("gateway");
    server.run(cancel).await
}

async fn generate(
    services: &Services,
    request: GenerationRequest,
    wait: bool,
) -> anyhow::Result<()> {
    let jobs = services.orchestrator()?;
    let mut handle = jobs.submit(&request, CLI_OWNER).await?;
    println!("operation: {}", handle.id);

    if wait {
        let status = wait_for(services, &jobs, &mut handle).await?;
        print_status(&status)?;
    }
    Ok(())
}

async fn generate_images(services: &Services, request: ImageRequest) -> anyhow::Result<()> {
    let images = services.images()?.generate(&request, CLI_OWNER).await?;
    for (index, image) in images.iter().enumerate() {
        match &image.stored {
            Some(id) => println!("image {}: {} ({})", index + 1, id, image.mime_type),
            None => println!("image {}: not saved ({})", index + 1, image.mime_type),
        }
    }
    Ok(())
}

async fn status(services: &Services, operation: String, wait: bool) -> anyhow::Result<()> {
    let jobs = services.orchestrator()?;
    let mut handle = JobHandle::resume(operation, CLI_OWNER, ArtifactKind::Video, "");
    let status = if wait {
        wait_for(services, &jobs, &mut handle).await?
    } else {
        jobs.poll(&mut handle).await?
    };
    print_status(&status)
}

async fn wait_for(
    services: &Services,
    jobs: &JobOrchestrator,
    handle: &mut JobHandle,
) -> anyhow::Result<JobStatus> {
    let cancel = ctrl_c_token("waiting");
    let status = jobs
        .await_completion(
            handle,
            services.config.jobs.poll_interval(),
            services.config.jobs.max_wait(),
            &cancel,
        )
        .await?;
    Ok(status)
}

fn print_status(status: &JobStatus) -> anyhow::Result<()> {
    // Inline payloads are large; show the stored artifact instead.
    let mut value = serde_json::to_value(status)?;
    if let Some(payload) = value.get_mut("payload").and_then(|p| p.as_object_mut()) {
        if let Some(data) = payload.get_mut("data_base64") {
            let len = data.as_str().map(str::len).unwrap_or(0);
            *data = serde_json::json!(format!("<{} base64 chars>", len));
        }
    }
    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}

async fn resolve(services: &Services, path: &Path) -> anyhow::Result<()> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading graph from {}", path.display()))?;
    let graph: WorkflowGraph =
        serde_json::from_str(&raw).with_context(|| format!("parsing graph {}", path.display()))?;
    let resolved = services.resolver().resolve(&graph).await?;
    println!("{}", serde_json::to_string_pretty(&resolved)?);
    Ok(())
}
