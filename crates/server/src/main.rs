//! Foundry Server
//!
//! Axum server exposing the generation pipeline: start runs, follow their
//! progress over WebSocket or SSE, and read the composite result.

mod api;
mod config;
mod telemetry;

use axum::{
    body::Body,
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use clap::{Parser, Subcommand};
use foundry_core::collaborators::{FilesystemDeployer, GeneratorRegistry};
use foundry_core::models::{requirement_schema, Requirement, RunOptions};
use foundry_core::pipeline::{new_run_id, Orchestrator, ProgressBroadcaster};
use foundry_core::state::{RunDb, RunStore, SqliteRunStore};
use std::{
    collections::HashMap,
    net::{IpAddr, SocketAddr},
    path::PathBuf,
    sync::Arc,
};
use tokio::{net::TcpListener, sync::RwLock};
use tracing::Level;
use utoipa::OpenApi;

use api::runs::RunEntry;
use config::{PersistedConfig, CONFIG_PATH, DATABASE_PATH};

/// Application state
pub struct AppState {
    broadcaster: Arc<ProgressBroadcaster>,
    /// Replaced wholesale when the configuration changes
    orchestrator: RwLock<Arc<Orchestrator>>,
    runs: RwLock<HashMap<String, RunEntry>>,
    run_store: Option<Arc<dyn RunStore>>,
    config: RwLock<PersistedConfig>,
    /// Where config patches are persisted; `None` keeps them in memory
    config_path: Option<PathBuf>,
}

pub type SharedState = Arc<AppState>;

impl AppState {
    pub fn new(
        config: PersistedConfig,
        run_store: Option<Arc<dyn RunStore>>,
        config_path: Option<PathBuf>,
    ) -> Self {
        let broadcaster = Arc::new(ProgressBroadcaster::new());
        let orchestrator = build_orchestrator(&config, broadcaster.clone(), run_store.clone());
        Self {
            broadcaster,
            orchestrator: RwLock::new(orchestrator),
            runs: RwLock::new(HashMap::new()),
            run_store,
            config: RwLock::new(config),
            config_path,
        }
    }
}

/// Wire the scaffold generators and filesystem deployer into an orchestrator
pub fn build_orchestrator(
    config: &PersistedConfig,
    broadcaster: Arc<ProgressBroadcaster>,
    run_store: Option<Arc<dyn RunStore>>,
) -> Arc<Orchestrator> {
    let orchestrator_config = config.orchestrator_config();
    let out_dir = config
        .out_dir
        .clone()
        .unwrap_or_else(foundry_core::collaborators::deploy::default_out_dir);
    let orchestrator = Orchestrator::new(
        orchestrator_config.clone(),
        GeneratorRegistry::scaffold(orchestrator_config.approval_thresholds),
        Arc::new(FilesystemDeployer::new(out_dir)),
        broadcaster,
    );
    match run_store {
        Some(store) => Arc::new(orchestrator.with_run_store(store)),
        None => Arc::new(orchestrator),
    }
}

// === OpenAPI Definition ===

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Foundry API",
        version = "1.0.0",
        description = "Generation pipeline: start runs and follow their progress"
    ),
    paths(
        api::runs::start_run,
        api::runs::list_runs,
        api::runs::get_run,
        api::config::get_config,
        api::config::update_config,
        get_requirement_schema
    ),
    components(
        schemas(
            api::ApiResponse,
            api::runs::StartRunRequest,
            api::runs::StartRunResponse,
            api::runs::RunView,
            api::runs::RunListResponse,
            api::runs::RunSummary,
            config::PersistedConfig,
            config::ConfigResponse,
            config::ConfigDefaults
        )
    ),
    tags(
        (name = "runs", description = "Generation runs and their progress"),
        (name = "config", description = "Server configuration"),
        (name = "schema", description = "Input schemas")
    )
)]
struct ApiDoc;

async fn serve_openapi() -> Response {
    match ApiDoc::openapi().to_json() {
        Ok(spec) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "application/json")],
            Body::from(spec),
        )
            .into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

/// JSON schema of the run requirement
#[utoipa::path(
    get,
    path = "/api/v1/schema/requirement",
    tag = "schema",
    responses(
        (status = 200, description = "JSON schema of the requirement input")
    )
)]
async fn get_requirement_schema() -> Json<serde_json::Value> {
    Json(serde_json::to_value(requirement_schema()).unwrap_or_default())
}

pub fn build_router(state: SharedState) -> Router {
    Router::new()
        .nest("/api/v1/runs", api::runs::run_routes())
        .route(
            "/api/v1/config",
            get(api::config::get_config).patch(api::config::update_config),
        )
        .route("/api/v1/schema/requirement", get(get_requirement_schema))
        .route("/api/v1/openapi.json", get(serve_openapi))
        .with_state(state)
}

// === CLI ===

#[derive(Parser, Clone)]
#[command(author, version, about = "Foundry - application generation pipeline")]
struct Args {
    /// Emit logs as JSON lines
    #[arg(long, global = true, env = "FOUNDRY_LOG_JSON")]
    log_json: bool,
    /// Log level when RUST_LOG is unset
    #[arg(long, global = true, env = "FOUNDRY_LOG", default_value = "info")]
    log_level: Level,
    #[command(subcommand)]
    command: Option<CliCommand>,
}

#[derive(Subcommand, Clone)]
enum CliCommand {
    /// Start the Foundry server (default)
    Serve {
        /// Port to listen on
        #[arg(short, long, env = "FOUNDRY_PORT", default_value = "8080")]
        port: u16,
        /// Address to bind
        #[arg(long, default_value = "127.0.0.1")]
        host: IpAddr,
        /// Where deliverables are written
        #[arg(long, env = "FOUNDRY_OUT_DIR")]
        out_dir: Option<PathBuf>,
        /// Optional stages generated at once
        #[arg(long)]
        max_concurrency: Option<usize>,
    },
    /// Run the pipeline once on a requirement file (no server)
    Run {
        /// Requirement JSON file
        requirement: PathBuf,
        /// Run options JSON file; every stage is enabled when omitted
        #[arg(short, long)]
        options: Option<PathBuf>,
        /// Generate optional stages one at a time
        #[arg(long)]
        sequential: bool,
        /// Where deliverables are written
        #[arg(long, env = "FOUNDRY_OUT_DIR")]
        out_dir: Option<PathBuf>,
    },
    /// Print the JSON schema of the requirement input
    Schema,
}

async fn serve(
    host: IpAddr,
    port: u16,
    out_dir: Option<PathBuf>,
    max_concurrency: Option<usize>,
) -> anyhow::Result<()> {
    let mut config = PersistedConfig::load().await;
    config.merge(PersistedConfig {
        out_dir,
        max_concurrency,
        ..Default::default()
    });
    config.validate().map_err(anyhow::Error::msg)?;

    let db = RunDb::open_at(DATABASE_PATH)?;
    let run_store: Arc<dyn RunStore> = Arc::new(SqliteRunStore::new(&db));
    let state: SharedState = Arc::new(AppState::new(
        config,
        Some(run_store),
        Some(PathBuf::from(CONFIG_PATH)),
    ));

    let app = build_router(state);
    let addr = SocketAddr::new(host, port);
    tracing::info!(%addr, "Foundry server listening");

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

/// Flags of the `run` subcommand. `--sequential` matches
/// `OrchestratorConfig::sequential()`: one stage at a time, no retries.
fn run_overrides(out_dir: Option<PathBuf>, sequential: bool) -> PersistedConfig {
    PersistedConfig {
        out_dir,
        max_concurrency: sequential.then_some(1),
        max_retries: sequential.then_some(0),
        ..Default::default()
    }
}

async fn run_once(
    requirement_path: PathBuf,
    options_path: Option<PathBuf>,
    sequential: bool,
    out_dir: Option<PathBuf>,
) -> anyhow::Result<()> {
    let content = tokio::fs::read_to_string(&requirement_path).await?;
    let requirement: Requirement = serde_json::from_str(&content)?;
    requirement.validate()?;

    let options: RunOptions = match options_path {
        Some(path) => serde_json::from_str(&tokio::fs::read_to_string(path).await?)?,
        None => RunOptions::default(),
    };

    let mut config = PersistedConfig::load().await;
    config.merge(run_overrides(out_dir, sequential));
    config.validate().map_err(anyhow::Error::msg)?;

    let broadcaster = Arc::new(ProgressBroadcaster::new());
    let orchestrator = build_orchestrator(&config, broadcaster.clone(), None);

    let run_id = new_run_id();
    let mut subscription = broadcaster.subscribe(&run_id);
    let handle = orchestrator.spawn_run(&run_id, requirement, options)?;

    let printer = tokio::spawn(async move {
        while let Some(event) = subscription.recv().await {
            println!("[{:>3}%] {:<16} {}", event.percent, event.stage.as_str(), event.message);
            if event.is_terminal() {
                break;
            }
        }
    });

    let result = handle.join.await?;
    broadcaster.close_run(&run_id);
    printer.await.ok();

    println!();
    println!("Run:        {}", result.run_id);
    println!("Stage:      {}", result.final_stage);
    println!(
        "Generated:  {} components, {} endpoints, {} tables",
        result.metrics.component_count,
        result.metrics.endpoint_count,
        result.metrics.schema_table_count
    );
    if let Some(url) = &result.deployment_url {
        println!("Deployed:   {}", url);
    }
    for warning in &result.warnings {
        println!("Warning:    {}", warning);
    }
    for error in &result.errors {
        println!("Error:      {}", error);
    }

    if result.is_failed() {
        anyhow::bail!("run {} failed", result.run_id);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();
    telemetry::init_tracing(args.log_json, args.log_level);

    match args.command {
        Some(CliCommand::Serve {
            port,
            host,
            out_dir,
            max_concurrency,
        }) => serve(host, port, out_dir, max_concurrency).await,
        Some(CliCommand::Run {
            requirement,
            options,
            sequential,
            out_dir,
        }) => run_once(requirement, options, sequential, out_dir).await,
        Some(CliCommand::Schema) => {
            println!("{}", serde_json::to_string_pretty(&requirement_schema())?);
            Ok(())
        }
        None => serve(IpAddr::from([127, 0, 0, 1]), 8080, None, None).await,
    }
}
