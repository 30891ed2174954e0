use anyhow::Context;
use axum::http::{header, HeaderValue, Method};
use analyst::actors::agent_harness::{AgentHarness, HarnessConfig};
use analyst::actors::conductor::{
    HarnessWorker, LlmSupervisor, Orchestrator, WorkerRegistry,
};
use analyst::actors::model_config::ModelRegistry;
use analyst::actors::model_gateway::{OpenAiGenericGateway, SharedModelGateway};
use analyst::actors::rag::{DocAnalystPort, FilingStore, RagChain};
use analyst::actors::search::{SearchPort, TavilySearch};
use analyst::api;
use analyst::app_state::AppState;
use analyst::config::ServiceConfig;
use shared_types::{WORKER_DOC_ANALYST, WORKER_SEARCH};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing_subscriber::EnvFilter;

fn load_env_file() {
    let cwd = match std::env::current_dir() {
        Ok(dir) => dir,
        Err(e) => {
            tracing::warn!(error = %e, "Could not determine current directory for .env lookup");
            return;
        }
    };

    let mut current = cwd.clone();
    loop {
        let candidate = current.join(".env");
        if candidate.exists() {
            match dotenvy::from_path(&candidate) {
                Ok(_) => {
                    tracing::info!(path = %candidate.display(), "Loaded environment from .env");
                }
                Err(e) => {
                    tracing::warn!(
                        path = %candidate.display(),
                        error = %e,
                        "Failed to load .env file"
                    );
                }
            }
            return;
        }

        if !current.pop() {
            break;
        }
    }

    tracing::info!(
        cwd = %cwd.display(),
        "No .env file found in current directory or ancestors; using process environment only"
    );
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    load_env_file();
    let config = ServiceConfig::from_env().context("invalid ANALYST_* configuration")?;
    tracing::info!(?config, "Starting financial analyst API server");

    let model_registry = ModelRegistry::new();
    tracing::info!(
        models = ?model_registry.available_model_ids(),
        "Model catalog loaded"
    );
    let gateway: SharedModelGateway = Arc::new(
        OpenAiGenericGateway::new(model_registry).context("failed to build model gateway")?,
    );

    // Filing index is built once and shared by every run
    let store = FilingStore::open(&config.filing_db)
        .with_context(|| format!("failed to open filing store at {}", config.filing_db))?;
    let rag = RagChain::new(store, gateway.clone()).with_top_k(config.retrieval_top_k);
    if let Err(e) = rag.ingest_file(&config.filing_path).await {
        tracing::warn!(
            path = %config.filing_path.display(),
            error = %e,
            "Filing not ingested; DocAnalyst will report missing context"
        );
    }

    let search = TavilySearch::new(config.search_max_results)
        .context("failed to build search client")?;

    let team = vec![WORKER_SEARCH.to_string(), WORKER_DOC_ANALYST.to_string()];
    let harness_config = HarnessConfig {
        max_steps: config.worker_max_steps,
        ..HarnessConfig::default()
    };
    let search_worker = HarnessWorker::new(
        WORKER_SEARCH,
        AgentHarness::with_config(
            SearchPort::new(Arc::new(search), team.clone()),
            gateway.clone(),
            harness_config.clone(),
        ),
    );
    let doc_worker = HarnessWorker::new(
        WORKER_DOC_ANALYST,
        AgentHarness::with_config(
            DocAnalystPort::new(Arc::new(rag), team),
            gateway.clone(),
            harness_config,
        ),
    );
    let workers = WorkerRegistry::new()
        .register(Arc::new(search_worker))
        .register(Arc::new(doc_worker));

    let orchestrator = Arc::new(Orchestrator::new(
        Arc::new(LlmSupervisor::new(gateway)),
        workers,
        config.run_policy(),
    ));
    let app_state = Arc::new(AppState::new(orchestrator, config.max_retained_runs));
    app_state
        .ensure_conductor()
        .await
        .map_err(anyhow::Error::msg)
        .context("failed to spawn ConductorActor")?;

    let allowed_origins = config
        .allowed_origins
        .iter()
        .map(|origin| {
            HeaderValue::from_str(origin).with_context(|| format!("invalid CORS origin {origin}"))
        })
        .collect::<anyhow::Result<Vec<_>>>()?;

    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed_origins))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT, header::AUTHORIZATION])
        .max_age(std::time::Duration::from_secs(3600));

    let app = api::router()
        .with_state(api::ApiState { app_state })
        .layer(cors);

    tracing::info!(bind_addr = %config.bind_addr, "Starting HTTP server");
    let listener = TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;
    axum::serve(listener, app).await?;
    Ok(())
}
