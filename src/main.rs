use axum::{
    Router,
    middleware as axum_middleware,
    routing::{get, post},
};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use aegis::config::Config;
use aegis::db;
use aegis::services::{
    AesGcmUriDecryptor, Architect, Investigator, LineageEngine, Notifier, OpenAiAgentClient,
    OpenAiCompatibleClient, Orchestrator, Scanner, start_scanner,
};
use aegis::{AppState, handlers, middleware};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load()?;

    let log_filter = tracing_subscriber::EnvFilter::new(&config.logging.level);
    tracing_subscriber::registry().with(log_filter).with(tracing_subscriber::fmt::layer()).init();

    tracing::info!("Aegis starting up");
    tracing::info!("configuration loaded successfully");

    let pool = db::create_pool(&config.database.path).await?;
    tracing::info!("database pool created, migrations applied");

    let notifier = Arc::new(Notifier::new());
    let lineage = Arc::new(LineageEngine::new(pool.clone()));

    let architect_client: Option<Arc<dyn aegis::services::LLMChatClient>> =
        config.llm.api_key.clone().map(|key| {
            Arc::new(OpenAiCompatibleClient::new(config.llm.api_base.clone(), key, config.llm.model.clone()))
                as Arc<dyn aegis::services::LLMChatClient>
        });
    if architect_client.is_none() {
        tracing::warn!("no LLM API key configured; Architect will use deterministic fallback diagnosis only");
    }
    let architect = Architect::new(architect_client);

    // Orchestrator owns its own LineageEngine handle (cheap: wraps the same pool).
    let orchestrator =
        Arc::new(Orchestrator::new(pool.clone(), architect, LineageEngine::new(pool.clone()), notifier.clone()));

    let investigator_client: Option<Arc<dyn aegis::services::ToolCallingLLMClient>> =
        config.llm.api_key.clone().map(|key| {
            Arc::new(OpenAiAgentClient::new(config.llm.api_base.clone(), key, config.llm.model.clone()))
                as Arc<dyn aegis::services::ToolCallingLLMClient>
        });
    if investigator_client.is_none() {
        tracing::warn!("no LLM API key configured; Investigator will use heuristic fallback discovery only");
    }
    let investigator = Arc::new(Investigator::new(pool.clone(), investigator_client));

    let decryptor = Arc::new(AesGcmUriDecryptor::new(config.security.encryption_key.clone()));
    let scanner = Arc::new(Scanner::new(
        pool.clone(),
        orchestrator.clone(),
        lineage.clone(),
        notifier.clone(),
        decryptor,
        config.scanner.table_concurrency,
    ));

    let _scanner_handles = start_scanner(scanner.clone(), investigator.clone(), notifier.clone(), &config.scanner);
    tracing::info!(
        scan_interval_seconds = config.scanner.scan_interval_seconds,
        lineage_refresh_seconds = config.scanner.lineage_refresh_seconds,
        rediscovery_interval_seconds = config.scanner.rediscovery_interval_seconds,
        "scanner cadences started"
    );

    let app_state = Arc::new(AppState {
        db: pool.clone(),
        config: config.clone(),
        notifier,
        lineage,
        orchestrator,
        investigator,
        scanner,
    });

    let auth_state = middleware::AuthState { api_key: config.security.api_key.clone() };

    let public_routes = Router::new().route("/health", get(handlers::health::health)).with_state(app_state.clone());

    let protected_routes = Router::new()
        .route("/api/v1/connections", get(handlers::connections::list).post(handlers::connections::create))
        .route(
            "/api/v1/connections/:id",
            get(handlers::connections::get).put(handlers::connections::update).delete(handlers::connections::delete),
        )
        .route("/api/v1/connections/:id/test", post(handlers::connections::test))
        .route("/api/v1/connections/:id/discover", post(handlers::connections::discover))
        .route("/api/v1/connections/:id/confirm-discovery", post(handlers::connections::confirm_discovery))
        .route("/api/v1/tables", get(handlers::tables::list).post(handlers::tables::create))
        .route(
            "/api/v1/tables/:id",
            get(handlers::tables::get).put(handlers::tables::update).delete(handlers::tables::delete),
        )
        .route("/api/v1/incidents", get(handlers::incidents::list))
        .route("/api/v1/incidents/:id", get(handlers::incidents::get))
        .route("/api/v1/incidents/:id/report", get(handlers::incidents::report))
        .route("/api/v1/incidents/:id/approve", post(handlers::incidents::approve))
        .route("/api/v1/incidents/:id/dismiss", post(handlers::incidents::dismiss))
        .route("/api/v1/lineage/graph", get(handlers::lineage::graph))
        .route("/api/v1/lineage/:table/upstream", get(handlers::lineage::upstream))
        .route("/api/v1/lineage/:table/downstream", get(handlers::lineage::downstream))
        .route("/api/v1/lineage/:table/blast-radius", get(handlers::lineage::blast_radius))
        .route("/api/v1/stats", get(handlers::stats::stats))
        .route("/api/v1/scan/trigger", post(handlers::scan::trigger))
        .route("/ws", get(handlers::ws::stream))
        .with_state(app_state)
        .layer(axum_middleware::from_fn_with_state(auth_state, middleware::auth_middleware));

    let app = Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .layer(tower_http::cors::CorsLayer::permissive());

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("server listening on http://{}", addr);
    tracing::info!("Aegis is ready to serve requests");

    axum::serve(listener, app).await?;

    Ok(())
}
