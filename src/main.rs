mod analysis_worker;
mod chat_orchestrator;
mod config;
mod conversation_store;
mod db;
mod errors;
mod extraction;
mod handlers;
mod key_locks;
mod lead_analyzer;
mod llm_client;
mod models;
mod semantic_client;

use axum::{
    http::{header, StatusCode},
    response::{Html, IntoResponse},
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_governor::{
    governor::GovernorConfigBuilder, key_extractor::SmartIpKeyExtractor, GovernorLayer,
};
use tower_http::{cors::CorsLayer, limit::RequestBodyLimitLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::analysis_worker::spawn_analysis_workers;
use crate::chat_orchestrator::ChatOrchestrator;
use crate::config::Config;
use crate::conversation_store::{ConversationStore, PgConversationStore};
use crate::db::Database;
use crate::handlers::AppState;
use crate::lead_analyzer::LeadAnalyzer;
use crate::llm_client::{ChatModel, GeminiClient};
use crate::semantic_client::SemanticSearchClient;

/// Serves `openapi.yml` from the working directory; 404 when missing.
async fn serve_openapi_spec() -> impl IntoResponse {
    match tokio::fs::read_to_string("openapi.yml").await {
        Ok(content) => {
            (StatusCode::OK, [(header::CONTENT_TYPE, "text/yaml")], content).into_response()
        }
        Err(_) => (StatusCode::NOT_FOUND, "OpenAPI spec not found").into_response(),
    }
}

/// Minimal Swagger UI page pointed at the spec route above.
async fn serve_swagger_ui() -> Html<&'static str> {
    Html(
        r##"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <title>inference-core - Swagger UI</title>
    <link rel="stylesheet" href="https://unpkg.com/swagger-ui-dist@5/swagger-ui.css">
</head>
<body>
    <div id="swagger-ui"></div>
    <script src="https://unpkg.com/swagger-ui-dist@5/swagger-ui-bundle.js"></script>
    <script>
        window.onload = () => {
            SwaggerUIBundle({ url: "/api-docs/openapi.yml", dom_id: "#swagger-ui" });
        };
    </script>
</body>
</html>"##,
    )
}

/// Composition root: every service is built exactly once here and injected;
/// no module holds shared state of its own.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "inference_core=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;

    let db = Database::new(&config.database_url).await?;
    tracing::info!("Database connection pool established");

    let search = SemanticSearchClient::new(
        config.semantic_adapter_url.clone(),
        config.search_top_k,
        config.search_timeout_secs,
    )
    .map_err(|e| anyhow::anyhow!(e.to_string()))?;
    tracing::info!("Semantic search client ready: {}", config.semantic_adapter_url);

    let model: Arc<dyn ChatModel> = Arc::new(
        GeminiClient::new(
            config.gemini_base_url.clone(),
            config.google_api_key.clone(),
            config.gemini_model.clone(),
        )
        .map_err(|e| anyhow::anyhow!(e.to_string()))?,
    );
    tracing::info!("Gemini client ready: {}", config.gemini_model);

    // One store shared by the turn pipeline and the analysis workers; the
    // worker pool bounds how much background scoring can be in flight.
    let store: Arc<dyn ConversationStore> = Arc::new(PgConversationStore::new(
        db.pool.clone(),
        config.lead_bootstrap,
    ));
    let analyzer = Arc::new(LeadAnalyzer::new(model.clone()));
    let dispatcher = spawn_analysis_workers(
        config.analysis_workers,
        config.analysis_queue_capacity,
        analyzer,
        store.clone(),
    );

    let orchestrator = Arc::new(ChatOrchestrator::new(
        store,
        search,
        model,
        dispatcher,
        config.history_window,
    ));
    let app_state = Arc::new(AppState { orchestrator });

    // 10 req/s per IP with a burst of 20, keyed on the forwarded address
    let governor_conf = Arc::new(
        GovernorConfigBuilder::default()
            .per_second(10)
            .burst_size(20)
            .key_extractor(SmartIpKeyExtractor)
            .finish()
            .unwrap(),
    );

    let api_routes = Router::new()
        .route("/docs", get(serve_swagger_ui))
        .route("/api-docs/openapi.yml", get(serve_openapi_spec))
        .route("/api/v1/chat", post(handlers::chat))
        .route("/api/v1/chat/:conversation_id", get(handlers::chat_history))
        .layer(
            ServiceBuilder::new()
                // 1MB cap: a chat payload has no business being bigger
                .layer(RequestBodyLimitLayer::new(1024 * 1024))
                .layer(GovernorLayer {
                    config: governor_conf,
                }),
        );

    // /health sits outside the rate-limited group so orchestrators can poll it
    let app = Router::new()
        .route("/health", get(handlers::health))
        .merge(api_routes)
        .with_state(app_state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
