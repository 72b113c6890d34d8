use crate::chat_orchestrator::ChatOrchestrator;
use crate::errors::AppError;
use crate::models::{ChatMessageRequest, ChatMessageResponse, Message};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

/// Shared application state injected into handlers.
pub struct AppState {
    /// The turn pipeline; the only entry point into chat logic.
    pub orchestrator: Arc<ChatOrchestrator>,
}

/// Health check endpoint.
///
/// Returns the service status and version. Bypasses rate limiting.
pub async fn health() -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::OK,
        Json(json!({
            "status": "healthy",
            "service": "inference-core",
            "version": env!("CARGO_PKG_VERSION"),
        })),
    )
}

/// POST /api/v1/chat
///
/// Main endpoint for interacting with the bot. Grounds the answer in
/// retrieved context and returns the sources used.
///
/// # Arguments
///
/// * `state` - The application state.
/// * `request` - The chat turn request.
///
/// # Returns
///
/// * `Result<Json<ChatMessageResponse>, AppError>` - The generated answer,
///   its sources, and the conversation id.
pub async fn chat(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ChatMessageRequest>,
) -> Result<Json<ChatMessageResponse>, AppError> {
    tracing::info!(
        "POST /chat - client: {}, conversation: {:?}",
        request.client_id,
        request.conversation_id
    );

    let response = state.orchestrator.chat(request).await?;
    Ok(Json(response))
}

/// GET /api/v1/chat/:conversation_id
///
/// Retrieves the full ordered history of a conversation. Unknown
/// conversations yield an empty list rather than an error.
pub async fn chat_history(
    State(state): State<Arc<AppState>>,
    Path(conversation_id): Path<Uuid>,
) -> Result<Json<Vec<Message>>, AppError> {
    tracing::info!("GET /chat/{}", conversation_id);

    let history = state
        .orchestrator
        .conversation_history(conversation_id)
        .await?;
    Ok(Json(history))
}
