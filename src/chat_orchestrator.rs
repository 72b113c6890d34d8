use crate::analysis_worker::{AnalysisDispatcher, AnalysisJob};
use crate::conversation_store::{ConversationStore, PRIMARY_CHAT_SLUG};
use crate::errors::{AppError, ResultExt};
use crate::key_locks::KeyedLocks;
use crate::llm_client::ChatModel;
use crate::models::{
    ChatMessageRequest, ChatMessageResponse, Message, MessageRole, SourceDocument,
};
use crate::semantic_client::SemanticSearchClient;
use std::sync::Arc;
use uuid::Uuid;

/// Orchestrates one chat turn:
/// resolve conversation -> retrieve context -> resolve prompt -> generate ->
/// persist -> dispatch analysis -> respond.
///
/// The only component aware of turn sequencing. Store and analyzer never
/// talk to each other directly; they meet in persisted state.
pub struct ChatOrchestrator {
    store: Arc<dyn ConversationStore>,
    search: SemanticSearchClient,
    model: Arc<dyn ChatModel>,
    dispatcher: AnalysisDispatcher,
    /// Serializes whole turns per conversation id. A turn is a read of the
    /// full history followed by a full-sequence overwrite; racing turns on
    /// the same conversation would drop each other's messages.
    turn_locks: KeyedLocks,
    history_window: usize,
}

impl ChatOrchestrator {
    pub fn new(
        store: Arc<dyn ConversationStore>,
        search: SemanticSearchClient,
        model: Arc<dyn ChatModel>,
        dispatcher: AnalysisDispatcher,
        history_window: usize,
    ) -> Self {
        Self {
            store,
            search,
            model,
            dispatcher,
            turn_locks: KeyedLocks::new(),
            history_window,
        }
    }

    /// Runs one turn end to end. Retrieval faults degrade to empty context;
    /// any other fault fails the turn as a single generic error with no
    /// half-written transcript.
    pub async fn chat(
        &self,
        request: ChatMessageRequest,
    ) -> Result<ChatMessageResponse, AppError> {
        if request.query_text.trim().is_empty() {
            return Err(AppError::BadRequest("query_text cannot be empty".to_string()));
        }
        if request.client_id.trim().is_empty() {
            return Err(AppError::BadRequest("client_id cannot be empty".to_string()));
        }

        // 1. Resolve conversation identity under the per-conversation turn
        // lock. For a fresh conversation the id does not exist before the
        // resolve, so the lock is taken right after creation instead.
        let (conversation, _turn_guard) = match request.conversation_id {
            Some(id) => {
                let guard = self.turn_locks.acquire(id).await;
                let conversation = self
                    .store
                    .resolve_or_create(&request.client_id, Some(id))
                    .await?;
                (conversation, guard)
            }
            None => {
                let conversation = self
                    .store
                    .resolve_or_create(&request.client_id, None)
                    .await?;
                let guard = self.turn_locks.acquire(conversation.id).await;
                (conversation, guard)
            }
        };
        let history = conversation.messages().to_vec();

        tracing::debug!(
            "Turn on conversation {} ({} prior messages)",
            conversation.id,
            history.len()
        );

        // 2. Retrieve context. Best-effort: this step can never fail the turn.
        let context_docs = self
            .search
            .search_or_empty(&request.query_text, &request.client_id)
            .await;

        // 3. Resolve the system prompt and substitute the context
        let template = self
            .store
            .resolve_system_prompt(&request.client_id, PRIMARY_CHAT_SLUG)
            .await?;
        let context_text = render_context(&context_docs);
        let system_prompt = template.replace("{context_text}", &context_text);

        // 4. Generate from the trailing window; single attempt
        let window_start = history.len().saturating_sub(self.history_window);
        let answer = self
            .model
            .generate(&system_prompt, &history[window_start..], &request.query_text)
            .await?;

        // 5. Persist the full sequence with both new messages
        let mut updated_history = history;
        updated_history.push(Message::now(MessageRole::User, request.query_text.clone()));
        updated_history.push(Message::now(MessageRole::Assistant, answer.clone()));
        self.store
            .append_turn(conversation.id, &updated_history, None)
            .await
            .context("Failed to persist chat turn")?;

        // 6. Dispatch background lead analysis. The response never waits on
        // it, and nothing on this path may fail the turn.
        match self.store.catalogs().await {
            Ok(catalog) => {
                self.dispatcher.dispatch(AnalysisJob {
                    lead_id: conversation.lead_id,
                    history: updated_history,
                    catalog,
                });
            }
            Err(e) => {
                tracing::error!("Skipping lead analysis, catalog fetch failed: {}", e);
            }
        }

        // 7. Respond
        Ok(ChatMessageResponse {
            answer,
            sources: context_docs,
            conversation_id: conversation.id,
        })
    }

    /// Full ordered history for a conversation; empty when it does not exist.
    pub async fn conversation_history(
        &self,
        conversation_id: Uuid,
    ) -> Result<Vec<Message>, AppError> {
        let conversation = self.store.get_conversation(conversation_id).await?;
        Ok(conversation.map(|c| c.messages.0).unwrap_or_default())
    }
}

/// Joins ranked snippets into the `{context_text}` substitution.
fn render_context(docs: &[SourceDocument]) -> String {
    docs.iter()
        .enumerate()
        .map(|(i, doc)| format!("Source {}: {}", i + 1, doc.body_content))
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(body: &str) -> SourceDocument {
        SourceDocument {
            content_id: "doc-1".to_string(),
            title: None,
            body_content: body.to_string(),
            score: 0.9,
            metadata: json!({}),
        }
    }

    #[test]
    fn context_rendering_numbers_sources() {
        let rendered = render_context(&[doc("primer pasaje"), doc("segundo pasaje")]);
        assert_eq!(rendered, "Source 1: primer pasaje\n\nSource 2: segundo pasaje");
    }

    #[test]
    fn empty_context_renders_empty() {
        assert_eq!(render_context(&[]), "");
    }
}
