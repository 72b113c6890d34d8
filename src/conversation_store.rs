use crate::config::LeadBootstrap;
use crate::errors::AppError;
use crate::key_locks::KeyedLocks;
use crate::models::{Catalog, Conversation, Message, MessageCounts, ScoringResult};
use async_trait::async_trait;
use bigdecimal::BigDecimal;
use moka::future::Cache;
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, QueryBuilder};
use std::str::FromStr;
use std::time::Duration;
use uuid::Uuid;

/// Prompt slug used by the chat turn pipeline.
pub const PRIMARY_CHAT_SLUG: &str = "primary_chat";

/// Platform tag stamped on conversations created by this service.
pub const WEBCHAT_PLATFORM: &str = "webchat";

/// Acquisition source id for leads bootstrapped from web chat.
const WEBCHAT_SOURCE_ID: i32 = 14;

/// Last-resort system prompt when neither a client-specific nor a global
/// template is active. Must contain the `{context_text}` marker.
pub const DEFAULT_SYSTEM_PROMPT: &str =
    "Eres un asistente técnico. Responde basándote exclusivamente en el contexto:\n\n{context_text}";

/// Persistence boundary for conversations, leads, prompt templates, and
/// categorical catalogs.
///
/// The orchestrator and the analysis workers only talk to each other through
/// this interface; behind it sits Postgres in production and an in-memory
/// double in tests.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Returns the conversation for `conversation_id` unchanged when it
    /// exists; otherwise creates a lead (per the bootstrap policy) and a
    /// conversation atomically and returns the new row.
    async fn resolve_or_create(
        &self,
        client_id: &str,
        conversation_id: Option<Uuid>,
    ) -> Result<Conversation, AppError>;

    /// Fetches a conversation by id.
    async fn get_conversation(
        &self,
        conversation_id: Uuid,
    ) -> Result<Option<Conversation>, AppError>;

    /// Overwrites the stored sequence with the given (already-appended) full
    /// sequence and recomputes the counters from it. Callers read-modify-write
    /// the complete history; calls are serialized per conversation id.
    async fn append_turn(
        &self,
        conversation_id: Uuid,
        messages: &[Message],
        summary: Option<&str>,
    ) -> Result<(), AppError>;

    /// Tiered template lookup: client-specific active prompt, then global
    /// active prompt, then the hardcoded default.
    async fn resolve_system_prompt(&self, client_id: &str, slug: &str)
        -> Result<String, AppError>;

    /// Current whitelist of valid categorical values.
    async fn catalogs(&self) -> Result<Catalog, AppError>;

    /// Writes the five scores unconditionally and each extracted profile
    /// field only when present. A null extraction never clears a stored
    /// value. Out-of-range scores are rejected before any write.
    async fn merge_lead_update(
        &self,
        lead_id: Uuid,
        result: &ScoringResult,
    ) -> Result<(), AppError>;
}

/// Postgres-backed `ConversationStore`.
pub struct PgConversationStore {
    pool: PgPool,
    lead_bootstrap: LeadBootstrap,
    conversation_locks: KeyedLocks,
    lead_locks: KeyedLocks,
    /// Resolved prompt per "(client_id):(slug)" (5 minute TTL).
    prompt_cache: Cache<String, String>,
    /// Single-entry catalog snapshot (10 minute TTL).
    catalog_cache: Cache<(), Catalog>,
}

impl PgConversationStore {
    pub fn new(pool: PgPool, lead_bootstrap: LeadBootstrap) -> Self {
        Self {
            pool,
            lead_bootstrap,
            conversation_locks: KeyedLocks::new(),
            lead_locks: KeyedLocks::new(),
            prompt_cache: Cache::builder()
                .time_to_live(Duration::from_secs(300))
                .max_capacity(1_000)
                .build(),
            catalog_cache: Cache::builder()
                .time_to_live(Duration::from_secs(600))
                .max_capacity(1)
                .build(),
        }
    }

    /// Placeholder lead name until analysis extracts a real one.
    fn placeholder_name(client_id: &str) -> String {
        let prefix: String = client_id.chars().take(8).collect();
        format!("User {}", prefix)
    }
}

#[async_trait]
impl ConversationStore for PgConversationStore {
    async fn resolve_or_create(
        &self,
        client_id: &str,
        conversation_id: Option<Uuid>,
    ) -> Result<Conversation, AppError> {
        if let Some(id) = conversation_id {
            if let Some(conversation) = self.get_conversation(id).await? {
                return Ok(conversation);
            }
        }

        // Not found or not provided: create lead + conversation in one
        // transaction so a failure leaves no orphan lead behind.
        let mut tx = self.pool.begin().await?;

        let existing_lead = match self.lead_bootstrap {
            LeadBootstrap::AttachClientLead => sqlx::query_scalar::<_, Uuid>(
                "SELECT id FROM lead_leads WHERE client_id = $1 ORDER BY created_at ASC LIMIT 1",
            )
            .bind(client_id)
            .fetch_optional(&mut *tx)
            .await?,
            LeadBootstrap::LeadPerConversation => None,
        };

        let lead_id = match existing_lead {
            Some(id) => id,
            None => {
                sqlx::query_scalar::<_, Uuid>(
                    r#"
                    INSERT INTO lead_leads (id, client_id, source_id, full_name)
                    VALUES ($1, $2, $3, $4)
                    RETURNING id
                    "#,
                )
                .bind(Uuid::new_v4())
                .bind(client_id)
                .bind(WEBCHAT_SOURCE_ID)
                .bind(Self::placeholder_name(client_id))
                .fetch_one(&mut *tx)
                .await?
            }
        };

        let new_id = conversation_id.unwrap_or_else(Uuid::new_v4);
        let conversation = sqlx::query_as::<_, Conversation>(
            r#"
            INSERT INTO lead_conversations (id, lead_id, platform, messages)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            "#,
        )
        .bind(new_id)
        .bind(lead_id)
        .bind(WEBCHAT_PLATFORM)
        .bind(Json(Vec::<Message>::new()))
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::info!(
            "Created conversation {} for lead {} (client {})",
            conversation.id,
            lead_id,
            client_id
        );
        Ok(conversation)
    }

    async fn get_conversation(
        &self,
        conversation_id: Uuid,
    ) -> Result<Option<Conversation>, AppError> {
        let conversation = sqlx::query_as::<_, Conversation>(
            "SELECT * FROM lead_conversations WHERE id = $1",
        )
        .bind(conversation_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(conversation)
    }

    async fn append_turn(
        &self,
        conversation_id: Uuid,
        messages: &[Message],
        summary: Option<&str>,
    ) -> Result<(), AppError> {
        // Serialize writers on the same conversation; concurrent full-sequence
        // overwrites would otherwise drop each other's messages.
        let _guard = self.conversation_locks.acquire(conversation_id).await;

        let counts = MessageCounts::of(messages);
        let result = sqlx::query(
            r#"
            UPDATE lead_conversations
            SET
                messages = $1,
                summary = COALESCE($2, summary),
                updated_at = now(),
                last_message_at = now(),
                total_messages = $3,
                lead_messages = $4,
                bot_messages = $5
            WHERE id = $6
            "#,
        )
        .bind(Json(messages.to_vec()))
        .bind(summary)
        .bind(counts.total)
        .bind(counts.user)
        .bind(counts.assistant)
        .bind(conversation_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!(
                "Conversation {} not found",
                conversation_id
            )));
        }

        Ok(())
    }

    async fn resolve_system_prompt(
        &self,
        client_id: &str,
        slug: &str,
    ) -> Result<String, AppError> {
        let cache_key = format!("{}:{}", client_id, slug);
        if let Some(cached) = self.prompt_cache.get(&cache_key).await {
            return Ok(cached);
        }

        // 1. Client-specific active prompt
        let client_prompt = sqlx::query_scalar::<_, String>(
            "SELECT prompt_text FROM lead_ai_prompts
             WHERE client_id = $1 AND slug = $2 AND is_active = true
             LIMIT 1",
        )
        .bind(client_id)
        .bind(slug)
        .fetch_optional(&self.pool)
        .await?;

        // 2. Global active prompt (client_id IS NULL)
        let resolved = match client_prompt {
            Some(text) => text,
            None => {
                let global_prompt = sqlx::query_scalar::<_, String>(
                    "SELECT prompt_text FROM lead_ai_prompts
                     WHERE client_id IS NULL AND slug = $1 AND is_active = true
                     LIMIT 1",
                )
                .bind(slug)
                .fetch_optional(&self.pool)
                .await?;

                // 3. Hardcoded safety fallback
                global_prompt.unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string())
            }
        };

        self.prompt_cache
            .insert(cache_key, resolved.clone())
            .await;
        Ok(resolved)
    }

    async fn catalogs(&self) -> Result<Catalog, AppError> {
        if let Some(cached) = self.catalog_cache.get(&()).await {
            return Ok(cached);
        }

        let currencies = sqlx::query_scalar::<_, String>(
            "SELECT code FROM lead_currencies WHERE is_active = true",
        )
        .fetch_all(&self.pool)
        .await?;

        let contact_preferences = sqlx::query_as::<_, (i32, String)>(
            "SELECT id, name FROM lead_contact_preferences WHERE is_active = true",
        )
        .fetch_all(&self.pool)
        .await?;

        let catalog = Catalog {
            currencies: currencies.into_iter().collect(),
            contact_preferences: contact_preferences.into_iter().collect(),
        };

        self.catalog_cache.insert((), catalog.clone()).await;
        Ok(catalog)
    }

    async fn merge_lead_update(
        &self,
        lead_id: Uuid,
        result: &ScoringResult,
    ) -> Result<(), AppError> {
        result
            .validate()
            .map_err(AppError::BadRequest)?;

        let _guard = self.lead_locks.acquire(lead_id).await;

        // Scores are always written; profile fields join the SET list only
        // when extraction produced a value.
        let mut query: QueryBuilder<Postgres> =
            QueryBuilder::new("UPDATE lead_leads SET score_engagement = ");
        query.push_bind(result.score_engagement);
        query.push(", score_finance = ");
        query.push_bind(result.score_finance);
        query.push(", score_timeline = ");
        query.push_bind(result.score_timeline);
        query.push(", score_match = ");
        query.push_bind(result.score_match);
        query.push(", score_info = ");
        query.push_bind(result.score_info);

        if let Some(name) = &result.extracted_name {
            query.push(", full_name = ");
            query.push_bind(name.clone());
        }
        if let Some(email) = &result.extracted_email {
            query.push(", email = ");
            query.push_bind(email.clone());
        }
        if let Some(phone) = &result.extracted_phone {
            query.push(", phone = ");
            query.push_bind(phone.clone());
        }
        if let Some(income) = decimal_of(result.extracted_income) {
            query.push(", declared_income = ");
            query.push_bind(income);
        }
        if let Some(debts) = decimal_of(result.extracted_debts) {
            query.push(", current_debts = ");
            query.push_bind(debts);
        }
        if let Some(currency) = &result.extracted_currency {
            query.push(", currency_code = ");
            query.push_bind(currency.clone());
        }
        if let Some(preference_id) = result.extracted_contact_preference_id {
            query.push(", contact_preference_id = ");
            query.push_bind(preference_id);
        }

        query.push(", updated_at = now() WHERE id = ");
        query.push_bind(lead_id);

        let outcome = query.build().execute(&self.pool).await?;
        if outcome.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Lead {} not found", lead_id)));
        }

        tracing::debug!("Merged lead update for {}: {}", lead_id, result.reasoning);
        Ok(())
    }
}

fn decimal_of(value: Option<f64>) -> Option<BigDecimal> {
    value.and_then(|v| BigDecimal::from_str(&v.to_string()).ok())
}
