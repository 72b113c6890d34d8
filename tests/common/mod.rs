//! Shared test doubles: an in-memory `ConversationStore` honoring the same
//! contract as the Postgres implementation, and a scriptable `ChatModel`.
#![allow(dead_code)]

use async_trait::async_trait;
use chrono::Utc;
use inference_core::analysis_worker::spawn_analysis_workers;
use inference_core::chat_orchestrator::ChatOrchestrator;
use inference_core::config::LeadBootstrap;
use inference_core::conversation_store::{
    ConversationStore, DEFAULT_SYSTEM_PROMPT, WEBCHAT_PLATFORM,
};
use inference_core::errors::AppError;
use inference_core::lead_analyzer::LeadAnalyzer;
use inference_core::llm_client::ChatModel;
use inference_core::models::{
    Catalog, Conversation, Lead, Message, MessageCounts, ScoringResult,
};
use inference_core::semantic_client::SemanticSearchClient;
use sqlx::types::Json;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct PromptRow {
    pub client_id: Option<String>,
    pub slug: String,
    pub prompt_text: String,
    pub is_active: bool,
}

/// In-memory store double. Same observable semantics as the Postgres
/// implementation: identity bootstrapping, full-sequence replace with
/// recomputed counters, tiered prompt lookup, and field-by-field merge.
pub struct InMemoryStore {
    bootstrap: LeadBootstrap,
    pub leads: Mutex<HashMap<Uuid, Lead>>,
    pub conversations: Mutex<HashMap<Uuid, Conversation>>,
    pub prompts: Mutex<Vec<PromptRow>>,
    pub catalog: Mutex<Catalog>,
}

impl InMemoryStore {
    pub fn new(bootstrap: LeadBootstrap) -> Arc<Self> {
        Arc::new(Self {
            bootstrap,
            leads: Mutex::new(HashMap::new()),
            conversations: Mutex::new(HashMap::new()),
            prompts: Mutex::new(Vec::new()),
            catalog: Mutex::new(Catalog::default()),
        })
    }

    pub fn with_prompt(&self, client_id: Option<&str>, slug: &str, text: &str) {
        self.prompts.lock().unwrap().push(PromptRow {
            client_id: client_id.map(str::to_string),
            slug: slug.to_string(),
            prompt_text: text.to_string(),
            is_active: true,
        });
    }

    pub fn with_catalog(&self, catalog: Catalog) {
        *self.catalog.lock().unwrap() = catalog;
    }

    pub fn lead(&self, id: Uuid) -> Option<Lead> {
        self.leads.lock().unwrap().get(&id).cloned()
    }

    pub fn conversation(&self, id: Uuid) -> Option<Conversation> {
        self.conversations.lock().unwrap().get(&id).cloned()
    }

    pub fn lead_count(&self) -> usize {
        self.leads.lock().unwrap().len()
    }

    fn new_lead(&self, client_id: &str) -> Lead {
        let prefix: String = client_id.chars().take(8).collect();
        Lead {
            id: Uuid::new_v4(),
            client_id: client_id.to_string(),
            source_id: 14,
            full_name: format!("User {}", prefix),
            email: None,
            phone: None,
            declared_income: None,
            current_debts: None,
            currency_code: None,
            contact_preference_id: None,
            score_engagement: 0,
            score_finance: 0,
            score_timeline: 0,
            score_match: 0,
            score_info: 0,
            created_at: Utc::now(),
            updated_at: None,
        }
    }
}

#[async_trait]
impl ConversationStore for InMemoryStore {
    async fn resolve_or_create(
        &self,
        client_id: &str,
        conversation_id: Option<Uuid>,
    ) -> Result<Conversation, AppError> {
        if let Some(id) = conversation_id {
            if let Some(existing) = self.conversations.lock().unwrap().get(&id) {
                return Ok(existing.clone());
            }
        }

        let lead_id = {
            let mut leads = self.leads.lock().unwrap();
            let existing = match self.bootstrap {
                LeadBootstrap::AttachClientLead => leads
                    .values()
                    .filter(|l| l.client_id == client_id)
                    .min_by_key(|l| l.created_at)
                    .map(|l| l.id),
                LeadBootstrap::LeadPerConversation => None,
            };
            match existing {
                Some(id) => id,
                None => {
                    let lead = self.new_lead(client_id);
                    let id = lead.id;
                    leads.insert(id, lead);
                    id
                }
            }
        };

        let conversation = Conversation {
            id: conversation_id.unwrap_or_else(Uuid::new_v4),
            lead_id,
            platform: WEBCHAT_PLATFORM.to_string(),
            messages: Json(Vec::new()),
            summary: None,
            total_messages: 0,
            lead_messages: 0,
            bot_messages: 0,
            created_at: Utc::now(),
            updated_at: None,
            last_message_at: None,
        };
        self.conversations
            .lock()
            .unwrap()
            .insert(conversation.id, conversation.clone());
        Ok(conversation)
    }

    async fn get_conversation(
        &self,
        conversation_id: Uuid,
    ) -> Result<Option<Conversation>, AppError> {
        Ok(self.conversations.lock().unwrap().get(&conversation_id).cloned())
    }

    async fn append_turn(
        &self,
        conversation_id: Uuid,
        messages: &[Message],
        summary: Option<&str>,
    ) -> Result<(), AppError> {
        let mut conversations = self.conversations.lock().unwrap();
        let conversation = conversations.get_mut(&conversation_id).ok_or_else(|| {
            AppError::NotFound(format!("Conversation {} not found", conversation_id))
        })?;

        let counts = MessageCounts::of(messages);
        conversation.messages = Json(messages.to_vec());
        if let Some(summary) = summary {
            conversation.summary = Some(summary.to_string());
        }
        conversation.total_messages = counts.total;
        conversation.lead_messages = counts.user;
        conversation.bot_messages = counts.assistant;
        conversation.updated_at = Some(Utc::now());
        conversation.last_message_at = Some(Utc::now());
        Ok(())
    }

    async fn resolve_system_prompt(
        &self,
        client_id: &str,
        slug: &str,
    ) -> Result<String, AppError> {
        let prompts = self.prompts.lock().unwrap();
        let tier1 = prompts.iter().find(|p| {
            p.is_active && p.slug == slug && p.client_id.as_deref() == Some(client_id)
        });
        if let Some(row) = tier1 {
            return Ok(row.prompt_text.clone());
        }
        let tier2 = prompts
            .iter()
            .find(|p| p.is_active && p.slug == slug && p.client_id.is_none());
        if let Some(row) = tier2 {
            return Ok(row.prompt_text.clone());
        }
        Ok(DEFAULT_SYSTEM_PROMPT.to_string())
    }

    async fn catalogs(&self) -> Result<Catalog, AppError> {
        Ok(self.catalog.lock().unwrap().clone())
    }

    async fn merge_lead_update(
        &self,
        lead_id: Uuid,
        result: &ScoringResult,
    ) -> Result<(), AppError> {
        result.validate().map_err(AppError::BadRequest)?;

        let mut leads = self.leads.lock().unwrap();
        let lead = leads
            .get_mut(&lead_id)
            .ok_or_else(|| AppError::NotFound(format!("Lead {} not found", lead_id)))?;

        lead.score_engagement = result.score_engagement;
        lead.score_finance = result.score_finance;
        lead.score_timeline = result.score_timeline;
        lead.score_match = result.score_match;
        lead.score_info = result.score_info;

        if let Some(name) = &result.extracted_name {
            lead.full_name = name.clone();
        }
        if let Some(email) = &result.extracted_email {
            lead.email = Some(email.clone());
        }
        if let Some(phone) = &result.extracted_phone {
            lead.phone = Some(phone.clone());
        }
        if let Some(income) = result.extracted_income {
            lead.declared_income =
                bigdecimal::BigDecimal::try_from(income).ok().or(lead.declared_income.clone());
        }
        if let Some(debts) = result.extracted_debts {
            lead.current_debts =
                bigdecimal::BigDecimal::try_from(debts).ok().or(lead.current_debts.clone());
        }
        if let Some(currency) = &result.extracted_currency {
            lead.currency_code = Some(currency.clone());
        }
        if let Some(preference) = result.extracted_contact_preference_id {
            lead.contact_preference_id = Some(preference);
        }
        lead.updated_at = Some(Utc::now());
        Ok(())
    }
}

/// Scriptable generation double. Records every system prompt it sees so
/// tests can assert on prompt resolution and context substitution.
pub struct StubModel {
    pub answer: String,
    pub scoring_json: String,
    pub seen_system_prompts: Mutex<Vec<String>>,
    /// Artificial latency for the JSON (analysis) path.
    pub scoring_delay: Option<Duration>,
}

impl StubModel {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default_stub())
    }

    pub fn with_scoring_json(json: &str) -> Arc<Self> {
        let mut stub = Self::default_stub();
        stub.scoring_json = json.to_string();
        Arc::new(stub)
    }

    pub fn with_scoring_delay(delay: Duration) -> Arc<Self> {
        let mut stub = Self::default_stub();
        stub.scoring_delay = Some(delay);
        Arc::new(stub)
    }

    fn default_stub() -> Self {
        Self {
            answer: "Claro, con gusto le ayudo.".to_string(),
            scoring_json: r#"{"score_engagement": 12, "score_info": 2, "reasoning": "Hace preguntas de negocio"}"#
                .to_string(),
            seen_system_prompts: Mutex::new(Vec::new()),
            scoring_delay: None,
        }
    }

    pub fn last_system_prompt(&self) -> Option<String> {
        self.seen_system_prompts.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl ChatModel for StubModel {
    async fn generate(
        &self,
        system_prompt: &str,
        _history: &[Message],
        _input: &str,
    ) -> Result<String, AppError> {
        self.seen_system_prompts
            .lock()
            .unwrap()
            .push(system_prompt.to_string());
        Ok(self.answer.clone())
    }

    async fn generate_json(
        &self,
        _system_prompt: &str,
        _input: &str,
    ) -> Result<String, AppError> {
        if let Some(delay) = self.scoring_delay {
            tokio::time::sleep(delay).await;
        }
        Ok(self.scoring_json.clone())
    }
}

/// Wires an orchestrator over the in-memory store, a stub model, and a
/// semantic adapter URL (usually a wiremock server).
pub fn build_orchestrator(
    store: Arc<InMemoryStore>,
    model: Arc<StubModel>,
    semantic_url: &str,
) -> ChatOrchestrator {
    let search = SemanticSearchClient::new(semantic_url.to_string(), 3, 2)
        .expect("failed to build search client");
    let analyzer = Arc::new(LeadAnalyzer::new(model.clone() as Arc<dyn ChatModel>));
    let dispatcher = spawn_analysis_workers(
        1,
        8,
        analyzer,
        store.clone() as Arc<dyn ConversationStore>,
    );
    ChatOrchestrator::new(
        store as Arc<dyn ConversationStore>,
        search,
        model as Arc<dyn ChatModel>,
        dispatcher,
        10,
    )
}
