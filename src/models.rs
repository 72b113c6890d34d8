use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use std::collections::{BTreeMap, HashSet};
use uuid::Uuid;

// ============ Database Models ============

/// Role of a conversation message author.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// The prospective customer.
    User,
    /// The generated reply.
    Assistant,
}

/// A single transcript entry. Immutable once written.
///
/// Older revisions of the transcript format stored the body under a `text`
/// key; it is accepted on read and normalized to `content` on write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: MessageRole,
    #[serde(alias = "text")]
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl Message {
    /// Creates a message stamped at capture time.
    pub fn now(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Message counters derived from a full transcript.
///
/// Counters are always recomputed from the sequence on write, never
/// incremented in place.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageCounts {
    pub total: i32,
    pub user: i32,
    pub assistant: i32,
}

impl MessageCounts {
    pub fn of(messages: &[Message]) -> Self {
        let user = messages
            .iter()
            .filter(|m| m.role == MessageRole::User)
            .count() as i32;
        let assistant = messages
            .iter()
            .filter(|m| m.role == MessageRole::Assistant)
            .count() as i32;
        Self {
            total: messages.len() as i32,
            user,
            assistant,
        }
    }
}

/// An ordered transcript owned by exactly one lead.
///
/// Mirrors the `lead_conversations` table.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Conversation {
    /// Unique identifier for the conversation.
    pub id: Uuid,
    /// Owning lead. Always present.
    pub lead_id: Uuid,
    /// Origin platform tag (e.g., "webchat").
    pub platform: String,
    /// Full ordered message sequence.
    pub messages: Json<Vec<Message>>,
    /// Optional running summary.
    pub summary: Option<String>,
    /// Total message count, recomputed on every write.
    pub total_messages: i32,
    /// Messages authored by the lead.
    pub lead_messages: i32,
    /// Messages authored by the assistant.
    pub bot_messages: i32,
    /// Timestamp of creation.
    pub created_at: DateTime<Utc>,
    /// Timestamp of last update.
    pub updated_at: Option<DateTime<Utc>>,
    /// Timestamp of the most recent message.
    pub last_message_at: Option<DateTime<Utc>>,
}

impl Conversation {
    pub fn messages(&self) -> &[Message] {
        &self.messages.0
    }
}

/// Profile and scoring record for a prospective customer.
///
/// Mirrors the `lead_leads` table. Mutated only through merge-style updates;
/// never deleted by this service.
#[derive(Debug, Clone, FromRow)]
pub struct Lead {
    /// Unique identifier for the lead.
    pub id: Uuid,
    /// Tenant/client identifier.
    pub client_id: String,
    /// Acquisition source.
    pub source_id: i32,
    /// Full name (placeholder until extraction finds a real one).
    pub full_name: String,
    /// Contact email.
    pub email: Option<String>,
    /// Contact phone.
    pub phone: Option<String>,
    /// Declared monthly income.
    pub declared_income: Option<bigdecimal::BigDecimal>,
    /// Declared current debts.
    pub current_debts: Option<bigdecimal::BigDecimal>,
    /// ISO currency code for the financial fields.
    pub currency_code: Option<String>,
    /// Preferred contact channel id.
    pub contact_preference_id: Option<i32>,
    /// Engagement score.
    pub score_engagement: i32,
    /// Finance score.
    pub score_finance: i32,
    /// Timeline score.
    pub score_timeline: i32,
    /// Product-match score.
    pub score_match: i32,
    /// Profile-quality score.
    pub score_info: i32,
    /// Timestamp of creation.
    pub created_at: DateTime<Utc>,
    /// Timestamp of last update.
    pub updated_at: Option<DateTime<Utc>>,
}

// ============ API Models ============

/// Incoming chat turn request.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatMessageRequest {
    /// The user's question or message.
    pub query_text: String,
    /// The tenant/client identifier.
    pub client_id: String,
    /// Existing conversation id, if the caller has one.
    #[serde(default)]
    pub conversation_id: Option<Uuid>,
    /// Additional context about the user. Currently pass-through only.
    #[serde(default)]
    pub user_metadata: Option<serde_json::Value>,
}

/// A ranked context snippet returned by the semantic adapter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceDocument {
    pub content_id: String,
    #[serde(default)]
    pub title: Option<String>,
    pub body_content: String,
    /// Similarity score; higher is more similar.
    pub score: f64,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

/// Chat turn response.
#[derive(Debug, Clone, Serialize)]
pub struct ChatMessageResponse {
    /// The generated answer.
    pub answer: String,
    /// The sources used to ground the answer.
    pub sources: Vec<SourceDocument>,
    /// The conversation id for this session.
    pub conversation_id: Uuid,
}

// ============ Scoring ============

/// Closed interval for the engagement score.
pub const SCORE_ENGAGEMENT_BOUNDS: (i32, i32) = (-20, 30);
/// Closed interval for the finance score.
pub const SCORE_FINANCE_BOUNDS: (i32, i32) = (-10, 30);
/// Closed interval for the timeline score.
pub const SCORE_TIMELINE_BOUNDS: (i32, i32) = (0, 20);
/// Closed interval for the product-match score.
pub const SCORE_MATCH_BOUNDS: (i32, i32) = (0, 15);
/// Closed interval for the profile-quality score.
pub const SCORE_INFO_BOUNDS: (i32, i32) = (-3, 5);

/// Rationale recorded when analysis fails and the neutral fallback is used.
pub const ANALYSIS_FALLBACK_REASONING: &str = "Error en el análisis automático.";

/// Outcome of one lead-qualification analysis over a transcript.
///
/// The five scores are always authoritative (0 is a valid value, not "no
/// update"). Each extracted field is independently nullable: `None` means
/// "no evidence in the transcript" and must never overwrite a stored value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringResult {
    #[serde(default)]
    pub score_engagement: i32,
    #[serde(default)]
    pub score_finance: i32,
    #[serde(default)]
    pub score_timeline: i32,
    #[serde(default)]
    pub score_match: i32,
    #[serde(default)]
    pub score_info: i32,
    /// Short explanation of the assigned scores.
    #[serde(default)]
    pub reasoning: String,
    #[serde(default)]
    pub extracted_name: Option<String>,
    #[serde(default)]
    pub extracted_email: Option<String>,
    #[serde(default)]
    pub extracted_phone: Option<String>,
    #[serde(default, deserialize_with = "lenient_opt_f64")]
    pub extracted_income: Option<f64>,
    #[serde(default, deserialize_with = "lenient_opt_f64")]
    pub extracted_debts: Option<f64>,
    #[serde(default)]
    pub extracted_currency: Option<String>,
    #[serde(default, deserialize_with = "lenient_opt_i32")]
    pub extracted_contact_preference_id: Option<i32>,
}

impl Default for ScoringResult {
    fn default() -> Self {
        Self {
            score_engagement: 0,
            score_finance: 0,
            score_timeline: 0,
            score_match: 0,
            score_info: 0,
            reasoning: String::new(),
            extracted_name: None,
            extracted_email: None,
            extracted_phone: None,
            extracted_income: None,
            extracted_debts: None,
            extracted_currency: None,
            extracted_contact_preference_id: None,
        }
    }
}

impl ScoringResult {
    /// Neutral result used whenever analysis fails.
    pub fn fallback() -> Self {
        Self {
            reasoning: ANALYSIS_FALLBACK_REASONING.to_string(),
            ..Self::default()
        }
    }

    /// Checks every score against its declared closed interval.
    pub fn validate(&self) -> Result<(), String> {
        let checks = [
            ("score_engagement", self.score_engagement, SCORE_ENGAGEMENT_BOUNDS),
            ("score_finance", self.score_finance, SCORE_FINANCE_BOUNDS),
            ("score_timeline", self.score_timeline, SCORE_TIMELINE_BOUNDS),
            ("score_match", self.score_match, SCORE_MATCH_BOUNDS),
            ("score_info", self.score_info, SCORE_INFO_BOUNDS),
        ];
        for (name, value, (min, max)) in checks {
            if value < min || value > max {
                return Err(format!(
                    "{} = {} outside allowed range [{}, {}]",
                    name, value, min, max
                ));
            }
        }
        Ok(())
    }
}

/// Accepts a JSON number or a numeric string (comma or dot decimals).
///
/// Structured generation occasionally returns amounts as strings like
/// "250000,50"; reject nothing here that a human would read as a number.
fn lenient_opt_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::Number(n)) => n.as_f64(),
        Some(serde_json::Value::String(s)) => s.trim().replace(',', ".").parse::<f64>().ok(),
        _ => None,
    })
}

/// Accepts a JSON integer or a numeric string.
fn lenient_opt_i32<'de, D>(deserializer: D) -> Result<Option<i32>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::Number(n)) => n.as_i64().and_then(|v| i32::try_from(v).ok()),
        Some(serde_json::Value::String(s)) => s.trim().parse::<i32>().ok(),
        _ => None,
    })
}

// ============ Catalogs ============

/// Whitelist of valid categorical values, supplied by the store.
///
/// Extraction may only map onto these; an unmapped mention yields `None`
/// rather than a fabricated code or id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Catalog {
    /// Active ISO currency codes (uppercase).
    pub currencies: HashSet<String>,
    /// Active contact-preference id -> display name.
    pub contact_preferences: BTreeMap<i32, String>,
}

impl Catalog {
    pub fn has_currency(&self, code: &str) -> bool {
        self.currencies.contains(code)
    }

    pub fn has_contact_preference(&self, id: i32) -> bool {
        self.contact_preferences.contains_key(&id)
    }
}
