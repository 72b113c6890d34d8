use std::env;
use uuid::Uuid;

use inference_core::config::LeadBootstrap;
use inference_core::conversation_store::{ConversationStore, PgConversationStore};
use inference_core::db::Database;
use inference_core::models::{Message, MessageRole, ScoringResult};

/// Integration smoke test for the Postgres store.
/// Marked ignored to avoid running against production by accident; set
/// TEST_DATABASE_URL (schema from sql/schema.sql applied) to run.
#[tokio::test]
#[ignore]
async fn conversation_lifecycle_smoke_test() -> anyhow::Result<()> {
    let db_url = env::var("TEST_DATABASE_URL")
        .or_else(|_| env::var("DATABASE_URL"))
        .map_err(|_| anyhow::anyhow!("Set TEST_DATABASE_URL or DATABASE_URL to run this test"))?;

    let db = Database::new(&db_url).await?;
    let store = PgConversationStore::new(db.pool.clone(), LeadBootstrap::AttachClientLead);

    // Use a unique client to avoid colliding with earlier runs
    let client_id = format!("it-{}", Uuid::new_v4());

    // Bootstrapping: a never-seen conversation binds to exactly one lead
    let conversation = store
        .resolve_or_create(&client_id, None)
        .await
        .map_err(|e| anyhow::anyhow!(e.to_string()))?;
    assert_ne!(conversation.lead_id, Uuid::nil());
    assert!(conversation.messages().is_empty());

    // Resolving again with the returned id returns it unchanged
    let again = store
        .resolve_or_create(&client_id, Some(conversation.id))
        .await
        .map_err(|e| anyhow::anyhow!(e.to_string()))?;
    assert_eq!(again.id, conversation.id);
    assert_eq!(again.lead_id, conversation.lead_id);

    // Round trip: two user/assistant pairs
    let history = vec![
        Message::now(MessageRole::User, "Hola"),
        Message::now(MessageRole::Assistant, "Buenas tardes"),
        Message::now(MessageRole::User, "Busco casa"),
        Message::now(MessageRole::Assistant, "Con gusto"),
    ];
    store
        .append_turn(conversation.id, &history, None)
        .await
        .map_err(|e| anyhow::anyhow!(e.to_string()))?;

    let stored = store
        .get_conversation(conversation.id)
        .await
        .map_err(|e| anyhow::anyhow!(e.to_string()))?
        .expect("conversation must exist");
    assert_eq!(stored.messages().len(), 4);
    assert_eq!(stored.messages()[0].content, "Hola");
    assert_eq!(stored.messages()[3].role, MessageRole::Assistant);
    assert_eq!(stored.total_messages, 4);
    assert_eq!(stored.lead_messages, 2);
    assert_eq!(stored.bot_messages, 2);

    // Merge: a known email survives a later null extraction
    let with_email = ScoringResult {
        score_engagement: 15,
        extracted_email: Some("smoke@example.com".to_string()),
        ..ScoringResult::default()
    };
    store
        .merge_lead_update(conversation.lead_id, &with_email)
        .await
        .map_err(|e| anyhow::anyhow!(e.to_string()))?;

    let without_email = ScoringResult::default();
    store
        .merge_lead_update(conversation.lead_id, &without_email)
        .await
        .map_err(|e| anyhow::anyhow!(e.to_string()))?;

    let email = sqlx::query_scalar::<_, Option<String>>(
        "SELECT email FROM lead_leads WHERE id = $1",
    )
    .bind(conversation.lead_id)
    .fetch_one(&db.pool)
    .await?;
    assert_eq!(email.as_deref(), Some("smoke@example.com"));

    Ok(())
}

/// With no active prompt rows for a client, the hardcoded default applies.
#[tokio::test]
#[ignore]
async fn prompt_lookup_falls_back_to_default() -> anyhow::Result<()> {
    let db_url = env::var("TEST_DATABASE_URL")
        .or_else(|_| env::var("DATABASE_URL"))
        .map_err(|_| anyhow::anyhow!("Set TEST_DATABASE_URL or DATABASE_URL to run this test"))?;

    let db = Database::new(&db_url).await?;
    let store = PgConversationStore::new(db.pool.clone(), LeadBootstrap::AttachClientLead);

    let client_id = format!("it-{}", Uuid::new_v4());
    let prompt = store
        .resolve_system_prompt(&client_id, "no_such_slug")
        .await
        .map_err(|e| anyhow::anyhow!(e.to_string()))?;
    assert!(prompt.contains("{context_text}"));

    Ok(())
}
