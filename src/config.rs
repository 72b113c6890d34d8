use serde::Deserialize;

/// Policy for binding a new conversation to a lead when the caller does not
/// supply a conversation id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum LeadBootstrap {
    /// Reuse the first existing lead for the client; create one only if the
    /// client has none. Matches observed production behavior.
    AttachClientLead,
    /// Mint a fresh lead for every new conversation.
    LeadPerConversation,
}

impl LeadBootstrap {
    fn parse(value: &str) -> anyhow::Result<Self> {
        match value {
            "attach-client-lead" => Ok(Self::AttachClientLead),
            "lead-per-conversation" => Ok(Self::LeadPerConversation),
            other => anyhow::bail!(
                "LEAD_BOOTSTRAP must be 'attach-client-lead' or 'lead-per-conversation', got '{}'",
                other
            ),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub database_url: String,
    pub port: u16,
    pub google_api_key: String,
    pub gemini_base_url: String,
    pub gemini_model: String,
    pub semantic_adapter_url: String,
    pub search_top_k: usize,
    pub search_timeout_secs: u64,
    pub history_window: usize,
    pub analysis_workers: usize,
    pub analysis_queue_capacity: usize,
    pub lead_bootstrap: LeadBootstrap,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            database_url: std::env::var("DB_URL")
                .or_else(|_| std::env::var("DATABASE_URL"))
                .map_err(|_| {
                    anyhow::anyhow!("DB_URL or DATABASE_URL environment variable required")
                })
                .and_then(|url| {
                    if url.trim().is_empty() {
                        anyhow::bail!("DB_URL cannot be empty");
                    }
                    if !url.starts_with("postgresql://") && !url.starts_with("postgres://") {
                        anyhow::bail!("DB_URL must start with postgresql:// or postgres://");
                    }
                    Ok(url)
                })?,
            port: std::env::var("PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("PORT must be a valid number between 1-65535"))?,
            google_api_key: std::env::var("GOOGLE_API_KEY")
                .map_err(|_| anyhow::anyhow!("GOOGLE_API_KEY environment variable required"))
                .and_then(|key| {
                    if key.trim().is_empty() {
                        anyhow::bail!("GOOGLE_API_KEY cannot be empty");
                    }
                    Ok(key)
                })?,
            gemini_base_url: std::env::var("GEMINI_BASE_URL")
                .unwrap_or_else(|_| "https://generativelanguage.googleapis.com".to_string()),
            gemini_model: std::env::var("GEMINI_MODEL")
                .unwrap_or_else(|_| "gemini-2.0-flash".to_string()),
            semantic_adapter_url: std::env::var("SEMANTIC_ADAPTER_URL")
                .map_err(|_| anyhow::anyhow!("SEMANTIC_ADAPTER_URL environment variable required"))
                .and_then(|url| {
                    if url.trim().is_empty() {
                        anyhow::bail!("SEMANTIC_ADAPTER_URL cannot be empty");
                    }
                    if !url.starts_with("http://") && !url.starts_with("https://") {
                        anyhow::bail!("SEMANTIC_ADAPTER_URL must start with http:// or https://");
                    }
                    Ok(url)
                })?,
            search_top_k: std::env::var("SEARCH_TOP_K")
                .unwrap_or_else(|_| "3".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("SEARCH_TOP_K must be a positive number"))?,
            search_timeout_secs: std::env::var("SEARCH_TIMEOUT_SECS")
                .unwrap_or_else(|_| "10".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("SEARCH_TIMEOUT_SECS must be a positive number"))?,
            history_window: std::env::var("HISTORY_WINDOW")
                .unwrap_or_else(|_| "10".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("HISTORY_WINDOW must be a positive number"))?,
            analysis_workers: std::env::var("ANALYSIS_WORKERS")
                .unwrap_or_else(|_| "2".to_string())
                .parse()
                .ok()
                .filter(|n| *n > 0)
                .ok_or_else(|| anyhow::anyhow!("ANALYSIS_WORKERS must be a positive number"))?,
            analysis_queue_capacity: std::env::var("ANALYSIS_QUEUE_CAPACITY")
                .unwrap_or_else(|_| "64".to_string())
                .parse()
                .ok()
                .filter(|n| *n > 0)
                .ok_or_else(|| {
                    anyhow::anyhow!("ANALYSIS_QUEUE_CAPACITY must be a positive number")
                })?,
            lead_bootstrap: std::env::var("LEAD_BOOTSTRAP")
                .map(|v| LeadBootstrap::parse(&v))
                .unwrap_or(Ok(LeadBootstrap::AttachClientLead))?,
        };

        // Log successful configuration load (without sensitive values)
        tracing::info!("Configuration loaded successfully");
        tracing::debug!(
            "Database URL: {}...",
            &config.database_url[..20.min(config.database_url.len())]
        );
        tracing::debug!("Semantic adapter URL: {}", config.semantic_adapter_url);
        tracing::debug!("Gemini model: {}", config.gemini_model);
        tracing::debug!("Server Port: {}", config.port);
        tracing::info!("Lead bootstrap policy: {:?}", config.lead_bootstrap);

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lead_bootstrap_parses_known_values() {
        assert_eq!(
            LeadBootstrap::parse("attach-client-lead").unwrap(),
            LeadBootstrap::AttachClientLead
        );
        assert_eq!(
            LeadBootstrap::parse("lead-per-conversation").unwrap(),
            LeadBootstrap::LeadPerConversation
        );
    }

    #[test]
    fn lead_bootstrap_rejects_unknown_values() {
        assert!(LeadBootstrap::parse("per-client").is_err());
        assert!(LeadBootstrap::parse("").is_err());
    }
}
