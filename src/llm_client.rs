use crate::errors::AppError;
use crate::models::{Message, MessageRole};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

/// The generation capability consumed by the orchestrator and the analyzer.
///
/// Two modes: free-text chat generation over a system prompt, a bounded
/// history window and the new user input; and JSON-mode generation for
/// structured extraction. Single attempt, no retries.
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn generate(
        &self,
        system_prompt: &str,
        history: &[Message],
        input: &str,
    ) -> Result<String, AppError>;

    async fn generate_json(&self, system_prompt: &str, input: &str) -> Result<String, AppError>;
}

/// Client for the Gemini `generateContent` REST API.
pub struct GeminiClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: String,
}

impl GeminiClient {
    /// Creates a new `GeminiClient`.
    ///
    /// # Arguments
    ///
    /// * `base_url` - API host, normally `https://generativelanguage.googleapis.com`.
    /// * `api_key` - Google API key; sent as a header, never in the URL.
    /// * `model` - Model name, e.g. `gemini-2.0-flash`.
    pub fn new(base_url: String, api_key: String, model: String) -> Result<Self, AppError> {
        let client = reqwest::Client::builder().build().map_err(|e| {
            AppError::GenerationError(format!("Failed to create Gemini client: {}", e))
        })?;

        Ok(Self {
            client,
            base_url,
            api_key,
            model,
        })
    }

    async fn generate_content(&self, body: Value) -> Result<String, AppError> {
        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url, self.model
        );

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::GenerationError(format!("Gemini request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(AppError::GenerationError(format!(
                "Gemini returned {}: {}",
                status, error_text
            )));
        }

        let data: GenerateContentResponse = response.json().await.map_err(|e| {
            AppError::GenerationError(format!("Failed to parse Gemini response: {}", e))
        })?;

        let text: String = data
            .candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .map(|c| {
                c.parts
                    .iter()
                    .map(|p| p.text.as_str())
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();

        if text.is_empty() {
            return Err(AppError::GenerationError(
                "Gemini response contained no text candidates".to_string(),
            ));
        }

        Ok(text)
    }
}

#[async_trait]
impl ChatModel for GeminiClient {
    async fn generate(
        &self,
        system_prompt: &str,
        history: &[Message],
        input: &str,
    ) -> Result<String, AppError> {
        let mut contents: Vec<Value> = history
            .iter()
            .map(|message| {
                let role = match message.role {
                    MessageRole::User => "user",
                    MessageRole::Assistant => "model",
                };
                json!({ "role": role, "parts": [{ "text": message.content }] })
            })
            .collect();
        contents.push(json!({ "role": "user", "parts": [{ "text": input }] }));

        let body = json!({
            "system_instruction": { "parts": [{ "text": system_prompt }] },
            "contents": contents,
            "generationConfig": { "temperature": 0.2 },
        });

        self.generate_content(body).await
    }

    async fn generate_json(&self, system_prompt: &str, input: &str) -> Result<String, AppError> {
        let body = json!({
            "system_instruction": { "parts": [{ "text": system_prompt }] },
            "contents": [{ "role": "user", "parts": [{ "text": input }] }],
            "generationConfig": {
                "temperature": 0.0,
                "responseMimeType": "application/json",
            },
        });

        self.generate_content(body).await
    }
}
