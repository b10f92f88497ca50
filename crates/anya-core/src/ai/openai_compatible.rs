//! OpenAI-compatible backend implementation
//!
//! Works with any server that implements the OpenAI chat completions API:
//! - Groq (https://api.groq.com/openai)
//! - vLLM (http://localhost:8000)
//! - LocalAI / llama-server (http://localhost:8080)
//!
//! # Configuration
//!
//! Environment variables:
//! - `OPENAI_COMPATIBLE_HOST`: Server URL (required)
//! - `OPENAI_COMPATIBLE_MODEL`: Model name (default: llama-3.1-8b-instant)
//! - `OPENAI_COMPATIBLE_API_KEY`: API key if required (optional)

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};
use crate::models::Category;

use super::parsing::parse_classification;
use super::types::ExpenseClassification;
use super::AIBackend;

const DEFAULT_MODEL: &str = "llama-3.1-8b-instant";

/// OpenAI-compatible backend
///
/// ```rust,ignore
/// // Groq
/// export OPENAI_COMPATIBLE_HOST="https://api.groq.com/openai"
/// export OPENAI_COMPATIBLE_API_KEY="gsk_..."
///
/// // vLLM on the LAN
/// export OPENAI_COMPATIBLE_HOST="http://192.168.1.100:8000"
/// export OPENAI_COMPATIBLE_MODEL="meta-llama/Llama-3.2-3B-Instruct"
/// ```
#[derive(Clone)]
pub struct OpenAICompatibleBackend {
    http_client: Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
}

impl OpenAICompatibleBackend {
    /// Create a new OpenAI-compatible backend
    pub fn new(base_url: &str, model: &str) -> Self {
        Self {
            http_client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            api_key: None,
        }
    }

    /// Create with an API key
    pub fn with_api_key(base_url: &str, model: &str, api_key: &str) -> Self {
        Self {
            api_key: Some(api_key.to_string()),
            ..Self::new(base_url, model)
        }
    }

    /// Create from environment variables
    ///
    /// Required: `OPENAI_COMPATIBLE_HOST`
    /// Optional: `OPENAI_COMPATIBLE_MODEL`, `OPENAI_COMPATIBLE_API_KEY`
    pub fn from_env() -> Option<Self> {
        let host = std::env::var("OPENAI_COMPATIBLE_HOST")
            .ok()
            .filter(|h| !h.is_empty())?;
        let model = std::env::var("OPENAI_COMPATIBLE_MODEL")
            .unwrap_or_else(|_| DEFAULT_MODEL.to_string());
        let api_key = std::env::var("OPENAI_COMPATIBLE_API_KEY")
            .ok()
            .filter(|k| !k.is_empty());

        let mut backend = Self::new(&host, &model);
        backend.api_key = api_key;
        Some(backend)
    }

    /// Make a chat completion request
    async fn chat_completion(&self, system: &str, prompt: &str) -> Result<String> {
        let request = ChatCompletionRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: system.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: prompt.to_string(),
                },
            ],
            temperature: Some(0.1),
            max_tokens: Some(100),
            stream: false,
        };

        let mut req_builder = self
            .http_client
            .post(format!("{}/v1/chat/completions", self.base_url))
            .json(&request);

        if let Some(ref api_key) = self.api_key {
            req_builder = req_builder.header("Authorization", format!("Bearer {}", api_key));
        }

        let response = req_builder.send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Degraded(format!(
                "OpenAI API error {}: {}",
                status, body
            )));
        }

        let chat_response: ChatCompletionResponse = response.json().await?;

        chat_response
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| Error::Degraded("No response from OpenAI API".into()))
    }
}

const CLASSIFY_SYSTEM_PROMPT: &str = "You categorize personal expenses for a budgeting assistant. \
Reply with a single JSON object and nothing else.";

/// Build the user prompt for an ambiguous expense
pub(crate) fn classification_prompt(text: &str, candidates: &[Category]) -> String {
    let options = Category::builtin()
        .iter()
        .filter(|c| **c != Category::Savings)
        .map(|c| c.as_str())
        .collect::<Vec<_>>()
        .join(", ");
    let likely = candidates
        .iter()
        .map(|c| c.as_str())
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        "Expense message: \"{}\"\n\
         Allowed categories: {}\n\
         Likely categories from the user's history, best first: {}\n\
         Respond as {{\"category\": \"<one allowed category>\", \"confidence\": <0.0-1.0>}}",
        text.replace('"', "'"),
        options,
        if likely.is_empty() { "none" } else { &likely }
    )
}

/// OpenAI chat completion request
#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    stream: bool,
}

/// Chat message
#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

/// OpenAI chat completion response
#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

/// Chat completion choice
#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

/// Chat response message
#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    content: String,
}

#[async_trait]
impl AIBackend for OpenAICompatibleBackend {
    async fn classify_expense(
        &self,
        text: &str,
        candidates: &[Category],
    ) -> Result<ExpenseClassification> {
        let prompt = classification_prompt(text, candidates);
        let response = self.chat_completion(CLASSIFY_SYSTEM_PROMPT, &prompt).await?;
        debug!("OpenAI-compatible response: {}", response);

        parse_classification(&response)
    }

    async fn health_check(&self) -> bool {
        let mut req = self.http_client.get(format!("{}/v1/models", self.base_url));
        if let Some(ref api_key) = self.api_key {
            req = req.header("Authorization", format!("Bearer {}", api_key));
        }
        match req.send().await {
            Ok(resp) => resp.status().is_success(),
            Err(_) => false,
        }
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn host(&self) -> &str {
        &self.base_url
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_lists_candidates() {
        let prompt = classification_prompt(
            "paid 300 to \"Raju\"",
            &[Category::Groceries, Category::Uncategorized],
        );
        assert!(prompt.contains("groceries, uncategorized"));
        assert!(prompt.contains("'Raju'"));
        assert!(!prompt.contains("savings"));
    }

    #[test]
    fn test_base_url_trimmed() {
        let backend = OpenAICompatibleBackend::with_api_key("https://api.groq.com/openai/", "m", "k");
        assert_eq!(backend.host(), "https://api.groq.com/openai");
        assert_eq!(backend.model(), "m");
    }
}
