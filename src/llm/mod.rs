pub mod extract;
pub mod mapping;

use crate::config::Config;
use crate::error::{PipelineError, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};

/// Client for an OpenAI-compatible chat-completions endpoint. The pipeline
/// only needs one capability from it: prompt in, text out.
#[derive(Clone)]
pub struct LlmClient {
    client: Client,
    base_url: String,
    pub model: String,
    api_key: Option<String>,
    configured: bool,
}

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

impl LlmClient {
    pub fn new(base_url: Option<String>, model: Option<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.unwrap_or_else(|| "http://localhost:1234/v1".to_string()),
            model: model.unwrap_or_else(|| "local-model".to_string()),
            api_key: None,
            configured: false,
        }
    }

    /// Builds a client from persisted settings and environment overrides.
    pub fn from_config(config: &Config) -> Self {
        let base_url = std::env::var("FORMPILOT_LLM_URL")
            .ok()
            .or_else(|| config.llm_base_url.clone());
        let model = std::env::var("FORMPILOT_LLM_MODEL")
            .ok()
            .or_else(|| config.llm_model.clone());
        Self::new(base_url, model)
    }

    /// Sources an API key from the explicit argument, the secure store, or
    /// the environment, in that order. Fails if none is found.
    pub fn initialize(&mut self, api_key: Option<String>) -> Result<()> {
        let key = api_key
            .filter(|k| !k.is_empty())
            .or_else(Config::get_api_key)
            .or_else(|| std::env::var("FORMPILOT_API_KEY").ok())
            .filter(|k| !k.is_empty());

        match key {
            Some(key) => {
                self.api_key = Some(key);
                self.configured = true;
                Ok(())
            }
            None => Err(PipelineError::NotConfigured),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.configured
    }

    /// Single-turn generation: one user message, plain text back.
    pub async fn generate_content(&self, prompt: &str) -> Result<String> {
        if !self.configured {
            return Err(PipelineError::NotConfigured);
        }

        let url = format!("{}/chat/completions", self.base_url);
        let req = ChatRequest {
            model: self.model.clone(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
            temperature: 0.2,
        };

        let mut builder = self.client.post(&url).json(&req);
        if let Some(key) = &self.api_key {
            builder = builder.header("Authorization", format!("Bearer {}", key));
        }

        let resp = builder
            .send()
            .await
            .map_err(|e| PipelineError::Llm(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let err_text = resp.text().await.unwrap_or_default();
            return Err(PipelineError::Llm(format!("{}: {}", status, err_text)));
        }

        let body: ChatResponse = resp
            .json()
            .await
            .map_err(|e| PipelineError::Llm(e.to_string()))?;

        body.choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| PipelineError::Llm("no choices in response".to_string()))
    }
}

/// Extracts the first JSON object substring from a model's free-text
/// response: everything from the first `{` to the last `}`. Models often
/// wrap the payload in prose or code fences, and this mirrors the tolerant
/// behavior callers expect.
pub fn first_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end < start {
        return None;
    }
    Some(&text[start..=end])
}
