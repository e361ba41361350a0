//! OpenAI-compatible chat-completions backend.

use std::time::Duration;

use async_trait::async_trait;
use coordination::generation::{Generation, GenerationError, GenerationResult, TextGenerator};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::GeneratorSettings;

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: Option<String>,
    reasoning_content: Option<String>,
}

/// Posts each prompt as a single user message.
pub struct HttpTextGenerator {
    http: reqwest::Client,
    settings: GeneratorSettings,
}

impl HttpTextGenerator {
    pub fn new(settings: GeneratorSettings) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.request_timeout_secs))
            .build()?;
        Ok(Self { http, settings })
    }
}

/// Answer text of the first choice. Reasoning-only replies are used as is;
/// the persona parser pulls the JSON object out of either.
fn answer_text(response: ChatResponse) -> GenerationResult<String> {
    let choice = response
        .choices
        .into_iter()
        .next()
        .ok_or(GenerationError::Empty)?;
    let text = match (choice.message.content, choice.message.reasoning_content) {
        (Some(content), _) if !content.trim().is_empty() => content,
        (_, Some(reasoning)) => reasoning,
        _ => return Err(GenerationError::Empty),
    };
    Ok(text)
}

#[async_trait]
impl TextGenerator for HttpTextGenerator {
    async fn generate(&self, prompt: &str) -> GenerationResult<Generation> {
        let request = ChatRequest {
            model: &self.settings.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            max_tokens: self.settings.max_tokens,
            temperature: self.settings.temperature,
        };

        let mut builder = self.http.post(&self.settings.url).json(&request);
        if let Some(key) = &self.settings.api_key {
            builder = builder.bearer_auth(key);
        }
        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                GenerationError::Timeout(Duration::from_secs(self.settings.request_timeout_secs))
            } else {
                GenerationError::Request(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GenerationError::Request(format!("status {status}: {body}")));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| GenerationError::Request(format!("bad response body: {e}")))?;
        let text = answer_text(parsed)?;
        debug!(model = %self.settings.model, chars = text.len(), "Generation received");
        Ok(Generation::new(text))
    }
}
