use std::sync::Arc;

use serde::Deserialize;
use serde_json::{json, Value};
use tracing::Instrument;

use crate::config::CompletionConfig;
use crate::error::{Error, Result};
use crate::http::{Auth, Method, ResilientClient, RetryPolicy, Transport};

pub const DEFAULT_SYSTEM_MESSAGE: &str = "You are an intelligent assistant. \
You will receive requests to process. Understand what the user asks and reason over it. \
Your answer should contain the rationale and the answer itself.";

/// Chat completion client for an Azure OpenAI deployment.
pub struct CompletionClient {
    url: String,
    system_message: String,
    client: ResilientClient,
    span: tracing::Span,
}

#[derive(Debug, Clone, Copy)]
pub struct CompletionParameters {
    pub temperature: f32,
    pub top_p: f32,
    pub max_tokens: u32,
}

impl Default for CompletionParameters {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            top_p: 0.95,
            max_tokens: 2000,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Completion {
    pub content: String,
    pub model: String,
    pub usage: Value,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    model: String,
    #[serde(default)]
    usage: Value,
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: Option<ChoiceMessage>,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

impl CompletionClient {
    pub fn new(config: &CompletionConfig, transport: Arc<dyn Transport>, retry: RetryPolicy) -> Self {
        let auth = Auth::ApiKey {
            key: config.api_key.clone(),
        };
        Self {
            url: config.url.clone(),
            system_message: config
                .system_message
                .clone()
                .unwrap_or_else(|| DEFAULT_SYSTEM_MESSAGE.to_string()),
            client: ResilientClient::new(transport, auth, retry),
            span: tracing::info_span!("completion"),
        }
    }

    #[cfg(test)]
    pub fn with_sleeper(mut self, sleeper: Arc<dyn crate::http::retry::Sleeper>) -> Self {
        self.client = self.client.with_sleeper(sleeper);
        self
    }

    #[cfg(test)]
    pub fn system_message(&self) -> &str {
        &self.system_message
    }

    pub async fn complete(&self, prompt: &str, params: CompletionParameters) -> Result<Completion> {
        let body = json!({
            "messages": [
                { "role": "system", "content": [{ "type": "text", "text": self.system_message }] },
                { "role": "user", "content": [{ "type": "text", "text": prompt }] }
            ],
            "temperature": params.temperature,
            "top_p": params.top_p,
            "max_tokens": params.max_tokens
        });

        let raw = self
            .client
            .request(Method::POST, &self.url, Some(&body))
            .instrument(self.span.clone())
            .await?;
        let response: ChatResponse =
            serde_json::from_value(raw).map_err(|source| Error::Decode {
                url: self.url.clone(),
                source,
            })?;

        self.span.in_scope(|| {
            tracing::info!(model = %response.model, usage = %response.usage, "completion generated")
        });

        let content = response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message)
            .and_then(|m| m.content)
            .unwrap_or_default();

        Ok(Completion {
            content,
            model: response.model,
            usage: response.usage,
        })
    }
}
