//! OpenAI-compatible chat completions client.
//!
//! Works against any endpoint that speaks `POST {base_url}/chat/completions`
//! (OpenAI, vLLM, Ollama, llama.cpp server, Foundry Local).

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::time::sleep;
use tracing::{debug, warn};

use super::backoff::RetryPolicy;
use super::LlmClient;
use crate::error::LlmError;
use crate::protocol::{LlmResponse, Message, TokenUsage};

#[derive(Debug, Clone)]
pub struct OpenAiClientConfig {
    pub base_url: String,
    pub model: String,
    pub api_key: Option<String>,
    pub temperature: f32,
    pub request_timeout: Duration,
    pub retry: RetryPolicy,
}

pub struct OpenAiClient {
    http: reqwest::Client,
    config: OpenAiClientConfig,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<CompletionChoice>,
    #[serde(default)]
    usage: Option<TokenUsage>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Debug, Deserialize)]
struct CompletionMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Outcome of a single HTTP attempt.
enum Attempt {
    Done(LlmResponse),
    RateLimited(String),
}

impl OpenAiClient {
    pub fn new(config: OpenAiClientConfig) -> Result<Self, LlmError> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| LlmError::Transport(e.to_string()))?;
        Ok(Self { http, config })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/chat/completions",
            self.config.base_url.trim_end_matches('/')
        )
    }

    fn build_body(&self, messages: &[Message]) -> Value {
        json!({
            "model": self.config.model,
            "messages": messages,
            "temperature": self.config.temperature,
            "stream": false,
        })
    }

    async fn attempt(&self, body: &Value) -> Result<Attempt, LlmError> {
        let mut request = self.http.post(self.endpoint()).json(body);
        if let Some(key) = &self.config.api_key {
            request = request.bearer_auth(key);
        }

        let resp = request.send().await.map_err(|e| {
            if e.is_timeout() {
                LlmError::Timeout(self.config.request_timeout)
            } else {
                LlmError::Transport(e.to_string())
            }
        })?;

        let status = resp.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let text = resp.text().await.unwrap_or_default();
            return Ok(Attempt::RateLimited(text));
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(LlmError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: CompletionResponse = resp
            .json()
            .await
            .map_err(|e| LlmError::MalformedResponse(e.to_string()))?;
        parse_completion(parsed).map(Attempt::Done)
    }
}

fn parse_completion(parsed: CompletionResponse) -> Result<LlmResponse, LlmError> {
    let choice = parsed
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| LlmError::MalformedResponse("response had no choices".to_string()))?;
    Ok(LlmResponse {
        content: choice.message.content.unwrap_or_default(),
        usage: parsed.usage.unwrap_or_default(),
    })
}

#[async_trait]
impl LlmClient for OpenAiClient {
    async fn invoke(&self, messages: &[Message]) -> Result<LlmResponse, LlmError> {
        let body = self.build_body(messages);
        let mut backoff = self.config.retry.backoff();

        loop {
            match self.attempt(&body).await? {
                Attempt::Done(response) => {
                    debug!(
                        "[OpenAiClient] {} messages -> {} chars ({} tokens)",
                        messages.len(),
                        response.content.len(),
                        response.usage.total_tokens
                    );
                    return Ok(response);
                }
                Attempt::RateLimited(detail) => match backoff.next_delay() {
                    Some(delay) => {
                        warn!(
                            "[OpenAiClient] Rate limited (attempt {}), waiting {:?}: {}",
                            backoff.attempts(),
                            delay,
                            detail
                        );
                        sleep(delay).await;
                    }
                    None => {
                        return Err(LlmError::RateLimitExhausted {
                            attempts: backoff.attempts() + 1,
                        })
                    }
                },
            }
        }
    }
}
