//! Async HTTP client for a chat-completions style AI gateway.

use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

use crate::{Error, GenerationRequest, Result, RetryPolicy, TextGenerator};

/// Connection settings for the gateway.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
  /// Base URL; `/chat/completions` is appended.
  pub base_url: String,
  pub api_key:  String,
  pub model:    String,
}

/// Gateway client.
///
/// Cheap to clone; the inner [`reqwest::Client`] is `Arc`-based.
#[derive(Clone)]
pub struct GatewayClient {
  client: Client,
  config: GatewayConfig,
  retry:  RetryPolicy,
}

// ─── Wire types ──────────────────────────────────────────────────────────────

#[derive(Serialize)]
struct ChatRequest<'a> {
  model:      &'a str,
  messages:   [ChatMessage<'a>; 2],
  max_tokens: u32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
  role:    &'static str,
  content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
  #[serde(default)]
  choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
  message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
  #[serde(default)]
  content: Option<String>,
}

#[derive(Deserialize)]
struct ErrorBody {
  error: ErrorDetail,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ErrorDetail {
  Object { message: String },
  Text(String),
}

/// Pull a human-readable message out of an error body, falling back to the
/// raw text.
fn upstream_message(body: &str) -> String {
  match serde_json::from_str::<ErrorBody>(body) {
    Ok(ErrorBody { error: ErrorDetail::Object { message } }) => message,
    Ok(ErrorBody { error: ErrorDetail::Text(message) }) => message,
    Err(_) => body.trim().to_owned(),
  }
}

// ─── Client ──────────────────────────────────────────────────────────────────

impl GatewayClient {
  pub fn new(config: GatewayConfig, retry: RetryPolicy) -> Result<Self> {
    let client = Client::builder().timeout(Duration::from_secs(120)).build()?;
    Ok(Self { client, config, retry })
  }

  fn url(&self) -> String {
    format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'))
  }

  /// A single attempt. `Ok(None)` means the gateway answered 429.
  async fn attempt(&self, request: &GenerationRequest) -> Result<Option<String>> {
    let body = ChatRequest {
      model:      &self.config.model,
      messages:   [
        ChatMessage { role: "system", content: &request.system },
        ChatMessage { role: "user", content: &request.prompt },
      ],
      max_tokens: request.max_tokens,
    };

    let resp = self
      .client
      .post(self.url())
      .bearer_auth(&self.config.api_key)
      .json(&body)
      .send()
      .await?;

    let status = resp.status();
    if status == StatusCode::TOO_MANY_REQUESTS {
      return Ok(None);
    }
    if !status.is_success() {
      let text = resp.text().await.unwrap_or_default();
      return Err(Error::Upstream {
        status:  status.as_u16(),
        message: upstream_message(&text),
      });
    }

    let parsed: ChatResponse = resp.json().await?;
    let content = parsed
      .choices
      .into_iter()
      .next()
      .and_then(|c| c.message.content)
      .filter(|c| !c.trim().is_empty())
      .ok_or(Error::EmptyCompletion)?;
    Ok(Some(content))
  }
}

impl TextGenerator for GatewayClient {
  async fn generate<'a>(&'a self, request: &'a GenerationRequest) -> Result<String> {
    let attempts = self.retry.max_attempts.max(1);
    for attempt in 1..=attempts {
      if let Some(text) = self.attempt(request).await? {
        return Ok(text);
      }
      if attempt < attempts {
        let delay = self.retry.delay_after(attempt);
        tracing::warn!(attempt, ?delay, "AI gateway rate limited; retrying");
        tokio::time::sleep(delay).await;
      }
    }
    Err(Error::RateLimited { attempts })
  }
}
