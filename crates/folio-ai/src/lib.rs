//! AI completion gateway client for Folio.
//!
//! [`TextGenerator`] is the seam the writing driver generates through;
//! [`GatewayClient`] implements it against a chat-completions style HTTP API
//! with bearer-token auth and the 429 retry policy in [`RetryPolicy`].

pub mod error;
pub mod gateway;
pub mod retry;

use std::future::Future;

pub use error::{Error, Result};
pub use gateway::{GatewayClient, GatewayConfig};
pub use retry::RetryPolicy;

/// One non-streaming completion request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
  pub system:     String,
  pub prompt:     String,
  pub max_tokens: u32,
}

/// Anything that can turn a prompt into text.
pub trait TextGenerator: Send + Sync {
  fn generate<'a>(
    &'a self,
    request: &'a GenerationRequest,
  ) -> impl Future<Output = Result<String>> + Send + 'a;
}
