//! HTTP server assembly for Folio.
//!
//! Loads [`ServerConfig`], guards the admin routes with Basic auth, and
//! layers request tracing over the [`folio_api`] routers.

pub mod auth;
pub mod error;

pub use error::Error;

use std::{path::PathBuf, sync::Arc, time::Duration};

use axum::{Router, middleware};
use folio_ai::{GatewayConfig, RetryPolicy, TextGenerator};
use folio_api::{ApiState, admin_router, api_router};
use folio_core::{ledger::WordLimit, store::WritingStore};
use serde::Deserialize;
use tower_http::trace::TraceLayer;

use auth::{AuthConfig, require_admin};

// ─── Configuration ────────────────────────────────────────────────────────────

/// Runtime server configuration, from `config.toml` and `FOLIO_*` variables.
#[derive(Deserialize, Clone)]
pub struct ServerConfig {
  #[serde(default = "defaults::host")]
  pub host:                       String,
  #[serde(default = "defaults::port")]
  pub port:                       u16,
  pub store_path:                 PathBuf,
  pub admin_username:             String,
  pub admin_password_hash:        String,
  pub gateway_url:                String,
  pub gateway_api_key:            String,
  pub model:                      String,
  /// Quota for newly seen users; `-1` is unlimited.
  #[serde(default = "defaults::monthly_word_limit")]
  pub default_monthly_word_limit: i64,
  #[serde(default = "defaults::retry_base_delay_ms")]
  pub retry_base_delay_ms:        u64,
  #[serde(default = "defaults::sweep_interval_secs")]
  pub sweep_interval_secs:        u64,
  #[serde(default = "defaults::stall_after_secs")]
  pub stall_after_secs:           u64,
  #[serde(default = "defaults::usage_retention_months")]
  pub usage_retention_months:     u32,
}

mod defaults {
  pub fn host() -> String { "127.0.0.1".to_string() }
  pub fn port() -> u16 { 8080 }
  pub fn monthly_word_limit() -> i64 { 5000 }
  pub fn retry_base_delay_ms() -> u64 { 5000 }
  pub fn sweep_interval_secs() -> u64 { 60 }
  pub fn stall_after_secs() -> u64 { 300 }
  pub fn usage_retention_months() -> u32 { 12 }
}

impl ServerConfig {
  /// Read `path` (optional) layered under `FOLIO_`-prefixed environment
  /// variables.
  pub fn load(path: PathBuf) -> Result<Self, config::ConfigError> {
    config::Config::builder()
      .add_source(config::File::from(path).required(false))
      .add_source(config::Environment::with_prefix("FOLIO").try_parsing(true))
      .build()?
      .try_deserialize()
  }

  pub fn default_limit(&self) -> Result<WordLimit, folio_core::Error> {
    WordLimit::try_from(self.default_monthly_word_limit)
  }

  pub fn gateway(&self) -> GatewayConfig {
    GatewayConfig {
      base_url: self.gateway_url.clone(),
      api_key:  self.gateway_api_key.clone(),
      model:    self.model.clone(),
    }
  }

  pub fn retry_policy(&self) -> RetryPolicy {
    RetryPolicy::with_base_delay(Duration::from_millis(self.retry_base_delay_ms))
  }

  pub fn sweep_interval(&self) -> Duration { Duration::from_secs(self.sweep_interval_secs) }

  pub fn stall_after(&self) -> Duration { Duration::from_secs(self.stall_after_secs) }

  pub fn auth(&self) -> AuthConfig {
    AuthConfig {
      username:      self.admin_username.clone(),
      password_hash: self.admin_password_hash.clone(),
    }
  }
}

// ─── Router ───────────────────────────────────────────────────────────────────

/// The public API plus the admin routes behind Basic auth, with tracing.
pub fn router<S, G>(state: ApiState<S, G>, auth: Arc<AuthConfig>) -> Router
where
  S: WritingStore + 'static,
  G: TextGenerator + 'static,
{
  let admin = admin_router(state.clone())
    .layer(middleware::from_fn_with_state(auth, require_admin));

  Router::new()
    .merge(api_router(state))
    .merge(admin)
    .layer(TraceLayer::new_for_http())
}
