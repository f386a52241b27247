//! folio-server binary.
//!
//! Reads `config.toml` (or the path given with `--config`) plus `FOLIO_*`
//! environment variables, opens the SQLite store, starts the background
//! writing worker and the reconciliation sweep, and serves the JSON API.
//!
//! # Password hash generation
//!
//! To generate the argon2 PHC string for `admin_password_hash`:
//!
//! ```
//! cargo run -p folio-server -- --hash-password
//! ```

use std::{
  path::{Path, PathBuf},
  sync::Arc,
};

use anyhow::Context as _;
use argon2::{Argon2, PasswordHasher, password_hash::SaltString};
use clap::Parser;
use folio_ai::GatewayClient;
use folio_api::ApiState;
use folio_server::ServerConfig;
use folio_store_sqlite::SqliteStore;
use folio_writer::{Driver, Ledger, continuation_queue};
use rand_core::OsRng;
use tokio::net::TcpListener;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "Folio background writing server")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "config.toml")]
  config: PathBuf,

  /// Print the argon2 hash for a password entered on stdin and exit.
  #[arg(long)]
  hash_password: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();

  if cli.hash_password {
    let password = read_password()?;
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
      .hash_password(password.as_bytes(), &salt)
      .map_err(|e| anyhow::anyhow!("argon2 error: {e}"))?
      .to_string();
    println!("{hash}");
    return Ok(());
  }

  let cfg = ServerConfig::load(cli.config).context("failed to load configuration")?;
  let default_limit = cfg
    .default_limit()
    .context("invalid default_monthly_word_limit")?;

  let store_path = expand_tilde(&cfg.store_path);
  let store = SqliteStore::open(&store_path)
    .await
    .with_context(|| format!("failed to open store at {store_path:?}"))?;
  let store = Arc::new(store);

  let gateway = GatewayClient::new(cfg.gateway(), cfg.retry_policy())
    .context("failed to build AI gateway client")?;

  let (queue, receiver) = continuation_queue();
  let ledger = Ledger::new(store.clone(), default_limit);
  let driver = Driver::new(store, Arc::new(gateway), Arc::new(queue), ledger);

  tokio::spawn(driver.clone().run_worker(receiver));
  tokio::spawn(
    driver
      .clone()
      .run_sweeper(cfg.sweep_interval(), cfg.stall_after()),
  );

  let state = ApiState { driver, usage_retention_months: cfg.usage_retention_months };
  let app = folio_server::router(state, Arc::new(cfg.auth()));
  let address = format!("{}:{}", cfg.host, cfg.port);

  tracing::info!(model = %cfg.model, "Listening on http://{address}");
  let listener = TcpListener::bind(&address)
    .await
    .with_context(|| format!("failed to bind {address}"))?;

  axum::serve(listener, app).await.context("server error")?;

  Ok(())
}

/// Read a password from stdin.
fn read_password() -> anyhow::Result<String> {
  use std::io::{self, BufRead, Write};
  print!("Password: ");
  io::stdout().flush().ok();
  let mut line = String::new();
  io::stdin().lock().read_line(&mut line)?;
  Ok(line.trim_end_matches(['\n', '\r']).to_string())
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}
