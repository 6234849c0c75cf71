//! rehab-portal server binary.
//!
//! Reads `rehab.toml` (or the path given with `--config`) plus `REHAB_*`
//! environment overrides, opens the SQLite store and serves the portal over
//! HTTP.
//!
//! # Granting roles
//!
//! Self-registered accounts get the configured default role. To promote the
//! first administrator:
//!
//! ```text
//! rehab-portal --grant-role admin@example.org=admin
//! ```

use std::{
  path::{Path, PathBuf},
  str::FromStr,
  sync::Arc,
};

use anyhow::Context as _;
use clap::Parser;
use rehab_core::{
  Role,
  store::{AuthService, CareStore},
};
use rehab_portal::{AppState, ServerConfig};
use rehab_store_sqlite::SqliteStore;
use tokio::net::TcpListener;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "RehabCare portal server")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "rehab.toml")]
  config: PathBuf,

  /// Set a user's role and exit. `EMAIL=ROLE`; `none` clears the role.
  #[arg(long, value_name = "EMAIL=ROLE")]
  grant_role: Option<String>,
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

  let settings = config::Config::builder()
    .add_source(config::File::from(cli.config).required(false))
    .add_source(config::Environment::with_prefix("REHAB"))
    .build()
    .context("failed to read config file")?;

  let server_cfg: ServerConfig = settings
    .try_deserialize()
    .context("failed to deserialise ServerConfig")?;

  let store_path = expand_tilde(&server_cfg.store_path);
  let store = SqliteStore::open(&store_path)
    .await
    .with_context(|| format!("failed to open store at {store_path:?}"))?
    .with_auth_policy(server_cfg.auth_policy());

  if let Some(grant) = cli.grant_role {
    return grant_role(&store, &grant).await;
  }

  let store = Arc::new(store);
  let state = AppState {
    auth:   store.clone(),
    store,
    config: Arc::new(server_cfg.clone()),
  };

  let app = rehab_portal::router(state);
  let address = format!("{}:{}", server_cfg.host, server_cfg.port);

  tracing::info!("Listening on http://{address}");
  let listener = TcpListener::bind(&address)
    .await
    .with_context(|| format!("failed to bind {address}"))?;

  axum::serve(listener, app).await.context("server error")?;

  Ok(())
}

/// Parse `EMAIL=ROLE` and apply it.
async fn grant_role(store: &SqliteStore, grant: &str) -> anyhow::Result<()> {
  let (email, role) = grant
    .split_once('=')
    .context("expected EMAIL=ROLE")?;
  let role = match role.trim() {
    "none" => None,
    other => Some(Role::from_str(other).with_context(|| format!("unknown role {other:?}"))?),
  };

  let user = store
    .find_user_by_email(email.trim())
    .await?
    .with_context(|| format!("no user with email {email:?}"))?;
  let profile = store
    .set_role(user.id, role)
    .await?
    .with_context(|| format!("user {} has no profile", user.id))?;

  tracing::info!(user = %user.id, role = ?profile.role, "role updated");
  Ok(())
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  match (s.strip_prefix("~/"), std::env::var("HOME")) {
    (Some(rest), Ok(home)) => PathBuf::from(home).join(rest),
    _ => path.to_path_buf(),
  }
}
