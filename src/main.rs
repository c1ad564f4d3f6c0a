use anyhow::Result;
use sqlx::sqlite::SqlitePoolOptions;
use std::{fs, io::ErrorKind, path::Path, sync::Arc};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

mod config;
mod errors;
mod handlers;
mod models;
mod repository;
mod routes;
mod services;
mod state;

use config::{AppConfig, Mode};
use repository::sqlite::SqliteRepository;
use services::{
    photo_store::{CdnStore, LocalStore},
    seed::seed_demo,
    upload_client::run_upload,
};
use state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // --- Logging setup ---
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // --- Parse config + mode ---
    let (cfg, mode) = AppConfig::from_env_and_args()?;

    let (migrate, seed) = match mode {
        Mode::Upload(options) => {
            let failed = run_upload(options).await?;
            if failed > 0 {
                anyhow::bail!("{} file(s) were not uploaded", failed);
            }
            return Ok(());
        }
        Mode::Serve { migrate, seed } => (migrate, seed),
    };

    tracing::info!(
        "Starting photo-delivery on {} (storage: {}, CDN: {})",
        cfg.addr(),
        cfg.storage_dir,
        if cfg.cdn.is_some() { "enabled" } else { "disabled" }
    );

    // --- Ensure storage directory exists ---
    if !Path::new(&cfg.storage_dir).exists() {
        fs::create_dir_all(&cfg.storage_dir)?;
        tracing::info!("Created storage directory at {}", cfg.storage_dir);
    }

    // --- Initialize SQLite connection ---
    let db_url = &cfg.database_url;
    let db_path = db_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .trim_start_matches("file:");
    tracing::debug!("Interpreted SQLite path => {}", db_path);

    if db_path != ":memory:" {
        let db_path_obj = Path::new(db_path);
        if let Some(parent) = db_path_obj.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)?;
                tracing::info!("Created missing directory {:?}", parent);
            }
        }

        // SQLx will not create the file itself without `mode=rwc`.
        match fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(db_path_obj)
        {
            Ok(_) => tracing::debug!("Database file {} is ready", db_path),
            Err(e) => tracing::warn!("Failed to open database file manually: {}", e),
        }
    }

    let db = Arc::new(
        SqlitePoolOptions::new()
            .max_connections(5)
            .connect(db_url)
            .await?,
    );
    let repo = SqliteRepository::new(db);

    // --- Migrations always run; `--migrate` stops afterwards ---
    let applied = repo.migrate().await?;
    tracing::info!("Applied {} migration statements", applied);
    if migrate {
        tracing::info!("Database migration complete.");
        return Ok(());
    }

    // --- Initialize services ---
    let cdn = cfg.cdn.clone().map(CdnStore::new).transpose()?;
    let state = AppState::new(repo, LocalStore::new(&cfg.storage_dir), cdn);

    if seed && seed_demo(&state.catalog).await? {
        tracing::info!("Demo data inserted");
    }

    // --- Build router ---
    let app = routes::routes::app(state);

    // --- Start server ---
    let addr = cfg.addr();
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(err)
            if err.kind() == ErrorKind::PermissionDenied
                && matches!(cfg.host.as_str(), "0.0.0.0" | "::") =>
        {
            let fallback_addr = format!("127.0.0.1:{}", cfg.port);
            tracing::warn!(
                "Permission denied binding to {} ({}). Falling back to {}",
                addr,
                err,
                fallback_addr
            );
            TcpListener::bind(&fallback_addr).await?
        }
        Err(err) => return Err(err.into()),
    };

    tracing::info!("Server listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app).await?;

    Ok(())
}
