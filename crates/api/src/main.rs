use anyhow::{Context, Result};
use api::{AppConfig, AppState, LogFormat};
use dataset::ProjectStore;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let config = AppConfig::from_env()?;

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match config.logging.format {
        LogFormat::Json => tracing_subscriber::fmt().with_env_filter(filter).json().init(),
        LogFormat::Pretty => tracing_subscriber::fmt().with_env_filter(filter).init(),
    }

    let projects = ProjectStore::new(&config.server.project_dir);
    let existing = projects.list_projects().await?;
    tracing::info!(
        project_dir = config.server.project_dir.as_str(),
        projects = existing.len(),
        check_overlap_on_update = config.store.check_overlap_on_update,
        "Loaded project directory"
    );

    let state = Arc::new(AppState::new(projects, config.store));

    let mut app = api::router(state);
    if config.server.cors_permissive {
        app = app.layer(CorsLayer::permissive());
    }

    let listener = tokio::net::TcpListener::bind(&config.server.bind_addr)
        .await
        .context(format!("Failed to bind {}", config.server.bind_addr))?;

    tracing::info!("Server listening on http://{}", config.server.bind_addr);

    axum::serve(listener, app).await?;
    Ok(())
}
