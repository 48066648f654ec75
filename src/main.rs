use std::path::PathBuf;
use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use artigen::ai::credentials::EnvCredentials;
use artigen::ai::dispatch::{Dispatcher, DispatcherConfig};
use artigen::config::AppConfig;
use artigen::db::Database;
use artigen::http::{self, AppState};
use artigen::service::ChatService;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env
    dotenvy::dotenv().ok();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    tracing::info!("🚀 Iniciando o backend Artigen...");

    // Load config
    let config = AppConfig::from_env()?;
    tracing::info!("Config carregada. Modelo padrão: {}", config.default_model);

    // Initialize database
    let db = Database::connect(&config.database_url).await?;
    db.run_migrations().await?;
    db.seed_default_plans().await?;
    tracing::info!("Banco conectado, migrações e planos padrão aplicados.");

    let upload_dir = PathBuf::from(&config.upload_dir);
    tokio::fs::create_dir_all(&upload_dir).await?;

    // Provider dispatcher; API keys are re-read from the environment per call
    let dispatcher = Arc::new(Dispatcher::new(
        Arc::new(EnvCredentials),
        DispatcherConfig::from(&config),
    ));

    let service = Arc::new(ChatService::new(db, dispatcher, config.default_model.clone()));

    let app = http::router(AppState {
        service,
        upload_dir,
    });

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!("Escutando em {}", config.bind_addr);
    axum::serve(listener, app).await?;

    Ok(())
}
