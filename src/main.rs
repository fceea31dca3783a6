use anyhow::Result;
use std::sync::Arc;
use tracing::info;

use penerjemah::adapters::build_adapters;
use penerjemah::broker::TranslationBroker;
use penerjemah::config::Config;
use penerjemah::db::Database;
use penerjemah::history::HistoryClient;
use penerjemah::scheduler::start_scheduler;
use penerjemah::server::{router, AppState};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file (ignored in production)
    let _ = dotenvy::dotenv();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("penerjemah=info".parse()?),
        )
        .init();

    info!("Starting penerjemah");

    // Load configuration from environment
    let config = Config::from_env()?;

    // Open durable state and build the broker
    if let Some(parent) = std::path::Path::new(&config.database_path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let db = Database::new(&config.database_path)?;
    let broker = Arc::new(TranslationBroker::new(db, build_adapters(&config))?);

    // Optional remote auth/history collaborator
    let history = config
        .history_api_url
        .clone()
        .map(|url| Arc::new(HistoryClient::new(url)));
    if history.is_none() {
        info!("HISTORY_API_URL not set, history endpoints disabled");
    }

    // Daily free-quota rollover
    let _scheduler = start_scheduler(Arc::clone(&broker), &config.usage_reset_time).await?;

    // Serve the HTTP API
    let state = AppState {
        broker,
        history,
        admin_api_key: config.admin_api_key.clone(),
    };
    let app = router(state);

    let addr = format!("0.0.0.0:{}", config.port);
    info!("Listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
