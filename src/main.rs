use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;

use tenderflow_backend::app;
use tenderflow_backend::clock::SystemClock;
use tenderflow_backend::config;
use tenderflow_backend::db;
use tenderflow_backend::lifecycle::ExpirySweeper;
use tenderflow_backend::logging;
use tenderflow_backend::services::{AiClient, AiSummarizer, NoopSummarizer, Summarizer};
use tenderflow_backend::store::{MemoryStore, PgStore, ProcurementStore};

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration
    let settings = config::Settings::from_env()?;

    // Initialize logging
    logging::init_logging(&settings.env);

    tracing::info!(
        env = ?settings.env,
        server_addr = %settings.server_addr,
        "Starting tenderflow backend"
    );

    // Select the store backend
    let store: Arc<dyn ProcurementStore> = match &settings.database_url {
        Some(url) => {
            let pool = db::create_pool(url, settings.database_max_connections).await?;
            db::run_migrations(&pool).await?;
            Arc::new(PgStore::new(pool))
        }
        None => {
            tracing::warn!("DATABASE_URL not set; using the in-memory store");
            Arc::new(MemoryStore::new())
        }
    };

    // AI narrative service is optional; without a token every analysis uses
    // the deterministic fallback text.
    let (summarizer, ai_client): (Arc<dyn Summarizer>, Option<AiClient>) =
        match &settings.ai_service_token {
            Some(token) => {
                let client = AiClient::new(
                    &settings.ai_service_url,
                    token,
                    settings.ai_service_timeout_seconds,
                )?;

                // Optionally check AI service health (non-blocking)
                tokio::spawn({
                    let client = client.clone();
                    async move {
                        match client.health_check().await {
                            Ok(()) => tracing::info!("AI service is healthy"),
                            Err(e) => tracing::warn!(
                                error = %e,
                                "AI service health check failed - will retry on first request"
                            ),
                        }
                    }
                });

                (Arc::new(AiSummarizer::new(client.clone())), Some(client))
            }
            None => {
                tracing::info!("AI_SERVICE_TOKEN not set; narrative augmentation disabled");
                (Arc::new(NoopSummarizer), None)
            }
        };

    let clock = Arc::new(SystemClock);

    // Create application state
    let state = app::AppState::new(
        settings.clone(),
        store,
        summarizer,
        ai_client,
        clock,
    );

    // Start the expiry sweep
    ExpirySweeper::new(
        state.tenders.clone(),
        Duration::from_secs(settings.sweep_interval_seconds),
    )
    .spawn();

    // Build application
    let app = app::create_app(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(&settings.server_addr).await?;
    tracing::info!("Listening on {}", settings.server_addr);

    axum::serve(listener, app).await?;

    Ok(())
}
