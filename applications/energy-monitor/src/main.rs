use std::sync::Arc;

use energy_monitor::{
    api::{self, AppState},
    config::Config,
    db,
    ingest::IngestionPipeline,
    octopus,
    repositories::ReadingsRepository,
    scheduler::IngestScheduler,
};
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    // Optional .env for credentials during local runs
    dotenvy::dotenv().ok();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();

    info!("Starting energy-monitor");

    let cfg_path = std::env::var("APP_CONFIG").unwrap_or_else(|_| "config/config.yaml".into());
    let cfg = Config::load(&cfg_path)?;
    info!("Configuration loaded");

    let pool = db::connect(&cfg.database).await?;
    db::init_schema(&pool).await?;
    info!("Connected to database");

    let repository = ReadingsRepository::new(pool);

    let pipeline = match cfg.octopus.credentials() {
        Ok(creds) => {
            let provider = octopus::build_provider(&cfg.octopus, &creds)?;
            info!(
                transport = ?cfg.octopus.transport,
                account = %creds.account_number,
                "Octopus client initialized"
            );
            Some(Arc::new(IngestionPipeline::new(
                provider,
                repository.clone(),
                creds.account_number,
                cfg.ingest.lookback_days,
            )))
        }
        Err(e) => {
            warn!("{} (fetch endpoints disabled)", e);
            None
        }
    };

    let scheduler_handle = match (&pipeline, cfg.scheduler.clone()) {
        (Some(pipeline), Some(scheduler_cfg)) => {
            let scheduler = IngestScheduler::new(pipeline.clone(), scheduler_cfg);
            Some(tokio::spawn(async move {
                scheduler.run().await;
            }))
        }
        (None, Some(_)) => {
            warn!("Scheduler configured but credentials are missing, not starting it");
            None
        }
        _ => None,
    };

    let router = api::create_router(AppState {
        repository,
        pipeline,
    });
    let addr = format!("{}:{}", cfg.api.host, cfg.api.port);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to bind to {}: {}", addr, e))?;

    info!("API server listening on {}", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(handle) = scheduler_handle {
        handle.abort();
    }

    info!("Application shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
