//! Periodic ingestion background task
//!
//! Runs an ingestion cycle on a fixed interval. The first cycle happens one
//! interval after startup; `/api/fetch-data` covers the on-demand case.

use std::sync::Arc;
use std::time::Duration;
use tokio::time::interval;

use crate::config::SchedulerConfig;
use crate::ingest::IngestionPipeline;

pub struct IngestScheduler {
    pipeline: Arc<IngestionPipeline>,
    config: SchedulerConfig,
}

impl IngestScheduler {
    pub fn new(pipeline: Arc<IngestionPipeline>, config: SchedulerConfig) -> Self {
        Self { pipeline, config }
    }

    /// Never returns. A failed cycle is logged and the loop waits for the next tick.
    pub async fn run(&self) {
        tracing::info!(
            "Ingest scheduler started (interval: {}s)",
            self.config.interval_secs
        );

        let mut interval = interval(Duration::from_secs(self.config.interval_secs));

        // The first tick completes immediately.
        interval.tick().await;

        loop {
            interval.tick().await;
            self.tick().await;
        }
    }

    async fn tick(&self) {
        match self.pipeline.run().await {
            Ok(report) if !report.failed_meters.is_empty() => {
                tracing::warn!(
                    "Scheduled ingestion finished with {} failed meter(s)",
                    report.failed_meters.len()
                );
            }
            Ok(_) => {}
            Err(e) => tracing::error!("Scheduled ingestion failed: {}", e),
        }
    }
}
