//! One ingestion cycle: topology, then consumption per meter, then upsert.
//!
//! Meters are processed sequentially. A failed consumption fetch is logged and
//! recorded in the report, and the cycle moves on to the next meter. Topology
//! and store failures abort the cycle.

use chrono::{DateTime, Duration, DurationRound, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, error, info};

use crate::error::Result;
use crate::models::reading::format_timestamp;
use crate::models::{FuelType, NewReading};
use crate::octopus::{ConsumptionProvider, Topology};
use crate::repositories::ReadingsRepository;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngestWindow {
    pub period_from: DateTime<Utc>,
    pub period_to: DateTime<Utc>,
}

impl IngestWindow {
    /// `[now - days, now)`, truncated to whole seconds.
    pub fn trailing(now: DateTime<Utc>, days: i64) -> Self {
        let period_to = now.duration_trunc(Duration::seconds(1)).unwrap_or(now);
        Self {
            period_from: period_to - Duration::days(days),
            period_to,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MeterFailure {
    pub fuel_type: FuelType,
    pub meter_point: String,
    pub serial_number: String,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IngestReport {
    pub electricity_readings: usize,
    pub gas_readings: usize,
    pub period_from: String,
    pub period_to: String,
    pub failed_meters: Vec<MeterFailure>,
}

pub struct IngestionPipeline {
    provider: Arc<dyn ConsumptionProvider>,
    repository: ReadingsRepository,
    account_number: String,
    lookback_days: i64,
}

impl IngestionPipeline {
    pub fn new(
        provider: Arc<dyn ConsumptionProvider>,
        repository: ReadingsRepository,
        account_number: impl Into<String>,
        lookback_days: i64,
    ) -> Self {
        Self {
            provider,
            repository,
            account_number: account_number.into(),
            lookback_days,
        }
    }

    pub async fn account_topology(&self) -> Result<Topology> {
        Ok(self
            .provider
            .get_account_topology(&self.account_number)
            .await?)
    }

    /// Runs a cycle over the configured trailing window ending now.
    pub async fn run(&self) -> Result<IngestReport> {
        self.run_window(IngestWindow::trailing(Utc::now(), self.lookback_days))
            .await
    }

    pub async fn run_window(&self, window: IngestWindow) -> Result<IngestReport> {
        info!(
            account = %self.account_number,
            period_from = %format_timestamp(window.period_from),
            period_to = %format_timestamp(window.period_to),
            "Starting ingestion cycle"
        );

        let topology = self.account_topology().await?;
        let mut report = IngestReport {
            electricity_readings: 0,
            gas_readings: 0,
            period_from: format_timestamp(window.period_from),
            period_to: format_timestamp(window.period_to),
            failed_meters: Vec::new(),
        };

        for meter in topology.meters() {
            let raw = match self
                .provider
                .get_consumption(&meter, window.period_from, window.period_to)
                .await
            {
                Ok(raw) => raw,
                Err(e) => {
                    error!(
                        fuel_type = %meter.fuel_type,
                        meter_point = %meter.meter_point,
                        serial_number = %meter.serial_number,
                        error = %e,
                        "Consumption fetch failed, skipping meter"
                    );
                    report.failed_meters.push(MeterFailure {
                        fuel_type: meter.fuel_type,
                        meter_point: meter.meter_point.clone(),
                        serial_number: meter.serial_number.clone(),
                        error: e.to_string(),
                    });
                    continue;
                }
            };

            let readings: Vec<NewReading> = raw
                .into_iter()
                .map(|r| r.into_new_reading(meter.fuel_type))
                .collect();
            let written = self.repository.upsert_many(&readings).await?;
            debug!(
                fuel_type = %meter.fuel_type,
                meter_point = %meter.meter_point,
                serial_number = %meter.serial_number,
                count = written,
                "Stored readings"
            );

            match meter.fuel_type {
                FuelType::Electricity => report.electricity_readings += written,
                FuelType::Gas => report.gas_readings += written,
            }
        }

        info!(
            electricity = report.electricity_readings,
            gas = report.gas_readings,
            failed_meters = report.failed_meters.len(),
            "Ingestion cycle complete"
        );
        Ok(report)
    }
}
