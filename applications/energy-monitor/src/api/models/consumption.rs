use serde::Serialize;

use crate::{
    ingest::{IngestReport, MeterFailure},
    models::{reading::format_timestamp, Reading, ReadingStats},
};

#[derive(Debug, Serialize)]
pub struct ConsumptionEntry {
    pub interval_start: String,
    pub interval_end: String,
    pub consumption: f64,
}

impl From<Reading> for ConsumptionEntry {
    fn from(reading: Reading) -> Self {
        Self {
            interval_start: format_timestamp(reading.interval_start),
            interval_end: format_timestamp(reading.interval_end),
            consumption: reading.consumption,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct FuelStats {
    pub reading_count: i64,
    pub total_consumption: Option<f64>,
    pub earliest_reading: Option<String>,
    pub latest_reading: Option<String>,
}

impl From<ReadingStats> for FuelStats {
    fn from(stats: ReadingStats) -> Self {
        Self {
            reading_count: stats.count,
            total_consumption: stats.total,
            earliest_reading: stats.earliest.map(format_timestamp),
            latest_reading: stats.latest.map(format_timestamp),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub electricity: FuelStats,
    pub gas: FuelStats,
}

#[derive(Debug, Serialize)]
pub struct FetchResponse {
    pub status: &'static str,
    pub electricity_readings: usize,
    pub gas_readings: usize,
    pub period_from: String,
    pub period_to: String,
    pub failed_meters: Vec<MeterFailure>,
}

impl FetchResponse {
    pub fn success(report: IngestReport) -> Self {
        Self {
            status: "success",
            electricity_readings: report.electricity_readings,
            gas_readings: report.gas_readings,
            period_from: report.period_from,
            period_to: report.period_to,
            failed_meters: report.failed_meters,
        }
    }
}
