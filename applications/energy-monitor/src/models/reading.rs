use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::AppError;

/// Metered fuel. Electricity is measured in kWh, gas in m³ (or kWh for SMETS2
/// meters, as reported by the provider).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FuelType {
    Electricity,
    Gas,
}

impl FuelType {
    pub const ALL: [FuelType; 2] = [FuelType::Electricity, FuelType::Gas];

    pub fn as_str(&self) -> &'static str {
        match self {
            FuelType::Electricity => "electricity",
            FuelType::Gas => "gas",
        }
    }
}

impl fmt::Display for FuelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FuelType {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "electricity" => Ok(FuelType::Electricity),
            "gas" => Ok(FuelType::Gas),
            other => Err(AppError::Validation(format!("Unknown fuel type: {}", other))),
        }
    }
}

/// A stored interval reading, keyed by `(fuel_type, interval_start)`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reading {
    pub fuel_type: FuelType,
    pub interval_start: DateTime<Utc>,
    pub interval_end: DateTime<Utc>,
    pub consumption: f64,
    pub updated_at: DateTime<Utc>,
}

/// Input to the store's upsert; `updated_at` is always assigned by the store.
#[derive(Debug, Clone, PartialEq)]
pub struct NewReading {
    pub fuel_type: FuelType,
    pub interval_start: DateTime<Utc>,
    pub interval_end: DateTime<Utc>,
    pub consumption: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReadingStats {
    pub count: i64,
    pub total: Option<f64>,
    pub earliest: Option<DateTime<Utc>>,
    pub latest: Option<DateTime<Utc>>,
}

/// Fixed-width UTC rendering used for every stored timestamp, so that text
/// comparison in SQL matches chronological order.
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}

pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(raw).map(|dt| dt.with_timezone(&Utc))
}
