use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;

use crate::{
    api::models::consumption::{ConsumptionEntry, FuelStats, StatsResponse},
    error::{AppError, Result},
    models::FuelType,
};

use super::AppState;

pub const DEFAULT_DAYS: i64 = 7;
/// Upper bound on `days`, roughly a century.
pub const MAX_DAYS: i64 = 36_500;

/// GET /api/consumption/{fuel_type}?days=N
/// Readings newer than N days ago, newest first.
pub async fn get_consumption(
    State(state): State<AppState>,
    Path(fuel_type): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<Vec<ConsumptionEntry>>> {
    let fuel_type: FuelType = fuel_type.parse()?;
    let days = parse_days(params.get("days").map(String::as_str))?;

    let since = window_start(Utc::now(), days)?;
    let readings = state.repository.list(fuel_type, since).await?;

    Ok(Json(readings.into_iter().map(ConsumptionEntry::from).collect()))
}

/// GET /api/stats
pub async fn get_stats(State(state): State<AppState>) -> Result<Json<StatsResponse>> {
    let electricity = state.repository.stats(FuelType::Electricity).await?;
    let gas = state.repository.stats(FuelType::Gas).await?;

    Ok(Json(StatsResponse {
        electricity: FuelStats::from(electricity),
        gas: FuelStats::from(gas),
    }))
}

fn parse_days(raw: Option<&str>) -> Result<i64> {
    let Some(raw) = raw else {
        return Ok(DEFAULT_DAYS);
    };

    match raw.trim().parse::<i64>() {
        Ok(days) if (0..=MAX_DAYS).contains(&days) => Ok(days),
        Ok(days) if days < 0 => Err(AppError::Validation(format!(
            "days must not be negative: {}",
            raw
        ))),
        Ok(_) => Err(AppError::Validation(format!(
            "days out of range (max {}): {}",
            MAX_DAYS, raw
        ))),
        Err(_) => Err(AppError::Validation(format!(
            "days must be an integer: {}",
            raw
        ))),
    }
}

fn window_start(now: DateTime<Utc>, days: i64) -> Result<DateTime<Utc>> {
    Duration::try_days(days)
        .and_then(|span| now.checked_sub_signed(span))
        .ok_or_else(|| AppError::Validation(format!("days out of range: {}", days)))
}
