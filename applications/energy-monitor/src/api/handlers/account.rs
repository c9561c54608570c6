use axum::{extract::State, Json};

use crate::{api::models::consumption::FetchResponse, error::Result, octopus::Topology};

use super::AppState;

/// GET /api/account-info
/// Fetches the account's properties and meters from the provider.
pub async fn get_account_info(State(state): State<AppState>) -> Result<Json<Topology>> {
    let topology = state.pipeline()?.account_topology().await?;

    Ok(Json(topology))
}

/// GET /api/fetch-data
/// Runs one ingestion cycle over the trailing window and reports what was stored.
pub async fn fetch_data(State(state): State<AppState>) -> Result<Json<FetchResponse>> {
    let report = state.pipeline()?.run().await?;

    Ok(Json(FetchResponse::success(report)))
}
