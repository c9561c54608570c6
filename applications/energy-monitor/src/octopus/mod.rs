//! Octopus Energy client.
//!
//! Two transports implement [`ConsumptionProvider`]: the Kraken GraphQL API
//! ([`GraphQlClient`]) and the REST API ([`RestClient`]). Which one is used is a
//! configuration choice; the ingestion pipeline only sees the trait.
//!
//! Neither transport follows continuation cursors. A single page holds up to
//! [`PAGE_SIZE`] readings, and a truncated page is logged, not fetched further.

pub mod graphql;
pub mod rest;
pub mod test_support;
pub mod types;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::config::{Credentials, OctopusConfig, Transport};

pub use graphql::GraphQlClient;
pub use rest::RestClient;
pub use types::{MeterRef, RawReading, Topology};

pub const PAGE_SIZE: usize = 1500;

const MAX_ERROR_BODY: usize = 512;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("{0}")]
    Auth(String),
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("provider returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("provider reported errors: {0}")]
    Provider(String),
    #[error("malformed provider payload: {0}")]
    Payload(String),
}

#[async_trait]
pub trait ConsumptionProvider: Send + Sync {
    async fn get_account_topology(&self, account_number: &str) -> Result<Topology, ProviderError>;

    /// Readings for one meter in `[period_from, period_to)`, oldest first,
    /// at most [`PAGE_SIZE`] of them.
    async fn get_consumption(
        &self,
        meter: &MeterRef,
        period_from: DateTime<Utc>,
        period_to: DateTime<Utc>,
    ) -> Result<Vec<RawReading>, ProviderError>;
}

/// Builds the configured transport. Called once at startup.
pub fn build_provider(
    cfg: &OctopusConfig,
    creds: &Credentials,
) -> Result<Arc<dyn ConsumptionProvider>, ProviderError> {
    let http = http_client(Duration::from_secs(cfg.timeout_secs))?;

    let provider: Arc<dyn ConsumptionProvider> = match cfg.transport {
        Transport::GraphQl => Arc::new(GraphQlClient::new(
            http,
            &cfg.graphql_url,
            &creds.api_key,
            Duration::from_secs(cfg.token_ttl_secs),
        )),
        Transport::Rest => Arc::new(RestClient::new(http, &cfg.rest_url, &creds.api_key)),
    };
    Ok(provider)
}

/// Shared client for both transports. `timeout` bounds connect and the whole request.
pub fn http_client(timeout: Duration) -> Result<reqwest::Client, ProviderError> {
    let client = reqwest::Client::builder()
        .timeout(timeout)
        .connect_timeout(timeout)
        .user_agent(concat!("energy-monitor/", env!("CARGO_PKG_VERSION")))
        .build()?;
    Ok(client)
}

/// Maps 401/403 to [`ProviderError::Auth`], any other non-success status to
/// [`ProviderError::Status`], and decodes a success body as JSON.
pub(crate) async fn read_json<T: DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, ProviderError> {
    let status = response.status();

    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return Err(ProviderError::Auth(format!(
            "provider rejected credentials ({})",
            status
        )));
    }

    if !status.is_success() {
        let mut body = response.text().await.unwrap_or_default();
        if body.len() > MAX_ERROR_BODY {
            let cut = (0..=MAX_ERROR_BODY)
                .rev()
                .find(|i| body.is_char_boundary(*i))
                .unwrap_or(0);
            body.truncate(cut);
        }
        return Err(ProviderError::Status {
            status: status.as_u16(),
            body,
        });
    }

    let bytes = response.bytes().await?;
    serde_json::from_slice(&bytes).map_err(|e| ProviderError::Payload(e.to_string()))
}
