use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::types::{
    de_decimal, null_as_default, ElectricityMeterPoint, GasMeterPoint, Meter, MeterRef, Property,
    RawReading, Topology,
};
use super::{read_json, ConsumptionProvider, ProviderError, PAGE_SIZE};
use crate::models::reading::format_timestamp;
use crate::models::FuelType;

const OBTAIN_TOKEN: &str = r#"
mutation($apiKey: String!) {
  obtainKrakenToken(input: {APIKey: $apiKey}) {
    token
  }
}
"#;

const ACCOUNT_TOPOLOGY: &str = r#"
query($accountNumber: String!) {
  account(accountNumber: $accountNumber) {
    number
    properties {
      electricityMeterPoints {
        mpan
        meters {
          serialNumber
        }
      }
      gasMeterPoints {
        mprn
        meters {
          serialNumber
        }
      }
    }
  }
}
"#;

const ACCOUNT_CONSUMPTION: &str = r#"
query($accountNumber: String!, $fromDatetime: DateTime!, $toDatetime: DateTime!, $first: Int!) {
  account(accountNumber: $accountNumber) {
    number
    properties {
      electricityMeterPoints {
        mpan
        meters {
          serialNumber
          consumption(first: $first, fromDatetime: $fromDatetime, toDatetime: $toDatetime, orderBy: PERIOD_ASC) {
            pageInfo { hasNextPage }
            edges { node { startAt endAt value } }
          }
        }
      }
      gasMeterPoints {
        mprn
        meters {
          serialNumber
          consumption(first: $first, fromDatetime: $fromDatetime, toDatetime: $toDatetime, orderBy: PERIOD_ASC) {
            pageInfo { hasNextPage }
            edges { node { startAt endAt value } }
          }
        }
      }
    }
  }
}
"#;

#[derive(Debug, Deserialize)]
struct GraphQlResponse<T> {
    data: Option<T>,
    #[serde(default, deserialize_with = "null_as_default")]
    errors: Vec<GraphQlError>,
}

#[derive(Debug, Deserialize)]
struct GraphQlError {
    message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TokenData {
    obtain_kraken_token: Option<TokenPayload>,
}

#[derive(Debug, Deserialize)]
struct TokenPayload {
    token: String,
}

#[derive(Debug, Deserialize)]
struct AccountData {
    account: Option<AccountNode>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AccountNode {
    #[serde(default)]
    number: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    properties: Vec<PropertyNode>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PropertyNode {
    #[serde(default, deserialize_with = "null_as_default")]
    electricity_meter_points: Vec<ElectricityPointNode>,
    #[serde(default, deserialize_with = "null_as_default")]
    gas_meter_points: Vec<GasPointNode>,
}

#[derive(Debug, Clone, Deserialize)]
struct ElectricityPointNode {
    mpan: String,
    #[serde(default, deserialize_with = "null_as_default")]
    meters: Vec<MeterNode>,
}

#[derive(Debug, Clone, Deserialize)]
struct GasPointNode {
    mprn: String,
    #[serde(default, deserialize_with = "null_as_default")]
    meters: Vec<MeterNode>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MeterNode {
    serial_number: String,
    #[serde(default)]
    consumption: Option<ConsumptionConnection>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConsumptionConnection {
    #[serde(default)]
    page_info: Option<PageInfo>,
    #[serde(default, deserialize_with = "null_as_default")]
    edges: Vec<ConsumptionEdge>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PageInfo {
    #[serde(default)]
    has_next_page: bool,
}

#[derive(Debug, Clone, Deserialize)]
struct ConsumptionEdge {
    node: ConsumptionNode,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConsumptionNode {
    start_at: DateTime<Utc>,
    end_at: DateTime<Utc>,
    #[serde(deserialize_with = "de_decimal")]
    value: f64,
}

impl AccountNode {
    fn into_topology(self, requested: &str) -> Topology {
        let meters = |nodes: Vec<MeterNode>| {
            nodes
                .into_iter()
                .map(|m| Meter {
                    serial_number: m.serial_number,
                })
                .collect()
        };

        Topology {
            number: self.number.unwrap_or_else(|| requested.to_string()),
            properties: self
                .properties
                .into_iter()
                .map(|p| Property {
                    electricity_meter_points: p
                        .electricity_meter_points
                        .into_iter()
                        .map(|mp| ElectricityMeterPoint {
                            mpan: mp.mpan,
                            meters: meters(mp.meters),
                        })
                        .collect(),
                    gas_meter_points: p
                        .gas_meter_points
                        .into_iter()
                        .map(|mp| GasMeterPoint {
                            mprn: mp.mprn,
                            meters: meters(mp.meters),
                        })
                        .collect(),
                })
                .collect(),
        }
    }

    /// The connection for one meter in the account tree.
    fn consumption_for(&self, meter: &MeterRef) -> Option<ConsumptionConnection> {
        self.properties.iter().find_map(|p| {
            let meters = match meter.fuel_type {
                FuelType::Electricity => p
                    .electricity_meter_points
                    .iter()
                    .find(|mp| mp.mpan == meter.meter_point)
                    .map(|mp| &mp.meters),
                FuelType::Gas => p
                    .gas_meter_points
                    .iter()
                    .find(|mp| mp.mprn == meter.meter_point)
                    .map(|mp| &mp.meters),
            }?;
            meters
                .iter()
                .find(|m| m.serial_number == meter.serial_number)
                .map(|m| {
                    m.consumption.clone().unwrap_or(ConsumptionConnection {
                        page_info: None,
                        edges: Vec::new(),
                    })
                })
        })
    }
}

/// Last account-wide consumption response. The query returns every meter at
/// once, so meters in the same cycle share one download.
struct CachedConsumption {
    account_number: String,
    period_from: DateTime<Utc>,
    period_to: DateTime<Utc>,
    account: AccountNode,
}

impl CachedConsumption {
    fn covers(&self, account_number: &str, from: DateTime<Utc>, to: DateTime<Utc>) -> bool {
        self.account_number == account_number && self.period_from == from && self.period_to == to
    }
}

struct CachedToken {
    value: String,
    expires_at: Instant,
}

/// Kraken GraphQL transport. Exchanges the API key for a token on first use and
/// keeps it until `token_ttl` has elapsed.
pub struct GraphQlClient {
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
    token_ttl: Duration,
    token: Mutex<Option<CachedToken>>,
    consumption: Mutex<Option<CachedConsumption>>,
}

impl GraphQlClient {
    pub fn new(http: reqwest::Client, endpoint: &str, api_key: &str, token_ttl: Duration) -> Self {
        Self {
            http,
            endpoint: endpoint.to_string(),
            api_key: api_key.to_string(),
            token_ttl,
            token: Mutex::new(None),
            consumption: Mutex::new(None),
        }
    }

    async fn token(&self) -> Result<String, ProviderError> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref() {
            if Instant::now() < token.expires_at {
                return Ok(token.value.clone());
            }
            debug!("Kraken token expired, requesting a new one");
        }

        let response = self
            .http
            .post(&self.endpoint)
            .json(&json!({
                "query": OBTAIN_TOKEN,
                "variables": { "apiKey": self.api_key },
            }))
            .send()
            .await?;

        let body: GraphQlResponse<TokenData> = read_json(response).await?;
        if !body.errors.is_empty() {
            return Err(ProviderError::Auth(format!(
                "token request rejected: {}",
                join_errors(&body.errors)
            )));
        }
        let token = body
            .data
            .and_then(|d| d.obtain_kraken_token)
            .map(|t| t.token)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| ProviderError::Auth("no token issued".into()))?;

        info!("Obtained Kraken token");
        *cached = Some(CachedToken {
            value: token.clone(),
            expires_at: Instant::now() + self.token_ttl,
        });
        Ok(token)
    }

    async fn query<T: DeserializeOwned>(&self, query: &str, variables: Value) -> Result<T, ProviderError> {
        let token = self.token().await?;

        let response = self
            .http
            .post(&self.endpoint)
            .header(reqwest::header::AUTHORIZATION, token)
            .json(&json!({ "query": query, "variables": variables }))
            .send()
            .await?;

        let body: GraphQlResponse<T> = read_json(response).await?;
        if !body.errors.is_empty() {
            return Err(ProviderError::Provider(join_errors(&body.errors)));
        }
        body.data
            .ok_or_else(|| ProviderError::Payload("response has no data".into()))
    }
}

fn join_errors(errors: &[GraphQlError]) -> String {
    errors
        .iter()
        .map(|e| e.message.as_str())
        .collect::<Vec<_>>()
        .join("; ")
}

#[async_trait]
impl ConsumptionProvider for GraphQlClient {
    async fn get_account_topology(&self, account_number: &str) -> Result<Topology, ProviderError> {
        let data: AccountData = self
            .query(ACCOUNT_TOPOLOGY, json!({ "accountNumber": account_number }))
            .await?;
        let account = data
            .account
            .ok_or_else(|| ProviderError::Payload(format!("account {} not found", account_number)))?;
        Ok(account.into_topology(account_number))
    }

    async fn get_consumption(
        &self,
        meter: &MeterRef,
        period_from: DateTime<Utc>,
        period_to: DateTime<Utc>,
    ) -> Result<Vec<RawReading>, ProviderError> {
        let mut cached = self.consumption.lock().await;
        let hit = cached
            .as_ref()
            .is_some_and(|c| c.covers(&meter.account_number, period_from, period_to));

        if !hit {
            let data: AccountData = self
                .query(
                    ACCOUNT_CONSUMPTION,
                    json!({
                        "accountNumber": meter.account_number,
                        "fromDatetime": format_timestamp(period_from),
                        "toDatetime": format_timestamp(period_to),
                        "first": PAGE_SIZE,
                    }),
                )
                .await?;
            let account = data.account.ok_or_else(|| {
                ProviderError::Payload(format!("account {} not found", meter.account_number))
            })?;
            *cached = Some(CachedConsumption {
                account_number: meter.account_number.clone(),
                period_from,
                period_to,
                account,
            });
        }

        let connection = cached
            .as_ref()
            .and_then(|c| c.account.consumption_for(meter))
            .ok_or_else(|| {
                ProviderError::Payload(format!(
                    "{} meter {}/{} not present on account",
                    meter.fuel_type, meter.meter_point, meter.serial_number
                ))
            })?;
        drop(cached);

        if connection.page_info.map(|p| p.has_next_page).unwrap_or(false) {
            warn!(
                fuel_type = %meter.fuel_type,
                meter_point = %meter.meter_point,
                serial_number = %meter.serial_number,
                "Consumption truncated at {} readings; later pages not fetched",
                PAGE_SIZE
            );
        }

        Ok(connection
            .edges
            .into_iter()
            .map(|e| RawReading {
                interval_start: e.node.start_at,
                interval_end: e.node.end_at,
                consumption: e.node.value,
            })
            .collect())
    }
}
