use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::{debug, warn};

use super::types::{MeterRef, RawReading, Topology};
use super::{read_json, ConsumptionProvider, ProviderError, PAGE_SIZE};
use crate::models::reading::format_timestamp;
use crate::models::FuelType;

/// REST transport. The API key is sent as the basic-auth user with an empty
/// password; there is no session state.
pub struct RestClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

#[derive(Debug, Deserialize)]
struct ConsumptionPage {
    #[serde(default)]
    next: Option<String>,
    #[serde(default)]
    results: Vec<RawReading>,
}

impl RestClient {
    pub fn new(http: reqwest::Client, base_url: &str, api_key: &str) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        }
    }

    fn consumption_url(&self, meter: &MeterRef) -> String {
        let points = match meter.fuel_type {
            FuelType::Electricity => "electricity-meter-points",
            FuelType::Gas => "gas-meter-points",
        };
        format!(
            "{}/v1/{}/{}/meters/{}/consumption/",
            self.base_url, points, meter.meter_point, meter.serial_number
        )
    }
}

#[async_trait]
impl ConsumptionProvider for RestClient {
    async fn get_account_topology(&self, account_number: &str) -> Result<Topology, ProviderError> {
        let url = format!("{}/v1/accounts/{}/", self.base_url, account_number);
        debug!(%url, "Fetching account");

        let response = self
            .http
            .get(&url)
            .basic_auth(&self.api_key, Some(""))
            .send()
            .await?;
        read_json(response).await
    }

    async fn get_consumption(
        &self,
        meter: &MeterRef,
        period_from: DateTime<Utc>,
        period_to: DateTime<Utc>,
    ) -> Result<Vec<RawReading>, ProviderError> {
        let url = self.consumption_url(meter);
        let page_size = PAGE_SIZE.to_string();
        debug!(%url, "Fetching consumption");

        let response = self
            .http
            .get(&url)
            .basic_auth(&self.api_key, Some(""))
            .query(&[
                ("period_from", format_timestamp(period_from).as_str()),
                ("period_to", format_timestamp(period_to).as_str()),
                ("page_size", page_size.as_str()),
                ("order_by", "period"),
            ])
            .send()
            .await?;

        let page: ConsumptionPage = read_json(response).await?;
        if page.next.is_some() {
            warn!(
                fuel_type = %meter.fuel_type,
                meter_point = %meter.meter_point,
                serial_number = %meter.serial_number,
                "Consumption truncated at {} readings; later pages not fetched",
                PAGE_SIZE
            );
        }

        Ok(page.results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn consumption_url_per_fuel() {
        let client = RestClient::new(reqwest::Client::new(), "https://api.example/", "sk");
        let mut meter = MeterRef {
            account_number: "A-1".into(),
            fuel_type: FuelType::Electricity,
            meter_point: "1012".into(),
            serial_number: "E1".into(),
        };
        assert_eq!(
            client.consumption_url(&meter),
            "https://api.example/v1/electricity-meter-points/1012/meters/E1/consumption/"
        );

        meter.fuel_type = FuelType::Gas;
        assert_eq!(
            client.consumption_url(&meter),
            "https://api.example/v1/gas-meter-points/1012/meters/E1/consumption/"
        );
    }

    #[test]
    fn deserialise_page() {
        let json = r#"{
            "count": 2,
            "next": null,
            "previous": null,
            "results": [
                {"consumption": 0.2, "interval_start": "2024-01-01T00:00:00Z", "interval_end": "2024-01-01T00:30:00Z"},
                {"consumption": 0.3, "interval_start": "2024-01-01T00:30:00Z", "interval_end": "2024-01-01T01:00:00Z"}
            ]
        }"#;

        let page: ConsumptionPage = serde_json::from_str(json).expect("should deserialise");
        assert!(page.next.is_none());
        assert_eq!(page.results.len(), 2);
        assert_eq!(page.results[1].consumption, 0.3);
    }
}
