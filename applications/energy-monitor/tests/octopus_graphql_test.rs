// GraphQlClient against an in-process fake Kraken endpoint.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::{extract::State, http::HeaderMap, routing::post, Json, Router};
use chrono::{TimeZone, Utc};
use energy_monitor::{
    models::FuelType,
    octopus::{ConsumptionProvider, GraphQlClient, MeterRef, ProviderError},
};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use test_helpers::*;


const TOKEN: &str = "kraken-token-1";

#[derive(Clone, Default)]
struct FakeKraken {
    token_requests: Arc<AtomicUsize>,
    consumption_queries: Arc<AtomicUsize>,
    last_variables: Arc<std::sync::Mutex<Option<Value>>>,
}

fn meter_tree(with_consumption: bool) -> Value {
    let connection = |edges: Value| {
        if with_consumption {
            json!({ "pageInfo": { "hasNextPage": false }, "edges": edges })
        } else {
            Value::Null
        }
    };

    json!({
        "account": {
            "number": ACCOUNT,
            "properties": [{
                "electricityMeterPoints": [{
                    "mpan": "1012",
                    "meters": [
                        {
                            "serialNumber": "E1",
                            "consumption": connection(json!([
                                { "node": { "startAt": "2024-06-01T00:00:00+01:00", "endAt": "2024-06-01T00:30:00+01:00", "value": "0.125" } },
                                { "node": { "startAt": "2024-06-01T00:30:00+01:00", "endAt": "2024-06-01T01:00:00+01:00", "value": 0.375 } }
                            ]))
                        },
                        {
                            "serialNumber": "E2",
                            "consumption": connection(json!([]))
                        }
                    ]
                }],
                "gasMeterPoints": [{
                    "mprn": "3344",
                    "meters": [{
                        "serialNumber": "G1",
                        "consumption": connection(json!([
                            { "node": { "startAt": "2024-06-01T00:00:00Z", "endAt": "2024-06-01T00:30:00Z", "value": "2.0" } }
                        ]))
                    }]
                }]
            }]
        }
    })
}

async fn graphql(
    State(fake): State<FakeKraken>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Json<Value> {
    let query = body["query"].as_str().unwrap_or_default();

    if query.contains("obtainKrakenToken") {
        fake.token_requests.fetch_add(1, Ordering::SeqCst);
        if body["variables"]["apiKey"] == "sk_test" {
            return Json(json!({ "data": { "obtainKrakenToken": { "token": TOKEN } } }));
        }
        return Json(json!({
            "data": { "obtainKrakenToken": null },
            "errors": [{ "message": "Invalid API key." }]
        }));
    }

    let authorized = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .map(|v| v == TOKEN)
        .unwrap_or(false);
    if !authorized {
        return Json(json!({
            "data": null,
            "errors": [{ "message": "Authentication failed." }]
        }));
    }

    *fake.last_variables.lock().unwrap() = Some(body["variables"].clone());

    if body["variables"]["accountNumber"] != ACCOUNT {
        return Json(json!({
            "data": { "account": null },
            "errors": [{ "message": "Unauthorized." }, { "message": "Account not found." }]
        }));
    }

    let with_consumption = query.contains("consumption(");
    if with_consumption {
        fake.consumption_queries.fetch_add(1, Ordering::SeqCst);
    }
    Json(json!({ "data": meter_tree(with_consumption) }))
}

async fn spawn(fake: FakeKraken) -> String {
    let router = Router::new()
        .route("/v1/graphql/", post(graphql))
        .with_state(fake);
    format!("{}/v1/graphql/", spawn_fake_provider(router).await)
}

fn client(endpoint: &str, api_key: &str) -> GraphQlClient {
    GraphQlClient::new(
        reqwest::Client::new(),
        endpoint,
        api_key,
        Duration::from_secs(3300),
    )
}

fn meter(fuel_type: FuelType, meter_point: &str, serial_number: &str) -> MeterRef {
    MeterRef {
        account_number: ACCOUNT.into(),
        fuel_type,
        meter_point: meter_point.into(),
        serial_number: serial_number.into(),
    }
}

#[tokio::test]
async fn test_topology() {
    let endpoint = spawn(FakeKraken::default()).await;

    let topology = client(&endpoint, "sk_test")
        .get_account_topology(ACCOUNT)
        .await
        .unwrap();

    let serials: Vec<_> = topology
        .meters()
        .into_iter()
        .map(|m| (m.fuel_type, m.serial_number))
        .collect();
    assert_eq!(
        serials,
        vec![
            (FuelType::Electricity, "E1".to_string()),
            (FuelType::Electricity, "E2".to_string()),
            (FuelType::Gas, "G1".to_string()),
        ]
    );
}

#[tokio::test]
async fn test_token_is_reused_across_calls() {
    let fake = FakeKraken::default();
    let endpoint = spawn(fake.clone()).await;
    let client = client(&endpoint, "sk_test");
    let from = Utc.with_ymd_and_hms(2024, 5, 31, 0, 0, 0).unwrap();
    let to = Utc.with_ymd_and_hms(2024, 6, 7, 0, 0, 0).unwrap();

    client.get_account_topology(ACCOUNT).await.unwrap();
    client
        .get_consumption(&meter(FuelType::Gas, "3344", "G1"), from, to)
        .await
        .unwrap();
    client.get_account_topology(ACCOUNT).await.unwrap();

    assert_eq!(fake.token_requests.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_expired_token_is_replaced() {
    let fake = FakeKraken::default();
    let endpoint = spawn(fake.clone()).await;
    let client = GraphQlClient::new(reqwest::Client::new(), &endpoint, "sk_test", Duration::ZERO);

    client.get_account_topology(ACCOUNT).await.unwrap();
    client.get_account_topology(ACCOUNT).await.unwrap();

    assert_eq!(fake.token_requests.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_rejected_key_is_auth_error() {
    let endpoint = spawn(FakeKraken::default()).await;

    let err = client(&endpoint, "sk_wrong")
        .get_account_topology(ACCOUNT)
        .await
        .unwrap_err();

    match err {
        ProviderError::Auth(msg) => assert!(msg.contains("Invalid API key."), "{}", msg),
        other => panic!("expected auth error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_provider_errors_are_reported() {
    let endpoint = spawn(FakeKraken::default()).await;

    let err = client(&endpoint, "sk_test")
        .get_account_topology("A-OTHER")
        .await
        .unwrap_err();

    match err {
        ProviderError::Provider(msg) => assert_eq!(msg, "Unauthorized.; Account not found."),
        other => panic!("expected provider error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_consumption_selects_meter_and_normalises() {
    let fake = FakeKraken::default();
    let endpoint = spawn(fake.clone()).await;
    let client = client(&endpoint, "sk_test");
    let from = Utc.with_ymd_and_hms(2024, 5, 31, 0, 0, 0).unwrap();
    let to = Utc.with_ymd_and_hms(2024, 6, 7, 0, 0, 0).unwrap();

    let readings = client
        .get_consumption(&meter(FuelType::Electricity, "1012", "E1"), from, to)
        .await
        .unwrap();

    assert_eq!(readings.len(), 2);
    assert_eq!(
        readings[0].interval_start,
        Utc.with_ymd_and_hms(2024, 5, 31, 23, 0, 0).unwrap()
    );
    assert_eq!(readings[0].consumption, 0.125);
    assert_eq!(readings[1].consumption, 0.375);

    let variables = fake.last_variables.lock().unwrap().clone().unwrap();
    assert_eq!(variables["fromDatetime"], "2024-05-31T00:00:00Z");
    assert_eq!(variables["toDatetime"], "2024-06-07T00:00:00Z");
    assert_eq!(variables["first"], 1500);

    let empty = client
        .get_consumption(&meter(FuelType::Electricity, "1012", "E2"), from, to)
        .await
        .unwrap();
    assert!(empty.is_empty());
}

#[tokio::test]
async fn test_unknown_meter_is_payload_error() {
    let endpoint = spawn(FakeKraken::default()).await;
    let from = Utc.with_ymd_and_hms(2024, 5, 31, 0, 0, 0).unwrap();
    let to = Utc.with_ymd_and_hms(2024, 6, 7, 0, 0, 0).unwrap();

    let err = client(&endpoint, "sk_test")
        .get_consumption(&meter(FuelType::Gas, "3344", "G9"), from, to)
        .await
        .unwrap_err();

    assert!(matches!(err, ProviderError::Payload(_)), "got {:?}", err);
}

#[tokio::test]
async fn test_meters_in_one_window_share_a_download() {
    let fake = FakeKraken::default();
    let endpoint = spawn(fake.clone()).await;
    let client = client(&endpoint, "sk_test");
    let from = Utc.with_ymd_and_hms(2024, 5, 31, 0, 0, 0).unwrap();
    let to = Utc.with_ymd_and_hms(2024, 6, 7, 0, 0, 0).unwrap();

    let topology = client.get_account_topology(ACCOUNT).await.unwrap();
    let mut total = 0;
    for meter in topology.meters() {
        total += client.get_consumption(&meter, from, to).await.unwrap().len();
    }

    assert_eq!(total, 3);
    assert_eq!(fake.consumption_queries.load(Ordering::SeqCst), 1);

    let next_to = Utc.with_ymd_and_hms(2024, 6, 8, 0, 0, 0).unwrap();
    client
        .get_consumption(&meter(FuelType::Gas, "3344", "G1"), from, next_to)
        .await
        .unwrap();
    assert_eq!(fake.consumption_queries.load(Ordering::SeqCst), 2);
}
