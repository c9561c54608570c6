// RestClient against an in-process fake of the provider's REST API.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use chrono::{TimeZone, Utc};
use energy_monitor::{
    error::AppError,
    models::FuelType,
    octopus::{http_client, ConsumptionProvider, MeterRef, ProviderError, RestClient},
};
use pretty_assertions::assert_eq;
use serde_json::json;
use test_helpers::*;


// base64("sk_test:")
const EXPECTED_AUTH: &str = "Basic c2tfdGVzdDo=";

#[derive(Clone, Default)]
struct FakeRest {
    last_query: Arc<Mutex<Option<HashMap<String, String>>>>,
    last_path: Arc<Mutex<Option<String>>>,
}

fn authorized(headers: &HeaderMap) -> bool {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .map(|v| v == EXPECTED_AUTH)
        .unwrap_or(false)
}

async fn account(headers: HeaderMap, Path(number): Path<String>) -> impl IntoResponse {
    if !authorized(&headers) {
        return (StatusCode::UNAUTHORIZED, Json(json!({ "detail": "bad key" })));
    }
    (
        StatusCode::OK,
        Json(json!({
            "number": number,
            "properties": [{
                "id": 1,
                "electricity_meter_points": [{
                    "mpan": "1012",
                    "meters": [{ "serial_number": "E1" }]
                }],
                "gas_meter_points": [{
                    "mprn": "3344",
                    "meters": [{ "serial_number": "G1" }]
                }]
            }]
        })),
    )
}

async fn consumption(
    State(fake): State<FakeRest>,
    headers: HeaderMap,
    Path((kind, point, serial)): Path<(String, String, String)>,
    Query(params): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    if !authorized(&headers) {
        return (StatusCode::UNAUTHORIZED, Json(json!({ "detail": "bad key" })));
    }
    *fake.last_query.lock().unwrap() = Some(params);
    *fake.last_path.lock().unwrap() = Some(format!("{}/{}/{}", kind, point, serial));

    (
        StatusCode::OK,
        Json(json!({
            "count": 2,
            "next": null,
            "previous": null,
            "results": [
                { "consumption": 0.25, "interval_start": "2024-01-01T00:00:00Z", "interval_end": "2024-01-01T00:30:00Z" },
                { "consumption": "0.5", "interval_start": "2024-01-01T00:30:00+00:00", "interval_end": "2024-01-01T01:00:00+00:00" }
            ]
        })),
    )
}

async fn spawn(fake: FakeRest) -> String {
    let router = Router::new()
        .route("/v1/accounts/{number}/", get(account))
        .route(
            "/v1/{kind}/{point}/meters/{serial}/consumption/",
            get(consumption),
        )
        .route(
            "/broken/v1/accounts/{number}/",
            get(|| async { (StatusCode::BAD_GATEWAY, "upstream down") }),
        )
        .route(
            "/slow/v1/accounts/{number}/",
            get(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                StatusCode::OK
            }),
        )
        .with_state(fake);
    spawn_fake_provider(router).await
}

fn gas_meter() -> MeterRef {
    MeterRef {
        account_number: ACCOUNT.into(),
        fuel_type: FuelType::Gas,
        meter_point: "3344".into(),
        serial_number: "G1".into(),
    }
}

#[tokio::test]
async fn test_topology_over_basic_auth() {
    let base = spawn(FakeRest::default()).await;
    let client = RestClient::new(reqwest::Client::new(), &base, "sk_test");

    let topology = client.get_account_topology(ACCOUNT).await.unwrap();

    assert_eq!(topology.number, ACCOUNT);
    let meters = topology.meters();
    assert_eq!(meters.len(), 2);
    assert_eq!(meters[0].fuel_type, FuelType::Electricity);
    assert_eq!(meters[0].meter_point, "1012");
    assert_eq!(meters[1].fuel_type, FuelType::Gas);
    assert_eq!(meters[1].serial_number, "G1");
}

#[tokio::test]
async fn test_rejected_key_is_auth_error() {
    let base = spawn(FakeRest::default()).await;
    let client = RestClient::new(reqwest::Client::new(), &base, "sk_wrong");

    let err = client.get_account_topology(ACCOUNT).await.unwrap_err();

    assert!(matches!(err, ProviderError::Auth(_)), "got {:?}", err);
}

#[tokio::test]
async fn test_non_success_is_status_error() {
    let base = spawn(FakeRest::default()).await;
    let client = RestClient::new(reqwest::Client::new(), &format!("{}/broken", base), "sk_test");

    let err = client.get_account_topology(ACCOUNT).await.unwrap_err();

    match err {
        ProviderError::Status { status, body } => {
            assert_eq!(status, 502);
            assert_eq!(body, "upstream down");
        }
        other => panic!("expected status error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_consumption_request_and_mapping() {
    let fake = FakeRest::default();
    let base = spawn(fake.clone()).await;
    let client = RestClient::new(reqwest::Client::new(), &base, "sk_test");
    let from = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    let to = Utc.with_ymd_and_hms(2024, 1, 8, 0, 0, 0).unwrap();

    let readings = client.get_consumption(&gas_meter(), from, to).await.unwrap();

    assert_eq!(readings.len(), 2);
    assert_eq!(readings[0].consumption, 0.25);
    assert_eq!(readings[1].consumption, 0.5);
    assert_eq!(
        readings[1].interval_start,
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 30, 0).unwrap()
    );

    assert_eq!(
        fake.last_path.lock().unwrap().as_deref(),
        Some("gas-meter-points/3344/G1")
    );
    let query = fake.last_query.lock().unwrap().clone().unwrap();
    assert_eq!(query["period_from"], "2024-01-01T00:00:00Z");
    assert_eq!(query["period_to"], "2024-01-08T00:00:00Z");
    assert_eq!(query["page_size"], "1500");
    assert_eq!(query["order_by"], "period");
}

#[tokio::test]
async fn test_slow_provider_hits_deadline() {
    let base = spawn(FakeRest::default()).await;
    let http = http_client(Duration::from_millis(100)).unwrap();
    let client = RestClient::new(http, &format!("{}/slow", base), "sk_test");

    let started = std::time::Instant::now();
    let err = client.get_account_topology(ACCOUNT).await.unwrap_err();

    assert!(started.elapsed() < Duration::from_secs(5));
    match &err {
        ProviderError::Transport(e) => assert!(e.is_timeout(), "{:?}", e),
        other => panic!("expected transport error, got {:?}", other),
    }
    assert!(matches!(AppError::from(err), AppError::Remote(_)));
}
