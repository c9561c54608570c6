use axum::{extract::Request, routing::get, Router};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::Level;

use super::handlers::{account, consumption, health, AppState};

pub fn create_router(state: AppState) -> Router {
    // Public routes (index page and health check)
    let public_routes = Router::new()
        .route("/", get(health::index))
        .route("/health", get(health::health_check));

    // Remote-backed routes, 500 when credentials are missing
    let remote_routes = Router::new()
        .route("/api/account-info", get(account::get_account_info))
        .route("/api/fetch-data", get(account::fetch_data));

    // Read-only routes over the local store
    let store_routes = Router::new()
        .route(
            "/api/consumption/{fuel_type}",
            get(consumption::get_consumption),
        )
        .route("/api/stats", get(consumption::get_stats));

    Router::new()
        .merge(public_routes)
        .merge(remote_routes)
        .merge(store_routes)
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|request: &Request| {
                    tracing::span!(
                        Level::INFO,
                        "http_request",
                        method = %request.method(),
                        uri = %request.uri(),
                    )
                })
                .on_request(|_request: &Request, _span: &tracing::Span| {
                    tracing::event!(Level::DEBUG, "received request");
                })
                .on_response(
                    |response: &axum::response::Response,
                     latency: std::time::Duration,
                     _span: &tracing::Span| {
                        tracing::event!(
                            Level::INFO,
                            status = response.status().as_u16(),
                            latency = ?latency,
                            "request completed"
                        );
                    },
                )
                .on_failure(
                    |error: tower_http::classify::ServerErrorsFailureClass,
                     _latency: std::time::Duration,
                     _span: &tracing::Span| {
                        tracing::event!(Level::ERROR, error = %error, "request failed");
                    },
                ),
        )
}
