use axum::{response::Html, Json};
use serde_json::{json, Value};

/// GET /health
pub async fn health_check() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

const INDEX_HTML: &str = r#"<!DOCTYPE html>
<html>
<head><title>Energy Monitor</title></head>
<body>
<h1>Energy Monitor</h1>
<ul>
<li><a href="/api/account-info">Account info</a></li>
<li><a href="/api/fetch-data">Fetch latest consumption</a></li>
<li><a href="/api/consumption/electricity?days=7">Electricity, last 7 days</a></li>
<li><a href="/api/consumption/gas?days=7">Gas, last 7 days</a></li>
<li><a href="/api/stats">Stats</a></li>
</ul>
</body>
</html>
"#;

/// GET /
pub async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}
