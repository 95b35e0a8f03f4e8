//! Demo routes.

use axum::http::{header, HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use bytes::Bytes;
use serde_json::{json, Value};

/// Build the demo router.
pub fn create_router() -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/echo", post(echo))
        .route("/users", post(create_user))
        .route("/users/:id", get(get_user))
}

async fn healthz() -> &'static str {
    "ok"
}

/// Return the request body with its content type.
async fn echo(headers: HeaderMap, body: Bytes) -> impl IntoResponse {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .cloned()
        .unwrap_or_else(|| header::HeaderValue::from_static("application/octet-stream"));
    ([(header::CONTENT_TYPE, content_type)], body)
}

async fn create_user(Json(body): Json<Value>) -> impl IntoResponse {
    let username = body.get("username").cloned().unwrap_or(Value::Null);
    (StatusCode::CREATED, Json(json!({"id": 1, "username": username})))
}

async fn get_user(axum::extract::Path(id): axum::extract::Path<u64>) -> Json<Value> {
    Json(json!({"id": id, "username": format!("user-{id}")}))
}
