use std::collections::BTreeMap;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use nmos_query_core::error::{QueryError, SubscriptionError};
use nmos_query_proto::{ApiVersion, ResourceKind, ResourcePath, SubscriptionId, SubscriptionRequest};
use serde_json::{json, Value};
use tower::ServiceBuilder;
use tower_http::trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer};
use tracing::{error, Level};

use crate::state::AppState;
use crate::ws;

pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/x-nmos/", get(namespace_index))
        .route("/x-nmos/query/", get(version_index))
        .route("/x-nmos/query/{version}/", get(endpoint_index))
        .route("/x-nmos/query/{version}/subscriptions", get(list_subscriptions).post(post_subscription))
        .route("/x-nmos/query/{version}/subscriptions/", get(list_subscriptions).post(post_subscription))
        .route(
            "/x-nmos/query/{version}/subscriptions/{id}",
            get(get_subscription).delete(delete_subscription),
        )
        .route("/x-nmos/query/{version}/ws/", get(ws::ws_handler))
        .route("/x-nmos/query/{version}/{collection}/", get(list_resources))
        .route("/x-nmos/query/{version}/{collection}/{id}", get(get_resource))
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                        .on_request(DefaultOnRequest::new().level(Level::DEBUG))
                        .on_response(DefaultOnResponse::new().level(Level::DEBUG)),
                )
                .into_inner(),
        )
}

/// Parse the path's version token and check it against the enabled set.
pub(crate) fn resolve_version(state: &AppState, token: &str) -> Result<ApiVersion, StatusCode> {
    token
        .parse()
        .ok()
        .filter(|version| state.versions.contains(version))
        .ok_or(StatusCode::NOT_FOUND)
}

async fn index() -> Json<Value> {
    Json(json!(["x-nmos/"]))
}

async fn namespace_index() -> Json<Value> {
    Json(json!(["query/"]))
}

async fn version_index(State(state): State<AppState>) -> Json<Value> {
    let versions: Vec<String> = state.versions.iter().map(|v| format!("{v}/")).collect();
    Json(json!(versions))
}

async fn endpoint_index(State(state): State<AppState>, Path(version): Path<String>) -> Response {
    if let Err(status) = resolve_version(&state, &version) {
        return status.into_response();
    }
    Json(json!([
        "subscriptions/",
        "nodes/",
        "devices/",
        "sources/",
        "flows/",
        "senders/",
        "receivers/",
    ]))
    .into_response()
}

async fn list_resources(
    State(state): State<AppState>,
    Path((version, collection)): Path<(String, String)>,
    Query(args): Query<BTreeMap<String, String>>,
) -> Response {
    let version = match resolve_version(&state, &version) {
        Ok(version) => version,
        Err(status) => return status.into_response(),
    };
    let Some(kind) = ResourceKind::from_collection(&collection) else {
        return StatusCode::NOT_FOUND.into_response();
    };
    match state.query.get_resources(version, ResourcePath::Kind(kind), &args).await {
        Ok(docs) => Json(docs).into_response(),
        Err(err) => query_error(err),
    }
}

async fn get_resource(
    State(state): State<AppState>,
    Path((version, collection, id)): Path<(String, String, String)>,
    Query(args): Query<BTreeMap<String, String>>,
) -> Response {
    let version = match resolve_version(&state, &version) {
        Ok(version) => version,
        Err(status) => return status.into_response(),
    };
    let Some(kind) = ResourceKind::from_collection(&collection) else {
        return StatusCode::NOT_FOUND.into_response();
    };
    match state.query.get_resource(version, kind, &id, &args).await {
        Ok(doc) => Json(doc).into_response(),
        Err(err) => query_error(err),
    }
}

async fn list_subscriptions(State(state): State<AppState>, Path(version): Path<String>) -> Response {
    if let Err(status) = resolve_version(&state, &version) {
        return status.into_response();
    }
    Json(state.subscriptions.get_all()).into_response()
}

async fn post_subscription(
    State(state): State<AppState>,
    Path(version): Path<String>,
    body: Result<Json<SubscriptionRequest>, JsonRejection>,
) -> Response {
    let version = match resolve_version(&state, &version) {
        Ok(version) => version,
        Err(status) => return status.into_response(),
    };
    let Json(request) = match body {
        Ok(body) => body,
        Err(rejection) => {
            return (StatusCode::BAD_REQUEST, rejection.body_text()).into_response();
        }
    };
    let (subscription, created) = state.subscriptions.post(version, request);
    let status = if created { StatusCode::CREATED } else { StatusCode::OK };
    let location = format!("/x-nmos/query/{}/subscriptions/{}", version, subscription.id);
    (status, [(header::LOCATION, location)], Json(subscription)).into_response()
}

async fn get_subscription(State(state): State<AppState>, Path((version, id)): Path<(String, String)>) -> Response {
    if let Err(status) = resolve_version(&state, &version) {
        return status.into_response();
    }
    let Ok(id) = id.parse::<SubscriptionId>() else {
        return StatusCode::NOT_FOUND.into_response();
    };
    match state.subscriptions.get(id) {
        Some(subscription) => Json(subscription).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn delete_subscription(State(state): State<AppState>, Path((version, id)): Path<(String, String)>) -> Response {
    if let Err(status) = resolve_version(&state, &version) {
        return status.into_response();
    }
    // Deleting something that was already gone is still a success.
    let Ok(id) = id.parse::<SubscriptionId>() else {
        return StatusCode::NO_CONTENT.into_response();
    };
    match state.subscriptions.delete(id) {
        Ok(_) => StatusCode::NO_CONTENT.into_response(),
        Err(SubscriptionError::Forbidden(_)) => StatusCode::FORBIDDEN.into_response(),
        Err(SubscriptionError::NotFound(_)) => StatusCode::NO_CONTENT.into_response(),
    }
}

fn query_error(err: QueryError) -> Response {
    match err {
        QueryError::NotFound(_) => StatusCode::NOT_FOUND.into_response(),
        QueryError::WrongKind { .. } => (StatusCode::CONFLICT, err.to_string()).into_response(),
        QueryError::Registry(err) => {
            error!(%err, "registry unavailable");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
