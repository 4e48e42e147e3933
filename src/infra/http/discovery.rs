use axum::{
    Json,
    extract::{Query, State},
    http::{HeaderValue, StatusCode, header::CONTENT_TYPE},
    response::{IntoResponse, Response},
};
use serde::Deserialize;

use crate::application::{
    discovery::{DiscoveryError, ToolFailure},
    error::ErrorReport,
};

use super::{AppState, error::ApiError};

#[derive(Debug, Default, Deserialize)]
pub(super) struct OperationsQuery {
    filter: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub(super) struct HelpQuery {
    name: Option<String>,
}

pub(super) async fn list_operations(
    State(state): State<AppState>,
    Query(query): Query<OperationsQuery>,
) -> Response {
    match state.discovery.list(query.filter.as_deref()).await {
        Ok(listing) => text_response(listing),
        Err(err) => discovery_error_response("infra::http::discovery::list_operations", err),
    }
}

pub(super) async fn operation_help(
    State(state): State<AppState>,
    Query(query): Query<HelpQuery>,
) -> Response {
    let name = query.name.unwrap_or_default();
    match state.discovery.help(&name).await {
        Ok(help) => text_response(help),
        Err(err) => discovery_error_response("infra::http::discovery::operation_help", err),
    }
}

pub(super) async fn tool_version(State(state): State<AppState>) -> Response {
    match state.discovery.version().await {
        Ok(info) => Json(info).into_response(),
        Err(err) => discovery_error_response("infra::http::discovery::tool_version", err),
    }
}

fn text_response(body: String) -> Response {
    let mut response = body.into_response();
    response.headers_mut().insert(
        CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    response
}

fn discovery_error_response(source: &'static str, err: DiscoveryError) -> Response {
    match err {
        DiscoveryError::Tool(failure) => tool_failure_response(source, failure),
        other => ApiError::from(other).into_response(),
    }
}

fn tool_failure_response(source: &'static str, failure: ToolFailure) -> Response {
    let status = StatusCode::INTERNAL_SERVER_ERROR;
    let report = ErrorReport::from_message(
        source,
        status,
        format!("{}: {}", failure.outcome, failure.command),
    );
    let mut response = (status, Json(failure)).into_response();
    report.attach(&mut response);
    response
}
