//! `GET /render`: validate, render, stream the artifact or return diagnostics.

use std::io;

use async_stream::stream;
use axum::{
    Json,
    body::Body,
    extract::{Query, State},
    http::{
        HeaderValue, StatusCode,
        header::{CACHE_CONTROL, CONTENT_DISPOSITION, CONTENT_LENGTH, CONTENT_TYPE},
    },
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use serde::Deserialize;
use tokio::io::AsyncReadExt;

use crate::{
    application::{
        error::ErrorReport,
        render::{RenderDiagnostics, RenderOutcome, RenderedReport},
    },
    domain::request::{RenderParams, RenderRequest, parse_flag},
};

use super::{AppState, error::ApiError};

const SOURCE: &str = "infra::http::report::render_report";
const CHUNK_SIZE: usize = 64 * 1024;

#[derive(Debug, Default, Deserialize)]
pub(super) struct RenderQuery {
    #[serde(alias = "refcat")]
    id: Option<String>,
    extent_a: Option<String>,
    extent_b: Option<String>,
    debug: Option<String>,
}

pub(super) async fn render_report(
    State(state): State<AppState>,
    Query(query): Query<RenderQuery>,
) -> Result<Response, ApiError> {
    let debug = match query.debug.as_deref() {
        Some(value) => parse_flag("debug", value)?,
        None => false,
    };
    let params = RenderParams {
        identifier: query.id,
        extent_a: query.extent_a,
        extent_b: query.extent_b,
        debug,
    };
    let request = RenderRequest::validate(params, state.renderer.settings().min_identifier_len)?;

    match state.renderer.render(&request).await? {
        // the artifact is dropped here, which deletes it
        RenderOutcome::Rendered(report) if request.is_debug() => {
            Ok(diagnostics_response(StatusCode::OK, &report.diagnostics))
        }
        RenderOutcome::Rendered(report) => artifact_response(report).await,
        RenderOutcome::Failed(diagnostics) => {
            let status = StatusCode::INTERNAL_SERVER_ERROR;
            let mut response = diagnostics_response(status, &diagnostics);
            let kind = diagnostics.kind.map(|kind| kind.as_str()).unwrap_or("failed");
            ErrorReport::from_message(
                SOURCE,
                status,
                format!("{kind}: identifier={}", diagnostics.identifier),
            )
            .attach(&mut response);
            Ok(response)
        }
    }
}

fn diagnostics_response(status: StatusCode, diagnostics: &RenderDiagnostics) -> Response {
    let mut response = (status, Json(diagnostics)).into_response();
    response
        .headers_mut()
        .insert(CACHE_CONTROL, HeaderValue::from_static("no-store"));
    response
}

/// Stream the artifact; the temp path lives inside the stream and is removed
/// once the body completes or the connection drops.
async fn artifact_response(report: RenderedReport) -> Result<Response, ApiError> {
    let RenderedReport {
        artifact,
        size,
        filename,
        ..
    } = report;
    let format = artifact.format();
    let temp_path = artifact.into_temp_path();

    let mut file = tokio::fs::File::open(&*temp_path)
        .await
        .map_err(|err| ApiError::internal(SOURCE, &err))?;

    let body = stream! {
        let _guard = temp_path;
        let mut buffer = vec![0u8; CHUNK_SIZE];
        loop {
            match file.read(&mut buffer).await {
                Ok(0) => break,
                Ok(n) => yield Ok::<Bytes, io::Error>(Bytes::copy_from_slice(&buffer[..n])),
                Err(err) => {
                    yield Err(err);
                    break;
                }
            }
        }
    };

    let mut response = Response::new(Body::from_stream(body));
    let headers = response.headers_mut();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static(format.content_type()));
    if let Ok(value) = HeaderValue::from_str(&size.to_string()) {
        headers.insert(CONTENT_LENGTH, value);
    }
    if let Ok(value) = HeaderValue::from_str(&format!("attachment; filename=\"{filename}\"")) {
        headers.insert(CONTENT_DISPOSITION, value);
    }
    headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-store"));

    Ok(response)
}
