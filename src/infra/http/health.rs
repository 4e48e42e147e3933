use axum::{Json, extract::State};
use serde::Serialize;

use crate::domain::types::{InvocationShape, OutputFormat, ScopeStrategy};

use super::AppState;

#[derive(Debug, Serialize)]
pub(super) struct HealthBody {
    status: &'static str,
    project_file: String,
    project_exists: bool,
    layout: String,
    algorithms: Vec<String>,
    format: OutputFormat,
    invocation: InvocationShape,
    scope: ScopeStrategy,
    program: String,
}

/// Liveness plus the effective render configuration.
pub(super) async fn health(State(state): State<AppState>) -> Json<HealthBody> {
    let report = &state.settings.report;
    let project_exists = tokio::fs::try_exists(&report.project_file)
        .await
        .unwrap_or(false);

    Json(HealthBody {
        status: "ok",
        project_file: report.project_file.display().to_string(),
        project_exists,
        layout: report.layout.clone(),
        algorithms: report.algorithms.clone(),
        format: report.format,
        invocation: report.invocation,
        scope: report.scope,
        program: state.settings.tool.program.display().to_string(),
    })
}
