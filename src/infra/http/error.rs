use std::error::Error as StdError;

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

use crate::{
    application::{discovery::DiscoveryError, error::ErrorReport, render::RenderError},
    domain::error::DomainError,
};

#[derive(Debug, Serialize)]
pub struct ApiErrorBody {
    pub error: ApiErrorMessage,
}

pub mod codes {
    pub const BAD_REQUEST: &str = "bad_request";
    pub const INVALID_IDENTIFIER: &str = "invalid_identifier";
    pub const MISSING_NAME: &str = "missing_name";
    pub const PROJECT_MISSING: &str = "project_missing";
    pub const INTERNAL: &str = "internal_error";
}

#[derive(Debug, Serialize)]
pub struct ApiErrorMessage {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: &'static str,
    hint: Option<String>,
    report: Option<ErrorReport>,
}

impl ApiError {
    pub fn new(
        status: StatusCode,
        code: &'static str,
        message: &'static str,
        hint: Option<String>,
    ) -> Self {
        Self {
            status,
            code,
            message,
            hint,
            report: None,
        }
    }

    pub fn bad_request(code: &'static str, message: &'static str, hint: Option<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, code, message, hint)
    }

    /// A 500 whose public body stays generic while the log keeps the cause chain.
    pub fn internal(source: &'static str, error: &dyn StdError) -> Self {
        let status = StatusCode::INTERNAL_SERVER_ERROR;
        Self {
            report: Some(ErrorReport::from_error(source, status, error)),
            ..Self::new(status, codes::INTERNAL, "Internal server error", None)
        }
    }
}

impl From<DomainError> for ApiError {
    fn from(error: DomainError) -> Self {
        match error {
            DomainError::MissingIdentifier => ApiError::bad_request(
                codes::INVALID_IDENTIFIER,
                "Identifier is required",
                Some("pass the cadastral reference as `id`".to_string()),
            ),
            err @ DomainError::IdentifierTooShort { .. } => ApiError::bad_request(
                codes::INVALID_IDENTIFIER,
                "Identifier is too short",
                Some(err.to_string()),
            ),
            DomainError::Validation { message } => {
                ApiError::bad_request(codes::BAD_REQUEST, "Invalid request", Some(message))
            }
        }
    }
}

impl From<RenderError> for ApiError {
    fn from(error: RenderError) -> Self {
        match error {
            RenderError::ProjectMissing { path } => ApiError::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                codes::PROJECT_MISSING,
                "Project file not found",
                Some(path.display().to_string()),
            ),
            err @ RenderError::Reserve(_) => ApiError::internal("application::render", &err),
        }
    }
}

impl From<DiscoveryError> for ApiError {
    fn from(error: DiscoveryError) -> Self {
        match error {
            DiscoveryError::MissingName => ApiError::bad_request(
                codes::MISSING_NAME,
                "Operation name is required",
                Some("pass the algorithm id as `name`".to_string()),
            ),
            // tool failures carry their own body, see `discovery::tool_failure_response`
            err @ DiscoveryError::Tool(_) => ApiError::internal("application::discovery", &err),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let report = self.report.unwrap_or_else(|| {
            ErrorReport::from_message(
                "infra::http::error",
                self.status,
                format!(
                    "{}: {}",
                    self.code,
                    self.hint.as_deref().unwrap_or(self.message)
                ),
            )
        });
        let body = ApiErrorBody {
            error: ApiErrorMessage {
                code: self.code.to_string(),
                message: self.message.to_string(),
                hint: self.hint,
            },
        };
        let mut response = (self.status, Json(body)).into_response();
        report.attach(&mut response);
        response
    }
}
