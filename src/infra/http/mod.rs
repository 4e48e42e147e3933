mod discovery;
pub mod error;
mod health;
mod middleware;
mod report;

use std::sync::Arc;

use axum::{Router, middleware as axum_middleware, routing::get};

use crate::{
    application::{
        discovery::DiscoveryService,
        render::{ProcessRunner, ReportRenderer},
    },
    config::Settings,
};

pub use middleware::REQUEST_ID_HEADER;

#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub renderer: Arc<ReportRenderer>,
    pub discovery: Arc<DiscoveryService>,
}

impl AppState {
    pub fn new(settings: Arc<Settings>, runner: Arc<dyn ProcessRunner>) -> Self {
        let renderer = ReportRenderer::new(
            settings.report.clone(),
            settings.tool.clone(),
            runner.clone(),
        );
        let discovery = DiscoveryService::new(settings.tool.clone(), runner);
        Self {
            settings,
            renderer: Arc::new(renderer),
            discovery: Arc::new(discovery),
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/render", get(report::render_report))
        .route("/health", get(health::health))
        .route("/operations", get(discovery::list_operations))
        .route("/operation-help", get(discovery::operation_help))
        .route("/version", get(discovery::tool_version))
        .layer(axum_middleware::from_fn(middleware::log_responses))
        .layer(axum_middleware::from_fn(middleware::set_request_context))
        .with_state(state)
}
