use std::{process, sync::Arc};

use parcel_report::{
    application::{
        error::AppError,
        render::{ProcessRunner, RenderOutcome, ReportRenderer, TokioProcessRunner},
    },
    config::{self, RenderArgs, Settings},
    domain::request::{RenderParams, RenderRequest},
    infra::{
        error::InfraError,
        http::{self, AppState},
        telemetry,
    },
};
use tracing::{Dispatch, Level, dispatcher, error, info};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Serve(Box::<config::ServeArgs>::default()));

    telemetry::init(&settings.logging).map_err(AppError::from)?;

    tokio::fs::create_dir_all(&settings.tool.scratch_dir)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;

    match command {
        config::Command::Serve(_) => run_serve(settings).await,
        config::Command::Render(args) => run_render(settings, *args).await,
    }
}

async fn run_serve(settings: Settings) -> Result<(), AppError> {
    let settings = Arc::new(settings);
    let runner: Arc<dyn ProcessRunner> = Arc::new(TokioProcessRunner::new(&settings.tool));
    let router = http::build_router(AppState::new(settings.clone(), runner));

    let listener = tokio::net::TcpListener::bind(settings.server.addr)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;

    info!(
        target = "parcel_report::serve",
        addr = %settings.server.addr,
        project_file = %settings.report.project_file.display(),
        layout = %settings.report.layout,
        algorithms = ?settings.report.algorithms,
        "Listening"
    );

    axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|err| AppError::unexpected(format!("server error: {err}")))
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!(target = "parcel_report::serve", "Shutting down");
}

async fn run_render(settings: Settings, args: RenderArgs) -> Result<(), AppError> {
    let RenderArgs {
        identifier,
        output,
        extent_a,
        extent_b,
        ..
    } = args;

    let request = RenderRequest::validate(
        RenderParams {
            identifier: Some(identifier),
            extent_a,
            extent_b,
            debug: false,
        },
        settings.report.min_identifier_len,
    )?;

    let runner = Arc::new(TokioProcessRunner::new(&settings.tool));
    let renderer = ReportRenderer::new(settings.report, settings.tool, runner);

    match renderer
        .render(&request)
        .await
        .map_err(|err| AppError::unexpected(err.to_string()))?
    {
        RenderOutcome::Rendered(report) => {
            tokio::fs::copy(report.artifact.path(), &output)
                .await
                .map_err(|err| AppError::from(InfraError::from(err)))?;
            info!(
                target = "parcel_report::render",
                identifier = request.identifier(),
                output = %output.display(),
                bytes = report.size,
                "Report written"
            );
            Ok(())
        }
        RenderOutcome::Failed(diagnostics) => {
            let body = serde_json::to_string_pretty(&diagnostics)
                .map_err(|err| AppError::unexpected(err.to_string()))?;
            eprintln!("{body}");
            Err(AppError::unexpected(format!(
                "render failed: {}",
                diagnostics.error.unwrap_or("unknown failure")
            )))
        }
    }
}
