use std::{sync::Arc, time::Instant};

use metrics::{counter, histogram};
use tracing::{info, warn};

use crate::{
    config::{ReportSettings, ToolSettings},
    domain::{request::RenderRequest, types::OutputFormat},
    util::text::sanitize_filename_component,
};

use super::{
    RenderError,
    artifact::{OutputArtifact, is_valid},
    diagnostics::{AttemptDiagnostics, FailureKind, RenderDiagnostics},
    executor::ProcessRunner,
    invocation::build_render_invocation,
};

/// A validated artifact ready to be sent.
#[derive(Debug)]
pub struct RenderedReport {
    pub artifact: OutputArtifact,
    pub size: u64,
    pub filename: String,
    pub diagnostics: RenderDiagnostics,
}

impl RenderedReport {
    pub fn format(&self) -> OutputFormat {
        self.artifact.format()
    }
}

#[derive(Debug)]
pub enum RenderOutcome {
    Rendered(RenderedReport),
    Failed(RenderDiagnostics),
}

/// Runs the configured algorithms in order until one yields a valid artifact.
#[derive(Clone)]
pub struct ReportRenderer {
    report: ReportSettings,
    tool: ToolSettings,
    runner: Arc<dyn ProcessRunner>,
}

impl ReportRenderer {
    pub fn new(report: ReportSettings, tool: ToolSettings, runner: Arc<dyn ProcessRunner>) -> Self {
        Self {
            report,
            tool,
            runner,
        }
    }

    pub fn settings(&self) -> &ReportSettings {
        &self.report
    }

    pub async fn render(&self, request: &RenderRequest) -> Result<RenderOutcome, RenderError> {
        let started_at = Instant::now();
        let identifier = request.identifier();

        if !tokio::fs::try_exists(&self.report.project_file)
            .await
            .unwrap_or(false)
        {
            counter!("parcel_report_render_total", "outcome" => "project_missing").increment(1);
            return Err(RenderError::ProjectMissing {
                path: self.report.project_file.clone(),
            });
        }

        let tail = self.tool.output_tail_chars.get();
        let mut attempts = Vec::with_capacity(self.report.algorithms.len());
        let mut last_failure = None;

        for algorithm in &self.report.algorithms {
            let artifact = OutputArtifact::reserve(&self.tool.scratch_dir, self.report.format)
                .map_err(RenderError::Reserve)?;
            let spec = build_render_invocation(
                request,
                &self.report,
                &self.tool,
                algorithm,
                artifact.path(),
            );

            let result = self.runner.run(&spec).await;
            let state = artifact.inspect().await;
            attempts.push(AttemptDiagnostics::new(
                algorithm, &spec, &result, &state, tail,
            ));

            if is_valid(&result, &state) {
                let elapsed_ms = started_at.elapsed().as_millis() as u64;
                counter!("parcel_report_render_total", "outcome" => "succeeded").increment(1);
                histogram!("parcel_report_render_ms").record(elapsed_ms as f64);
                info!(
                    target = "application::render::renderer",
                    op = "renderer::render",
                    result = "succeeded",
                    identifier,
                    algorithm = %algorithm,
                    attempts = attempts.len(),
                    output_bytes = state.size,
                    elapsed_ms,
                    "Report rendered"
                );

                let filename = format!(
                    "report_{}.{}",
                    sanitize_filename_component(identifier),
                    self.report.format.extension()
                );
                return Ok(RenderOutcome::Rendered(RenderedReport {
                    artifact,
                    size: state.size,
                    filename,
                    diagnostics: RenderDiagnostics::new(identifier, None, attempts),
                }));
            }

            let kind = FailureKind::classify(&result);
            warn!(
                target = "application::render::renderer",
                op = "renderer::render",
                result = kind.as_str(),
                identifier,
                algorithm = %algorithm,
                exit_code = result.exit_code().map(i64::from).unwrap_or(-1),
                output_exists = state.exists,
                output_bytes = state.size,
                "Render attempt failed"
            );
            last_failure = Some(kind);

            // another candidate would just wait out the same budget again
            if kind == FailureKind::FailedTimeout {
                break;
            }
        }

        let kind = last_failure.unwrap_or(FailureKind::FailedMissingOutput);
        counter!("parcel_report_render_total", "outcome" => kind.as_str()).increment(1);
        histogram!("parcel_report_render_ms").record(started_at.elapsed().as_millis() as f64);

        Ok(RenderOutcome::Failed(RenderDiagnostics::new(
            identifier,
            Some(kind),
            attempts,
        )))
    }
}
