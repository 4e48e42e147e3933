//! Algorithm discovery through the external tool.

use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tracing::warn;

use crate::{
    application::render::{
        InvocationSpec, ProcessOutcome, ProcessResult, ProcessRunner,
        diagnostics::display_command, invocation::tool_invocation,
    },
    config::ToolSettings,
    util::text::tail_chars,
};

/// Captured context of a discovery command that did not exit cleanly.
#[derive(Debug, Clone, Serialize)]
pub struct ToolFailure {
    pub command: String,
    pub outcome: &'static str,
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("operation name must not be empty")]
    MissingName,
    #[error("external tool failed ({})", .0.outcome)]
    Tool(ToolFailure),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VersionInfo {
    pub version: Option<String>,
    pub raw: String,
}

#[derive(Clone)]
pub struct DiscoveryService {
    tool: ToolSettings,
    runner: Arc<dyn ProcessRunner>,
}

impl DiscoveryService {
    pub fn new(tool: ToolSettings, runner: Arc<dyn ProcessRunner>) -> Self {
        Self { tool, runner }
    }

    /// Available algorithms, optionally narrowed to lines containing `filter`.
    pub async fn list(&self, filter: Option<&str>) -> Result<String, DiscoveryError> {
        let stdout = self.execute(["list"]).await?;
        let needle = filter
            .map(str::trim)
            .filter(|needle| !needle.is_empty())
            .map(str::to_lowercase);

        Ok(match needle {
            Some(needle) => stdout
                .lines()
                .filter(|line| line.to_lowercase().contains(&needle))
                .collect::<Vec<_>>()
                .join("\n"),
            None => stdout,
        })
    }

    pub async fn help(&self, name: &str) -> Result<String, DiscoveryError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(DiscoveryError::MissingName);
        }
        self.execute(["help", name]).await
    }

    pub async fn version(&self) -> Result<VersionInfo, DiscoveryError> {
        let raw = self.execute(["--version"]).await?;
        Ok(VersionInfo {
            version: parse_version(&raw),
            raw,
        })
    }

    async fn execute<const N: usize>(&self, args: [&str; N]) -> Result<String, DiscoveryError> {
        let spec = tool_invocation(&self.tool, args, self.tool.discovery_timeout);
        let result = self.runner.run(&spec).await;

        if result.exited_cleanly() {
            return Ok(result.stdout);
        }

        let failure = self.failure(&spec, &result);
        warn!(
            target = "application::discovery",
            op = "discovery::execute",
            result = failure.outcome,
            exit_code = failure.exit_code.map(i64::from).unwrap_or(-1),
            command = %failure.command,
            "Discovery command failed"
        );
        Err(DiscoveryError::Tool(failure))
    }

    fn failure(&self, spec: &InvocationSpec, result: &ProcessResult) -> ToolFailure {
        let tail = self.tool.output_tail_chars.get();
        let stderr = match &result.outcome {
            ProcessOutcome::ExecutorError { error } => error.clone(),
            _ => tail_chars(&result.stderr, tail),
        };
        ToolFailure {
            command: display_command(spec),
            outcome: result.outcome.as_str(),
            exit_code: result.exit_code(),
            stdout: tail_chars(&result.stdout, tail),
            stderr,
        }
    }
}

/// First whitespace-separated token that starts with a digit and contains a dot.
pub fn parse_version(raw: &str) -> Option<String> {
    raw.split_whitespace()
        .map(|token| token.trim_matches(|c: char| matches!(c, ',' | ';' | '(' | ')')))
        .find(|token| token.starts_with(|c: char| c.is_ascii_digit()) && token.contains('.'))
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use std::{sync::Mutex, time::Duration};

    use async_trait::async_trait;

    use super::*;
    use crate::config::Settings;

    struct CannedRunner {
        outcome: ProcessOutcome,
        stdout: &'static str,
        stderr: &'static str,
        seen: Mutex<Vec<InvocationSpec>>,
    }

    impl CannedRunner {
        fn new(outcome: ProcessOutcome, stdout: &'static str, stderr: &'static str) -> Arc<Self> {
            Arc::new(Self {
                outcome,
                stdout,
                stderr,
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl ProcessRunner for CannedRunner {
        async fn run(&self, spec: &InvocationSpec) -> ProcessResult {
            self.seen.lock().expect("lock").push(spec.clone());
            ProcessResult {
                outcome: self.outcome.clone(),
                stdout: self.stdout.to_string(),
                stderr: self.stderr.to_string(),
                elapsed: Duration::from_millis(3),
            }
        }
    }

    fn service(runner: Arc<CannedRunner>) -> DiscoveryService {
        let mut settings = Settings::defaults().expect("defaults");
        settings.tool.wrapper.clear();
        DiscoveryService::new(settings.tool, runner)
    }

    const OK: ProcessOutcome = ProcessOutcome::Exited { code: Some(0) };

    #[tokio::test]
    async fn list_filters_lines_case_insensitively() {
        let runner = CannedRunner::new(
            OK,
            "native:printlayouttopdf\tExport print layout as PDF\nnative:buffer\tBuffer\nnative:atlasLayoutToPdf\tExport atlas layout as PDF\n",
            "",
        );
        let service = service(runner.clone());

        let listing = service.list(Some("PDF")).await.expect("list");

        assert_eq!(
            listing,
            "native:printlayouttopdf\tExport print layout as PDF\nnative:atlasLayoutToPdf\tExport atlas layout as PDF"
        );
        let seen = runner.seen.lock().expect("lock");
        assert_eq!(seen[0].program, "qgis_process");
        assert_eq!(seen[0].args, vec!["list"]);
        assert_eq!(seen[0].timeout, Duration::from_secs(60));
    }

    #[tokio::test]
    async fn blank_filter_returns_everything() {
        let runner = CannedRunner::new(OK, "a\nb\n", "");
        let listing = service(runner).list(Some("  ")).await.expect("list");
        assert_eq!(listing, "a\nb\n");
    }

    #[tokio::test]
    async fn help_requires_a_name() {
        let runner = CannedRunner::new(OK, "", "");
        let err = service(runner.clone()).help(" ").await.expect_err("blank name");

        assert!(matches!(err, DiscoveryError::MissingName));
        assert!(runner.seen.lock().expect("lock").is_empty());
    }

    #[tokio::test]
    async fn failures_carry_command_and_stderr() {
        let runner = CannedRunner::new(
            ProcessOutcome::Exited { code: Some(1) },
            "",
            "Algorithm native:nope not found",
        );
        let err = service(runner)
            .help("native:nope")
            .await
            .expect_err("tool failure");

        let DiscoveryError::Tool(failure) = err else {
            panic!("expected tool failure");
        };
        assert_eq!(failure.command, "qgis_process help native:nope");
        assert_eq!(failure.exit_code, Some(1));
        assert_eq!(failure.stderr, "Algorithm native:nope not found");
    }

    #[tokio::test]
    async fn version_extracts_dotted_number() {
        let runner = CannedRunner::new(OK, "QGIS 3.34.4-Prizren 'Prizren' (exported)\nQGIS code branch Release 3.34\n", "");
        let info = service(runner).version().await.expect("version");

        assert_eq!(info.version.as_deref(), Some("3.34.4-Prizren"));
        assert!(info.raw.starts_with("QGIS 3.34.4"));
    }

    #[test]
    fn parse_version_skips_non_numeric_tokens() {
        assert_eq!(parse_version("qgis_process (3.28.1)"), Some("3.28.1".to_string()));
        assert_eq!(parse_version("version 3 build 7"), None);
        assert_eq!(parse_version(""), None);
    }
}
