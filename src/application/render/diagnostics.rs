//! Operator-facing diagnostics for render attempts.
//!
//! Arguments are never passed through a shell; the quoting here only makes the
//! command reproducible when copied from a diagnostic body.

use std::borrow::Cow;

use serde::Serialize;

use crate::util::text::tail_chars;

use super::{
    artifact::ArtifactState,
    executor::{ProcessOutcome, ProcessResult},
    invocation::InvocationSpec,
};

/// Quote one argument for POSIX shell display.
pub fn quote_for_display(arg: &str) -> Cow<'_, str> {
    let is_plain = !arg.is_empty()
        && arg.chars().all(|c| {
            c.is_ascii_alphanumeric()
                || matches!(c, '_' | '-' | '.' | '/' | ':' | '=' | ',' | '+' | '@' | '%')
        });

    if is_plain {
        Cow::Borrowed(arg)
    } else {
        Cow::Owned(format!("'{}'", arg.replace('\'', r#"'"'"'"#)))
    }
}

/// Full command line with every argument quoted for display.
pub fn display_command(spec: &InvocationSpec) -> String {
    spec.command_line()
        .map(quote_for_display)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Terminal failure states of a render.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    FailedExit,
    FailedTimeout,
    FailedMissingOutput,
    FailedExecutor,
}

impl FailureKind {
    /// Classify a run whose artifact did not pass validation.
    pub fn classify(result: &ProcessResult) -> Self {
        match &result.outcome {
            ProcessOutcome::TimedOut => FailureKind::FailedTimeout,
            ProcessOutcome::ExecutorError { .. } => FailureKind::FailedExecutor,
            ProcessOutcome::Exited { code: Some(0) } => FailureKind::FailedMissingOutput,
            ProcessOutcome::Exited { .. } => FailureKind::FailedExit,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FailureKind::FailedExit => "failed_exit",
            FailureKind::FailedTimeout => "failed_timeout",
            FailureKind::FailedMissingOutput => "failed_missing_output",
            FailureKind::FailedExecutor => "failed_executor",
        }
    }

    pub fn message(self) -> &'static str {
        match self {
            FailureKind::FailedExit => "external tool failed",
            FailureKind::FailedTimeout => "external tool timed out",
            FailureKind::FailedMissingOutput => "external tool produced no output",
            FailureKind::FailedExecutor => "external tool could not be executed",
        }
    }
}

/// One algorithm tried for a request.
#[derive(Debug, Clone, Serialize)]
pub struct AttemptDiagnostics {
    pub algorithm: String,
    pub command: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stdin: Option<String>,
    pub outcome: &'static str,
    pub exit_code: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub executor_error: Option<String>,
    pub stdout: String,
    pub stderr: String,
    pub elapsed_ms: u64,
    pub output_exists: bool,
    pub output_size: u64,
}

impl AttemptDiagnostics {
    pub fn new(
        algorithm: &str,
        spec: &InvocationSpec,
        result: &ProcessResult,
        artifact: &ArtifactState,
        tail: usize,
    ) -> Self {
        let executor_error = match &result.outcome {
            ProcessOutcome::ExecutorError { error } => Some(error.clone()),
            _ => None,
        };

        Self {
            algorithm: algorithm.to_string(),
            command: display_command(spec),
            stdin: spec.stdin.as_deref().map(|payload| tail_chars(payload, tail)),
            outcome: result.outcome.as_str(),
            exit_code: result.exit_code(),
            executor_error,
            stdout: tail_chars(&result.stdout, tail),
            stderr: tail_chars(&result.stderr, tail),
            elapsed_ms: result.elapsed.as_millis() as u64,
            output_exists: artifact.exists,
            output_size: artifact.size,
        }
    }
}

/// Body returned on failure, or on request in debug mode.
///
/// The top-level command/output fields mirror the last attempt so a single
/// glance is enough when only one algorithm is configured.
#[derive(Debug, Clone, Serialize)]
pub struct RenderDiagnostics {
    pub error: Option<&'static str>,
    pub kind: Option<FailureKind>,
    pub timed_out: bool,
    pub identifier: String,
    pub command: Option<String>,
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub output_exists: bool,
    pub output_size: u64,
    pub attempts: Vec<AttemptDiagnostics>,
}

impl RenderDiagnostics {
    pub fn new(identifier: &str, kind: Option<FailureKind>, attempts: Vec<AttemptDiagnostics>) -> Self {
        let last = attempts.last();
        Self {
            error: kind.map(FailureKind::message),
            kind,
            timed_out: kind == Some(FailureKind::FailedTimeout),
            identifier: identifier.to_string(),
            command: last.map(|a| a.command.clone()),
            exit_code: last.and_then(|a| a.exit_code),
            stdout: last.map(|a| a.stdout.clone()).unwrap_or_default(),
            stderr: last.map(|a| a.stderr.clone()).unwrap_or_default(),
            output_exists: last.is_some_and(|a| a.output_exists),
            output_size: last.map(|a| a.output_size).unwrap_or_default(),
            attempts,
        }
    }
}
