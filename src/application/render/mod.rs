//! Report rendering: invocation building, bounded execution and artifact validation.

use std::{io, path::PathBuf};

use thiserror::Error;

pub mod artifact;
pub mod diagnostics;
pub mod executor;
pub mod invocation;
mod renderer;

pub use artifact::{ArtifactState, OutputArtifact};
pub use diagnostics::{FailureKind, RenderDiagnostics};
pub use executor::{ProcessOutcome, ProcessResult, ProcessRunner, TokioProcessRunner};
pub use invocation::InvocationSpec;
pub use renderer::{RenderOutcome, RenderedReport, ReportRenderer};

/// Failures that happen before any external process is started.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("project file not found: {}", path.display())]
    ProjectMissing { path: PathBuf },
    #[error("failed to reserve output path")]
    Reserve(#[source] io::Error),
}
