//! Reserved output files and the validity rule applied after a run.

use std::{io, path::Path};

use tempfile::TempPath;

use crate::domain::types::OutputFormat;

use super::executor::ProcessResult;

/// A unique output path reserved before invocation.
///
/// The file is removed when the artifact (or the [`TempPath`] taken from it)
/// is dropped, which covers every exit path of a request.
#[derive(Debug)]
pub struct OutputArtifact {
    path: TempPath,
    format: OutputFormat,
}

/// What the tool left behind at the reserved path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ArtifactState {
    pub exists: bool,
    pub size: u64,
}

impl OutputArtifact {
    pub fn reserve(dir: &Path, format: OutputFormat) -> io::Result<Self> {
        let suffix = format!(".{}", format.extension());
        let file = tempfile::Builder::new()
            .prefix("report_")
            .suffix(&suffix)
            .tempfile_in(dir)?;

        Ok(Self {
            path: file.into_temp_path(),
            format,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn format(&self) -> OutputFormat {
        self.format
    }

    pub async fn inspect(&self) -> ArtifactState {
        match tokio::fs::metadata(&*self.path).await {
            Ok(meta) if meta.is_file() => ArtifactState {
                exists: true,
                size: meta.len(),
            },
            _ => ArtifactState::default(),
        }
    }

    /// Hand over the deletion guard, e.g. to a response body.
    pub fn into_temp_path(self) -> TempPath {
        self.path
    }
}

/// Exit code zero, file present and non-empty. No single condition suffices.
pub fn is_valid(result: &ProcessResult, state: &ArtifactState) -> bool {
    result.exited_cleanly() && state.exists && state.size > 0
}
