//! Shared enumerations describing how reports are produced and delivered.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// File format written by the external tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    Pdf,
    Png,
}

impl OutputFormat {
    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Pdf => "pdf",
            OutputFormat::Png => "png",
        }
    }

    pub fn content_type(self) -> &'static str {
        mime_guess::from_ext(self.extension())
            .first_raw()
            .unwrap_or("application/octet-stream")
    }

    /// Algorithm tried when no explicit candidate list is configured.
    pub fn default_algorithm(self) -> &'static str {
        match self {
            OutputFormat::Pdf => "native:printlayouttopdf",
            OutputFormat::Png => "native:printlayouttoimage",
        }
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pdf" => Ok(OutputFormat::Pdf),
            "png" | "image" => Ok(OutputFormat::Png),
            other => Err(format!("unsupported output format `{other}`")),
        }
    }
}

/// How algorithm parameters reach the external tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvocationShape {
    /// `run <alg> -- KEY=value ...`
    Arguments,
    /// `run <alg> -` with a JSON document on standard input.
    Stdin,
}

impl FromStr for InvocationShape {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "arguments" | "args" | "positional" => Ok(InvocationShape::Arguments),
            "stdin" | "json" => Ok(InvocationShape::Stdin),
            other => Err(format!("unsupported invocation shape `{other}`")),
        }
    }
}

/// Mechanism used to restrict the rendered layout to a single parcel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScopeStrategy {
    /// Export the identifier as an environment variable read by the layout.
    Environment,
    /// Pass a `"field" = 'value'` expression as the algorithm filter.
    Filter,
    /// Override a project variable through the JSON payload.
    ProjectVariable,
}

impl FromStr for ScopeStrategy {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "environment" | "env" => Ok(ScopeStrategy::Environment),
            "filter" | "expression" => Ok(ScopeStrategy::Filter),
            "project_variable" | "variable" => Ok(ScopeStrategy::ProjectVariable),
            other => Err(format!("unsupported scope strategy `{other}`")),
        }
    }
}
