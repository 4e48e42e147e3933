use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueHint, builder::BoolishValueParser};

/// Command-line arguments for the parcel-report binary.
#[derive(Debug, Parser)]
#[command(
    name = "parcel-report",
    version,
    about = "Cadastral parcel report renderer"
)]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "PARCEL_REPORT_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run the HTTP service.
    Serve(Box<ServeArgs>),
    /// Render a single report to a local file and exit.
    Render(Box<RenderArgs>),
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeArgs {
    #[command(flatten)]
    pub overrides: ServeOverrides,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeOverrides {
    #[command(flatten)]
    pub report: ReportOverrides,

    #[command(flatten)]
    pub tool: ToolOverrides,

    /// Override the listener host.
    #[arg(long = "server-host", value_name = "HOST")]
    pub server_host: Option<String>,

    /// Override the listener port.
    #[arg(long = "server-port", env = "PORT", value_name = "PORT")]
    pub server_port: Option<u16>,

    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub log_json: Option<bool>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ReportOverrides {
    /// Override the QGIS project file rendered by every request.
    #[arg(long = "project-file", env = "QGIS_PROJECT", value_name = "PATH")]
    pub project_file: Option<PathBuf>,

    /// Override the print layout name.
    #[arg(long = "layout", env = "QGIS_LAYOUT", value_name = "NAME")]
    pub layout: Option<String>,

    /// Override the candidate algorithms, tried in order.
    #[arg(
        long = "algorithm",
        env = "QGIS_ALGO",
        value_name = "ID",
        value_delimiter = ','
    )]
    pub algorithms: Vec<String>,

    /// Override the output format (pdf|png).
    #[arg(long = "format", value_name = "FORMAT")]
    pub format: Option<String>,

    /// Override the scoping strategy (environment|filter|project_variable).
    #[arg(long = "scope", value_name = "STRATEGY")]
    pub scope: Option<String>,

    /// Override the invocation shape (arguments|stdin).
    #[arg(long = "invocation", value_name = "SHAPE")]
    pub invocation: Option<String>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ToolOverrides {
    /// Override the external tool executable.
    #[arg(long = "tool-program", value_name = "PATH")]
    pub program: Option<PathBuf>,

    /// Override the render timeout.
    #[arg(long = "tool-timeout-seconds", value_name = "SECONDS")]
    pub timeout_seconds: Option<u64>,

    /// Run the tool directly instead of through the configured wrapper.
    #[arg(long = "no-wrapper", action = clap::ArgAction::SetTrue)]
    pub no_wrapper: bool,
}

#[derive(Debug, Args, Clone)]
pub struct RenderArgs {
    #[command(flatten)]
    pub report: ReportOverrides,

    #[command(flatten)]
    pub tool: ToolOverrides,

    /// Cadastral reference of the parcel to render.
    #[arg(value_name = "IDENTIFIER")]
    pub identifier: String,

    /// Destination file for the rendered report.
    #[arg(long, short, value_name = "FILE", value_hint = ValueHint::FilePath)]
    pub output: PathBuf,

    /// Optional WKT geometry forwarded as the first extent.
    #[arg(long = "extent-a", value_name = "WKT")]
    pub extent_a: Option<String>,

    /// Optional WKT geometry forwarded as the second extent.
    #[arg(long = "extent-b", value_name = "WKT")]
    pub extent_b: Option<String>,
}
