//! Configuration layer: typed settings with layered precedence (file → env → CLI).

use std::{
    net::SocketAddr,
    num::{NonZeroU32, NonZeroUsize},
    path::PathBuf,
    str::FromStr,
    time::Duration,
};

use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

use crate::domain::{
    request::DEFAULT_MIN_IDENTIFIER_LEN,
    types::{InvocationShape, OutputFormat, ScopeStrategy},
};

mod cli;

pub use cli::{CliArgs, Command, RenderArgs, ReportOverrides, ServeArgs, ServeOverrides, ToolOverrides};

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "parcel-report";
const ENV_PREFIX: &str = "PARCEL_REPORT";
const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 8000;
const DEFAULT_TOOL_PROGRAM: &str = "qgis_process";
const DEFAULT_TOOL_WRAPPER: [&str; 2] = ["xvfb-run", "-a"];
const DEFAULT_TOOL_TIMEOUT_SECS: u64 = 300;
const DEFAULT_DISCOVERY_TIMEOUT_SECS: u64 = 60;
const DEFAULT_RUNTIME_DIR: &str = "/tmp/runtime-parcel-report";
const DEFAULT_OUTPUT_TAIL_CHARS: usize = 4000;
const DEFAULT_PROJECT_FILE: &str = "/app/proyecto.qgz";
const DEFAULT_LAYOUT: &str = "Plano";
const DEFAULT_DPI: u32 = 300;
const DEFAULT_SCOPE_KEY: &str = "REFCAT";
const DEFAULT_EXTENT_A_INPUT: &str = "EXTENT_A";
const DEFAULT_EXTENT_B_INPUT: &str = "EXTENT_B";

/// Fully-resolved deployment settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub logging: LoggingSettings,
    pub tool: ToolSettings,
    pub report: ReportSettings,
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub addr: SocketAddr,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

/// How the external tool is launched.
#[derive(Debug, Clone)]
pub struct ToolSettings {
    pub program: PathBuf,
    /// Launcher placed in front of `program`, e.g. `xvfb-run -a`.
    pub wrapper: Vec<String>,
    pub timeout: Duration,
    pub discovery_timeout: Duration,
    /// Exported as `XDG_RUNTIME_DIR` when the service environment lacks it.
    pub runtime_dir: PathBuf,
    /// Directory holding reserved output paths.
    pub scratch_dir: PathBuf,
    pub output_tail_chars: NonZeroUsize,
}

/// What gets rendered and how the parcel is selected.
#[derive(Debug, Clone)]
pub struct ReportSettings {
    pub project_file: PathBuf,
    pub layout: String,
    /// Candidate algorithms, tried in order until one yields a valid artifact.
    pub algorithms: Vec<String>,
    pub format: OutputFormat,
    pub dpi: NonZeroU32,
    pub georeference: bool,
    pub force_vector_output: bool,
    pub invocation: InvocationShape,
    pub scope: ScopeStrategy,
    /// Environment variable, filter field or project variable, depending on `scope`.
    pub scope_key: String,
    pub extent_a_input: String,
    pub extent_b_input: String,
    pub min_identifier_len: usize,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(
        Environment::with_prefix(ENV_PREFIX)
            .separator("__")
            .try_parsing(true)
            .list_separator(",")
            .with_list_parse_key("tool.wrapper")
            .with_list_parse_key("report.algorithms"),
    );

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;

    match cli.command.as_ref() {
        Some(Command::Serve(args)) => raw.apply_serve_overrides(&args.overrides),
        Some(Command::Render(args)) => {
            raw.apply_report_overrides(&args.report);
            raw.apply_tool_overrides(&args.tool);
        }
        None => raw.apply_serve_overrides(&ServeOverrides::default()),
    }

    Settings::from_raw(raw)
}

/// Resolve configuration using the supplied CLI arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    server: RawServerSettings,
    logging: RawLoggingSettings,
    tool: RawToolSettings,
    report: RawReportSettings,
}

impl RawSettings {
    fn apply_serve_overrides(&mut self, overrides: &ServeOverrides) {
        if let Some(host) = overrides.server_host.as_ref() {
            self.server.host = Some(host.clone());
        }
        if let Some(port) = overrides.server_port {
            self.server.port = Some(port);
        }
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }

        self.apply_report_overrides(&overrides.report);
        self.apply_tool_overrides(&overrides.tool);
    }

    fn apply_report_overrides(&mut self, overrides: &ReportOverrides) {
        if let Some(path) = overrides.project_file.as_ref() {
            self.report.project_file = Some(path.clone());
        }
        if let Some(layout) = overrides.layout.as_ref() {
            self.report.layout = Some(layout.clone());
        }
        if !overrides.algorithms.is_empty() {
            self.report.algorithms = Some(overrides.algorithms.clone());
        }
        if let Some(format) = overrides.format.as_ref() {
            self.report.format = Some(format.clone());
        }
        if let Some(scope) = overrides.scope.as_ref() {
            self.report.scope = Some(scope.clone());
        }
        if let Some(invocation) = overrides.invocation.as_ref() {
            self.report.invocation = Some(invocation.clone());
        }
    }

    fn apply_tool_overrides(&mut self, overrides: &ToolOverrides) {
        if let Some(program) = overrides.program.as_ref() {
            self.tool.program = Some(program.clone());
        }
        if let Some(seconds) = overrides.timeout_seconds {
            self.tool.timeout_seconds = Some(seconds);
        }
        if overrides.no_wrapper {
            self.tool.wrapper = Some(Vec::new());
        }
    }
}

impl Settings {
    /// Settings built purely from defaults, without reading any source.
    pub fn defaults() -> Result<Self, LoadError> {
        Self::from_raw(RawSettings::default())
    }

    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            server,
            logging,
            tool,
            report,
        } = raw;

        Ok(Self {
            server: build_server_settings(server)?,
            logging: build_logging_settings(logging)?,
            tool: build_tool_settings(tool)?,
            report: build_report_settings(report)?,
        })
    }
}

fn build_server_settings(server: RawServerSettings) -> Result<ServerSettings, LoadError> {
    let host = server.host.unwrap_or_else(|| DEFAULT_HOST.to_string());
    let port = server.port.unwrap_or(DEFAULT_PORT);
    if port == 0 {
        return Err(LoadError::invalid(
            "server.port",
            "port must be greater than zero",
        ));
    }

    let addr = parse_socket_addr(&host, port)
        .map_err(|reason| LoadError::invalid("server.addr", reason))?;

    Ok(ServerSettings { addr })
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_tool_settings(tool: RawToolSettings) -> Result<ToolSettings, LoadError> {
    let program = tool
        .program
        .unwrap_or_else(|| PathBuf::from(DEFAULT_TOOL_PROGRAM));
    if program.as_os_str().is_empty() {
        return Err(LoadError::invalid("tool.program", "path must not be empty"));
    }

    let wrapper = tool
        .wrapper
        .unwrap_or_else(|| DEFAULT_TOOL_WRAPPER.iter().map(|s| s.to_string()).collect())
        .into_iter()
        .map(|part| part.trim().to_string())
        .filter(|part| !part.is_empty())
        .collect();

    let timeout = positive_duration(
        tool.timeout_seconds.unwrap_or(DEFAULT_TOOL_TIMEOUT_SECS),
        "tool.timeout_seconds",
    )?;
    let discovery_timeout = positive_duration(
        tool.discovery_timeout_seconds
            .unwrap_or(DEFAULT_DISCOVERY_TIMEOUT_SECS),
        "tool.discovery_timeout_seconds",
    )?;

    let runtime_dir = tool
        .runtime_dir
        .unwrap_or_else(|| PathBuf::from(DEFAULT_RUNTIME_DIR));
    if runtime_dir.as_os_str().is_empty() {
        return Err(LoadError::invalid(
            "tool.runtime_dir",
            "path must not be empty",
        ));
    }

    let scratch_dir = tool.scratch_dir.unwrap_or_else(std::env::temp_dir);

    let output_tail_chars = NonZeroUsize::new(
        tool.output_tail_chars
            .unwrap_or(DEFAULT_OUTPUT_TAIL_CHARS),
    )
    .ok_or_else(|| LoadError::invalid("tool.output_tail_chars", "must be greater than zero"))?;

    Ok(ToolSettings {
        program,
        wrapper,
        timeout,
        discovery_timeout,
        runtime_dir,
        scratch_dir,
        output_tail_chars,
    })
}

fn build_report_settings(report: RawReportSettings) -> Result<ReportSettings, LoadError> {
    let format = parse_enum::<OutputFormat>(report.format, "report.format", OutputFormat::Pdf)?;
    let invocation = parse_enum::<InvocationShape>(
        report.invocation,
        "report.invocation",
        InvocationShape::Arguments,
    )?;
    let scope =
        parse_enum::<ScopeStrategy>(report.scope, "report.scope", ScopeStrategy::Environment)?;

    if scope == ScopeStrategy::ProjectVariable && invocation != InvocationShape::Stdin {
        return Err(LoadError::invalid(
            "report.scope",
            "project_variable scoping requires the stdin invocation shape",
        ));
    }

    let algorithms: Vec<String> = report
        .algorithms
        .unwrap_or_default()
        .into_iter()
        .map(|alg| alg.trim().to_string())
        .filter(|alg| !alg.is_empty())
        .collect();
    let algorithms = if algorithms.is_empty() {
        vec![format.default_algorithm().to_string()]
    } else {
        algorithms
    };

    let layout = non_empty_string(report.layout, DEFAULT_LAYOUT, "report.layout")?;
    let scope_key = non_empty_string(report.scope_key, DEFAULT_SCOPE_KEY, "report.scope_key")?;
    let extent_a_input = non_empty_string(
        report.extent_a_input,
        DEFAULT_EXTENT_A_INPUT,
        "report.extent_a_input",
    )?;
    let extent_b_input = non_empty_string(
        report.extent_b_input,
        DEFAULT_EXTENT_B_INPUT,
        "report.extent_b_input",
    )?;

    let dpi = NonZeroU32::new(report.dpi.unwrap_or(DEFAULT_DPI))
        .ok_or_else(|| LoadError::invalid("report.dpi", "must be greater than zero"))?;

    let min_identifier_len = report
        .min_identifier_len
        .unwrap_or(DEFAULT_MIN_IDENTIFIER_LEN);
    if min_identifier_len == 0 {
        return Err(LoadError::invalid(
            "report.min_identifier_len",
            "must be greater than zero",
        ));
    }

    Ok(ReportSettings {
        project_file: report
            .project_file
            .unwrap_or_else(|| PathBuf::from(DEFAULT_PROJECT_FILE)),
        layout,
        algorithms,
        format,
        dpi,
        georeference: report.georeference.unwrap_or(true),
        force_vector_output: report.force_vector_output.unwrap_or(false),
        invocation,
        scope,
        scope_key,
        extent_a_input,
        extent_b_input,
        min_identifier_len,
    })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawServerSettings {
    host: Option<String>,
    port: Option<u16>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawToolSettings {
    program: Option<PathBuf>,
    wrapper: Option<Vec<String>>,
    timeout_seconds: Option<u64>,
    discovery_timeout_seconds: Option<u64>,
    runtime_dir: Option<PathBuf>,
    scratch_dir: Option<PathBuf>,
    output_tail_chars: Option<usize>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawReportSettings {
    project_file: Option<PathBuf>,
    layout: Option<String>,
    algorithms: Option<Vec<String>>,
    format: Option<String>,
    dpi: Option<u32>,
    georeference: Option<bool>,
    force_vector_output: Option<bool>,
    invocation: Option<String>,
    scope: Option<String>,
    scope_key: Option<String>,
    extent_a_input: Option<String>,
    extent_b_input: Option<String>,
    min_identifier_len: Option<usize>,
}

fn parse_socket_addr(host: &str, port: u16) -> Result<SocketAddr, String> {
    let candidate = format!("{host}:{port}");
    candidate
        .parse()
        .map_err(|err| format!("invalid address `{candidate}`: {err}"))
}

fn positive_duration(seconds: u64, key: &'static str) -> Result<Duration, LoadError> {
    if seconds == 0 {
        return Err(LoadError::invalid(key, "must be greater than zero"));
    }
    Ok(Duration::from_secs(seconds))
}

fn parse_enum<T>(value: Option<String>, key: &'static str, default: T) -> Result<T, LoadError>
where
    T: FromStr<Err = String>,
{
    match value {
        Some(raw) => raw.parse().map_err(|reason: String| LoadError::invalid(key, reason)),
        None => Ok(default),
    }
}

fn non_empty_string(
    value: Option<String>,
    default: &str,
    key: &'static str,
) -> Result<String, LoadError> {
    let value = value.unwrap_or_else(|| default.to_string());
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(LoadError::invalid(key, "must not be empty"));
    }
    Ok(trimmed.to_string())
}
