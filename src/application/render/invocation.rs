//! Translate a validated request into a concrete tool invocation.

use std::{collections::BTreeMap, path::Path, time::Duration};

use serde_json::{Map, Value, json};

use crate::{
    config::{ReportSettings, ToolSettings},
    domain::{
        request::RenderRequest,
        types::{InvocationShape, ScopeStrategy},
    },
};

/// Environment variable pointing the tool at the project to load.
pub const PROJECT_FILE_ENV: &str = "QGIS_PROJECT_FILE";
/// Algorithm input carrying the scoping predicate.
pub const FILTER_INPUT: &str = "FILTER_EXPRESSION";
/// Token separating algorithm parameters from tool options.
const PARAMETER_SEPARATOR: &str = "--";
/// Token asking the tool to read parameters from standard input.
const STDIN_MARKER: &str = "-";

/// Everything needed to launch the external tool once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvocationSpec {
    pub program: String,
    pub args: Vec<String>,
    pub env: BTreeMap<String, String>,
    pub stdin: Option<String>,
    pub timeout: Duration,
}

impl InvocationSpec {
    /// Program followed by its arguments, as they are passed to the OS.
    pub fn command_line(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.program.as_str()).chain(self.args.iter().map(String::as_str))
    }
}

/// The single mechanism used to restrict one invocation to one parcel.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Scoping {
    Environment { variable: String, value: String },
    Filter { expression: String },
    ProjectVariable { name: String, value: String },
}

impl Scoping {
    fn resolve(strategy: ScopeStrategy, key: &str, identifier: &str) -> Self {
        match strategy {
            ScopeStrategy::Environment => Scoping::Environment {
                variable: key.to_string(),
                value: identifier.to_string(),
            },
            ScopeStrategy::Filter => Scoping::Filter {
                expression: filter_expression(key, identifier),
            },
            ScopeStrategy::ProjectVariable => Scoping::ProjectVariable {
                name: key.to_string(),
                value: identifier.to_string(),
            },
        }
    }
}

/// Build `"field" = 'value'` with both sides escaped.
///
/// Single quotes in the value and double quotes in the field are doubled, so
/// the literal always ends at the final quote.
pub fn filter_expression(field: &str, value: &str) -> String {
    format!(
        "\"{}\" = '{}'",
        field.replace('"', "\"\""),
        value.replace('\'', "''")
    )
}

/// Prefix a tool subcommand with the configured wrapper.
pub fn tool_invocation<I, S>(tool: &ToolSettings, args: I, timeout: Duration) -> InvocationSpec
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let program = tool.program.display().to_string();
    let mut line: Vec<String> = tool.wrapper.clone();
    line.push(program);
    line.extend(args.into_iter().map(Into::into));

    let mut line = line.into_iter();
    // the vector holds at least the program
    let program = line.next().unwrap_or_default();

    InvocationSpec {
        program,
        args: line.collect(),
        env: BTreeMap::new(),
        stdin: None,
        timeout,
    }
}

/// Build the render invocation for `algorithm`, writing to `output`.
pub fn build_render_invocation(
    request: &RenderRequest,
    report: &ReportSettings,
    tool: &ToolSettings,
    algorithm: &str,
    output: &Path,
) -> InvocationSpec {
    let scoping = Scoping::resolve(report.scope, &report.scope_key, request.identifier());
    let inputs = algorithm_inputs(request, report, &scoping, output);
    let project_file = report.project_file.display().to_string();

    let mut spec = match report.invocation {
        InvocationShape::Arguments => {
            let mut args = vec![
                "run".to_string(),
                algorithm.to_string(),
                PARAMETER_SEPARATOR.to_string(),
            ];
            args.extend(
                inputs
                    .iter()
                    .map(|(key, value)| format!("{key}={}", plain_value(value))),
            );
            tool_invocation(tool, args, tool.timeout)
        }
        InvocationShape::Stdin => {
            let mut spec = tool_invocation(
                tool,
                ["run".to_string(), algorithm.to_string(), STDIN_MARKER.to_string()],
                tool.timeout,
            );
            let mut payload = json!({
                "inputs": Value::Object(inputs.into_iter().collect::<Map<String, Value>>()),
                "project_path": project_file.clone(),
            });
            if let Scoping::ProjectVariable { name, value } = &scoping {
                let mut variables = Map::new();
                variables.insert(name.clone(), Value::from(value.clone()));
                payload["project_variables"] = Value::Object(variables);
            }
            spec.stdin = Some(payload.to_string());
            spec
        }
    };

    spec.env.insert(PROJECT_FILE_ENV.to_string(), project_file);
    if let Scoping::Environment { variable, value } = scoping {
        spec.env.insert(variable, value);
    }

    spec
}

fn algorithm_inputs(
    request: &RenderRequest,
    report: &ReportSettings,
    scoping: &Scoping,
    output: &Path,
) -> Vec<(String, Value)> {
    let mut inputs = vec![
        ("LAYOUT".to_string(), Value::from(report.layout.clone())),
        ("DPI".to_string(), Value::from(report.dpi.get())),
        (
            "FORCE_VECTOR_OUTPUT".to_string(),
            Value::from(report.force_vector_output),
        ),
        ("GEOREFERENCE".to_string(), Value::from(report.georeference)),
    ];

    if let Some(extent) = request.extent_a() {
        inputs.push((report.extent_a_input.clone(), Value::from(extent)));
    }
    if let Some(extent) = request.extent_b() {
        inputs.push((report.extent_b_input.clone(), Value::from(extent)));
    }
    if let Scoping::Filter { expression } = scoping {
        inputs.push((FILTER_INPUT.to_string(), Value::from(expression.clone())));
    }

    inputs.push((
        "OUTPUT".to_string(),
        Value::from(output.display().to_string()),
    ));
    inputs
}

fn plain_value(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}
