#![allow(dead_code)]

use std::{
    fs,
    os::unix::fs::PermissionsExt,
    path::{Path, PathBuf},
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    http::{Request, Response, StatusCode},
};
use bytes::Bytes;
use http_body_util::BodyExt;
use parcel_report::{
    application::render::{InvocationSpec, ProcessResult, ProcessRunner, TokioProcessRunner},
    config::Settings,
    infra::http::{AppState, build_router},
};
use tempfile::TempDir;
use tower::ServiceExt;

/// Scratch layout for one test: project file, fake tool, scratch and runtime dirs.
pub struct Fixture {
    pub dir: TempDir,
    pub settings: Settings,
}

impl Fixture {
    /// `script` is the body of a `/bin/sh` script standing in for the tool.
    pub fn new(script: &str) -> Self {
        let dir = TempDir::new().expect("temp dir");
        let project = dir.path().join("proyecto.qgz");
        fs::write(&project, b"qgz").expect("write project");
        let scratch = dir.path().join("scratch");
        fs::create_dir_all(&scratch).expect("scratch dir");

        let program = dir.path().join("qgis_process");
        fs::write(&program, format!("#!/bin/sh\n{script}")).expect("write script");
        make_executable(&program);

        let mut settings = Settings::defaults().expect("default settings");
        settings.report.project_file = project;
        settings.tool.program = program;
        settings.tool.wrapper.clear();
        settings.tool.scratch_dir = scratch;
        settings.tool.runtime_dir = dir.path().join("runtime");
        settings.tool.timeout = Duration::from_secs(20);
        settings.tool.discovery_timeout = Duration::from_secs(20);

        Self { dir, settings }
    }

    /// Launch the tool through a wrapper that forks it, as `xvfb-run` does.
    pub fn use_forking_wrapper(&mut self) {
        let wrapper = self.dir.path().join("xvfb-run");
        fs::write(&wrapper, "#!/bin/sh\n\"$@\"\n").expect("write wrapper");
        make_executable(&wrapper);
        self.settings.tool.wrapper = vec![wrapper.display().to_string()];
    }

    pub fn scratch_dir(&self) -> &Path {
        &self.settings.tool.scratch_dir
    }

    pub fn router(&self) -> Router {
        let runner = Arc::new(TokioProcessRunner::new(&self.settings.tool));
        self.router_with(runner)
    }

    pub fn router_with(&self, runner: Arc<dyn ProcessRunner>) -> Router {
        build_router(AppState::new(Arc::new(self.settings.clone()), runner))
    }

    /// Files still present in the scratch dir.
    pub fn leftovers(&self) -> Vec<PathBuf> {
        fs::read_dir(self.scratch_dir())
            .expect("read scratch dir")
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .collect()
    }
}

pub fn make_executable(path: &Path) {
    let mut perms = fs::metadata(path).expect("metadata").permissions();
    perms.set_mode(0o755);
    fs::set_permissions(path, perms).expect("set perms");
}

/// Writes `size` zero bytes to the path given as `OUTPUT=...`.
pub fn writes_output(size: usize) -> String {
    format!(
        r#"out=""
for arg in "$@"; do
  case "$arg" in
    OUTPUT=*) out="${{arg#OUTPUT=}}" ;;
  esac
done
head -c {size} /dev/zero > "$out"
"#
    )
}

/// Liveness from procfs; zombies waiting to be reaped count as gone.
pub fn is_running(pid: i32) -> bool {
    fs::read_to_string(format!("/proc/{pid}/stat")).is_ok_and(|stat| {
        stat.rsplit_once(')')
            .is_some_and(|(_, rest)| !rest.trim_start().starts_with('Z'))
    })
}

pub async fn get(router: &Router, uri: &str) -> Response<Body> {
    let request = Request::builder()
        .uri(uri)
        .body(Body::empty())
        .expect("request should build");
    router
        .clone()
        .oneshot(request)
        .await
        .expect("router should respond")
}

pub async fn body_bytes(response: Response<Body>) -> Bytes {
    response
        .into_body()
        .collect()
        .await
        .expect("body should collect")
        .to_bytes()
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = body_bytes(response).await;
    serde_json::from_slice(&bytes).expect("body should be json")
}

pub fn assert_status(response: &Response<Body>, status: StatusCode) {
    assert_eq!(response.status(), status, "unexpected status");
}

/// Never spawns anything; counts how often it was asked to.
#[derive(Default)]
pub struct CountingRunner {
    pub calls: AtomicUsize,
}

impl CountingRunner {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProcessRunner for CountingRunner {
    async fn run(&self, _spec: &InvocationSpec) -> ProcessResult {
        self.calls.fetch_add(1, Ordering::SeqCst);
        ProcessResult::executor_error("counting runner never spawns", Duration::ZERO)
    }
}
