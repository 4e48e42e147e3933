use std::time::Duration;

use clap::Parser;
use parcel_report::config::{self, CliArgs};
use serial_test::serial;

/// Sets variables for the duration of a test and removes them afterwards.
struct EnvGuard(Vec<&'static str>);

impl EnvGuard {
    fn set(vars: &[(&'static str, &str)]) -> Self {
        for (key, value) in vars {
            // SAFETY: tests touching the environment are serialized.
            unsafe { std::env::set_var(key, value) };
        }
        Self(vars.iter().map(|(key, _)| *key).collect())
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        for key in &self.0 {
            // SAFETY: tests touching the environment are serialized.
            unsafe { std::env::remove_var(key) };
        }
    }
}

#[test]
#[serial]
fn prefixed_environment_overrides_defaults() {
    let _env = EnvGuard::set(&[
        ("PARCEL_REPORT__REPORT__LAYOUT", "Ficha"),
        (
            "PARCEL_REPORT__REPORT__ALGORITHMS",
            "native:atlaslayouttopdf,native:printlayouttopdf",
        ),
        ("PARCEL_REPORT__TOOL__TIMEOUT_SECONDS", "42"),
    ]);

    let settings = config::load(&CliArgs::parse_from(["parcel-report", "serve"])).expect("load");

    assert_eq!(settings.report.layout, "Ficha");
    assert_eq!(
        settings.report.algorithms,
        vec!["native:atlaslayouttopdf", "native:printlayouttopdf"]
    );
    assert_eq!(settings.tool.timeout, Duration::from_secs(42));
}

#[test]
#[serial]
fn cli_flags_beat_environment() {
    let _env = EnvGuard::set(&[("PARCEL_REPORT__REPORT__LAYOUT", "Ficha")]);

    let settings = config::load(&CliArgs::parse_from([
        "parcel-report",
        "serve",
        "--layout",
        "Plano catastral",
    ]))
    .expect("load");

    assert_eq!(settings.report.layout, "Plano catastral");
}

#[test]
#[serial]
fn legacy_variables_map_to_flags() {
    let _env = EnvGuard::set(&[
        ("QGIS_PROJECT", "/srv/maps/catastro.qgz"),
        ("QGIS_LAYOUT", "Informe"),
        ("QGIS_ALGO", "native:atlaslayouttopdf"),
    ]);

    let settings = config::load(&CliArgs::parse_from(["parcel-report", "serve"])).expect("load");

    assert_eq!(
        settings.report.project_file,
        std::path::Path::new("/srv/maps/catastro.qgz")
    );
    assert_eq!(settings.report.layout, "Informe");
    assert_eq!(settings.report.algorithms, vec!["native:atlaslayouttopdf"]);
}

#[test]
#[serial]
fn invalid_environment_value_names_the_key() {
    let _env = EnvGuard::set(&[("PARCEL_REPORT__REPORT__SCOPE", "shell")]);

    let err = config::load(&CliArgs::parse_from(["parcel-report", "serve"]))
        .expect_err("invalid scope");

    assert!(err.to_string().contains("report.scope"), "{err}");
}
