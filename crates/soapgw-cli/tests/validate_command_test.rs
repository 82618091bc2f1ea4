use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

fn cargo_bin() -> PathBuf {
    if let Ok(path) = env::var("CARGO_BIN_EXE_soapgw") {
        return PathBuf::from(path);
    }

    let target_dir = env::var("CARGO_TARGET_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| repo_root().join("target"));
    let fallback = target_dir
        .join("debug")
        .join(format!("soapgw{}", std::env::consts::EXE_SUFFIX));

    if fallback.exists() {
        return fallback;
    }

    panic!(
        "CARGO_BIN_EXE_soapgw is not set and fallback binary was not found at {}",
        fallback.display()
    );
}

fn repo_root() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("..")
        .join("..")
}

fn testdata_path(path: &str) -> PathBuf {
    repo_root().join("testdata").join(path)
}

fn run_validate(config: &Path) -> Output {
    Command::new(cargo_bin())
        .args(["validate", "--config", config.to_string_lossy().as_ref()])
        .output()
        .expect("soapgw validate should execute")
}

fn celsius_route(response_template: &Path) -> String {
    format!(
        r#"
routes:
  - path: /celsius
    soap_endpoint: http://localhost/xml/tempconvert.asmx
    request_template: {request}
    response_template: {response}
    headers:
      SOAPAction: https://www.w3schools.com/xml/CelsiusToFahrenheit
    wsdl_url: {wsdl}
"#,
        request = testdata_path("templates/celsius_request.tmpl").display(),
        response = response_template.display(),
        wsdl = testdata_path("tempconvert.wsdl").display(),
    )
}

#[test]
fn test_validate_sample_config_passes() {
    let output = run_validate(&testdata_path("gateway.yaml"));
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(
        output.status.success(),
        "stdout: {stdout}\nstderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    assert!(stdout.contains("2 route(s) valid"), "{stdout}");
}

#[test]
fn test_validate_reports_drift_and_fails() {
    let dir = tempfile::tempdir().unwrap();
    let template = dir.path().join("drifted.tmpl");
    fs::write(&template, r#"{"f": {{json .Fahrenheit}}}"#).unwrap();
    let config = dir.path().join("gateway.yaml");
    fs::write(&config, celsius_route(&template)).unwrap();

    let output = run_validate(&config);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(!output.status.success());
    assert!(stdout.contains("Fahrenheit: path not found in schema"), "{stdout}");
    assert!(
        stdout.contains("CelsiusToFahrenheitResult: required path missing from template"),
        "{stdout}"
    );
}

#[test]
fn test_validate_reports_unloadable_route() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("gateway.yaml");
    fs::write(&config, celsius_route(&dir.path().join("absent.tmpl"))).unwrap();

    let output = run_validate(&config);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(!output.status.success());
    assert!(stdout.contains("route /celsius: failed to load template"), "{stdout}");
}

#[test]
fn test_validate_rejects_malformed_config() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("gateway.json");
    fs::write(&config, r#"{"server": {"max_concurrency": 0}}"#).unwrap();

    let output = run_validate(&config);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("max_concurrency"));
}
