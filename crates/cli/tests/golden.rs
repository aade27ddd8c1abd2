//! Golden tests for the `isd_s3` binary's output and exit codes
//!
//! Only commands that finish before any network call are exercised: help,
//! dry runs, configuration errors and malformed input.
//!
//! Run with: `cargo test --features golden`

#![cfg(feature = "golden")]

use std::io::Write;
use std::path::Path;
use std::process::{Command, Output, Stdio};

use serde_json::{Value, json};
use tempfile::TempDir;

/// A command for the built binary, isolated from the caller's environment
fn isd_s3(config_dir: &Path) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_isd_s3"));
    cmd.env("ISD_S3_CONFIG", config_dir.join("config.toml"))
        .env("AWS_REGION", "us-east-1")
        .env_remove("S3_URL")
        .env_remove("AWS_SHARED_CREDENTIALS_FILE")
        .env_remove("ISD_S3_DEFAULT_BUCKET")
        .env_remove("RUST_LOG");
    cmd
}

fn run_with_stdin(mut cmd: Command, stdin: &str) -> Output {
    let mut child = cmd
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("Failed to spawn isd_s3");
    child
        .stdin
        .take()
        .expect("stdin is piped")
        .write_all(stdin.as_bytes())
        .expect("Failed to write stdin");
    child.wait_with_output().expect("Failed to wait for isd_s3")
}

/// Directory with `a.txt` and `sub/b.txt`
fn data_dir() -> TempDir {
    let dir = TempDir::new().expect("Failed to create temp dir");
    std::fs::write(dir.path().join("a.txt"), b"a").unwrap();
    std::fs::create_dir(dir.path().join("sub")).unwrap();
    std::fs::write(dir.path().join("sub").join("b.txt"), b"b").unwrap();
    dir
}

/// `relative path -> key` for each planned upload
fn planned(json: &Value, root: &Path) -> Vec<String> {
    json["planned"]
        .as_array()
        .expect("planned is an array")
        .iter()
        .map(|p| {
            let file = Path::new(p["local_file"].as_str().unwrap());
            let relative = file.strip_prefix(root).unwrap();
            let relative: Vec<String> = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect();
            format!("{} -> {}", relative.join("/"), p["key"].as_str().unwrap())
        })
        .collect()
}

#[test]
fn test_no_arguments_prints_help() {
    let config = TempDir::new().unwrap();
    let output = isd_s3(config.path())
        .stdin(Stdio::null())
        .output()
        .expect("Failed to execute isd_s3");

    assert_eq!(output.status.code(), Some(1));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Usage:"), "help expected, got: {stdout}");
    assert!(stdout.contains("upload_mult"));
}

#[test]
fn test_upload_mult_dry_run() {
    let config = TempDir::new().unwrap();
    let data = data_dir();

    let output = isd_s3(config.path())
        .args(["--default_bucket", "rda-data", "um", "--local_dir"])
        .arg(data.path())
        .args(["-r", "--dry_run", "--key_prefix", "ds084.1/"])
        .stdin(Stdio::null())
        .output()
        .expect("Failed to execute isd_s3");

    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(stdout.lines().count(), 1, "compact output is one line");

    let json: Value = serde_json::from_str(&stdout).expect("Output should be valid JSON");
    assert_eq!(json["bucket"], "rda-data");
    assert_eq!(json["dry_run"], true);
    assert_eq!(json["uploaded"], json!([]));
    insta::assert_json_snapshot!(planned(&json, data.path()), @r#"
    [
      "a.txt -> ds084.1/a.txt",
      "sub/b.txt -> ds084.1/sub/b.txt"
    ]
    "#);
}

#[test]
fn test_noprint_suppresses_output() {
    let config = TempDir::new().unwrap();
    let data = data_dir();

    let output = isd_s3(config.path())
        .args(["--noprint", "--default_bucket", "rda-data", "um", "--dry_run", "--local_dir"])
        .arg(data.path())
        .stdin(Stdio::null())
        .output()
        .expect("Failed to execute isd_s3");

    assert!(output.status.success());
    assert!(output.stdout.is_empty());
}

#[test]
fn test_json_stdin_pretty() {
    let config = TempDir::new().unwrap();
    let data = data_dir();
    let input = json!({
        "command": "um",
        "local_dir": data.path(),
        "dry_run": true,
        "default_bucket": "rda-data",
        "prettyprint": true
    });

    let output = run_with_stdin(isd_s3(config.path()), &input.to_string());

    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.lines().count() > 1, "pretty output spans lines");

    let json: Value = serde_json::from_str(&stdout).expect("Output should be valid JSON");
    insta::assert_json_snapshot!(planned(&json, data.path()), @r#"
    [
      "a.txt -> a.txt"
    ]
    "#);
}

#[test]
fn test_json_stdin_malformed() {
    let config = TempDir::new().unwrap();
    let output = run_with_stdin(isd_s3(config.path()), "{\"command\": ");

    assert_eq!(output.status.code(), Some(2));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("not valid JSON"), "stderr: {stderr}");
}

#[test]
fn test_json_stdin_unknown_command() {
    let config = TempDir::new().unwrap();
    let output = run_with_stdin(isd_s3(config.path()), r#"{"command": "frobnicate"}"#);

    assert_eq!(output.status.code(), Some(2));
}

#[test]
fn test_missing_bucket_is_config_error() {
    let config = TempDir::new().unwrap();
    let output = isd_s3(config.path())
        .args(["lo", "ds084.1/"])
        .stdin(Stdio::null())
        .output()
        .expect("Failed to execute isd_s3");

    assert_eq!(output.status.code(), Some(1));
    assert!(output.stdout.is_empty());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Configuration error"), "stderr: {stderr}");
}

#[test]
fn test_invalid_s3_url_is_config_error() {
    let config = TempDir::new().unwrap();
    let output = isd_s3(config.path())
        .args(["--s3_url", "not a url", "lb"])
        .stdin(Stdio::null())
        .output()
        .expect("Failed to execute isd_s3");

    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Configuration error"), "stderr: {stderr}");
}
