//! CLI integration tests

use std::io::Write;
use std::process::{Command, Output};

use tempfile::NamedTempFile;

fn spendctl(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_spendctl"))
        .args(args)
        .env_remove("SOURCE_TABLE_ID")
        .env_remove("DAYS_TO_AVERAGE")
        .env_remove("CHANGE_THRESHOLD")
        .env_remove("ALERT_METRIC")
        .env_remove("MIN_PERCENT_CHANGE")
        .env("NO_COLOR", "1")
        .output()
        .expect("Failed to execute command")
}

/// Three flat days followed by a spike on 2024-06-04
fn usage_file() -> NamedTempFile {
    let rows: Vec<String> = [("2024-06-01", "10"), ("2024-06-02", "10"), ("2024-06-03", "10"), ("2024-06-04", "25")]
        .iter()
        .map(|(day, cost)| {
            format!(
                r#"{{"day":"{day}","project_id":"proj-a","sku_id":"sku-1","sku_description":"Storage & Egress","cost":"{cost}","currency":"USD"}}"#
            )
        })
        .collect();

    let mut file = NamedTempFile::new().unwrap();
    write!(file, "[{}]", rows.join(",")).unwrap();
    file
}

/// Test that the CLI shows help
#[test]
fn test_cli_help() {
    let output = spendctl(&["--help"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "CLI help should succeed");
    assert!(stdout.contains("Cloud Spend Monitor"), "Should show app name");
    assert!(stdout.contains("detect"), "Should show detect command");
    assert!(stdout.contains("preview"), "Should show preview command");
    assert!(stdout.contains("export"), "Should show export command");
}

/// Test that the CLI shows version
#[test]
fn test_cli_version() {
    let output = spendctl(&["--version"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "CLI version should succeed");
    assert!(stdout.contains("spendctl"), "Should show binary name");
}

/// Test detect subcommand help
#[test]
fn test_detect_help() {
    let output = spendctl(&["detect", "--help"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "Detect help should succeed");
    assert!(stdout.contains("--input"), "Should show input option");
    assert!(stdout.contains("--table"), "Should show table option");
    assert!(stdout.contains("--change-threshold"), "Should show threshold option");
    assert!(stdout.contains("--metric"), "Should show metric option");
}

/// Test export subcommand help
#[test]
fn test_export_help() {
    let output = spendctl(&["export", "--help"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "Export help should succeed");
    assert!(stdout.contains("--output"), "Should show output option");
}

#[test]
fn test_detect_json_from_file() {
    let file = usage_file();
    let path = file.path().to_str().unwrap();
    let output = spendctl(&[
        "--format",
        "json",
        "detect",
        "--input",
        path,
        "--evaluation-day",
        "2024-06-04",
        "--change-threshold",
        "5",
    ]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "Detect should succeed: {}", stdout);
    let analysis: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    let anomalies = analysis["report"]["anomalies"].as_array().unwrap();
    assert_eq!(anomalies.len(), 2);
    assert_eq!(analysis["report"]["history_days"], 3);
    assert_eq!(
        analysis["report"]["pretext"],
        "Only 3/30 days of data is available."
    );
    assert_eq!(analysis["currency"], "USD");
}

#[test]
fn test_detect_table_without_anomalies() {
    let file = usage_file();
    let path = file.path().to_str().unwrap();
    let output = spendctl(&[
        "detect",
        "--input",
        path,
        "--evaluation-day",
        "2024-06-04",
        "--change-threshold",
        "100",
    ]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success());
    assert!(stdout.contains("No limits exceeded"));
}

#[test]
fn test_preview_renders_slack_and_email() {
    let file = usage_file();
    let path = file.path().to_str().unwrap();
    let base = ["--input", path, "--evaluation-day", "2024-06-04", "--metric", "max"];

    let mut args = vec!["preview"];
    args.extend(base);
    let output = spendctl(&args);
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(output.status.success());
    assert!(stdout.contains("GCP billing alert for 2024-06-04"));
    assert!(stdout.contains("1 SKU exceeded spend limits"));
    assert!(stdout.contains("Storage &amp; Egress"));
    assert!(stdout.contains("30-day max"));

    let mut args = vec!["preview", "--channel", "email"];
    args.extend(base);
    let output = spendctl(&args);
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(output.status.success());
    assert!(stdout.contains("<table"));
}

#[test]
fn test_detect_requires_a_source() {
    let output = spendctl(&["detect"]);
    let stderr = String::from_utf8_lossy(&output.stderr);

    assert!(!output.status.success());
    assert!(stderr.contains("--input"));
}
