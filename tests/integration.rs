//! Integration tests driving the built `adlens` binary through a
//! temporary config and campaigns file, entirely offline via the
//! deterministic providers.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn adlens_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("adlens");
    path
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    let data_dir = root.join("data");
    fs::create_dir_all(&data_dir).unwrap();

    fs::write(
        data_dir.join("campaigns.json"),
        r#"{
          "campaigns": [
            {
              "id": "camp_001",
              "name": "Summer Fashion Sale",
              "industry": "Fashion",
              "audience": "retargeting",
              "objective": "conversions",
              "status": "active",
              "daily_performance": {
                "2024-11-01": {"impressions": 85000, "clicks": 1700, "spend": 610.0,
                               "conversions": 68, "ctr": 2.0, "cpm": 7.18, "cpc": 0.36,
                               "roas": 3.1, "frequency": 2.1},
                "2024-11-02": {"impressions": 70000, "clicks": 1350, "spend": 875.0,
                               "conversions": 60, "ctr": 1.9, "cpm": 12.50, "cpc": 0.65,
                               "roas": 2.4, "frequency": 2.6}
              }
            },
            {
              "id": "camp_002",
              "name": "Lookalike Expansion",
              "industry": "Fashion",
              "audience": "lookalike",
              "objective": "conversions",
              "status": "active",
              "daily_performance": {
                "2024-11-01": {"impressions": 120000, "clicks": 1800, "spend": 900.0,
                               "conversions": 54, "ctr": 1.5, "cpm": 7.50, "cpc": 0.50,
                               "roas": 2.1, "frequency": 1.4}
              }
            }
          ]
        }"#,
    )
    .unwrap();

    let config_content = format!(
        r#"[data]
path = "{}/data/campaigns.json"

[retrieval]
top_k = 5

[embedding]
provider = "hash"

[llm]
provider = "canned"

[server]
bind = "127.0.0.1:7420"
"#,
        root.display()
    );

    let config_path = config_dir.join("adlens.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_adlens(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = adlens_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run adlens binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let success = output.status.success();
    (stdout, stderr, success)
}

#[test]
fn test_chunks_reports_kind_counts() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_adlens(&config_path, &["chunks"]);
    assert!(success, "chunks failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("campaigns: 2"));
    assert!(stdout.contains("overview: 2"));
    assert!(stdout.contains("daily_performance: 3"));
    assert!(stdout.contains("comparison: 1"));
    assert!(stdout.contains("global_insight: 1"));
}

#[test]
fn test_classify_reports_intent_and_entities() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, _, success) = run_adlens(
        &config_path,
        &["classify", "Why did CPM spike 40% in campaign camp_001?"],
    );
    assert!(success);
    assert!(stdout.contains("intent: performance_anomaly"));
    assert!(stdout.contains("camp_001"));
    assert!(stdout.contains("cpm"));
}

#[test]
fn test_ask_answers_with_sources() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) =
        run_adlens(&config_path, &["ask", "Why did CPM spike in campaign camp_001?"]);
    assert!(success, "ask failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("intent: performance_anomaly"));
    assert!(stdout.contains("sources:"));
    assert!(stdout.contains("camp_001"));
    assert!(!stdout.trim().is_empty());
}

#[test]
fn test_ask_unknown_campaign_is_degraded_not_an_error() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, _, success) = run_adlens(&config_path, &["ask", "How did camp_999 perform?"]);
    assert!(success, "degraded queries still exit 0");
    assert!(stdout.contains("[degraded]"));
}

#[test]
fn test_classify_is_deterministic_across_runs() {
    let (_tmp, config_path) = setup_test_env();

    let (a, _, _) = run_adlens(&config_path, &["classify", "Compare retargeting vs lookalike ROAS"]);
    let (b, _, _) = run_adlens(&config_path, &["classify", "Compare retargeting vs lookalike ROAS"]);
    assert_eq!(a, b);
    assert!(a.contains("intent: campaign_comparison"));
}

#[test]
fn test_missing_config_fails_cleanly() {
    let tmp = TempDir::new().unwrap();
    let missing = tmp.path().join("nope.toml");
    let (_, stderr, success) = run_adlens(&missing, &["chunks"]);
    assert!(!success);
    assert!(stderr.contains("Failed to read config file"));
}

#[test]
fn test_invalid_config_rejected() {
    let (_tmp, config_path) = setup_test_env();
    let content = fs::read_to_string(&config_path).unwrap();
    fs::write(
        &config_path,
        content.replace("top_k = 5", "top_k = 0"),
    )
    .unwrap();

    let (_, stderr, success) = run_adlens(&config_path, &["chunks"]);
    assert!(!success);
    assert!(stderr.contains("top_k"));
}
