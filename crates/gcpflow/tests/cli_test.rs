#![allow(deprecated)] // TODO: cargo_bin → cargo_bin_cmd! へ移行

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

const ENV_KEYS: [&str; 9] = [
    "GCP_PROJECT_ID",
    "GCP_REGION",
    "GCP_ZONE",
    "GFLOW_BACKEND",
    "GFLOW_POLL_INTERVAL_SECS",
    "GFLOW_POLL_TIMEOUT_SECS",
    "GCP_ACCESS_TOKEN",
    "LOG_LEVEL",
    "RUST_LOG",
];

/// 環境に依存しないよう、空の設定ファイルを指す gflow コマンドを作る
fn gflow(config: &str) -> (TempDir, Command) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.yaml");
    fs::write(&path, config).unwrap();

    let mut cmd = Command::cargo_bin("gflow").unwrap();
    for key in ENV_KEYS {
        cmd.env_remove(key);
    }
    cmd.env("GFLOW_CONFIG_PATH", &path);
    (dir, cmd)
}

/// CLIヘルプが正しく表示されることを確認
#[test]
fn test_cli_help() {
    let mut cmd = Command::cargo_bin("gflow").unwrap();
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("話しかけるだけで"))
        .stdout(predicate::str::contains("ask"))
        .stdout(predicate::str::contains("instance"))
        .stdout(predicate::str::contains("cluster"))
        .stdout(predicate::str::contains("nodepool"))
        .stdout(predicate::str::contains("mcp"));
}

/// バージョン表示が正しく動作することを確認
#[test]
fn test_cli_version() {
    let mut cmd = Command::cargo_bin("gflow").unwrap();
    cmd.arg("version")
        .assert()
        .success()
        .stdout(predicate::str::contains("gcpflow"));
}

/// 不正なコマンドでエラーになることを確認
#[test]
fn test_invalid_command() {
    let mut cmd = Command::cargo_bin("gflow").unwrap();
    cmd.arg("invalid-command").assert().failure();
}

/// instance update のヘルプにラベル・メタデータのオプションがあることを確認
#[test]
fn test_instance_update_help() {
    let mut cmd = Command::cargo_bin("gflow").unwrap();
    cmd.args(["instance", "update", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("<NAME>"))
        .stdout(predicate::str::contains("--label"))
        .stdout(predicate::str::contains("--metadata"));
}

/// key=value 形式でないラベルは引数パースで弾かれることを確認
#[test]
fn test_invalid_label_format() {
    let (_dir, mut cmd) = gflow("backend: memory\n");
    cmd.args(["instance", "update", "web-1", "--label", "oops"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("key=value"));
}

/// --min-nodes / --max-nodes は --autoscaling と一緒に指定する必要があることを確認
#[test]
fn test_nodepool_bounds_require_autoscaling_flag() {
    let (_dir, mut cmd) = gflow("backend: memory\n");
    cmd.args(["nodepool", "create", "c1", "pool-a", "--min-nodes", "1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--autoscaling"));
}

/// --autoscaling だけでは API を呼ぶ前に validation エラーになることを確認
#[test]
fn test_nodepool_autoscaling_without_bounds() {
    let (_dir, mut cmd) = gflow("backend: memory\n");
    cmd.args(["nodepool", "create", "c1", "pool-a", "--autoscaling"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("validation"))
        .stderr(predicate::str::contains("min_node_count and max_node_count"));
}

/// 不明な taint の effect は引数パースで弾かれることを確認
#[test]
fn test_nodepool_invalid_taint_effect() {
    let (_dir, mut cmd) = gflow("backend: memory\n");
    cmd.args([
        "nodepool",
        "create",
        "c1",
        "pool-a",
        "--taint",
        "dedicated=gpu:SOMETIMES",
    ])
    .assert()
    .failure()
    .stderr(predicate::str::contains("Unknown taint effect"));
}

/// 値のない taint は API を呼ぶ前に validation エラーになることを確認
#[test]
fn test_nodepool_taint_without_value() {
    let (_dir, mut cmd) = gflow("backend: memory\n");
    cmd.args(["nodepool", "create", "c1", "pool-a", "--taint", "dedicated="])
        .assert()
        .failure()
        .stderr(predicate::str::contains("validation"))
        .stderr(predicate::str::contains("'key' and 'value'"));
}

/// google バックエンドでプロジェクト未設定ならエラーになることを確認
#[test]
fn test_missing_project() {
    let (_dir, mut cmd) = gflow("");
    cmd.args(["instance", "list"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("GCP_PROJECT_ID"));
}

/// GFLOW_CONFIG_PATH で指定したファイルが無ければエラーになることを確認
#[test]
fn test_missing_explicit_config() {
    let mut cmd = Command::cargo_bin("gflow").unwrap();
    cmd.env("GFLOW_CONFIG_PATH", "/nonexistent/gcpflow/config.yaml")
        .args(["instance", "list"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("設定ファイルが見つかりません"));
}

/// config コマンドで CLI オプションが反映されることを確認
#[test]
fn test_config_show_overrides() {
    let (_dir, mut cmd) = gflow("project_id: from-file\nregion: europe-west1\n");
    cmd.env("GCP_PROJECT_ID", "from-env")
        .args(["--zone", "europe-west1-c", "--json", "config"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"project_id\": \"from-env\""))
        .stdout(predicate::str::contains("\"zone\": \"europe-west1-c\""))
        .stdout(predicate::str::contains("\"backend\": \"google\""));
}

/// memory バックエンドでインスタンス一覧が取れることを確認
#[test]
fn test_memory_list_instances() {
    let (_dir, mut cmd) = gflow("backend: memory\n");
    cmd.args(["--json", "instance", "list", "--zone", "us-east1-b"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"status\": \"OK\""))
        .stdout(predicate::str::contains("No instances found in zone us-east1-b."));
}

/// 存在しないインスタンスは not-found で失敗することを確認
#[test]
fn test_memory_get_missing_instance() {
    let (_dir, mut cmd) = gflow("backend: memory\n");
    cmd.args(["instance", "get", "ghost"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not-found"))
        .stderr(predicate::str::contains(
            "Instance 'ghost' not found in zone us-central1-a.",
        ));
}

/// リージョンを指定したインスタンス操作は API を呼ぶ前に弾かれることを確認
#[test]
fn test_regional_location_rejected_for_instances() {
    let (_dir, mut cmd) = gflow("backend: memory\n");
    cmd.args(["instance", "start", "web-1", "--zone", "us-central1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("validation"));
}

/// 自然言語リクエストが解釈されて実行されることを確認
#[test]
fn test_ask_create_instance() {
    let (_dir, mut cmd) = gflow("backend: memory\n");
    cmd.args([
        "ask",
        "create",
        "instance",
        "api-1",
        "with",
        "machine",
        "type",
        "e2-medium",
    ])
    .assert()
    .success()
    .stdout(predicate::str::contains("create"))
    .stdout(predicate::str::contains("api-1"));
}

/// 解釈できないリクエストはヒント付きで失敗することを確認
#[test]
fn test_ask_unrecognized() {
    let (_dir, mut cmd) = gflow("backend: memory\n");
    cmd.args(["ask", "make", "me", "a", "sandwich"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unrecognized"))
        .stderr(predicate::str::contains("Restart instance"));
}
