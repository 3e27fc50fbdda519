#![allow(deprecated)] // TODO: cargo_bin → cargo_bin_cmd! へ移行

mod common;

use assert_cmd::Command;
use common::{CONFIG, TestProject};
use predicates::prelude::*;

fn ship() -> Command {
    let mut cmd = Command::cargo_bin("ship").unwrap();
    cmd.env_remove("SHIPFLOW_CONFIG_PATH").env_remove("RUST_LOG");
    cmd
}

/// CLIヘルプが正しく表示されることを確認
#[test]
fn test_cli_help() {
    ship()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("assemble"))
        .stdout(predicate::str::contains("dockerfile"))
        .stdout(predicate::str::contains("build"))
        .stdout(predicate::str::contains("push"))
        .stdout(predicate::str::contains("--rerun"));
}

/// バージョン表示が正しく動作することを確認
#[test]
fn test_cli_version() {
    ship()
        .arg("version")
        .assert()
        .success()
        .stdout(predicate::str::contains("shipflow"));
}

#[test]
fn test_tasks_lists_dependencies() {
    let project = TestProject::new();
    let config = project.write_config(CONFIG);

    ship()
        .arg("--config")
        .arg(&config)
        .arg("tasks")
        .assert()
        .success()
        .stdout(predicate::str::contains("assemble"))
        .stdout(predicate::str::contains("depends on: assemble"))
        .stdout(predicate::str::contains("depends on: dockerfile"))
        .stdout(predicate::str::contains("depends on: build"));
}

/// Docker なしで記述子まで生成できる
#[test]
fn test_dockerfile_end_to_end() {
    let project = TestProject::new();
    let config = project.write_config(CONFIG);

    ship()
        .arg("--config")
        .arg(&config)
        .arg("dockerfile")
        .assert()
        .success()
        .stdout(predicate::str::contains("assemble"))
        .stdout(predicate::str::contains("SUCCEEDED"));

    let docker_dir = project.path().join("build/docker");
    let dockerfile = std::fs::read_to_string(docker_dir.join("Dockerfile")).unwrap();
    assert!(dockerfile.starts_with("FROM openjdk:8-jre\n"));
    assert!(dockerfile.contains("ENV DEFAULT_JAVA_OPTS=\"-Xmx512m\"\n"));
    assert!(docker_dir.join("notifier-fat.jar").exists());
    assert!(project.path().join("build/libs/notifier-fat.jar").exists());

    // 2回目は何もしない
    ship()
        .arg("--config")
        .arg(&config)
        .arg("dockerfile")
        .assert()
        .success()
        .stdout(predicate::str::contains("SKIPPED (up to date)"))
        .stdout(predicate::str::contains("0 実行, 2 スキップ"));
}

#[test]
fn test_debug_flag_exposes_debug_port() {
    let project = TestProject::new();
    let config = project.write_config(CONFIG);

    ship()
        .arg("--config")
        .arg(&config)
        .arg("--debug")
        .arg("dockerfile")
        .assert()
        .success();

    let dockerfile =
        std::fs::read_to_string(project.path().join("build/docker/Dockerfile")).unwrap();
    assert!(dockerfile.contains("address=5005"));
    assert!(dockerfile.contains("EXPOSE 5005\n"));
}

/// 記述子の設定が欠けていればイメージのビルドに進まない
#[test]
fn test_missing_descriptor_key_fails() {
    let project = TestProject::new();
    let config = project.write_config(&CONFIG.replace("base_image = \"openjdk:8-jre\"\n", ""));

    ship()
        .arg("--config")
        .arg(&config)
        .arg("build")
        .assert()
        .failure()
        .stdout(predicate::str::contains("FAILED"))
        .stdout(predicate::str::contains("docker.base_image"))
        .stderr(predicate::str::contains("dockerfile"));
}

#[test]
fn test_invalid_property() {
    let project = TestProject::new();
    let config = project.write_config(CONFIG);

    ship()
        .arg("--config")
        .arg(&config)
        .args(["-P", "dockerRegistryUrl"])
        .arg("tasks")
        .assert()
        .failure()
        .stderr(predicate::str::contains("KEY=VALUE"));
}

#[test]
fn test_missing_config_file() {
    let project = TestProject::new();

    ship()
        .current_dir(project.path())
        .arg("--config")
        .arg(project.path().join("missing.toml"))
        .arg("tasks")
        .assert()
        .failure();
}
