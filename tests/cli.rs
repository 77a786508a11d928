use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::Path;
use tempfile::tempdir;

fn hydrorag(data_dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("hydrorag").unwrap();
    cmd.arg("--data-dir").arg(data_dir);
    cmd.env_remove("OPENAI_API_KEY").env("RUST_LOG", "warn");
    cmd
}

fn manuals(root: &Path) {
    fs::create_dir_all(root.join("ro")).unwrap();
    fs::create_dir_all(root.join("pretreatment")).unwrap();
    fs::write(
        root.join("ro/membranes.txt"),
        "Thin-film composite membranes tolerate no free chlorine.",
    )
    .unwrap();
    fs::write(
        root.join("pretreatment/iron.md"),
        "Greensand filters remove iron above 0.3 mg/L.",
    )
    .unwrap();
    fs::write(root.join("readme.txt"), "Hydroflow manual set").unwrap();
}

#[test]
fn test_help_lists_commands() {
    let data = tempdir().unwrap();

    hydrorag(data.path())
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("build"))
        .stdout(predicate::str::contains("recommend"));
}

#[test]
fn test_stats_without_index_fails() {
    let data = tempdir().unwrap();

    hydrorag(data.path())
        .arg("stats")
        .assert()
        .failure()
        .stderr(predicate::str::contains("hydrorag build"));
}

#[test]
fn test_build_offline_then_stats_and_query() {
    let data = tempdir().unwrap();
    let docs = tempdir().unwrap();
    manuals(docs.path());

    hydrorag(data.path())
        .arg("build")
        .arg(docs.path())
        .arg("--offline")
        .assert()
        .success()
        .stdout(predicate::str::contains("Chunks:        3"));

    hydrorag(data.path())
        .arg("stats")
        .assert()
        .success()
        .stdout(predicate::str::contains("hash-embedder"))
        .stdout(predicate::str::contains("ro: 1 chunks"))
        .stdout(predicate::str::contains("general: 1 chunks"));

    hydrorag(data.path())
        .args(["query", "iron removal", "--k", "2"])
        .assert()
        .success()
        .stdout(predicate::str::contains("1. "))
        .stdout(predicate::str::contains("2. "))
        .stdout(predicate::str::contains("3. ").not());
}

#[test]
fn test_build_missing_folder_fails() {
    let data = tempdir().unwrap();

    hydrorag(data.path())
        .args(["build", "does-not-exist", "--offline"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Not a directory"));
}

#[test]
fn test_auth_unknown_service_fails() {
    let data = tempdir().unwrap();

    hydrorag(data.path())
        .args(["auth", "slack"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unknown service"))
        .stderr(predicate::str::contains("Supported: openai, erp"));
}

#[test]
fn test_invalid_config_is_reported() {
    let data = tempdir().unwrap();
    fs::write(data.path().join("hydrorag.toml"), "chunk_size = 0\n").unwrap();

    hydrorag(data.path())
        .arg("stats")
        .assert()
        .failure()
        .stderr(predicate::str::contains("chunk_size"));
}
