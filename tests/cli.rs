//! Command-line behaviour of the `rescaler` binary

use assert_cmd::Command;
use image::{Rgb, RgbImage};
use predicates::prelude::*;
use tempfile::TempDir;

fn source_dir() -> TempDir {
    let dir = TempDir::new().unwrap();
    let source = dir.path().join("src");
    std::fs::create_dir_all(&source).unwrap();
    RgbImage::from_pixel(12, 8, Rgb([120, 60, 30]))
        .save(source.join("photo.png"))
        .unwrap();
    dir
}

fn rescaler() -> Command {
    Command::cargo_bin("rescaler").unwrap()
}

#[test]
fn single_strategy_writes_output() {
    let dir = source_dir();
    let dest = dir.path().join("out");

    rescaler()
        .arg(dir.path().join("src"))
        .arg(&dest)
        .args(["--strategy", "sequential", "--scale", "0.5", "--quiet"])
        .assert()
        .success();

    let written = image::open(dest.join("photo.jpg")).unwrap();
    assert_eq!((written.width(), written.height()), (6, 4));
}

#[test]
fn all_strategies_write_to_subdirectories() {
    let dir = source_dir();
    let dest = dir.path().join("out");

    rescaler()
        .arg(dir.path().join("src"))
        .arg(&dest)
        .arg("--quiet")
        .assert()
        .success();

    for name in ["sequential", "task-per-file", "parallel-worker", "data-parallel"] {
        assert!(dest.join(name).join("photo.jpg").exists(), "{name}");
    }
}

#[test]
fn json_output_lists_reports() {
    let dir = source_dir();

    rescaler()
        .arg(dir.path().join("src"))
        .arg(dir.path().join("out"))
        .args(["--strategy", "data-parallel", "--json", "--quiet"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"strategy\": \"data-parallel\""))
        .stdout(predicate::str::contains("\"succeeded\": 1"));
}

#[test]
fn missing_source_fails() {
    let dir = TempDir::new().unwrap();
    let dest = dir.path().join("out");

    rescaler()
        .arg(dir.path().join("missing"))
        .arg(&dest)
        .arg("--quiet")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Directory not found"));

    assert!(!dest.exists());
}

#[test]
fn failed_file_gives_non_zero_exit() {
    let dir = source_dir();
    std::fs::write(dir.path().join("src/bad.png"), b"nope").unwrap();

    rescaler()
        .arg(dir.path().join("src"))
        .arg(dir.path().join("out"))
        .args(["--strategy", "parallel-worker", "--quiet"])
        .assert()
        .failure();

    assert!(dir.path().join("out/photo.jpg").exists());
}

#[test]
fn unknown_strategy_is_rejected() {
    let dir = source_dir();

    rescaler()
        .arg(dir.path().join("src"))
        .arg(dir.path().join("out"))
        .args(["--strategy", "threads"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unknown strategy"));
}

#[test]
fn invalid_quality_is_rejected() {
    let dir = source_dir();

    rescaler()
        .arg(dir.path().join("src"))
        .arg(dir.path().join("out"))
        .args(["--quality", "0", "--quiet"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Quality"));
}

#[test]
fn example_config_round_trips() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("rescaler.toml");

    rescaler()
        .args(["example-config", "--output"])
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("TOML"));

    let dest = dir.path().join("out");
    let source = source_dir();
    rescaler()
        .arg(source.path().join("src"))
        .arg(&dest)
        .args(["--strategy", "task-per-file", "--quiet", "--config"])
        .arg(&path)
        .assert()
        .success();

    assert!(dest.join("photo.jpg").exists());
}

#[test]
fn example_config_yaml() {
    let dir = TempDir::new().unwrap();

    rescaler()
        .current_dir(dir.path())
        .args(["example-config", "--yaml"])
        .assert()
        .success();

    assert!(dir.path().join("rescaler.yaml").exists());
}
