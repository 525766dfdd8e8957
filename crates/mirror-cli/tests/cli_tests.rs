//! Tests for the `mirror` binary
//!
//! These tests exercise the actual compiled binary using assert_cmd.

use assert_cmd::Command;
use mirror_test_utils::TestTree;
use predicates::prelude::*;
use std::fs;

fn mirror_cmd() -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("mirror"));
    cmd.env_remove("MIRROR_CONFIG").env_remove("RUST_LOG");
    cmd
}

/// Two existing directories plus a path for the config file.
struct Setup {
    tree: TestTree,
}

impl Setup {
    fn new() -> Self {
        let tree = TestTree::new();
        tree.subdir("src");
        tree.subdir("dst");
        Self { tree }
    }

    fn arg(&self, relative: &str) -> String {
        self.tree.path(relative).display().to_string()
    }

    fn init(&self, extra: &[&str]) -> assert_cmd::assert::Assert {
        mirror_cmd()
            .args(["init", &self.arg("mirror.toml")])
            .args(["--source", &self.arg("src")])
            .args(["--destination", &self.arg("dst")])
            .args(extra)
            .assert()
    }
}

// ============================================================================
// Help
// ============================================================================

#[test]
fn test_help_lists_commands() {
    mirror_cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("run"))
        .stdout(predicate::str::contains("validate"))
        .stdout(predicate::str::contains("init"));
}

#[test]
fn test_missing_subcommand_fails() {
    mirror_cmd().assert().failure();
}

// ============================================================================
// Init
// ============================================================================

#[test]
fn test_init_writes_loadable_config() {
    let setup = Setup::new();

    setup
        .init(&["--mode", "mtime"])
        .success()
        .stdout(predicate::str::contains("Wrote"));

    let content = setup.tree.read("mirror.toml");
    assert!(content.contains("comparison_mode = \"mtime\""), "{}", content);
    assert!(content.contains("[[fan_out]]"), "{}", content);
}

#[test]
fn test_init_refuses_to_overwrite() {
    let setup = Setup::new();
    setup.tree.write("mirror.toml", "# mine\n");

    setup
        .init(&[])
        .failure()
        .stderr(predicate::str::contains("already exists"));

    assert_eq!(setup.tree.read("mirror.toml"), "# mine\n");
}

#[test]
fn test_init_force_overwrites() {
    let setup = Setup::new();
    setup.tree.write("mirror.toml", "# mine\n");

    setup.init(&["--force", "--mirror"]).success();

    assert!(setup.tree.read("mirror.toml").contains("[[mirrors]]"));
}

// ============================================================================
// Validate
// ============================================================================

#[test]
fn test_validate_accepts_initialized_config() {
    let setup = Setup::new();
    setup.init(&["--mirror"]).success();

    mirror_cmd()
        .args(["validate", "--config", &setup.arg("mirror.toml")])
        .assert()
        .success()
        .stdout(predicate::str::contains("is valid"))
        .stdout(predicate::str::contains("source -> destination"))
        .stdout(predicate::str::contains("destination -> source"));
}

#[test]
fn test_validate_json_output() {
    let setup = Setup::new();
    setup.init(&[]).success();

    let output = mirror_cmd()
        .args(["validate", "--json", "--config", &setup.arg("mirror.toml")])
        .output()
        .unwrap();

    assert!(output.status.success());
    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json["comparison_mode"], "hash");
    assert_eq!(json["watched"][0]["id"], "source");
    assert_eq!(json["destinations"][0]["id"], "destination");
    assert_eq!(json["routes"][0], "source -> destination");
}

#[test]
fn test_validate_reports_missing_root() {
    let setup = Setup::new();
    setup.init(&[]).success();
    fs::remove_dir(setup.tree.path("dst")).unwrap();

    mirror_cmd()
        .args(["validate", "--config", &setup.arg("mirror.toml")])
        .assert()
        .failure()
        .stderr(predicate::str::contains("error"))
        .stderr(predicate::str::contains("destination"));
}

#[test]
fn test_validate_rejects_unknown_endpoint() {
    let tree = TestTree::new();
    tree.subdir("a");
    let config = format!(
        "[[endpoints]]\nid = \"a\"\nroot = \"{}\"\n\n[[fan_out]]\nsource = \"a\"\ndestinations = [\"ghost\"]\n",
        tree.path("a").display().to_string().replace('\\', "/")
    );
    tree.write("bad.toml", &config);

    mirror_cmd()
        .args(["validate", "--config", &tree.path("bad.toml").display().to_string()])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unknown endpoint 'ghost'"));
}

#[test]
fn test_validate_rejects_unsupported_format() {
    let tree = TestTree::new();
    tree.write("mirror.ini", "x=1\n");

    mirror_cmd()
        .args(["validate", "--config", &tree.path("mirror.ini").display().to_string()])
        .assert()
        .failure();
}

#[test]
fn test_run_with_missing_config_fails() {
    let tree = TestTree::new();

    mirror_cmd()
        .args(["run", "--config", &tree.path("absent.toml").display().to_string()])
        .assert()
        .failure()
        .stderr(predicate::str::contains("error"));
}
