/*!
 * CLI tests: argument handling and validation that must fail before any
 * network access
 */

use assert_cmd::cargo_bin_cmd;
use assert_cmd::Command;
use assert_fs::prelude::*;
use predicates::prelude::*;

fn rpmrepo() -> Command {
    let mut cmd = cargo_bin_cmd!("rpmrepo");
    cmd.env_remove("AWS_ACCESS_KEY_ID")
        .env_remove("AWS_SECRET_ACCESS_KEY")
        .env_remove("RPMREPO_SIGN_PASS")
        .env_remove("RUST_LOG");
    cmd
}

// ============================================================================
// Help and completions
// ============================================================================

#[test]
fn test_help_lists_rpm_flags() {
    rpmrepo()
        .args(["rpm", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--bucket"))
        .stdout(predicate::str::contains("--rebuild"))
        .stdout(predicate::str::contains("--sign-pass"))
        .stdout(predicate::str::contains("--visibility"));
}

#[test]
fn test_version_flag() {
    rpmrepo()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("rpmrepo"));
}

#[test]
fn test_completions() {
    rpmrepo()
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::contains("rpmrepo"));
}

// ============================================================================
// Validation before remote I/O
// ============================================================================

#[test]
fn test_publish_without_packages_fails_validation() {
    rpmrepo()
        .args([
            "rpm",
            "--bucket",
            "repo-bucket",
            "--aws-access-key",
            "AKIDEXAMPLE",
            "--aws-secret-key",
            "secret",
            // unroutable: reaching the network would hang or fail differently
            "--endpoint",
            "http://127.0.0.1:9",
        ])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("at least one package"));
}

#[test]
fn test_missing_credentials_fail_validation() {
    let dir = assert_fs::TempDir::new().unwrap();
    let package = dir.child("a-1.0-1.noarch.rpm");
    package.write_str("rpm").unwrap();

    rpmrepo()
        .args(["rpm", "--bucket", "repo-bucket"])
        .arg(package.path())
        .assert()
        .code(2)
        .stderr(predicate::str::contains("access key"));
}

#[test]
fn test_missing_package_file_fails_validation() {
    let dir = assert_fs::TempDir::new().unwrap();

    rpmrepo()
        .args([
            "rpm",
            "--bucket",
            "repo-bucket",
            "--aws-access-key",
            "AKIDEXAMPLE",
            "--aws-secret-key",
            "secret",
        ])
        .arg(dir.path().join("missing.rpm"))
        .assert()
        .code(2)
        .stderr(predicate::str::contains("missing.rpm"));
}

#[test]
fn test_bucket_is_required() {
    rpmrepo()
        .args(["rpm", "--rebuild"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--bucket"));
}

#[test]
fn test_unknown_visibility_rejected() {
    rpmrepo()
        .args(["rpm", "--bucket", "b", "--visibility", "world", "--rebuild"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("world"));
}

#[test]
fn test_invalid_tools_file_fails_validation() {
    let dir = assert_fs::TempDir::new().unwrap();
    let config = dir.child("rpmrepo.toml");
    config.write_str("[tools\ncreaterepo = ").unwrap();

    rpmrepo()
        .args(["rpm", "--bucket", "b", "--rebuild", "--config"])
        .arg(config.path())
        .assert()
        .code(2)
        .stderr(predicate::str::contains("invalid config file"));
}

#[test]
fn test_zero_concurrency_rejected() {
    rpmrepo()
        .args([
            "rpm",
            "--bucket",
            "b",
            "--rebuild",
            "--concurrency",
            "0",
            "--aws-access-key",
            "a",
            "--aws-secret-key",
            "s",
        ])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("concurrency"));
}
