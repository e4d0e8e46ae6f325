//! CLI contract tests.

use assert_cmd::Command;

fn execbroker() -> Command {
    Command::cargo_bin("execbroker").expect("binary built")
}

#[test]
fn help_lists_subcommands() {
    let assert = execbroker().arg("--help").assert().success();
    let stdout = String::from_utf8_lossy(&assert.get_output().stdout).into_owned();
    assert!(stdout.contains("serve"));
    assert!(stdout.contains("check-config"));
}

#[test]
fn check_config_succeeds_with_default_configuration() {
    execbroker()
        .env_remove("EXECBROKER_TASK_TIMEOUT_SECS")
        .env_remove("EXECBROKER_CONCURRENCY")
        .env("EXECBROKER_CONFIG_PATH", "/nonexistent/execbroker-test-config.toml")
        .arg("check-config")
        .assert()
        .success();
}

#[test]
fn check_config_fails_on_invalid_timeout() {
    execbroker()
        .env("EXECBROKER_CONFIG_PATH", "/nonexistent/execbroker-test-config.toml")
        .env("EXECBROKER_TASK_TIMEOUT_SECS", "0")
        .arg("check-config")
        .assert()
        .failure();
}

#[test]
fn check_config_fails_on_zero_concurrency() {
    execbroker()
        .env("EXECBROKER_CONFIG_PATH", "/nonexistent/execbroker-test-config.toml")
        .env("EXECBROKER_CONCURRENCY", "0")
        .arg("check-config")
        .assert()
        .failure();
}
