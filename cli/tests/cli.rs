//! Argument surface and startup errors of the `hut` binary.

use assert_cmd::Command;
use tempfile::TempDir;

fn hut(config_dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("hut").unwrap();
    cmd.env("HUT_CONFIG", config_dir.path().join("config.json"))
        .env_remove("HUT_TOKEN")
        .env_remove("HUT_INSTANCE")
        .env_remove("RUST_LOG");
    cmd
}

#[test]
fn test_version_is_json_when_piped() {
    let config_dir = TempDir::new().unwrap();
    let output = hut(&config_dir).arg("version").output().unwrap();
    assert!(output.status.success());

    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(value["version"], env!("CARGO_PKG_VERSION"));
    let config = config_dir.path().join("config.json");
    assert_eq!(value["config"], config.to_str().unwrap());
}

#[test]
fn test_export_requires_directory() {
    let config_dir = TempDir::new().unwrap();
    hut(&config_dir).arg("export").assert().failure().code(2);
}

#[test]
fn test_unknown_service_is_rejected() {
    let config_dir = TempDir::new().unwrap();
    hut(&config_dir)
        .args(["export", "out", "--service", "bitbucket"])
        .assert()
        .failure()
        .code(2);
}

#[test]
fn test_export_without_credentials_is_a_config_error() {
    let config_dir = TempDir::new().unwrap();
    let out = config_dir.path().join("out");
    let output = hut(&config_dir)
        .args(["export", out.to_str().unwrap()])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(7));

    let error: serde_json::Value = serde_json::from_slice(&output.stderr).unwrap();
    assert_eq!(error["error"]["code"], "CONFIG_ERROR");
    assert!(!out.exists());
}

#[test]
fn test_unknown_instance() {
    let config_dir = TempDir::new().unwrap();
    std::fs::write(
        config_dir.path().join("config.json"),
        r#"{"instances": [{"name": "sr.ht", "access_token": "t"}]}"#,
    )
    .unwrap();
    hut(&config_dir)
        .args(["--instance", "example.org", "import", config_dir.path().to_str().unwrap()])
        .assert()
        .failure()
        .code(3);
}

#[test]
fn test_import_missing_directory() {
    let config_dir = TempDir::new().unwrap();
    let missing = config_dir.path().join("missing");
    hut(&config_dir)
        .env("HUT_TOKEN", "t")
        .args(["import", missing.to_str().unwrap()])
        .assert()
        .failure()
        .code(4);
}
