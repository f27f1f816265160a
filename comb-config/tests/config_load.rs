use comb_config::CombConfigLoader;
use serial_test::serial;
use std::{fs, path::PathBuf};
use tempfile::TempDir;

/// Helper to write a YAML file in a temp dir and return its path.
fn write_yaml(tmp: &TempDir, name: &str, yaml: &str) -> PathBuf {
    let p = tmp.path().join(name);
    fs::write(&p, yaml).expect("write yaml");
    p
}

const FILE_YAML: &str = r#"
version: "1"
browser:
  endpoint: "http://${COMB_TEST_HOST}:7701"
  profile: "reader-01"
  probe_timeout_ms: 6000
input:
  socket_url: "ws://${COMB_TEST_HOST}:8765/ws"
harvest:
  max_rounds: 120
  seed: 7
  selectors:
    item: [".comment-item", ".reply-item"]
    empty_keywords: ["No comments yet"]
diagnostics:
  capture_on_click: true
"#;

#[test]
#[serial]
fn loads_file_and_expands_placeholders() {
    let tmp = TempDir::new().unwrap();
    let p = write_yaml(&tmp, "comb.yaml", FILE_YAML);

    let config = temp_env::with_var("COMB_TEST_HOST", Some("10.1.2.3"), || {
        CombConfigLoader::new().with_file(&p).load()
    })
    .expect("load config");

    assert_eq!(config.browser.endpoint, "http://10.1.2.3:7701");
    assert_eq!(config.browser.profile, "reader-01");
    assert_eq!(config.browser.probe_timeout_ms, 6000);
    assert_eq!(config.browser.action_timeout_ms, 12_000);
    assert_eq!(config.input.socket_url.as_deref(), Some("ws://10.1.2.3:8765/ws"));
    assert_eq!(config.session_id(), "reader-01");
    assert_eq!(config.harvest.max_rounds, Some(120));
    assert_eq!(config.harvest.seed, Some(7));
    assert_eq!(
        config.harvest.selectors.item,
        Some(vec![".comment-item".to_string(), ".reply-item".to_string()])
    );
    assert!(config.diagnostics.capture_on_click);
}

#[test]
#[serial]
fn environment_overrides_file_values() {
    let tmp = TempDir::new().unwrap();
    let p = write_yaml(&tmp, "comb.yaml", FILE_YAML);

    let config = temp_env::with_vars(
        [
            ("COMB_TEST_HOST", Some("localhost")),
            ("COMB__HARVEST__MAX_ROUNDS", Some("30")),
            ("COMB__INPUT__SESSION_ID", Some("session-b")),
        ],
        || CombConfigLoader::new().with_file(&p).load(),
    )
    .expect("load config");

    assert_eq!(config.harvest.max_rounds, Some(30));
    assert_eq!(config.session_id(), "session-b");
}

#[test]
#[serial]
fn missing_optional_file_is_fine_but_required_is_not() {
    let tmp = TempDir::new().unwrap();
    let missing = tmp.path().join("absent.yaml");

    let cfg = CombConfigLoader::new()
        .with_optional_file(&missing)
        .load()
        .expect("optional file may be absent");
    assert_eq!(cfg.browser.profile, "default");

    assert!(CombConfigLoader::new().with_file(&missing).load().is_err());
}

#[test]
#[serial]
fn blank_profile_is_rejected() {
    let err = CombConfigLoader::new()
        .with_yaml_str("browser:\n  profile: '  '")
        .load()
        .unwrap_err();
    assert!(err.to_string().contains("browser.profile"));
}
