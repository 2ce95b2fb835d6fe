//! Integration tests for configuration loading and validation.

use wechat_robot::config::{Config, RunMode};

fn write_config(ext: &str, content: &str) -> std::path::PathBuf {
    let dir = std::env::temp_dir().join(format!("wechat-robot-it-{}", uuid::Uuid::new_v4()));
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join(format!("config.{ext}"));
    std::fs::write(&path, content).unwrap();
    path
}

fn cleanup(path: &std::path::Path) {
    if let Some(dir) = path.parent() {
        let _ = std::fs::remove_dir_all(dir);
    }
}

#[test]
fn test_load_full_config_file() {
    let path = write_config(
        "yaml",
        r#"
app:
  port: 8088
  mode: test
  log_dir: /var/log/wechat-robot
  backend_timeout_secs: 2
wechat:
  token: my-token
  appId: wx0001
  appSecret: topsecret
"#,
    );
    let config = Config::load(path.to_str().unwrap()).unwrap();
    assert_eq!(config.app.port, 8088);
    assert_eq!(config.app.mode, RunMode::Test);
    assert_eq!(config.app.log_dir.as_deref(), Some("/var/log/wechat-robot"));
    assert_eq!(config.app.backend_timeout_secs, 2);
    assert_eq!(config.wechat.token, "my-token");
    assert_eq!(config.wechat.app_id, "wx0001");
    assert_eq!(config.wechat.app_secret, "topsecret");
    cleanup(&path);
}

#[test]
fn test_uppercase_extension_accepted() {
    let path = write_config("YML", "wechat:\n  token: tok\n");
    let config = Config::load(path.to_str().unwrap()).unwrap();
    assert_eq!(config.wechat.token, "tok");
    cleanup(&path);
}

#[test]
fn test_json_extension_rejected() {
    let path = write_config("json", "{\"wechat\": {\"token\": \"tok\"}}");
    let err = Config::load(path.to_str().unwrap()).unwrap_err();
    assert!(err.to_string().contains("only supports .yml or .yaml"));
    cleanup(&path);
}

#[test]
fn test_whitespace_path_rejected() {
    let err = Config::load("   ").unwrap_err();
    assert!(err.to_string().contains("config file not specified"));
}

#[test]
fn test_missing_token_rejected_from_file() {
    let path = write_config("yml", "app:\n  port: 8080\nwechat:\n  app_id: wx\n");
    let err = Config::load(path.to_str().unwrap()).unwrap_err();
    assert!(err.to_string().contains("Failed to parse"));
    cleanup(&path);
}

#[test]
fn test_values_are_trimmed() {
    let config = Config::from_yaml_str("wechat:\n  token: '  tok  '\n  app_id: ' wx '\n").unwrap();
    assert_eq!(config.wechat.token, "tok");
    assert_eq!(config.wechat.app_id, "wx");
}
