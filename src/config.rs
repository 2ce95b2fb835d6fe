use crate::error::RobotError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::Level;

fn default_port() -> u16 {
    8080
}
fn default_mode() -> RunMode {
    RunMode::Debug
}
fn default_backend_timeout_secs() -> u64 {
    4
}
fn default_app_config() -> AppConfig {
    AppConfig {
        port: default_port(),
        mode: default_mode(),
        log_dir: None,
        backend_timeout_secs: default_backend_timeout_secs(),
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    Debug,
    Release,
    Test,
}

impl RunMode {
    /// Default log level when `RUST_LOG` does not say otherwise.
    pub fn default_log_level(self) -> Level {
        match self {
            RunMode::Debug => Level::DEBUG,
            RunMode::Release => Level::INFO,
            RunMode::Test => Level::WARN,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_mode")]
    pub mode: RunMode,
    #[serde(default)]
    pub log_dir: Option<String>,
    #[serde(default = "default_backend_timeout_secs")]
    pub backend_timeout_secs: u64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WechatConfig {
    pub token: String,
    #[serde(default, alias = "appId")]
    pub app_id: String,
    #[serde(default, alias = "appSecret")]
    pub app_secret: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_app_config")]
    pub app: AppConfig,
    pub wechat: WechatConfig,
}

impl Config {
    /// Load config from a `.yml`/`.yaml` file.
    pub fn load(path: &str) -> Result<Self, RobotError> {
        let path = path.trim();
        if path.is_empty() {
            return Err(RobotError::Config("config file not specified".into()));
        }
        let is_yaml = Path::new(path)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.eq_ignore_ascii_case("yml") || ext.eq_ignore_ascii_case("yaml"))
            .unwrap_or(false);
        if !is_yaml {
            return Err(RobotError::Config(format!(
                "config file only supports .yml or .yaml format: {path}"
            )));
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| RobotError::Config(format!("Failed to read {path}: {e}")))?;
        Self::from_yaml_str(&content)
            .map_err(|e| RobotError::Config(format!("Failed to parse {path}: {e}")))
    }

    pub fn from_yaml_str(content: &str) -> Result<Self, RobotError> {
        let mut config: Config =
            serde_yaml::from_str(content).map_err(|e| RobotError::Config(e.to_string()))?;
        config.post_deserialize()?;
        Ok(config)
    }

    /// Apply post-deserialization normalization and validation.
    pub(crate) fn post_deserialize(&mut self) -> Result<(), RobotError> {
        self.wechat.token = self.wechat.token.trim().to_string();
        self.wechat.app_id = self.wechat.app_id.trim().to_string();
        self.wechat.app_secret = self.wechat.app_secret.trim().to_string();
        if self.wechat.token.is_empty() {
            return Err(RobotError::Config("wechat.token is required".into()));
        }

        if self.app.port == 0 {
            self.app.port = default_port();
        }
        if self.app.backend_timeout_secs == 0 {
            self.app.backend_timeout_secs = default_backend_timeout_secs();
        }
        if let Some(ref dir) = self.app.log_dir {
            if dir.trim().is_empty() {
                self.app.log_dir = None;
            }
        }
        Ok(())
    }

    pub fn listen_addr(&self) -> String {
        format!("0.0.0.0:{}", self.app.port)
    }
}
