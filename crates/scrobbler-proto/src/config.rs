use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::platform;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub daemon: DaemonConfig,
    #[serde(default)]
    pub host: HostConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub connectors: ConnectorsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// JSON file holding the per-connector enabled flags.
    #[serde(default = "default_settings_file")]
    pub settings_file: PathBuf,
}

/// Socket the browser-side host shim connects to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_host_port")]
    pub port: u16,
    /// How long an injection or love call may wait for the shim's reply.
    #[serde(default = "default_call_timeout_secs")]
    pub call_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_http_enabled")]
    pub enabled: bool,
    #[serde(default = "default_http_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectorsConfig {
    /// Local TOML connector catalog. The built-in catalog is used when missing.
    #[serde(default = "default_connectors_toml")]
    pub connectors_toml: PathBuf,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            settings_file: default_settings_file(),
        }
    }
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_host_port(),
            call_timeout_secs: default_call_timeout_secs(),
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            enabled: default_http_enabled(),
            port: default_http_port(),
        }
    }
}

impl Default for ConnectorsConfig {
    fn default() -> Self {
        Self {
            connectors_toml: default_connectors_toml(),
        }
    }
}

fn default_settings_file() -> PathBuf {
    platform::data_dir().join("connectors.json")
}

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}

fn default_host_port() -> u16 {
    platform::HOST_TCP_PORT
}

fn default_call_timeout_secs() -> u64 {
    5
}

fn default_http_enabled() -> bool {
    true
}

fn default_http_port() -> u16 {
    platform::HTTP_PORT
}

fn default_connectors_toml() -> PathBuf {
    platform::config_dir().join("connectors.toml")
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        let config_path = Self::config_path();

        if !config_path.exists() {
            let config = Self::default();
            config.save()?;
            return Ok(config);
        }

        let content = std::fs::read_to_string(&config_path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn save(&self) -> anyhow::Result<()> {
        let config_path = Self::config_path();
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(&config_path, content)?;
        Ok(())
    }

    pub fn config_path() -> PathBuf {
        platform::config_dir().join("config.toml")
    }
}
