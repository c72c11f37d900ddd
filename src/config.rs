use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;

pub const BACKEND_URL_ENV: &str = "OLYMPIAD_BACKEND_URL";
pub const CONFIG_PATH_ENV: &str = "OLYMPIAD_CONFIG";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    pub backend: BackendConfig,
    pub storage: StorageConfig,
    pub logs: LogsConfig,
    #[serde(default)]
    pub routes: RoutesConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogsConfig {
    pub path: String,
}

/// Where the session sends the user after signing in or out.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutesConfig {
    pub authenticated_landing: String,
    pub public_landing: String,
}

impl Default for RoutesConfig {
    fn default() -> Self {
        Self {
            authenticated_landing: "/dashboard".to_string(),
            public_landing: "/".to_string(),
        }
    }
}

impl ClientConfig {
    pub fn load(path: &str) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path))?;

        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        let mut config: ClientConfig =
            serde_json::from_str(content).with_context(|| "Failed to parse config file")?;

        if let Ok(url) = std::env::var(BACKEND_URL_ENV) {
            if !url.trim().is_empty() {
                config.backend.url = url;
            }
        }
        config.backend.url = config.backend.url.trim_end_matches('/').to_string();

        if config.backend.url.is_empty() {
            anyhow::bail!("backend.url must not be empty");
        }

        Ok(config)
    }
}

pub fn template() -> ClientConfig {
    ClientConfig {
        backend: BackendConfig {
            url: "http://localhost:1337".to_string(),
        },
        storage: StorageConfig {
            path: "session.db".to_string(),
        },
        logs: LogsConfig {
            path: "logs".to_string(),
        },
        routes: RoutesConfig::default(),
    }
}

pub fn create_config_template() -> Result<()> {
    let json = serde_json::to_string_pretty(&template())?;
    fs::write("config.json", json)?;

    Ok(())
}
