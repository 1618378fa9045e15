use async_trait::async_trait;
use dashmap::DashMap;
use std::{
    env, fs,
    net::{IpAddr, SocketAddr},
    path::PathBuf,
};
use thiserror::Error;
use tracing::{error, info};

pub const HEALTH_HOST: &str = "HEALTH_HOST";
pub const HEALTH_PORT: &str = "HEALTH_PORT";
pub const GUIDE_OUTPUT_DIR: &str = "GUIDE_OUTPUT_DIR";
pub const GUIDE_TOPIC: &str = "GUIDE_TOPIC";
pub const GUIDE_AUDIENCE_LEVEL: &str = "GUIDE_AUDIENCE_LEVEL";

pub const DEFAULT_HEALTH_HOST: &str = "0.0.0.0";
pub const DEFAULT_HEALTH_PORT: u16 = 5000;
pub const DEFAULT_OUTPUT_DIR: &str = "output";
pub const DEFAULT_AUDIENCE_LEVEL: &str = "beginner";

#[async_trait]
pub trait ConfigManagerType: Send + Sync {
    async fn keys(&self) -> Vec<String>;
    async fn get(&self, key: &str) -> Option<String>;
    async fn del(&self, key: &str);
    async fn set(&self, key: &str, value: &str) -> Result<(), String>;
    fn clone_box(&self) -> Box<dyn ConfigManagerType>;
    fn debug_box(&self) -> String;
}

pub struct ConfigManager(pub Box<dyn ConfigManagerType>);

impl ConfigManager {
    pub async fn get(&self, key: &str) -> Option<String> {
        self.0.get(key).await
    }

    /// Like `get`, but treats blank values as unset.
    pub async fn get_non_empty(&self, key: &str) -> Option<String> {
        self.0
            .get(key)
            .await
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    /// Collect the given keys into the map shape channel plugins take.
    pub async fn subset(&self, keys: &[String]) -> DashMap<String, String> {
        let map = DashMap::new();
        for key in keys {
            if let Some(value) = self.0.get(key).await {
                map.insert(key.clone(), value);
            }
        }
        map
    }
}

impl Clone for ConfigManager {
    fn clone(&self) -> Self {
        ConfigManager(self.0.clone_box())
    }
}

impl std::fmt::Debug for ConfigManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0.debug_box())
    }
}

#[derive(Clone, Debug)]
pub struct EnvConfigManager {
    env_file: PathBuf,
}

impl EnvConfigManager {
    pub fn new(env_file: PathBuf) -> Box<Self> {
        if env_file.exists() {
            match dotenvy::from_path(&env_file) {
                Ok(()) => info!("Loaded .env from {}", env_file.display()),
                Err(e) => error!("could not parse .env at {}: {e}", env_file.display()),
            }
        } else {
            info!("no .env at {}, using the process environment", env_file.display())
        }

        Box::new(Self { env_file })
    }
}

#[async_trait]
impl ConfigManagerType for EnvConfigManager {
    async fn keys(&self) -> Vec<String> {
        env::vars().map(|(k, _)| k).collect()
    }
    async fn get(&self, key: &str) -> Option<String> {
        env::var(key).ok()
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), String> {
        unsafe {
            env::set_var(key, value);
        };
        // Update .env file
        let env_path = &self.env_file;
        let content = fs::read_to_string(env_path).unwrap_or_default();
        let mut lines: Vec<String> = Vec::new();
        let mut found = false;

        for line in content.lines() {
            match line.split_once('=') {
                Some((k, _)) if k.trim() == key => {
                    lines.push(format!("{key}={value}"));
                    found = true;
                }
                _ => lines.push(line.to_string()),
            }
        }

        if !found {
            lines.push(format!("{key}={value}"));
        }

        fs::write(env_path, lines.join("\n")).map_err(|e| e.to_string())?;

        Ok(())
    }

    async fn del(&self, key: &str) {
        unsafe {
            env::remove_var(key);
        };
        let env_path = &self.env_file;
        if let Ok(content) = fs::read_to_string(env_path) {
            let lines: Vec<&str> = content
                .lines()
                .filter(|line| line.split_once('=').is_none_or(|(k, _)| k.trim() != key))
                .collect();

            let _ = fs::write(env_path, lines.join("\n"));
        }
    }

    fn clone_box(&self) -> Box<dyn ConfigManagerType> {
        Box::new(self.clone())
    }

    fn debug_box(&self) -> String {
        format!("EnvConfigManager({})", self.env_file.display())
    }
}

/// In-memory config, mostly for tests.
#[derive(Debug, Clone, Default)]
pub struct MapConfigManager {
    map: DashMap<String, String>,
}

impl MapConfigManager {
    pub fn new() -> Box<Self> {
        Box::new(Self::default())
    }

    pub fn with_entries<'a>(entries: impl IntoIterator<Item = (&'a str, &'a str)>) -> Box<Self> {
        let map = DashMap::new();
        for (k, v) in entries {
            map.insert(k.to_string(), v.to_string());
        }
        Box::new(Self { map })
    }
}

#[async_trait]
impl ConfigManagerType for MapConfigManager {
    async fn keys(&self) -> Vec<String> {
        self.map.iter().map(|entry| entry.key().clone()).collect()
    }

    async fn get(&self, key: &str) -> Option<String> {
        self.map.get(key).map(|v| v.clone())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), String> {
        self.map.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn del(&self, key: &str) {
        self.map.remove(key);
    }

    fn clone_box(&self) -> Box<dyn ConfigManagerType> {
        Box::new(self.clone())
    }
    fn debug_box(&self) -> String {
        format!("MapConfigManager({} entries)", self.map.len())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{key} must be an IP address, got `{value}`")]
    InvalidHost { key: String, value: String },
    #[error("{key} must be a port number, got `{value}`")]
    InvalidPort { key: String, value: String },
}

/// Command line values that take precedence over the environment.
#[derive(Debug, Clone, Default)]
pub struct SettingsOverrides {
    pub topic: Option<String>,
    pub audience_level: Option<String>,
    pub output_dir: Option<PathBuf>,
}

/// Process-wide settings resolved once at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppSettings {
    pub health_addr: SocketAddr,
    pub output_dir: PathBuf,
    /// Set when a guide should be generated on startup.
    pub topic: Option<String>,
    pub audience_level: String,
}

impl AppSettings {
    pub async fn resolve(config: &ConfigManager, overrides: SettingsOverrides) -> Result<Self, ConfigError> {
        let host = config
            .get_non_empty(HEALTH_HOST)
            .await
            .unwrap_or_else(|| DEFAULT_HEALTH_HOST.to_string());
        let ip: IpAddr = host.parse().map_err(|_| ConfigError::InvalidHost {
            key: HEALTH_HOST.into(),
            value: host.clone(),
        })?;

        let port = match config.get_non_empty(HEALTH_PORT).await {
            Some(raw) => raw.parse::<u16>().map_err(|_| ConfigError::InvalidPort {
                key: HEALTH_PORT.into(),
                value: raw.clone(),
            })?,
            None => DEFAULT_HEALTH_PORT,
        };

        let output_dir = match overrides.output_dir {
            Some(dir) => dir,
            None => PathBuf::from(
                config
                    .get_non_empty(GUIDE_OUTPUT_DIR)
                    .await
                    .unwrap_or_else(|| DEFAULT_OUTPUT_DIR.to_string()),
            ),
        };

        let topic = match overrides.topic {
            Some(topic) => Some(topic),
            None => config.get_non_empty(GUIDE_TOPIC).await,
        };
        let audience_level = match overrides.audience_level {
            Some(level) => level,
            None => config
                .get_non_empty(GUIDE_AUDIENCE_LEVEL)
                .await
                .unwrap_or_else(|| DEFAULT_AUDIENCE_LEVEL.to_string()),
        };

        Ok(Self {
            health_addr: SocketAddr::new(ip, port),
            output_dir,
            topic,
            audience_level,
        })
    }
}
