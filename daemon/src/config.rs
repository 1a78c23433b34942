use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use anyhow::{anyhow, Context, Result};
use std::fs;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    #[serde(default = "default_tick_interval")]
    pub tick_interval_secs: u64,
    #[serde(default = "default_settle_delay")]
    pub settle_delay_ms: u64,
    #[serde(default = "default_control_addr")]
    pub control_addr: String,
    /// Keep theme and cursor writes in memory instead of the registry.
    #[serde(default)]
    pub dry_run: bool,
}

fn default_tick_interval() -> u64 { 60 }
fn default_settle_delay() -> u64 { 500 }
fn default_control_addr() -> String { common::DEFAULT_CONTROL_ADDR.to_string() }

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            tick_interval_secs: default_tick_interval(),
            settle_delay_ms: default_settle_delay(),
            control_addr: default_control_addr(),
            dry_run: false,
        }
    }
}

impl DaemonConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.tick_interval_secs)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvidersConfig {
    #[serde(default = "default_location_url")]
    pub location_url: String,
    #[serde(default = "default_solar_url")]
    pub solar_url: String,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

fn default_location_url() -> String { "https://ipapi.co/json/".to_string() }
fn default_solar_url() -> String { "https://api.sunrise-sunset.org/json".to_string() }
fn default_timeout() -> u64 { 15 }
fn default_user_agent() -> String { format!("autotheme/{}", env!("CARGO_PKG_VERSION")) }

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            location_url: default_location_url(),
            solar_url: default_solar_url(),
            timeout_secs: default_timeout(),
            user_agent: default_user_agent(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    pub output: Option<PathBuf>,
}

fn default_log_level() -> String { "info".to_string() }

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            output: None,
        }
    }
}

impl LoggingConfig {
    pub fn level_filter(&self) -> log::LevelFilter {
        self.level.parse().unwrap_or(log::LevelFilter::Info)
    }

    /// Explicit output, then `AUTOTHEME_LOG`, then the machine-wide default.
    pub fn log_file(&self) -> PathBuf {
        if let Some(ref path) = self.output {
            return path.clone();
        }
        std::env::var_os("AUTOTHEME_LOG")
            .map(PathBuf::from)
            .unwrap_or_else(common::default_log_file)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub daemon: DaemonConfig,
    #[serde(default)]
    pub providers: ProvidersConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a YAML file
    pub fn from_yaml_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        let config: Config = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;
        Ok(config)
    }

    /// Load configuration from a TOML file
    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;
        Ok(config)
    }

    /// Detect file type by extension and load
    pub fn from_file(path: &Path) -> Result<Self> {
        let ext = path.extension()
            .and_then(|e| e.to_str())
            .unwrap_or("");

        match ext {
            "yaml" | "yml" => Self::from_yaml_file(path),
            "toml" => Self::from_toml_file(path),
            _ => Err(anyhow!("Unsupported config file format. Use .yaml, .yml, or .toml")),
        }
    }

    /// Explicit path, else the default path if present, else built-in defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(p) => Self::from_file(p)?,
            None => {
                let default_path = common::default_config_path();
                if default_path.exists() {
                    Self::from_file(&default_path)?
                } else {
                    Self::default()
                }
            }
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.daemon.tick_interval_secs == 0 {
            return Err(anyhow!("daemon.tick_interval_secs must be greater than zero"));
        }
        self.control_addr()?;
        if self.providers.timeout_secs == 0 {
            return Err(anyhow!("providers.timeout_secs must be greater than zero"));
        }
        if self.providers.location_url.trim().is_empty() {
            return Err(anyhow!("providers.location_url must not be empty"));
        }
        if self.providers.solar_url.trim().is_empty() {
            return Err(anyhow!("providers.solar_url must not be empty"));
        }
        Ok(())
    }

    pub fn control_addr(&self) -> Result<SocketAddr> {
        self.daemon.control_addr.parse()
            .with_context(|| format!("Invalid daemon.control_addr: {}", self.daemon.control_addr))
    }
}
