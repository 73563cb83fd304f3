use crate::classify::Thresholds;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use config::{Config, ConfigError, Environment, File};
use tracing::warn;

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(rename_all = "lowercase")]
pub struct Settings {
    #[serde(alias = "API")]
    pub api: ApiSettings,
    #[serde(alias = "LIVE")]
    pub live: LiveSettings,
    #[serde(alias = "CLASSIFY")]
    pub classify: Thresholds,
    #[serde(alias = "COMMUNITY")]
    pub community: CommunitySettings,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "lowercase")]
pub struct ApiSettings {
    #[serde(alias = "BASE_URL")]
    pub base_url: String,
    #[serde(alias = "TIMEOUT_SECS")]
    pub timeout_secs: u64,
    #[serde(alias = "USER_AGENT")]
    pub user_agent: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "lowercase")]
pub struct LiveSettings {
    #[serde(alias = "SENSORCOMMUNITY_INTERVAL_SECS")]
    pub sensorcommunity_interval_secs: u64,
    #[serde(alias = "NIGHTINGALE_INTERVAL_SECS")]
    pub nightingale_interval_secs: u64,
    #[serde(alias = "NIGHTINGALE_SAMPLE_SPACING_MS")]
    pub nightingale_sample_spacing_ms: u64,
    #[serde(alias = "WINDOW_CAPACITY")]
    pub window_capacity: usize,
    #[serde(alias = "POLL_TIMEOUT_SECS")]
    pub poll_timeout_secs: u64,
    #[serde(alias = "UPDATE_BUFFER")]
    pub update_buffer: usize,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "lowercase")]
pub struct CommunitySettings {
    #[serde(alias = "FEED_URL")]
    pub feed_url: String,
    #[serde(alias = "SENSOR_URL")]
    pub sensor_url: String,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080/api".to_string(),
            timeout_secs: 10,
            user_agent: "NoiseSensor/1.0".to_string(),
        }
    }
}

impl Default for LiveSettings {
    fn default() -> Self {
        Self {
            sensorcommunity_interval_secs: 60,
            nightingale_interval_secs: 1,
            nightingale_sample_spacing_ms: 5000,
            window_capacity: 60,
            poll_timeout_secs: 10,
            update_buffer: 64,
        }
    }
}

impl Default for CommunitySettings {
    fn default() -> Self {
        Self {
            feed_url: "https://data.sensor.community/static/v2/data.1h.json".to_string(),
            sensor_url: "https://data.sensor.community/airrohr/v1/sensor".to_string(),
        }
    }
}

impl LiveSettings {
    pub fn poll_timeout(&self) -> Duration {
        Duration::from_secs(self.poll_timeout_secs.max(1))
    }
}

impl Settings {
    pub fn new(config_path: Option<PathBuf>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();

        // 1. Load defaults
        let default_settings = Settings::default();
        builder = builder.add_source(config::Config::try_from(&default_settings)?);

        // 2. Load from file if specified
        if let Some(path) = config_path {
            if path.exists() {
                builder = builder.add_source(File::from(path));
            } else {
                warn!("Configuration file not found: {:?}", path);
            }
        } else if let Some(home) = dirs::home_dir() {
            let toml_path = home.join(".nightingale").join("settings.toml");
            let yaml_path = home.join(".nightingale").join("settings.yaml");

            if toml_path.exists() {
                builder = builder.add_source(File::from(toml_path));
            } else if yaml_path.exists() {
                builder = builder.add_source(File::from(yaml_path));
            }
        }

        // 3. Environment variables
        builder = builder.add_source(
            Environment::with_prefix("NIGHTINGALE")
                .separator("__")
                .try_parsing(true)
        );

        let config = builder.build()?;

        if let Ok(table) = config.clone().try_deserialize::<serde_json::Value>() {
            if let Some(map) = table.as_object() {
                let known_sections = ["api", "live", "classify", "community"];
                for key in map.keys() {
                    let lower_key = key.to_lowercase();
                    if !known_sections.contains(&lower_key.as_str()) {
                        warn!("Unknown configuration section: {}", key);
                    }
                }
            }
        }

        config.try_deserialize()
    }

    pub fn dump(&self, format: &str) -> Result<String, Box<dyn std::error::Error>> {
        match format.to_lowercase().as_str() {
            "toml" => Ok(toml::to_string_pretty(self)?),
            "yaml" | "yml" => Ok(serde_yaml::to_string(self)?),
            _ => Err("Unsupported format".into()),
        }
    }
}
