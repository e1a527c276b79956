use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub const DEFAULT_IDENTIFY_ENDPOINT: &str = "http://127.0.0.1:5000/identify";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub identify_endpoint: String,
    pub last_video_directory: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            identify_endpoint: DEFAULT_IDENTIFY_ENDPOINT.to_string(),
            last_video_directory: None,
        }
    }
}

impl AppConfig {
    pub fn load() -> anyhow::Result<Self> {
        let config_path = Self::config_path();
        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path).map_err(|e| {
                anyhow::anyhow!(
                    "Failed to read config file at {}: {}",
                    config_path.display(),
                    e
                )
            })?;

            // Try to parse the config, but if it fails due to missing fields, create a new one
            match serde_json::from_str::<Self>(&content) {
                Ok(config) => {
                    log::info!("Loaded existing config from {}", config_path.display());
                    Ok(config)
                }
                Err(e) => {
                    log::warn!(
                        "Config file exists but has issues ({}), creating new one with defaults",
                        e
                    );
                    let new_config = Self::default();
                    new_config.save().map_err(|save_err| {
                        anyhow::anyhow!("Failed to save new config: {}", save_err)
                    })?;
                    log::info!("Created new config file at {}", config_path.display());
                    Ok(new_config)
                }
            }
        } else {
            log::info!("No config file found, creating default config");
            let config = Self::default();
            config
                .save()
                .map_err(|e| anyhow::anyhow!("Failed to save default config: {}", e))?;
            log::info!("Created new config file at {}", config_path.display());
            Ok(config)
        }
    }

    pub fn save(&self) -> anyhow::Result<()> {
        let config_path = Self::config_path();
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(&config_path, content)?;
        Ok(())
    }

    fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("card-scout")
            .join("config.json")
    }
}
