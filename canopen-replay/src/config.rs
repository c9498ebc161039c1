use std::fs;
use std::path::{Path, PathBuf};

use log::{info, warn};
use serde::{Deserialize, Serialize};

/// One dictionary binding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeBinding {
    pub channel: u32,
    pub node: u8,
    pub eds_file: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdapterConfig {
    pub name: String,
    pub bus: String,
    pub bitrate: u32,
    /// 0 captures until the bus goes silent.
    pub frame_limit: usize,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            name: "socketcan".to_string(),
            bus: "can0".to_string(),
            bitrate: 500_000,
            frame_limit: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub nodes: Vec<NodeBinding>,
    pub adapter: AdapterConfig,
    pub export_csv: bool,
    pub export_directory: Option<PathBuf>,
    pub log_level: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            nodes: Vec::new(),
            adapter: AdapterConfig::default(),
            export_csv: false,
            export_directory: None,
            log_level: "info".to_string(),
        }
    }
}

impl AppConfig {
    /// Get the path to the config file
    pub fn config_file_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "canopen", "canopen-replay")
            .map(|proj_dirs| proj_dirs.config_dir().join("config.toml"))
    }

    /// Load configuration from `path` or the default location. Falls back to
    /// defaults when the file is missing or broken.
    pub fn load(path: Option<&Path>) -> Self {
        let Some(config_path) = path.map(Path::to_path_buf).or_else(Self::config_file_path) else {
            return Self::default();
        };
        if !config_path.exists() {
            info!("No configuration at {}, using defaults", config_path.display());
            return Self::default();
        }

        match fs::read_to_string(&config_path) {
            Ok(contents) => match toml::from_str(&contents) {
                Ok(config) => {
                    info!("Loaded configuration from {}", config_path.display());
                    return config;
                }
                Err(e) => warn!("Failed to parse {}: {}", config_path.display(), e),
            },
            Err(e) => warn!("Failed to read {}: {}", config_path.display(), e),
        }

        info!("Using default configuration");
        Self::default()
    }

    /// Save configuration to `path` or the default location
    pub fn save(&self, path: Option<&Path>) -> Result<PathBuf, Box<dyn std::error::Error>> {
        let config_path = path
            .map(Path::to_path_buf)
            .or_else(Self::config_file_path)
            .ok_or("Could not determine config file path")?;
        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let toml_string = toml::to_string_pretty(self)?;
        fs::write(&config_path, toml_string)?;
        info!("Saved configuration to {}", config_path.display());
        Ok(config_path)
    }

    /// Get the default export directory path
    pub fn default_export_directory() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "canopen", "canopen-replay")
            .map(|proj_dirs| proj_dirs.data_local_dir().join("exports"))
    }

    /// Export directory, using the default if not set
    pub fn export_directory(&self) -> Option<PathBuf> {
        self.export_directory.clone().or_else(Self::default_export_directory)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: AppConfig = toml::from_str(
            r#"
            export_csv = true

            [[nodes]]
            channel = 1
            node = 5
            eds_file = "drive.eds"

            [adapter]
            bus = "vcan0"
            "#,
        )
        .unwrap();
        assert!(config.export_csv);
        assert_eq!(config.log_level, "info");
        assert_eq!(config.adapter.name, "socketcan");
        assert_eq!(config.adapter.bus, "vcan0");
        assert_eq!(
            config.nodes,
            vec![NodeBinding {
                channel: 1,
                node: 5,
                eds_file: PathBuf::from("drive.eds"),
            }]
        );
    }

    #[test]
    fn test_save_and_load() {
        let path = std::env::temp_dir().join(format!("canopen-replay-{}-config.toml", std::process::id()));
        let mut config = AppConfig::default();
        config.log_level = "debug".to_string();
        config.adapter.frame_limit = 100;
        config.save(Some(path.as_path())).unwrap();

        assert_eq!(AppConfig::load(Some(path.as_path())), config);
        fs::remove_file(path).unwrap();
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let config = AppConfig::load(Some(Path::new("/nonexistent/canopen-replay.toml")));
        assert_eq!(config, AppConfig::default());
    }
}
