use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::flow::IngestConfig;
use crate::ml::{FeatureCatalog, ModelConfig};
use crate::outliers::OutlierConfig;
use crate::select::SelectionConfig;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub general: GeneralConfig,

    #[serde(default)]
    pub data: IngestConfig,

    #[serde(default)]
    pub catalog: FeatureCatalog,

    #[serde(default)]
    pub scoring: ModelConfig,

    #[serde(default)]
    pub selection: SelectionConfig,

    #[serde(default)]
    pub outliers: OutlierConfig,
}

impl Config {
    /// Load configuration from file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.as_ref().display()))?;

        config
            .validate()
            .with_context(|| format!("Invalid config file: {}", path.as_ref().display()))?;

        Ok(config)
    }

    /// Load config from default locations or create default
    pub fn load_or_default() -> Result<Self> {
        let paths = [
            dirs_next::config_dir()
                .map(|p| p.join("lookout/config.toml"))
                .unwrap_or_default(),
            PathBuf::from("lookout.toml"),
        ];

        for path in &paths {
            if path.is_file() {
                return Self::load(path);
            }
        }

        Ok(Self::default())
    }

    /// Save configuration to file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(&path, content)?;
        Ok(())
    }

    /// Check every section; a deserialized catalog is re-validated too
    pub fn validate(&self) -> crate::error::Result<()> {
        FeatureCatalog::new(
            self.catalog.continuous().to_vec(),
            self.catalog.discrete().to_vec(),
        )?;
        self.scoring.validate()?;
        self.selection.validate()?;
        self.outliers.validate()?;
        Ok(())
    }

    /// Path of the trial log file
    pub fn log_path(&self) -> PathBuf {
        PathBuf::from(&self.general.log_folder).join(&self.general.log_file)
    }

    /// Folder that receives per-trial JSON reports
    pub fn report_dir(&self) -> PathBuf {
        PathBuf::from(&self.general.report_folder)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Folder for the trial log
    #[serde(default = "default_log_folder")]
    pub log_folder: String,

    #[serde(default = "default_log_file")]
    pub log_file: String,

    /// Folder for selected-plot reports
    #[serde(default = "default_report_folder")]
    pub report_folder: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_folder: default_log_folder(),
            log_file: default_log_file(),
            report_folder: default_report_folder(),
        }
    }
}

fn default_log_folder() -> String {
    "Logs".to_string()
}

fn default_log_file() -> String {
    "log.txt".to_string()
}

fn default_report_folder() -> String {
    "Reports".to_string()
}
