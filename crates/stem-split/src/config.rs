//! Global configuration for stem-split
//!
//! Configuration is stored as YAML in the user's config directory.
//! Default location: ~/.config/stem-split/config.yaml

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::engine::EngineConfig;
use crate::logging::DEFAULT_CAPACITY;
use crate::reconcile::{StemClassifier, StemRule, DEFAULT_RULES};

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Safe root that receives one output folder per input file
    pub output_root: PathBuf,
    /// Durable log file with full diagnostic detail
    pub log_file: PathBuf,
    /// Number of lines kept in the display log
    pub display_capacity: usize,
    /// Log targets only shown at warn level or above
    pub quiet_targets: Vec<String>,
    /// Separation engine settings
    pub engine: EngineSection,
    /// Stem keyword rules, in precedence order
    pub stems: Vec<StemRule>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            output_root: default_output_root(),
            log_file: default_log_path(),
            display_capacity: DEFAULT_CAPACITY,
            quiet_targets: Vec::new(),
            engine: EngineSection::default(),
            stems: DEFAULT_RULES
                .iter()
                .map(|(k, c)| StemRule::new(*k, *c))
                .collect(),
        }
    }
}

impl Config {
    /// Validate and clamp values
    pub fn validate(&mut self) {
        self.display_capacity = self.display_capacity.max(1);
        self.engine.separation.validate();
        if self.engine.program.trim().is_empty() {
            self.engine.program = EngineSection::default().program;
        }
        if self.engine.log_level.trim().is_empty() {
            self.engine.log_level = EngineSection::default().log_level;
        }
        self.stems.retain(|rule| {
            let keep = !rule.keyword.is_empty() && !rule.canonical.is_empty();
            if !keep {
                log::warn!("Config: ignoring incomplete stem rule {:?}", rule);
            }
            keep
        });
        if self.stems.is_empty() {
            self.stems = Config::default().stems;
        }
    }

    /// Classifier built from the configured rules
    pub fn classifier(&self) -> StemClassifier {
        StemClassifier::new(self.stems.clone())
    }
}

/// Engine configuration section
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSection {
    /// Separation command line program
    pub program: String,
    /// Arguments placed before the input (e.g. `["-m", "audio_separator"]`)
    pub program_args: Vec<String>,
    /// Value passed to the engine's `--log_level`
    pub log_level: String,
    /// Model and tuning (the cache identity)
    #[serde(flatten)]
    pub separation: EngineConfig,
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            program: String::from("audio-separator"),
            program_args: Vec::new(),
            log_level: String::from("info"),
            separation: EngineConfig::default(),
        }
    }
}

/// Base directory for everything stem-split writes by default
fn data_home() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("Music")
        .join("stem-split")
}

/// Default output root: ~/Music/stem-split/output
pub fn default_output_root() -> PathBuf {
    data_home().join("output")
}

/// Default durable log file
pub fn default_log_path() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("stem-split"))
        .unwrap_or_else(data_home)
        .join("stem-split.log")
}

/// Get the default config file path
///
/// Returns: ~/.config/stem-split/config.yaml
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("stem-split")
        .join("config.yaml")
}

/// Load configuration from a YAML file
///
/// If the file doesn't exist, returns default config.
/// If the file exists but is invalid, logs a warning and returns default config.
pub fn load_config(path: &Path) -> Config {
    log::info!("load_config: Loading from {:?}", path);

    if !path.exists() {
        log::info!("load_config: Config file doesn't exist, using defaults");
        return Config::default();
    }

    match std::fs::read_to_string(path) {
        Ok(contents) => match serde_yaml::from_str::<Config>(&contents) {
            Ok(mut config) => {
                config.validate();
                log::info!(
                    "load_config: Loaded config - model: {}, output root: {:?}",
                    config.engine.separation.model,
                    config.output_root
                );
                config
            }
            Err(e) => {
                log::warn!("load_config: Failed to parse config: {}, using defaults", e);
                Config::default()
            }
        },
        Err(e) => {
            log::warn!("load_config: Failed to read config file: {}, using defaults", e);
            Config::default()
        }
    }
}

/// Save configuration to a YAML file
///
/// Creates parent directories if they don't exist.
pub fn save_config(config: &Config, path: &Path) -> Result<()> {
    log::info!("save_config: Saving to {:?}", path);

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
    }

    let yaml = serde_yaml::to_string(config).context("Failed to serialize config to YAML")?;

    std::fs::write(path, yaml)
        .with_context(|| format!("Failed to write config file: {:?}", path))?;

    log::info!("save_config: Config saved successfully");
    Ok(())
}
