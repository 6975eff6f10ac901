use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::fuzzy::SearchPrecision;
use crate::input_hook::FanOutPolicy;
use crate::presentation::DEFAULT_QUEUE_CAPACITY;
use crate::save::{SaveError, Saver};

const APP_DIR_NAME: &str = "waypoint";
const CONFIG_FILE_NAME: &str = "config.toml";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("io error at '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config '{}': {message}", path.display())]
    Parse { path: PathBuf, message: String },
    #[error("config serialize failed: {0}")]
    Serialize(String),
    #[error("{0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub search_precision: SearchPrecision,
    pub max_results: u16,
    pub provider_dirs: Vec<PathBuf>,
    pub presentation_queue_capacity: usize,
    pub keyboard_fan_out: FanOutPolicy,
    pub language: String,
    pub history_db_path: PathBuf,
    pub log_filter: String,
    pub translations: HashMap<String, String>,
    #[serde(skip)]
    pub config_path: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        let base = stable_app_data_dir();
        Self {
            search_precision: SearchPrecision::Regular,
            max_results: 20,
            provider_dirs: vec![base.join("providers")],
            presentation_queue_capacity: DEFAULT_QUEUE_CAPACITY,
            keyboard_fan_out: FanOutPolicy::AllMustAllow,
            language: "en".to_string(),
            history_db_path: base.join("history.sqlite3"),
            log_filter: "info".to_string(),
            translations: HashMap::new(),
            config_path: base.join(CONFIG_FILE_NAME),
        }
    }
}

pub fn stable_app_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(APP_DIR_NAME)
}

pub fn default_config_path() -> PathBuf {
    stable_app_data_dir().join(CONFIG_FILE_NAME)
}

pub fn validate(cfg: &Config) -> Result<(), ConfigError> {
    if !(5..=100).contains(&cfg.max_results) {
        return Err(ConfigError::Invalid("max_results out of range".into()));
    }

    if !(1..=4096).contains(&cfg.presentation_queue_capacity) {
        return Err(ConfigError::Invalid(
            "presentation_queue_capacity out of range".into(),
        ));
    }

    if cfg.history_db_path.as_os_str().is_empty() {
        return Err(ConfigError::Invalid("history_db_path is required".into()));
    }

    if cfg.language.trim().is_empty() {
        return Err(ConfigError::Invalid("language is required".into()));
    }

    Ok(())
}

pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = path.map(Path::to_path_buf).unwrap_or_else(default_config_path);
    let mut config = match std::fs::read_to_string(&path) {
        Ok(raw) => toml::from_str::<Config>(&raw).map_err(|error| ConfigError::Parse {
            path: path.clone(),
            message: error.to_string(),
        })?,
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => Config::default(),
        Err(source) => return Err(ConfigError::Io { path, source }),
    };
    config.config_path = path;
    validate(&config)?;
    Ok(config)
}

pub fn save(cfg: &Config) -> Result<(), ConfigError> {
    validate(cfg)?;
    let raw = toml::to_string_pretty(cfg).map_err(|e| ConfigError::Serialize(e.to_string()))?;
    if let Some(parent) = cfg.config_path.parent() {
        std::fs::create_dir_all(parent).map_err(|source| ConfigError::Io {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    std::fs::write(&cfg.config_path, raw).map_err(|source| ConfigError::Io {
        path: cfg.config_path.clone(),
        source,
    })
}

pub type SharedConfig = Arc<RwLock<Config>>;

pub fn shared(config: Config) -> SharedConfig {
    Arc::new(RwLock::new(config))
}

pub struct SettingsSaver {
    config: SharedConfig,
}

impl SettingsSaver {
    pub fn new(config: SharedConfig) -> Self {
        Self { config }
    }
}

impl Saver for SettingsSaver {
    fn save(&self) -> Result<(), SaveError> {
        let current = self.config.read().clone();
        save(&current).map_err(|e| SaveError::Failed(e.to_string()))
    }
}
