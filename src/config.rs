use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use directories::BaseDirs;
use serde::{Deserialize, Serialize};

use crate::error::PrepError;

pub const LOCAL_CONFIG_FILE: &str = "sra-prep.json";

/// On-disk configuration. Unknown keys are ignored so submission configs
/// carrying extra sections (upload credentials, XML settings) still load.
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub schema_version: Option<u32>,
    #[serde(default)]
    pub default_values: BTreeMap<String, String>,
    #[serde(default)]
    pub instrument_models: Vec<String>,
    #[serde(default)]
    pub sequence_dir: Option<PathBuf>,
    #[serde(default)]
    pub contact: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ResolvedConfig {
    pub schema_version: u32,
    pub default_values: BTreeMap<String, String>,
    pub instrument_models: Vec<String>,
    pub sequence_dir: Option<PathBuf>,
    pub contact: BTreeMap<String, String>,
    /// Where the configuration came from; `None` for built-in defaults.
    pub source: Option<PathBuf>,
}

pub struct ConfigLoader;

impl ConfigLoader {
    pub fn resolve(path: Option<&Path>) -> Result<ResolvedConfig, PrepError> {
        let candidate = match path {
            Some(path) => Some(path.to_path_buf()),
            None => Self::discover(),
        };
        let Some(config_path) = candidate else {
            tracing::debug!("no config file found; using built-in defaults");
            return Ok(ResolvedConfig {
                schema_version: 1,
                ..ResolvedConfig::default()
            });
        };

        let content = fs::read_to_string(&config_path)
            .map_err(|_| PrepError::ConfigRead(config_path.clone()))?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|err| PrepError::ConfigParse(format!("{}: {err}", config_path.display())))?;
        tracing::info!(path = %config_path.display(), "loaded config");

        let mut resolved = Self::resolve_config(config);
        resolved.source = Some(config_path);
        Ok(resolved)
    }

    pub fn resolve_config(config: Config) -> ResolvedConfig {
        let instrument_models = config
            .instrument_models
            .into_iter()
            .map(|model| model.trim().to_string())
            .filter(|model| !model.is_empty())
            .collect();
        let default_values = config
            .default_values
            .into_iter()
            .map(|(column, value)| (column.trim().to_string(), value.trim().to_string()))
            .filter(|(column, value)| !column.is_empty() && !value.is_empty())
            .collect();

        ResolvedConfig {
            schema_version: config.schema_version.unwrap_or(1),
            default_values,
            instrument_models,
            sequence_dir: config.sequence_dir,
            contact: config.contact,
            source: None,
        }
    }

    fn discover() -> Option<PathBuf> {
        let local = PathBuf::from(LOCAL_CONFIG_FILE);
        if local.is_file() {
            return Some(local);
        }
        BaseDirs::new()
            .map(|dirs| dirs.config_dir().join("sra-prep").join("config.json"))
            .filter(|path| path.is_file())
    }
}
