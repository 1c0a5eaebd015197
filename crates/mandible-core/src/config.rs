//! Service configuration.
//!
//! Configuration is a JSON file pointed at by `MANDIBLE_CONF`; the `PORT`
//! environment variable overrides the listen port. Misconfiguration is fatal
//! at startup: the loader returns an error and the binary exits.

use std::env;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::AppError;

pub const CONF_ENV: &str = "MANDIBLE_CONF";
pub const PORT_ENV: &str = "PORT";

const DEFAULT_PORT: u16 = 8080;
const DEFAULT_HASH_LENGTH: usize = 7;
const DEFAULT_MAX_FILE_SIZE: u64 = 10 * 1024 * 1024;
const DEFAULT_LABEL_TOP_N: usize = 5;

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_hash_length() -> usize {
    DEFAULT_HASH_LENGTH
}

fn default_max_file_size() -> u64 {
    DEFAULT_MAX_FILE_SIZE
}

fn default_user_agent() -> String {
    format!("Mandible/{}", env!("CARGO_PKG_VERSION"))
}

fn default_dictionary_path() -> PathBuf {
    PathBuf::from("/usr/share/dict/words")
}

fn default_label_top_n() -> usize {
    DEFAULT_LABEL_TOP_N
}

/// One configured store backend.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StoreConfig {
    Local {
        store_root: String,
        #[serde(default)]
        name_path_map: Option<String>,
        #[serde(default)]
        name_path_regex: Option<String>,
    },
    S3 {
        bucket: String,
        region: String,
        #[serde(default)]
        store_root: String,
        #[serde(default)]
        name_path_map: Option<String>,
        #[serde(default)]
        name_path_regex: Option<String>,
    },
    Gcs {
        bucket: String,
        /// Path to the service-account JSON key used for the JWT flow.
        key_file: String,
        #[serde(default)]
        store_root: String,
        #[serde(default)]
        name_path_map: Option<String>,
        #[serde(default)]
        name_path_regex: Option<String>,
    },
    Selectel {
        #[serde(default = "default_selectel_auth_url")]
        auth_url: String,
        user: String,
        key: String,
        container: String,
        #[serde(default)]
        store_root: String,
        #[serde(default)]
        name_path_map: Option<String>,
        #[serde(default)]
        name_path_regex: Option<String>,
    },
    Memory,
}

fn default_selectel_auth_url() -> String {
    "https://auth.selcdn.ru".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "default_port")]
    pub port: u16,
    /// Uploads above this size go through the lossy scaling stage.
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,
    #[serde(default = "default_hash_length")]
    pub hash_length: usize,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    pub stores: Vec<StoreConfig>,
    #[serde(default)]
    pub ocr_enabled: bool,
    /// Newline-delimited wordlist backing the OCR token filter.
    #[serde(default = "default_dictionary_path")]
    pub dictionary_path: PathBuf,
    #[serde(default)]
    pub labeling_enabled: bool,
    #[serde(default = "default_label_top_n")]
    pub label_top_n: usize,
    /// Shared secret for the HMAC authenticator. When unset, the
    /// `/user/{user_id}/...` routes reject every request.
    #[serde(default)]
    pub auth_hmac_key: Option<String>,
}

impl Config {
    /// Load the file named by `MANDIBLE_CONF`, then apply `PORT`.
    pub fn load() -> Result<Config, AppError> {
        let path = env::var(CONF_ENV)
            .map_err(|_| AppError::Internal(format!("{} is not set", CONF_ENV)))?;
        Config::from_file(Path::new(&path))
    }

    pub fn from_file(path: &Path) -> Result<Config, AppError> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            AppError::Internal(format!("opening config file {}: {}", path.display(), e))
        })?;
        let mut config: Config = serde_json::from_str(&raw).map_err(|e| {
            AppError::Internal(format!("loading config file {}: {}", path.display(), e))
        })?;
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    fn apply_env(&mut self) {
        if let Ok(port) = env::var(PORT_ENV) {
            if let Ok(port) = port.parse() {
                self.port = port;
            }
        }
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if self.stores.is_empty() {
            return Err(AppError::Internal(
                "at least one store must be configured".to_string(),
            ));
        }
        if self.hash_length == 0 {
            return Err(AppError::Internal("hash_length must be positive".to_string()));
        }
        Ok(())
    }

    /// A minimal in-memory configuration used by tests.
    pub fn test_default() -> Config {
        Config {
            port: 0,
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            hash_length: DEFAULT_HASH_LENGTH,
            user_agent: default_user_agent(),
            stores: vec![StoreConfig::Memory],
            ocr_enabled: false,
            dictionary_path: default_dictionary_path(),
            labeling_enabled: false,
            label_top_n: DEFAULT_LABEL_TOP_N,
            auth_hmac_key: None,
        }
    }
}
