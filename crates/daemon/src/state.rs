use std::{fs, path::PathBuf};

use common::prelude::{DecryptingKey, DelegatingSecret, EncryptingKey, SecretKey};
use serde::{Deserialize, Serialize};

pub const APP_NAME: &str = "trove";
pub const CONFIG_FILE_NAME: &str = "config.toml";
pub const KEY_FILE_NAME: &str = "key.pem";
pub const ENCRYPTING_KEY_FILE_NAME: &str = "encrypting.pem";
pub const DELEGATING_KEY_FILE_NAME: &str = "delegating.pem";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Port for the control surface HTTP server
    #[serde(default = "default_api_port")]
    pub api_port: u16,
    /// Listen port for the peer (P2P) node (optional, defaults to ephemeral)
    #[serde(default)]
    pub peer_port: Option<u16>,
    /// Node cards (see `trove node card`) of the nodes we learn from
    #[serde(default)]
    pub teachers: Vec<String>,
    /// Policy key Enrico encrypts under when a request names none (hex)
    #[serde(default)]
    pub default_policy_key: Option<String>,
    /// Default stdout log level, `RUST_LOG` wins when set
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub timeouts: TimeoutConfig,
}

/// Network timeouts, in milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeoutConfig {
    #[serde(default = "default_request_timeout_ms")]
    pub request_ms: u64,
    #[serde(default = "default_negotiation_ceiling_ms")]
    pub negotiation_ceiling_ms: u64,
    #[serde(default = "default_retrieval_ceiling_ms")]
    pub retrieval_ceiling_ms: u64,
}

fn default_api_port() -> u16 {
    5001
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_request_timeout_ms() -> u64 {
    10_000
}

fn default_negotiation_ceiling_ms() -> u64 {
    60_000
}

fn default_retrieval_ceiling_ms() -> u64 {
    60_000
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            request_ms: default_request_timeout_ms(),
            negotiation_ceiling_ms: default_negotiation_ceiling_ms(),
            retrieval_ceiling_ms: default_retrieval_ceiling_ms(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_port: default_api_port(),
            peer_port: None,
            teachers: Vec::new(),
            default_policy_key: None,
            log_level: default_log_level(),
            timeouts: TimeoutConfig::default(),
        }
    }
}

/// Keys a node holds for all four roles.
#[derive(Debug, Clone)]
pub struct NodeKeys {
    pub signer: SecretKey,
    pub decrypting: DecryptingKey,
    pub delegating: DelegatingSecret,
}

#[derive(Debug, Clone)]
pub struct AppState {
    /// Path to the trove directory (~/.trove)
    pub trove_dir: PathBuf,
    /// Path to the node identity PEM file
    pub key_path: PathBuf,
    /// Path to Bob's decrypting key
    pub encrypting_key_path: PathBuf,
    /// Path to Alice's delegating secret
    pub delegating_key_path: PathBuf,
    /// Path to the config file
    pub config_path: PathBuf,
    /// Loaded configuration
    pub config: AppConfig,
}

impl AppState {
    /// Get the trove directory path (custom or default ~/.trove)
    pub fn trove_dir(custom_path: Option<PathBuf>) -> Result<PathBuf, StateError> {
        if let Some(path) = custom_path {
            return Ok(path);
        }

        let home = dirs::home_dir().ok_or(StateError::NoHomeDirectory)?;
        Ok(home.join(format!(".{}", APP_NAME)))
    }

    /// Initialize a new trove state directory
    pub fn init(
        custom_path: Option<PathBuf>,
        config: Option<AppConfig>,
    ) -> Result<Self, StateError> {
        let trove_dir = Self::trove_dir(custom_path)?;

        if trove_dir.exists() {
            return Err(StateError::AlreadyInitialized);
        }

        let config = config.unwrap_or_default();
        if let Some(key) = &config.default_policy_key {
            EncryptingKey::from_hex(key).map_err(|e| StateError::InvalidKey(e.to_string()))?;
        }

        fs::create_dir_all(&trove_dir)?;

        let key_path = trove_dir.join(KEY_FILE_NAME);
        fs::write(&key_path, SecretKey::generate().to_pem())?;

        let encrypting_key_path = trove_dir.join(ENCRYPTING_KEY_FILE_NAME);
        fs::write(&encrypting_key_path, DecryptingKey::generate().to_pem())?;

        let delegating_key_path = trove_dir.join(DELEGATING_KEY_FILE_NAME);
        fs::write(&delegating_key_path, DelegatingSecret::generate().to_pem())?;

        let config_path = trove_dir.join(CONFIG_FILE_NAME);
        let config_toml = toml::to_string_pretty(&config)?;
        fs::write(&config_path, config_toml)?;

        Ok(Self {
            trove_dir,
            key_path,
            encrypting_key_path,
            delegating_key_path,
            config_path,
            config,
        })
    }

    /// Load existing state from the trove directory
    pub fn load(custom_path: Option<PathBuf>) -> Result<Self, StateError> {
        let trove_dir = Self::trove_dir(custom_path)?;

        if !trove_dir.exists() {
            return Err(StateError::NotInitialized);
        }

        let key_path = trove_dir.join(KEY_FILE_NAME);
        let encrypting_key_path = trove_dir.join(ENCRYPTING_KEY_FILE_NAME);
        let delegating_key_path = trove_dir.join(DELEGATING_KEY_FILE_NAME);
        let config_path = trove_dir.join(CONFIG_FILE_NAME);

        for (path, name) in [
            (&key_path, KEY_FILE_NAME),
            (&encrypting_key_path, ENCRYPTING_KEY_FILE_NAME),
            (&delegating_key_path, DELEGATING_KEY_FILE_NAME),
            (&config_path, CONFIG_FILE_NAME),
        ] {
            if !path.exists() {
                return Err(StateError::MissingFile(name.to_string()));
            }
        }

        let config_toml = fs::read_to_string(&config_path)?;
        let config: AppConfig = toml::from_str(&config_toml)?;

        Ok(Self {
            trove_dir,
            key_path,
            encrypting_key_path,
            delegating_key_path,
            config_path,
            config,
        })
    }

    /// Load the node identity from the key file
    pub fn load_key(&self) -> Result<SecretKey, StateError> {
        let pem = fs::read_to_string(&self.key_path)?;
        let key = SecretKey::from_pem(&pem).map_err(|e| StateError::InvalidKey(e.to_string()))?;
        Ok(key)
    }

    /// Load every key the node's characters need
    pub fn load_keys(&self) -> Result<NodeKeys, StateError> {
        let signer = self.load_key()?;

        let pem = fs::read_to_string(&self.encrypting_key_path)?;
        let decrypting =
            DecryptingKey::from_pem(&pem).map_err(|e| StateError::InvalidKey(e.to_string()))?;

        let pem = fs::read_to_string(&self.delegating_key_path)?;
        let delegating =
            DelegatingSecret::from_pem(&pem).map_err(|e| StateError::InvalidKey(e.to_string()))?;

        Ok(NodeKeys {
            signer,
            decrypting,
            delegating,
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("trove directory not initialized. Run 'trove init' first")]
    NotInitialized,

    #[error("trove directory already initialized")]
    AlreadyInitialized,

    #[error("no home directory found")]
    NoHomeDirectory,

    #[error("missing required file: {0}")]
    MissingFile(String),

    #[error("invalid key: {0}")]
    InvalidKey(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML serialization error: {0}")]
    TomlSer(#[from] toml::ser::Error),

    #[error("TOML deserialization error: {0}")]
    TomlDe(#[from] toml::de::Error),
}
