use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use common::peer::NodeMetadata;
use common::policy::NegotiationConfig;
use common::prelude::{EncryptingKey, SecretKey};
use common::retrieval::RetrievalConfig;

use crate::state::{AppState, NodeKeys, StateError, TimeoutConfig};

#[derive(Debug)]
pub struct Config {
    // peer configuration
    /// address for our node to listen on,
    ///  if not set then an ephemeral port will be used
    pub node_listen_addr: Option<SocketAddr>,
    /// identity and character keys,
    ///  if not set then fresh ones will be generated
    pub keys: Option<NodeKeys>,
    /// nodes asked about nodes we have not met
    pub teachers: Vec<NodeMetadata>,

    // characters
    pub default_policy_key: Option<EncryptingKey>,
    pub negotiation: NegotiationConfig,
    pub retrieval: RetrievalConfig,

    // http server configuration
    /// Port for the control surface HTTP server.
    pub api_port: u16,

    // logging
    pub log_level: tracing::Level,
    /// Directory for log files (optional, logs to stdout only if not set)
    pub log_dir: Option<PathBuf>,
}

impl Config {
    /// Node configuration from an initialized trove directory.
    pub fn from_app_state(state: &AppState) -> Result<Self, ConfigError> {
        let keys = state.load_keys()?;

        let teachers = state
            .config
            .teachers
            .iter()
            .map(|card| {
                NodeMetadata::from_base64(card).map_err(|e| ConfigError::Teacher(e.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let default_policy_key = state
            .config
            .default_policy_key
            .as_deref()
            .map(EncryptingKey::from_hex)
            .transpose()
            .map_err(|e| ConfigError::PolicyKey(e.to_string()))?;

        let log_level = state
            .config
            .log_level
            .parse()
            .map_err(|_| ConfigError::LogLevel(state.config.log_level.clone()))?;

        let (negotiation, retrieval) = timeouts(&state.config.timeouts);

        Ok(Self {
            node_listen_addr: state
                .config
                .peer_port
                .map(|port| SocketAddr::from(([0, 0, 0, 0], port))),
            keys: Some(keys),
            teachers,
            default_policy_key,
            negotiation,
            retrieval,
            api_port: state.config.api_port,
            log_level,
            log_dir: None,
        })
    }

    pub fn node_secret(&self) -> Option<&SecretKey> {
        self.keys.as_ref().map(|keys| &keys.signer)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            node_listen_addr: None,
            keys: None,
            teachers: Vec::new(),
            default_policy_key: None,
            negotiation: NegotiationConfig::default(),
            retrieval: RetrievalConfig::default(),
            api_port: 5001,
            log_level: tracing::Level::INFO,
            log_dir: None,
        }
    }
}

fn timeouts(config: &TimeoutConfig) -> (NegotiationConfig, RetrievalConfig) {
    let request_timeout = Duration::from_millis(config.request_ms);
    (
        NegotiationConfig {
            request_timeout,
            ceiling: Duration::from_millis(config.negotiation_ceiling_ms),
            ..NegotiationConfig::default()
        },
        RetrievalConfig {
            request_timeout,
            ceiling: Duration::from_millis(config.retrieval_ceiling_ms),
            ..RetrievalConfig::default()
        },
    )
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("state error: {0}")]
    State(#[from] StateError),
    #[error("invalid teacher card: {0}")]
    Teacher(String),
    #[error("invalid default policy key: {0}")]
    PolicyKey(String),
    #[error("invalid log level: {0}")]
    LogLevel(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::AppConfig;

    #[test]
    fn test_from_app_state() {
        let dir = tempfile::tempdir().unwrap();
        let teacher = SecretKey::generate();
        let card = NodeMetadata::new(&teacher, vec!["127.0.0.1:7000".parse().unwrap()], None)
            .to_base64();
        let app_config = AppConfig {
            peer_port: Some(7001),
            teachers: vec![card],
            log_level: "debug".to_string(),
            timeouts: TimeoutConfig {
                request_ms: 250,
                ..TimeoutConfig::default()
            },
            ..AppConfig::default()
        };
        let state = AppState::init(Some(dir.path().join("trove")), Some(app_config)).unwrap();

        let config = Config::from_app_state(&state).unwrap();
        assert_eq!(config.teachers.len(), 1);
        assert_eq!(config.teachers[0].node(), &teacher.public());
        assert_eq!(config.node_listen_addr.unwrap().port(), 7001);
        assert_eq!(config.log_level, tracing::Level::DEBUG);
        assert_eq!(config.negotiation.request_timeout, Duration::from_millis(250));
        assert_eq!(config.retrieval.request_timeout, Duration::from_millis(250));
        assert!(config.node_secret().is_some());
    }

    #[test]
    fn test_bad_teacher_card() {
        let dir = tempfile::tempdir().unwrap();
        let app_config = AppConfig {
            teachers: vec!["garbage".to_string()],
            ..AppConfig::default()
        };
        let state = AppState::init(Some(dir.path().join("trove")), Some(app_config)).unwrap();
        assert!(matches!(
            Config::from_app_state(&state),
            Err(ConfigError::Teacher(_))
        ));
    }
}
