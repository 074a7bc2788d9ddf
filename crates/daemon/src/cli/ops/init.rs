use clap::Args;

use trove_daemon::state::{AppConfig, AppState, TimeoutConfig};

#[derive(Args, Debug, Clone)]
pub struct Init {
    /// Control surface port
    #[arg(long, default_value_t = 5001)]
    pub api_port: u16,

    /// Peer (P2P) node listen port (optional, defaults to ephemeral port if not specified)
    #[arg(long)]
    pub peer_port: Option<u16>,

    /// Node card of a teacher node, repeat for several
    #[arg(long = "teacher")]
    pub teachers: Vec<String>,

    /// Policy key Enrico uses when a request names none (hex)
    #[arg(long)]
    pub default_policy_key: Option<String>,

    /// Default log level
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

#[derive(Debug, thiserror::Error)]
pub enum InitError {
    #[error("init failed: {0}")]
    StateFailed(#[from] trove_daemon::state::StateError),
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Init {
    type Error = InitError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let config = AppConfig {
            api_port: self.api_port,
            peer_port: self.peer_port,
            teachers: self.teachers.clone(),
            default_policy_key: self.default_policy_key.clone(),
            log_level: self.log_level.clone(),
            timeouts: TimeoutConfig::default(),
        };

        let state = AppState::init(ctx.config_path.clone(), Some(config))?;

        let peer_port_str = match state.config.peer_port {
            Some(port) => format!("{}", port),
            None => "ephemeral (auto-assigned)".to_string(),
        };

        let output = format!(
            "Initialized trove directory at: {}\n\
             - Key: {}\n\
             - Encrypting key: {}\n\
             - Delegating secret: {}\n\
             - Config: {}\n\
             - API port: {}\n\
             - Peer port: {}\n\
             - Teachers: {}",
            state.trove_dir.display(),
            state.key_path.display(),
            state.encrypting_key_path.display(),
            state.delegating_key_path.display(),
            state.config_path.display(),
            state.config.api_port,
            peer_port_str,
            state.config.teachers.len()
        );

        Ok(output)
    }
}
