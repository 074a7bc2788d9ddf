use base64::Engine;
use clap::{Args, Subcommand};

use trove_daemon::http_server::api::client::ApiError;
use trove_daemon::http_server::api::v0::enrico::EncryptMessageRequest;

use crate::cli::op::{Op, OpContext};

crate::command_enum! {
    (Encrypt, Encrypt),
}

pub type EnricoCommand = Command;

/// Encrypt messages under a policy key as this node's Enrico
#[derive(Args, Debug, Clone)]
pub struct Enrico {
    #[command(subcommand)]
    pub command: EnricoCommand,
}

#[async_trait::async_trait]
impl Op for Enrico {
    type Error = OpError;
    type Output = OpOutput;

    async fn execute(&self, ctx: &OpContext) -> Result<Self::Output, Self::Error> {
        self.command.execute(ctx).await
    }
}

#[derive(Args, Debug, Clone)]
pub struct Encrypt {
    /// Text to encrypt
    #[arg(long)]
    pub message: String,
    /// Policy encrypting key (hex), the node's default when left out
    #[arg(long)]
    pub policy_encrypting_key: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum EnricoError {
    #[error("API error: {0}")]
    Api(#[from] ApiError),
}

#[async_trait::async_trait]
impl Op for Encrypt {
    type Error = EnricoError;
    type Output = String;

    async fn execute(&self, ctx: &OpContext) -> Result<Self::Output, Self::Error> {
        let mut client = ctx.client.clone();
        let request = EncryptMessageRequest {
            message: base64::engine::general_purpose::STANDARD.encode(self.message.as_bytes()),
            policy_encrypting_key: self.policy_encrypting_key.clone(),
        };
        let response = client.call(request).await?;
        Ok(format!(
            "message_kit: {}\ndatasource_signing_key: {}",
            response.message_kit, response.datasource_signing_key
        ))
    }
}
