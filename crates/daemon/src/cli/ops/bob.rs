use base64::Engine;
use clap::{Args, Subcommand};

use trove_daemon::http_server::api::client::ApiError;
use trove_daemon::http_server::api::v0::bob::{
    JoinPolicyRequest, PublicKeysRequest, RetrieveRequest,
};

use crate::cli::op::{Op, OpContext};

crate::command_enum! {
    (JoinPolicy, JoinPolicyRequest),
    (Retrieve, RetrieveRequest),
    (PublicKeys, PublicKeysRequest),
}

pub type BobCommand = Command;

/// Join policies and retrieve messages as this node's Bob
#[derive(Args, Debug, Clone)]
pub struct Bob {
    #[command(subcommand)]
    pub command: BobCommand,
}

#[async_trait::async_trait]
impl Op for Bob {
    type Error = OpError;
    type Output = OpOutput;

    async fn execute(&self, ctx: &OpContext) -> Result<Self::Output, Self::Error> {
        self.command.execute(ctx).await
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BobError {
    #[error("API error: {0}")]
    Api(#[from] ApiError),
    #[error("node returned an undecodable plaintext: {0}")]
    Plaintext(#[from] base64::DecodeError),
}

#[async_trait::async_trait]
impl Op for JoinPolicyRequest {
    type Error = BobError;
    type Output = String;

    async fn execute(&self, ctx: &OpContext) -> Result<Self::Output, Self::Error> {
        let mut client = ctx.client.clone();
        Ok(client.call(self.clone()).await?)
    }
}

#[async_trait::async_trait]
impl Op for RetrieveRequest {
    type Error = BobError;
    type Output = String;

    async fn execute(&self, ctx: &OpContext) -> Result<Self::Output, Self::Error> {
        let mut client = ctx.client.clone();
        let response = client.call(self.clone()).await?;
        let plaintexts = response
            .plaintext
            .iter()
            .map(|encoded| {
                let bytes = base64::engine::general_purpose::STANDARD.decode(encoded)?;
                Ok(String::from_utf8_lossy(&bytes).into_owned())
            })
            .collect::<Result<Vec<_>, base64::DecodeError>>()?;
        Ok(plaintexts.join("\n"))
    }
}

#[async_trait::async_trait]
impl Op for PublicKeysRequest {
    type Error = BobError;
    type Output = String;

    async fn execute(&self, ctx: &OpContext) -> Result<Self::Output, Self::Error> {
        let mut client = ctx.client.clone();
        let response = client.call(self.clone()).await?;
        Ok(format!(
            "bob_encrypting_key: {}\nbob_signing_key: {}",
            response.bob_encrypting_key, response.bob_signing_key
        ))
    }
}
