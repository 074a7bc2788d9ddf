use clap::{Args, Subcommand};

use trove_daemon::http_server::api::client::ApiError;
use trove_daemon::http_server::api::v0::alice::{
    CreatePolicyRequest, DerivePolicyPubkeyRequest, GrantRequest, RevokeRequest,
};

use crate::cli::op::{Op, OpContext};

crate::command_enum! {
    (CreatePolicy, CreatePolicyRequest),
    (DerivePolicyPubkey, DerivePolicyPubkeyRequest),
    (Grant, GrantRequest),
    (Revoke, RevokeRequest),
}

pub type AliceCommand = Command;

/// Create, grant and revoke policies as this node's Alice
#[derive(Args, Debug, Clone)]
pub struct Alice {
    #[command(subcommand)]
    pub command: AliceCommand,
}

#[async_trait::async_trait]
impl Op for Alice {
    type Error = OpError;
    type Output = OpOutput;

    async fn execute(&self, ctx: &OpContext) -> Result<Self::Output, Self::Error> {
        self.command.execute(ctx).await
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AliceError {
    #[error("API error: {0}")]
    Api(#[from] ApiError),
}

#[async_trait::async_trait]
impl Op for CreatePolicyRequest {
    type Error = AliceError;
    type Output = String;

    async fn execute(&self, ctx: &OpContext) -> Result<Self::Output, Self::Error> {
        let mut client = ctx.client.clone();
        let response = client.call(self.clone()).await?;
        Ok(format!(
            "Created policy {:?}\npolicy_encrypting_key: {}",
            response.label, response.policy_encrypting_key
        ))
    }
}

#[async_trait::async_trait]
impl Op for DerivePolicyPubkeyRequest {
    type Error = AliceError;
    type Output = String;

    async fn execute(&self, ctx: &OpContext) -> Result<Self::Output, Self::Error> {
        let mut client = ctx.client.clone();
        let response = client.call(self.clone()).await?;
        Ok(response.policy_encrypting_key)
    }
}

#[async_trait::async_trait]
impl Op for GrantRequest {
    type Error = AliceError;
    type Output = String;

    async fn execute(&self, ctx: &OpContext) -> Result<Self::Output, Self::Error> {
        let mut client = ctx.client.clone();
        let response = client.call(self.clone()).await?;
        Ok(format!(
            "Granted {}-of-{} policy {:?}\n\
             policy_encrypting_key: {}\n\
             alice_signing_key: {}\n\
             treasure_map: {}",
            self.m,
            self.n,
            response.label,
            response.policy_encrypting_key,
            response.alice_signing_key,
            response.treasure_map
        ))
    }
}

#[async_trait::async_trait]
impl Op for RevokeRequest {
    type Error = AliceError;
    type Output = String;

    async fn execute(&self, ctx: &OpContext) -> Result<Self::Output, Self::Error> {
        let mut client = ctx.client.clone();
        let response = client.call(self.clone()).await?;
        let mut lines = vec![format!(
            "Revoked policy {:?} on {} nodes",
            response.label,
            response.revoked_nodes.len()
        )];
        lines.extend(response.revoked_nodes.into_iter().map(|node| format!("  {node}")));
        Ok(lines.join("\n"))
    }
}
