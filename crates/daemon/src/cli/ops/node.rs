use clap::{Args, Subcommand};

use trove_daemon::http_server::api::client::ApiError;
use trove_daemon::http_server::api::v0::node::{CardRequest, ForgetNodesRequest, KnownNodesRequest};

use crate::cli::op::{Op, OpContext};

crate::command_enum! {
    (Known, KnownNodesRequest),
    (Forget, ForgetNodesRequest),
    (Card, CardRequest),
}

pub type NodeCommand = Command;

/// Inspect what this node knows about the network
#[derive(Args, Debug, Clone)]
pub struct Node {
    #[command(subcommand)]
    pub command: NodeCommand,
}

#[async_trait::async_trait]
impl Op for Node {
    type Error = OpError;
    type Output = OpOutput;

    async fn execute(&self, ctx: &OpContext) -> Result<Self::Output, Self::Error> {
        self.command.execute(ctx).await
    }
}

#[derive(Debug, thiserror::Error)]
pub enum NodeError {
    #[error("API error: {0}")]
    Api(#[from] ApiError),
}

#[async_trait::async_trait]
impl Op for KnownNodesRequest {
    type Error = NodeError;
    type Output = String;

    async fn execute(&self, ctx: &OpContext) -> Result<Self::Output, Self::Error> {
        let mut client = ctx.client.clone();
        let response = client.call(self.clone()).await?;
        if response.nodes.is_empty() {
            return Ok("No known nodes".to_string());
        }
        Ok(response
            .nodes
            .iter()
            .map(|node| {
                let addresses = node
                    .addresses
                    .iter()
                    .map(|addr| addr.to_string())
                    .collect::<Vec<_>>()
                    .join(", ");
                format!("{} [{}]", node.node, addresses)
            })
            .collect::<Vec<_>>()
            .join("\n"))
    }
}

#[async_trait::async_trait]
impl Op for ForgetNodesRequest {
    type Error = NodeError;
    type Output = String;

    async fn execute(&self, ctx: &OpContext) -> Result<Self::Output, Self::Error> {
        let mut client = ctx.client.clone();
        let response = client.call(self.clone()).await?;
        Ok(format!("Forgot {} nodes", response.forgotten))
    }
}

#[async_trait::async_trait]
impl Op for CardRequest {
    type Error = NodeError;
    type Output = String;

    async fn execute(&self, ctx: &OpContext) -> Result<Self::Output, Self::Error> {
        let mut client = ctx.client.clone();
        let response = client.call(self.clone()).await?;
        Ok(response.card)
    }
}
