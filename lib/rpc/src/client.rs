//! Client side of the `AgentRpc` service.

use crate::error::RpcError;
use crate::generated::agent_rpc_client::AgentRpcClient;
use crate::proto::{CallToolRequest, CallToolResponse, ChatRequest, ChatResponse, ListToolsRequest};
use async_trait::async_trait;
use futures::StreamExt;
use futures::stream::BoxStream;
use parley_conversation::ToolDefinition;
use rootcause::Report;
use tonic::transport::Channel;
use tracing::{debug, instrument};

/// Cumulative chunks of a streamed reply.
pub type ChatStream = BoxStream<'static, Result<ChatResponse, RpcError>>;

/// The RPC surface the orchestrator talks to.
///
/// Implemented by [`RpcClient`] for a remote service and by
/// [`AgentService`](crate::AgentService) in-process.
#[async_trait]
pub trait ChatRpc: Send + Sync {
    /// Requests a whole reply.
    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, Report<RpcError>>;

    /// Requests a reply as cumulative chunks.
    async fn chat_stream(&self, request: ChatRequest) -> Result<ChatStream, Report<RpcError>>;

    /// Returns the tool catalog.
    async fn list_tools(&self) -> Result<Vec<ToolDefinition>, Report<RpcError>>;

    /// Invokes a tool.
    async fn call_tool(&self, request: CallToolRequest)
    -> Result<CallToolResponse, Report<RpcError>>;
}

/// gRPC client for a remote `AgentRpc` service.
#[derive(Debug, Clone)]
pub struct RpcClient {
    inner: AgentRpcClient<Channel>,
    client_id: String,
}

impl RpcClient {
    /// Connects to `endpoint`, e.g. `http://127.0.0.1:50051`.
    ///
    /// # Errors
    ///
    /// Returns `RpcError::Connect` if the endpoint is invalid or unreachable.
    pub async fn connect(endpoint: impl Into<String>) -> Result<Self, Report<RpcError>> {
        let endpoint = endpoint.into();
        let inner = AgentRpcClient::connect(endpoint.clone())
            .await
            .map_err(|e| RpcError::Connect {
                endpoint: endpoint.clone(),
                reason: e.to_string(),
            })?;
        debug!(endpoint = %endpoint, "rpc client connected");
        Ok(Self {
            inner,
            client_id: String::new(),
        })
    }

    /// Sets the client id sent with tool requests.
    #[must_use]
    pub fn with_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = client_id.into();
        self
    }
}

#[async_trait]
impl ChatRpc for RpcClient {
    #[instrument(skip(self, request), fields(session_id = %request.session_id))]
    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, Report<RpcError>> {
        let mut client = self.inner.clone();
        let response = client
            .chat(request)
            .await
            .map_err(|status| RpcError::from_status(&status))?;
        Ok(response.into_inner())
    }

    #[instrument(skip(self, request), fields(session_id = %request.session_id))]
    async fn chat_stream(&self, request: ChatRequest) -> Result<ChatStream, Report<RpcError>> {
        let mut client = self.inner.clone();
        let stream = client
            .chat_stream(request)
            .await
            .map_err(|status| RpcError::from_status(&status))?
            .into_inner();
        Ok(stream
            .map(|chunk| chunk.map_err(|status| RpcError::from_status(&status)))
            .boxed())
    }

    async fn list_tools(&self) -> Result<Vec<ToolDefinition>, Report<RpcError>> {
        let mut client = self.inner.clone();
        let response = client
            .list_tools(ListToolsRequest {
                client_id: self.client_id.clone(),
            })
            .await
            .map_err(|status| RpcError::from_status(&status))?;
        Ok(response
            .into_inner()
            .tools
            .into_iter()
            .map(ToolDefinition::from)
            .collect())
    }

    #[instrument(skip(self, request), fields(tool = %request.name))]
    async fn call_tool(
        &self,
        mut request: CallToolRequest,
    ) -> Result<CallToolResponse, Report<RpcError>> {
        if request.client_id.is_empty() {
            request.client_id.clone_from(&self.client_id);
        }
        let mut client = self.inner.clone();
        let response = client
            .call_tool(request)
            .await
            .map_err(|status| RpcError::from_status(&status))?;
        Ok(response.into_inner())
    }
}
