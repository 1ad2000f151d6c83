//! The `AgentRpc` service implementation.

use crate::client::{ChatRpc, ChatStream};
use crate::error::RpcError;
use crate::generated::agent_rpc_server::{AgentRpc, AgentRpcServer};
use crate::proto::{
    CallToolRequest, CallToolResponse, ChatMessage, ChatRequest, ChatResponse, ListToolsRequest,
    ListToolsResponse, Role, Tool,
};
use async_trait::async_trait;
use futures::StreamExt;
use parley_ai::{CompletionBackend, CompletionRequest};
use parley_conversation::{ToolDefinition, ToolInvoker};
use parley_core::MessageId;
use rootcause::Report;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tonic::{Request, Response, Status};
use tracing::{debug, info, instrument, warn};

/// Service configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RpcConfig {
    /// Model used when a request leaves it empty.
    pub default_model: String,
    /// Buffered chunks per stream before the producer waits.
    pub stream_channel_capacity: usize,
    /// Pause between streamed chunks.
    pub chunk_delay_ms: u64,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            default_model: "echo".to_string(),
            stream_channel_capacity: 16,
            chunk_delay_ms: 0,
        }
    }
}

type ChunkSender = mpsc::Sender<Result<ChatResponse, Status>>;

/// Serves chat completions and the tool catalog.
#[derive(Clone)]
pub struct AgentService {
    backend: Arc<dyn CompletionBackend>,
    tools: Arc<dyn ToolInvoker>,
    config: RpcConfig,
}

impl fmt::Debug for AgentService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgentService")
            .field("provider", &self.backend.provider())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl AgentService {
    /// Creates a service over a backend and a tool invoker.
    #[must_use]
    pub fn new(
        backend: Arc<dyn CompletionBackend>,
        tools: Arc<dyn ToolInvoker>,
        config: RpcConfig,
    ) -> Self {
        Self {
            backend,
            tools,
            config,
        }
    }

    /// Wraps the service for a tonic router.
    #[must_use]
    pub fn into_server(self) -> AgentRpcServer<Self> {
        AgentRpcServer::new(self)
    }

    fn completion_request(&self, request: &ChatRequest) -> Result<CompletionRequest, Status> {
        let messages = request
            .messages
            .iter()
            .map(ChatMessage::to_llm)
            .collect::<Result<Vec<_>, _>>()?;
        let model = if request.model.is_empty() {
            self.config.default_model.clone()
        } else {
            request.model.clone()
        };

        let mut completion = CompletionRequest::new(model, messages);
        if let Some(temperature) = request.temperature {
            completion = completion.with_temperature(temperature);
        }
        if let Some(max_tokens) = request.max_tokens {
            completion = completion.with_max_tokens(max_tokens);
        }
        Ok(completion)
    }

    fn reply(content: String, id: MessageId, session_id: &str) -> ChatResponse {
        let mut message = ChatMessage::new(Role::Assistant, content);
        message.id = id.to_string();
        message.session_id = session_id.to_string();
        ChatResponse::reply(message)
    }

    async fn answer(&self, request: ChatRequest) -> Result<ChatResponse, Status> {
        let completion = self.completion_request(&request)?;
        let response = match self.backend.complete(&completion).await {
            Ok(response) => {
                Self::reply(response.content, MessageId::new(), &request.session_id)
            }
            Err(e) => {
                warn!(provider = self.backend.provider(), error = %e, "completion failed");
                ChatResponse::failure(e.to_string())
            }
        };
        Ok(response)
    }

    fn start_stream(
        &self,
        request: ChatRequest,
    ) -> Result<mpsc::Receiver<Result<ChatResponse, Status>>, Status> {
        let completion = self.completion_request(&request)?;
        let (tx, rx) = mpsc::channel(self.config.stream_channel_capacity.max(1));
        let backend = Arc::clone(&self.backend);
        let delay = Duration::from_millis(self.config.chunk_delay_ms);

        tokio::spawn(async move {
            produce_chunks(backend, completion, request.session_id, delay, tx).await;
        });
        Ok(rx)
    }

    fn call(&self, request: &CallToolRequest) -> CallToolResponse {
        self.tools
            .call_tool(&request.name, &request.arguments)
            .into()
    }
}

/// Sends cumulative chunks until the reply is complete or the receiver goes away.
async fn produce_chunks(
    backend: Arc<dyn CompletionBackend>,
    completion: CompletionRequest,
    session_id: String,
    delay: Duration,
    tx: ChunkSender,
) {
    let mut deltas = match backend.stream(&completion).await {
        Ok(deltas) => deltas,
        Err(e) => {
            warn!(error = %e, "stream failed to start");
            let _ = tx.send(Ok(ChatResponse::failure(e.to_string()))).await;
            return;
        }
    };

    let id = MessageId::new();
    let mut text = String::new();
    let mut sent = 0usize;
    while let Some(delta) = deltas.next().await {
        let delta = match delta {
            Ok(delta) => delta,
            Err(e) => {
                warn!(error = %e, "stream failed");
                let _ = tx.send(Ok(ChatResponse::failure(e.to_string()))).await;
                return;
            }
        };
        if sent > 0 && !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        text.push_str(&delta);
        if tx
            .send(Ok(AgentService::reply(text.clone(), id, &session_id)))
            .await
            .is_err()
        {
            debug!(sent, "stream receiver dropped");
            return;
        }
        sent += 1;
    }

    // An empty reply still produces one chunk.
    if sent == 0 {
        let _ = tx.send(Ok(AgentService::reply(text, id, &session_id))).await;
    }
}

#[tonic::async_trait]
impl AgentRpc for AgentService {
    type ChatStreamStream = ReceiverStream<Result<ChatResponse, Status>>;

    #[instrument(skip(self, request))]
    async fn chat(&self, request: Request<ChatRequest>) -> Result<Response<ChatResponse>, Status> {
        let request = request.into_inner();
        info!(
            session_id = %request.session_id,
            messages = request.messages.len(),
            "chat"
        );
        self.answer(request).await.map(Response::new)
    }

    #[instrument(skip(self, request))]
    async fn chat_stream(
        &self,
        request: Request<ChatRequest>,
    ) -> Result<Response<Self::ChatStreamStream>, Status> {
        let request = request.into_inner();
        info!(
            session_id = %request.session_id,
            messages = request.messages.len(),
            "chat stream"
        );
        let rx = self.start_stream(request)?;
        Ok(Response::new(ReceiverStream::new(rx)))
    }

    #[instrument(skip(self, _request))]
    async fn list_tools(
        &self,
        _request: Request<ListToolsRequest>,
    ) -> Result<Response<ListToolsResponse>, Status> {
        let tools = self.tools.list_tools().iter().map(Tool::from).collect();
        Ok(Response::new(ListToolsResponse { tools }))
    }

    #[instrument(skip(self, request))]
    async fn call_tool(
        &self,
        request: Request<CallToolRequest>,
    ) -> Result<Response<CallToolResponse>, Status> {
        let request = request.into_inner();
        info!(tool = %request.name, session_id = %request.session_id, "call tool");
        Ok(Response::new(self.call(&request)))
    }
}

#[async_trait]
impl ChatRpc for AgentService {
    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, Report<RpcError>> {
        self.answer(request)
            .await
            .map_err(|status| RpcError::from_status(&status).into())
    }

    async fn chat_stream(&self, request: ChatRequest) -> Result<ChatStream, Report<RpcError>> {
        let rx = self
            .start_stream(request)
            .map_err(|status| RpcError::from_status(&status))?;
        Ok(ReceiverStream::new(rx)
            .map(|chunk| chunk.map_err(|status| RpcError::from_status(&status)))
            .boxed())
    }

    async fn list_tools(&self) -> Result<Vec<ToolDefinition>, Report<RpcError>> {
        Ok(self.tools.list_tools())
    }

    async fn call_tool(&self, request: CallToolRequest) -> Result<CallToolResponse, Report<RpcError>> {
        Ok(self.call(&request))
    }
}
