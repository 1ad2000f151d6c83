//! End-to-end tests over a real gRPC server on an ephemeral port.

use futures::StreamExt;
use parley_ai::EchoBackend;
use parley_conversation::builtin_registry;
use parley_rpc::proto::{CallToolRequest, ChatMessage, ChatRequest, Role};
use parley_rpc::{AgentService, ChatRpc, RpcClient, RpcConfig};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_stream::wrappers::TcpListenerStream;
use tonic::transport::Server;

async fn start_server() -> RpcClient {
    let service = AgentService::new(
        Arc::new(EchoBackend::new()),
        Arc::new(builtin_registry().expect("registry")),
        RpcConfig::default(),
    );
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");

    tokio::spawn(async move {
        Server::builder()
            .add_service(service.into_server())
            .serve_with_incoming(TcpListenerStream::new(listener))
            .await
            .expect("serve");
    });

    RpcClient::connect(format!("http://{addr}"))
        .await
        .expect("connect")
}

fn hello_request() -> ChatRequest {
    ChatRequest {
        messages: vec![ChatMessage::new(Role::User, "Hello")],
        session_id: "sess-1".to_string(),
        ..ChatRequest::default()
    }
}

#[tokio::test]
async fn chat_replies_deterministically() {
    let client = start_server().await;
    let first = client.chat(hello_request()).await.expect("chat");
    let second = client.chat(hello_request()).await.expect("chat");

    let reply = first.content().expect("message");
    assert!(reply.contains("Hello"));
    assert_eq!(second.content(), Some(reply));
    assert!(first.error.is_empty());
}

#[tokio::test]
async fn stream_final_chunk_matches_unary_reply() {
    let client = start_server().await;
    let unary = client.chat(hello_request()).await.expect("chat");

    let chunks: Vec<String> = client
        .chat_stream(hello_request())
        .await
        .expect("stream")
        .map(|chunk| chunk.expect("chunk").content().unwrap_or_default().to_string())
        .collect()
        .await;

    assert!(!chunks.is_empty());
    assert_eq!(chunks.last().map(String::as_str), unary.content());
}

#[tokio::test]
async fn missing_user_message_is_an_application_error() {
    let client = start_server().await;
    let response = client
        .chat(ChatRequest {
            messages: vec![ChatMessage::new(Role::System, "be brief")],
            ..ChatRequest::default()
        })
        .await
        .expect("chat");
    assert_eq!(response.error, "no user message in request");
}

#[tokio::test]
async fn invalid_role_is_a_status_error() {
    let client = start_server().await;
    let mut message = ChatMessage::new(Role::User, "Hello");
    message.role = 17;
    let result = client
        .chat(ChatRequest {
            messages: vec![message],
            ..ChatRequest::default()
        })
        .await;
    assert!(result.is_err());
}

#[tokio::test]
async fn tools_over_the_wire() {
    let client = start_server().await;
    let tools = client.list_tools().await.expect("list");
    let names: Vec<&str> = tools.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(names, ["echo", "create_voucher", "get_project", "get_customer"]);
    assert!(tools[1].schema_properties().contains(&"projectId"));

    let created = client
        .call_tool(CallToolRequest::new("create_voucher", r#"{"projectId":"abc123"}"#))
        .await
        .expect("call");
    assert!(created.error.is_empty());
    assert!(created.content.contains("abc123"));

    let missing = client
        .call_tool(CallToolRequest::new("nonexistent", "{}"))
        .await
        .expect("call");
    assert_eq!(missing.error, "Tool \"nonexistent\" not found");

    let malformed = client
        .call_tool(CallToolRequest::new("echo", "{not json"))
        .await
        .expect("call");
    assert!(malformed.error.starts_with("Invalid args: "));
}
