use tonic_build::manual::{Builder, Method, Service};

const CODEC: &str = "tonic::codec::ProstCodec";

fn method(name: &str, route: &str, input: &str, output: &str) -> tonic_build::manual::MethodBuilder {
    Method::builder()
        .name(name)
        .route_name(route)
        .input_type(format!("crate::proto::{input}"))
        .output_type(format!("crate::proto::{output}"))
        .codec_path(CODEC)
}

fn main() {
    let service = Service::builder()
        .name("AgentRpc")
        .package("parley.v1")
        .method(method("chat", "Chat", "ChatRequest", "ChatResponse").build())
        .method(
            method("chat_stream", "ChatStream", "ChatRequest", "ChatResponse")
                .server_streaming()
                .build(),
        )
        .method(method("list_tools", "ListTools", "ListToolsRequest", "ListToolsResponse").build())
        .method(method("call_tool", "CallTool", "CallToolRequest", "CallToolResponse").build())
        .build();

    Builder::new().compile(&[service]);
}
