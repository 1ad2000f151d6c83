//! Process bootstrap: wires the agent service, the orchestrator and the
//! gateway, and runs them until shutdown.

use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::gateway::{self, AppState};
use parley_ai::{EchoBackend, TokenBudgeter};
use parley_conversation::{SessionStore, builtin_registry};
use parley_orchestrator::{InMemoryMessageStore, Orchestrator};
use parley_rpc::{AgentService, RpcClient};
use rootcause::Report;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio_stream::wrappers::TcpListenerStream;

async fn bind(addr: String) -> Result<TcpListener, Report<ServerError>> {
    TcpListener::bind(&addr).await.map_err(|e| {
        ServerError::Bind {
            addr: addr.clone(),
            reason: e.to_string(),
        }
        .into()
    })
}

async fn shutdown_requested(mut rx: watch::Receiver<bool>) {
    let _ = rx.wait_for(|stop| *stop).await;
}

fn spawn_sweeper(sessions: Arc<SessionStore>) -> tokio::task::JoinHandle<()> {
    let max_age = sessions.config().max_age();
    let every = sessions.config().sweep_interval();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        loop {
            interval.tick().await;
            let removed = sessions.sweep_expired(max_age).await;
            if removed > 0 {
                tracing::debug!(removed, "periodic session sweep");
            }
        }
    })
}

/// Runs the server until Ctrl-C.
///
/// # Errors
///
/// Returns an error if a listener cannot be bound or a component fails to
/// start or serve.
pub async fn run(config: ServerConfig) -> Result<(), Report<ServerError>> {
    let registry = Arc::new(builtin_registry().map_err(|e| ServerError::Startup {
        component: "tool registry",
        reason: e.to_string(),
    })?);
    let sessions = Arc::new(SessionStore::new(registry.clone(), config.session.clone()));
    let service = AgentService::new(Arc::new(EchoBackend::new()), registry, config.rpc_config());

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let rpc_listener = bind(config.rpc.addr()).await?;
    let rpc_addr = rpc_listener.local_addr().map_err(|e| ServerError::Startup {
        component: "rpc listener",
        reason: e.to_string(),
    })?;
    tracing::info!("agent rpc listening on {}", rpc_addr);
    let rpc_server = tokio::spawn(
        tonic::transport::Server::builder()
            .add_service(service.into_server())
            .serve_with_incoming_shutdown(
                TcpListenerStream::new(rpc_listener),
                shutdown_requested(shutdown_rx.clone()),
            ),
    );

    let client = RpcClient::connect(format!("http://{rpc_addr}"))
        .await
        .map_err(|e| ServerError::Startup {
            component: "rpc client",
            reason: e.current_context().to_string(),
        })?
        .with_client_id("gateway");
    let orchestrator = Orchestrator::new(
        Arc::new(InMemoryMessageStore::new()),
        Arc::new(client),
        sessions.clone(),
        config.orchestrator_config(),
    )
    .await
    .map_err(|e| ServerError::Startup {
        component: "orchestrator",
        reason: e.current_context().to_string(),
    })?
    .with_budgeter(TokenBudgeter::from_tokenizer_path(
        config.budget.tokenizer_path.as_deref(),
    ));

    let sweeper = spawn_sweeper(sessions.clone());

    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => tracing::info!("shutdown requested"),
            Err(e) => tracing::warn!(error = %e, "failed to listen for ctrl-c"),
        }
        let _ = shutdown_tx.send(true);
    });

    let http_listener = bind(config.http.addr()).await?;
    tracing::info!("gateway listening on http://{}", config.http.addr());
    let app = gateway::router(AppState {
        orchestrator: Arc::new(orchestrator),
        sessions,
    });
    let served = axum::serve(http_listener, app)
        .with_graceful_shutdown(shutdown_requested(shutdown_rx))
        .await;

    sweeper.abort();
    served.map_err(|e| ServerError::Serve {
        component: "http",
        reason: e.to_string(),
    })?;

    match rpc_server.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            return Err(ServerError::Serve {
                component: "rpc",
                reason: e.to_string(),
            }
            .into());
        }
        Err(e) => {
            return Err(ServerError::Serve {
                component: "rpc",
                reason: e.to_string(),
            }
            .into());
        }
    }

    tracing::info!("server stopped");
    Ok(())
}
