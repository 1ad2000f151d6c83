use parley_server::{app, config::ServerConfig, error::ServerError};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = match ServerConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            let error = ServerError::Config {
                reason: e.to_string(),
            };
            tracing::error!(error = %error, "failed to load configuration");
            std::process::exit(1);
        }
    };
    tracing::info!("Loaded configuration");

    if let Err(e) = app::run(config).await {
        tracing::error!(error = %e.current_context(), "server failed");
        std::process::exit(1);
    }
}
