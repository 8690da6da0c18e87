mod app;
mod bootstrap;
mod config;
mod error;

use clap::Parser;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = config::Cli::parse();
    let gateway_config = match config::GatewayConfig::load(cli) {
        Ok(c) => c,
        Err(e) => {
            tracing::error!(error = %e, "invalid configuration");
            std::process::exit(1);
        }
    };

    let store = match bootstrap::connect_store(&gateway_config).await {
        Ok(s) => s,
        Err(e) => {
            // spec.md §6/§7: shared-store connect failure at startup is
            // fatal, exit code 1.
            tracing::error!(error = %e, "failed to connect to shared store");
            std::process::exit(1);
        }
    };
    tracing::info!(store_url = %gateway_config.store_url, "connected to shared store");

    let degraded = bootstrap::probe_auth_server(&gateway_config).await;
    if degraded.is_degraded() {
        tracing::warn!("starting in degraded mode: authentication service unreachable");
    }

    let router = app::build(&gateway_config, store, degraded);

    let listener = match tokio::net::TcpListener::bind(("0.0.0.0", gateway_config.port)).await {
        Ok(l) => l,
        Err(e) => {
            tracing::error!(error = %e, port = gateway_config.port, "failed to bind listener");
            std::process::exit(1);
        }
    };
    tracing::info!(port = gateway_config.port, "relay-gateway listening");

    if let Err(e) = axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        tracing::error!(error = %e, "server error");
        std::process::exit(1);
    }
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_err() {
        tracing::warn!("failed to install Ctrl+C handler; shutting down without a signal wait");
        return;
    }
    tracing::info!("received shutdown signal, draining connections");
}
