use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use slipstream_server::config::ServerConfig;
use slipstream_server::events::EventBus;
use slipstream_server::game::engine::GameEngine;
use slipstream_server::metrics::{self, Metrics};
use slipstream_server::net::connection;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    info!("Slipstream Server v{}", env!("CARGO_PKG_VERSION"));

    let config = ServerConfig::load_or_default();
    config.validate()?;
    info!(
        "Configuration loaded: {}:{}, tick {} ms, mailbox {}",
        config.bind_address, config.port, config.game.timing.tick_interval_ms, config.mailbox_capacity
    );

    let metrics = Arc::new(Metrics::new());
    let metrics_clone = metrics.clone();
    let metrics_port = config.metrics_port;
    tokio::spawn(async move {
        if let Err(e) = metrics::start_metrics_server(metrics_clone, metrics_port).await {
            error!("Metrics server error: {}", e);
        }
    });

    let events = Arc::new(EventBus::new(config.mailbox_capacity));
    let engine = GameEngine::new(config.game.clone(), events, metrics)?;
    let game_loop = engine.start();

    let addr = SocketAddr::new(config.bind_address, config.port);
    let listener = TcpListener::bind(addr).await?;
    info!("Server ready on tcp://{}", addr);

    let accept = async {
        loop {
            match listener.accept().await {
                Ok((socket, peer)) => {
                    if let Err(e) = socket.set_nodelay(true) {
                        warn!("Failed to set TCP_NODELAY for {}: {}", peer, e);
                    }
                    debug!("Accepted connection from {}", peer);
                    tokio::spawn(connection::serve(socket, Arc::clone(&engine)));
                }
                Err(e) => warn!("Accept failed: {}", e),
            }
        }
    };

    // Shutdown signal handler
    let shutdown = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
        info!("Shutdown signal received");
    };

    tokio::select! {
        _ = accept => {}
        _ = shutdown => {
            info!("Shutting down...");
        }
    }

    game_loop.abort();
    info!("Server stopped");

    Ok(())
}
