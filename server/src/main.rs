//! Server entry point: wire the store, registry, timers, and transport.

use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use homegame_server::coordinator::Coordinator;
use homegame_server::registry::{self, ConnectionRegistry};
use homegame_server::store::{GameStore, RedisStore};
use homegame_server::timer::{self, TimerScheduler};
use homegame_server::http;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let redis_url =
        std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379/0".to_string());
    let bind_addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8000".to_string());

    // An unreachable store at startup is fatal.
    let store = match RedisStore::connect(&redis_url).await {
        Ok(store) => store,
        Err(err) => {
            tracing::error!(url = %redis_url, error = %err, "cannot connect to store");
            std::process::exit(1);
        }
    };

    let registry = Arc::new(ConnectionRegistry::new());
    let timers = Arc::new(TimerScheduler::new());
    let coordinator = Arc::new(Coordinator::new(
        GameStore::new(Box::new(store)),
        registry.clone(),
        timers,
    ));

    tokio::spawn(timer::run(coordinator.clone()));
    tokio::spawn(registry::run_heartbeat(registry));

    let app = http::router(coordinator);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .expect("bind address");
    tracing::info!(addr = %bind_addr, "homegame server listening");
    axum::serve(listener, app).await.expect("server run");
}
