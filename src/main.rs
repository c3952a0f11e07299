#![deny(warnings)]
#![deny(clippy::unwrap_used)]

use std::sync::Arc;

use dotenv::dotenv;
use poem::{Server, listener::TcpListener};
use tracing::{info, warn};

use fleet_relay::bridge::client::{SshRelayDialer, SshTargetHandshaker, build_client_config};
use fleet_relay::bridge::config::Settings;
use fleet_relay::bridge::handlers::{AppState, routes, shutdown_on};
use fleet_relay::bridge::storage::{CachedStore, MemoryStore};
use fleet_relay::bridge::supervisor::Supervisor;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();

    // Initialize logging with proper tracing default
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("info".parse().expect("valid directive")),
        )
        .init();

    let settings = Settings::from_env();

    let memory = MemoryStore::new();
    if let Some(ref seed_file) = settings.seed_file {
        memory.load_seed_file(seed_file)?;
    } else {
        warn!("No seed file configured; starting with an empty store");
    }
    let store = Arc::new(CachedStore::new(memory));

    let client_config = build_client_config(settings.keepalive, settings.compress);
    let supervisor = Supervisor::new(
        Arc::new(SshRelayDialer::new(client_config.clone())),
        Arc::new(SshTargetHandshaker::new(client_config)),
    );

    let addr = format!("0.0.0.0:{}", settings.port);
    info!(
        "Starting fleet relay on {} (default command timeout {:?})",
        addr, settings.default_timeout
    );

    let app = routes(Arc::new(AppState {
        store,
        supervisor,
        settings,
    }));

    Server::new(TcpListener::bind(addr))
        .name("fleet-relay")
        .run_with_graceful_shutdown(
            app,
            shutdown_on(tokio::signal::ctrl_c()),
            None,
        )
        .await?;

    Ok(())
}
