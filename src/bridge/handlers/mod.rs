//! HTTP surface of the fleet relay.
//!
//! | Route | Method | Caller | Handler |
//! |-------|--------|--------|---------|
//! | `/nodes` | GET | admin API | [`node::list_nodes`] |
//! | `/nodes/:id` | GET | admin API (JSON) or session (HTML) | [`node::node_detail`] |
//! | `/nodes/:id` | DELETE | admin API | [`node::delete_node`] |
//! | `/nodes/:id/history` | GET | admin API | [`node::node_history`] |
//! | `/nodes/:id/command` | POST | admin API or session | [`command::run_command`] |
//! | `/servers` | POST | admin API | [`servers::register_server`] |
//! | `/report` | POST | any API key | `report::ingest_report` (feature `ingest`) |
//! | `/measure/:kb` | GET, HEAD, POST | anyone | `measure::measure` (feature `measure`) |
//!
//! Any other method on a known route answers 405.

pub mod access;
pub mod command;
#[cfg(feature = "measure")]
pub mod measure;
pub mod node;
#[cfg(feature = "ingest")]
pub mod report;
pub mod servers;
pub mod view;

use std::future::Future;
use std::sync::Arc;

use poem::middleware::{CookieJarManager, Tracing};
use poem::{Endpoint, EndpointExt, Route, get, post};
use tracing::{info, warn};

use crate::bridge::config::Settings;
use crate::bridge::storage::Store;
use crate::bridge::supervisor::Supervisor;

/// State shared by every handler.
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub supervisor: Supervisor,
    pub settings: Settings,
}

/// Build the router with its middleware.
pub fn routes(state: Arc<AppState>) -> impl Endpoint {
    let route = Route::new()
        .at("/nodes", get(node::list_nodes))
        .at("/nodes/:id", get(node::node_detail).delete(node::delete_node))
        .at("/nodes/:id/history", get(node::node_history))
        .at("/nodes/:id/command", post(command::run_command))
        .at("/servers", post(servers::register_server));

    #[cfg(feature = "ingest")]
    let route = route.at(
        "/report",
        post(report::ingest_report).with(poem::middleware::Compression::new()),
    );

    #[cfg(feature = "measure")]
    let route = route.at(
        "/measure/:kb",
        get(measure::measure)
            .head(measure::measure)
            .post(measure::measure),
    );

    route
        .with(CookieJarManager::new())
        .with(Tracing)
        .data(state)
}

/// Resolve once `signal` fires, for graceful shutdown.
///
/// If the signal cannot be watched the error is logged and this never
/// resolves, so the server keeps running.
pub async fn shutdown_on<F>(signal: F)
where
    F: Future<Output = std::io::Result<()>>,
{
    match signal.await {
        Ok(()) => info!("Shutting down"),
        Err(e) => {
            warn!("Failed to listen for shutdown signal: {}", e);
            std::future::pending::<()>().await;
        }
    }
}
