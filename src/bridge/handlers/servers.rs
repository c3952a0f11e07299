//! `POST /servers`: register or replace a relay SSH server.

use std::sync::Arc;

use poem::http::StatusCode;
use poem::web::{Data, Json};
use poem::{IntoResponse, Request, Response, handler};
use tracing::{debug, info};

use crate::bridge::auth::ConnectionConfig;
use crate::bridge::error::BridgeError;
use crate::bridge::handlers::AppState;
use crate::bridge::handlers::access;
use crate::bridge::types::SshServer;

/// Trim a registration and check it can be used to log in to the relay.
pub(crate) fn validate_server(mut server: SshServer) -> Result<SshServer, BridgeError> {
    server.host = server.host.trim().to_string();
    server.user = server.user.trim().to_string();
    server.key = server.key.trim().to_string();
    server.password = server.password.trim().to_string();

    if server.host.is_empty() {
        return Err(BridgeError::MissingField("Host required"));
    }
    if server.port == 0 {
        return Err(BridgeError::MissingField("Port required"));
    }
    if server.user.is_empty() {
        return Err(BridgeError::MissingField("User required"));
    }
    if server.key.is_empty() && server.password.is_empty() {
        return Err(BridgeError::MissingField("Key or password required"));
    }
    ConnectionConfig::build(&server.user, &server.key, &server.password)?;
    Ok(server)
}

#[handler]
pub async fn register_server(
    req: &Request,
    body: poem::Result<Json<SshServer>>,
    Data(state): Data<&Arc<AppState>>,
) -> poem::Result<Response> {
    let store = state.store.as_ref();
    access::require_api_key(req, store, true)?;

    let Json(server) = body.map_err(|e| {
        debug!("Failed to parse relay registration: {}", e);
        BridgeError::InvalidJson
    })?;
    let server = validate_server(server)?;

    info!("Registering relay {} as {}", server.addr(), server.user);
    store.put_ssh_server(server).map_err(BridgeError::from)?;
    Ok(StatusCode::CREATED.into_response())
}
