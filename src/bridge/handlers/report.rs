//! `POST /report`: agent check-in.
//!
//! The server stamps each report with its receive time, the API key used,
//! and the caller's public address, stores it, and answers with the login
//! of a randomly chosen relay so the agent can open its reverse tunnel.
//! Bodies may be gzip-encoded; see the router's compression middleware.

use std::sync::Arc;

use poem::http::StatusCode;
use poem::web::{Data, Json};
use poem::{IntoResponse, Request, Response, handler};
use rand::seq::SliceRandom;
use tracing::{debug, info};

use crate::bridge::error::BridgeError;
use crate::bridge::handlers::AppState;
use crate::bridge::handlers::access;
use crate::bridge::types::{RelayReply, Report};

/// Public address of the caller: first `X-Forwarded-For` entry, else the
/// peer address.
pub(crate) fn remote_ip(req: &Request) -> String {
    if let Some(forwarded) = req.header("x-forwarded-for")
        && let Some(first) = forwarded.split(',').map(str::trim).find(|s| !s.is_empty())
    {
        return first.to_string();
    }
    req.remote_addr()
        .as_socket_addr()
        .map(|addr| addr.ip().to_string())
        .unwrap_or_default()
}

#[handler]
pub async fn ingest_report(
    req: &Request,
    body: poem::Result<Json<Report>>,
    Data(state): Data<&Arc<AppState>>,
) -> poem::Result<Response> {
    let store = state.store.as_ref();
    access::require_api_key(req, store, false)?;

    let Json(mut report) = body.map_err(|e| {
        debug!("Failed to parse report: {}", e);
        BridgeError::InvalidJson
    })?;
    if report.id.trim().is_empty() {
        return Err(BridgeError::MissingField("ID required").into());
    }

    report.server_time = chrono::Utc::now().timestamp();
    report.api_key = access::api_key(req).unwrap_or_default().to_string();
    report.global_ip = remote_ip(req);
    report.global_host = report.global_ip.clone();

    info!(
        "Report from {} {} tunnel port {}",
        report.id, report.custom_id, report.ssh_remote_port
    );
    store.put_report(report).map_err(BridgeError::from)?;

    let servers = store.list_ssh_servers().map_err(BridgeError::from)?;
    let reply = servers
        .choose(&mut rand::thread_rng())
        .map(RelayReply::from)
        .unwrap_or_default();

    Ok(Json(reply).with_status(StatusCode::CREATED).into_response())
}
