//! `POST /nodes/:id/command`: run a shell command on a node.
//!
//! Checks run in a fixed order and the first failure answers the request:
//! caller access, form fields, timeout, caller key, node report, tunnel
//! port, relay registration, relay key. Nothing touches the network before
//! all of them pass.

use std::sync::Arc;
use std::time::Duration;

use poem::http::StatusCode;
use poem::web::{Data, Form, Html, Path};
use poem::{IntoResponse, Request, Response, handler};
use serde::Deserialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::bridge::auth::ConnectionConfig;
use crate::bridge::config::parse_timeout_param;
use crate::bridge::error::BridgeError;
use crate::bridge::handlers::AppState;
use crate::bridge::handlers::access::{self, Caller};
use crate::bridge::handlers::view::NodeViewBuilder;
use crate::bridge::storage::Store;
use crate::bridge::supervisor::ExecutionPlan;
use crate::bridge::types::Report;

/// Raw form fields. Absent fields are empty.
#[derive(Default, Deserialize)]
#[serde(default)]
pub struct CommandForm {
    pub user: String,
    pub password: String,
    pub key: String,
    pub command: String,
    pub timeout: String,
}

/// Validated command request.
pub(crate) struct CommandRequest {
    pub user: String,
    pub command: String,
    pub timeout: Duration,
    pub target_config: ConnectionConfig,
}

impl CommandRequest {
    /// Validate form fields, falling back to `default_timeout`.
    pub(crate) fn parse(form: CommandForm, default_timeout: Duration) -> Result<Self, BridgeError> {
        let user = form.user.trim();
        let command = form.command.trim();
        if user.is_empty() {
            return Err(BridgeError::MissingField("User name required"));
        }
        if command.is_empty() {
            return Err(BridgeError::MissingField("Command required"));
        }

        let timeout = parse_timeout_param(Some(&form.timeout))?.unwrap_or(default_timeout);
        let target_config = ConnectionConfig::build(user, form.key.trim(), form.password.trim())?;

        Ok(Self {
            user: user.to_string(),
            command: command.to_string(),
            timeout,
            target_config,
        })
    }
}

/// Resolve the node and its relay into an execution plan.
pub(crate) fn plan_for_node(
    store: &dyn Store,
    node_id: &str,
    user: &str,
    command: String,
    target_config: ConnectionConfig,
) -> Result<(Report, ExecutionPlan), BridgeError> {
    let report = store
        .get_report_by_id(node_id)?
        .ok_or(BridgeError::NodeNotFound)?;

    let target_port = report.tunnel_port().ok_or(BridgeError::NotConnected)?;

    let relay = store
        .get_ssh_server_by_host(&report.ssh_server_host)?
        .ok_or_else(|| {
            warn!("Relay {} is currently unavailable", report.ssh_server_host);
            BridgeError::RelayNotRegistered
        })?;

    let relay_config =
        ConnectionConfig::build(&relay.user, &relay.key, &relay.password).map_err(|e| {
            warn!("Relay {} has an unusable key: {}", relay.host, e);
            BridgeError::RelayMisconfigured
        })?;

    debug!(
        "Planned {}@{} via {} port {}",
        user, node_id, relay.host, target_port
    );
    let plan = ExecutionPlan {
        node_id: node_id.to_string(),
        relay,
        relay_config,
        target_port,
        target_config,
        command,
    };
    Ok((report, plan))
}

#[handler]
pub async fn run_command(
    req: &Request,
    Path(id): Path<String>,
    form: poem::Result<Form<CommandForm>>,
    Data(state): Data<&Arc<AppState>>,
) -> poem::Result<Response> {
    let request_id = Uuid::new_v4();
    let node_id = id.trim();
    if node_id.is_empty() {
        return Err(BridgeError::NodeNotFound.into());
    }

    let store = state.store.as_ref();
    let caller = access::admin_or_session(req, store)?;

    let Form(form) = form.map_err(|e| {
        debug!("[{}] Failed to parse form: {}", request_id, e);
        BridgeError::InvalidForm
    })?;
    let request = CommandRequest::parse(form, state.settings.default_timeout)?;

    let (report, plan) = plan_for_node(
        store,
        node_id,
        &request.user,
        request.command,
        request.target_config,
    )?;

    info!(
        "[{}] Running command on node {} as {} via relay {} (timeout {:?})",
        request_id, node_id, request.user, plan.relay.host, request.timeout
    );

    let output = state
        .supervisor
        .run(plan, request.timeout)
        .await
        .into_result()
        .inspect_err(|e| warn!("[{}] Command on node {} failed: {}", request_id, node_id, e))?;

    info!(
        "[{}] Command on node {} returned {} byte(s)",
        request_id,
        node_id,
        output.len()
    );

    Ok(match caller {
        Caller::Browser { .. } => Html(
            NodeViewBuilder::new(&report)
                .with_user(request.user)
                .with_response(String::from_utf8_lossy(&output))
                .build(),
        )
        .into_response(),
        Caller::Api => Response::builder()
            .status(StatusCode::OK)
            .content_type("text/plain; charset=utf-8")
            .body(output),
    })
}
