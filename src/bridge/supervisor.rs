//! Timeout and retry supervision for one command request.
//!
//! [`Supervisor::run`] drives an [`ExecutionPlan`] to exactly one terminal
//! [`ExecutionState`]:
//!
//! - every attempt dials a fresh tunnel through the relay and runs the
//!   target hop over it
//! - only [`BridgeError::HandshakeEof`] is retried, up to
//!   [`MAX_EOF_ATTEMPTS`] attempts in total, with no delay in between
//! - the deadline covers all attempts together, not each one
//!
//! Attempts run as spawned tasks that report back over a oneshot channel.
//! When the deadline passes the caller gets [`ExecutionState::TimedOut`]
//! immediately, the shared cancellation token fires, and the abandoned
//! attempt closes its relay connection on its own. A result arriving after
//! that point is dropped.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use backon::{ConstantBuilder, Retryable};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::bridge::auth::ConnectionConfig;
use crate::bridge::client::{RelayDialer, TargetHandshaker};
use crate::bridge::config::MAX_EOF_ATTEMPTS;
use crate::bridge::error::BridgeError;
use crate::bridge::types::SshServer;

/// Everything needed to run one command on one node.
pub struct ExecutionPlan {
    pub node_id: String,
    pub relay: SshServer,
    pub relay_config: ConnectionConfig,
    /// Port on the relay where the node's reverse tunnel listens
    pub target_port: u16,
    pub target_config: ConnectionConfig,
    pub command: String,
}

/// Terminal outcome of a supervised run.
///
/// A run is *running* for as long as [`Supervisor::run`] is pending; the
/// returned value is always one of these and never changes afterwards.
#[derive(Debug)]
pub enum ExecutionState {
    Succeeded(Vec<u8>),
    Failed(BridgeError),
    TimedOut,
}

impl ExecutionState {
    pub fn into_result(self) -> Result<Vec<u8>, BridgeError> {
        match self {
            ExecutionState::Succeeded(output) => Ok(output),
            ExecutionState::Failed(err) => Err(err),
            ExecutionState::TimedOut => Err(BridgeError::Timeout),
        }
    }
}

pub struct Supervisor {
    dialer: Arc<dyn RelayDialer>,
    handshaker: Arc<dyn TargetHandshaker>,
}

impl Supervisor {
    pub fn new(dialer: Arc<dyn RelayDialer>, handshaker: Arc<dyn TargetHandshaker>) -> Self {
        Self { dialer, handshaker }
    }

    /// Run `plan` under `timeout`.
    pub async fn run(&self, plan: ExecutionPlan, timeout: Duration) -> ExecutionState {
        let plan = Arc::new(plan);
        let token = CancellationToken::new();
        // Cancels whatever attempt is still in flight once this returns
        let _cancel_on_exit = token.clone().drop_guard();
        let attempt_counter = AtomicU32::new(0);

        let retries = ConstantBuilder::default()
            .with_delay(Duration::ZERO)
            .with_max_times((MAX_EOF_ATTEMPTS - 1) as usize);

        let attempts = (|| async {
            let attempt = attempt_counter.fetch_add(1, Ordering::SeqCst) + 1;
            if attempt > 1 {
                warn!(
                    "Retrying command on node {} (attempt {} of {})",
                    plan.node_id, attempt, MAX_EOF_ATTEMPTS
                );
            }
            self.spawn_attempt(plan.clone(), token.clone(), attempt)
                .await
        })
        .retry(retries)
        .when(BridgeError::is_eof)
        .notify(|err, _| {
            debug!("Target handshake on node {} ended: {}", plan.node_id, err);
        });

        let outcome = tokio::time::timeout(timeout, attempts).await;
        let total_attempts = attempt_counter.load(Ordering::SeqCst);

        match outcome {
            Err(_) => {
                token.cancel();
                warn!(
                    "Command on node {} timed out after {:?} ({} attempt(s))",
                    plan.node_id, timeout, total_attempts
                );
                ExecutionState::TimedOut
            }
            Ok(Ok(output)) => {
                info!(
                    "Command on node {} succeeded after {} attempt(s), {} byte(s) of output",
                    plan.node_id,
                    total_attempts,
                    output.len()
                );
                ExecutionState::Succeeded(output)
            }
            Ok(Err(BridgeError::Timeout)) => ExecutionState::TimedOut,
            Ok(Err(err)) if err.is_eof() => {
                warn!(
                    "Target on node {} closed the handshake {} time(s)",
                    plan.node_id, total_attempts
                );
                ExecutionState::Failed(BridgeError::EofExhausted(total_attempts))
            }
            Ok(Err(err)) => {
                warn!("Command on node {} failed: {}", plan.node_id, err);
                ExecutionState::Failed(err)
            }
        }
    }

    async fn spawn_attempt(
        &self,
        plan: Arc<ExecutionPlan>,
        token: CancellationToken,
        attempt: u32,
    ) -> Result<Vec<u8>, BridgeError> {
        let (tx, rx) = oneshot::channel();
        let dialer = self.dialer.clone();
        let handshaker = self.handshaker.clone();

        tokio::spawn(async move {
            let result = run_attempt(dialer.as_ref(), handshaker.as_ref(), &plan, &token).await;
            if tx.send(result).is_err() {
                debug!(
                    "Discarding result of abandoned attempt {} on node {}",
                    attempt, plan.node_id
                );
            }
        });

        rx.await
            .map_err(|_| BridgeError::Internal("command attempt ended without a result".to_string()))?
    }
}

/// One dial plus target execution. The relay connection is closed on every
/// path that opened it, including cancellation.
async fn run_attempt(
    dialer: &dyn RelayDialer,
    handshaker: &dyn TargetHandshaker,
    plan: &ExecutionPlan,
    token: &CancellationToken,
) -> Result<Vec<u8>, BridgeError> {
    let tunnel = tokio::select! {
        _ = token.cancelled() => return Err(BridgeError::Timeout),
        tunnel = dialer.dial(&plan.relay, &plan.relay_config, plan.target_port) => tunnel?,
    };

    let (stream, link) = tunnel.into_parts();
    let result = tokio::select! {
        _ = token.cancelled() => Err(BridgeError::Timeout),
        result = handshaker.execute(stream, &plan.target_config, &plan.command) => result,
    };

    link.close().await;
    result
}
