//! SSH hops of the command bridge.
//!
//! A command reaches a node in two hops:
//!
//! 1. **Relay hop** ([`RelayDialer`]): an SSH connection to the relay using
//!    the relay's own credentials, then a `direct-tcpip` channel from the
//!    relay to `localhost:<port>`, where the node's reverse tunnel listens.
//!    The channel is handed out as a byte stream inside a [`Tunnel`].
//!
//! 2. **Target hop** ([`TargetHandshaker`]): a second, independent SSH
//!    session negotiated *over* that byte stream, authenticated with the
//!    caller's credentials for the node. One session channel runs the
//!    command and its stdout and stderr are captured into one buffer.
//!
//! Both hops sit behind traits so the supervisor can be exercised without a
//! network.
//!
//! ## Connection ownership
//!
//! The relay connection lives in the tunnel's [`RelayLink`], which the
//! caller must close once the target hop is finished. The target connection
//! is opened and closed inside [`TargetHandshaker::execute`]. If a hop is
//! cancelled mid-flight, dropping its russh handle tears the session down.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use russh::{ChannelMsg, Disconnect, client};
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, warn};

use crate::bridge::auth::ConnectionConfig;
use crate::bridge::error::{BridgeError, classify_handshake_error, classify_russh_handshake};
use crate::bridge::session::SshClientHandler;
use crate::bridge::types::SshServer;

/// Host the relay connects to for a node's reverse tunnel.
pub(crate) const TUNNEL_HOST: &str = "localhost";

/// Originator address reported in `direct-tcpip` requests.
const ORIGINATOR_ADDRESS: &str = "127.0.0.1";

/// Build russh client configuration for either hop.
///
/// Keepalives detect dead relays and tunnels; the overall deadline is
/// enforced by the supervisor, so no inactivity timeout is set.
pub fn build_client_config(keepalive: Duration, compress: bool) -> Arc<client::Config> {
    let compression = if compress {
        (&[russh::compression::ZLIB, russh::compression::NONE][..]).into()
    } else {
        (&[russh::compression::NONE][..]).into()
    };

    let preferred = russh::Preferred {
        compression,
        ..Default::default()
    };

    Arc::new(client::Config {
        inactivity_timeout: None,
        keepalive_interval: Some(keepalive),
        keepalive_max: 3,
        preferred,
        ..Default::default()
    })
}

/// Byte stream carried through a relay.
pub trait TunnelStream: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T> TunnelStream for T where T: AsyncRead + AsyncWrite + Unpin + Send {}

/// The relay-side connection that keeps a tunnel open.
#[async_trait]
pub trait RelayLink: Send {
    /// Close the relay connection. Errors are logged, never returned.
    async fn close(self: Box<Self>);
}

/// A live stream to a node's reverse tunnel plus the relay connection
/// carrying it.
pub struct Tunnel {
    stream: Box<dyn TunnelStream>,
    link: Box<dyn RelayLink>,
}

impl Tunnel {
    pub fn new(stream: impl TunnelStream + 'static, link: impl RelayLink + 'static) -> Self {
        Self {
            stream: Box::new(stream),
            link: Box::new(link),
        }
    }

    pub fn into_parts(self) -> (Box<dyn TunnelStream>, Box<dyn RelayLink>) {
        (self.stream, self.link)
    }
}

/// Opens tunnels to nodes through relay servers.
#[async_trait]
pub trait RelayDialer: Send + Sync {
    /// Connect to `relay` and open a channel to `localhost:<target_port>`
    /// on it.
    ///
    /// # Errors
    ///
    /// * [`BridgeError::RelayUnavailable`] - the relay is unreachable or
    ///   rejected the login
    /// * [`BridgeError::TargetUnavailable`] - nothing accepted the channel
    ///   on the relay's side
    async fn dial(
        &self,
        relay: &SshServer,
        config: &ConnectionConfig,
        target_port: u16,
    ) -> Result<Tunnel, BridgeError>;
}

/// Runs one command on a node over an established tunnel.
#[async_trait]
pub trait TargetHandshaker: Send + Sync {
    /// Negotiate SSH over `stream`, run `command`, and return its combined
    /// stdout and stderr.
    ///
    /// # Errors
    ///
    /// * [`BridgeError::HandshakeEof`] - the node closed the stream during
    ///   the handshake (transient)
    /// * [`BridgeError::Handshake`] - any other handshake or login failure
    /// * [`BridgeError::Execution`] - the session, the command, or its exit
    ///   status failed
    async fn execute(
        &self,
        stream: Box<dyn TunnelStream>,
        config: &ConnectionConfig,
        command: &str,
    ) -> Result<Vec<u8>, BridgeError>;
}

async fn close_handle(handle: &client::Handle<SshClientHandler>, name: &str) {
    if let Err(e) = handle
        .disconnect(Disconnect::ByApplication, "", "en")
        .await
    {
        debug!("Failed to close {} connection: {}", name, e);
    }
}

/// [`RelayDialer`] backed by russh.
pub struct SshRelayDialer {
    config: Arc<client::Config>,
}

impl SshRelayDialer {
    pub fn new(config: Arc<client::Config>) -> Self {
        Self { config }
    }
}

struct SshRelayLink {
    handle: client::Handle<SshClientHandler>,
    host: String,
}

#[async_trait]
impl RelayLink for SshRelayLink {
    async fn close(self: Box<Self>) {
        debug!("Closing relay connection to {}", self.host);
        close_handle(&self.handle, "ssh server").await;
    }
}

#[async_trait]
impl RelayDialer for SshRelayDialer {
    async fn dial(
        &self,
        relay: &SshServer,
        config: &ConnectionConfig,
        target_port: u16,
    ) -> Result<Tunnel, BridgeError> {
        let relay_unavailable = |reason: String| BridgeError::RelayUnavailable {
            host: relay.host.clone(),
            reason,
        };

        debug!("Connecting to relay {} as {}", relay.addr(), config.user());
        let mut handle = client::connect(
            self.config.clone(),
            (relay.host.as_str(), relay.port),
            SshClientHandler,
        )
        .await
        .map_err(|e| relay_unavailable(format!("Failed to connect: {}", e)))?;

        if let Err(e) = config.authenticate(&mut handle).await {
            close_handle(&handle, "ssh server").await;
            return Err(relay_unavailable(e));
        }

        let channel = match handle
            .channel_open_direct_tcpip(TUNNEL_HOST, u32::from(target_port), ORIGINATOR_ADDRESS, 0)
            .await
        {
            Ok(channel) => channel,
            Err(e) => {
                close_handle(&handle, "ssh server").await;
                return Err(BridgeError::TargetUnavailable {
                    port: target_port,
                    reason: e.to_string(),
                });
            }
        };

        debug!(
            "Opened tunnel to {}:{} through {}",
            TUNNEL_HOST,
            target_port,
            relay.addr()
        );
        Ok(Tunnel::new(
            channel.into_stream(),
            SshRelayLink {
                handle,
                host: relay.host.clone(),
            },
        ))
    }
}

/// [`TargetHandshaker`] backed by russh.
pub struct SshTargetHandshaker {
    config: Arc<client::Config>,
}

impl SshTargetHandshaker {
    pub fn new(config: Arc<client::Config>) -> Self {
        Self { config }
    }
}

#[async_trait]
impl TargetHandshaker for SshTargetHandshaker {
    async fn execute(
        &self,
        stream: Box<dyn TunnelStream>,
        config: &ConnectionConfig,
        command: &str,
    ) -> Result<Vec<u8>, BridgeError> {
        let mut handle = client::connect_stream(self.config.clone(), stream, SshClientHandler)
            .await
            .map_err(|e| classify_russh_handshake(&e))?;

        if let Err(e) = config.authenticate(&mut handle).await {
            close_handle(&handle, "ssh target").await;
            return Err(classify_handshake_error(&e));
        }

        let result = run_command(&handle, command).await;
        close_handle(&handle, "ssh target").await;
        result
    }
}

/// How a remote command ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum CommandExit {
    Status(u32),
    Signal(String),
    Missing,
}

/// Execute `command` on a fresh session channel and collect its output.
async fn run_command(
    handle: &client::Handle<SshClientHandler>,
    command: &str,
) -> Result<Vec<u8>, BridgeError> {
    let mut channel = handle
        .channel_open_session()
        .await
        .map_err(|e| BridgeError::Execution(format!("failed to create ssh session: {}", e)))?;

    channel
        .exec(true, command)
        .await
        .map_err(|e| BridgeError::Execution(format!("failed to submit ssh command: {}", e)))?;

    let mut output = Vec::with_capacity(4096);
    let mut exit = CommandExit::Missing;

    loop {
        match channel.wait().await {
            // stdout and stderr share one buffer, in arrival order
            Some(ChannelMsg::Data { data }) => {
                output.extend_from_slice(&data);
            }
            Some(ChannelMsg::ExtendedData { data, .. }) => {
                output.extend_from_slice(&data);
            }
            Some(ChannelMsg::ExitStatus { exit_status }) => {
                exit = CommandExit::Status(exit_status);
            }
            Some(ChannelMsg::ExitSignal { signal_name, .. }) => {
                exit = CommandExit::Signal(format!("{:?}", signal_name));
            }
            Some(ChannelMsg::Eof) => {
                // Continue to wait for exit status if not received yet
                if exit != CommandExit::Missing {
                    break;
                }
            }
            Some(ChannelMsg::Close) | None => break,
            Some(_) => {}
        }
    }

    if let Err(e) = channel.close().await {
        debug!("Failed to close session channel: {}", e);
    }

    interpret_exit(output, exit)
}

/// Turn collected output and exit information into the command result.
///
/// Output of a failed command is discarded; only the failure is reported.
pub(crate) fn interpret_exit(output: Vec<u8>, exit: CommandExit) -> Result<Vec<u8>, BridgeError> {
    match exit {
        CommandExit::Status(0) => Ok(output),
        CommandExit::Status(code) => {
            warn!("Remote command exited with status {}", code);
            Err(BridgeError::Execution(format!(
                "failed to submit ssh command: Process exited with status {}",
                code
            )))
        }
        CommandExit::Signal(signal) => Err(BridgeError::Execution(format!(
            "failed to submit ssh command: Process exited with signal {}",
            signal
        ))),
        CommandExit::Missing => Err(BridgeError::Execution(
            "failed to submit ssh command: remote command exited without exit status or exit signal"
                .to_string(),
        )),
    }
}
