//! Network-free stand-ins for the relay and target hops.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::bridge::auth::ConnectionConfig;
use crate::bridge::client::{RelayDialer, RelayLink, TargetHandshaker, Tunnel, TunnelStream};
use crate::bridge::error::BridgeError;
use crate::bridge::supervisor::ExecutionPlan;
use crate::bridge::types::SshServer;

#[derive(Debug, Clone, Copy)]
pub(crate) enum DialMode {
    /// Hand out an in-memory tunnel
    Connect,
    /// Fail as an unreachable relay
    Fail,
    /// Never complete
    Hang,
}

/// Records every dial and every relay close.
pub(crate) struct RecordingDialer {
    mode: DialMode,
    dials: AtomicU32,
    closes: Arc<AtomicU32>,
    ports: Mutex<Vec<u16>>,
    relays: Mutex<Vec<String>>,
}

impl RecordingDialer {
    pub(crate) fn new(mode: DialMode) -> Self {
        Self {
            mode,
            dials: AtomicU32::new(0),
            closes: Arc::new(AtomicU32::new(0)),
            ports: Mutex::new(Vec::new()),
            relays: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn dials(&self) -> u32 {
        self.dials.load(Ordering::SeqCst)
    }

    pub(crate) fn closes(&self) -> u32 {
        self.closes.load(Ordering::SeqCst)
    }

    pub(crate) fn ports(&self) -> Vec<u16> {
        self.ports.lock().unwrap().clone()
    }

    pub(crate) fn relays(&self) -> Vec<String> {
        self.relays.lock().unwrap().clone()
    }
}

struct CountingLink(Arc<AtomicU32>);

#[async_trait]
impl RelayLink for CountingLink {
    async fn close(self: Box<Self>) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl RelayDialer for RecordingDialer {
    async fn dial(
        &self,
        relay: &SshServer,
        _config: &ConnectionConfig,
        target_port: u16,
    ) -> Result<Tunnel, BridgeError> {
        self.dials.fetch_add(1, Ordering::SeqCst);
        self.ports.lock().unwrap().push(target_port);
        self.relays.lock().unwrap().push(relay.host.clone());

        match self.mode {
            DialMode::Connect => {
                let (near, _far) = tokio::io::duplex(1024);
                Ok(Tunnel::new(near, CountingLink(self.closes.clone())))
            }
            DialMode::Fail => Err(BridgeError::RelayUnavailable {
                host: relay.host.clone(),
                reason: "Failed to connect: Connection refused (os error 111)".to_string(),
            }),
            DialMode::Hang => std::future::pending().await,
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) enum Step {
    Eof,
    Ok(Vec<u8>),
    Fail(String),
    Hang,
}

/// Plays back one scripted step per call.
pub(crate) struct ScriptedHandshaker {
    steps: Mutex<VecDeque<Step>>,
    calls: AtomicU32,
    commands: Mutex<Vec<(String, String)>>,
}

impl ScriptedHandshaker {
    pub(crate) fn new(steps: Vec<Step>) -> Self {
        Self {
            steps: Mutex::new(steps.into()),
            calls: AtomicU32::new(0),
            commands: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    /// `(user, command)` of every call.
    pub(crate) fn commands(&self) -> Vec<(String, String)> {
        self.commands.lock().unwrap().clone()
    }
}

#[async_trait]
impl TargetHandshaker for ScriptedHandshaker {
    async fn execute(
        &self,
        _stream: Box<dyn TunnelStream>,
        config: &ConnectionConfig,
        command: &str,
    ) -> Result<Vec<u8>, BridgeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.commands
            .lock()
            .unwrap()
            .push((config.user().to_string(), command.to_string()));

        let step = self.steps.lock().unwrap().pop_front();
        match step {
            Some(Step::Eof) => Err(BridgeError::HandshakeEof),
            Some(Step::Ok(output)) => Ok(output),
            Some(Step::Fail(message)) => Err(BridgeError::Execution(message)),
            Some(Step::Hang) => std::future::pending().await,
            None => Err(BridgeError::Execution("no scripted step left".to_string())),
        }
    }
}

pub(crate) fn relay(host: &str) -> SshServer {
    SshServer {
        host: host.to_string(),
        port: 22,
        user: "tunnel".to_string(),
        password: "relay-secret".to_string(),
        ..Default::default()
    }
}

/// A plan for `uptime` on node `aa` through `relay1`.
pub(crate) fn plan(target_port: u16) -> ExecutionPlan {
    let relay = relay("relay1");
    let relay_config = ConnectionConfig::build(&relay.user, "", &relay.password).unwrap();
    ExecutionPlan {
        node_id: "aa".to_string(),
        relay,
        relay_config,
        target_port,
        target_config: ConnectionConfig::build("alice", "", "secret").unwrap(),
        command: "uptime".to_string(),
    }
}
