//! russh client handler shared by the relay and target hops.
//!
//! # Host key policy
//!
//! `SshClientHandler` accepts every server host key, on both hops. Relays
//! are operator-controlled machines reached over known network paths, and
//! the target's SSH responder is only reachable through the reverse tunnel
//! the node itself opened on the relay, so the bridge trusts the network
//! topology rather than host keys. This is an accepted trade-off: a party
//! able to impersonate a relay, or to bind a node's tunnel port on it, can
//! observe commands and the credentials sent with them.

use russh::{client, keys};
use tracing::debug;

pub struct SshClientHandler;

impl client::Handler for SshClientHandler {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        server_public_key: &keys::PublicKey,
    ) -> Result<bool, Self::Error> {
        debug!(
            "Accepting server host key ({})",
            server_public_key.algorithm().as_str()
        );
        Ok(true)
    }
}
