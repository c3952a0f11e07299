//! Authentication for the relay and target SSH hops.
//!
//! Both hops authenticate the same way: an optional private key followed by
//! an optional password, tried in that order. [`ConnectionConfig::build`]
//! turns a `(user, key, password)` triple into a ready-to-use configuration
//! and is the only place key material is decoded.

mod chain;
mod key;
mod password;
mod traits;

pub use chain::AuthChain;
pub use key::KeyAuth;
pub use password::PasswordAuth;
pub use traits::AuthStrategy;

use russh::client;
use tracing::debug;

use crate::bridge::error::BridgeError;
use crate::bridge::session::SshClientHandler;

/// User plus authentication methods for one SSH hop.
pub struct ConnectionConfig {
    user: String,
    auth: AuthChain,
}

impl ConnectionConfig {
    /// Build a configuration for `user`.
    ///
    /// A non-empty `private_key_pem` must decode, otherwise
    /// [`BridgeError::InvalidKey`] is returned. A non-empty `password` adds
    /// password authentication after the key. Having neither is allowed
    /// here; the login then fails when it is attempted.
    pub fn build(user: &str, private_key_pem: &str, password: &str) -> Result<Self, BridgeError> {
        let mut auth = AuthChain::new();

        if !private_key_pem.trim().is_empty() {
            let key = KeyAuth::from_pem(private_key_pem).map_err(|e| {
                debug!("Rejected private key for {}: {}", user, e);
                BridgeError::InvalidKey
            })?;
            auth = auth.with_key(key);
        }

        if !password.is_empty() {
            auth = auth.with_password(password);
        }

        Ok(Self {
            user: user.to_string(),
            auth,
        })
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    /// Names of the configured methods, in the order they are tried.
    pub fn methods(&self) -> Vec<&'static str> {
        self.auth.strategy_names()
    }

    /// Authenticate an established connection as this configuration's user.
    pub(crate) async fn authenticate(
        &self,
        handle: &mut client::Handle<SshClientHandler>,
    ) -> Result<(), String> {
        if self.auth.authenticate(handle, &self.user).await? {
            Ok(())
        } else {
            Err(format!("permission denied for {}", self.user))
        }
    }
}

impl std::fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("user", &self.user)
            .field("methods", &self.methods())
            .finish()
    }
}
