//! Private key SSH authentication from in-memory key material.

use std::sync::Arc;

use async_trait::async_trait;
use russh::{client, keys};
use tracing::debug;

use crate::bridge::session::SshClientHandler;

use super::traits::AuthStrategy;

/// Public key authentication with a key decoded up front.
///
/// Decoding happens when the strategy is created, so a malformed key is
/// reported before any connection is opened.
pub struct KeyAuth {
    key: Arc<keys::PrivateKey>,
}

impl KeyAuth {
    /// Decode a PEM or OpenSSH encoded, passphrase-less private key.
    pub fn from_pem(pem: &str) -> Result<Self, keys::Error> {
        let key = keys::decode_secret_key(pem.trim(), None)?;
        Ok(Self { key: Arc::new(key) })
    }
}

#[async_trait]
impl AuthStrategy for KeyAuth {
    async fn authenticate(
        &self,
        handle: &mut client::Handle<SshClientHandler>,
        username: &str,
    ) -> Result<bool, String> {
        // For RSA keys, use the best supported hash algorithm
        let hash_alg = handle
            .best_supported_rsa_hash()
            .await
            .ok()
            .flatten()
            .flatten();
        debug!("Using RSA hash algorithm for key auth: {:?}", hash_alg);

        let key_with_hash = keys::PrivateKeyWithHashAlg::new(self.key.clone(), hash_alg);

        handle
            .authenticate_publickey(username, key_with_hash)
            .await
            .map(|outcome| outcome.success())
            .map_err(|e| e.to_string())
    }

    fn name(&self) -> &'static str {
        "key"
    }
}
