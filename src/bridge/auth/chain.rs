//! Ordered fallback across authentication methods.

use async_trait::async_trait;
use russh::client;
use tracing::debug;

use crate::bridge::session::SshClientHandler;

use super::traits::AuthStrategy;
use super::{KeyAuth, PasswordAuth};

/// Tries each method in turn until the server accepts one.
///
/// A rejection moves on to the next method. A transport error ends the
/// chain at once and is returned as is: the connection is gone, and the
/// error text is what the EOF classifier inspects.
pub struct AuthChain {
    methods: Vec<Box<dyn AuthStrategy>>,
}

impl AuthChain {
    pub fn new() -> Self {
        Self {
            methods: Vec::new(),
        }
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.methods.push(Box::new(PasswordAuth::new(password)));
        self
    }

    pub fn with_key(mut self, key: KeyAuth) -> Self {
        self.methods.push(Box::new(key));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }

    pub fn strategy_names(&self) -> Vec<&'static str> {
        self.methods.iter().map(|m| m.name()).collect()
    }
}

impl Default for AuthChain {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AuthStrategy for AuthChain {
    async fn authenticate(
        &self,
        handle: &mut client::Handle<SshClientHandler>,
        username: &str,
    ) -> Result<bool, String> {
        if self.methods.is_empty() {
            return Err(format!("no key or password given for {}", username));
        }

        let mut rejected = Vec::with_capacity(self.methods.len());
        for method in &self.methods {
            if method.authenticate(handle, username).await? {
                debug!("{} accepted by {} login", username, method.name());
                return Ok(true);
            }
            debug!("{} login rejected for {}", method.name(), username);
            rejected.push(method.name());
        }

        Err(format!(
            "permission denied for {} (tried {})",
            username,
            rejected.join(", ")
        ))
    }

    fn name(&self) -> &'static str {
        "chain"
    }
}
