//! Password login.

use async_trait::async_trait;
use russh::client;

use crate::bridge::session::SshClientHandler;

use super::traits::AuthStrategy;

pub struct PasswordAuth {
    secret: String,
}

impl PasswordAuth {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
        }
    }
}

impl std::fmt::Debug for PasswordAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("PasswordAuth(***)")
    }
}

#[async_trait]
impl AuthStrategy for PasswordAuth {
    async fn authenticate(
        &self,
        handle: &mut client::Handle<SshClientHandler>,
        username: &str,
    ) -> Result<bool, String> {
        handle
            .authenticate_password(username, self.secret.as_str())
            .await
            .map(|outcome| outcome.success())
            .map_err(|e| e.to_string())
    }

    fn name(&self) -> &'static str {
        "password"
    }
}
