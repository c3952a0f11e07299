//! The seam every login method plugs into.

use async_trait::async_trait;
use russh::client;

use crate::bridge::session::SshClientHandler;

/// One way of proving identity to an SSH server.
///
/// `Ok(false)` means the server said no and another method may be tried.
/// `Err` carries the transport failure text unchanged; callers classify it.
#[async_trait]
pub trait AuthStrategy: Send + Sync {
    async fn authenticate(
        &self,
        handle: &mut client::Handle<SshClientHandler>,
        username: &str,
    ) -> Result<bool, String>;

    /// Short label used in logs and error messages.
    fn name(&self) -> &'static str;
}
