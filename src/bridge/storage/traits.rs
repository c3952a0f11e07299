//! Storage trait definitions for the fleet relay.
//!
//! Handlers only see [`Store`], so tests and alternative backends can be
//! swapped in without touching the HTTP layer.

use thiserror::Error;

use crate::bridge::types::{ApiKey, Projection, Report, SshServer, UserSession};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    #[error("failed to load seed file {path}: {reason}")]
    Seed { path: String, reason: String },
}

/// Persistent state of the fleet relay.
///
/// Implementations must be thread-safe (`Send + Sync`) for use across
/// async tasks. Lookups return `Ok(None)` when nothing matches; `Err` is
/// reserved for the backend itself failing.
pub trait Store: Send + Sync {
    /// Check an API key. With `admin_only`, non-admin keys are rejected.
    fn validate_api_key(&self, key: &str, admin_only: bool) -> Result<bool, StoreError>;

    fn list_api_keys(&self) -> Result<Vec<ApiKey>, StoreError>;

    fn put_api_key(&self, api_key: ApiKey) -> Result<(), StoreError>;

    fn list_ssh_servers(&self) -> Result<Vec<SshServer>, StoreError>;

    /// Find a relay registration by its host name.
    fn get_ssh_server_by_host(&self, host: &str) -> Result<Option<SshServer>, StoreError>;

    /// Insert or replace the relay registered under `server.host`.
    fn put_ssh_server(&self, server: SshServer) -> Result<(), StoreError>;

    /// Replace the node's latest report and append it to its history.
    fn put_report(&self, report: Report) -> Result<(), StoreError>;

    fn count_reports(&self) -> Result<usize, StoreError>;

    /// Latest reports ordered by node id. A `limit` of zero means no limit;
    /// a non-zero `minutes` keeps only reports received that recently.
    fn list_reports(
        &self,
        skip: usize,
        limit: usize,
        minutes: u32,
        projection: Projection,
    ) -> Result<Vec<Report>, StoreError>;

    /// Latest reports of the nodes carrying `custom_id`, ordered by node id.
    fn list_reports_by_custom_id(
        &self,
        custom_id: &str,
        minutes: u32,
        projection: Projection,
    ) -> Result<Vec<Report>, StoreError>;

    fn get_report_by_id(&self, id: &str) -> Result<Option<Report>, StoreError>;

    /// Remove a node's latest report. Its history is kept.
    fn delete_report(&self, id: &str) -> Result<(), StoreError>;

    /// Every report a node has sent, oldest first.
    fn list_history(&self, id: &str) -> Result<Vec<Report>, StoreError>;

    fn get_user_session(&self, id: &str) -> Result<Option<UserSession>, StoreError>;

    fn put_user_session(&self, session: UserSession) -> Result<(), StoreError>;

    fn delete_user_session(&self, id: &str) -> Result<(), StoreError>;
}
