//! DashMap-based in-process store.
//!
//! Latest reports, history, and relays are keyed for direct lookup. State is
//! lost on restart; a seed file can repopulate it at start-up.

use std::fs;
use std::path::Path;

use dashmap::DashMap;
use serde::Deserialize;
use tracing::info;

use crate::bridge::types::{ApiKey, Projection, Report, SshServer, UserSession};

use super::traits::{Store, StoreError};

/// Initial contents of a [`MemoryStore`], read from JSON.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Seed {
    pub api_keys: Vec<ApiKey>,
    pub ssh_servers: Vec<SshServer>,
    pub reports: Vec<Report>,
    pub sessions: Vec<UserSession>,
}

pub struct MemoryStore {
    api_keys: DashMap<String, ApiKey>,
    ssh_servers: DashMap<String, SshServer>,
    reports: DashMap<String, Report>,
    history: DashMap<String, Vec<Report>>,
    sessions: DashMap<String, UserSession>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            api_keys: DashMap::new(),
            ssh_servers: DashMap::new(),
            reports: DashMap::new(),
            history: DashMap::new(),
            sessions: DashMap::new(),
        }
    }

    /// Insert every entry of `seed`. Reports go through
    /// [`Store::put_report`], so they also start each node's history.
    pub fn apply_seed(&self, seed: Seed) -> Result<(), StoreError> {
        for api_key in seed.api_keys {
            self.put_api_key(api_key)?;
        }
        for server in seed.ssh_servers {
            self.put_ssh_server(server)?;
        }
        for report in seed.reports {
            self.put_report(report)?;
        }
        for session in seed.sessions {
            self.put_user_session(session)?;
        }
        Ok(())
    }

    /// Read a JSON seed file and apply it.
    pub fn load_seed_file(&self, path: impl AsRef<Path>) -> Result<(), StoreError> {
        let path = path.as_ref();
        let seed_error = |reason: String| StoreError::Seed {
            path: path.display().to_string(),
            reason,
        };

        let raw = fs::read_to_string(path).map_err(|e| seed_error(e.to_string()))?;
        let seed: Seed = serde_json::from_str(&raw).map_err(|e| seed_error(e.to_string()))?;

        info!(
            "Loading seed {}: {} api key(s), {} relay(s), {} report(s), {} session(s)",
            path.display(),
            seed.api_keys.len(),
            seed.ssh_servers.len(),
            seed.reports.len(),
            seed.sessions.len()
        );
        self.apply_seed(seed)
    }

    /// Latest reports passing `filter` and received within `minutes`,
    /// ordered by node id.
    fn latest_matching(&self, minutes: u32, filter: impl Fn(&Report) -> bool) -> Vec<Report> {
        let now = chrono::Utc::now().timestamp();
        let mut reports: Vec<Report> = self
            .reports
            .iter()
            .filter(|e| e.value().received_within(minutes, now) && filter(e.value()))
            .map(|e| e.value().clone())
            .collect();
        reports.sort_by(|a, b| a.id.cmp(&b.id));
        reports
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl Store for MemoryStore {
    fn validate_api_key(&self, key: &str, admin_only: bool) -> Result<bool, StoreError> {
        if key.is_empty() {
            return Ok(false);
        }
        Ok(self
            .api_keys
            .get(key)
            .is_some_and(|entry| !admin_only || entry.admin))
    }

    fn list_api_keys(&self) -> Result<Vec<ApiKey>, StoreError> {
        Ok(self.api_keys.iter().map(|e| e.value().clone()).collect())
    }

    fn put_api_key(&self, api_key: ApiKey) -> Result<(), StoreError> {
        self.api_keys.insert(api_key.key.clone(), api_key);
        Ok(())
    }

    fn list_ssh_servers(&self) -> Result<Vec<SshServer>, StoreError> {
        Ok(self.ssh_servers.iter().map(|e| e.value().clone()).collect())
    }

    fn get_ssh_server_by_host(&self, host: &str) -> Result<Option<SshServer>, StoreError> {
        Ok(self.ssh_servers.get(host).map(|e| e.value().clone()))
    }

    fn put_ssh_server(&self, server: SshServer) -> Result<(), StoreError> {
        self.ssh_servers.insert(server.host.clone(), server);
        Ok(())
    }

    fn put_report(&self, report: Report) -> Result<(), StoreError> {
        self.history
            .entry(report.id.clone())
            .or_default()
            .push(report.clone());
        self.reports.insert(report.id.clone(), report);
        Ok(())
    }

    fn count_reports(&self) -> Result<usize, StoreError> {
        Ok(self.reports.len())
    }

    fn list_reports(
        &self,
        skip: usize,
        limit: usize,
        minutes: u32,
        projection: Projection,
    ) -> Result<Vec<Report>, StoreError> {
        let page = self.latest_matching(minutes, |_| true).into_iter().skip(skip);
        let page: Vec<Report> = if limit > 0 {
            page.take(limit).collect()
        } else {
            page.collect()
        };
        Ok(page.into_iter().map(|r| r.project(projection)).collect())
    }

    fn list_reports_by_custom_id(
        &self,
        custom_id: &str,
        minutes: u32,
        projection: Projection,
    ) -> Result<Vec<Report>, StoreError> {
        Ok(self
            .latest_matching(minutes, |r| r.custom_id == custom_id)
            .into_iter()
            .map(|r| r.project(projection))
            .collect())
    }

    fn get_report_by_id(&self, id: &str) -> Result<Option<Report>, StoreError> {
        Ok(self.reports.get(id).map(|e| e.value().clone()))
    }

    fn delete_report(&self, id: &str) -> Result<(), StoreError> {
        self.reports.remove(id);
        Ok(())
    }

    fn list_history(&self, id: &str) -> Result<Vec<Report>, StoreError> {
        Ok(self
            .history
            .get(id)
            .map(|entries| entries.value().clone())
            .unwrap_or_default())
    }

    fn get_user_session(&self, id: &str) -> Result<Option<UserSession>, StoreError> {
        Ok(self.sessions.get(id).map(|e| e.value().clone()))
    }

    fn put_user_session(&self, session: UserSession) -> Result<(), StoreError> {
        self.sessions.insert(session.id.clone(), session);
        Ok(())
    }

    fn delete_user_session(&self, id: &str) -> Result<(), StoreError> {
        self.sessions.remove(id);
        Ok(())
    }
}
