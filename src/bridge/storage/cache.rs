//! Read-through caches in front of a [`Store`].
//!
//! API keys and relay registrations are read on every request but change
//! rarely. `CachedStore` keeps both in memory:
//!
//! - **API keys**: only keys that validated are remembered, separately for
//!   regular and admin checks. A rejected key is always re-checked, so a key
//!   added to the backend starts working immediately.
//! - **Relays**: the full list is loaded on first use and kept current by
//!   writes that go through this wrapper. A cache miss falls back to the
//!   backend for relays registered elsewhere.
//!
//! Everything else is delegated unchanged.

use std::sync::atomic::{AtomicBool, Ordering};

use dashmap::{DashMap, DashSet};
use tracing::debug;

use crate::bridge::types::{ApiKey, Projection, Report, SshServer, UserSession};

use super::traits::{Store, StoreError};

pub struct CachedStore<S> {
    inner: S,
    known_keys: DashSet<String>,
    known_admin_keys: DashSet<String>,
    relays: DashMap<String, SshServer>,
    relays_loaded: AtomicBool,
}

impl<S: Store> CachedStore<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            known_keys: DashSet::new(),
            known_admin_keys: DashSet::new(),
            relays: DashMap::new(),
            relays_loaded: AtomicBool::new(false),
        }
    }

    fn load_relays(&self) -> Result<(), StoreError> {
        if self.relays_loaded.load(Ordering::Acquire) {
            return Ok(());
        }
        let servers = self.inner.list_ssh_servers()?;
        debug!("Cached {} relay registration(s)", servers.len());
        for server in servers {
            self.relays.insert(server.host.clone(), server);
        }
        self.relays_loaded.store(true, Ordering::Release);
        Ok(())
    }
}

impl<S: Store> Store for CachedStore<S> {
    fn validate_api_key(&self, key: &str, admin_only: bool) -> Result<bool, StoreError> {
        let cache = if admin_only {
            &self.known_admin_keys
        } else {
            &self.known_keys
        };
        if cache.contains(key) {
            return Ok(true);
        }

        let valid = self.inner.validate_api_key(key, admin_only)?;
        if valid {
            cache.insert(key.to_string());
        }
        Ok(valid)
    }

    fn list_api_keys(&self) -> Result<Vec<ApiKey>, StoreError> {
        self.inner.list_api_keys()
    }

    fn put_api_key(&self, api_key: ApiKey) -> Result<(), StoreError> {
        // A demoted or replaced key must be validated again
        self.known_keys.remove(&api_key.key);
        self.known_admin_keys.remove(&api_key.key);
        self.inner.put_api_key(api_key)
    }

    fn list_ssh_servers(&self) -> Result<Vec<SshServer>, StoreError> {
        self.load_relays()?;
        Ok(self.relays.iter().map(|e| e.value().clone()).collect())
    }

    fn get_ssh_server_by_host(&self, host: &str) -> Result<Option<SshServer>, StoreError> {
        self.load_relays()?;
        if let Some(server) = self.relays.get(host) {
            return Ok(Some(server.value().clone()));
        }

        let found = self.inner.get_ssh_server_by_host(host)?;
        if let Some(server) = &found {
            self.relays.insert(server.host.clone(), server.clone());
        }
        Ok(found)
    }

    fn put_ssh_server(&self, server: SshServer) -> Result<(), StoreError> {
        self.inner.put_ssh_server(server.clone())?;
        self.relays.insert(server.host.clone(), server);
        Ok(())
    }

    fn put_report(&self, report: Report) -> Result<(), StoreError> {
        self.inner.put_report(report)
    }

    fn count_reports(&self) -> Result<usize, StoreError> {
        self.inner.count_reports()
    }

    fn list_reports(
        &self,
        skip: usize,
        limit: usize,
        minutes: u32,
        projection: Projection,
    ) -> Result<Vec<Report>, StoreError> {
        self.inner.list_reports(skip, limit, minutes, projection)
    }

    fn list_reports_by_custom_id(
        &self,
        custom_id: &str,
        minutes: u32,
        projection: Projection,
    ) -> Result<Vec<Report>, StoreError> {
        self.inner
            .list_reports_by_custom_id(custom_id, minutes, projection)
    }

    fn get_report_by_id(&self, id: &str) -> Result<Option<Report>, StoreError> {
        self.inner.get_report_by_id(id)
    }

    fn delete_report(&self, id: &str) -> Result<(), StoreError> {
        self.inner.delete_report(id)
    }

    fn list_history(&self, id: &str) -> Result<Vec<Report>, StoreError> {
        self.inner.list_history(id)
    }

    fn get_user_session(&self, id: &str) -> Result<Option<UserSession>, StoreError> {
        self.inner.get_user_session(id)
    }

    fn put_user_session(&self, session: UserSession) -> Result<(), StoreError> {
        self.inner.put_user_session(session)
    }

    fn delete_user_session(&self, id: &str) -> Result<(), StoreError> {
        self.inner.delete_user_session(id)
    }
}
