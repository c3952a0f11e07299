//! Serializable entities shared by storage and the HTTP layer.
//!
//! Only the report fields the command bridge relies on are modeled
//! explicitly. Everything else an agent sends is kept verbatim in
//! [`Report::telemetry`] so it survives storage round-trips.

use serde::{Deserialize, Serialize};

/// Latest status report of a node.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Report {
    /// MAC address of the node
    pub id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub custom_id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub hostname: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub agent_version: String,
    /// Relay host the node is currently tunneled through
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub ssh_server_host: String,
    /// Port on the relay where the node's reverse tunnel listens
    #[serde(default)]
    pub ssh_remote_port: i64,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub ssh_connect_time: i64,

    // Server-side injected fields
    #[serde(default, rename = "ip_global", skip_serializing_if = "String::is_empty")]
    pub global_ip: String,
    #[serde(default, rename = "host_global", skip_serializing_if = "String::is_empty")]
    pub global_host: String,
    #[serde(default)]
    pub server_time: i64,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub api_key: String,

    /// Remaining agent telemetry, stored as received
    #[serde(flatten)]
    pub telemetry: serde_json::Map<String, serde_json::Value>,
}

fn is_zero(value: &i64) -> bool {
    *value == 0
}

impl Report {
    /// Port of the live reverse tunnel, or `None` when the node has none.
    pub fn tunnel_port(&self) -> Option<u16> {
        if self.ssh_remote_port < 1 {
            return None;
        }
        u16::try_from(self.ssh_remote_port).ok()
    }

    /// Whether the server received this report within `minutes` of `now`
    /// (UTC seconds). Zero minutes matches every report.
    pub fn received_within(&self, minutes: u32, now: i64) -> bool {
        minutes == 0 || self.server_time >= now - i64::from(minutes) * 60
    }

    /// Drop every field `projection` does not select.
    pub fn project(self, projection: Projection) -> Self {
        let telemetry = |keys: &[&str]| {
            self.telemetry
                .iter()
                .filter(|(key, _)| keys.contains(&key.as_str()))
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect()
        };

        match projection {
            Projection::All => self,
            Projection::Id => Report {
                telemetry: telemetry(ID_TELEMETRY),
                id: self.id,
                custom_id: self.custom_id,
                server_time: self.server_time,
                ..Default::default()
            },
            Projection::ListView => Report {
                telemetry: telemetry(LIST_VIEW_TELEMETRY),
                id: self.id,
                custom_id: self.custom_id,
                hostname: self.hostname,
                agent_version: self.agent_version,
                ssh_server_host: self.ssh_server_host,
                ssh_remote_port: self.ssh_remote_port,
                global_ip: self.global_ip,
                global_host: self.global_host,
                server_time: self.server_time,
                ..Default::default()
            },
        }
    }
}

const ID_TELEMETRY: &[&str] = &["success"];
const LIST_VIEW_TELEMETRY: &[&str] = &["ip4_local", "ip6_local", "seq", "success", "errors"];

/// Field selection for report listings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Projection {
    #[default]
    All,
    /// Identity and receive time only
    Id,
    /// Fields shown in the node list
    ListView,
}

impl Projection {
    /// Parse the `projection` query value. Unknown values select all fields.
    pub fn from_param(value: &str) -> Self {
        match value.trim() {
            "id" => Projection::Id,
            "list-view" => Projection::ListView,
            _ => Projection::All,
        }
    }
}

/// Relay SSH server registration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SshServer {
    pub host: String,
    pub port: u16,
    pub user: String,
    /// Private key in PEM/OpenSSH format
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub key: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub password: String,
}

impl SshServer {
    /// Format the address as `host:port`.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiKey {
    pub key: String,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub admin: bool,
}

/// Browser session created by the login flow.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSession {
    pub id: String,
    #[serde(default)]
    pub user: String,
    /// Expiry as UTC seconds; zero never expires
    #[serde(default)]
    pub expires_at: i64,
}

impl UserSession {
    pub fn is_logged_in(&self, now: i64) -> bool {
        !self.user.is_empty() && (self.expires_at == 0 || self.expires_at > now)
    }
}

/// Relay connection info returned to an agent after it reports.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayReply {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub ssh_host: String,
    #[serde(default, skip_serializing_if = "is_zero_port")]
    pub ssh_port: u16,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub ssh_user: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub ssh_key: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub ssh_password: String,
}

fn is_zero_port(port: &u16) -> bool {
    *port == 0
}

impl From<&SshServer> for RelayReply {
    fn from(server: &SshServer) -> Self {
        Self {
            ssh_host: server.host.clone(),
            ssh_port: server.port,
            ssh_user: server.user.clone(),
            ssh_key: server.key.clone(),
            ssh_password: server.password.clone(),
        }
    }
}
