//! Request and response types for the Consul HTTP API.
//!
//! Field names follow the agent's PascalCase wire format.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::blocking::BlockingQueryOptions;

/// Base64 (de)serialization for `Value`/`Payload` fields, which the agent
/// sends as a base64 string or `null`.
mod base64_bytes {
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<Vec<u8>>, s: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(bytes) => s.serialize_str(&STANDARD.encode(bytes)),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Vec<u8>>, D::Error> {
        let raw: Option<String> = Option::deserialize(d)?;
        raw.map(|s| STANDARD.decode(s).map_err(serde::de::Error::custom))
            .transpose()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Key/Value
// ─────────────────────────────────────────────────────────────────────────────

/// A key/value entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct KeyValue {
    /// Full key path.
    pub key: String,
    /// Decoded value bytes; `None` for a key with a null value.
    #[serde(default, with = "base64_bytes")]
    pub value: Option<Vec<u8>>,
    /// Opaque client flags.
    #[serde(default)]
    pub flags: u64,
    /// Index at which the key was created.
    #[serde(default)]
    pub create_index: u64,
    /// Index of the last modification.
    #[serde(default)]
    pub modify_index: u64,
    /// Number of times the key's lock has been acquired.
    #[serde(default)]
    pub lock_index: u64,
    /// Session holding the lock, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session: Option<String>,
}

impl KeyValue {
    /// Value as UTF-8, if present and valid.
    pub fn value_str(&self) -> Option<&str> {
        self.value
            .as_deref()
            .and_then(|v| std::str::from_utf8(v).ok())
    }
}

/// Options for writing a key.
#[derive(Debug, Clone, Default)]
pub struct KvPutOptions {
    /// Opaque client flags stored with the key.
    pub flags: Option<u64>,
    /// Check-and-set: only write if the key's modify index matches.
    pub cas: Option<u64>,
    /// Acquire the key's lock with this session.
    pub acquire: Option<String>,
    /// Release the key's lock held by this session.
    pub release: Option<String>,
}

impl KvPutOptions {
    pub(crate) fn query(&self) -> Vec<(String, String)> {
        let mut query = Vec::new();
        if let Some(flags) = self.flags {
            query.push(("flags".to_string(), flags.to_string()));
        }
        if let Some(cas) = self.cas {
            query.push(("cas".to_string(), cas.to_string()));
        }
        if let Some(session) = &self.acquire {
            query.push(("acquire".to_string(), session.clone()));
        }
        if let Some(session) = &self.release {
            query.push(("release".to_string(), session.clone()));
        }
        query
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Catalog
// ─────────────────────────────────────────────────────────────────────────────

/// A node registered in the catalog.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Node {
    /// Node ID.
    #[serde(default, rename = "ID")]
    pub id: String,
    /// Node name.
    pub node: String,
    /// Node address.
    #[serde(default)]
    pub address: String,
    /// Datacenter the node belongs to.
    #[serde(default)]
    pub datacenter: String,
    /// Alternative addresses (lan, wan).
    #[serde(default)]
    pub tagged_addresses: Option<BTreeMap<String, String>>,
    /// Node metadata.
    #[serde(default)]
    pub meta: Option<BTreeMap<String, String>>,
}

/// A service instance as listed by `/catalog/service/<name>`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Service {
    /// Node hosting the instance.
    pub node: String,
    /// Node address.
    #[serde(default)]
    pub address: String,
    /// Service instance ID.
    #[serde(default, rename = "ServiceID")]
    pub service_id: String,
    /// Service name.
    #[serde(default)]
    pub service_name: String,
    /// Service tags.
    #[serde(default)]
    pub service_tags: Option<Vec<String>>,
    /// Service-specific address (empty means the node address).
    #[serde(default)]
    pub service_address: String,
    /// Service port.
    #[serde(default)]
    pub service_port: u16,
}

impl Service {
    /// Address clients should connect to.
    pub fn effective_address(&self) -> &str {
        if self.service_address.is_empty() {
            &self.address
        } else {
            &self.service_address
        }
    }
}

/// Service name → tags, as listed by `/catalog/services`.
pub type ServiceMap = BTreeMap<String, Vec<String>>;

/// Options for node listings.
#[derive(Debug, Clone, Default)]
pub struct NodeQueryOptions {
    /// Sort by round-trip time from this node (`_agent` for the local agent).
    pub near: Option<String>,
    /// Blocking query parameters.
    pub blocking: BlockingQueryOptions,
}

impl NodeQueryOptions {
    pub(crate) fn query(&self) -> Vec<(String, String)> {
        self.near
            .iter()
            .map(|near| ("near".to_string(), near.clone()))
            .collect()
    }
}

/// Options for service instance listings.
#[derive(Debug, Clone, Default)]
pub struct ServiceQueryOptions {
    /// Only instances carrying this tag.
    pub tag: Option<String>,
    /// Sort by round-trip time from this node.
    pub near: Option<String>,
    /// Blocking query parameters.
    pub blocking: BlockingQueryOptions,
}

impl ServiceQueryOptions {
    pub(crate) fn query(&self) -> Vec<(String, String)> {
        let mut query = Vec::new();
        if let Some(tag) = &self.tag {
            query.push(("tag".to_string(), tag.clone()));
        }
        if let Some(near) = &self.near {
            query.push(("near".to_string(), near.clone()));
        }
        query
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Agent
// ─────────────────────────────────────────────────────────────────────────────

/// A service as registered with the local agent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AgentService {
    #[serde(rename = "ID")]
    pub id: String,
    pub service: String,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub port: u16,
}

/// Health check definition.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct CheckOptions {
    #[serde(rename = "ID", skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(rename = "ServiceID", skip_serializing_if = "Option::is_none")]
    pub service_id: Option<String>,
    /// TTL check: the check must be updated within this duration (e.g. `10s`).
    #[serde(rename = "TTL", skip_serializing_if = "Option::is_none")]
    pub ttl: Option<String>,
    /// HTTP check URL.
    #[serde(rename = "HTTP", skip_serializing_if = "Option::is_none")]
    pub http: Option<String>,
    /// TCP check target (`host:port`).
    #[serde(rename = "TCP", skip_serializing_if = "Option::is_none")]
    pub tcp: Option<String>,
    /// Interval for HTTP/TCP checks.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interval: Option<String>,
    /// Initial status.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<CheckStatus>,
}

/// Service registration request.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ServiceOptions {
    #[serde(rename = "ID", skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub check: Option<CheckOptions>,
}

/// A gossip pool member.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Member {
    pub name: String,
    #[serde(default)]
    pub addr: String,
    #[serde(default)]
    pub port: u16,
    #[serde(default)]
    pub tags: HashMap<String, String>,
    #[serde(default)]
    pub status: i32,
}

// ─────────────────────────────────────────────────────────────────────────────
// Health
// ─────────────────────────────────────────────────────────────────────────────

/// Health check status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckStatus {
    #[default]
    Passing,
    Warning,
    Critical,
    Maintenance,
    /// Query-only wildcard for `/health/state/any`.
    Any,
}

impl CheckStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckStatus::Passing => "passing",
            CheckStatus::Warning => "warning",
            CheckStatus::Critical => "critical",
            CheckStatus::Maintenance => "maintenance",
            CheckStatus::Any => "any",
        }
    }
}

impl std::fmt::Display for CheckStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A health check result.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct HealthCheck {
    #[serde(default)]
    pub node: String,
    #[serde(rename = "CheckID")]
    pub check_id: String,
    #[serde(default)]
    pub name: String,
    pub status: CheckStatus,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub output: String,
    #[serde(default, rename = "ServiceID")]
    pub service_id: String,
    #[serde(default)]
    pub service_name: String,
}

/// A service instance with its node and checks (`/health/service/<name>`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ServiceEntry {
    pub node: Node,
    pub service: AgentService,
    #[serde(default)]
    pub checks: Vec<HealthCheck>,
}

impl ServiceEntry {
    /// Aggregate status: the worst status of all checks.
    pub fn aggregate_status(&self) -> CheckStatus {
        let mut worst = CheckStatus::Passing;
        for check in &self.checks {
            match check.status {
                CheckStatus::Critical | CheckStatus::Maintenance => return check.status,
                CheckStatus::Warning => worst = CheckStatus::Warning,
                _ => {}
            }
        }
        worst
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Sessions
// ─────────────────────────────────────────────────────────────────────────────

/// What happens to held locks when a session is invalidated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionBehavior {
    #[default]
    Release,
    Delete,
}

/// A session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Session {
    #[serde(rename = "ID")]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub node: String,
    /// Lock delay in nanoseconds.
    #[serde(default)]
    pub lock_delay: u64,
    #[serde(default)]
    pub behavior: SessionBehavior,
    #[serde(default, rename = "TTL")]
    pub ttl: String,
    #[serde(default)]
    pub checks: Option<Vec<String>>,
    #[serde(default)]
    pub create_index: u64,
    #[serde(default)]
    pub modify_index: u64,
}

/// Session creation request.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct SessionOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node: Option<String>,
    /// Lock delay as a duration string (e.g. `15s`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lock_delay: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub behavior: Option<SessionBehavior>,
    #[serde(rename = "TTL", skip_serializing_if = "Option::is_none")]
    pub ttl: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checks: Option<Vec<String>>,
}

/// Response to session creation.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct SessionCreated {
    #[serde(rename = "ID")]
    pub id: String,
}

// ─────────────────────────────────────────────────────────────────────────────
// Events
// ─────────────────────────────────────────────────────────────────────────────

/// A user event.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Event {
    #[serde(rename = "ID")]
    pub id: String,
    pub name: String,
    #[serde(default, with = "base64_bytes")]
    pub payload: Option<Vec<u8>>,
    #[serde(default)]
    pub node_filter: String,
    #[serde(default)]
    pub service_filter: String,
    #[serde(default)]
    pub tag_filter: String,
    #[serde(default)]
    pub version: u32,
    #[serde(default, rename = "LTime")]
    pub ltime: u64,
}

impl Event {
    /// Payload as UTF-8, if present and valid.
    pub fn payload_str(&self) -> Option<&str> {
        self.payload
            .as_deref()
            .and_then(|v| std::str::from_utf8(v).ok())
    }
}

/// Options for firing an event.
#[derive(Debug, Clone, Default)]
pub struct EventOptions {
    /// Node name filter (regex).
    pub node: Option<String>,
    /// Service name filter (regex).
    pub service: Option<String>,
    /// Tag filter (regex, requires `service`).
    pub tag: Option<String>,
    /// Opaque payload.
    pub payload: Option<Vec<u8>>,
}

impl EventOptions {
    pub(crate) fn query(&self) -> Vec<(String, String)> {
        let mut query = Vec::new();
        if let Some(node) = &self.node {
            query.push(("node".to_string(), node.clone()));
        }
        if let Some(service) = &self.service {
            query.push(("service".to_string(), service.clone()));
        }
        if let Some(tag) = &self.tag {
            query.push(("tag".to_string(), tag.clone()));
        }
        query
    }
}
