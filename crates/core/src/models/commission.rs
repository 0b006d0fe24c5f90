//! Device facts reported to the backend through commissioning.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Payload key listing attributes the backend should retract.
pub const REMOVED_KEY: &str = "removed";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SwarmAttributes {
    #[serde(rename = "swarm-endpoint", skip_serializing_if = "String::is_empty")]
    pub endpoint: String,
    #[serde(rename = "swarm-token-manager", skip_serializing_if = "String::is_empty")]
    pub token_manager: String,
    #[serde(rename = "swarm-token-worker", skip_serializing_if = "String::is_empty")]
    pub token_worker: String,
    #[serde(rename = "swarm-client-key", skip_serializing_if = "String::is_empty")]
    pub client_key: String,
    #[serde(rename = "swarm-client-cert", skip_serializing_if = "String::is_empty")]
    pub client_cert: String,
    #[serde(rename = "swarm-client-ca", skip_serializing_if = "String::is_empty")]
    pub client_ca: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KubernetesAttributes {
    #[serde(rename = "kubernetes-endpoint", skip_serializing_if = "String::is_empty")]
    pub endpoint: String,
    #[serde(rename = "kubernetes-client-ca", skip_serializing_if = "String::is_empty")]
    pub client_ca: String,
    #[serde(rename = "kubernetes-client-cert", skip_serializing_if = "String::is_empty")]
    pub client_cert: String,
    #[serde(rename = "kubernetes-client-key", skip_serializing_if = "String::is_empty")]
    pub client_key: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterAttributes {
    #[serde(rename = "cluster-id", skip_serializing_if = "String::is_empty")]
    pub cluster_id: String,
    #[serde(rename = "cluster-worker-id", skip_serializing_if = "String::is_empty")]
    pub worker_id: String,
    #[serde(rename = "cluster-orchestrator", skip_serializing_if = "String::is_empty")]
    pub orchestrator: String,
    #[serde(rename = "cluster-managers", skip_serializing_if = "Vec::is_empty")]
    pub managers: Vec<String>,
    #[serde(rename = "cluster-workers", skip_serializing_if = "Vec::is_empty")]
    pub workers: Vec<String>,
}

/// Flat set of named device facts. Empty values are treated as absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CommissionAttributes {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub capabilities: Vec<String>,
    #[serde(flatten)]
    pub swarm: SwarmAttributes,
    #[serde(flatten)]
    pub kubernetes: KubernetesAttributes,
    #[serde(flatten)]
    pub cluster: ClusterAttributes,
}

/// An attribute update from an asynchronous source. Each variant replaces
/// its whole group, so a source can retract fields by sending empty values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommissionUpdate {
    Tags(Vec<String>),
    Capabilities(Vec<String>),
    Swarm(SwarmAttributes),
    Kubernetes(KubernetesAttributes),
    Cluster(ClusterAttributes),
}

/// Field-level difference between two attribute snapshots.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommissionDiff {
    pub changed: Map<String, Value>,
    pub removed: Vec<String>,
}

impl CommissionDiff {
    pub fn is_empty(&self) -> bool {
        self.changed.is_empty() && self.removed.is_empty()
    }

    /// Commission request body: the changed fields plus a `removed` list
    /// when anything was retracted.
    pub fn into_payload(self) -> Map<String, Value> {
        let mut payload = self.changed;
        if !self.removed.is_empty() {
            payload.insert(
                REMOVED_KEY.to_string(),
                Value::Array(self.removed.into_iter().map(Value::String).collect()),
            );
        }
        payload
    }
}

impl CommissionAttributes {
    pub fn with_defaults(tags: Vec<String>, capabilities: Vec<String>) -> Self {
        Self {
            tags,
            capabilities,
            ..Default::default()
        }
    }

    pub fn apply(&mut self, update: CommissionUpdate) {
        match update {
            CommissionUpdate::Tags(tags) => self.tags = tags,
            CommissionUpdate::Capabilities(capabilities) => self.capabilities = capabilities,
            CommissionUpdate::Swarm(swarm) => self.swarm = swarm,
            CommissionUpdate::Kubernetes(kubernetes) => self.kubernetes = kubernetes,
            CommissionUpdate::Cluster(cluster) => self.cluster = cluster,
        }
    }

    /// Non-empty attributes keyed by their wire name.
    pub fn to_map(&self) -> Map<String, Value> {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        }
    }

    /// Compares `self` (the live snapshot) against the last committed one.
    pub fn diff(&self, last_committed: &CommissionAttributes) -> CommissionDiff {
        let current = self.to_map();
        let previous = last_committed.to_map();

        let changed = current
            .iter()
            .filter(|(key, value)| previous.get(*key) != Some(*value))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        let removed = previous
            .keys()
            .filter(|key| !current.contains_key(*key))
            .cloned()
            .collect();

        CommissionDiff { changed, removed }
    }
}
