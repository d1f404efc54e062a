// EKS cluster, node and pod records. Built fresh on every inspection; never mutated.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterSummary {
    pub name: String,
    pub status: String,
    pub version: String,
    pub endpoint: String,
    pub created_at: Option<String>,
    pub region: String,
}

/// Cluster summary plus the connection material needed to reach its API server.
#[derive(Debug, Clone)]
pub struct ClusterDetail {
    pub summary: ClusterSummary,
    pub certificate_authority_data: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodegroupSummary {
    pub name: String,
    pub status: String,
    pub instance_types: Vec<String>,
    pub desired_size: u32,
    pub version: Option<String>,
    pub created_at: Option<String>,
}

/// Capacity in canonical units: CPU cores and GiB of memory.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeCapacity {
    pub cpu_cores: f64,
    pub memory_gib: f64,
    pub pods: u32,
}

/// Node readiness; serializes as "Ready" / "NotReady".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeStatus {
    Ready,
    NotReady,
}

impl NodeStatus {
    pub fn from_ready(ready: bool) -> Self {
        if ready {
            NodeStatus::Ready
        } else {
            NodeStatus::NotReady
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeRecord {
    pub name: String,
    pub status: NodeStatus,
    pub instance_type: String,
    pub nodegroup: String,
    pub kubelet_version: String,
    pub capacity: NodeCapacity,
    pub allocatable: NodeCapacity,
    pub created_at: Option<String>,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

impl NodeRecord {
    pub fn is_ready(&self) -> bool {
        self.status == NodeStatus::Ready
    }
}

/// Pod phase as reported by Kubernetes; serializes as the Kubernetes string (e.g. "Running").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PodPhase {
    Pending,
    Running,
    Succeeded,
    Failed,
    #[serde(other)]
    Unknown,
}

impl PodPhase {
    pub fn from_k8s(s: &str) -> Self {
        match s {
            "Pending" => PodPhase::Pending,
            "Running" => PodPhase::Running,
            "Succeeded" => PodPhase::Succeeded,
            "Failed" => PodPhase::Failed,
            _ => PodPhase::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PodPhase::Pending => "Pending",
            PodPhase::Running => "Running",
            PodPhase::Succeeded => "Succeeded",
            PodPhase::Failed => "Failed",
            PodPhase::Unknown => "Unknown",
        }
    }
}

/// Requested or limited resources; `None` when the container does not set them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceAmounts {
    pub cpu_cores: Option<f64>,
    pub memory_gib: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerRecord {
    pub name: String,
    pub image: String,
    pub requests: ResourceAmounts,
    pub limits: ResourceAmounts,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PodRecord {
    pub name: String,
    pub namespace: String,
    pub phase: PodPhase,
    /// Scheduled node, or "Pending" when not yet bound.
    pub node: String,
    pub restart_count: u32,
    pub ready: bool,
    pub created_at: Option<String>,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    pub containers: Vec<ContainerRecord>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TotalCapacity {
    pub cpu_cores: f64,
    pub memory_gib: f64,
    pub pods: u64,
}

impl TotalCapacity {
    pub fn add(&mut self, node: &NodeCapacity) {
        self.cpu_cores += node.cpu_cores;
        self.memory_gib += node.memory_gib;
        self.pods += node.pods as u64;
    }

    /// Memory total as shown on the dashboard (nearest whole GiB).
    pub fn memory_gib_rounded(&self) -> u64 {
        self.memory_gib.round().max(0.0) as u64
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComputeOverview {
    pub cluster_name: String,
    pub nodegroups: Vec<NodegroupSummary>,
    pub nodes: Vec<NodeRecord>,
    pub pods: Vec<PodRecord>,
    pub total_capacity: TotalCapacity,
    /// False when nodes were synthesized from nodegroup sizing instead of the Kubernetes API.
    pub k8s_connected: bool,
    pub total_nodes: usize,
    pub ready_nodes: usize,
    /// Pod count per phase name (e.g. "Running").
    pub pod_phase_counts: BTreeMap<String, usize>,
}
