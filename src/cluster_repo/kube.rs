// Subset of the Kubernetes core/v1 JSON we read, and its mapping to flat records.

use serde::Deserialize;
use std::collections::BTreeMap;
use tracing::warn;

use super::quantity::{parse_cpu_cores, parse_memory_gib, parse_pod_count};
use crate::models::{
    ContainerRecord, NodeCapacity, NodeRecord, NodeStatus, PodPhase, PodRecord, ResourceAmounts,
};

const INSTANCE_TYPE_LABEL: &str = "node.kubernetes.io/instance-type";
const NODEGROUP_LABEL: &str = "eks.amazonaws.com/nodegroup";

/// Access checks run against a cluster: result key and the `limit=1` list call that decides it.
pub const PERMISSION_CHECKS: [(&str, &str); 5] = [
    ("pods:list", "/api/v1/pods?limit=1"),
    ("nodes:list", "/api/v1/nodes?limit=1"),
    ("deployments:list", "/apis/apps/v1/deployments?limit=1"),
    ("services:list", "/api/v1/services?limit=1"),
    ("configmaps:list", "/api/v1/configmaps?limit=1"),
];

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NodeList {
    #[serde(default)]
    pub items: Vec<Node>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PodList {
    #[serde(default)]
    pub items: Vec<Pod>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub namespace: Option<String>,
    #[serde(default)]
    pub creation_timestamp: Option<String>,
    #[serde(default)]
    pub labels: Option<BTreeMap<String, String>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Condition {
    #[serde(rename = "type")]
    pub kind: String,
    pub status: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Node {
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub status: NodeStatusJson,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeStatusJson {
    #[serde(default)]
    pub conditions: Vec<Condition>,
    #[serde(default)]
    pub capacity: BTreeMap<String, String>,
    #[serde(default)]
    pub allocatable: BTreeMap<String, String>,
    #[serde(default)]
    pub node_info: NodeInfo,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeInfo {
    #[serde(default)]
    pub kubelet_version: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Pod {
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: PodSpec,
    #[serde(default)]
    pub status: PodStatusJson,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PodSpec {
    #[serde(default)]
    pub node_name: Option<String>,
    #[serde(default)]
    pub containers: Vec<Container>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Container {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub resources: ResourceRequirements,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ResourceRequirements {
    #[serde(default)]
    pub requests: Option<BTreeMap<String, String>>,
    #[serde(default)]
    pub limits: Option<BTreeMap<String, String>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PodStatusJson {
    #[serde(default)]
    pub phase: Option<String>,
    #[serde(default)]
    pub conditions: Vec<Condition>,
    #[serde(default)]
    pub container_statuses: Vec<ContainerStatus>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerStatus {
    #[serde(default)]
    pub restart_count: u32,
}

fn condition_true(conditions: &[Condition], kind: &str) -> bool {
    conditions
        .iter()
        .any(|c| c.kind == kind && c.status == "True")
}

/// Missing or unparseable quantities count as zero (logged once per field).
fn node_capacity(node: &str, quantities: &BTreeMap<String, String>) -> NodeCapacity {
    let cpu = quantities.get("cpu").map(String::as_str).unwrap_or("0");
    let memory = quantities.get("memory").map(String::as_str).unwrap_or("0Ki");
    let pods = quantities.get("pods").map(String::as_str).unwrap_or("0");
    NodeCapacity {
        cpu_cores: parse_cpu_cores(cpu).unwrap_or_else(|| {
            warn!(node, cpu, "unparseable cpu quantity");
            0.0
        }),
        memory_gib: parse_memory_gib(memory).unwrap_or_else(|| {
            warn!(node, memory, "unparseable memory quantity");
            0.0
        }),
        pods: parse_pod_count(pods).unwrap_or_else(|| {
            warn!(node, pods, "unparseable pod count");
            0
        }),
    }
}

fn resource_amounts(quantities: Option<&BTreeMap<String, String>>) -> ResourceAmounts {
    let Some(q) = quantities else {
        return ResourceAmounts::default();
    };
    ResourceAmounts {
        cpu_cores: q.get("cpu").and_then(|v| parse_cpu_cores(v)),
        memory_gib: q.get("memory").and_then(|v| parse_memory_gib(v)),
    }
}

pub fn node_record(node: &Node) -> NodeRecord {
    let labels = node.metadata.labels.clone().unwrap_or_default();
    let name = node.metadata.name.clone();
    NodeRecord {
        status: NodeStatus::from_ready(condition_true(&node.status.conditions, "Ready")),
        instance_type: labels
            .get(INSTANCE_TYPE_LABEL)
            .cloned()
            .unwrap_or_else(|| "Unknown".into()),
        nodegroup: labels
            .get(NODEGROUP_LABEL)
            .cloned()
            .unwrap_or_else(|| "Unknown".into()),
        kubelet_version: node.status.node_info.kubelet_version.clone(),
        capacity: node_capacity(&name, &node.status.capacity),
        allocatable: node_capacity(&name, &node.status.allocatable),
        created_at: node.metadata.creation_timestamp.clone(),
        labels,
        name,
    }
}

pub fn pod_record(pod: &Pod) -> PodRecord {
    PodRecord {
        name: pod.metadata.name.clone(),
        namespace: pod.metadata.namespace.clone().unwrap_or_default(),
        phase: pod
            .status
            .phase
            .as_deref()
            .map(PodPhase::from_k8s)
            .unwrap_or(PodPhase::Unknown),
        node: pod
            .spec
            .node_name
            .clone()
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| "Pending".into()),
        restart_count: pod
            .status
            .container_statuses
            .iter()
            .map(|c| c.restart_count)
            .sum(),
        ready: condition_true(&pod.status.conditions, "Ready"),
        created_at: pod.metadata.creation_timestamp.clone(),
        labels: pod.metadata.labels.clone().unwrap_or_default(),
        containers: pod
            .spec
            .containers
            .iter()
            .map(|c| ContainerRecord {
                name: c.name.clone(),
                image: c.image.clone().unwrap_or_default(),
                requests: resource_amounts(c.resources.requests.as_ref()),
                limits: resource_amounts(c.resources.limits.as_ref()),
            })
            .collect(),
    }
}
