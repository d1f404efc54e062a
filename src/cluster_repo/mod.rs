// EKS cluster inventory and Kubernetes compute inspection

mod aws_cli;
mod capacity;
mod configured;
mod eks_cli;
mod kube;
mod kube_http;
mod quantity;

pub use aws_cli::AwsCli;
pub use capacity::instance_capacity;
pub use configured::ConfiguredClusters;
pub use eks_cli::EksCliClusters;
pub use kube::{Node, NodeList, PERMISSION_CHECKS, Pod, PodList, node_record, pod_record};
pub use kube_http::KubeHttpConnector;
pub use quantity::{parse_cpu_cores, parse_memory_gib, parse_pod_count};

use crate::error::ProviderError;
use crate::models::{
    ClusterDetail, ClusterSummary, ComputeOverview, NodeRecord, NodeStatus, NodegroupSummary,
    PodRecord, TotalCapacity,
};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::sync::Arc;
use tracing::{instrument, warn};

/// Control-plane view of EKS: which clusters exist and how they are sized.
#[async_trait]
pub trait ClusterApi: Send + Sync {
    async fn list_clusters(&self) -> Result<Vec<ClusterSummary>, ProviderError>;
    async fn describe_cluster(&self, name: &str) -> Result<ClusterDetail, ProviderError>;
    async fn list_nodegroups(&self, cluster: &str) -> Result<Vec<NodegroupSummary>, ProviderError>;
}

/// Opens a Kubernetes API client for one cluster.
#[async_trait]
pub trait KubeConnector: Send + Sync {
    async fn connect(&self, cluster: &ClusterDetail) -> Result<Arc<dyn KubeApi>, ProviderError>;
}

#[async_trait]
pub trait KubeApi: Send + Sync {
    async fn list_nodes(&self) -> Result<NodeList, ProviderError>;
    async fn list_pods(&self) -> Result<PodList, ProviderError>;
    /// One entry per `PERMISSION_CHECKS` key; a failed check reads as `false`.
    async fn check_permissions(&self) -> BTreeMap<String, bool>;
}

pub struct ClusterRepo {
    clusters: Arc<dyn ClusterApi>,
    kube: Arc<dyn KubeConnector>,
}

impl ClusterRepo {
    pub fn new(clusters: Arc<dyn ClusterApi>, kube: Arc<dyn KubeConnector>) -> Self {
        Self { clusters, kube }
    }

    #[instrument(skip(self), fields(repo = "cluster", operation = "list_clusters"))]
    pub async fn list_clusters(&self) -> Result<Vec<ClusterSummary>, ProviderError> {
        self.clusters.list_clusters().await
    }

    #[instrument(skip(self), fields(repo = "cluster", operation = "describe_cluster"))]
    pub async fn describe_cluster(&self, name: &str) -> Result<ClusterSummary, ProviderError> {
        Ok(self.clusters.describe_cluster(name).await?.summary)
    }

    /// Nodes, pods and capacity for one cluster. Nodegroup or describe failures are returned;
    /// an unreachable Kubernetes API degrades to nodes synthesized from nodegroup sizing.
    #[instrument(skip(self), fields(repo = "cluster", operation = "compute_overview"))]
    pub async fn compute_overview(&self, name: &str) -> Result<ComputeOverview, ProviderError> {
        let nodegroups = self.clusters.list_nodegroups(name).await?;
        let detail = self.clusters.describe_cluster(name).await?;

        let client = match self.kube.connect(&detail).await {
            Ok(c) => Some(c),
            Err(e) => {
                warn!(cluster = name, error = %e, "kubernetes unreachable, using nodegroup sizing");
                None
            }
        };

        let (nodes, pods) = match &client {
            Some(api) => {
                let nodes = match api.list_nodes().await {
                    Ok(list) => list.items.iter().map(node_record).collect(),
                    Err(e) => {
                        warn!(cluster = name, error = %e, "list nodes failed");
                        Vec::new()
                    }
                };
                let pods = match api.list_pods().await {
                    Ok(list) => list.items.iter().map(pod_record).collect(),
                    Err(e) => {
                        warn!(cluster = name, error = %e, "list pods failed");
                        Vec::new()
                    }
                };
                (nodes, pods)
            }
            None => (synthesize_nodes(&nodegroups), Vec::new()),
        };

        Ok(build_overview(
            name,
            nodegroups,
            nodes,
            pods,
            client.is_some(),
        ))
    }

    /// What the dashboard's credentials may list in the cluster. Unlike the compute
    /// overview there is no fallback: an unreachable API server is an error.
    #[instrument(skip(self), fields(repo = "cluster", operation = "check_permissions"))]
    pub async fn check_permissions(
        &self,
        name: &str,
    ) -> Result<BTreeMap<String, bool>, ProviderError> {
        let detail = self.clusters.describe_cluster(name).await?;
        let api = self.kube.connect(&detail).await?;
        Ok(api.check_permissions().await)
    }
}

/// One node per `desired_size` slot and instance type, with table capacities.
pub fn synthesize_nodes(nodegroups: &[NodegroupSummary]) -> Vec<NodeRecord> {
    let mut nodes = Vec::new();
    for ng in nodegroups {
        let status = NodeStatus::from_ready(ng.status == "ACTIVE");
        for instance_type in &ng.instance_types {
            let capacity = instance_capacity(instance_type);
            for i in 0..ng.desired_size {
                nodes.push(NodeRecord {
                    name: format!("{}-node-{}", ng.name, i + 1),
                    status,
                    instance_type: instance_type.clone(),
                    nodegroup: ng.name.clone(),
                    kubelet_version: ng.version.clone().unwrap_or_else(|| "Unknown".into()),
                    capacity,
                    allocatable: capacity,
                    created_at: ng.created_at.clone(),
                    labels: BTreeMap::new(),
                });
            }
        }
    }
    nodes
}

pub fn build_overview(
    cluster_name: &str,
    nodegroups: Vec<NodegroupSummary>,
    nodes: Vec<NodeRecord>,
    pods: Vec<PodRecord>,
    k8s_connected: bool,
) -> ComputeOverview {
    let mut total_capacity = TotalCapacity::default();
    for node in &nodes {
        total_capacity.add(&node.capacity);
    }
    let mut pod_phase_counts = BTreeMap::new();
    for pod in &pods {
        *pod_phase_counts
            .entry(pod.phase.as_str().to_string())
            .or_insert(0) += 1;
    }
    ComputeOverview {
        cluster_name: cluster_name.to_string(),
        total_nodes: nodes.len(),
        ready_nodes: nodes.iter().filter(|n| n.is_ready()).count(),
        nodegroups,
        nodes,
        pods,
        total_capacity,
        k8s_connected,
        pod_phase_counts,
    }
}

/// Prompt for the cluster-aware assistant: cluster facts first, then the user's question.
pub fn cluster_context_prompt(
    cluster: &ClusterSummary,
    overview: Option<&ComputeOverview>,
    question: &str,
) -> String {
    let mut context = String::new();
    let _ = writeln!(context, "Currently selected cluster: {}", cluster.name);
    let _ = writeln!(context, "- Status: {}", cluster.status);
    let _ = writeln!(context, "- Version: {}", cluster.version);
    if let Some(o) = overview {
        let _ = writeln!(context, "- Total nodes: {}", o.total_nodes);
        let _ = writeln!(context, "- Ready nodes: {}", o.ready_nodes);
        let _ = writeln!(
            context,
            "- Total CPU: {} cores",
            o.total_capacity.cpu_cores
        );
        let _ = writeln!(
            context,
            "- Total memory: {} GiB",
            o.total_capacity.memory_gib_rounded()
        );
        if !o.pods.is_empty() {
            let _ = writeln!(context, "- Total pods: {}", o.pods.len());
        }
    }
    format!(
        "Answer the user's question using the following EKS cluster information:\n\n\
         {context}\n\
         User question: {question}\n\n\
         Answer in a friendly, professional way. Where useful, include kubectl commands or concrete remediation steps."
    )
}
