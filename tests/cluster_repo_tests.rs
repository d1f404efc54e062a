// ClusterRepo tests: inventory, Kubernetes inspection, nodegroup fallback, config-backed clusters

mod common;

use common::{FakeClusters, FakeKube, fake_cluster, k8s_node, k8s_pod, nodegroup};
use eksboard::cluster_repo::{ClusterApi, ClusterRepo, ConfiguredClusters, cluster_context_prompt};
use eksboard::error::ProviderError;
use eksboard::models::{NodeStatus, PodPhase};
use serde_json::json;
use std::sync::Arc;

fn repo(kube: FakeKube) -> ClusterRepo {
    let clusters = FakeClusters::new(vec![
        fake_cluster("prod", vec![nodegroup("web", "m5.large", 2)]),
        fake_cluster("dev", vec![]),
    ]);
    ClusterRepo::new(Arc::new(clusters), Arc::new(kube))
}

fn connected_kube() -> FakeKube {
    FakeKube {
        reachable: true,
        nodes: Some(json!({"items": [
            k8s_node("ip-10-0-1-1", "web", true),
            k8s_node("ip-10-0-1-2", "web", false),
        ]})),
        pods: Some(json!({"items": [
            k8s_pod("api-1", Some("ip-10-0-1-1"), "Running"),
            k8s_pod("api-2", Some("ip-10-0-1-1"), "Running"),
            k8s_pod("job-1", None, "Pending"),
        ]})),
        ..Default::default()
    }
}

#[tokio::test]
async fn list_and_describe_clusters() {
    let repo = repo(FakeKube::default());
    let clusters = repo.list_clusters().await.unwrap();
    let names: Vec<_> = clusters.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, ["prod", "dev"]);

    let prod = repo.describe_cluster("prod").await.unwrap();
    assert_eq!(prod.version, "1.29");
    assert!(matches!(
        repo.describe_cluster("nope").await,
        Err(ProviderError::UnknownCluster(_))
    ));
}

#[tokio::test]
async fn overview_from_kubernetes_api() {
    let overview = repo(connected_kube()).compute_overview("prod").await.unwrap();

    assert!(overview.k8s_connected);
    assert_eq!(overview.cluster_name, "prod");
    assert_eq!(overview.total_nodes, 2);
    assert_eq!(overview.ready_nodes, 1);
    assert_eq!(overview.nodes[1].status, NodeStatus::NotReady);
    assert_eq!(overview.total_capacity.cpu_cores, 4.0);
    assert_eq!(overview.total_capacity.pods, 58);
    assert_eq!(overview.total_capacity.memory_gib_rounded(), 15);

    assert_eq!(overview.pods.len(), 3);
    assert_eq!(overview.pod_phase_counts.get("Running"), Some(&2));
    assert_eq!(overview.pod_phase_counts.get("Pending"), Some(&1));
    let job = &overview.pods[2];
    assert_eq!(job.phase, PodPhase::Pending);
    assert_eq!(job.node, "Pending");
    assert_eq!(job.restart_count, 2);
    assert_eq!(job.containers[0].requests.cpu_cores, Some(0.25));
    assert_eq!(job.containers[0].limits.cpu_cores, None);
}

#[tokio::test]
async fn unreachable_kubernetes_falls_back_to_nodegroup_sizing() {
    let overview = repo(FakeKube::default()).compute_overview("prod").await.unwrap();

    assert!(!overview.k8s_connected);
    assert_eq!(overview.total_nodes, 2);
    assert_eq!(overview.ready_nodes, 2);
    assert_eq!(overview.nodes[0].name, "web-node-1");
    assert_eq!(overview.nodes[0].instance_type, "m5.large");
    assert_eq!(overview.total_capacity.cpu_cores, 4.0);
    assert_eq!(overview.total_capacity.memory_gib_rounded(), 16);
    assert!(overview.pods.is_empty());
    assert!(overview.pod_phase_counts.is_empty());
}

#[tokio::test]
async fn failed_node_and_pod_listing_yield_empty_lists() {
    let kube = FakeKube {
        reachable: true,
        nodes: None,
        pods: None,
        ..Default::default()
    };
    let overview = repo(kube).compute_overview("prod").await.unwrap();
    assert!(overview.k8s_connected);
    assert_eq!(overview.total_nodes, 0);
    assert!(overview.pods.is_empty());
    assert_eq!(overview.nodegroups.len(), 1);
}

#[tokio::test]
async fn overview_of_unknown_cluster_is_an_error() {
    let err = repo(connected_kube())
        .compute_overview("missing")
        .await
        .unwrap_err();
    assert!(matches!(err, ProviderError::UnknownCluster(name) if name == "missing"));
}

#[tokio::test]
async fn denied_inventory_is_unauthorized() {
    let mut clusters = FakeClusters::new(vec![fake_cluster("prod", vec![])]);
    clusters.fail_status = Some(403);
    let repo = ClusterRepo::new(Arc::new(clusters), Arc::new(FakeKube::default()));
    assert!(repo.list_clusters().await.unwrap_err().is_unauthorized());
}

#[tokio::test]
async fn context_prompt_carries_cluster_facts() {
    let repo = repo(connected_kube());
    let summary = repo.describe_cluster("prod").await.unwrap();
    let overview = repo.compute_overview("prod").await.unwrap();

    let prompt = cluster_context_prompt(&summary, Some(&overview), "why is a node not ready?");
    assert!(prompt.contains("Currently selected cluster: prod"));
    assert!(prompt.contains("- Total nodes: 2"));
    assert!(prompt.contains("- Ready nodes: 1"));
    assert!(prompt.contains("- Total pods: 3"));
    assert!(prompt.contains("User question: why is a node not ready?"));

    let bare = cluster_context_prompt(&summary, None, "hi");
    assert!(!bare.contains("Total nodes"));
}

#[tokio::test]
async fn configured_clusters_from_toml() {
    let config = eksboard::config::AppConfig::load_from_str(&format!(
        "{}\n{}",
        common::TEST_CONFIG,
        r#"
[[clusters]]
name = "prod"
endpoint = "https://prod.eks.example.com"
version = "1.30"
certificate_authority_data = "Zm9v"

[[clusters.nodegroups]]
name = "web"
instance_types = ["t3.medium"]
desired_size = 1
"#
    ))
    .unwrap();
    let clusters = ConfiguredClusters::new("us-west-2", config.clusters);

    let summaries = clusters.list_clusters().await.unwrap();
    assert_eq!(summaries[0].region, "us-west-2");
    assert_eq!(summaries[0].status, "ACTIVE");

    let detail = clusters.describe_cluster("prod").await.unwrap();
    assert_eq!(detail.certificate_authority_data.as_deref(), Some("Zm9v"));
    let ngs = clusters.list_nodegroups("prod").await.unwrap();
    assert_eq!(ngs[0].instance_types, ["t3.medium"]);
    assert!(matches!(
        clusters.list_nodegroups("other").await,
        Err(ProviderError::UnknownCluster(_))
    ));
}

#[tokio::test]
async fn permissions_report_every_check() {
    let kube = FakeKube {
        reachable: true,
        denied: vec!["configmaps:list", "deployments:list"],
        ..Default::default()
    };
    let permissions = repo(kube).check_permissions("prod").await.unwrap();
    let keys: Vec<_> = permissions.keys().map(String::as_str).collect();
    assert_eq!(
        keys,
        ["configmaps:list", "deployments:list", "nodes:list", "pods:list", "services:list"]
    );
    assert!(permissions["pods:list"]);
    assert!(permissions["nodes:list"]);
    assert!(!permissions["configmaps:list"]);
    assert!(!permissions["deployments:list"]);
}

#[tokio::test]
async fn permissions_need_a_reachable_cluster() {
    let repo = repo(FakeKube::default());
    assert!(matches!(
        repo.check_permissions("prod").await,
        Err(ProviderError::Token(_))
    ));
    assert!(matches!(
        repo.check_permissions("missing").await,
        Err(ProviderError::UnknownCluster(_))
    ));
}
