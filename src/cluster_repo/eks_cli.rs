// Live cluster inventory from the account: `aws eks` list/describe calls, JSON output

use super::ClusterApi;
use super::aws_cli::AwsCli;
use crate::error::ProviderError;
use crate::models::{ClusterDetail, ClusterSummary, NodegroupSummary};
use async_trait::async_trait;
use futures_util::future::try_join_all;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

const SERVICE: &str = "eks";
const DENIED_MARKERS: [&str; 3] = ["AccessDenied", "UnauthorizedOperation", "UnrecognizedClient"];

pub struct EksCliClusters {
    cli: AwsCli,
}

impl EksCliClusters {
    pub fn new(cli: AwsCli) -> Self {
        Self { cli }
    }

    async fn eks<T: DeserializeOwned>(
        &self,
        args: &[&str],
        cluster: Option<&str>,
    ) -> Result<T, ProviderError> {
        let mut command = vec!["eks"];
        command.extend_from_slice(args);
        command.extend_from_slice(&["--output", "json"]);
        let stdout = self
            .cli
            .run(&self.cli.command(&command))
            .await
            .map_err(|e| classify(e, cluster))?;
        Ok(serde_json::from_slice(&stdout)?)
    }

    async fn describe_nodegroup(
        &self,
        cluster: &str,
        nodegroup: &str,
    ) -> Result<NodegroupSummary, ProviderError> {
        let out: DescribeNodegroupOutput = self
            .eks(
                &[
                    "describe-nodegroup",
                    "--cluster-name",
                    cluster,
                    "--nodegroup-name",
                    nodegroup,
                ],
                Some(cluster),
            )
            .await?;
        Ok(out.nodegroup.into())
    }
}

/// Map CLI failures onto the errors the routes know: missing cluster, denied access.
fn classify(err: ProviderError, cluster: Option<&str>) -> ProviderError {
    let ProviderError::Command { message, .. } = &err else {
        return err;
    };
    if let Some(name) = cluster
        && message.contains("ResourceNotFoundException")
    {
        return ProviderError::UnknownCluster(name.to_string());
    }
    if DENIED_MARKERS.iter().any(|m| message.contains(m)) {
        return ProviderError::Status {
            service: SERVICE,
            status: 403,
            body: message.clone(),
        };
    }
    err
}

/// `createdAt` is ISO-8601 text by default; epoch seconds when the CLI is set to numeric timestamps.
fn timestamp(value: Option<Value>) -> Option<String> {
    match value? {
        Value::String(s) => Some(s),
        Value::Number(n) => {
            let millis = (n.as_f64()? * 1000.0) as i64;
            chrono::DateTime::from_timestamp_millis(millis).map(|t| t.to_rfc3339())
        }
        _ => None,
    }
}

#[derive(Deserialize)]
struct ClusterNames {
    #[serde(default)]
    clusters: Vec<String>,
}

#[derive(Deserialize)]
struct NodegroupNames {
    #[serde(default)]
    nodegroups: Vec<String>,
}

#[derive(Deserialize)]
struct DescribeClusterOutput {
    cluster: EksCluster,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct EksCluster {
    name: String,
    #[serde(default)]
    status: String,
    #[serde(default)]
    version: String,
    #[serde(default)]
    endpoint: String,
    #[serde(default)]
    created_at: Option<Value>,
    #[serde(default)]
    certificate_authority: Option<CertificateAuthority>,
}

#[derive(Deserialize)]
struct CertificateAuthority {
    #[serde(default)]
    data: Option<String>,
}

#[derive(Deserialize)]
struct DescribeNodegroupOutput {
    nodegroup: EksNodegroup,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct EksNodegroup {
    nodegroup_name: String,
    #[serde(default)]
    status: String,
    #[serde(default)]
    instance_types: Option<Vec<String>>,
    #[serde(default)]
    scaling_config: Option<ScalingConfig>,
    #[serde(default)]
    version: Option<String>,
    #[serde(default)]
    created_at: Option<Value>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ScalingConfig {
    #[serde(default)]
    desired_size: Option<u32>,
}

impl EksCluster {
    fn into_detail(self, region: &str) -> ClusterDetail {
        ClusterDetail {
            summary: ClusterSummary {
                name: self.name,
                status: self.status,
                version: self.version,
                endpoint: self.endpoint,
                created_at: timestamp(self.created_at),
                region: region.to_string(),
            },
            certificate_authority_data: self.certificate_authority.and_then(|ca| ca.data),
        }
    }
}

impl From<EksNodegroup> for NodegroupSummary {
    fn from(ng: EksNodegroup) -> Self {
        NodegroupSummary {
            name: ng.nodegroup_name,
            status: ng.status,
            instance_types: ng.instance_types.unwrap_or_default(),
            desired_size: ng
                .scaling_config
                .and_then(|s| s.desired_size)
                .unwrap_or(0),
            version: ng.version,
            created_at: timestamp(ng.created_at),
        }
    }
}

#[async_trait]
impl ClusterApi for EksCliClusters {
    async fn list_clusters(&self) -> Result<Vec<ClusterSummary>, ProviderError> {
        let names: ClusterNames = self.eks(&["list-clusters"], None).await?;
        debug!(clusters = names.clusters.len(), "eks clusters listed");
        let details =
            try_join_all(names.clusters.iter().map(|n| self.describe_cluster(n))).await?;
        Ok(details.into_iter().map(|d| d.summary).collect())
    }

    async fn describe_cluster(&self, name: &str) -> Result<ClusterDetail, ProviderError> {
        let out: DescribeClusterOutput = self
            .eks(&["describe-cluster", "--name", name], Some(name))
            .await?;
        Ok(out.cluster.into_detail(self.cli.region()))
    }

    async fn list_nodegroups(&self, cluster: &str) -> Result<Vec<NodegroupSummary>, ProviderError> {
        let names: NodegroupNames = self
            .eks(&["list-nodegroups", "--cluster-name", cluster], Some(cluster))
            .await?;
        try_join_all(
            names
                .nodegroups
                .iter()
                .map(|ng| self.describe_nodegroup(cluster, ng)),
        )
        .await
    }
}
