// Cluster inventory declared in config.toml ([[clusters]] and their nodegroups)

use super::ClusterApi;
use crate::config::{ClusterConfig, NodegroupConfig};
use crate::error::ProviderError;
use crate::models::{ClusterDetail, ClusterSummary, NodegroupSummary};
use async_trait::async_trait;

pub struct ConfiguredClusters {
    region: String,
    clusters: Vec<ClusterConfig>,
}

impl ConfiguredClusters {
    pub fn new(region: impl Into<String>, clusters: Vec<ClusterConfig>) -> Self {
        Self {
            region: region.into(),
            clusters,
        }
    }

    fn find(&self, name: &str) -> Result<&ClusterConfig, ProviderError> {
        self.clusters
            .iter()
            .find(|c| c.name == name)
            .ok_or_else(|| ProviderError::UnknownCluster(name.to_string()))
    }

    fn summary(&self, c: &ClusterConfig) -> ClusterSummary {
        ClusterSummary {
            name: c.name.clone(),
            status: c.status.clone(),
            version: c.version.clone(),
            endpoint: c.endpoint.clone(),
            created_at: c.created_at.clone(),
            region: self.region.clone(),
        }
    }
}

fn nodegroup_summary(ng: &NodegroupConfig) -> NodegroupSummary {
    NodegroupSummary {
        name: ng.name.clone(),
        status: ng.status.clone(),
        instance_types: ng.instance_types.clone(),
        desired_size: ng.desired_size,
        version: ng.version.clone(),
        created_at: ng.created_at.clone(),
    }
}

#[async_trait]
impl ClusterApi for ConfiguredClusters {
    async fn list_clusters(&self) -> Result<Vec<ClusterSummary>, ProviderError> {
        Ok(self.clusters.iter().map(|c| self.summary(c)).collect())
    }

    async fn describe_cluster(&self, name: &str) -> Result<ClusterDetail, ProviderError> {
        let c = self.find(name)?;
        Ok(ClusterDetail {
            summary: self.summary(c),
            certificate_authority_data: c.certificate_authority_data.clone(),
        })
    }

    async fn list_nodegroups(&self, cluster: &str) -> Result<Vec<NodegroupSummary>, ProviderError> {
        Ok(self.find(cluster)?.nodegroups.iter().map(nodegroup_summary).collect())
    }
}
