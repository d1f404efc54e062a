// Kubernetes REST client: cluster endpoint, bearer token, CA bundle from describe-cluster data

use super::aws_cli::AwsCli;
use super::kube::{NodeList, PERMISSION_CHECKS, PodList};
use super::{KubeApi, KubeConnector};
use crate::config::ClusterConfig;
use crate::error::{ProviderError, ensure_success};
use crate::models::ClusterDetail;
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::Deserialize;
use futures_util::future::join_all;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

const SERVICE: &str = "kubernetes";

#[derive(Debug, Clone, Default)]
struct ClusterAuth {
    token: Option<String>,
    token_command: Option<Vec<String>>,
}

pub struct KubeHttpConnector {
    cli: AwsCli,
    auth: HashMap<String, ClusterAuth>,
    timeout: Duration,
}

impl KubeHttpConnector {
    /// `timeout` bounds each Kubernetes HTTP call; the token command uses the CLI's own.
    pub fn new(cli: AwsCli, clusters: &[ClusterConfig], timeout: Duration) -> Self {
        let auth = clusters
            .iter()
            .map(|c| {
                (
                    c.name.clone(),
                    ClusterAuth {
                        token: c.token.clone(),
                        token_command: c.token_command.clone(),
                    },
                )
            })
            .collect();
        Self { cli, auth, timeout }
    }

    /// `aws eks get-token` unless the cluster names its own command.
    fn token_command(&self, cluster: &str) -> Vec<String> {
        self.auth
            .get(cluster)
            .and_then(|a| a.token_command.clone())
            .filter(|c| !c.is_empty())
            .unwrap_or_else(|| {
                self.cli
                    .command(&["eks", "get-token", "--cluster-name", cluster])
            })
    }

    async fn token(&self, cluster: &str) -> Result<String, ProviderError> {
        if let Some(token) = self.auth.get(cluster).and_then(|a| a.token.clone()) {
            return Ok(token);
        }
        let stdout = self
            .cli
            .run(&self.token_command(cluster))
            .await
            .map_err(|e| ProviderError::Token(e.to_string()))?;
        parse_exec_credential(&stdout)
    }
}

#[derive(Deserialize)]
struct ExecCredential {
    status: ExecCredentialStatus,
}

#[derive(Deserialize)]
struct ExecCredentialStatus {
    token: String,
}

/// Token out of the `client.authentication.k8s.io` ExecCredential the token command prints.
pub(crate) fn parse_exec_credential(stdout: &[u8]) -> Result<String, ProviderError> {
    let cred: ExecCredential = serde_json::from_slice(stdout)
        .map_err(|e| ProviderError::Token(format!("malformed ExecCredential: {e}")))?;
    if cred.status.token.is_empty() {
        return Err(ProviderError::Token("ExecCredential carries no token".into()));
    }
    Ok(cred.status.token)
}

fn http_client(
    ca_data: Option<&str>,
    timeout: Duration,
) -> Result<reqwest::Client, ProviderError> {
    let mut builder = reqwest::Client::builder().timeout(timeout);
    if let Some(data) = ca_data.filter(|d| !d.trim().is_empty()) {
        let pem = STANDARD
            .decode(data.trim())
            .map_err(|e| ProviderError::Decode(format!("certificate authority data: {e}")))?;
        let cert = reqwest::Certificate::from_pem(&pem)?;
        builder = builder.add_root_certificate(cert);
    }
    Ok(builder.build()?)
}

#[async_trait]
impl KubeConnector for KubeHttpConnector {
    async fn connect(&self, cluster: &ClusterDetail) -> Result<Arc<dyn KubeApi>, ProviderError> {
        let name = &cluster.summary.name;
        let base = reqwest::Url::parse(&cluster.summary.endpoint)
            .map_err(|e| ProviderError::Decode(format!("cluster endpoint: {e}")))?;
        let token = self.token(name).await?;
        let client = KubeHttpClient {
            http: http_client(cluster.certificate_authority_data.as_deref(), self.timeout)?,
            base,
            token,
        };
        client.ping().await?;
        debug!(cluster = %name, "kubernetes api reachable");
        Ok(Arc::new(client))
    }
}

pub struct KubeHttpClient {
    http: reqwest::Client,
    base: reqwest::Url,
    token: String,
}

impl KubeHttpClient {
    fn url(&self, path: &str) -> Result<reqwest::Url, ProviderError> {
        self.base
            .join(path)
            .map_err(|e| ProviderError::Decode(format!("kubernetes url {path}: {e}")))
    }

    async fn get(&self, path: &str) -> Result<reqwest::Response, ProviderError> {
        let response = self
            .http
            .get(self.url(path)?)
            .bearer_auth(&self.token)
            .send()
            .await?;
        ensure_success(SERVICE, response).await
    }

    async fn ping(&self) -> Result<(), ProviderError> {
        self.get("/api/v1/namespaces?limit=1").await.map(|_| ())
    }
}

#[async_trait]
impl KubeApi for KubeHttpClient {
    async fn list_nodes(&self) -> Result<NodeList, ProviderError> {
        Ok(self.get("/api/v1/nodes").await?.json().await?)
    }

    async fn list_pods(&self) -> Result<PodList, ProviderError> {
        Ok(self.get("/api/v1/pods").await?.json().await?)
    }

    async fn check_permissions(&self) -> BTreeMap<String, bool> {
        let checks = PERMISSION_CHECKS.iter().map(|(key, path)| async move {
            let allowed = match self.get(path).await {
                Ok(_) => true,
                Err(e) => {
                    info!(permission = %key, error = %e, "permission check denied");
                    false
                }
            };
            (key.to_string(), allowed)
        });
        join_all(checks).await.into_iter().collect()
    }
}
