// Shared test helpers: in-process fakes for the provider ports and the session store

#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use eksboard::bedrock::{AgentRequest, BedrockTransport, FlowRequest, FlowStream};
use eksboard::cluster_repo::{
    ClusterApi, KubeApi, KubeConnector, NodeList, PERMISSION_CHECKS, PodList,
};
use eksboard::config::AppConfig;
use eksboard::error::ProviderError;
use eksboard::models::{ClusterDetail, ClusterSummary, NodegroupSummary};
use eksboard::session_repo::SessionStore;
use eksboard::trace::{TraceEvent, TracePayload};
use serde_json::{Value, json};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

pub const TEST_CONFIG: &str = r#"
[server]
port = 8081
host = "0.0.0.0"

[aws]
region = "us-west-2"

[session]
database_path = "data/test-sessions.db"

[bedrock]
model_id = "anthropic.claude-3-sonnet-20240229-v1:0"
agent_id = "AGENT1"
agent_alias_id = "ALIAS1"
flow_id = "FLOW1"
flow_alias_id = "FLOWALIAS1"
knowledge_base_id = "KB1"
"#;

pub fn test_app_config() -> AppConfig {
    AppConfig::load_from_str(TEST_CONFIG).unwrap()
}

pub fn provider_status(status: u16) -> ProviderError {
    ProviderError::Status {
        service: "bedrock",
        status,
        body: "simulated failure".into(),
    }
}

/// Canned Bedrock answers. A `None` reply fails with `fail_status` (500 when unset).
#[derive(Default)]
pub struct FakeTransport {
    pub model_reply: Option<Value>,
    pub converse_reply: Option<Value>,
    pub agent_events: Option<Vec<TraceEvent>>,
    pub flow_stream: Option<FlowStream>,
    pub retrieve_reply: Option<Value>,
    pub generate_reply: Option<Value>,
    pub models_reply: Option<Value>,
    pub fail_status: u16,
    /// (operation, body) of every call, in order.
    pub calls: Mutex<Vec<(String, Value)>>,
    pub agent_requests: Mutex<Vec<AgentRequest>>,
    pub flow_requests: Mutex<Vec<FlowRequest>>,
}

impl FakeTransport {
    fn failure(&self) -> ProviderError {
        provider_status(if self.fail_status == 0 {
            500
        } else {
            self.fail_status
        })
    }

    fn record(&self, op: &str, body: Value) {
        self.calls.lock().unwrap().push((op.to_string(), body));
    }

    pub fn calls(&self) -> Vec<(String, Value)> {
        self.calls.lock().unwrap().clone()
    }

    fn reply(&self, canned: &Option<Value>) -> Result<Value, ProviderError> {
        canned.clone().ok_or_else(|| self.failure())
    }
}

#[async_trait]
impl BedrockTransport for FakeTransport {
    async fn invoke_model(&self, model_id: &str, body: Value) -> Result<Value, ProviderError> {
        self.record("invoke_model", json!({"modelId": model_id, "body": body}));
        self.reply(&self.model_reply)
    }

    async fn converse(&self, model_id: &str, request: Value) -> Result<Value, ProviderError> {
        self.record("converse", json!({"modelId": model_id, "request": request}));
        self.reply(&self.converse_reply)
    }

    async fn invoke_agent(&self, request: &AgentRequest) -> Result<Vec<TraceEvent>, ProviderError> {
        self.record("invoke_agent", json!({"sessionId": request.session_id}));
        self.agent_requests.lock().unwrap().push(request.clone());
        self.agent_events.clone().ok_or_else(|| self.failure())
    }

    async fn invoke_flow(&self, request: &FlowRequest) -> Result<FlowStream, ProviderError> {
        self.record("invoke_flow", json!({"flowId": request.flow_id}));
        self.flow_requests.lock().unwrap().push(request.clone());
        self.flow_stream.clone().ok_or_else(|| self.failure())
    }

    async fn retrieve(&self, knowledge_base_id: &str, request: Value) -> Result<Value, ProviderError> {
        self.record(
            "retrieve",
            json!({"knowledgeBaseId": knowledge_base_id, "request": request}),
        );
        self.reply(&self.retrieve_reply)
    }

    async fn retrieve_and_generate(&self, request: Value) -> Result<Value, ProviderError> {
        self.record("retrieve_and_generate", request);
        self.reply(&self.generate_reply)
    }

    async fn list_foundation_models(&self) -> Result<Value, ProviderError> {
        self.record("list_foundation_models", Value::Null);
        self.reply(&self.models_reply)
    }
}

pub fn chunk(text: &str) -> TraceEvent {
    TraceEvent::Chunk(Bytes::copy_from_slice(text.as_bytes()))
}

pub fn raw_trace(value: Value) -> TraceEvent {
    TraceEvent::Trace(TracePayload::Raw(Bytes::from(value.to_string())))
}

pub fn claude_reply(text: &str) -> Value {
    json!({"content": [{"type": "text", "text": text}]})
}

/// One cluster with nodegroups, as the control plane would describe it.
#[derive(Clone)]
pub struct FakeCluster {
    pub summary: ClusterSummary,
    pub nodegroups: Vec<NodegroupSummary>,
}

pub fn fake_cluster(name: &str, nodegroups: Vec<NodegroupSummary>) -> FakeCluster {
    FakeCluster {
        summary: ClusterSummary {
            name: name.into(),
            status: "ACTIVE".into(),
            version: "1.29".into(),
            endpoint: format!("https://{name}.eks.example.com"),
            created_at: Some("2024-01-01T00:00:00Z".into()),
            region: "us-west-2".into(),
        },
        nodegroups,
    }
}

pub fn nodegroup(name: &str, instance_type: &str, desired_size: u32) -> NodegroupSummary {
    NodegroupSummary {
        name: name.into(),
        status: "ACTIVE".into(),
        instance_types: vec![instance_type.into()],
        desired_size,
        version: Some("1.29".into()),
        created_at: None,
    }
}

pub struct FakeClusters {
    pub clusters: Vec<FakeCluster>,
    pub fail_status: Option<u16>,
}

impl FakeClusters {
    pub fn new(clusters: Vec<FakeCluster>) -> Self {
        Self {
            clusters,
            fail_status: None,
        }
    }

    fn find(&self, name: &str) -> Result<&FakeCluster, ProviderError> {
        if let Some(status) = self.fail_status {
            return Err(provider_status(status));
        }
        self.clusters
            .iter()
            .find(|c| c.summary.name == name)
            .ok_or_else(|| ProviderError::UnknownCluster(name.to_string()))
    }
}

#[async_trait]
impl ClusterApi for FakeClusters {
    async fn list_clusters(&self) -> Result<Vec<ClusterSummary>, ProviderError> {
        if let Some(status) = self.fail_status {
            return Err(provider_status(status));
        }
        Ok(self.clusters.iter().map(|c| c.summary.clone()).collect())
    }

    async fn describe_cluster(&self, name: &str) -> Result<ClusterDetail, ProviderError> {
        let c = self.find(name)?;
        Ok(ClusterDetail {
            summary: c.summary.clone(),
            certificate_authority_data: None,
        })
    }

    async fn list_nodegroups(&self, cluster: &str) -> Result<Vec<NodegroupSummary>, ProviderError> {
        Ok(self.find(cluster)?.nodegroups.clone())
    }
}

/// Kubernetes API fake. `reachable: false` makes `connect` fail; `denied` lists
/// permission keys whose check fails.
#[derive(Clone, Default)]
pub struct FakeKube {
    pub reachable: bool,
    pub nodes: Option<Value>,
    pub pods: Option<Value>,
    pub denied: Vec<&'static str>,
}

#[async_trait]
impl KubeConnector for FakeKube {
    async fn connect(&self, _cluster: &ClusterDetail) -> Result<Arc<dyn KubeApi>, ProviderError> {
        if !self.reachable {
            return Err(ProviderError::Token("no credentials in test".into()));
        }
        Ok(Arc::new(self.clone()))
    }
}

#[async_trait]
impl KubeApi for FakeKube {
    async fn list_nodes(&self) -> Result<NodeList, ProviderError> {
        let value = self.nodes.clone().ok_or_else(|| provider_status(500))?;
        Ok(serde_json::from_value(value)?)
    }

    async fn list_pods(&self) -> Result<PodList, ProviderError> {
        let value = self.pods.clone().ok_or_else(|| provider_status(500))?;
        Ok(serde_json::from_value(value)?)
    }

    async fn check_permissions(&self) -> BTreeMap<String, bool> {
        PERMISSION_CHECKS
            .iter()
            .map(|(key, _)| (key.to_string(), !self.denied.contains(key)))
            .collect()
    }
}

pub fn k8s_node(name: &str, nodegroup: &str, ready: bool) -> Value {
    json!({
        "metadata": {
            "name": name,
            "creationTimestamp": "2024-01-02T00:00:00Z",
            "labels": {
                "node.kubernetes.io/instance-type": "m5.large",
                "eks.amazonaws.com/nodegroup": nodegroup
            }
        },
        "status": {
            "conditions": [{"type": "Ready", "status": if ready { "True" } else { "False" }}],
            "capacity": {"cpu": "2", "memory": "8008812Ki", "pods": "29"},
            "allocatable": {"cpu": "1930m", "memory": "7291500Ki", "pods": "29"},
            "nodeInfo": {"kubeletVersion": "v1.29.0-eks"}
        }
    })
}

pub fn k8s_pod(name: &str, node: Option<&str>, phase: &str) -> Value {
    json!({
        "metadata": {"name": name, "namespace": "default"},
        "spec": {
            "nodeName": node,
            "containers": [{
                "name": "app",
                "image": "nginx:1.25",
                "resources": {"requests": {"cpu": "250m", "memory": "128Mi"}}
            }]
        },
        "status": {
            "phase": phase,
            "conditions": [{"type": "Ready", "status": "True"}],
            "containerStatuses": [{"restartCount": 2}]
        }
    })
}

/// Session store kept in a map; `fail_writes` makes save/delete fail, `fail_reads` makes load fail.
#[derive(Default)]
pub struct MemorySessionStore {
    pub blobs: Mutex<HashMap<String, Value>>,
    pub fail_writes: bool,
    pub fail_reads: bool,
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn save(&self, session_id: &str, data: &Value) -> anyhow::Result<()> {
        anyhow::ensure!(!self.fail_writes, "store is read-only");
        self.blobs
            .lock()
            .unwrap()
            .insert(session_id.to_string(), data.clone());
        Ok(())
    }

    async fn load(&self, session_id: &str) -> anyhow::Result<Option<Value>> {
        anyhow::ensure!(!self.fail_reads, "store is unreachable");
        Ok(self.blobs.lock().unwrap().get(session_id).cloned())
    }

    async fn delete(&self, session_id: &str) -> anyhow::Result<()> {
        anyhow::ensure!(!self.fail_writes, "store is read-only");
        self.blobs.lock().unwrap().remove(session_id);
        Ok(())
    }

    async fn purge_expired(&self) -> anyhow::Result<u64> {
        Ok(0)
    }
}
