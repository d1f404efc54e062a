// Bedrock assistant: one outbound call per chat message, in one of six modes.
// The transport is a port so routes and tests never depend on the wire adapter.

mod agent;
pub mod event_stream;
mod flow;
mod http;
mod knowledge_base;
mod model;

pub use flow::{extraction_prompt, parse_document_text, recover_json_object};
pub use http::BedrockHttpClient;
pub use knowledge_base::{format_retrieval_results, parse_citations, parse_retrieval_results};
pub use model::{
    ModelFamily, claude_body, converse_messages, converse_text, display_name, foundation_models,
    titan_body,
};

use crate::config::AppConfig;
use crate::error::ProviderError;
use crate::models::{ChatTurn, FlowDocument, InferenceParams, InvocationResult, ResponseMode};
use crate::trace::{TraceArtifact, TraceEvent};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq)]
pub struct AgentRequest {
    pub agent_id: String,
    pub agent_alias_id: String,
    pub session_id: String,
    pub input_text: String,
    pub enable_trace: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FlowRequest {
    pub flow_id: String,
    pub flow_alias_id: Option<String>,
    pub document: FlowDocument,
    pub enable_trace: bool,
}

/// Decoded events of one flow execution, in arrival order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FlowStream {
    pub execution_id: Option<String>,
    pub events: Vec<TraceEvent>,
}

/// Outbound Bedrock calls. JSON bodies in and out; streamed responses arrive already decoded.
#[async_trait]
pub trait BedrockTransport: Send + Sync {
    async fn invoke_model(&self, model_id: &str, body: Value) -> Result<Value, ProviderError>;
    async fn converse(&self, model_id: &str, request: Value) -> Result<Value, ProviderError>;
    async fn invoke_agent(&self, request: &AgentRequest) -> Result<Vec<TraceEvent>, ProviderError>;
    async fn invoke_flow(&self, request: &FlowRequest) -> Result<FlowStream, ProviderError>;
    async fn retrieve(&self, knowledge_base_id: &str, request: Value) -> Result<Value, ProviderError>;
    async fn retrieve_and_generate(&self, request: Value) -> Result<Value, ProviderError>;
    async fn list_foundation_models(&self) -> Result<Value, ProviderError>;
}

/// Identifiers used when a chat request does not name its own.
#[derive(Debug, Clone, Default)]
pub struct AssistantDefaults {
    pub region: String,
    pub model_id: String,
    pub agent_id: Option<String>,
    pub agent_alias_id: Option<String>,
    pub flow_id: Option<String>,
    pub flow_alias_id: Option<String>,
    pub knowledge_base_id: Option<String>,
}

impl AssistantDefaults {
    pub fn from_config(config: &AppConfig) -> Self {
        let b = &config.bedrock;
        Self {
            region: config.aws.region.clone(),
            model_id: b.model_id.clone(),
            agent_id: b.agent_id.clone(),
            agent_alias_id: b.agent_alias_id.clone(),
            flow_id: b.flow_id.clone(),
            flow_alias_id: b.flow_alias_id.clone(),
            knowledge_base_id: b.knowledge_base_id.clone(),
        }
    }
}

/// One chat message as posted by the front end.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    pub mode: ResponseMode,
    pub prompt: String,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub history: Vec<ChatTurn>,
    #[serde(default)]
    pub model_id: Option<String>,
    #[serde(default)]
    pub agent_id: Option<String>,
    #[serde(default)]
    pub agent_alias_id: Option<String>,
    #[serde(default)]
    pub flow_id: Option<String>,
    #[serde(default)]
    pub flow_alias_id: Option<String>,
    #[serde(default)]
    pub knowledge_base_id: Option<String>,
    #[serde(default)]
    pub inference: InferenceParams,
    #[serde(default = "default_enable_trace")]
    pub enable_trace: bool,
    /// Flow input given as fields instead of text.
    #[serde(default)]
    pub document: Option<Map<String, Value>>,
}

fn default_enable_trace() -> bool {
    true
}

impl ChatRequest {
    pub fn new(mode: ResponseMode, prompt: impl Into<String>) -> Self {
        Self {
            mode,
            prompt: prompt.into(),
            session_id: None,
            history: Vec::new(),
            model_id: None,
            agent_id: None,
            agent_alias_id: None,
            flow_id: None,
            flow_alias_id: None,
            knowledge_base_id: None,
            inference: InferenceParams::default(),
            enable_trace: true,
            document: None,
        }
    }
}

/// Request value wins when present and non-blank.
fn pick(request: Option<&String>, default: Option<&String>) -> Option<String> {
    request
        .filter(|s| !s.trim().is_empty())
        .or(default.filter(|s| !s.trim().is_empty()))
        .cloned()
}

pub struct Assistant {
    transport: Arc<dyn BedrockTransport>,
    defaults: AssistantDefaults,
    artifact: Option<TraceArtifact>,
}

impl Assistant {
    pub fn new(
        transport: Arc<dyn BedrockTransport>,
        defaults: AssistantDefaults,
        artifact: Option<TraceArtifact>,
    ) -> Self {
        Self {
            transport,
            defaults,
            artifact,
        }
    }

    pub fn defaults(&self) -> &AssistantDefaults {
        &self.defaults
    }

    pub fn artifact(&self) -> Option<&TraceArtifact> {
        self.artifact.as_ref()
    }

    fn model_id(&self, requested: Option<&String>) -> String {
        pick(requested, Some(&self.defaults.model_id)).unwrap_or_default()
    }

    /// Dispatch one chat message on its mode. Never fails: provider errors come back as
    /// `ResponseType::Error` results.
    pub async fn respond(&self, request: &ChatRequest) -> InvocationResult {
        match request.mode {
            ResponseMode::FoundationModel => {
                let model_id = self.model_id(request.model_id.as_ref());
                self.invoke_model(&model_id, &request.prompt, &request.inference)
                    .await
            }
            ResponseMode::Converse => {
                let model_id = self.model_id(request.model_id.as_ref());
                self.converse(
                    &model_id,
                    &request.prompt,
                    &request.history,
                    &request.inference,
                )
                .await
            }
            ResponseMode::Agent => {
                let agent_id = pick(request.agent_id.as_ref(), self.defaults.agent_id.as_ref());
                let alias_id = pick(
                    request.agent_alias_id.as_ref(),
                    self.defaults.agent_alias_id.as_ref(),
                );
                self.invoke_agent(
                    agent_id,
                    alias_id,
                    request.session_id.clone(),
                    &request.prompt,
                    request.enable_trace,
                )
                .await
            }
            ResponseMode::Flow => {
                let flow_id = pick(request.flow_id.as_ref(), self.defaults.flow_id.as_ref());
                let alias_id = pick(
                    request.flow_alias_id.as_ref(),
                    self.defaults.flow_alias_id.as_ref(),
                );
                self.invoke_flow(
                    flow_id,
                    alias_id,
                    &request.prompt,
                    request.document.as_ref(),
                    request.enable_trace,
                )
                .await
            }
            ResponseMode::KnowledgeBaseRetrieve => {
                let kb_id = pick(
                    request.knowledge_base_id.as_ref(),
                    self.defaults.knowledge_base_id.as_ref(),
                );
                self.retrieve(kb_id, &request.prompt).await
            }
            ResponseMode::KnowledgeBaseGenerate => {
                let kb_id = pick(
                    request.knowledge_base_id.as_ref(),
                    self.defaults.knowledge_base_id.as_ref(),
                );
                let model_id = self.model_id(request.model_id.as_ref());
                self.retrieve_and_generate(kb_id, &model_id, &request.prompt)
                    .await
            }
        }
    }
}
