// Bedrock REST transport over reqwest, authenticated with a Bedrock API key (bearer token)

use super::event_stream::{Message, MessageDecoder};
use super::{AgentRequest, BedrockTransport, FlowRequest, FlowStream};
use crate::config::AppConfig;
use crate::error::{ProviderError, ensure_success};
use crate::trace::{TraceEvent, TracePayload};
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use bytes::Bytes;
use futures_util::StreamExt;
use serde_json::{Value, json};
use std::time::Duration;
use tracing::debug;

const FLOW_EXECUTION_ID_HEADER: &str = "x-amz-bedrock-flow-execution-id";

pub struct BedrockHttpClient {
    http: reqwest::Client,
    runtime: reqwest::Url,
    agent_runtime: reqwest::Url,
    control: reqwest::Url,
    api_key: Option<String>,
}

fn endpoint(configured: Option<&String>, default: String) -> anyhow::Result<reqwest::Url> {
    let raw = configured.cloned().unwrap_or(default);
    reqwest::Url::parse(&raw).map_err(|e| anyhow::anyhow!("invalid Bedrock endpoint {raw:?}: {e}"))
}

impl BedrockHttpClient {
    pub fn from_config(config: &AppConfig) -> anyhow::Result<Self> {
        let region = &config.aws.region;
        let b = &config.bedrock;
        Ok(Self {
            http: reqwest::Client::builder()
                .timeout(Duration::from_secs(b.request_timeout_secs))
                .build()?,
            runtime: endpoint(
                b.runtime_endpoint.as_ref(),
                format!("https://bedrock-runtime.{region}.amazonaws.com"),
            )?,
            agent_runtime: endpoint(
                b.agent_runtime_endpoint.as_ref(),
                format!("https://bedrock-agent-runtime.{region}.amazonaws.com"),
            )?,
            control: endpoint(
                b.control_endpoint.as_ref(),
                format!("https://bedrock.{region}.amazonaws.com"),
            )?,
            api_key: b.api_key.clone(),
        })
    }

    /// Base URL plus path segments, each escaped as a single segment.
    fn url(base: &reqwest::Url, segments: &[&str]) -> Result<reqwest::Url, ProviderError> {
        let mut url = base.clone();
        url.path_segments_mut()
            .map_err(|_| ProviderError::Decode(format!("endpoint {base} cannot carry a path")))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn request(&self, method: reqwest::Method, url: reqwest::Url) -> reqwest::RequestBuilder {
        let builder = self.http.request(method, url);
        match &self.api_key {
            Some(key) => builder.bearer_auth(key),
            None => builder,
        }
    }

    async fn post_json(
        &self,
        service: &'static str,
        url: reqwest::Url,
        body: &Value,
    ) -> Result<Value, ProviderError> {
        let response = self
            .request(reqwest::Method::POST, url)
            .json(body)
            .send()
            .await?;
        Ok(ensure_success(service, response).await?.json().await?)
    }

    /// Drain an event-stream body into messages.
    async fn read_messages(
        service: &'static str,
        response: reqwest::Response,
    ) -> Result<Vec<Message>, ProviderError> {
        let mut decoder = MessageDecoder::new();
        let mut messages = Vec::new();
        let mut body = response.bytes_stream();
        while let Some(chunk) = body.next().await {
            decoder.feed(&chunk?);
            while let Some(message) = decoder.next_message()? {
                check_exception(service, &message)?;
                messages.push(message);
            }
        }
        decoder.finish()?;
        Ok(messages)
    }
}

/// Exception and error frames end the call.
fn check_exception(service: &'static str, message: &Message) -> Result<(), ProviderError> {
    match message.message_type() {
        Some("exception") | Some("error") => {
            let kind = message
                .exception_type()
                .or_else(|| message.header_str(":error-code"))
                .unwrap_or("UnknownException")
                .to_string();
            let text = serde_json::from_slice::<Value>(&message.payload)
                .ok()
                .and_then(|v| v.get("message").and_then(Value::as_str).map(str::to_owned))
                .or_else(|| message.header_str(":error-message").map(str::to_owned))
                .unwrap_or_else(|| String::from_utf8_lossy(&message.payload).into_owned());
            Err(ProviderError::StreamException {
                service,
                kind,
                message: text,
            })
        }
        _ => Ok(()),
    }
}

/// InvokeAgent frames: `chunk` carries base64 answer bytes, `trace` a JSON trace envelope.
pub(crate) fn agent_event(message: &Message) -> Result<Option<TraceEvent>, ProviderError> {
    match message.event_type() {
        Some("chunk") => {
            let part: Value = serde_json::from_slice(&message.payload)?;
            let encoded = part.get("bytes").and_then(Value::as_str).unwrap_or_default();
            let decoded = STANDARD
                .decode(encoded)
                .map_err(|e| ProviderError::Decode(format!("chunk bytes: {e}")))?;
            Ok(Some(TraceEvent::Chunk(Bytes::from(decoded))))
        }
        Some("trace") => Ok(Some(TraceEvent::Trace(TracePayload::Raw(
            message.payload.clone(),
        )))),
        other => {
            debug!(event_type = ?other, "ignoring agent stream event");
            Ok(None)
        }
    }
}

/// InvokeFlow frames: outputs become chunks, node traces stay raw, completion carries the reason.
pub(crate) fn flow_event(message: &Message) -> Result<Option<TraceEvent>, ProviderError> {
    match message.event_type() {
        Some("flowOutputEvent") => {
            let event: Value = serde_json::from_slice(&message.payload)?;
            let text = match event.pointer("/content/document") {
                Some(Value::String(s)) => s.clone(),
                Some(doc) => serde_json::to_string_pretty(doc)?,
                None => return Ok(None),
            };
            Ok(Some(TraceEvent::Chunk(Bytes::from(text))))
        }
        Some("flowTraceEvent") => Ok(Some(TraceEvent::Trace(TracePayload::Raw(
            message.payload.clone(),
        )))),
        Some("flowCompletionEvent") => {
            let event: Value = serde_json::from_slice(&message.payload)?;
            let reason = event
                .get("completionReason")
                .and_then(Value::as_str)
                .unwrap_or("UNKNOWN");
            Ok(Some(TraceEvent::Completion(reason.to_string())))
        }
        other => {
            debug!(event_type = ?other, "ignoring flow stream event");
            Ok(None)
        }
    }
}

#[async_trait]
impl BedrockTransport for BedrockHttpClient {
    async fn invoke_model(&self, model_id: &str, body: Value) -> Result<Value, ProviderError> {
        let url = Self::url(&self.runtime, &["model", model_id, "invoke"])?;
        self.post_json("bedrock-runtime", url, &body).await
    }

    async fn converse(&self, model_id: &str, request: Value) -> Result<Value, ProviderError> {
        let url = Self::url(&self.runtime, &["model", model_id, "converse"])?;
        self.post_json("bedrock-runtime", url, &request).await
    }

    async fn invoke_agent(&self, request: &AgentRequest) -> Result<Vec<TraceEvent>, ProviderError> {
        let url = Self::url(
            &self.agent_runtime,
            &[
                "agents",
                &request.agent_id,
                "agentAliases",
                &request.agent_alias_id,
                "sessions",
                &request.session_id,
                "text",
            ],
        )?;
        let body = json!({"inputText": request.input_text, "enableTrace": request.enable_trace});
        let response = self
            .request(reqwest::Method::POST, url)
            .json(&body)
            .send()
            .await?;
        let response = ensure_success("bedrock-agent-runtime", response).await?;
        let messages = Self::read_messages("bedrock-agent-runtime", response).await?;
        let mut events = Vec::with_capacity(messages.len());
        for message in &messages {
            events.extend(agent_event(message)?);
        }
        Ok(events)
    }

    async fn invoke_flow(&self, request: &FlowRequest) -> Result<FlowStream, ProviderError> {
        let alias = request
            .flow_alias_id
            .as_deref()
            .ok_or(ProviderError::NotConfigured("flow alias id"))?;
        let url = Self::url(&self.agent_runtime, &["flows", &request.flow_id, "aliases", alias])?;
        let body = json!({
            "inputs": [{
                "nodeName": "FlowInputNode",
                "nodeOutputName": "document",
                "content": {"document": request.document},
            }],
            "enableTrace": request.enable_trace,
        });
        let response = self
            .request(reqwest::Method::POST, url)
            .json(&body)
            .send()
            .await?;
        let response = ensure_success("bedrock-agent-runtime", response).await?;
        let execution_id = response
            .headers()
            .get(FLOW_EXECUTION_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);
        let messages = Self::read_messages("bedrock-agent-runtime", response).await?;
        let mut events = Vec::with_capacity(messages.len());
        for message in &messages {
            events.extend(flow_event(message)?);
        }
        Ok(FlowStream {
            execution_id,
            events,
        })
    }

    async fn retrieve(&self, knowledge_base_id: &str, request: Value) -> Result<Value, ProviderError> {
        let url = Self::url(
            &self.agent_runtime,
            &["knowledgebases", knowledge_base_id, "retrieve"],
        )?;
        self.post_json("bedrock-agent-runtime", url, &request).await
    }

    async fn retrieve_and_generate(&self, request: Value) -> Result<Value, ProviderError> {
        let url = Self::url(&self.agent_runtime, &["retrieveAndGenerate"])?;
        self.post_json("bedrock-agent-runtime", url, &request).await
    }

    async fn list_foundation_models(&self) -> Result<Value, ProviderError> {
        let url = Self::url(&self.control, &["foundation-models"])?;
        let response = self.request(reqwest::Method::GET, url).send().await?;
        Ok(ensure_success("bedrock", response).await?.json().await?)
    }
}
