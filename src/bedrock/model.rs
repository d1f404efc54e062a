// InvokeModel, Converse and the foundation model catalog

use super::Assistant;
use crate::error::ProviderError;
use crate::models::{
    ChatTurn, FoundationModelInfo, InferenceParams, InvocationResult, ResponseType,
};
use serde_json::{Value, json};
use tracing::{error, info, instrument};

const ANTHROPIC_VERSION: &str = "bedrock-2023-05-31";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelFamily {
    Claude,
    Titan,
}

impl ModelFamily {
    pub fn of(model_id: &str) -> Option<Self> {
        if model_id.contains("anthropic.claude") {
            Some(ModelFamily::Claude)
        } else if model_id.contains("amazon.titan") {
            Some(ModelFamily::Titan)
        } else {
            None
        }
    }
}

pub fn claude_body(prompt: &str, params: &InferenceParams) -> Value {
    json!({
        "anthropic_version": ANTHROPIC_VERSION,
        "max_tokens": params.max_tokens,
        "temperature": params.temperature,
        "top_p": params.top_p,
        "top_k": params.top_k,
        "messages": [{"role": "user", "content": prompt}],
    })
}

pub fn titan_body(prompt: &str, params: &InferenceParams) -> Value {
    json!({
        "inputText": prompt,
        "textGenerationConfig": {
            "maxTokenCount": params.max_tokens,
            "temperature": params.temperature,
            "topP": params.top_p,
        },
    })
}

fn text_at(response: &Value, pointer: &str) -> Result<String, ProviderError> {
    response
        .pointer(pointer)
        .and_then(Value::as_str)
        .map(str::to_owned)
        .ok_or_else(|| ProviderError::Decode(format!("response has no text at {pointer}")))
}

pub(crate) fn response_text(family: ModelFamily, response: &Value) -> Result<String, ProviderError> {
    match family {
        ModelFamily::Claude => text_at(response, "/content/0/text"),
        ModelFamily::Titan => text_at(response, "/results/0/outputText"),
    }
}

/// History then the new user message, in Converse `messages` shape.
pub fn converse_messages(history: &[ChatTurn], prompt: &str) -> Vec<Value> {
    history
        .iter()
        .map(|turn| json!({"role": turn.role, "content": [{"text": turn.content}]}))
        .chain(std::iter::once(
            json!({"role": "user", "content": [{"text": prompt}]}),
        ))
        .collect()
}

/// Concatenation of every text block in `output.message.content`.
pub fn converse_text(response: &Value) -> String {
    response
        .pointer("/output/message/content")
        .and_then(Value::as_array)
        .map(|blocks| {
            blocks
                .iter()
                .filter_map(|b| b.get("text").and_then(Value::as_str))
                .collect()
        })
        .unwrap_or_default()
}

pub fn display_name(model_id: &str) -> String {
    let suffix = model_id.rsplit('.').next().unwrap_or(model_id);
    if model_id.contains("claude-3-5-sonnet") {
        "Claude 3.5 Sonnet".into()
    } else if model_id.contains("claude-3-5-haiku") {
        "Claude 3.5 Haiku".into()
    } else if model_id.contains("claude-3-opus") {
        "Claude 3 Opus".into()
    } else if model_id.contains("claude-3-sonnet") {
        "Claude 3 Sonnet".into()
    } else if model_id.contains("claude-3-haiku") {
        "Claude 3 Haiku".into()
    } else if model_id.contains("claude") {
        format!("Claude ({suffix})")
    } else {
        format!("Claude Model ({suffix})")
    }
}

fn has_modality(summary: &Value, key: &str) -> bool {
    summary
        .get(key)
        .and_then(Value::as_array)
        .is_some_and(|m| m.iter().any(|v| v == "TEXT"))
}

/// Claude text-in/text-out models from a ListFoundationModels response, minus the Claude 4 line.
pub fn foundation_models(response: &Value) -> Vec<FoundationModelInfo> {
    let Some(summaries) = response.get("modelSummaries").and_then(Value::as_array) else {
        return Vec::new();
    };
    summaries
        .iter()
        .filter_map(|s| {
            let model_id = s.get("modelId")?.as_str()?;
            let lower = model_id.to_lowercase();
            let eligible = model_id.contains("anthropic.claude")
                && has_modality(s, "inputModalities")
                && has_modality(s, "outputModalities")
                && !lower.contains("claude-4")
                && !lower.contains("opus-4");
            eligible.then(|| FoundationModelInfo {
                model_id: model_id.to_owned(),
                model_name: s
                    .get("modelName")
                    .and_then(Value::as_str)
                    .unwrap_or(model_id)
                    .to_owned(),
                provider_name: s
                    .get("providerName")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_owned(),
                display_name: display_name(model_id),
            })
        })
        .collect()
}

impl Assistant {
    #[instrument(skip(self, prompt, params), fields(operation = "invoke_model"))]
    pub async fn invoke_model(
        &self,
        model_id: &str,
        prompt: &str,
        params: &InferenceParams,
    ) -> InvocationResult {
        match self.model_text(model_id, prompt, params).await {
            Ok(text) => InvocationResult::text(ResponseType::FoundationModel, text),
            Err(e) => {
                error!(error = %e, "model invocation failed");
                InvocationResult::error(format!("Foundation model call failed: {e}"))
            }
        }
    }

    /// Single-prompt completion; shared by the foundation model mode, the cluster assistant
    /// and flow field extraction.
    pub(crate) async fn model_text(
        &self,
        model_id: &str,
        prompt: &str,
        params: &InferenceParams,
    ) -> Result<String, ProviderError> {
        let family = ModelFamily::of(model_id)
            .ok_or_else(|| ProviderError::UnsupportedModel(model_id.to_string()))?;
        let body = match family {
            ModelFamily::Claude => claude_body(prompt, params),
            ModelFamily::Titan => titan_body(prompt, params),
        };
        info!(model_id, "invoking foundation model");
        let response = self.transport.invoke_model(model_id, body).await?;
        response_text(family, &response)
    }

    #[instrument(skip(self, prompt, history, params), fields(operation = "converse"))]
    pub async fn converse(
        &self,
        model_id: &str,
        prompt: &str,
        history: &[ChatTurn],
        params: &InferenceParams,
    ) -> InvocationResult {
        let request = json!({
            "messages": converse_messages(history, prompt),
            "inferenceConfig": {
                "temperature": params.temperature,
                "maxTokens": params.max_tokens,
            },
        });
        info!(model_id, turns = history.len(), "calling converse");
        match self.transport.converse(model_id, request).await {
            Ok(response) => {
                let text = converse_text(&response);
                let mut updated = history.to_vec();
                updated.push(ChatTurn::user(prompt));
                updated.push(ChatTurn::assistant(text.clone()));
                let mut result = InvocationResult::text(ResponseType::Converse, text);
                result.conversation_history = Some(updated);
                result
            }
            Err(e) => {
                error!(error = %e, "converse failed");
                let mut result = InvocationResult::error(format!("Converse call failed: {e}"));
                result.conversation_history = Some(history.to_vec());
                result
            }
        }
    }

    #[instrument(skip(self), fields(operation = "list_models"))]
    pub async fn list_models(&self) -> Result<Vec<FoundationModelInfo>, ProviderError> {
        let response = self.transport.list_foundation_models().await?;
        Ok(foundation_models(&response))
    }
}
