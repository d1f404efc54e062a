// Assistant request/response models shared by the Bedrock adapters and routes

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::trace::{FlowNodeSummary, StepSummary};

/// Which Bedrock surface answers a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseMode {
    FoundationModel,
    Converse,
    Agent,
    Flow,
    KnowledgeBaseRetrieve,
    KnowledgeBaseGenerate,
}

/// Tag on every result; `Error` marks a provider failure rendered as text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseType {
    FoundationModel,
    Converse,
    Agent,
    Flow,
    Retrieve,
    RetrieveAndGenerate,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: ChatRole,
    pub content: String,
}

impl ChatTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

/// Sampling parameters for model invocation and Converse.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct InferenceParams {
    pub temperature: f64,
    pub max_tokens: u32,
    pub top_p: f64,
    pub top_k: u32,
}

impl Default for InferenceParams {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            max_tokens: 1024,
            top_p: 0.9,
            top_k: 250,
        }
    }
}

/// Structured document the loan-review flow expects on its input node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowDocument {
    pub income: f64,
    pub total_debt: f64,
    pub loan_term: i64,
    pub loan_amount: f64,
    pub credit_score: i64,
    pub mls_id: String,
}

impl Default for FlowDocument {
    fn default() -> Self {
        Self {
            income: 80000.0,
            total_debt: 5000.0,
            loan_term: 30,
            loan_amount: 10000.0,
            credit_score: 750,
            mls_id: "MLS-1234".into(),
        }
    }
}

impl FlowDocument {
    /// Fill from a loosely-typed mapping. Absent, null, empty or unparseable fields keep their
    /// default; numbers may arrive as JSON numbers or numeric strings.
    pub fn from_map(map: &Map<String, Value>) -> Self {
        let mut doc = Self::default();
        if let Some(v) = map.get("income").and_then(as_f64) {
            doc.income = v;
        }
        if let Some(v) = map.get("totalDebt").and_then(as_f64) {
            doc.total_debt = v;
        }
        if let Some(v) = map.get("loanTerm").and_then(as_f64) {
            doc.loan_term = v.round() as i64;
        }
        if let Some(v) = map.get("loanAmount").and_then(as_f64) {
            doc.loan_amount = v;
        }
        if let Some(v) = map.get("creditScore").and_then(as_f64) {
            doc.credit_score = v.round() as i64;
        }
        match map.get("mlsId") {
            Some(Value::String(s)) if !s.trim().is_empty() => doc.mls_id = s.clone(),
            Some(Value::Number(n)) => doc.mls_id = n.to_string(),
            _ => {}
        }
        doc
    }
}

fn as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().replace(',', "").parse().ok(),
        _ => None,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowDetails {
    pub success: bool,
    /// Completion reason reported by the flow ("SUCCESS", ...), "UNKNOWN" when none arrived.
    pub reason: String,
    pub execution_id: Option<String>,
    pub extracted: FlowDocument,
    pub nodes: Vec<FlowNodeSummary>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetrievalHit {
    pub content: String,
    pub metadata: Value,
    pub source: String,
    pub source_filename: String,
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Citation {
    pub generated_part: String,
    pub source_file: String,
    pub source_uri: String,
    pub referenced_content: String,
}

/// What every assistant call returns. Failures are `ResponseType::Error` with the message in `output`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvocationResult {
    pub response_type: ResponseType,
    pub output: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_summary: Option<StepSummary>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_history: Option<Vec<ChatTurn>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flow: Option<FlowDetails>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub results: Option<Vec<RetrievalHit>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub citations: Option<Vec<Citation>>,
}

impl InvocationResult {
    pub fn text(response_type: ResponseType, output: impl Into<String>) -> Self {
        Self {
            response_type,
            output: output.into(),
            trace: None,
            step_summary: None,
            session_id: None,
            conversation_history: None,
            flow: None,
            results: None,
            citations: None,
        }
    }

    pub fn error(output: impl Into<String>) -> Self {
        Self::text(ResponseType::Error, output)
    }

    pub fn is_error(&self) -> bool {
        self.response_type == ResponseType::Error
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FoundationModelInfo {
    pub model_id: String,
    pub model_name: String,
    pub provider_name: String,
    pub display_name: String,
}
