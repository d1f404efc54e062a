// InvokeFlow: build the input document, run the flow, collect outputs and node traces

use super::{Assistant, FlowRequest};
use crate::models::{FlowDetails, FlowDocument, InferenceParams, InvocationResult, ResponseType};
use crate::trace::{TraceEvent, fragment_from_event, summarize_flow_trace};
use serde_json::{Map, Value, json};
use tracing::{error, info, instrument, warn};

const NO_OUTPUT: &str = "No output generated";
const EXTRACTION_MAX_TOKENS: u32 = 1000;

/// Prompt asking the model to turn free text into the flow's input fields.
pub fn extraction_prompt(text: &str) -> String {
    format!(
        r#"Extract the loan details from the text below and return them as JSON.

### Input text:
{text}

### Requirements:
1. Extract exactly these fields: income (annual income), totalDebt (total debt), loanTerm (loan term), loanAmount (loan amount), creditScore (credit score), mlsId (MLS number)
2. Return numeric fields as numbers and string fields as quoted strings
3. Set any value that cannot be extracted to null
4. If a monthly income is given, convert it to annual income (monthly income x 12)
5. Convert percentages to integers (e.g. 10% -> 10)
6. Strip commas and currency symbols from amounts, keeping only the number

### Output format:
Output only JSON of this shape.

{{
  "income": 123456,
  "totalDebt": 1000,
  "loanTerm": 30,
  "loanAmount": 500000,
  "creditScore": 750,
  "mlsId": "MLS-1234"
}}

### Output:
"#
    )
}

/// Parse a model reply as a JSON object; failing that, the span from the first `{` to the last `}`.
pub fn recover_json_object(text: &str) -> Option<Map<String, Value>> {
    if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(text.trim()) {
        return Some(map);
    }
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end <= start {
        return None;
    }
    match serde_json::from_str::<Value>(&text[start..=end]) {
        Ok(Value::Object(map)) => Some(map),
        _ => None,
    }
}

/// Text that looks like a JSON object and parses as one.
pub fn parse_document_text(text: &str) -> Option<FlowDocument> {
    let trimmed = text.trim();
    if !(trimmed.starts_with('{') && trimmed.ends_with('}')) {
        return None;
    }
    match serde_json::from_str::<Value>(trimmed) {
        Ok(Value::Object(map)) => Some(FlowDocument::from_map(&map)),
        _ => None,
    }
}

impl Assistant {
    /// Explicit fields win, then JSON text, then model extraction; any failure yields the defaults.
    pub async fn resolve_flow_document(
        &self,
        text: &str,
        document: Option<&Map<String, Value>>,
    ) -> FlowDocument {
        if let Some(map) = document {
            return FlowDocument::from_map(map);
        }
        if let Some(doc) = parse_document_text(text) {
            info!("flow input parsed from JSON text");
            return doc;
        }
        self.extract_flow_document(text).await
    }

    async fn extract_flow_document(&self, text: &str) -> FlowDocument {
        let params = InferenceParams {
            max_tokens: EXTRACTION_MAX_TOKENS,
            ..InferenceParams::default()
        };
        let reply = match self
            .model_text(&self.defaults.model_id, &extraction_prompt(text), &params)
            .await
        {
            Ok(reply) => reply,
            Err(e) => {
                warn!(error = %e, "flow field extraction failed, using defaults");
                return FlowDocument::default();
            }
        };
        match recover_json_object(&reply) {
            Some(map) => FlowDocument::from_map(&map),
            None => {
                warn!("no JSON object in extraction reply, using defaults");
                FlowDocument::default()
            }
        }
    }

    #[instrument(skip(self, text, document), fields(operation = "invoke_flow"))]
    pub async fn invoke_flow(
        &self,
        flow_id: Option<String>,
        flow_alias_id: Option<String>,
        text: &str,
        document: Option<&Map<String, Value>>,
        enable_trace: bool,
    ) -> InvocationResult {
        let Some(flow_id) = flow_id else {
            error!("flow id is not configured");
            return InvocationResult::error("Flow ID is not configured.");
        };
        let document = self.resolve_flow_document(text, document).await;
        let request = FlowRequest {
            flow_id,
            flow_alias_id,
            document: document.clone(),
            enable_trace,
        };
        info!(flow_id = %request.flow_id, "invoking flow");

        let stream = match self.transport.invoke_flow(&request).await {
            Ok(stream) => stream,
            Err(e) => {
                error!(error = %e, "flow invocation failed");
                let mut result = InvocationResult::error(format!("Flow call failed: {e}"));
                result.trace = Some(json!({"error": e.to_string()}));
                result.flow = Some(FlowDetails {
                    success: false,
                    reason: "EXCEPTION".into(),
                    execution_id: None,
                    extracted: document,
                    nodes: Vec::new(),
                });
                return result;
            }
        };

        let mut outputs = Vec::new();
        let mut fragments = Vec::new();
        let mut reason = None;
        for event in stream.events {
            match event {
                TraceEvent::Chunk(bytes) => outputs.push(String::from_utf8_lossy(&bytes).into_owned()),
                TraceEvent::Trace(payload) => fragments.extend(fragment_from_event(&payload)),
                TraceEvent::Completion(r) => reason = Some(r),
            }
        }
        let reason = reason.unwrap_or_else(|| "UNKNOWN".into());
        let success = reason == "SUCCESS";
        info!(outputs = outputs.len(), %reason, "flow completed");

        let output = if outputs.is_empty() {
            NO_OUTPUT.to_string()
        } else {
            outputs.join("\n")
        };
        let mut trace = Map::new();
        trace.insert("flow_execution_id".into(), json!(stream.execution_id));
        let nodes = summarize_flow_trace(&fragments);
        if !fragments.is_empty() {
            trace.insert(
                "trace_events".into(),
                Value::Array(fragments.into_iter().map(Value::Object).collect()),
            );
        }

        let mut result = InvocationResult::text(ResponseType::Flow, output);
        result.trace = Some(Value::Object(trace));
        result.flow = Some(FlowDetails {
            success,
            reason,
            execution_id: stream.execution_id,
            extracted: document,
            nodes,
        });
        result
    }
}
