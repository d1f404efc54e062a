// Trace normalizer for streamed Bedrock Agent/Flow responses.
// Every trace fragment of one invocation is deep-merged into a single accumulator; the answer
// text and the execution steps are then located wherever the service happened to nest them.

mod artifact;
mod extract;

pub use artifact::TraceArtifact;
pub use extract::{
    ExecutionStep, FlowNodeSummary, StepParameter, StepSummary, classify_step,
    extract_final_text, extract_steps, summarize_flow_trace, summarize_steps,
};

use bytes::Bytes;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::warn;

/// Answer used when neither chunks nor the trace carry any text.
pub const NO_RESPONSE_PLACEHOLDER: &str = "no response could be generated";

/// One unit of a streamed agent/flow response.
#[derive(Debug, Clone, PartialEq)]
pub enum TraceEvent {
    /// Answer text bytes, in arrival order.
    Chunk(Bytes),
    Trace(TracePayload),
    /// Completion reason code (flows report e.g. "SUCCESS").
    Completion(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum TracePayload {
    /// JSON document as received on the wire, possibly wrapped in a `trace` envelope.
    Raw(Bytes),
    /// Already-decoded mapping; a `bytes` key, if any, is not part of the trace.
    Structured(Map<String, Value>),
}

/// Merged trace of one invocation.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct TraceAccumulator(Map<String, Value>);

impl TraceAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn merge(&mut self, fragment: Map<String, Value>) {
        merge_trace(&mut self.0, fragment);
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }
}

impl From<Map<String, Value>> for TraceAccumulator {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

/// Deep-merge `fragment` into `acc`. Recursion only happens where both sides hold a mapping
/// under the same key; every other collision (sequences included) is last-write-wins.
pub fn merge_trace(acc: &mut Map<String, Value>, fragment: Map<String, Value>) {
    for (key, incoming) in fragment {
        if let Value::Object(inner) = incoming {
            if let Some(Value::Object(existing)) = acc.get_mut(&key) {
                merge_trace(existing, inner);
                continue;
            }
            acc.insert(key, Value::Object(inner));
        } else {
            acc.insert(key, incoming);
        }
    }
}

/// Decode one raw trace payload: UTF-8 → JSON → unwrap a top-level `trace` envelope.
/// Returns `None` (fragment dropped) when the payload is not a JSON object.
pub fn decode_trace_fragment(raw: &[u8]) -> Option<Map<String, Value>> {
    let text = match std::str::from_utf8(raw) {
        Ok(t) => t,
        Err(e) => {
            warn!(error = %e, "trace fragment is not UTF-8; dropped");
            return None;
        }
    };
    let parsed: Value = match serde_json::from_str(text) {
        Ok(v) => v,
        Err(e) => {
            warn!(error = %e, "trace fragment is not JSON; dropped");
            return None;
        }
    };
    let Value::Object(mut map) = parsed else {
        warn!("trace fragment is not a JSON object; dropped");
        return None;
    };
    match map.remove("trace") {
        Some(Value::Object(inner)) => Some(inner),
        Some(_) => {
            warn!("trace envelope does not hold an object; dropped");
            None
        }
        None => Some(map),
    }
}

/// Turn a trace event payload into a mergeable fragment, or `None` if there is nothing to merge.
pub fn fragment_from_event(payload: &TracePayload) -> Option<Map<String, Value>> {
    match payload {
        TracePayload::Raw(bytes) if bytes.is_empty() => None,
        TracePayload::Raw(bytes) => decode_trace_fragment(bytes),
        TracePayload::Structured(map) => {
            let fragment: Map<String, Value> = map
                .iter()
                .filter(|(k, _)| k.as_str() != "bytes")
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect();
            (!fragment.is_empty()).then_some(fragment)
        }
    }
}

/// Normalized result of one agent invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct InvocationOutcome {
    pub text: String,
    pub trace: TraceAccumulator,
    pub step_summary: StepSummary,
}

/// Chunks win; otherwise the trace's final response; otherwise the placeholder.
pub fn compose_invocation_result(chunks: &[String], trace: TraceAccumulator) -> InvocationOutcome {
    let mut text = chunks.concat();
    if text.is_empty() {
        text = extract_final_text(trace.as_map())
            .unwrap_or_else(|| NO_RESPONSE_PLACEHOLDER.to_string());
    }
    let step_summary = summarize_steps(extract_steps(trace.as_map()));
    InvocationOutcome {
        text,
        trace,
        step_summary,
    }
}

/// Consumes the events of one invocation in arrival order.
#[derive(Debug, Default)]
pub struct TraceCollector {
    chunks: Vec<String>,
    trace: TraceAccumulator,
    completion: Option<String>,
    dropped_fragments: usize,
}

impl TraceCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, event: TraceEvent) {
        match event {
            TraceEvent::Chunk(bytes) => {
                if !bytes.is_empty() {
                    self.chunks.push(String::from_utf8_lossy(&bytes).into_owned());
                }
            }
            TraceEvent::Trace(payload) => match fragment_from_event(&payload) {
                Some(fragment) => self.trace.merge(fragment),
                None => self.dropped_fragments += 1,
            },
            TraceEvent::Completion(reason) => self.completion = Some(reason),
        }
    }

    pub fn completion(&self) -> Option<&str> {
        self.completion.as_deref()
    }

    pub fn dropped_fragments(&self) -> usize {
        self.dropped_fragments
    }

    /// Compose the result and, when an artifact is given, persist the merged trace (best effort).
    pub async fn finish(self, artifact: Option<&TraceArtifact>) -> InvocationOutcome {
        if self.dropped_fragments > 0 {
            warn!(
                dropped = self.dropped_fragments,
                "trace fragments dropped during merge"
            );
        }
        let outcome = compose_invocation_result(&self.chunks, self.trace);
        if let Some(artifact) = artifact
            && !outcome.trace.is_empty()
        {
            artifact.write(&outcome.trace).await;
        }
        outcome
    }
}

impl Extend<TraceEvent> for TraceCollector {
    fn extend<I: IntoIterator<Item = TraceEvent>>(&mut self, events: I) {
        for event in events {
            self.push(event);
        }
    }
}
