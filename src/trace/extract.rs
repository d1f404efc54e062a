// Locating the final answer and the execution steps inside a merged trace.
// Fixed paths are tried first; a tree search over the JSON value is the fallback.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

const FINAL_TEXT_PATHS: [&[&str]; 2] = [
    &["orchestrationTrace", "observation", "finalResponse", "text"],
    &["observation", "finalResponse", "text"],
];

const STEP_PATHS: [&[&str]; 5] = [
    &["orchestrationTrace", "invocationInput", "steps"],
    &["orchestrationTrace", "invocationInput"],
    &["invocationInput", "steps"],
    &["invocationInput"],
    &["observation"],
];

/// Levels below the root that the step search may descend.
const STEP_SEARCH_MAX_DEPTH: usize = 5;

const STEP_MARKER_KEYS: [&str; 2] = ["actionGroupInvocationInput", "invocationType"];

fn resolve<'a>(root: &'a Map<String, Value>, path: &[&str]) -> Option<&'a Value> {
    let (first, rest) = path.split_first()?;
    let mut current = root.get(*first)?;
    for key in rest {
        current = current.as_object()?.get(*key)?;
    }
    Some(current)
}

fn non_empty_str(value: &Value) -> Option<&str> {
    value.as_str().filter(|s| !s.is_empty())
}

/// The agent's final answer, from the known paths in priority order, else the first
/// `finalResponse.text` found anywhere in the mapping tree. Empty strings count as absent.
pub fn extract_final_text(trace: &Map<String, Value>) -> Option<String> {
    FINAL_TEXT_PATHS
        .iter()
        .find_map(|path| resolve(trace, path).and_then(non_empty_str))
        .or_else(|| find_final_response(trace))
        .map(str::to_owned)
}

fn find_final_response(map: &Map<String, Value>) -> Option<&str> {
    if let Some(text) = map
        .get("finalResponse")
        .and_then(Value::as_object)
        .and_then(|fr| fr.get("text"))
        .and_then(non_empty_str)
    {
        return Some(text);
    }
    map.values()
        .filter_map(Value::as_object)
        .find_map(find_final_response)
}

/// Execution steps of the agent, classified. Empty when the trace has no step-shaped data.
pub fn extract_steps(trace: &Map<String, Value>) -> Vec<ExecutionStep> {
    for path in STEP_PATHS {
        if let Some(Value::Array(items)) = resolve(trace, path) {
            debug!(path = %path.join(">"), steps = items.len(), "steps found at fixed path");
            return items.iter().map(classify_step).collect();
        }
    }
    find_steps_in_map(trace, 0)
        .map(|items| items.iter().map(classify_step).collect())
        .unwrap_or_default()
}

fn find_steps_in_map(map: &Map<String, Value>, depth: usize) -> Option<&Vec<Value>> {
    if let Some(Value::Array(steps)) = map.get("steps") {
        return Some(steps);
    }
    map.values()
        .filter_map(|v| find_steps(v, depth + 1))
        .find(|steps| !steps.is_empty())
}

fn find_steps(value: &Value, depth: usize) -> Option<&Vec<Value>> {
    if depth > STEP_SEARCH_MAX_DEPTH {
        return None;
    }
    match value {
        Value::Object(map) => find_steps_in_map(map, depth),
        Value::Array(items) => {
            let all_maps = items.iter().all(Value::is_object);
            let any_marked = items.iter().any(|item| {
                item.as_object()
                    .is_some_and(|m| STEP_MARKER_KEYS.iter().any(|k| m.contains_key(*k)))
            });
            (all_maps && any_marked).then_some(items)
        }
        _ => None,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepParameter {
    pub name: String,
    pub value: String,
}

/// One unit of agent orchestration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExecutionStep {
    /// An action-group API invocation.
    ApiCall {
        api_path: Option<String>,
        verb: Option<String>,
        action_group: Option<String>,
        parameters: Vec<StepParameter>,
        raw: Value,
    },
    /// Internal reasoning or knowledge-base lookup.
    Internal {
        invocation_type: Option<String>,
        raw: Value,
    },
}

impl ExecutionStep {
    pub fn is_api_call(&self) -> bool {
        matches!(self, ExecutionStep::ApiCall { .. })
    }
}

fn string_field(map: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter()
        .find_map(|k| map.get(*k).and_then(Value::as_str))
        .map(str::to_owned)
}

fn parameters(action: &Map<String, Value>) -> Vec<StepParameter> {
    let Some(Value::Array(params)) = action.get("parameters") else {
        return Vec::new();
    };
    params
        .iter()
        .filter_map(Value::as_object)
        .map(|p| StepParameter {
            name: string_field(p, &["name"]).unwrap_or_default(),
            value: match p.get("value") {
                Some(Value::String(s)) => s.clone(),
                Some(Value::Null) | None => String::new(),
                Some(other) => other.to_string(),
            },
        })
        .collect()
}

/// API call when the step carries `action` or `actionGroupInvocationInput`; internal otherwise.
pub fn classify_step(step: &Value) -> ExecutionStep {
    let Some(map) = step.as_object() else {
        return ExecutionStep::Internal {
            invocation_type: None,
            raw: step.clone(),
        };
    };
    let action = ["action", "actionGroupInvocationInput"]
        .iter()
        .find_map(|k| map.get(*k).and_then(Value::as_object));
    match action {
        Some(action) => ExecutionStep::ApiCall {
            api_path: string_field(action, &["apiPath"]),
            verb: string_field(action, &["httpMethod", "verb"]),
            action_group: string_field(action, &["actionGroupName"]),
            parameters: parameters(action),
            raw: step.clone(),
        },
        None => ExecutionStep::Internal {
            invocation_type: string_field(map, &["invocationType"]),
            raw: step.clone(),
        },
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepSummary {
    pub steps_count: usize,
    pub api_calls: usize,
    pub steps: Vec<ExecutionStep>,
}

pub fn summarize_steps(steps: Vec<ExecutionStep>) -> StepSummary {
    StepSummary {
        steps_count: steps.len(),
        api_calls: steps.iter().filter(|s| s.is_api_call()).count(),
        steps,
    }
}

/// One node-level entry of a flow execution trace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowNodeSummary {
    pub node_name: String,
    /// Trace kind, e.g. "nodeInputTrace" or "nodeOutputTrace".
    pub trace_kind: String,
}

/// Summarize flow trace fragments (`{"<kind>": {"nodeName": ..}}`) in arrival order.
pub fn summarize_flow_trace(fragments: &[Map<String, Value>]) -> Vec<FlowNodeSummary> {
    fragments
        .iter()
        .flat_map(|fragment| fragment.iter())
        .filter_map(|(kind, body)| {
            let node_name = body.as_object()?.get("nodeName")?.as_str()?;
            Some(FlowNodeSummary {
                node_name: node_name.to_owned(),
                trace_kind: kind.clone(),
            })
        })
        .collect()
}
