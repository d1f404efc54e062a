// InvokeAgent: stream events through the trace normalizer

use super::{AgentRequest, Assistant};
use crate::models::{InvocationResult, ResponseType};
use crate::trace::TraceCollector;
use serde_json::json;
use tracing::{error, info, instrument};

fn fallback_session_id() -> String {
    format!("session-{}", chrono::Utc::now().timestamp())
}

impl Assistant {
    /// Missing agent or alias ids produce an error result, not a call.
    #[instrument(skip(self, input_text), fields(operation = "invoke_agent"))]
    pub async fn invoke_agent(
        &self,
        agent_id: Option<String>,
        agent_alias_id: Option<String>,
        session_id: Option<String>,
        input_text: &str,
        enable_trace: bool,
    ) -> InvocationResult {
        let (Some(agent_id), Some(agent_alias_id)) = (agent_id, agent_alias_id) else {
            error!("agent id or agent alias id is not configured");
            let mut result = InvocationResult::error(
                "Agent ID or Agent Alias ID is not configured. Check the assistant settings.",
            );
            result.trace = Some(json!({"error": "Agent ID or Agent Alias ID is not set"}));
            return result;
        };
        let session_id = session_id
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(fallback_session_id);
        let request = AgentRequest {
            agent_id,
            agent_alias_id,
            session_id: session_id.clone(),
            input_text: input_text.to_string(),
            enable_trace,
        };
        info!(
            agent_id = %request.agent_id,
            alias_id = %request.agent_alias_id,
            enable_trace,
            "invoking agent"
        );

        let events = match self.transport.invoke_agent(&request).await {
            Ok(events) => events,
            Err(e) => {
                error!(error = %e, "agent invocation failed");
                let mut result = InvocationResult::error(format!("Agent call failed: {e}"));
                result.trace = Some(json!({"error": e.to_string(), "error_type": "invocation"}));
                result.session_id = Some(session_id);
                return result;
            }
        };

        let mut collector = TraceCollector::new();
        collector.extend(events);
        let outcome = collector.finish(self.artifact.as_ref()).await;
        info!(
            chars = outcome.text.len(),
            steps = outcome.step_summary.steps_count,
            "agent response composed"
        );

        let mut result = InvocationResult::text(ResponseType::Agent, outcome.text);
        result.trace = Some(outcome.trace.into_value());
        result.step_summary = Some(outcome.step_summary);
        result.session_id = Some(session_id);
        result
    }
}
