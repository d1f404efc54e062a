// Assistant tests: every chat mode against a fake Bedrock transport

mod common;

use common::{FakeTransport, chunk, claude_reply, raw_trace, test_app_config};
use eksboard::bedrock::{Assistant, AssistantDefaults, ChatRequest, FlowStream};
use eksboard::models::{ChatRole, ChatTurn, ResponseMode, ResponseType};
use eksboard::trace::{NO_RESPONSE_PLACEHOLDER, TraceArtifact, TraceEvent};
use serde_json::json;
use std::sync::Arc;
use tempfile::TempDir;

fn assistant(transport: &Arc<FakeTransport>) -> Assistant {
    Assistant::new(
        transport.clone(),
        AssistantDefaults::from_config(&test_app_config()),
        None,
    )
}

#[tokio::test]
async fn foundation_model_uses_claude_body() {
    let transport = Arc::new(FakeTransport {
        model_reply: Some(claude_reply("Hello from Claude")),
        ..Default::default()
    });
    let result = assistant(&transport)
        .respond(&ChatRequest::new(ResponseMode::FoundationModel, "hi"))
        .await;

    assert_eq!(result.response_type, ResponseType::FoundationModel);
    assert_eq!(result.output, "Hello from Claude");
    let calls = transport.calls();
    assert_eq!(calls[0].0, "invoke_model");
    assert_eq!(
        calls[0].1["modelId"],
        "anthropic.claude-3-sonnet-20240229-v1:0"
    );
    let body = &calls[0].1["body"];
    assert_eq!(body["anthropic_version"], "bedrock-2023-05-31");
    assert_eq!(body["messages"][0]["content"], "hi");
}

#[tokio::test]
async fn foundation_model_titan_reply() {
    let transport = Arc::new(FakeTransport {
        model_reply: Some(json!({"results": [{"outputText": "titan says hi"}]})),
        ..Default::default()
    });
    let mut request = ChatRequest::new(ResponseMode::FoundationModel, "hi");
    request.model_id = Some("amazon.titan-text-express-v1".into());
    let result = assistant(&transport).respond(&request).await;
    assert_eq!(result.output, "titan says hi");
    assert!(transport.calls()[0].1["body"].get("inputText").is_some());
}

#[tokio::test]
async fn foundation_model_failure_is_error_result() {
    let transport = Arc::new(FakeTransport::default());
    let result = assistant(&transport)
        .respond(&ChatRequest::new(ResponseMode::FoundationModel, "hi"))
        .await;
    assert!(result.is_error());
    assert!(result.output.starts_with("Foundation model call failed:"));
}

#[tokio::test]
async fn unsupported_model_is_error_without_call() {
    let transport = Arc::new(FakeTransport::default());
    let mut request = ChatRequest::new(ResponseMode::FoundationModel, "hi");
    request.model_id = Some("meta.llama3-8b-instruct-v1:0".into());
    let result = assistant(&transport).respond(&request).await;
    assert!(result.is_error());
    assert!(transport.calls().is_empty());
}

#[tokio::test]
async fn converse_extends_history() {
    let transport = Arc::new(FakeTransport {
        converse_reply: Some(json!({
            "output": {"message": {"role": "assistant", "content": [
                {"text": "Part one. "},
                {"text": "Part two."}
            ]}}
        })),
        ..Default::default()
    });
    let mut request = ChatRequest::new(ResponseMode::Converse, "and now?");
    request.history = vec![ChatTurn::user("first"), ChatTurn::assistant("reply")];
    let result = assistant(&transport).respond(&request).await;

    assert_eq!(result.response_type, ResponseType::Converse);
    assert_eq!(result.output, "Part one. Part two.");
    let history = result.conversation_history.unwrap();
    assert_eq!(history.len(), 4);
    assert_eq!(history[3].role, ChatRole::Assistant);

    let sent = &transport.calls()[0].1["request"];
    assert_eq!(sent["messages"].as_array().unwrap().len(), 3);
    assert_eq!(sent["messages"][2]["content"][0]["text"], "and now?");
}

#[tokio::test]
async fn converse_failure_keeps_history() {
    let transport = Arc::new(FakeTransport::default());
    let mut request = ChatRequest::new(ResponseMode::Converse, "q");
    request.history = vec![ChatTurn::user("earlier")];
    let result = assistant(&transport).respond(&request).await;
    assert!(result.is_error());
    assert_eq!(result.conversation_history.unwrap().len(), 1);
}

#[tokio::test]
async fn agent_concatenates_chunks_and_summarizes_steps() {
    let transport = Arc::new(FakeTransport {
        agent_events: Some(vec![
            raw_trace(json!({"trace": {"orchestrationTrace": {"invocationInput": {"steps": [
                {"action": {"apiPath": "/clusters", "httpMethod": "GET", "actionGroupName": "eks"}},
                {"invocationType": "KNOWLEDGE_BASE"}
            ]}}}})),
            chunk("Two "),
            chunk("clusters."),
        ]),
        ..Default::default()
    });
    let mut request = ChatRequest::new(ResponseMode::Agent, "how many clusters?");
    request.session_id = Some("browser-session".into());
    let result = assistant(&transport).respond(&request).await;

    assert_eq!(result.response_type, ResponseType::Agent);
    assert_eq!(result.output, "Two clusters.");
    assert_eq!(result.session_id.as_deref(), Some("browser-session"));
    let summary = result.step_summary.unwrap();
    assert_eq!(summary.steps_count, 2);
    assert_eq!(summary.api_calls, 1);

    let sent = &transport.agent_requests.lock().unwrap()[0];
    assert_eq!(sent.agent_id, "AGENT1");
    assert_eq!(sent.agent_alias_id, "ALIAS1");
    assert!(sent.enable_trace);
}

#[tokio::test]
async fn agent_without_chunks_uses_trace_final_response() {
    let transport = Arc::new(FakeTransport {
        agent_events: Some(vec![
            raw_trace(json!({"trace": {"orchestrationTrace": {"rationale": {"text": "thinking"}}}})),
            raw_trace(json!({"trace": {"orchestrationTrace": {"observation": {
                "finalResponse": {"text": "From the trace"}
            }}}})),
            TraceEvent::Trace(eksboard::trace::TracePayload::Raw(bytes::Bytes::from_static(
                b"not json",
            ))),
        ]),
        ..Default::default()
    });
    let result = assistant(&transport)
        .respond(&ChatRequest::new(ResponseMode::Agent, "q"))
        .await;

    assert_eq!(result.output, "From the trace");
    let trace = result.trace.unwrap();
    assert_eq!(
        trace["orchestrationTrace"]["rationale"]["text"],
        "thinking"
    );
    assert!(result.session_id.unwrap().starts_with("session-"));
}

#[tokio::test]
async fn agent_with_nothing_returns_placeholder() {
    let transport = Arc::new(FakeTransport {
        agent_events: Some(vec![]),
        ..Default::default()
    });
    let result = assistant(&transport)
        .respond(&ChatRequest::new(ResponseMode::Agent, "q"))
        .await;
    assert_eq!(result.output, NO_RESPONSE_PLACEHOLDER);
    assert_eq!(result.step_summary.unwrap().steps_count, 0);
}

#[tokio::test]
async fn agent_missing_ids_makes_no_call() {
    let transport = Arc::new(FakeTransport::default());
    let assistant = Assistant::new(
        transport.clone(),
        AssistantDefaults {
            model_id: "anthropic.claude-3-haiku-20240307-v1:0".into(),
            ..Default::default()
        },
        None,
    );
    let result = assistant
        .respond(&ChatRequest::new(ResponseMode::Agent, "q"))
        .await;
    assert!(result.is_error());
    assert!(result.trace.unwrap().get("error").is_some());
    assert!(transport.calls().is_empty());
}

#[tokio::test]
async fn agent_trace_is_written_to_artifact() {
    let dir = TempDir::new().unwrap();
    let transport = Arc::new(FakeTransport {
        agent_events: Some(vec![
            raw_trace(json!({"trace": {"preProcessingTrace": {"ok": true}}})),
            chunk("done"),
        ]),
        ..Default::default()
    });
    let artifact = TraceArtifact::new(dir.path().join("last_trace.json"));
    let assistant = Assistant::new(
        transport,
        AssistantDefaults::from_config(&test_app_config()),
        Some(artifact.clone()),
    );
    assistant
        .respond(&ChatRequest::new(ResponseMode::Agent, "q"))
        .await;

    assert_eq!(
        artifact.read_latest().await,
        Some(json!({"preProcessingTrace": {"ok": true}}))
    );
}

#[tokio::test]
async fn flow_collects_outputs_and_node_traces() {
    let transport = Arc::new(FakeTransport {
        flow_stream: Some(FlowStream {
            execution_id: Some("exec-1".into()),
            events: vec![
                raw_trace(json!({"trace": {"nodeInputTrace": {"nodeName": "FlowInputNode"}}})),
                raw_trace(json!({"trace": {"nodeOutputTrace": {"nodeName": "Decision"}}})),
                chunk("Approved"),
                chunk("Rate 6.1%"),
                TraceEvent::Completion("SUCCESS".into()),
            ],
        }),
        ..Default::default()
    });
    let request = ChatRequest::new(
        ResponseMode::Flow,
        r#"{"income": "120,000", "creditScore": 780, "mlsId": "MLS-9"}"#,
    );
    let result = assistant(&transport).respond(&request).await;

    assert_eq!(result.response_type, ResponseType::Flow);
    assert_eq!(result.output, "Approved\nRate 6.1%");
    let flow = result.flow.unwrap();
    assert!(flow.success);
    assert_eq!(flow.reason, "SUCCESS");
    assert_eq!(flow.execution_id.as_deref(), Some("exec-1"));
    assert_eq!(flow.extracted.income, 120000.0);
    assert_eq!(flow.extracted.credit_score, 780);
    assert_eq!(flow.extracted.loan_term, 30);
    assert_eq!(flow.nodes.len(), 2);
    assert_eq!(flow.nodes[1].node_name, "Decision");
    assert_eq!(flow.nodes[1].trace_kind, "nodeOutputTrace");

    let trace = result.trace.unwrap();
    assert_eq!(trace["flow_execution_id"], "exec-1");
    assert_eq!(trace["trace_events"].as_array().unwrap().len(), 2);

    let sent = &transport.flow_requests.lock().unwrap()[0];
    assert_eq!(sent.flow_id, "FLOW1");
    assert_eq!(sent.flow_alias_id.as_deref(), Some("FLOWALIAS1"));
    assert!(transport.calls().iter().all(|(op, _)| op != "invoke_model"));
}

#[tokio::test]
async fn flow_extracts_fields_from_free_text_with_model() {
    let transport = Arc::new(FakeTransport {
        model_reply: Some(claude_reply(
            "Sure! Here it is:\n{\"income\": 60000, \"loanAmount\": null, \"mlsId\": \"MLS-77\"}",
        )),
        flow_stream: Some(FlowStream::default()),
        ..Default::default()
    });
    let result = assistant(&transport)
        .respond(&ChatRequest::new(
            ResponseMode::Flow,
            "I earn 5000 a month, listing MLS-77",
        ))
        .await;

    let flow = result.flow.unwrap();
    assert_eq!(result.output, "No output generated");
    assert!(!flow.success);
    assert_eq!(flow.reason, "UNKNOWN");
    assert_eq!(flow.extracted.income, 60000.0);
    assert_eq!(flow.extracted.loan_amount, 10000.0);
    assert_eq!(flow.extracted.mls_id, "MLS-77");
    let body = &transport.calls()[0].1["body"];
    assert_eq!(body["max_tokens"], 1000);
}

#[tokio::test]
async fn flow_explicit_document_wins() {
    let transport = Arc::new(FakeTransport {
        flow_stream: Some(FlowStream::default()),
        ..Default::default()
    });
    let mut request = ChatRequest::new(ResponseMode::Flow, "ignored text");
    request.document = json!({"loanTerm": 15}).as_object().cloned();
    let result = assistant(&transport).respond(&request).await;
    assert_eq!(result.flow.unwrap().extracted.loan_term, 15);
    assert_eq!(transport.calls().len(), 1);
}

#[tokio::test]
async fn flow_failure_reports_exception() {
    let transport = Arc::new(FakeTransport::default());
    let result = assistant(&transport)
        .respond(&ChatRequest::new(ResponseMode::Flow, "{\"income\": 1}"))
        .await;
    assert!(result.is_error());
    assert!(result.output.starts_with("Flow call failed:"));
    let flow = result.flow.unwrap();
    assert_eq!(flow.reason, "EXCEPTION");
    assert_eq!(flow.extracted.income, 1.0);
}

#[tokio::test]
async fn retrieve_formats_hits() {
    let transport = Arc::new(FakeTransport {
        retrieve_reply: Some(json!({"retrievalResults": [
            {
                "content": {"text": "Nodes need the AmazonEKSWorkerNodePolicy."},
                "location": {"s3Location": {"uri": "s3://docs/eks/iam.md"}},
                "score": 0.87654321,
                "metadata": {"page": 2}
            },
            {"content": {"text": "no location"}}
        ]})),
        ..Default::default()
    });
    let result = assistant(&transport)
        .respond(&ChatRequest::new(ResponseMode::KnowledgeBaseRetrieve, "iam"))
        .await;

    assert_eq!(result.response_type, ResponseType::Retrieve);
    assert!(result.output.starts_with("## Search results (2)"));
    assert!(result.output.contains("### Result 1 (score: 0.8765)"));
    assert!(result.output.contains("**Source:** [iam.md](s3://docs/eks/iam.md)"));
    let hits = result.results.unwrap();
    assert_eq!(hits[1].source, "Unknown source");
    assert_eq!(hits[0].metadata, json!({"page": 2}));

    let (_, sent) = &transport.calls()[0];
    assert_eq!(sent["knowledgeBaseId"], "KB1");
    assert_eq!(
        sent["request"]["retrievalConfiguration"]["vectorSearchConfiguration"]["numberOfResults"],
        5
    );
}

#[tokio::test]
async fn retrieve_without_hits() {
    let transport = Arc::new(FakeTransport {
        retrieve_reply: Some(json!({"retrievalResults": []})),
        ..Default::default()
    });
    let result = assistant(&transport)
        .respond(&ChatRequest::new(ResponseMode::KnowledgeBaseRetrieve, "x"))
        .await;
    assert_eq!(result.output, "No search results found.");
    assert!(result.results.unwrap().is_empty());
}

#[tokio::test]
async fn retrieve_and_generate_flattens_citations() {
    let transport = Arc::new(FakeTransport {
        generate_reply: Some(json!({
            "output": {"text": "Use managed node groups."},
            "citations": [{
                "generatedResponsePart": {"textResponsePart": {"text": "Use managed node groups."}},
                "retrievedReferences": [
                    {
                        "content": {"text": "Managed node groups automate..."},
                        "location": {"s3Location": {"uri": "s3://docs/eks/nodegroups.md"}}
                    },
                    {
                        "content": {"text": "See the user guide"},
                        "location": {"webLocation": {"url": "https://docs.aws.amazon.com/eks/guide"}}
                    }
                ]
            }]
        })),
        ..Default::default()
    });
    let result = assistant(&transport)
        .respond(&ChatRequest::new(ResponseMode::KnowledgeBaseGenerate, "nodes?"))
        .await;

    assert_eq!(result.response_type, ResponseType::RetrieveAndGenerate);
    assert_eq!(result.output, "Use managed node groups.");
    let citations = result.citations.unwrap();
    assert_eq!(citations.len(), 2);
    assert_eq!(citations[0].source_file, "nodegroups.md");
    assert_eq!(citations[1].source_uri, "https://docs.aws.amazon.com/eks/guide");
    assert_eq!(citations[1].generated_part, "Use managed node groups.");

    let sent = &transport.calls()[0].1;
    assert_eq!(
        sent["retrieveAndGenerateConfiguration"]["knowledgeBaseConfiguration"]["modelArn"],
        "arn:aws:bedrock:us-west-2::foundation-model/anthropic.claude-3-sonnet-20240229-v1:0"
    );
}

#[tokio::test]
async fn list_models_filters_catalog() {
    let transport = Arc::new(FakeTransport {
        models_reply: Some(json!({"modelSummaries": [
            {
                "modelId": "anthropic.claude-3-5-sonnet-20240620-v1:0",
                "modelName": "Claude 3.5 Sonnet",
                "providerName": "Anthropic",
                "inputModalities": ["TEXT", "IMAGE"],
                "outputModalities": ["TEXT"]
            },
            {
                "modelId": "anthropic.claude-opus-4-20250514-v1:0",
                "inputModalities": ["TEXT"],
                "outputModalities": ["TEXT"]
            },
            {
                "modelId": "amazon.titan-embed-text-v1",
                "inputModalities": ["TEXT"],
                "outputModalities": ["EMBEDDING"]
            }
        ]})),
        ..Default::default()
    });
    let models = assistant(&transport).list_models().await.unwrap();
    assert_eq!(models.len(), 1);
    assert_eq!(models[0].display_name, "Claude 3.5 Sonnet");
    assert_eq!(models[0].provider_name, "Anthropic");
}
