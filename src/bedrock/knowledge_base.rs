// Knowledge Base: Retrieve (search only) and RetrieveAndGenerate (answer with citations)

use super::Assistant;
use crate::models::{Citation, InvocationResult, ResponseType, RetrievalHit};
use serde_json::{Value, json};
use std::fmt::Write as _;
use tracing::{error, info, instrument};

const NUMBER_OF_RESULTS: u32 = 5;
const NO_RESULTS: &str = "No search results found.";
const LOCATION_TYPES: [&str; 5] = [
    "s3Location",
    "webLocation",
    "confluenceLocation",
    "salesforceLocation",
    "sharePointLocation",
];

fn str_at<'a>(value: &'a Value, pointer: &str) -> Option<&'a str> {
    value.pointer(pointer).and_then(Value::as_str)
}

fn file_name(source: &str) -> String {
    source.rsplit('/').next().unwrap_or(source).to_string()
}

pub fn parse_retrieval_results(response: &Value) -> Vec<RetrievalHit> {
    let Some(results) = response.get("retrievalResults").and_then(Value::as_array) else {
        return Vec::new();
    };
    results
        .iter()
        .map(|r| {
            let source = str_at(r, "/location/s3Location/uri")
                .unwrap_or("Unknown source")
                .to_string();
            RetrievalHit {
                content: str_at(r, "/content/text").unwrap_or_default().to_string(),
                metadata: r.get("metadata").cloned().unwrap_or_else(|| json!({})),
                source_filename: file_name(&source),
                source,
                score: r.get("score").and_then(Value::as_f64).unwrap_or(0.0),
            }
        })
        .collect()
}

/// Markdown listing of retrieval hits, one section per hit.
pub fn format_retrieval_results(hits: &[RetrievalHit]) -> String {
    if hits.is_empty() {
        return NO_RESULTS.to_string();
    }
    let mut out = format!("## Search results ({})\n\n", hits.len());
    for (i, hit) in hits.iter().enumerate() {
        let _ = writeln!(out, "### Result {} (score: {:.4})", i + 1, hit.score);
        let _ = write!(out, "{}\n\n", hit.content);
        let _ = write!(
            out,
            "**Source:** [{}]({})\n\n---\n\n",
            hit.source_filename, hit.source
        );
    }
    out
}

fn reference_source(location: Option<&Value>) -> String {
    location
        .and_then(|loc| {
            LOCATION_TYPES.iter().find_map(|kind| {
                let entry = loc.get(*kind)?;
                Some(
                    entry
                        .get("uri")
                        .or_else(|| entry.get("url"))
                        .and_then(Value::as_str)
                        .unwrap_or("Unknown")
                        .to_string(),
                )
            })
        })
        .unwrap_or_else(|| "Unknown".into())
}

/// One entry per retrieved reference, each carrying the generated part it supports.
pub fn parse_citations(response: &Value) -> Vec<Citation> {
    let Some(citations) = response.get("citations").and_then(Value::as_array) else {
        return Vec::new();
    };
    citations
        .iter()
        .flat_map(|citation| {
            let part = str_at(citation, "/generatedResponsePart/textResponsePart/text")
                .unwrap_or_default()
                .to_string();
            citation
                .get("retrievedReferences")
                .and_then(Value::as_array)
                .into_iter()
                .flatten()
                .map(move |reference| {
                    let source_uri = reference_source(reference.get("location"));
                    Citation {
                        generated_part: part.clone(),
                        source_file: file_name(&source_uri),
                        referenced_content: str_at(reference, "/content/text")
                            .unwrap_or_default()
                            .to_string(),
                        source_uri,
                    }
                })
        })
        .collect()
}

impl Assistant {
    #[instrument(skip(self, query), fields(operation = "retrieve"))]
    pub async fn retrieve(&self, knowledge_base_id: Option<String>, query: &str) -> InvocationResult {
        let Some(kb_id) = knowledge_base_id else {
            error!("knowledge base id is not configured");
            let mut result = InvocationResult::error("Knowledge Base ID is not configured.");
            result.results = Some(Vec::new());
            return result;
        };
        let request = json!({
            "retrievalQuery": {"text": query},
            "retrievalConfiguration": {
                "vectorSearchConfiguration": {"numberOfResults": NUMBER_OF_RESULTS}
            },
        });
        info!(knowledge_base_id = %kb_id, "querying knowledge base");
        match self.transport.retrieve(&kb_id, request).await {
            Ok(response) => {
                let hits = parse_retrieval_results(&response);
                info!(hits = hits.len(), "retrieve completed");
                let mut result =
                    InvocationResult::text(ResponseType::Retrieve, format_retrieval_results(&hits));
                result.results = Some(hits);
                result
            }
            Err(e) => {
                error!(error = %e, "retrieve failed");
                let mut result =
                    InvocationResult::error(format!("Knowledge Base retrieve call failed: {e}"));
                result.results = Some(Vec::new());
                result
            }
        }
    }

    #[instrument(skip(self, query), fields(operation = "retrieve_and_generate"))]
    pub async fn retrieve_and_generate(
        &self,
        knowledge_base_id: Option<String>,
        model_id: &str,
        query: &str,
    ) -> InvocationResult {
        let Some(kb_id) = knowledge_base_id else {
            error!("knowledge base id is not configured");
            return InvocationResult::error("Knowledge Base ID is not configured.");
        };
        let model_arn = format!(
            "arn:aws:bedrock:{}::foundation-model/{model_id}",
            self.defaults.region
        );
        let request = json!({
            "input": {"text": query},
            "retrieveAndGenerateConfiguration": {
                "type": "KNOWLEDGE_BASE",
                "knowledgeBaseConfiguration": {
                    "knowledgeBaseId": kb_id,
                    "modelArn": model_arn,
                },
            },
        });
        info!(knowledge_base_id = %kb_id, "retrieve and generate");
        match self.transport.retrieve_and_generate(request).await {
            Ok(response) => {
                let output = str_at(&response, "/output/text")
                    .unwrap_or_default()
                    .to_string();
                let citations = parse_citations(&response);
                info!(
                    chars = output.len(),
                    citations = citations.len(),
                    "answer generated"
                );
                let mut result = InvocationResult::text(ResponseType::RetrieveAndGenerate, output);
                result.citations = Some(citations);
                result
            }
            Err(e) => {
                error!(error = %e, "retrieve and generate failed");
                InvocationResult::error(format!(
                    "Knowledge Base retrieve-and-generate call failed: {e}"
                ))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retrieval_hits_take_filename_from_uri() {
        let response = json!({"retrievalResults": [
            {"content": {"text": "EKS supports managed node groups."},
             "location": {"type": "S3", "s3Location": {"uri": "s3://docs/eks/nodegroups.md"}},
             "metadata": {"page": 3}, "score": 0.8123},
            {"content": {"text": "orphan"}}
        ]});
        let hits = parse_retrieval_results(&response);
        assert_eq!(hits[0].source_filename, "nodegroups.md");
        assert_eq!(hits[0].score, 0.8123);
        assert_eq!(hits[1].source, "Unknown source");
        assert_eq!(hits[1].source_filename, "Unknown source");
        assert_eq!(hits[1].metadata, json!({}));
    }

    #[test]
    fn formatting_lists_each_hit() {
        let hits = parse_retrieval_results(&json!({"retrievalResults": [
            {"content": {"text": "alpha"}, "location": {"s3Location": {"uri": "s3://b/a.txt"}}, "score": 0.5}
        ]}));
        let text = format_retrieval_results(&hits);
        assert!(text.starts_with("## Search results (1)"));
        assert!(text.contains("### Result 1 (score: 0.5000)"));
        assert!(text.contains("**Source:** [a.txt](s3://b/a.txt)"));
        assert_eq!(format_retrieval_results(&[]), NO_RESULTS);
    }

    #[test]
    fn citations_flatten_across_location_types() {
        let response = json!({"output": {"text": "answer"}, "citations": [
            {"generatedResponsePart": {"textResponsePart": {"text": "part one"}},
             "retrievedReferences": [
                {"content": {"text": "ref a"}, "location": {"s3Location": {"uri": "s3://kb/a.pdf"}}},
                {"content": {"text": "ref b"}, "location": {"webLocation": {"url": "https://example.com/guide"}}}
             ]},
            {"generatedResponsePart": {"textResponsePart": {"text": "part two"}},
             "retrievedReferences": [{"content": {"text": "ref c"}, "location": {}}]}
        ]});
        let citations = parse_citations(&response);
        assert_eq!(citations.len(), 3);
        assert_eq!(citations[0].source_file, "a.pdf");
        assert_eq!(citations[1].source_uri, "https://example.com/guide");
        assert_eq!(citations[1].source_file, "guide");
        assert_eq!(citations[1].generated_part, "part one");
        assert_eq!(citations[2].source_uri, "Unknown");
        assert_eq!(citations[2].generated_part, "part two");
    }
}
