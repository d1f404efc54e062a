// Debug artifact: the latest merged trace as pretty JSON, overwritten on every invocation.

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use super::TraceAccumulator;

#[derive(Debug, Clone)]
pub struct TraceArtifact {
    path: PathBuf,
}

impl TraceArtifact {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Best effort: a failed write is logged at debug level and otherwise ignored.
    pub async fn write(&self, trace: &TraceAccumulator) {
        let bytes = match serde_json::to_vec_pretty(trace) {
            Ok(b) => b,
            Err(e) => {
                debug!(error = %e, "trace artifact not serialized");
                return;
            }
        };
        if let Err(e) = tokio::fs::write(&self.path, bytes).await {
            debug!(error = %e, path = %self.path.display(), "trace artifact not written");
        }
    }

    /// Latest persisted trace, if one exists and still parses.
    pub async fn read_latest(&self) -> Option<Value> {
        let bytes = tokio::fs::read(&self.path).await.ok()?;
        serde_json::from_slice(&bytes).ok()
    }
}
