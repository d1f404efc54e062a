// Session store record (same attribute names as the DynamoDB table)

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    #[serde(rename = "SessionId")]
    pub session_id: String,
    /// JSON-encoded session blob.
    #[serde(rename = "Data")]
    pub data: String,
    /// RFC 3339 timestamp of the last save.
    #[serde(rename = "LastUpdated")]
    pub last_updated: String,
    /// Expiry as unix-epoch seconds.
    #[serde(rename = "TTL")]
    pub ttl: i64,
}
