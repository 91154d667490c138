//! Wire types for the platform API

use serde::{Deserialize, Deserializer, Serialize};

// ─── Auth ───────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct LoginRequest<'a> {
    pub username: &'a str,
    pub password: &'a str,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    /// Lifetime in seconds
    #[serde(default)]
    pub expires_in: Option<u64>,
}

fn default_token_type() -> String {
    "bearer".to_string()
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct CurrentUser {
    pub username: String,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub sub: Option<String>,
}

// ─── Search & questions ─────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct QueryRequest {
    pub question: String,
    pub top_k: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filters: Option<serde_json::Value>,
}

impl QueryRequest {
    pub fn new(question: impl Into<String>, top_k: crate::TopK) -> Self {
        Self {
            question: question.into(),
            top_k: top_k.get(),
            filters: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct QueryResponse {
    #[serde(default)]
    pub question: String,
    pub answer: String,
    #[serde(default)]
    pub sources_count: u32,
    /// Excerpts the answer was built from. Older servers send objects with a
    /// `text` field instead of plain strings.
    #[serde(default, deserialize_with = "deserialize_excerpts")]
    pub chunks_used: Vec<String>,
    /// Server-side processing time in seconds
    #[serde(default)]
    pub processing_time: Option<f64>,
}

const EXCERPT_UNAVAILABLE: &str = "Excerpt unavailable";

fn deserialize_excerpts<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<Vec<serde_json::Value>> = Option::deserialize(deserializer)?;
    Ok(raw
        .unwrap_or_default()
        .into_iter()
        .map(|v| match v {
            serde_json::Value::String(s) => s,
            other => other
                .get("text")
                .and_then(|t| t.as_str())
                .map(str::to_string)
                .unwrap_or_else(|| EXCERPT_UNAVAILABLE.to_string()),
        })
        .collect())
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct RetrievedChunk {
    pub text: String,
    #[serde(default)]
    pub metadata: serde_json::Value,
    #[serde(default)]
    pub score: Option<f64>,
    #[serde(default)]
    pub chunk_index: Option<u32>,
    #[serde(default)]
    pub source_file: Option<String>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct SearchResult {
    pub results: Vec<RetrievedChunk>,
    #[serde(default)]
    pub total_found: u32,
    #[serde(default)]
    pub query_vector_dim: Option<u32>,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct Suggestions {
    pub suggestions: Vec<String>,
    #[serde(default)]
    pub based_on: Option<String>,
}

// ─── Documents ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct UploadResponse {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub message: String,
    pub file_hash: String,
    #[serde(default)]
    pub document_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct DocumentMetadata {
    pub filename: String,
    pub file_hash: String,
    #[serde(default)]
    pub system_name: String,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub file_size: Option<u64>,
}

/// One page of the document listing
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct DocumentPage {
    #[serde(default)]
    pub documents: Vec<DocumentMetadata>,
    #[serde(default)]
    pub total: u64,
}

impl DocumentPage {
    /// Number of pages needed for `total` documents at `limit` per page
    pub fn page_count(&self, limit: u32) -> u64 {
        if limit == 0 {
            return 1;
        }
        self.total.div_ceil(limit as u64).max(1)
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct DocumentDetail {
    pub metadata: DocumentMetadata,
    #[serde(default)]
    pub chunks_count: Option<u64>,
    #[serde(default)]
    pub last_accessed: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct DeleteResponse {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub file_hash: String,
}

// ─── Errors ─────────────────────────────────────────────────────────

/// Error body sent with non-2xx responses.
///
/// `detail` is a string for application errors and a list of objects for
/// request validation errors.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct ErrorBody {
    #[serde(default)]
    pub detail: Option<serde_json::Value>,
    #[serde(default)]
    pub message: Option<String>,
}

impl ErrorBody {
    pub(crate) fn parse(body: &str) -> Self {
        serde_json::from_str(body.trim()).unwrap_or_default()
    }

    /// Best human-readable message: `detail`, then `message`
    pub(crate) fn text(&self) -> Option<String> {
        let from_detail = match &self.detail {
            Some(serde_json::Value::String(s)) if !s.trim().is_empty() => Some(s.clone()),
            Some(serde_json::Value::Array(items)) => {
                let msgs: Vec<&str> = items
                    .iter()
                    .filter_map(|i| i.get("msg").and_then(|m| m.as_str()))
                    .collect();
                if msgs.is_empty() {
                    None
                } else {
                    Some(msgs.join("; "))
                }
            }
            _ => None,
        };
        from_detail.or_else(|| self.message.clone().filter(|m| !m.trim().is_empty()))
    }
}
