//! HTTP client for the platform API
//!
//! Every operation returns [`ApiResult`]. Transport errors, non-2xx answers
//! and undecodable bodies all become an [`ApiFailure`] carrying a message fit
//! for display. A 401 from any operation clears the stored credential and
//! marks the [`SessionContext`] logged out before the failure is returned.

pub mod credentials;
pub mod types;
pub mod upload;

pub use credentials::{CredentialStore, FileCredentialStore, MemoryCredentialStore};
pub use types::{
    CurrentUser, DeleteResponse, DocumentDetail, DocumentMetadata, DocumentPage, QueryRequest,
    QueryResponse, RetrievedChunk, SearchResult, Suggestions, TokenResponse, UploadResponse,
};
pub use upload::{UploadProgress, UploadStage};

use crate::config::RagdeskConfig;
use crate::session::SessionContext;
use crate::validation::{self, TopK, ValidationError};
use reqwest::{RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use types::{ErrorBody, LoginRequest};

pub const SESSION_EXPIRED_MESSAGE: &str = "Session expired. Please log in again.";
pub const NETWORK_MESSAGE: &str = "Unable to reach the server";
pub const DUPLICATE_MESSAGE: &str = "This document has already been indexed.";

/// Fragments of the server's duplicate-upload detail
const DUPLICATE_MARKERS: &[&str] = &["déjà été vectorisé", "already been vectorized"];

/// Result of every API operation
pub type ApiResult<T> = std::result::Result<T, ApiFailure>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// The request never reached the server (connect error, timeout)
    Network,
    /// Non-2xx answer other than the specific cases below
    Server { status: u16 },
    /// 401; the credential has been cleared
    Auth,
    /// Upload of a document that is already indexed
    Duplicate,
    /// 404 on an operation that gives it a meaning
    NotFound,
    /// 2xx answer whose body did not match the expected shape
    Decode,
    /// Rejected locally before any request was sent
    Validation,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct ApiFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl ApiFailure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// True when the server reported the document as already indexed
    pub fn duplicate(&self) -> bool {
        self.kind == FailureKind::Duplicate
    }

    pub fn is_auth(&self) -> bool {
        self.kind == FailureKind::Auth
    }

    pub fn status(&self) -> Option<u16> {
        match self.kind {
            FailureKind::Server { status } => Some(status),
            FailureKind::Auth => Some(401),
            FailureKind::NotFound => Some(404),
            _ => None,
        }
    }
}

impl From<ValidationError> for ApiFailure {
    fn from(err: ValidationError) -> Self {
        Self::new(FailureKind::Validation, err.to_string())
    }
}

/// How one operation reports its failures
#[derive(Debug, Clone, Copy)]
struct Op {
    name: &'static str,
    fallback: &'static str,
    not_found: Option<&'static str>,
    detects_duplicate: bool,
    /// Show the server's detail on 401 instead of the session-expired text
    auth_detail: bool,
}

impl Op {
    const fn new(name: &'static str, fallback: &'static str) -> Self {
        Self {
            name,
            fallback,
            not_found: None,
            detects_duplicate: false,
            auth_detail: false,
        }
    }

    const fn not_found(mut self, message: &'static str) -> Self {
        self.not_found = Some(message);
        self
    }

    const fn duplicate(mut self) -> Self {
        self.detects_duplicate = true;
        self
    }

    const fn auth_detail(mut self) -> Self {
        self.auth_detail = true;
        self
    }
}

const LOGIN: Op = Op::new("login", "Login failed").auth_detail();
const LOGOUT: Op = Op::new("logout", "Logout failed");
const CURRENT_USER: Op = Op::new("current_user", "Failed to fetch the current user");
const VALIDATE_TOKEN: Op = Op::new("validate_token", "Invalid token");
const QUERY: Op = Op::new("query", "Failed to send the question")
    .not_found("No relevant information found in the knowledge base");
const SEMANTIC: Op = Op::new("semantic_search", "Search failed");
const SUGGESTIONS: Op = Op::new("suggestions", "Failed to fetch suggestions");
const STATS: Op = Op::new("search_stats", "Failed to fetch search statistics");
const UPLOAD: Op = Op::new("upload", "Upload failed").duplicate();
const LIST: Op = Op::new("list_documents", "Failed to fetch documents");
const DETAIL: Op = Op::new("document_detail", "Failed to fetch the document")
    .not_found("Document not found");
const DELETE: Op = Op::new("delete_document", "Failed to delete the document")
    .not_found("Document not found");
const HEALTH: Op = Op::new("health", "Services unavailable");

fn is_duplicate_detail(detail: &str) -> bool {
    let lower = detail.to_lowercase();
    DUPLICATE_MARKERS.iter().any(|m| lower.contains(m))
}

fn decode<T: DeserializeOwned>(body: &str, op: Op) -> ApiResult<T> {
    serde_json::from_str(body).map_err(|e| {
        warn!("{}: could not decode response: {}", op.name, e);
        ApiFailure::new(
            FailureKind::Decode,
            format!("{}: unexpected response from the server", op.fallback),
        )
    })
}

/// Client for the platform API. Cheap to clone; clones share the HTTP
/// connection pool, the credential store and the session context.
#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    credentials: Arc<dyn CredentialStore>,
    session: SessionContext,
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl ApiClient {
    pub fn new(
        config: &RagdeskConfig,
        credentials: Arc<dyn CredentialStore>,
        session: SessionContext,
    ) -> crate::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(concat!("ragdesk/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            credentials,
            session,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn session(&self) -> &SessionContext {
        &self.session
    }

    /// Whether a credential is currently stored
    pub fn has_credential(&self) -> bool {
        matches!(self.credentials.load(), Ok(Some(_)))
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match self.credentials.load() {
            Ok(Some(token)) => request.bearer_auth(token),
            Ok(None) => request,
            Err(e) => {
                warn!("Could not read credential store: {}", e);
                request
            }
        }
    }

    /// Send `request` and return the body of a 2xx answer
    async fn execute(&self, request: RequestBuilder, op: Op) -> ApiResult<String> {
        let response = match self.authorize(request).send().await {
            Ok(r) => r,
            Err(e) => {
                warn!("{}: request failed: {}", op.name, e);
                return Err(ApiFailure::new(FailureKind::Network, NETWORK_MESSAGE));
            }
        };

        let status = response.status();
        debug!("{}: HTTP {}", op.name, status);
        let body = match response.text().await {
            Ok(body) => body,
            Err(e) if status.is_success() => {
                warn!("{}: failed reading body: {}", op.name, e);
                return Err(ApiFailure::new(FailureKind::Network, NETWORK_MESSAGE));
            }
            Err(_) => String::new(),
        };

        if status.is_success() {
            return Ok(body);
        }
        Err(self.classify(status, &body, op))
    }

    async fn request_json<T: DeserializeOwned>(&self, request: RequestBuilder, op: Op) -> ApiResult<T> {
        let body = self.execute(request, op).await?;
        decode(&body, op)
    }

    fn classify(&self, status: StatusCode, body: &str, op: Op) -> ApiFailure {
        let detail = ErrorBody::parse(body).text();

        if status == StatusCode::UNAUTHORIZED {
            self.handle_unauthorized(op);
            let message = if op.auth_detail {
                detail.unwrap_or_else(|| op.fallback.to_string())
            } else {
                SESSION_EXPIRED_MESSAGE.to_string()
            };
            return ApiFailure::new(FailureKind::Auth, message);
        }

        if status == StatusCode::NOT_FOUND {
            if let Some(message) = op.not_found {
                return ApiFailure::new(FailureKind::NotFound, message);
            }
        }

        if status == StatusCode::BAD_REQUEST
            && op.detects_duplicate
            && detail.as_deref().is_some_and(is_duplicate_detail)
        {
            info!("{}: document already indexed", op.name);
            return ApiFailure::new(FailureKind::Duplicate, DUPLICATE_MESSAGE);
        }

        warn!("{}: HTTP {} {}", op.name, status, detail.as_deref().unwrap_or(""));
        ApiFailure::new(
            FailureKind::Server {
                status: status.as_u16(),
            },
            detail.unwrap_or_else(|| op.fallback.to_string()),
        )
    }

    /// The single place a rejected credential is handled
    fn handle_unauthorized(&self, op: Op) {
        warn!("{}: credential rejected (401), clearing it", op.name);
        if let Err(e) = self.credentials.clear() {
            error!("Failed to clear credential: {}", e);
        }
        self.session.expire();
    }

    // ─── Auth ───────────────────────────────────────────────────────

    /// Exchange credentials for a token, store it and mark the session
    /// authenticated.
    pub async fn login(&self, username: &str, password: &str) -> ApiResult<TokenResponse> {
        validation::validate_login(username, password)?;
        let username = username.trim();
        let request = self.http.post(self.url("/auth/login")).json(&LoginRequest {
            username,
            password,
        });
        let token: TokenResponse = self.request_json(request, LOGIN).await?;

        if let Err(e) = self.credentials.store(&token.access_token) {
            error!("Failed to persist credential: {}", e);
        }
        self.session.logged_in(username);
        Ok(token)
    }

    /// Log out. The local credential is cleared even when the server call
    /// fails.
    pub async fn logout(&self) -> ApiResult<()> {
        if self.has_credential() {
            let request = self.http.post(self.url("/auth/logout"));
            if let Err(e) = self.execute(request, LOGOUT).await {
                debug!("Server-side logout failed: {}", e);
            }
        }
        if let Err(e) = self.credentials.clear() {
            error!("Failed to clear credential: {}", e);
        }
        self.session.logged_out();
        Ok(())
    }

    pub async fn current_user(&self) -> ApiResult<CurrentUser> {
        let request = self.http.get(self.url("/auth/me"));
        let user: CurrentUser = self.request_json(request, CURRENT_USER).await?;
        self.session.set_username(Some(user.username.clone()));
        Ok(user)
    }

    pub async fn validate_token(&self) -> ApiResult<serde_json::Value> {
        let request = self.http.post(self.url("/auth/validate-token"));
        self.request_json(request, VALIDATE_TOKEN).await
    }

    // ─── Search ─────────────────────────────────────────────────────

    /// Ask the assistant a question
    pub async fn query(&self, query: &QueryRequest) -> ApiResult<QueryResponse> {
        validation::validate_question(&query.question)?;
        TopK::new(query.top_k)?;
        let request = self.http.post(self.url("/search/query")).json(query);
        self.request_json(request, QUERY).await
    }

    /// Retrieval only, no generated answer
    pub async fn semantic_search(&self, question: &str, top_k: TopK) -> ApiResult<SearchResult> {
        let question = validation::validate_question(question)?;
        let body = QueryRequest::new(question, top_k);
        let request = self.http.post(self.url("/search/semantic")).json(&body);
        self.request_json(request, SEMANTIC).await
    }

    pub async fn suggestions(&self) -> ApiResult<Suggestions> {
        let request = self.http.get(self.url("/search/suggestions"));
        self.request_json(request, SUGGESTIONS).await
    }

    pub async fn search_stats(&self) -> ApiResult<serde_json::Value> {
        let request = self.http.get(self.url("/search/stats"));
        self.request_json(request, STATS).await
    }

    // ─── Documents ──────────────────────────────────────────────────

    /// One page of indexed documents. `page` is 1-based.
    pub async fn list_documents(&self, page: u32, limit: u32) -> ApiResult<DocumentPage> {
        let page = page.max(1);
        let limit = limit.max(1);
        let skip = (page - 1).saturating_mul(limit);
        let request = self.http.get(self.url("/documents/")).query(&[
            ("page", page),
            ("limit", limit),
            ("skip", skip),
        ]);
        self.request_json(request, LIST).await
    }

    pub async fn document_detail(&self, file_hash: &str) -> ApiResult<DocumentDetail> {
        let file_hash = validation::require_text(file_hash)
            .map_err(|_| ApiFailure::new(FailureKind::Validation, "A document hash is required"))?;
        let request = self.http.get(self.url(&format!("/documents/{file_hash}")));
        self.request_json(request, DETAIL).await
    }

    pub async fn delete_document(&self, file_hash: &str) -> ApiResult<DeleteResponse> {
        let file_hash = validation::require_text(file_hash)
            .map_err(|_| ApiFailure::new(FailureKind::Validation, "A document hash is required"))?;
        let request = self.http.delete(self.url(&format!("/documents/{file_hash}")));
        let body = self.execute(request, DELETE).await?;
        if body.trim().is_empty() {
            return Ok(DeleteResponse {
                file_hash: file_hash.to_string(),
                ..DeleteResponse::default()
            });
        }
        decode(&body, DELETE)
    }

    pub async fn health(&self) -> ApiResult<serde_json::Value> {
        let request = self.http.get(self.url("/documents/health/check"));
        self.request_json(request, HEALTH).await
    }
}

#[async_trait::async_trait]
impl crate::chat::QueryBackend for ApiClient {
    async fn query(&self, request: &QueryRequest) -> ApiResult<QueryResponse> {
        ApiClient::query(self, request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> (ApiClient, tokio::sync::mpsc::UnboundedReceiver<crate::SessionEvent>) {
        let (session, rx) = SessionContext::new(true);
        let config = RagdeskConfig::new(std::env::temp_dir()).with_base_url("http://127.0.0.1:9/");
        let store = Arc::new(MemoryCredentialStore::with_token("tok"));
        (ApiClient::new(&config, store, session).unwrap(), rx)
    }

    #[test]
    fn test_duplicate_detail_matching() {
        assert!(is_duplicate_detail("Ce document a déjà été vectorisé"));
        assert!(is_duplicate_detail("This file has ALREADY BEEN VECTORIZED"));
        assert!(!is_duplicate_detail("Le fichier doit être un PDF"));
    }

    #[test]
    fn test_classify_unauthorized_expires_session_once() {
        let (api, mut rx) = client();
        let failure = api.classify(StatusCode::UNAUTHORIZED, "", QUERY);
        assert!(failure.is_auth());
        assert_eq!(failure.message, SESSION_EXPIRED_MESSAGE);
        assert!(!api.has_credential());
        assert!(!api.session().is_authenticated());
        assert_eq!(rx.try_recv().unwrap(), crate::SessionEvent::LoginRequired);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_classify_uses_detail_then_fallback() {
        let (api, _rx) = client();
        let f = api.classify(
            StatusCode::INTERNAL_SERVER_ERROR,
            r#"{"detail": "Erreur lors de la récupération des documents"}"#,
            LIST,
        );
        assert_eq!(f.kind, FailureKind::Server { status: 500 });
        assert_eq!(f.message, "Erreur lors de la récupération des documents");

        let f = api.classify(StatusCode::BAD_GATEWAY, "<html/>", LIST);
        assert_eq!(f.message, "Failed to fetch documents");
    }

    #[test]
    fn test_classify_not_found_per_operation() {
        let (api, _rx) = client();
        let f = api.classify(StatusCode::NOT_FOUND, "{}", QUERY);
        assert_eq!(f.kind, FailureKind::NotFound);
        assert_eq!(f.message, "No relevant information found in the knowledge base");

        let f = api.classify(StatusCode::NOT_FOUND, "{}", HEALTH);
        assert_eq!(f.kind, FailureKind::Server { status: 404 });
    }

    #[test]
    fn test_duplicate_only_on_upload() {
        let (api, _rx) = client();
        let body = r#"{"detail": "Ce document a déjà été vectorisé"}"#;
        assert!(api.classify(StatusCode::BAD_REQUEST, body, UPLOAD).duplicate());
        assert!(!api.classify(StatusCode::BAD_REQUEST, body, QUERY).duplicate());
    }

    #[tokio::test]
    async fn test_query_validates_before_sending() {
        let (api, _rx) = client();
        let req = QueryRequest {
            question: "   ".to_string(),
            top_k: 5,
            filters: None,
        };
        let err = api.query(&req).await.unwrap_err();
        assert_eq!(err.kind, FailureKind::Validation);

        let req = QueryRequest {
            question: "hello".to_string(),
            top_k: 42,
            filters: None,
        };
        let err = api.query(&req).await.unwrap_err();
        assert_eq!(err.kind, FailureKind::Validation);
    }

    #[tokio::test]
    async fn test_short_search_rejected_locally() {
        let (api, _rx) = client();
        let err = api.semantic_search("ab", TopK::default()).await.unwrap_err();
        assert_eq!(err.kind, FailureKind::Validation);
        assert_eq!(err.message, ValidationError::QuestionTooShort.to_string());
    }
}
