//! Integration tests against a mock of the platform API

use axum::extract::{Multipart, Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use pretty_assertions::assert_eq;
use ragdesk::api::{
    CredentialStore, FailureKind, MemoryCredentialStore, UploadProgress, UploadStage,
    DUPLICATE_MESSAGE, SESSION_EXPIRED_MESSAGE,
};
use ragdesk::chat::ChatSession;
use ragdesk::{ApiClient, RagdeskConfig, SessionContext, SessionEvent, TopK};
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tokio::sync::mpsc::UnboundedReceiver;

const TOKEN: &str = "tok-1";

#[derive(Default)]
struct Mock {
    auth_headers: Mutex<Vec<String>>,
    uploaded: Mutex<HashSet<String>>,
    list_queries: Mutex<Vec<HashMap<String, String>>>,
}

impl Mock {
    fn record(&self, headers: &HeaderMap) -> bool {
        let value = headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();
        let ok = value == format!("Bearer {TOKEN}");
        self.auth_headers.lock().unwrap().push(value);
        ok
    }
}

type Shared = State<Arc<Mock>>;

fn detail(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "detail": message }))).into_response()
}

async fn login(Json(body): Json<Value>) -> Response {
    if body["password"] == "secret" {
        Json(json!({ "access_token": TOKEN, "token_type": "bearer", "expires_in": 3600 }))
            .into_response()
    } else {
        detail(StatusCode::UNAUTHORIZED, "Incorrect username or password")
    }
}

async fn logout() -> Response {
    detail(StatusCode::INTERNAL_SERVER_ERROR, "logout exploded")
}

async fn me(State(mock): Shared, headers: HeaderMap) -> Response {
    if !mock.record(&headers) {
        return detail(StatusCode::UNAUTHORIZED, "Could not validate credentials");
    }
    Json(json!({ "username": "admin", "role": "admin" })).into_response()
}

async fn query(State(mock): Shared, headers: HeaderMap, Json(body): Json<Value>) -> Response {
    mock.record(&headers);
    let question = body["question"].as_str().unwrap_or_default();
    if question.contains("nothing") {
        return detail(StatusCode::NOT_FOUND, "no chunks");
    }
    if question.contains("boom") {
        return detail(StatusCode::INTERNAL_SERVER_ERROR, "Vector store offline");
    }
    Json(json!({
        "question": question,
        "answer": "<think>look it up</think>The warranty lasts **two years**.",
        "sources_count": 2,
        "chunks_used": ["Warranty: 24 months", { "text": "Coverage starts at delivery" }],
        "processing_time": 1.25,
        "top_k": body["top_k"],
    }))
    .into_response()
}

async fn list(State(mock): Shared, Query(params): Query<HashMap<String, String>>) -> Response {
    mock.list_queries.lock().unwrap().push(params);
    let documents: Vec<Value> = (1..=3)
        .map(|i| {
            json!({
                "filename": format!("manual-{i}.pdf"),
                "file_hash": format!("hash{i}"),
                "system_name": "Field Ops",
                "created_at": "2024-03-01T10:00:00",
                "file_size": 2048 * i,
            })
        })
        .collect();
    Json(json!({ "documents": documents, "total": 3 })).into_response()
}

async fn document(Path(hash): Path<String>) -> Response {
    if hash == "missing" {
        return detail(StatusCode::NOT_FOUND, "Document non trouvé");
    }
    Json(json!({
        "metadata": { "filename": "manual-1.pdf", "file_hash": hash, "system_name": "Field Ops" },
        "chunks_count": 42,
    }))
    .into_response()
}

async fn remove(Path(hash): Path<String>) -> Response {
    Json(json!({ "status": "success", "message": "Document supprimé", "file_hash": hash }))
        .into_response()
}

async fn upload(State(mock): Shared, mut multipart: Multipart) -> Response {
    let mut file_name = None;
    let mut system = None;
    let mut size = 0;
    while let Ok(Some(field)) = multipart.next_field().await {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("file") => {
                file_name = field.file_name().map(str::to_string);
                size = field.bytes().await.map(|b| b.len()).unwrap_or(0);
            }
            Some("system_name") => system = field.text().await.ok(),
            _ => {}
        }
    }
    let (Some(file_name), Some(_system)) = (file_name, system) else {
        return detail(StatusCode::UNPROCESSABLE_ENTITY, "missing field");
    };
    if size == 0 {
        return detail(StatusCode::BAD_REQUEST, "empty file");
    }
    if !mock.uploaded.lock().unwrap().insert(file_name.clone()) {
        return detail(
            StatusCode::BAD_REQUEST,
            "Ce document a déjà été vectorisé pour ce système",
        );
    }
    Json(json!({
        "status": "success",
        "message": format!("{file_name} indexed"),
        "file_hash": "f00dfeed",
    }))
    .into_response()
}

async fn serve(mock: Arc<Mock>) -> SocketAddr {
    let app = Router::new()
        .route("/auth/login", post(login))
        .route("/auth/logout", post(logout))
        .route("/auth/me", get(me))
        .route("/search/query", post(query))
        .route("/documents/", get(list))
        .route("/documents/upload", post(upload))
        .route("/documents/{hash}", get(document).delete(remove))
        .with_state(mock);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    addr
}

fn client(
    addr: SocketAddr,
    store: Arc<MemoryCredentialStore>,
) -> (ApiClient, UnboundedReceiver<SessionEvent>) {
    let authenticated = store.load().unwrap().is_some();
    let (session, rx) = SessionContext::new(authenticated);
    let config = RagdeskConfig::new(std::env::temp_dir()).with_base_url(format!("http://{addr}"));
    (ApiClient::new(&config, store, session).unwrap(), rx)
}

#[tokio::test]
async fn test_login_stores_token_and_authorizes_requests() {
    let mock = Arc::new(Mock::default());
    let addr = serve(mock.clone()).await;
    let store = Arc::new(MemoryCredentialStore::new());
    let (api, mut rx) = client(addr, store.clone());

    let token = api.login(" admin ", "secret").await.unwrap();
    assert_eq!(token.access_token, TOKEN);
    assert_eq!(store.load().unwrap().as_deref(), Some(TOKEN));
    assert!(api.session().is_authenticated());
    assert_eq!(
        rx.try_recv().unwrap(),
        SessionEvent::LoggedIn {
            username: "admin".to_string()
        }
    );

    let user = api.current_user().await.unwrap();
    assert_eq!(user.username, "admin");
    assert_eq!(
        *mock.auth_headers.lock().unwrap(),
        vec![format!("Bearer {TOKEN}")]
    );
}

#[tokio::test]
async fn test_wrong_password_shows_server_detail() {
    let addr = serve(Arc::new(Mock::default())).await;
    let store = Arc::new(MemoryCredentialStore::new());
    let (api, _rx) = client(addr, store.clone());

    let err = api.login("admin", "nope").await.unwrap_err();
    assert_eq!(err.kind, FailureKind::Auth);
    assert_eq!(err.message, "Incorrect username or password");
    assert!(!api.session().is_authenticated());
    assert!(store.load().unwrap().is_none());
}

#[tokio::test]
async fn test_rejected_credential_requires_login_once() {
    let addr = serve(Arc::new(Mock::default())).await;
    let store = Arc::new(MemoryCredentialStore::with_token("stale"));
    let (api, mut rx) = client(addr, store.clone());
    assert!(api.session().is_authenticated());

    let err = api.current_user().await.unwrap_err();
    assert!(err.is_auth());
    assert_eq!(err.message, SESSION_EXPIRED_MESSAGE);
    assert!(store.load().unwrap().is_none());
    assert!(!api.session().is_authenticated());

    assert_eq!(rx.try_recv().unwrap(), SessionEvent::LoginRequired);
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn test_logout_clears_credential_when_server_fails() {
    let addr = serve(Arc::new(Mock::default())).await;
    let store = Arc::new(MemoryCredentialStore::with_token(TOKEN));
    let (api, mut rx) = client(addr, store.clone());

    api.logout().await.unwrap();
    assert!(store.load().unwrap().is_none());
    assert!(!api.session().is_authenticated());
    assert_eq!(rx.try_recv().unwrap(), SessionEvent::LoggedOut);
}

#[tokio::test]
async fn test_query_outcomes() {
    let mock = Arc::new(Mock::default());
    let addr = serve(mock.clone()).await;
    let (api, _rx) = client(addr, Arc::new(MemoryCredentialStore::with_token(TOKEN)));
    let top_k = TopK::new(4).unwrap();

    let answer = api
        .query(&ragdesk::api::QueryRequest::new("What is the warranty?", top_k))
        .await
        .unwrap();
    assert_eq!(answer.sources_count, 2);
    assert_eq!(
        answer.chunks_used,
        vec!["Warranty: 24 months", "Coverage starts at delivery"]
    );
    assert_eq!(mock.auth_headers.lock().unwrap()[0], format!("Bearer {TOKEN}"));

    let not_found = api
        .query(&ragdesk::api::QueryRequest::new("nothing here", top_k))
        .await
        .unwrap_err();
    assert_eq!(not_found.kind, FailureKind::NotFound);
    assert_eq!(
        not_found.message,
        "No relevant information found in the knowledge base"
    );

    let server = api
        .query(&ragdesk::api::QueryRequest::new("boom", top_k))
        .await
        .unwrap_err();
    assert_eq!(server.kind, FailureKind::Server { status: 500 });
    assert_eq!(server.message, "Vector store offline");
}

#[tokio::test]
async fn test_chat_session_against_server() {
    let addr = serve(Arc::new(Mock::default())).await;
    let (api, _rx) = client(addr, Arc::new(MemoryCredentialStore::with_token(TOKEN)));
    let mut chat = ChatSession::new(TopK::default());

    let turn = chat
        .ask(&api, "How long is the warranty?", TopK::default())
        .await
        .unwrap();
    assert!(turn.succeeded());
    assert_eq!(turn.sanitized_text, "The warranty lasts **two years**.");
    assert_eq!(turn.sources_count, Some(2));
    assert_eq!(turn.processing_time_seconds, Some(1.25));

    let failed = chat.ask(&api, "boom", TopK::default()).await.unwrap();
    assert!(!failed.succeeded());
    assert_eq!(failed.sanitized_text, "Vector store offline");
    assert_eq!(chat.turns().len(), 4);
    assert!(!chat.is_busy());
}

#[tokio::test]
async fn test_document_listing_and_detail() {
    let mock = Arc::new(Mock::default());
    let addr = serve(mock.clone()).await;
    let (api, _rx) = client(addr, Arc::new(MemoryCredentialStore::with_token(TOKEN)));

    let page = api.list_documents(3, 10).await.unwrap();
    assert_eq!(page.documents.len(), 3);
    assert_eq!(page.documents[1].filename, "manual-2.pdf");
    assert_eq!(page.documents[2].file_size, Some(6144));
    assert_eq!(page.total, 3);
    assert_eq!(page.page_count(10), 1);

    let params = mock.list_queries.lock().unwrap()[0].clone();
    assert_eq!(params.get("page").map(String::as_str), Some("3"));
    assert_eq!(params.get("skip").map(String::as_str), Some("20"));

    let detail = api.document_detail("hash1").await.unwrap();
    assert_eq!(detail.chunks_count, Some(42));
    assert_eq!(detail.metadata.file_hash, "hash1");

    let missing = api.document_detail("missing").await.unwrap_err();
    assert_eq!(missing.kind, FailureKind::NotFound);
    assert_eq!(missing.message, "Document not found");

    let deleted = api.delete_document("hash2").await.unwrap();
    assert_eq!(deleted.file_hash, "hash2");
}

#[tokio::test]
async fn test_upload_reports_progress_and_duplicates() {
    let addr = serve(Arc::new(Mock::default())).await;
    let (api, _rx) = client(addr, Arc::new(MemoryCredentialStore::with_token(TOKEN)));

    let dir = TempDir::new().unwrap();
    let path = dir.path().join("manual.pdf");
    let mut body = b"%PDF-1.4\n".to_vec();
    body.resize(200 * 1024, b'x');
    std::fs::write(&path, &body).unwrap();

    let (tx, progress) = UploadProgress::channel();
    let response = api.upload_pdf(&path, "Field Ops", Some(tx)).await.unwrap();
    assert_eq!(response.file_hash, "f00dfeed");
    assert_eq!(response.message, "manual.pdf indexed");
    assert_eq!(progress.latest(), UploadStage::Finished { ok: true });

    let (tx, progress) = UploadProgress::channel();
    let err = api.upload_pdf(&path, "Field Ops", Some(tx)).await.unwrap_err();
    assert!(err.duplicate());
    assert_eq!(err.message, DUPLICATE_MESSAGE);
    assert_eq!(progress.latest(), UploadStage::Finished { ok: false });
}

#[tokio::test]
async fn test_unreachable_server_is_a_network_failure() {
    let (api, _rx) = client(
        "127.0.0.1:9".parse().unwrap(),
        Arc::new(MemoryCredentialStore::with_token(TOKEN)),
    );
    let err = api.health().await.unwrap_err();
    assert_eq!(err.kind, FailureKind::Network);
}
