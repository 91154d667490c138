//! Ragdesk - terminal client for the document assistant platform
//!
//! Talks to the platform's HTTP API to:
//! - Authenticate and keep a bearer credential between runs
//! - Upload PDFs for indexing and browse or delete indexed documents
//! - Chat with the retrieval-augmented assistant

pub mod api;
pub mod chat;
pub mod config;
pub mod format;
pub mod markdown;
pub mod notify;
pub mod session;
pub mod tui;
pub mod validation;

pub use api::{ApiClient, ApiFailure, ApiResult, FailureKind};
pub use chat::{ChatSession, Conversation, Outcome, SessionState, Turn, TurnId};
pub use config::RagdeskConfig;
pub use notify::{Notice, NoticeKind, NoticeQueue};
pub use session::{SessionContext, SessionEvent};
pub use validation::{TopK, ValidationError};

/// Result type for local Ragdesk operations
pub type Result<T> = std::result::Result<T, RagdeskError>;

/// Errors raised by local operations (config, credential storage, clipboard, export).
///
/// Remote API failures never use this type; they are reported as [`ApiFailure`].
#[derive(Debug, thiserror::Error)]
pub enum RagdeskError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Credential store error: {0}")]
    Credentials(String),

    #[error("Clipboard unavailable: {0}")]
    Clipboard(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("TOML edit error: {0}")]
    TomlEdit(#[from] toml_edit::TomlError),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),
}
