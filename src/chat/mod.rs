//! Chat session: ordered turns and the submit / resolve cycle
//!
//! A session is either idle or waiting for exactly one answer. The network
//! call itself happens outside: [`ChatSession::submit`] hands back a
//! [`PendingQuery`] to issue, and the outcome is fed to
//! [`ChatSession::resolve`] with the same ticket.

pub mod clipboard;
mod export;
mod sanitize;
mod turn;

pub use clipboard::{Clipboard, MemoryClipboard, SystemClipboard};
pub use export::transcript;
pub use sanitize::sanitize;
pub use turn::{AssistantTurn, Conversation, Outcome, Turn, TurnId, TurnRole, UserTurn};

use crate::api::{ApiResult, QueryRequest, QueryResponse};
use crate::notify::{Notice, NoticeKind};
use crate::validation::{self, TopK, ValidationError};
use crate::RagdeskError;
use std::path::Path;
use tracing::{debug, info, warn};

/// Something that can answer a question; implemented by the API client.
#[async_trait::async_trait]
pub trait QueryBackend: Send + Sync {
    async fn query(&self, request: &QueryRequest) -> ApiResult<QueryResponse>;
}

/// Correlates an issued query with its answer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Ticket(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    AwaitingResponse { ticket: Ticket },
}

/// A query accepted by the session, to be sent exactly once
#[derive(Debug, Clone, PartialEq)]
pub struct PendingQuery {
    pub ticket: Ticket,
    pub request: QueryRequest,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SubmitRejected {
    #[error("Please wait for the current answer")]
    Busy,

    #[error(transparent)]
    Invalid(#[from] ValidationError),
}

#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("No message {0} in this conversation")]
    UnknownTurn(TurnId),

    #[error(transparent)]
    Rejected(#[from] SubmitRejected),

    #[error("The conversation was cleared before the answer arrived")]
    Superseded,

    #[error(transparent)]
    Local(#[from] RagdeskError),
}

pub struct ChatSession {
    conversation: Conversation,
    state: SessionState,
    top_k: TopK,
    next_ticket: u64,
    revision: u64,
    clipboard: Box<dyn Clipboard>,
}

impl ChatSession {
    pub fn new(top_k: TopK) -> Self {
        Self::with_clipboard(top_k, Box::new(SystemClipboard::new()))
    }

    pub fn with_clipboard(top_k: TopK, clipboard: Box<dyn Clipboard>) -> Self {
        Self {
            conversation: Conversation::new(),
            state: SessionState::Idle,
            top_k,
            next_ticket: 0,
            revision: 0,
            clipboard,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_busy(&self) -> bool {
        matches!(self.state, SessionState::AwaitingResponse { .. })
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    pub fn turns(&self) -> &[Turn] {
        self.conversation.turns()
    }

    pub fn top_k(&self) -> TopK {
        self.top_k
    }

    /// Applies to later questions only
    pub fn set_top_k(&mut self, top_k: TopK) {
        self.top_k = top_k;
    }

    /// Bumped on every change to the turn list; views scroll to the bottom
    /// when it moves.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Accept a question: append the user turn and start waiting.
    ///
    /// Rejections leave the session untouched.
    pub fn submit(&mut self, text: &str, top_k: TopK) -> Result<PendingQuery, SubmitRejected> {
        if self.is_busy() {
            return Err(SubmitRejected::Busy);
        }
        let question = validation::validate_question(text)?;

        self.conversation.push_user(question);
        self.next_ticket += 1;
        let ticket = Ticket(self.next_ticket);
        self.state = SessionState::AwaitingResponse { ticket };
        self.revision += 1;
        debug!("Submitted question {:?} with top_k={}", ticket, top_k);

        Ok(PendingQuery {
            ticket,
            request: QueryRequest::new(question, top_k),
        })
    }

    /// Record the answer for `ticket` and return to idle.
    ///
    /// Returns `None` when the ticket is not the one being waited on (the
    /// conversation was cleared meanwhile); nothing changes in that case.
    pub fn resolve(
        &mut self,
        ticket: Ticket,
        result: ApiResult<QueryResponse>,
    ) -> Option<&AssistantTurn> {
        match self.state {
            SessionState::AwaitingResponse { ticket: waiting } if waiting == ticket => {}
            _ => {
                debug!("Ignoring answer for stale ticket {:?}", ticket);
                return None;
            }
        }

        self.state = SessionState::Idle;
        self.revision += 1;
        match result {
            Ok(response) => {
                info!(
                    "Answer received: {} source(s), {:?}s",
                    response.sources_count, response.processing_time
                );
                self.conversation.push_answer(response)
            }
            Err(failure) => {
                warn!("Question failed: {}", failure);
                self.conversation.push_failure(&failure)
            }
        }
    }

    /// Full cycle against `backend`: submit, one query, resolve.
    pub async fn ask<B>(
        &mut self,
        backend: &B,
        text: &str,
        top_k: TopK,
    ) -> Result<&AssistantTurn, ChatError>
    where
        B: QueryBackend + ?Sized,
    {
        let pending = self.submit(text, top_k)?;
        let result = backend.query(&pending.request).await;
        self.resolve(pending.ticket, result)
            .ok_or(ChatError::Superseded)
    }

    /// Discard every turn. Any outstanding answer will be ignored.
    pub fn clear(&mut self) {
        if let SessionState::AwaitingResponse { ticket } = self.state {
            debug!("Clearing while waiting on {:?}", ticket);
        }
        self.conversation.clear();
        self.state = SessionState::Idle;
        self.revision += 1;
    }

    /// Put a turn's displayed text on the clipboard
    pub fn copy(&mut self, id: TurnId) -> Result<String, ChatError> {
        let text = self
            .conversation
            .get(id)
            .map(|t| t.display_text().to_string())
            .ok_or(ChatError::UnknownTurn(id))?;
        self.clipboard.set_text(&text)?;
        Ok(text)
    }

    pub fn export_markdown(&self) -> String {
        transcript(&self.conversation)
    }

    pub fn export_to(&self, path: &Path) -> crate::Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.export_markdown())?;
        info!("Exported conversation to {}", path.display());
        Ok(())
    }
}

/// Notice to show after an answer was recorded, if any
pub fn answer_notice(turn: &AssistantTurn) -> Option<Notice> {
    match turn.outcome {
        Outcome::Success => turn
            .sources_count
            .filter(|n| *n > 0)
            .map(|n| Notice::new(NoticeKind::Success, format!("Answer generated from {n} source(s)"))),
        Outcome::Failure => Some(Notice::new(NoticeKind::Error, turn.sanitized_text.clone())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{ApiFailure, FailureKind};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CannedBackend {
        result: ApiResult<QueryResponse>,
        calls: AtomicUsize,
    }

    impl CannedBackend {
        fn answering(answer: &str) -> Self {
            Self {
                result: Ok(QueryResponse {
                    question: "q".to_string(),
                    answer: answer.to_string(),
                    sources_count: 3,
                    chunks_used: vec!["c".to_string()],
                    processing_time: Some(0.2),
                }),
                calls: AtomicUsize::new(0),
            }
        }

        fn failing(kind: FailureKind, message: &str) -> Self {
            Self {
                result: Err(ApiFailure::new(kind, message)),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait::async_trait]
    impl QueryBackend for CannedBackend {
        async fn query(&self, _request: &QueryRequest) -> ApiResult<QueryResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.result.clone()
        }
    }

    fn session() -> (ChatSession, MemoryClipboard) {
        let clipboard = MemoryClipboard::new();
        let s = ChatSession::with_clipboard(TopK::default(), Box::new(clipboard.clone()));
        (s, clipboard)
    }

    #[test]
    fn test_submit_then_resolve_appends_two_turns() {
        let (mut s, _) = session();
        let pending = s.submit("  what is SAP?  ", TopK::default()).unwrap();
        assert_eq!(pending.request.question, "what is SAP?");
        assert_eq!(pending.request.top_k, 5);
        assert_eq!(s.state(), SessionState::AwaitingResponse { ticket: pending.ticket });
        assert_eq!(s.turns().len(), 1);

        let turn = s
            .resolve(
                pending.ticket,
                Ok(QueryResponse {
                    question: "what is SAP?".to_string(),
                    answer: "<think>x</think>An ERP".to_string(),
                    sources_count: 1,
                    chunks_used: Vec::new(),
                    processing_time: None,
                }),
            )
            .unwrap();
        assert_eq!(turn.sanitized_text, "An ERP");
        assert_eq!(s.state(), SessionState::Idle);
        assert_eq!(s.turns().len(), 2);
        assert_eq!(s.turns()[0].role(), TurnRole::User);
        assert_eq!(s.turns()[1].role(), TurnRole::Assistant);
    }

    #[test]
    fn test_busy_submit_changes_nothing() {
        let (mut s, _) = session();
        let first = s.submit("first question", TopK::default()).unwrap();
        let revision = s.revision();

        assert_eq!(
            s.submit("second question", TopK::default()),
            Err(SubmitRejected::Busy)
        );
        assert_eq!(s.turns().len(), 1);
        assert_eq!(s.revision(), revision);
        assert_eq!(s.state(), SessionState::AwaitingResponse { ticket: first.ticket });
    }

    #[test]
    fn test_empty_submit_rejected() {
        let (mut s, _) = session();
        assert_eq!(
            s.submit(" \n\t ", TopK::default()),
            Err(SubmitRejected::Invalid(ValidationError::EmptyQuestion))
        );
        let too_long = "x".repeat(validation::QUESTION_MAX_CHARS + 1);
        assert_eq!(
            s.submit(&too_long, TopK::default()),
            Err(SubmitRejected::Invalid(ValidationError::QuestionTooLong))
        );
        assert!(s.turns().is_empty());
        assert_eq!(s.state(), SessionState::Idle);
    }

    #[test]
    fn test_short_submit_rejected() {
        let (mut s, _) = session();
        assert_eq!(
            s.submit("ab", TopK::default()),
            Err(SubmitRejected::Invalid(ValidationError::QuestionTooShort))
        );
        assert!(s.turns().is_empty());
        assert_eq!(s.revision(), 0);

        let backend = CannedBackend::answering("never");
        let err = tokio_test::block_on(s.ask(&backend, " ab ", TopK::default())).unwrap_err();
        assert!(matches!(
            err,
            ChatError::Rejected(SubmitRejected::Invalid(ValidationError::QuestionTooShort))
        ));
        assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
        assert!(s.submit("abc", TopK::default()).is_ok());
    }

    #[test]
    fn test_failure_resolves_to_idle_with_failed_turn() {
        let (mut s, _) = session();
        let pending = s.submit("question", TopK::default()).unwrap();
        let turn = s
            .resolve(
                pending.ticket,
                Err(ApiFailure::new(
                    FailureKind::NotFound,
                    "No relevant information found in the knowledge base",
                )),
            )
            .unwrap();
        assert_eq!(turn.outcome, Outcome::Failure);
        let notice = answer_notice(turn).unwrap();
        assert_eq!(notice.kind, NoticeKind::Error);
        assert_eq!(s.state(), SessionState::Idle);
    }

    #[test]
    fn test_clear_discards_outstanding_answer() {
        let (mut s, _) = session();
        let pending = s.submit("question", TopK::default()).unwrap();
        s.clear();
        assert!(s.turns().is_empty());
        assert_eq!(s.state(), SessionState::Idle);

        assert!(s.resolve(pending.ticket, Err(ApiFailure::new(FailureKind::Network, "x"))).is_none());
        assert!(s.turns().is_empty());

        // Clearing again is harmless
        s.clear();
        assert!(s.turns().is_empty());
    }

    #[test]
    fn test_stale_ticket_does_not_touch_newer_question() {
        let (mut s, _) = session();
        let old = s.submit("old", TopK::default()).unwrap();
        s.clear();
        let new = s.submit("new", TopK::default()).unwrap();

        assert!(s.resolve(old.ticket, Err(ApiFailure::new(FailureKind::Network, "x"))).is_none());
        assert_eq!(s.state(), SessionState::AwaitingResponse { ticket: new.ticket });
        assert_eq!(s.turns().len(), 1);
    }

    #[test]
    fn test_copy() {
        let (mut s, clipboard) = session();
        let pending = s.submit("question", TopK::default()).unwrap();
        s.resolve(
            pending.ticket,
            Ok(QueryResponse {
                question: String::new(),
                answer: "<think>hidden</think>visible".to_string(),
                sources_count: 0,
                chunks_used: Vec::new(),
                processing_time: None,
            }),
        );
        let answer_id = s.turns()[1].id();
        let before = s.turns().to_vec();

        assert_eq!(s.copy(answer_id).unwrap(), "visible");
        assert_eq!(clipboard.contents().as_deref(), Some("visible"));
        assert_eq!(s.turns(), before.as_slice());

        s.clear();
        let missing = s.copy(answer_id);
        assert!(matches!(missing, Err(ChatError::UnknownTurn(id)) if id == answer_id));
    }

    #[tokio::test]
    async fn test_ask_issues_exactly_one_query() {
        let (mut s, _) = session();
        let backend = CannedBackend::answering("Answer");
        let turn = s.ask(&backend, "question", TopK::new(7).unwrap()).await.unwrap();
        assert_eq!(turn.sanitized_text, "Answer");
        assert_eq!(
            answer_notice(turn).unwrap().message,
            "Answer generated from 3 source(s)"
        );
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
        assert_eq!(s.turns().len(), 2);
    }

    #[tokio::test]
    async fn test_ask_failure_records_message() {
        let (mut s, _) = session();
        let backend = CannedBackend::failing(FailureKind::Network, "Unable to reach the server");
        let turn = s.ask(&backend, "question", TopK::default()).await.unwrap();
        assert_eq!(turn.outcome, Outcome::Failure);
        assert_eq!(turn.sanitized_text, "Unable to reach the server");
    }

    #[test]
    fn test_rejected_ask_issues_no_query() {
        let (mut s, _) = session();
        let backend = CannedBackend::answering("never");
        let err = tokio_test::block_on(s.ask(&backend, "   ", TopK::default())).unwrap_err();
        assert!(matches!(err, ChatError::Rejected(SubmitRejected::Invalid(_))));
        assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_top_k_change_keeps_history() {
        let (mut s, _) = session();
        let p = s.submit("question", TopK::default()).unwrap();
        s.set_top_k(TopK::new(9).unwrap());
        assert_eq!(p.request.top_k, 5);
        assert_eq!(s.top_k().get(), 9);
    }

    #[test]
    fn test_export_to_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let (mut s, _) = session();
        let p = s.submit("question", TopK::default()).unwrap();
        s.resolve(p.ticket, Err(ApiFailure::new(FailureKind::Network, "down")));
        let path = dir.path().join("out").join("chat.md");
        s.export_to(&path).unwrap();
        let written = std::fs::read_to_string(&path).unwrap();
        assert!(written.contains("question"));
        assert!(written.contains("down"));
    }
}
