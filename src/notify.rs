//! Transient notifications ("toasts") shown after user actions

use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// How long a notice stays on screen
pub const NOTICE_TTL: Duration = Duration::from_secs(4);
const MAX_QUEUED: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NoticeKind {
    Success,
    Error,
    Info,
}

#[derive(Debug, Clone)]
pub struct Notice {
    pub kind: NoticeKind,
    pub message: String,
    pub created_at: Instant,
}

impl Notice {
    pub fn new(kind: NoticeKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            created_at: Instant::now(),
        }
    }

    pub fn is_expired(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.created_at) >= NOTICE_TTL
    }
}

/// Bounded FIFO of notices; the newest unexpired one is displayed.
#[derive(Debug, Default)]
pub struct NoticeQueue {
    notices: VecDeque<Notice>,
}

impl NoticeQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, notice: Notice) {
        if self.notices.len() == MAX_QUEUED {
            self.notices.pop_front();
        }
        self.notices.push_back(notice);
    }

    pub fn success(&mut self, message: impl Into<String>) {
        self.push(Notice::new(NoticeKind::Success, message));
    }

    pub fn error(&mut self, message: impl Into<String>) {
        self.push(Notice::new(NoticeKind::Error, message));
    }

    pub fn info(&mut self, message: impl Into<String>) {
        self.push(Notice::new(NoticeKind::Info, message));
    }

    /// Drop expired notices and return the newest live one
    pub fn current(&mut self, now: Instant) -> Option<&Notice> {
        self.notices.retain(|n| !n.is_expired(now));
        self.notices.back()
    }

    pub fn len(&self) -> usize {
        self.notices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notices.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_newest_notice_wins() {
        let mut q = NoticeQueue::new();
        q.info("first");
        q.error("second");
        let now = Instant::now();
        let current = q.current(now).unwrap();
        assert_eq!(current.kind, NoticeKind::Error);
        assert_eq!(current.message, "second");
    }

    #[test]
    fn test_expired_notices_are_dropped() {
        let mut q = NoticeQueue::new();
        q.success("done");
        let later = Instant::now() + NOTICE_TTL + Duration::from_millis(1);
        assert!(q.current(later).is_none());
        assert!(q.is_empty());
    }

    #[test]
    fn test_queue_is_bounded() {
        let mut q = NoticeQueue::new();
        for i in 0..20 {
            q.info(format!("n{i}"));
        }
        assert_eq!(q.len(), MAX_QUEUED);
        assert_eq!(q.notices.front().unwrap().message, "n12");
    }
}
