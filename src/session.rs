//! Explicit authentication context shared by the API client and the views.
//!
//! The context changes only on three triggers: login success, logout, and a
//! 401 seen by the API client. Each transition to logged-out caused by a 401
//! emits a single [`SessionEvent::LoginRequired`].

use std::sync::{Arc, RwLock};
use tokio::sync::mpsc;
use tracing::{debug, info};

/// Notifications published when the authentication state changes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// Login succeeded for this user
    LoggedIn { username: String },
    /// The user logged out explicitly
    LoggedOut,
    /// The server rejected the credential; the UI must show the login view
    LoginRequired,
}

#[derive(Debug, Default)]
struct SessionInner {
    authenticated: bool,
    username: Option<String>,
}

/// Cheaply cloneable handle on the current authentication state.
#[derive(Debug, Clone)]
pub struct SessionContext {
    inner: Arc<RwLock<SessionInner>>,
    events: mpsc::UnboundedSender<SessionEvent>,
}

impl SessionContext {
    /// Create a context and the receiver on which [`SessionEvent`]s arrive.
    ///
    /// `authenticated` seeds the state from the credential store at startup.
    pub fn new(authenticated: bool) -> (Self, mpsc::UnboundedReceiver<SessionEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let ctx = Self {
            inner: Arc::new(RwLock::new(SessionInner {
                authenticated,
                username: None,
            })),
            events: tx,
        };
        (ctx, rx)
    }

    pub fn is_authenticated(&self) -> bool {
        self.inner.read().map(|s| s.authenticated).unwrap_or(false)
    }

    pub fn username(&self) -> Option<String> {
        self.inner.read().ok().and_then(|s| s.username.clone())
    }

    pub(crate) fn set_username(&self, username: Option<String>) {
        if let Ok(mut s) = self.inner.write() {
            s.username = username;
        }
    }

    pub(crate) fn logged_in(&self, username: &str) {
        if let Ok(mut s) = self.inner.write() {
            s.authenticated = true;
            s.username = Some(username.to_string());
        }
        info!("Session authenticated as {}", username);
        let _ = self.events.send(SessionEvent::LoggedIn {
            username: username.to_string(),
        });
    }

    pub(crate) fn logged_out(&self) {
        if let Ok(mut s) = self.inner.write() {
            s.authenticated = false;
            s.username = None;
        }
        info!("Session logged out");
        let _ = self.events.send(SessionEvent::LoggedOut);
    }

    /// Called by the 401 interceptor. Emits `LoginRequired` once per call.
    pub(crate) fn expire(&self) {
        if let Ok(mut s) = self.inner.write() {
            s.authenticated = false;
            s.username = None;
        }
        debug!("Session expired, login required");
        let _ = self.events.send(SessionEvent::LoginRequired);
    }
}
