//! Main TUI application

use std::collections::HashSet;
use std::future::Future;
use std::io::{self, Stdout};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers, MouseEvent, MouseEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Margin, Rect},
    style::Stylize,
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Paragraph, Scrollbar, ScrollbarOrientation, ScrollbarState, Wrap},
    Frame, Terminal,
};
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::api::{
    ApiClient, ApiFailure, ApiResult, DeleteResponse, DocumentDetail, DocumentPage, QueryResponse,
    UploadProgress, UploadResponse, SESSION_EXPIRED_MESSAGE,
};
use crate::chat::{answer_notice, ChatSession, SessionState, Ticket, Turn};
use crate::config::RagdeskConfig;
use crate::format::{format_created_at, format_file_size, short_hash};
use crate::notify::{NoticeQueue, NOTICE_TTL};
use crate::session::SessionEvent;
use crate::validation::{self, TopK};

use super::input::{InputAction, InputState};
use super::picker::{Picker, PickerItem};
use super::progress::spinner;
use super::slash_commands::{parse_command, ChatCommand, Invocation, ParsedCommand, SlashPopup};
use super::theme::Theme;
use super::widgets::{
    render_turn_lines, HeaderBar, HelpBar, InputBox, StatusBar, ToastLine, UploadGauge,
};

/// Second Ctrl+C within this window quits
const QUIT_CONFIRM_WINDOW: Duration = Duration::from_secs(2);

const CHAT_KEYS: &[(&str, &str)] = &[
    ("Enter", "Send"),
    ("/", "Commands"),
    ("Ctrl+↑↓", "top-k"),
    ("Ctrl+O", "Documents"),
    ("Ctrl+Y", "Copy answer"),
    ("PgUp/PgDn", "Scroll"),
    ("Ctrl+C", "Quit"),
];

const DOCUMENT_KEYS: &[(&str, &str)] = &[
    ("↑↓", "Select"),
    ("←→", "Page"),
    ("d", "Delete"),
    ("r", "Reload"),
    ("Esc", "Back"),
];

const LOGIN_KEYS: &[(&str, &str)] = &[("Tab", "Switch field"), ("Enter", "Sign in"), ("Ctrl+C", "Quit")];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum View {
    Login,
    Chat,
    Documents,
}

/// Results of spawned API calls, delivered back to the event loop
enum AppEvent {
    Answer {
        ticket: Ticket,
        result: ApiResult<QueryResponse>,
    },
    Login(ApiResult<String>),
    CurrentUser(ApiResult<String>),
    DocumentsLoaded {
        page: u32,
        result: ApiResult<DocumentPage>,
    },
    DetailLoaded {
        hash: String,
        result: ApiResult<DocumentDetail>,
    },
    Deleted {
        hash: String,
        result: ApiResult<DeleteResponse>,
    },
    Uploaded {
        name: String,
        result: ApiResult<UploadResponse>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoginField {
    Username,
    Password,
}

struct LoginForm {
    username: InputState,
    password: InputState,
    focus: LoginField,
    submitting: bool,
}

impl LoginForm {
    fn new() -> Self {
        Self {
            username: InputState::new(),
            password: InputState::masked(),
            focus: LoginField::Username,
            submitting: false,
        }
    }

    fn focused_mut(&mut self) -> &mut InputState {
        match self.focus {
            LoginField::Username => &mut self.username,
            LoginField::Password => &mut self.password,
        }
    }

    fn toggle_focus(&mut self) {
        self.focus = match self.focus {
            LoginField::Username => LoginField::Password,
            LoginField::Password => LoginField::Username,
        };
    }
}

struct DocumentsView {
    picker: Picker,
    page: u32,
    page_count: u64,
    total: u64,
    pending_delete: Option<String>,
    requested_details: HashSet<String>,
}

impl DocumentsView {
    fn new() -> Self {
        let mut picker = Picker::new("Documents");
        picker.help = " ↑↓ select · ←→ page · d delete · r reload · Esc back ".to_string();
        Self {
            picker,
            page: 1,
            page_count: 1,
            total: 0,
            pending_delete: None,
            requested_details: HashSet::new(),
        }
    }

    fn refresh_title(&mut self) {
        self.picker.title = format!(
            "Documents · page {}/{} · {} total",
            self.page, self.page_count, self.total
        );
    }

    fn cancel_delete(&mut self) {
        self.pending_delete = None;
        self.picker.prompt = None;
    }
}

struct UploadJob {
    name: String,
    progress: UploadProgress,
    finished_at: Option<Instant>,
}

/// Everything the TUI shows and edits, independent of the terminal
struct AppState {
    client: ApiClient,
    page_size: u32,
    session_rx: mpsc::UnboundedReceiver<SessionEvent>,
    events_tx: mpsc::UnboundedSender<AppEvent>,
    events_rx: mpsc::UnboundedReceiver<AppEvent>,
    view: View,
    login: LoginForm,
    chat: ChatSession,
    input: InputState,
    slash_popup: SlashPopup,
    show_help: bool,
    notices: NoticeQueue,
    documents: DocumentsView,
    upload: Option<UploadJob>,
    scroll_offset: usize,
    seen_revision: u64,
    spinner_frame: usize,
    busy_since: Option<Instant>,
    quit_armed_at: Option<Instant>,
    should_quit: bool,
}

impl AppState {
    fn new(
        client: ApiClient,
        session_rx: mpsc::UnboundedReceiver<SessionEvent>,
        config: &RagdeskConfig,
        chat: ChatSession,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let view = if client.session().is_authenticated() {
            View::Chat
        } else {
            View::Login
        };
        Self {
            client,
            page_size: config.page_size,
            session_rx,
            events_tx,
            events_rx,
            view,
            login: LoginForm::new(),
            chat,
            input: InputState::new(),
            slash_popup: SlashPopup::new(),
            show_help: false,
            notices: NoticeQueue::new(),
            documents: DocumentsView::new(),
            upload: None,
            scroll_offset: 0,
            seen_revision: 0,
            spinner_frame: 0,
            busy_since: None,
            quit_armed_at: None,
            should_quit: false,
        }
    }

    /// Kick off the calls needed at startup
    fn start(&mut self) {
        if self.view == View::Chat {
            let client = self.client.clone();
            self.spawn(async move {
                AppEvent::CurrentUser(client.current_user().await.map(|u| u.username))
            });
        }
    }

    fn spawn<F>(&self, task: F)
    where
        F: Future<Output = AppEvent> + Send + 'static,
    {
        let tx = self.events_tx.clone();
        tokio::spawn(async move {
            let _ = tx.send(task.await);
        });
    }

    /// Apply everything that arrived since the last frame
    fn pump(&mut self) {
        while let Ok(event) = self.session_rx.try_recv() {
            self.handle_session_event(event);
        }
        while let Ok(event) = self.events_rx.try_recv() {
            self.handle_event(event);
        }
    }

    fn tick(&mut self) {
        self.spinner_frame = self.spinner_frame.wrapping_add(1);
        if let Some(job) = &self.upload {
            if job.finished_at.is_some_and(|t| t.elapsed() >= NOTICE_TTL) {
                self.upload = None;
            }
        }
    }

    /// Report a failure unless it is a 401, which the session event covers
    fn report(&mut self, failure: &ApiFailure) {
        if !failure.is_auth() {
            self.notices.error(failure.message.clone());
        }
    }

    // ─── Events ─────────────────────────────────────────────────────

    fn handle_session_event(&mut self, event: SessionEvent) {
        debug!("Session event: {:?}", event);
        match event {
            SessionEvent::LoggedIn { username } => {
                self.login.submitting = false;
                self.login.password.clear();
                self.view = View::Chat;
                self.notices.success(format!("Logged in as {username}"));
            }
            SessionEvent::LoggedOut => {
                self.chat.clear();
                self.busy_since = None;
                self.leave_documents();
                self.view = View::Login;
                self.notices.info("Logged out");
            }
            SessionEvent::LoginRequired => {
                if self.view != View::Login {
                    self.notices.error(SESSION_EXPIRED_MESSAGE);
                }
                self.chat.clear();
                self.busy_since = None;
                self.scroll_offset = 0;
                self.leave_documents();
                self.view = View::Login;
                self.login.focus = LoginField::Password;
            }
        }
    }

    fn handle_event(&mut self, event: AppEvent) {
        match event {
            AppEvent::Answer { ticket, result } => {
                let auth = result.as_ref().err().is_some_and(ApiFailure::is_auth);
                if let Some(turn) = self.chat.resolve(ticket, result) {
                    if !auth {
                        if let Some(notice) = answer_notice(turn) {
                            self.notices.push(notice);
                        }
                    }
                }
                if !self.chat.is_busy() {
                    self.busy_since = None;
                }
            }
            AppEvent::Login(result) => {
                self.login.submitting = false;
                if let Err(failure) = result {
                    self.notices.error(failure.message);
                    self.login.password.clear();
                    self.login.focus = LoginField::Password;
                }
            }
            AppEvent::CurrentUser(result) => match result {
                Ok(name) => debug!("Signed in as {}", name),
                Err(failure) => self.report(&failure),
            },
            AppEvent::DocumentsLoaded { page, result } => {
                let listing = result.unwrap_or_else(|failure| {
                    self.report(&failure);
                    DocumentPage::default()
                });
                self.show_documents(page, listing);
            }
            AppEvent::DetailLoaded { hash, result } => {
                let detail = match result {
                    Ok(detail) => detail_lines(&detail),
                    Err(failure) => {
                        self.report(&failure);
                        vec![failure.message]
                    }
                };
                self.documents.picker.set_detail(&hash, detail);
            }
            AppEvent::Deleted { hash, result } => match result {
                Ok(_) => {
                    self.notices.success("Document deleted");
                    self.documents.picker.remove(&hash);
                    self.documents.total = self.documents.total.saturating_sub(1);
                    if self.documents.picker.items.is_empty() && self.view == View::Documents {
                        let page = self.documents.page.saturating_sub(1).max(1);
                        self.load_documents(page);
                    } else {
                        self.documents.refresh_title();
                        self.request_detail();
                    }
                }
                Err(failure) => self.report(&failure),
            },
            AppEvent::Uploaded { name, result } => {
                if let Some(job) = self.upload.as_mut() {
                    job.finished_at = Some(Instant::now());
                }
                match result {
                    Ok(response) => {
                        info!("Uploaded {} ({})", name, short_hash(&response.file_hash));
                        let message = if response.message.is_empty() {
                            format!("{name} uploaded and indexed")
                        } else {
                            response.message
                        };
                        self.notices.success(message);
                        if self.view == View::Documents {
                            self.load_documents(self.documents.page);
                        }
                    }
                    Err(failure) => self.report(&failure),
                }
            }
        }
    }

    // ─── Keys ───────────────────────────────────────────────────────

    fn handle_key(&mut self, key: KeyEvent) {
        if key.kind != KeyEventKind::Press {
            return;
        }
        if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
            self.request_quit();
            return;
        }
        if self.show_help {
            self.show_help = false;
            return;
        }
        match self.view {
            View::Login => self.handle_login_key(key),
            View::Chat => self.handle_chat_key(key),
            View::Documents => self.handle_documents_key(key),
        }
    }

    fn handle_mouse(&mut self, mouse: MouseEvent) {
        if self.view != View::Chat {
            return;
        }
        match mouse.kind {
            MouseEventKind::ScrollUp => self.scroll_offset = self.scroll_offset.saturating_add(3),
            MouseEventKind::ScrollDown => self.scroll_offset = self.scroll_offset.saturating_sub(3),
            _ => {}
        }
    }

    fn request_quit(&mut self) {
        match self.quit_armed_at {
            Some(armed) if armed.elapsed() <= QUIT_CONFIRM_WINDOW => self.should_quit = true,
            _ => {
                self.quit_armed_at = Some(Instant::now());
                self.notices.info("Press Ctrl+C again to quit");
            }
        }
    }

    fn handle_login_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Tab | KeyCode::BackTab | KeyCode::Up | KeyCode::Down => {
                self.login.toggle_focus();
                return;
            }
            KeyCode::Enter => {
                match self.login.focus {
                    LoginField::Username => self.login.focus = LoginField::Password,
                    LoginField::Password => self.submit_login(),
                }
                return;
            }
            _ => {}
        }
        if self.login.submitting {
            return;
        }
        if self.login.focused_mut().handle_key(key) == InputAction::Quit {
            self.request_quit();
        }
    }

    fn submit_login(&mut self) {
        if self.login.submitting {
            return;
        }
        let username = self.login.username.buffer.trim().to_string();
        let password = self.login.password.buffer.clone();
        if let Err(e) = validation::validate_login(&username, &password) {
            self.notices.error(e.to_string());
            return;
        }

        self.login.submitting = true;
        let client = self.client.clone();
        self.spawn(async move {
            let result = client.login(&username, &password).await.map(|_| username);
            AppEvent::Login(result)
        });
    }

    fn handle_chat_key(&mut self, key: KeyEvent) {
        if key.modifiers.contains(KeyModifiers::CONTROL) {
            match key.code {
                KeyCode::Up => return self.set_top_k(self.chat.top_k().cycle_up()),
                KeyCode::Down => return self.set_top_k(self.chat.top_k().cycle_down()),
                KeyCode::Char('o') => return self.open_documents(),
                KeyCode::Char('y') => return self.copy_answer(None),
                _ => {}
            }
        }

        if self.slash_popup.visible {
            match key.code {
                KeyCode::Up => return self.slash_popup.select_prev(),
                KeyCode::Down => return self.slash_popup.select_next(),
                KeyCode::Tab => return self.accept_completion(),
                KeyCode::Enter => {
                    // A fully typed command runs right away
                    let complete = self
                        .slash_popup
                        .complete()
                        .is_some_and(|c| c.trim_end() == self.input.buffer.trim_end());
                    if !complete {
                        return self.accept_completion();
                    }
                    self.slash_popup.close();
                }
                KeyCode::Esc => return self.slash_popup.close(),
                _ => {}
            }
        }

        match self.input.handle_key(key) {
            InputAction::Quit => self.request_quit(),
            InputAction::Submit(text) => {
                self.slash_popup.close();
                self.submit_input(&text);
            }
            InputAction::ScrollUp => self.scroll_offset = self.scroll_offset.saturating_add(5),
            InputAction::ScrollDown => self.scroll_offset = self.scroll_offset.saturating_sub(5),
            InputAction::Tab => self.handle_tab_completion(),
            InputAction::Escape => self.slash_popup.close(),
            InputAction::Edited => self.update_popup_filter(),
            InputAction::None => {}
        }
    }

    fn accept_completion(&mut self) {
        if let Some(completed) = self.slash_popup.complete() {
            self.input.set_buffer(&completed);
        }
        self.slash_popup.close();
    }

    fn handle_tab_completion(&mut self) {
        let Some(prefix) = self.input.slash_prefix().map(str::to_string) else {
            return;
        };
        if !self.slash_popup.visible {
            self.slash_popup.open();
        }
        self.slash_popup.set_filter(&prefix);
        if self.slash_popup.matches.len() == 1 {
            self.accept_completion();
        }
    }

    fn update_popup_filter(&mut self) {
        match self.input.slash_prefix().map(str::to_string) {
            Some(prefix) if !self.input.buffer.contains(' ') => {
                if !self.slash_popup.visible {
                    self.slash_popup.open();
                }
                self.slash_popup.set_filter(&prefix);
            }
            _ => self.slash_popup.close(),
        }
    }

    fn submit_input(&mut self, text: &str) {
        match parse_command(text) {
            Some(ParsedCommand::Known(cmd, args)) => match cmd.invocation(&args) {
                Ok(invocation) => self.run_command(invocation),
                Err(usage) => self.notices.error(usage),
            },
            Some(ParsedCommand::Unknown(name)) => self
                .notices
                .error(format!("Unknown command: /{name}. Type /help for the list.")),
            None => self.ask(text),
        }
    }

    fn ask(&mut self, text: &str) {
        let top_k = self.chat.top_k();
        match self.chat.submit(text, top_k) {
            Ok(pending) => {
                self.busy_since = Some(Instant::now());
                let client = self.client.clone();
                self.spawn(async move {
                    let result = client.query(&pending.request).await;
                    AppEvent::Answer {
                        ticket: pending.ticket,
                        result,
                    }
                });
            }
            Err(rejected) => {
                // Keep what was typed so it can be sent later
                self.input.set_buffer(text);
                self.notices.error(rejected.to_string());
            }
        }
    }

    fn run_command(&mut self, invocation: Invocation) {
        debug!("Running command {:?}", invocation);
        match invocation {
            Invocation::Clear => {
                self.chat.clear();
                self.busy_since = None;
                self.scroll_offset = 0;
                self.notices.success("Conversation cleared");
            }
            Invocation::Copy(n) => self.copy_answer(n),
            Invocation::Export(path) => self.export(path),
            Invocation::TopK(k) => self.set_top_k(k),
            Invocation::Docs => self.open_documents(),
            Invocation::Upload { path, system } => self.start_upload(path, system),
            Invocation::Logout => {
                let client = self.client.clone();
                tokio::spawn(async move {
                    let _ = client.logout().await;
                });
            }
            Invocation::Help => self.show_help = true,
            Invocation::Quit => self.should_quit = true,
        }
    }

    fn set_top_k(&mut self, k: TopK) {
        self.chat.set_top_k(k);
        self.notices.info(format!("Retrieving {k} excerpt(s) per question"));
    }

    fn copy_answer(&mut self, n: Option<usize>) {
        let conversation = self.chat.conversation();
        let target = match n {
            Some(n) => conversation.nth_assistant(n),
            None => conversation.last_assistant(),
        }
        .map(|t| t.id);

        let Some(id) = target else {
            let message = match n {
                Some(n) => format!("There is no answer [{n}]"),
                None => "No answer to copy yet".to_string(),
            };
            return self.notices.error(message);
        };
        match self.chat.copy(id) {
            Ok(_) => self.notices.success("Message copied"),
            Err(e) => self.notices.error(e.to_string()),
        }
    }

    fn export(&mut self, path: Option<PathBuf>) {
        if self.chat.conversation().is_empty() {
            return self.notices.error("Nothing to export yet");
        }
        let path = path.unwrap_or_else(default_export_path);
        match self.chat.export_to(&path) {
            Ok(()) => self
                .notices
                .success(format!("Conversation exported to {}", path.display())),
            Err(e) => self.notices.error(e.to_string()),
        }
    }

    fn start_upload(&mut self, path: PathBuf, system: String) {
        if self
            .upload
            .as_ref()
            .is_some_and(|job| job.finished_at.is_none())
        {
            return self.notices.error("An upload is already running");
        }

        let name = display_name(&path);
        let (tx, progress) = UploadProgress::channel();
        self.upload = Some(UploadJob {
            name: name.clone(),
            progress,
            finished_at: None,
        });
        let client = self.client.clone();
        self.spawn(async move {
            let result = client.upload_pdf(&path, &system, Some(tx)).await;
            AppEvent::Uploaded { name, result }
        });
    }

    // ─── Documents ──────────────────────────────────────────────────

    fn open_documents(&mut self) {
        self.view = View::Documents;
        self.slash_popup.close();
        self.documents.picker.open_loading();
        self.load_documents(1);
    }

    fn leave_documents(&mut self) {
        self.documents.cancel_delete();
        self.documents.picker.close();
        if self.view == View::Documents {
            self.view = View::Chat;
        }
    }

    fn load_documents(&mut self, page: u32) {
        self.documents.picker.loading = true;
        self.documents.cancel_delete();
        let client = self.client.clone();
        let limit = self.page_size;
        self.spawn(async move {
            let result = client.list_documents(page, limit).await;
            AppEvent::DocumentsLoaded { page, result }
        });
    }

    fn show_documents(&mut self, page: u32, listing: DocumentPage) {
        let docs = &mut self.documents;
        docs.page = page;
        docs.total = listing.total;
        docs.page_count = listing.page_count(self.page_size);
        docs.requested_details.clear();
        docs.refresh_title();

        let items = listing
            .documents
            .into_iter()
            .map(|doc| {
                let mut subtitle = vec![doc.system_name];
                if let Some(size) = doc.file_size {
                    subtitle.push(format_file_size(size));
                }
                if !doc.created_at.is_empty() {
                    subtitle.push(format_created_at(&doc.created_at));
                }
                subtitle.retain(|s| !s.is_empty());
                PickerItem::new(doc.file_hash, doc.filename, subtitle.join(" · "))
            })
            .collect();
        docs.picker.selected = 0;
        docs.picker.scroll_offset = 0;
        docs.picker.set_items(items);
        self.request_detail();
    }

    /// Fetch the detail of the selected document once
    fn request_detail(&mut self) {
        let Some(item) = self.documents.picker.selected_item() else {
            return;
        };
        if !item.detail.is_empty() || self.documents.requested_details.contains(&item.id) {
            return;
        }
        let hash = item.id.clone();
        self.documents.requested_details.insert(hash.clone());
        let client = self.client.clone();
        self.spawn(async move {
            let result = client.document_detail(&hash).await;
            AppEvent::DetailLoaded { hash, result }
        });
    }

    fn handle_documents_key(&mut self, key: KeyEvent) {
        if let Some(hash) = self.documents.pending_delete.clone() {
            if key.code == KeyCode::Char('y') {
                self.documents.cancel_delete();
                let client = self.client.clone();
                self.spawn(async move {
                    let result = client.delete_document(&hash).await;
                    AppEvent::Deleted { hash, result }
                });
            } else {
                self.documents.cancel_delete();
            }
            return;
        }

        let docs = &mut self.documents;
        match key.code {
            KeyCode::Esc | KeyCode::Char('q') => self.leave_documents(),
            KeyCode::Up | KeyCode::Char('k') => {
                docs.picker.select_prev();
                self.request_detail();
            }
            KeyCode::Down | KeyCode::Char('j') => {
                docs.picker.select_next();
                self.request_detail();
            }
            KeyCode::Left | KeyCode::PageUp | KeyCode::Char('p') => {
                if docs.page > 1 {
                    let page = docs.page - 1;
                    self.load_documents(page);
                }
            }
            KeyCode::Right | KeyCode::PageDown | KeyCode::Char('n') => {
                if u64::from(docs.page) < docs.page_count {
                    let page = docs.page + 1;
                    self.load_documents(page);
                }
            }
            KeyCode::Char('r') => {
                let page = docs.page;
                self.load_documents(page);
            }
            KeyCode::Char('d') | KeyCode::Delete => {
                if let Some(item) = docs.picker.selected_item() {
                    let prompt = format!(
                        "Delete \"{}\"? It will be removed from the index. (y/n)",
                        item.title
                    );
                    docs.pending_delete = Some(item.id.clone());
                    docs.picker.prompt = Some(prompt);
                }
            }
            _ => {}
        }
    }

    // ─── Drawing ────────────────────────────────────────────────────

    fn render(&mut self, f: &mut Frame) {
        let area = f.area();
        if self.chat.revision() != self.seen_revision {
            self.seen_revision = self.chat.revision();
            self.scroll_offset = 0;
        }

        match self.view {
            View::Login => self.render_login(f, area),
            View::Chat | View::Documents => self.render_main(f, area),
        }

        if self.show_help {
            render_help(f, area);
        }
    }

    fn render_main(&mut self, f: &mut Frame, area: Rect) {
        let show_upload = self.upload.is_some();
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(1),                           // Header
                Constraint::Length(1),                           // Status
                Constraint::Min(6),                              // Conversation
                Constraint::Length(if show_upload { 1 } else { 0 }), // Upload
                Constraint::Length(1),                           // Toast
                Constraint::Length(3),                           // Input
                Constraint::Length(1),                           // Help
            ])
            .split(area);

        let user = self.client.session().username();
        f.render_widget(
            HeaderBar {
                title: "Ragdesk",
                user: user.as_deref(),
                server: self.client.base_url(),
            },
            chunks[0],
        );

        let answers = self
            .chat
            .turns()
            .iter()
            .filter(|t| t.as_assistant().is_some())
            .count();
        f.render_widget(
            StatusBar {
                busy: self.chat.is_busy(),
                spinner_frame: self.spinner_frame,
                elapsed: self.busy_since.map(|t| t.elapsed()).unwrap_or_default(),
                top_k: self.chat.top_k().get(),
                answers,
            },
            chunks[1],
        );

        self.scroll_offset = render_conversation(f, chunks[2], self.chat.turns(), self.scroll_offset);

        if let Some(job) = &self.upload {
            f.render_widget(
                UploadGauge {
                    file_name: &job.name,
                    stage: job.progress.latest(),
                },
                chunks[3],
            );
        }

        f.render_widget(
            ToastLine {
                notice: self.notices.current(Instant::now()),
            },
            chunks[4],
        );

        let placeholder = if self.chat.is_busy() {
            "Waiting for the answer..."
        } else {
            "Ask a question (Enter to send, / for commands)"
        };
        f.render_widget(
            InputBox {
                title: "Message",
                content: &self.input.buffer,
                placeholder,
                focused: self.view == View::Chat,
            },
            chunks[5],
        );

        if self.view == View::Chat {
            if self.slash_popup.visible {
                render_slash_popup(f, chunks[5], &self.slash_popup);
            }
            let input_area = chunks[5];
            let cursor_x = input_area.x + 1 + self.input.cursor_display_width() as u16;
            f.set_cursor_position((
                cursor_x.min(input_area.x + input_area.width.saturating_sub(2)),
                input_area.y + 1,
            ));
        }

        let bindings = if self.view == View::Documents {
            DOCUMENT_KEYS
        } else {
            CHAT_KEYS
        };
        f.render_widget(HelpBar { bindings }, chunks[6]);

        if self.view == View::Documents {
            self.documents.picker.render(chunks[2], f.buffer_mut());
        }
    }

    fn render_login(&mut self, f: &mut Frame, area: Rect) {
        let width = 56.min(area.width);
        let height = 13.min(area.height);
        let form = Rect::new(
            area.x + (area.width - width) / 2,
            area.y + (area.height - height) / 2,
            width,
            height,
        );

        f.render_widget(Clear, form);
        let block = Block::default()
            .borders(Borders::ALL)
            .border_style(Theme::accent())
            .title_top(Line::styled(" Ragdesk · Sign in ", Theme::title()))
            .title_bottom(Line::styled(format!(" {} ", self.client.base_url()), Theme::muted()));
        let inner = block.inner(form);
        f.render_widget(block, form);

        let rows = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(1),
                Constraint::Length(3),
                Constraint::Length(3),
                Constraint::Length(1),
                Constraint::Length(1),
                Constraint::Min(0),
            ])
            .split(inner.inner(Margin {
                horizontal: 1,
                vertical: 0,
            }));

        let masked = self.login.password.display_text();
        let fields = [
            (LoginField::Username, "Username", self.login.username.buffer.as_str(), rows[1]),
            (LoginField::Password, "Password", masked.as_str(), rows[2]),
        ];
        for (field, title, content, rect) in fields {
            f.render_widget(
                InputBox {
                    title,
                    content,
                    placeholder: "",
                    focused: self.login.focus == field,
                },
                rect,
            );
        }

        let status = if self.login.submitting {
            Line::from(vec![
                Span::styled(format!("{} ", spinner(self.spinner_frame)), Theme::accent()),
                Span::styled("Signing in...", Theme::accent()),
            ])
        } else {
            Line::styled("Enter to continue · Tab to switch field", Theme::muted())
        };
        f.render_widget(Paragraph::new(status), rows[3]);
        f.render_widget(
            ToastLine {
                notice: self.notices.current(Instant::now()),
            },
            rows[4],
        );

        if !self.login.submitting {
            let (input, rect) = match self.login.focus {
                LoginField::Username => (&self.login.username, rows[1]),
                LoginField::Password => (&self.login.password, rows[2]),
            };
            let x = rect.x + 1 + input.cursor_display_width() as u16;
            f.set_cursor_position((x.min(rect.x + rect.width.saturating_sub(2)), rect.y + 1));
        }

        let help_row = Rect::new(area.x, area.y + area.height.saturating_sub(1), area.width, 1);
        f.render_widget(HelpBar { bindings: LOGIN_KEYS }, help_row);
    }
}

/// Draw the turns bottom-anchored; returns the scroll offset clamped to the
/// content.
fn render_conversation(f: &mut Frame, area: Rect, turns: &[Turn], scroll_offset: usize) -> usize {
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Theme::border())
        .title_top(Line::styled(" Conversation ", Theme::muted()));
    let inner = block.inner(area);
    f.render_widget(block, area);

    let width = inner.width as usize;
    let mut all_lines: Vec<Line> = Vec::new();
    let mut answer_no = 0;
    for turn in turns {
        let number = turn.as_assistant().map(|_| {
            answer_no += 1;
            answer_no
        });
        all_lines.extend(render_turn_lines(turn, number, width));
    }
    if all_lines.is_empty() {
        all_lines.push(Line::styled(
            "  Ask anything about the indexed documents.",
            Theme::muted(),
        ));
    }

    let total_lines = all_lines.len();
    let visible_height = inner.height as usize;
    let max_scroll = total_lines.saturating_sub(visible_height);
    let actual_scroll = scroll_offset.min(max_scroll);
    let start = max_scroll - actual_scroll;

    let visible: Vec<Line> = all_lines.into_iter().skip(start).take(visible_height).collect();
    f.render_widget(Paragraph::new(visible), inner);

    if total_lines > visible_height {
        let scrollbar = Scrollbar::new(ScrollbarOrientation::VerticalRight)
            .begin_symbol(Some("▲"))
            .end_symbol(Some("▼"))
            .track_symbol(Some("│"))
            .thumb_symbol("█");
        let mut state = ScrollbarState::new(max_scroll).position(max_scroll - actual_scroll);
        f.render_stateful_widget(
            scrollbar,
            area.inner(Margin {
                vertical: 1,
                horizontal: 0,
            }),
            &mut state,
        );
    }

    actual_scroll
}

fn render_slash_popup(f: &mut Frame, input_area: Rect, popup: &SlashPopup) {
    let items = popup.display_items();
    if items.is_empty() {
        return;
    }
    let popup_height = (items.len() as u16 + 2).min(12);
    let popup_width = 64.min(input_area.width.saturating_sub(2));
    let popup_area = Rect {
        x: input_area.x + 1,
        y: input_area.y.saturating_sub(popup_height),
        width: popup_width,
        height: popup_height,
    };

    f.render_widget(Clear, popup_area);

    let lines: Vec<Line> = items
        .iter()
        .map(|(cmd, desc, selected)| {
            let prefix = if *selected { "▸ " } else { "  " };
            let style = if *selected { Theme::accent() } else { Theme::text() };
            Line::from(vec![
                Span::styled(prefix, style),
                Span::styled(cmd.clone(), style.bold()),
                Span::styled(format!(" - {}", desc), Theme::muted()),
            ])
        })
        .collect();

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Theme::accent())
        .title(Span::styled(" Commands (Tab) ", Theme::title()));
    f.render_widget(Paragraph::new(lines).block(block), popup_area);
}

fn render_help(f: &mut Frame, area: Rect) {
    let mut lines = vec![Line::styled("Commands", Theme::title()), Line::default()];
    for cmd in ChatCommand::all() {
        let usage = if cmd.usage().is_empty() {
            cmd.to_string()
        } else {
            cmd.usage().to_string()
        };
        lines.push(Line::from(vec![
            Span::styled(format!("  {usage:<28}"), Theme::key()),
            Span::styled(cmd.description(), Theme::key_desc()),
        ]));
    }
    lines.push(Line::default());
    lines.push(Line::styled("Keys", Theme::title()));
    lines.push(Line::default());
    for (key, desc) in CHAT_KEYS {
        lines.push(Line::from(vec![
            Span::styled(format!("  {key:<28}"), Theme::key()),
            Span::styled(*desc, Theme::key_desc()),
        ]));
    }

    let width = 72.min(area.width);
    let height = (lines.len() as u16 + 2).min(area.height);
    let rect = Rect::new(
        area.x + (area.width - width) / 2,
        area.y + (area.height - height) / 2,
        width,
        height,
    );
    f.render_widget(Clear, rect);
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Theme::accent())
        .title_bottom(Line::styled(" any key to close ", Theme::muted()));
    f.render_widget(
        Paragraph::new(lines).block(block).wrap(Wrap { trim: false }),
        rect,
    );
}

fn detail_lines(detail: &DocumentDetail) -> Vec<String> {
    let mut lines = vec![format!("Hash: {}", detail.metadata.file_hash)];
    if let Some(chunks) = detail.chunks_count {
        lines.push(format!("Indexed chunks: {chunks}"));
    }
    if let Some(accessed) = detail.last_accessed.as_deref().filter(|s| !s.is_empty()) {
        lines.push(format!("Last accessed: {}", format_created_at(accessed)));
    }
    lines
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn default_export_path() -> PathBuf {
    PathBuf::from(format!(
        "ragdesk-conversation-{}.md",
        chrono::Local::now().format("%Y%m%d-%H%M%S")
    ))
}

/// Terminal front end. Owns the terminal for its lifetime and restores it
/// on drop.
pub struct App {
    terminal: Terminal<CrosstermBackend<Stdout>>,
    state: AppState,
}

impl App {
    pub fn new(
        client: ApiClient,
        session_rx: mpsc::UnboundedReceiver<SessionEvent>,
        config: &RagdeskConfig,
    ) -> io::Result<Self> {
        let top_k = TopK::new(config.default_top_k).unwrap_or_default();
        let state = AppState::new(client, session_rx, config, ChatSession::new(top_k));

        enable_raw_mode()?;
        let mut stdout = io::stdout();
        execute!(stdout, EnterAlternateScreen, crossterm::event::EnableMouseCapture)?;
        let terminal = Terminal::new(CrosstermBackend::new(stdout))?;

        Ok(Self { terminal, state })
    }

    /// Run the event loop until the user quits
    pub async fn run(&mut self) -> io::Result<()> {
        let poll_timeout = Duration::from_millis(16);
        let spinner_interval = Duration::from_millis(80);
        let mut last_spinner_update = Instant::now();

        self.state.start();
        info!("TUI started");

        while !self.state.should_quit {
            self.state.pump();

            if last_spinner_update.elapsed() >= spinner_interval {
                self.state.tick();
                last_spinner_update = Instant::now();
            }

            self.terminal.draw(|f| self.state.render(f))?;

            if event::poll(poll_timeout)? {
                match event::read()? {
                    Event::Key(key) => self.state.handle_key(key),
                    Event::Mouse(mouse) => self.state.handle_mouse(mouse),
                    _ => {}
                }
            }
        }

        if let SessionState::AwaitingResponse { .. } = self.state.chat.state() {
            debug!("Quitting with an answer still pending");
        }
        Ok(())
    }
}

impl Drop for App {
    fn drop(&mut self) {
        let _ = disable_raw_mode();
        let _ = execute!(
            self.terminal.backend_mut(),
            crossterm::event::DisableMouseCapture,
            LeaveAlternateScreen
        );
        let _ = self.terminal.show_cursor();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{FailureKind, MemoryCredentialStore};
    use crate::chat::MemoryClipboard;
    use crate::session::SessionContext;
    use ratatui::backend::TestBackend;
    use std::sync::Arc;

    fn state(authenticated: bool) -> (AppState, MemoryClipboard) {
        let (session, rx) = SessionContext::new(authenticated);
        let config = RagdeskConfig::new(std::env::temp_dir()).with_base_url("http://127.0.0.1:9");
        let store = Arc::new(MemoryCredentialStore::new());
        let client = ApiClient::new(&config, store, session).unwrap();
        let clipboard = MemoryClipboard::new();
        let chat = ChatSession::with_clipboard(TopK::default(), Box::new(clipboard.clone()));
        (AppState::new(client, rx, &config, chat), clipboard)
    }

    fn press(state: &mut AppState, code: KeyCode) {
        state.handle_key(KeyEvent::new(code, KeyModifiers::NONE));
    }

    fn type_line(state: &mut AppState, text: &str) {
        for c in text.chars() {
            press(state, KeyCode::Char(c));
        }
        state.slash_popup.close();
        press(state, KeyCode::Enter);
    }

    fn latest_notice(state: &mut AppState) -> String {
        state
            .notices
            .current(Instant::now())
            .map(|n| n.message.clone())
            .unwrap_or_default()
    }

    fn answer(text: &str, sources: u32) -> QueryResponse {
        QueryResponse {
            question: "q".to_string(),
            answer: text.to_string(),
            sources_count: sources,
            chunks_used: Vec::new(),
            processing_time: None,
        }
    }

    fn screen_text(terminal: &Terminal<TestBackend>) -> String {
        terminal
            .backend()
            .buffer()
            .content()
            .iter()
            .map(|cell| cell.symbol())
            .collect()
    }

    #[test]
    fn test_starts_on_login_without_credential() {
        let (app, _) = state(false);
        assert_eq!(app.view, View::Login);
        let (app, _) = state(true);
        assert_eq!(app.view, View::Chat);
    }

    #[test]
    fn test_topk_command() {
        let (mut app, _) = state(true);
        type_line(&mut app, "/topk 8");
        assert_eq!(app.chat.top_k().get(), 8);

        type_line(&mut app, "/topk 30");
        assert_eq!(app.chat.top_k().get(), 8);
        assert!(latest_notice(&mut app).contains("between 1 and 20"));
    }

    #[test]
    fn test_unknown_command_is_reported() {
        let (mut app, _) = state(true);
        type_line(&mut app, "/frobnicate");
        assert!(latest_notice(&mut app).starts_with("Unknown command: /frobnicate"));
    }

    #[tokio::test]
    async fn test_answer_resolves_pending_question() {
        let (mut app, clipboard) = state(true);
        type_line(&mut app, "What is the warranty?");
        let SessionState::AwaitingResponse { ticket } = app.chat.state() else {
            panic!("question should be pending");
        };

        // Submitting again while waiting keeps the text in the input
        type_line(&mut app, "second");
        assert_eq!(app.input.buffer, "second");
        assert_eq!(app.chat.turns().len(), 1);

        app.handle_event(AppEvent::Answer {
            ticket,
            result: Ok(answer("<think>x</think>Two years.", 3)),
        });
        assert!(!app.chat.is_busy());
        assert_eq!(app.chat.turns().len(), 2);
        assert_eq!(latest_notice(&mut app), "Answer generated from 3 source(s)");

        app.input.clear();
        type_line(&mut app, "/copy");
        assert_eq!(clipboard.contents().as_deref(), Some("Two years."));
        assert_eq!(latest_notice(&mut app), "Message copied");
    }

    #[tokio::test]
    async fn test_clear_drops_late_answer() {
        let (mut app, _) = state(true);
        type_line(&mut app, "hello there");
        let SessionState::AwaitingResponse { ticket } = app.chat.state() else {
            panic!("question should be pending");
        };
        type_line(&mut app, "/clear");
        assert_eq!(latest_notice(&mut app), "Conversation cleared");

        app.handle_event(AppEvent::Answer {
            ticket,
            result: Ok(answer("late", 1)),
        });
        assert!(app.chat.turns().is_empty());
    }

    #[test]
    fn test_login_required_switches_view() {
        let (mut app, _) = state(true);
        app.client.session().expire();
        app.pump();
        assert_eq!(app.view, View::Login);
        assert_eq!(latest_notice(&mut app), SESSION_EXPIRED_MESSAGE);
    }

    #[tokio::test]
    async fn test_expired_session_drops_conversation() {
        let (mut app, _) = state(true);
        type_line(&mut app, "What is the warranty?");
        let SessionState::AwaitingResponse { ticket } = app.chat.state() else {
            panic!("question should be pending");
        };
        app.handle_event(AppEvent::Answer {
            ticket,
            result: Ok(answer("Two years.", 1)),
        });
        assert_eq!(app.chat.turns().len(), 2);
        app.scroll_offset = 4;

        app.handle_session_event(SessionEvent::LoginRequired);
        assert_eq!(app.view, View::Login);
        assert!(app.chat.turns().is_empty());
        assert!(!app.chat.is_busy());
        assert_eq!(app.scroll_offset, 0);

        app.handle_session_event(SessionEvent::LoggedIn {
            username: "other".to_string(),
        });
        assert_eq!(app.view, View::Chat);
        assert!(app.chat.turns().is_empty());
    }

    #[test]
    fn test_failed_listing_shows_empty_page() {
        let (mut app, _) = state(true);
        app.view = View::Documents;
        app.documents.picker.open_loading();
        app.handle_event(AppEvent::DocumentsLoaded {
            page: 1,
            result: Err(ApiFailure::new(
                FailureKind::Server { status: 500 },
                "Failed to fetch documents",
            )),
        });
        assert!(app.documents.picker.items.is_empty());
        assert!(!app.documents.picker.loading);
        assert_eq!(latest_notice(&mut app), "Failed to fetch documents");
    }

    #[tokio::test]
    async fn test_delete_needs_confirmation() {
        let (mut app, _) = state(true);
        app.view = View::Documents;
        app.documents.picker.visible = true;
        app.documents.requested_details.insert("h1".to_string());
        app.documents
            .picker
            .set_items(vec![PickerItem::new("h1", "manual.pdf", "ops")]);

        press(&mut app, KeyCode::Char('d'));
        assert_eq!(app.documents.pending_delete.as_deref(), Some("h1"));
        press(&mut app, KeyCode::Char('n'));
        assert!(app.documents.pending_delete.is_none());

        app.handle_event(AppEvent::Deleted {
            hash: "h1".to_string(),
            result: Ok(DeleteResponse::default()),
        });
        assert_eq!(latest_notice(&mut app), "Document deleted");
    }

    #[test]
    fn test_renders_login_and_chat() {
        let mut terminal = Terminal::new(TestBackend::new(90, 30)).unwrap();

        let (mut app, _) = state(false);
        terminal.draw(|f| app.render(f)).unwrap();
        assert!(screen_text(&terminal).contains("Sign in"));

        let (mut app, _) = state(true);
        terminal.draw(|f| app.render(f)).unwrap();
        let text = screen_text(&terminal);
        assert!(text.contains("Conversation"));
        assert!(text.contains("top-k 5"));
    }
}
