use std::time::Duration;

use ratatui::layout::Rect;
use ratatui::widgets::ListState;
use tokio::sync::mpsc;

use crate::backend::{BackendClient, QueryError, EMPTY_RESPONSE_FALLBACK};
use crate::book::Book;
use crate::selection::{SelectionSnapshot, SelectionWatcher};
use crate::transcript::{Role, Transcript};
use crate::tui::AppEvent;

/// Seeded into the transcript so the panel is never blank.
const GREETING: &str =
    "Hello! I'm your AI assistant for this book. Ask me anything about the content.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    Normal,
    Editing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FocusPane {
    Navigation,
    Content,
    Transcript,
    Input, // Ask box inside the assistant panel
}

/// One display row of the content pane: a wrapped slice of a page line.
pub struct ContentRow {
    pub line: usize,
    pub text: String,
}

/// A backend query running in the background. Completion order, not
/// submission order, decides transcript order when requests overlap.
pub type InFlightQuery = tokio::task::JoinHandle<Result<String, QueryError>>;

pub struct App {
    // Core state
    pub should_quit: bool,
    pub input_mode: InputMode,
    pub focus: FocusPane,

    // Book navigation
    pub book: Book,
    pub nav_state: ListState,
    pub current_page: Option<usize>,

    // Content pane: wrapped rows, line cursor, line-range selection
    pub content_rows: Vec<ContentRow>,
    pub content_dirty: bool,
    pub content_scroll: u16,
    pub content_height: u16,
    pub content_width: u16,
    pub content_cursor: usize,
    pub selection_anchor: Option<usize>,
    pub mouse_dragging: bool,

    // Assistant panel
    pub panel_open: bool,
    pub transcript: Transcript,
    pub loading: bool,
    pub input: String,
    pub input_cursor: usize, // cursor position in input, in chars
    pub chat_scroll: u16,
    pub chat_height: u16, // height of chat area for scroll calculations
    pub chat_width: u16,  // width of chat area for wrap calculations
    pub animation_frame: u8,

    // Backend dispatch
    pub backend: BackendClient,
    pub in_flight: Vec<InFlightQuery>,

    // Selection watcher plumbing
    pub selection_snapshot: SelectionSnapshot,
    pub selection_watcher: SelectionWatcher,

    // Pane areas for mouse hit-testing (updated during render)
    pub nav_area: Option<Rect>,
    pub content_area: Option<Rect>,
    pub chat_area: Option<Rect>,
}

impl App {
    pub fn new(
        book: Book,
        backend_url: &str,
        request_timeout: Duration,
        events: mpsc::UnboundedSender<AppEvent>,
    ) -> Self {
        let backend = BackendClient::new(backend_url, request_timeout);
        let selection_snapshot = SelectionSnapshot::default();
        let selection_watcher = SelectionWatcher::activate(selection_snapshot.clone(), events);

        let mut transcript = Transcript::new();
        transcript.push(Role::Assistant, GREETING);

        let mut nav_state = ListState::default();
        let current_page = if book.pages().is_empty() {
            None
        } else {
            nav_state.select(Some(0));
            Some(0)
        };

        Self {
            should_quit: false,
            input_mode: InputMode::Normal,
            focus: FocusPane::Navigation,
            book,
            nav_state,
            current_page,
            content_rows: Vec::new(),
            content_dirty: true,
            content_scroll: 0,
            content_height: 0,
            content_width: 0,
            content_cursor: 0,
            selection_anchor: None,
            mouse_dragging: false,
            panel_open: false,
            transcript,
            loading: false,
            input: String::new(),
            input_cursor: 0,
            chat_scroll: 0,
            chat_height: 0,
            chat_width: 0,
            animation_frame: 0,
            backend,
            in_flight: Vec::new(),
            selection_snapshot,
            selection_watcher,
            nav_area: None,
            content_area: None,
            chat_area: None,
        }
    }

    // --- Page list navigation ---

    pub fn nav_down(&mut self) {
        let len = self.book.pages().len();
        if len > 0 {
            let i = self.nav_state.selected().unwrap_or(0);
            self.nav_state.select(Some((i + 1).min(len - 1)));
        }
    }

    pub fn nav_up(&mut self) {
        let i = self.nav_state.selected().unwrap_or(0);
        self.nav_state.select(Some(i.saturating_sub(1)));
    }

    pub fn nav_first(&mut self) {
        if !self.book.pages().is_empty() {
            self.nav_state.select(Some(0));
        }
    }

    pub fn nav_last(&mut self) {
        let len = self.book.pages().len();
        if len > 0 {
            self.nav_state.select(Some(len - 1));
        }
    }

    pub fn open_selected_page(&mut self) {
        let Some(idx) = self.nav_state.selected() else {
            return;
        };
        if self.book.page(idx).is_none() {
            return;
        }
        self.current_page = Some(idx);
        self.content_cursor = 0;
        self.content_scroll = 0;
        self.content_dirty = true;
        self.clear_selection();
    }

    pub fn current_page_title(&self) -> Option<&str> {
        self.current_page
            .and_then(|i| self.book.page(i))
            .map(|p| p.title.as_str())
    }

    fn current_page_line_count(&self) -> usize {
        self.current_page
            .and_then(|i| self.book.page(i))
            .map(|p| p.lines.len())
            .unwrap_or(0)
    }

    // --- Content pane ---

    /// Re-wrap the current page for the given pane width if anything changed.
    /// Keeping the row -> line map here makes mouse selection exact.
    pub fn ensure_content_rows(&mut self, width: u16) {
        if !self.content_dirty && self.content_width == width {
            return;
        }
        self.content_width = width;
        self.content_dirty = false;
        self.content_rows.clear();
        let Some(page) = self.current_page.and_then(|i| self.book.page(i)) else {
            return;
        };
        for (idx, line) in page.lines.iter().enumerate() {
            for text in wrap_line(line, width as usize) {
                self.content_rows.push(ContentRow { line: idx, text });
            }
        }
    }

    pub fn half_page(&self) -> usize {
        (self.content_height / 2).max(1) as usize
    }

    pub fn content_cursor_down(&mut self, n: usize) {
        let lines = self.current_page_line_count();
        if lines == 0 {
            return;
        }
        self.content_cursor = (self.content_cursor + n).min(lines - 1);
        self.ensure_cursor_visible();
        self.sync_selection_snapshot();
    }

    pub fn content_cursor_up(&mut self, n: usize) {
        self.content_cursor = self.content_cursor.saturating_sub(n);
        self.ensure_cursor_visible();
        self.sync_selection_snapshot();
    }

    pub fn content_cursor_top(&mut self) {
        self.content_cursor = 0;
        self.ensure_cursor_visible();
        self.sync_selection_snapshot();
    }

    pub fn content_cursor_bottom(&mut self) {
        let lines = self.current_page_line_count();
        if lines == 0 {
            return;
        }
        self.content_cursor = lines - 1;
        self.ensure_cursor_visible();
        self.sync_selection_snapshot();
    }

    /// Keep the cursor's wrapped rows inside the visible window.
    fn ensure_cursor_visible(&mut self) {
        if self.content_height == 0 || self.content_rows.is_empty() {
            return;
        }
        let first = self
            .content_rows
            .iter()
            .position(|r| r.line == self.content_cursor);
        let last = self
            .content_rows
            .iter()
            .rposition(|r| r.line == self.content_cursor);
        let (Some(first), Some(last)) = (first, last) else {
            return;
        };
        let height = self.content_height as usize;
        let scroll = self.content_scroll as usize;
        if first < scroll {
            self.content_scroll = first as u16;
        } else if last >= scroll + height {
            self.content_scroll = (last + 1 - height) as u16;
        }
    }

    pub fn content_scroll_down(&mut self, n: u16) {
        let max = (self.content_rows.len() as u16).saturating_sub(self.content_height);
        self.content_scroll = self.content_scroll.saturating_add(n).min(max);
    }

    pub fn content_scroll_up(&mut self, n: u16) {
        self.content_scroll = self.content_scroll.saturating_sub(n);
    }

    // --- Text selection ---

    pub fn toggle_selection_anchor(&mut self) {
        if self.selection_anchor.is_some() {
            self.clear_selection();
        } else if self.current_page_line_count() > 0 {
            self.selection_anchor = Some(self.content_cursor);
            self.sync_selection_snapshot();
        }
    }

    pub fn clear_selection(&mut self) {
        self.selection_anchor = None;
        self.selection_snapshot.clear();
    }

    /// Anchor and cursor normalized to (start, end), inclusive.
    pub fn selection_range(&self) -> Option<(usize, usize)> {
        let anchor = self.selection_anchor?;
        if anchor <= self.content_cursor {
            Some((anchor, self.content_cursor))
        } else {
            Some((self.content_cursor, anchor))
        }
    }

    /// The selected page lines, newline-joined and trimmed.
    pub fn selected_text(&self) -> Option<String> {
        let (start, end) = self.selection_range()?;
        let page = self.current_page.and_then(|i| self.book.page(i))?;
        let lines = page.lines.get(start..=end)?;
        let text = lines.join("\n").trim().to_string();
        if text.is_empty() {
            None
        } else {
            Some(text)
        }
    }

    /// Push the current selection (or its absence) into the shared snapshot
    /// the watcher reads at gesture end.
    pub fn sync_selection_snapshot(&self) {
        match self.selected_text() {
            Some(text) => self.selection_snapshot.set(text),
            None => self.selection_snapshot.clear(),
        }
    }

    /// Map a screen position inside the content pane to a page line.
    pub fn content_line_at(&self, x: u16, y: u16) -> Option<usize> {
        let area = self.content_area?;
        if area.width < 3 || area.height < 3 {
            return None;
        }
        let inner_x = area.x + 1..area.x + area.width - 1;
        let inner_y = area.y + 1..area.y + area.height - 1;
        if !inner_x.contains(&x) || !inner_y.contains(&y) {
            return None;
        }
        let row = self.content_scroll as usize + (y - area.y - 1) as usize;
        self.content_rows.get(row).map(|r| r.line)
    }

    /// Map a screen row inside the navigation pane to a page index.
    pub fn nav_page_at(&self, y: u16) -> Option<usize> {
        let area = self.nav_area?;
        if area.height < 3 {
            return None;
        }
        let inner_y = area.y + 1..area.y + area.height - 1;
        if !inner_y.contains(&y) {
            return None;
        }
        let idx = self.nav_state.offset() + (y - area.y - 1) as usize;
        (idx < self.book.pages().len()).then_some(idx)
    }

    // --- Assistant panel ---

    /// Toggle the assistant panel. Opening drops the user into the ask box;
    /// closing returns focus to the reader.
    pub fn toggle_panel(&mut self) {
        self.panel_open = !self.panel_open;
        if self.panel_open {
            self.focus = FocusPane::Input;
            self.input_mode = InputMode::Editing;
            self.input_cursor = self.input.chars().count();
        } else {
            if matches!(self.focus, FocusPane::Transcript | FocusPane::Input) {
                self.focus = FocusPane::Content;
            }
            self.input_mode = InputMode::Normal;
        }
    }

    pub fn chat_scroll_up(&mut self, n: u16) {
        self.chat_scroll = self.chat_scroll.saturating_sub(n);
        self.transcript.set_stick_to_bottom(false);
    }

    pub fn chat_scroll_down(&mut self, n: u16) {
        // Clamped against the wrapped height during render, where reaching
        // the bottom re-sticks the view.
        self.chat_scroll = self.chat_scroll.saturating_add(n);
    }

    // --- Query dispatch ---

    /// Typed submission: rejected while a request is in flight or when the
    /// input is blank.
    pub fn submit_typed(&mut self) {
        if self.input.trim().is_empty() || self.loading {
            return;
        }
        let query = self.input.clone();
        self.dispatch_query(query.clone(), query);
    }

    /// Selection-triggered submission: opens the panel when collapsed.
    /// Unlike typed submission this is not gated by the loading flag, so it
    /// may overlap a request that is already in flight.
    pub fn submit_selection(&mut self, text: String) {
        if !self.panel_open {
            self.panel_open = true;
        }
        let shown = format!("Can you explain this part: \"{text}\"");
        self.dispatch_query(shown, text);
    }

    fn dispatch_query(&mut self, shown: String, query: String) {
        tracing::debug!(query = %query, "dispatching backend query");
        self.transcript.push(Role::User, shown);
        self.input.clear();
        self.input_cursor = 0;
        self.loading = true;
        let backend = self.backend.clone();
        self.in_flight
            .push(tokio::spawn(async move { backend.query(&query).await }));
    }

    /// Collect finished backend calls and append their assistant replies.
    /// Every completion path appends exactly one message and clears the
    /// loading flag.
    pub async fn poll_queries(&mut self) {
        let mut idx = 0;
        while idx < self.in_flight.len() {
            if !self.in_flight[idx].is_finished() {
                idx += 1;
                continue;
            }
            let task = self.in_flight.remove(idx);
            let content = match task.await {
                Ok(Ok(answer)) if answer.is_empty() => EMPTY_RESPONSE_FALLBACK.to_string(),
                Ok(Ok(answer)) => answer,
                Ok(Err(err)) => err.user_message(self.backend.base_url()),
                Err(err) => {
                    tracing::warn!("query task failed: {err}");
                    QueryError::Other(err.to_string()).user_message(self.backend.base_url())
                }
            };
            self.transcript.push(Role::Assistant, content);
            self.loading = false;
        }
    }

    /// Advance the typing indicator while a reply is pending.
    pub fn tick_animation(&mut self) {
        if self.loading {
            self.animation_frame = (self.animation_frame + 1) % 3;
        }
    }
}

/// Word-wrap a line to `width` columns, hard-breaking words wider than the
/// pane. Always yields at least one row so blank lines keep their height.
fn wrap_line(line: &str, width: usize) -> Vec<String> {
    let width = width.max(1);
    let mut rows: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut current_len = 0usize;

    for word in line.split_whitespace() {
        let mut word = word;
        let mut word_len = word.chars().count();

        while word_len > width {
            if current_len > 0 {
                rows.push(std::mem::take(&mut current));
                current_len = 0;
            }
            let split = word
                .char_indices()
                .nth(width)
                .map(|(i, _)| i)
                .unwrap_or(word.len());
            rows.push(word[..split].to_string());
            word = &word[split..];
            word_len = word.chars().count();
        }
        if word.is_empty() {
            continue;
        }

        let needed = if current_len == 0 {
            word_len
        } else {
            current_len + 1 + word_len
        };
        if needed > width && current_len > 0 {
            rows.push(std::mem::take(&mut current));
            current.push_str(word);
            current_len = word_len;
        } else {
            if current_len > 0 {
                current.push(' ');
                current_len += 1;
            }
            current.push_str(word);
            current_len += word_len;
        }
    }

    if !current.is_empty() {
        rows.push(current);
    }
    if rows.is_empty() {
        rows.push(String::new());
    }
    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::testing::canned_backend;
    use crate::book::Page;
    use crate::selection::SelectionSource;

    fn sample_pages() -> Vec<Page> {
        vec![Page {
            title: "Nodes".to_string(),
            lines: vec![
                "ROS 2 nodes communicate over topics and services.".to_string(),
                "".to_string(),
                "Actions coordinate long running goals between nodes.".to_string(),
            ],
        }]
    }

    fn test_app(backend_url: &str) -> (App, mpsc::UnboundedReceiver<AppEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let app = App::new(
            Book::from_pages(sample_pages()),
            backend_url,
            Duration::from_secs(2),
            tx,
        );
        (app, rx)
    }

    async fn drain_queries(app: &mut App) {
        for _ in 0..400 {
            app.poll_queries().await;
            if app.in_flight.is_empty() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("queries never settled");
    }

    #[tokio::test]
    async fn test_transcript_seeded_with_greeting() {
        let (app, _rx) = test_app("http://127.0.0.1:9");
        let messages = app.transcript.messages();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].role, Role::Assistant);
        assert_eq!(messages[0].content, GREETING);
    }

    #[tokio::test]
    async fn test_selection_submission_opens_panel() {
        let (mut app, _rx) = test_app("http://127.0.0.1:9");
        assert!(!app.panel_open);

        app.submit_selection("nodes communicate over topics".to_string());

        assert!(app.panel_open);
        assert!(app.loading);
        assert_eq!(app.in_flight.len(), 1);
        let last = app.transcript.messages().last().unwrap();
        assert_eq!(last.role, Role::User);
        assert_eq!(
            last.content,
            "Can you explain this part: \"nodes communicate over topics\""
        );
    }

    #[tokio::test]
    async fn test_typed_submission_appends_and_clears_input() {
        let (mut app, _rx) = test_app("http://127.0.0.1:9");
        app.input = "what is a node".to_string();
        app.input_cursor = app.input.chars().count();

        app.submit_typed();

        assert!(app.loading);
        assert_eq!(app.in_flight.len(), 1);
        assert!(app.input.is_empty());
        assert_eq!(app.input_cursor, 0);
        let last = app.transcript.messages().last().unwrap();
        assert_eq!(last.role, Role::User);
        assert_eq!(last.content, "what is a node");
    }

    #[tokio::test]
    async fn test_blank_typed_submission_is_rejected() {
        let (mut app, _rx) = test_app("http://127.0.0.1:9");
        app.input = "   ".to_string();
        app.submit_typed();
        assert!(!app.loading);
        assert!(app.in_flight.is_empty());
        assert_eq!(app.transcript.messages().len(), 1);
    }

    #[tokio::test]
    async fn test_typed_submission_rejected_while_loading() {
        let (mut app, _rx) = test_app("http://127.0.0.1:9");
        app.loading = true;
        app.input = "second question".to_string();

        app.submit_typed();

        assert!(app.in_flight.is_empty());
        assert_eq!(app.input, "second question");
        assert_eq!(app.transcript.messages().len(), 1);
    }

    #[tokio::test]
    async fn test_selection_submission_allowed_while_loading() {
        let (mut app, _rx) = test_app("http://127.0.0.1:9");
        app.loading = true;

        app.submit_selection("three word selection".to_string());

        assert_eq!(app.in_flight.len(), 1);
        assert_eq!(app.transcript.messages().len(), 2);
    }

    #[tokio::test]
    async fn test_round_trip_appends_one_reply_per_submission() {
        let (url, _requests) = canned_backend("200 OK", r#"{"response": "X"}"#).await;
        let (mut app, _rx) = test_app(&url);

        app.input = "first".to_string();
        app.submit_typed();
        drain_queries(&mut app).await;

        app.input = "second".to_string();
        app.submit_typed();
        drain_queries(&mut app).await;

        // greeting + two user/assistant pairs
        let messages = app.transcript.messages();
        assert_eq!(messages.len(), 5);
        assert_eq!(messages[2].content, "X");
        assert_eq!(messages[4].content, "X");
        assert!(!app.loading);

        let ids: Vec<u64> = messages.iter().map(|m| m.id).collect();
        assert_eq!(ids, [1, 2, 3, 4, 5]);
    }

    #[tokio::test]
    async fn test_empty_backend_answer_uses_fallback() {
        let (url, _requests) = canned_backend("200 OK", "{}").await;
        let (mut app, _rx) = test_app(&url);

        app.input = "anything".to_string();
        app.submit_typed();
        drain_queries(&mut app).await;

        let last = app.transcript.messages().last().unwrap();
        assert_eq!(last.role, Role::Assistant);
        assert_eq!(last.content, EMPTY_RESPONSE_FALLBACK);
        assert!(!app.loading);
    }

    #[tokio::test]
    async fn test_connection_failure_surfaces_connect_guidance() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let (mut app, _rx) = test_app(&format!("http://{addr}"));
        app.input = "unreachable".to_string();
        app.submit_typed();
        drain_queries(&mut app).await;

        let last = app.transcript.messages().last().unwrap();
        assert_eq!(last.role, Role::Assistant);
        assert_eq!(
            last.content,
            format!(
                "Unable to connect to the backend API. Please make sure the server is running at http://{addr}"
            )
        );
        assert!(!app.loading);
    }

    #[tokio::test]
    async fn test_loading_clears_when_task_is_aborted() {
        let (mut app, _rx) = test_app("http://127.0.0.1:9");
        app.loading = true;
        let task: InFlightQuery = tokio::spawn(async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(String::new())
        });
        task.abort();
        app.in_flight.push(task);

        drain_queries(&mut app).await;

        assert!(!app.loading);
        let last = app.transcript.messages().last().unwrap();
        assert_eq!(
            last.content,
            QueryError::Other(String::new()).user_message(app.backend.base_url())
        );
    }

    #[tokio::test]
    async fn test_keyboard_selection_updates_snapshot() {
        let (mut app, _rx) = test_app("http://127.0.0.1:9");
        app.focus = FocusPane::Content;

        app.toggle_selection_anchor();
        assert_eq!(
            app.selection_snapshot.selection_text().as_deref(),
            Some("ROS 2 nodes communicate over topics and services.")
        );

        app.content_cursor_down(2);
        assert_eq!(app.selection_range(), Some((0, 2)));
        assert_eq!(
            app.selection_snapshot.selection_text().as_deref(),
            Some(
                "ROS 2 nodes communicate over topics and services.\n\nActions coordinate long running goals between nodes."
            )
        );

        app.clear_selection();
        assert_eq!(app.selection_snapshot.selection_text(), None);
    }

    #[tokio::test]
    async fn test_open_page_resets_cursor_and_selection() {
        let (mut app, _rx) = test_app("http://127.0.0.1:9");
        app.content_cursor = 2;
        app.selection_anchor = Some(0);
        app.sync_selection_snapshot();

        app.open_selected_page();

        assert_eq!(app.content_cursor, 0);
        assert!(app.selection_anchor.is_none());
        assert_eq!(app.selection_snapshot.selection_text(), None);
    }

    #[tokio::test]
    async fn test_content_rows_map_back_to_page_lines() {
        let (mut app, _rx) = test_app("http://127.0.0.1:9");
        app.ensure_content_rows(20);

        // Line 0 wraps to several rows; the blank line keeps one row.
        assert!(app.content_rows.len() > 3);
        assert_eq!(app.content_rows[0].line, 0);
        let blank_row = app
            .content_rows
            .iter()
            .find(|r| r.text.is_empty())
            .unwrap();
        assert_eq!(blank_row.line, 1);
        assert_eq!(app.content_rows.last().unwrap().line, 2);
    }

    #[test]
    fn test_wrap_line_breaks_on_words() {
        assert_eq!(wrap_line("one two three", 20), vec!["one two three"]);
        assert_eq!(wrap_line("one two three", 7), vec!["one two", "three"]);
    }

    #[test]
    fn test_wrap_line_hard_breaks_long_words() {
        assert_eq!(wrap_line("abcdefghij", 4), vec!["abcd", "efgh", "ij"]);
    }

    #[test]
    fn test_wrap_line_keeps_blank_lines() {
        assert_eq!(wrap_line("", 10), vec![""]);
        assert_eq!(wrap_line("   ", 10), vec![""]);
    }
}
