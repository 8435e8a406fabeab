use std::sync::Arc;
use std::time::Duration;

use pagechat_core::{
    ChatPanel, ChatRole, InputField, KeyValueStore, PanelState, RelayHandle, RelayReply,
    ReplyDisposition, RequestId, RevealFrame, RevealTask,
};
use tokio::sync::mpsc;

use crate::host::{validate_page_url, ActiveTab};
use crate::tui::AppEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    Normal,
    Editing,
}

pub type Panel = ChatPanel<Arc<dyn KeyValueStore>>;

pub struct App {
    pub should_quit: bool,
    pub input_mode: InputMode,

    pub panel: Panel,
    relay: RelayHandle,
    events: mpsc::UnboundedSender<AppEvent>,
    reveal_task: Option<RevealTask>,
    typing_delay: Duration,

    pub active_tab: ActiveTab,
    pub backend_url: String,

    // Page URL popup
    pub url_prompt: Option<InputField>,
    // One-line notice shown above the footer (bad URL and the like)
    pub status: Option<String>,

    // Chat view
    pub chat_scroll: u16,
    pub chat_height: u16, // Height of chat area for scroll calculations
    pub chat_width: u16,  // Width of chat area for wrap calculations
    pub follow_bottom: bool,

    // Animation state
    pub animation_frame: u8, // 0-2 for ellipsis animation
}

impl App {
    pub fn new(
        panel: Panel,
        relay: RelayHandle,
        events: mpsc::UnboundedSender<AppEvent>,
        active_tab: ActiveTab,
        backend_url: String,
        typing_delay: Duration,
    ) -> Self {
        Self {
            should_quit: false,
            input_mode: InputMode::Editing,
            panel,
            relay,
            events,
            reveal_task: None,
            typing_delay,
            active_tab,
            backend_url,
            url_prompt: None,
            status: None,
            chat_scroll: 0,
            chat_height: 0,
            chat_width: 0,
            follow_bottom: true,
            animation_frame: 0,
        }
    }

    /// Send the input, or handle a `/url` command typed into it
    pub fn submit(&mut self) {
        let text = self.panel.input().value().trim().to_string();

        if let Some(rest) = text.strip_prefix("/url") {
            if rest.is_empty() || rest.starts_with(char::is_whitespace) {
                self.apply_page_url(rest);
                self.panel.input_mut().clear();
                return;
            }
        }

        let Some(envelope) = self.panel.submit_input() else {
            if !self.panel.is_idle() {
                self.status = Some("Wait for the current answer to finish".to_string());
            }
            return;
        };

        self.status = None;
        self.follow_bottom = true;

        let relay = self.relay.clone();
        let events = self.events.clone();
        tokio::spawn(async move {
            let reply = relay.request(&envelope).await;
            let _ = events.send(AppEvent::Relay(reply));
        });
    }

    pub fn on_relay_reply(&mut self, reply: RelayReply) {
        let request = reply.id;
        match self.panel.on_relay_reply(reply) {
            ReplyDisposition::Reveal(content) => self.start_reveal(request, content),
            ReplyDisposition::Settled => self.follow_bottom = true,
            ReplyDisposition::Stale => {}
        }
    }

    fn start_reveal(&mut self, request: RequestId, content: String) {
        let events = self.events.clone();
        self.reveal_task = Some(RevealTask::spawn(content, self.typing_delay, move |frame| {
            let _ = events.send(AppEvent::Reveal(request, frame));
        }));
    }

    /// Apply a reveal frame if it belongs to the reveal currently running.
    /// Frames queued before a clear are dropped here.
    pub fn on_reveal_frame(&mut self, request: RequestId, frame: RevealFrame) {
        match self.panel.state() {
            PanelState::TypingOut { request: current, .. } if *current == request => {}
            _ => return,
        }

        match frame {
            RevealFrame::Progress { shown } => self.panel.on_reveal_progress(shown),
            RevealFrame::Complete => {
                self.panel.on_reveal_complete();
                self.reveal_task = None;
            }
        }
    }

    pub fn clear(&mut self) {
        // Dropping the task stops the reveal timer
        self.reveal_task = None;
        self.panel.clear();
        self.chat_scroll = 0;
        self.follow_bottom = true;
        self.status = None;
    }

    pub fn open_url_prompt(&mut self) {
        let mut prompt = InputField::new();
        if let Some(url) = self.active_tab.get() {
            prompt.set(url);
        }
        self.url_prompt = Some(prompt);
    }

    pub fn confirm_url_prompt(&mut self) {
        if let Some(prompt) = self.url_prompt.take() {
            self.apply_page_url(prompt.value());
        }
    }

    fn apply_page_url(&mut self, url: &str) {
        if url.trim().is_empty() {
            self.active_tab.set(None);
            self.status = Some("Page URL cleared".to_string());
            return;
        }

        match validate_page_url(url) {
            Ok(url) => {
                tracing::info!(url = %url, "active page changed");
                self.status = Some(format!("Asking about {}", url));
                self.active_tab.set(Some(url));
            }
            Err(message) => self.status = Some(message),
        }
    }

    /// Tick animation frame (called by Tick event)
    pub fn tick_animation(&mut self) {
        if self.panel.is_awaiting_reply() {
            self.animation_frame = (self.animation_frame + 1) % 3;
        }
    }

    /// Estimated number of wrapped lines the chat needs at the current width
    pub fn chat_line_count(&self) -> u16 {
        // Use actual chat width for wrap calculation, default to 50 if not set
        let wrap_width = if self.chat_width > 0 {
            self.chat_width as usize
        } else {
            50
        };

        let wrapped = |text: &str| -> u16 {
            let mut lines: u16 = 0;
            for line in text.lines() {
                // Use character count, not byte length, for proper UTF-8 handling
                let char_count = line.chars().count();
                lines = lines.saturating_add(if char_count == 0 {
                    1 // Empty line still takes one line
                } else {
                    ((char_count - 1) / wrap_width + 1) as u16
                });
            }
            lines.max(1)
        };

        let mut total_lines: u16 = 0;
        for msg in self.panel.transcript().messages() {
            total_lines = total_lines
                .saturating_add(1) // Role line
                .saturating_add(wrapped(&msg.content))
                .saturating_add(1); // Blank line after message
        }

        match self.panel.state() {
            PanelState::AwaitingReply { .. } => total_lines.saturating_add(2),
            PanelState::TypingOut { .. } => {
                let shown = self.panel.revealed_text().unwrap_or_default();
                total_lines.saturating_add(1).saturating_add(wrapped(shown))
            }
            PanelState::Idle => total_lines,
        }
    }

    fn max_scroll(&self) -> u16 {
        let visible_height = if self.chat_height > 0 {
            self.chat_height
        } else {
            20
        };
        self.chat_line_count().saturating_sub(visible_height)
    }

    /// Keep the newest text in view while following
    pub fn sync_scroll(&mut self) {
        if self.follow_bottom {
            self.chat_scroll = self.max_scroll();
        } else {
            self.chat_scroll = self.chat_scroll.min(self.max_scroll());
        }
    }

    pub fn scroll_up(&mut self, lines: u16) {
        self.chat_scroll = self.chat_scroll.saturating_sub(lines);
        self.follow_bottom = false;
    }

    pub fn scroll_down(&mut self, lines: u16) {
        let max = self.max_scroll();
        self.chat_scroll = (self.chat_scroll + lines).min(max);
        self.follow_bottom = self.chat_scroll >= max;
    }

    pub fn scroll_top(&mut self) {
        self.chat_scroll = 0;
        self.follow_bottom = false;
    }

    pub fn scroll_bottom(&mut self) {
        self.follow_bottom = true;
        self.sync_scroll();
    }

    pub fn half_page(&self) -> u16 {
        (self.chat_height / 2).max(1)
    }

    pub fn message_count(&self, role: ChatRole) -> usize {
        self.panel
            .transcript()
            .messages()
            .iter()
            .filter(|m| m.role == role)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pagechat_core::{BackendClient, MemoryStore, Relay, RelayResponse, Transcript};

    fn app() -> (App, mpsc::UnboundedReceiver<AppEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let tab = ActiveTab::new(None);
        let relay = Relay::new(BackendClient::new("http://127.0.0.1:9"), tab.clone()).spawn();
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let app = App::new(
            ChatPanel::mount(store),
            relay,
            tx,
            tab,
            "http://127.0.0.1:9".to_string(),
            Duration::from_millis(1),
        );
        (app, rx)
    }

    fn type_text(app: &mut App, text: &str) {
        text.chars().for_each(|c| app.panel.input_mut().insert(c));
    }

    #[tokio::test]
    async fn test_url_command_sets_active_tab_without_sending() {
        let (mut app, _rx) = app();
        type_text(&mut app, "/url https://example.com/post");
        app.submit();

        assert_eq!(app.active_tab.get().as_deref(), Some("https://example.com/post"));
        assert!(app.panel.is_idle());
        assert!(app.panel.input().is_empty());
        assert_eq!(app.panel.transcript(), &Transcript::greeting());
    }

    #[tokio::test]
    async fn test_bad_url_keeps_previous_tab() {
        let (mut app, _rx) = app();
        app.active_tab.set(Some("https://example.com".to_string()));
        type_text(&mut app, "/url example.org");
        app.submit();

        assert_eq!(app.active_tab.get().as_deref(), Some("https://example.com"));
        assert!(app.status.as_deref().unwrap_or_default().contains("http://"));
    }

    #[tokio::test]
    async fn test_unreachable_backend_ends_in_error_message() {
        let (mut app, mut rx) = app();
        type_text(&mut app, "hello");
        app.submit();
        assert!(app.panel.is_awaiting_reply());

        loop {
            match rx.recv().await {
                Some(AppEvent::Relay(reply)) => {
                    app.on_relay_reply(reply);
                    break;
                }
                Some(_) => continue,
                None => panic!("event channel closed"),
            }
        }

        assert!(app.panel.is_idle());
        assert_eq!(app.message_count(ChatRole::Error), 1);
    }

    #[tokio::test]
    async fn test_reveal_frames_from_before_clear_are_ignored() {
        let (mut app, _rx) = app();
        type_text(&mut app, "hello");
        app.submit();
        let PanelState::AwaitingReply { request } = app.panel.state().clone() else {
            panic!("expected a pending request");
        };

        app.on_relay_reply(RelayReply { id: request, response: RelayResponse::answer("Hi there") });
        app.clear();
        app.on_reveal_frame(request, RevealFrame::Complete);

        assert_eq!(app.panel.transcript(), &Transcript::greeting());
    }
}
