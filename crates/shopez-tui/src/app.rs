use std::sync::Arc;

use ratatui::layout::Rect;
use shopez_core::{dispatch, ChatSession, SessionEvent, ShopBackend, StalePolicy};
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    /// Keys scroll the transcript and trigger actions
    Normal,
    /// Keys go to the composer
    Editing,
}

pub struct App {
    pub should_quit: bool,
    pub input_mode: InputMode,

    // Conversation
    pub session: ChatSession,

    // Composer
    pub input: String,
    pub cursor: usize,

    // Transcript viewport, refreshed on every render
    pub scroll: u16,
    pub follow_bottom: bool,
    pub max_scroll: u16,
    pub chat_height: u16,
    pub chat_width: u16,
    pub chat_area: Option<Rect>,

    pub animation_frame: u8,

    // Shown in the header
    pub base_url: String,
    pub user_id: String,

    backend: Arc<dyn ShopBackend>,
    session_tx: mpsc::UnboundedSender<SessionEvent>,
}

impl App {
    pub fn new(
        backend: Arc<dyn ShopBackend>,
        session_tx: mpsc::UnboundedSender<SessionEvent>,
        stale_policy: StalePolicy,
        base_url: &str,
        user_id: &str,
    ) -> Self {
        Self {
            should_quit: false,
            input_mode: InputMode::Editing,
            session: ChatSession::new(stale_policy),
            input: String::new(),
            cursor: 0,
            scroll: 0,
            follow_bottom: true,
            max_scroll: 0,
            chat_height: 0,
            chat_width: 0,
            chat_area: None,
            animation_frame: 0,
            base_url: base_url.to_string(),
            user_id: user_id.to_string(),
            backend,
            session_tx,
        }
    }

    /// Send whatever is in the composer. The composer is cleared right away,
    /// the reply arrives later as a session event.
    pub fn submit(&mut self) {
        if self.input.trim().is_empty() {
            return;
        }

        let text = std::mem::take(&mut self.input);
        self.cursor = 0;
        self.apply(SessionEvent::UserSubmitted(text));
    }

    pub fn abort(&mut self) {
        self.apply(SessionEvent::AbortRequested);
    }

    /// Fold a reply from a background request into the transcript.
    pub fn on_session_event(&mut self, event: SessionEvent) {
        self.apply(event);
        self.input_mode = InputMode::Editing;
    }

    fn apply(&mut self, event: SessionEvent) {
        if let Some(effect) = self.session.handle(event) {
            dispatch(self.backend.clone(), effect, self.session_tx.clone());
        }
        self.scroll_to_bottom();
    }

    pub fn is_busy(&self) -> bool {
        self.session.is_busy()
    }

    /// Tick animation frame (called by Tick event)
    pub fn tick_animation(&mut self) {
        if self.is_busy() {
            self.animation_frame = (self.animation_frame + 1) % 3;
        }
    }

    /// Keep the newest message in view. The offset itself is resolved at
    /// render time, once the wrapped height is known.
    pub fn scroll_to_bottom(&mut self) {
        self.follow_bottom = true;
    }

    pub fn scroll_to_top(&mut self) {
        self.follow_bottom = false;
        self.scroll = 0;
    }

    pub fn scroll_down(&mut self, lines: u16) {
        self.scroll = self.scroll.saturating_add(lines).min(self.max_scroll);
        if self.scroll == self.max_scroll {
            self.follow_bottom = true;
        }
    }

    pub fn scroll_up(&mut self, lines: u16) {
        self.follow_bottom = false;
        self.scroll = self.scroll.saturating_sub(lines);
    }

    /// Record the measured transcript height and settle the scroll offset.
    pub fn update_viewport(&mut self, max_scroll: u16) {
        self.max_scroll = max_scroll;
        self.scroll = if self.follow_bottom {
            max_scroll
        } else {
            self.scroll.min(max_scroll)
        };
    }

    pub fn page(&self) -> u16 {
        (self.chat_height / 2).max(1)
    }
}
