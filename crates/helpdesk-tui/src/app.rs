use ratatui::layout::Rect;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use helpdesk_core::{ChatUpdate, Conversation, HelpdeskClient};
use crate::tui::AppEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    Normal,
    Editing,
}

pub struct App {
    // Core state
    pub should_quit: bool,
    pub input_mode: InputMode,

    // Conversation state
    pub conversation: Conversation,
    pub client: HelpdeskClient,
    pub query_task: Option<JoinHandle<()>>,
    /// Incremented per request; updates tagged with an older turn are dropped.
    pub turn: u64,

    // Input state
    pub query_input: String,
    pub query_cursor: usize, // cursor position in query_input, in chars

    // Chat view state
    pub chat_scroll: u16,
    pub chat_height: u16,      // Inner height of chat area
    pub total_chat_lines: u16, // Wrapped line count from the last render
    pub follow_output: bool,   // Keep the newest line in view
    pub chat_area: Option<Rect>,

    // Animation state
    pub animation_frame: u8, // 0-2 for ellipsis animation
}

impl App {
    pub fn new(client: HelpdeskClient) -> Self {
        Self {
            should_quit: false,
            input_mode: InputMode::Editing,
            conversation: Conversation::new(),
            client,
            query_task: None,
            turn: 0,
            query_input: String::new(),
            query_cursor: 0,
            chat_scroll: 0,
            chat_height: 0,
            total_chat_lines: 0,
            follow_output: true,
            chat_area: None,
            animation_frame: 0,
        }
    }

    /// Send the current input as a question.
    ///
    /// Does nothing while a response is still being received.
    pub fn submit_query(&mut self, events: &mpsc::UnboundedSender<AppEvent>) {
        let request = match self.conversation.submit(&self.query_input) {
            Ok(request) => request,
            Err(error) => {
                tracing::debug!(%error, "submit refused");
                return;
            }
        };

        self.query_input.clear();
        self.query_cursor = 0;
        self.input_mode = InputMode::Normal;
        self.follow_output = true;
        self.animation_frame = 0;

        self.turn += 1;
        let turn = self.turn;
        let client = self.client.clone();
        let events = events.clone();
        tracing::info!(turn, endpoint = client.endpoint(), "submitting question");

        // Spawn background task; progress comes back as AppEvent::Chat
        self.query_task = Some(tokio::spawn(async move {
            client
                .run_turn(&request, |update| {
                    let _ = events.send(AppEvent::Chat { turn, update });
                })
                .await;
        }));
    }

    pub fn apply_chat(&mut self, turn: u64, update: ChatUpdate) {
        if turn != self.turn {
            tracing::debug!(turn, current = self.turn, "dropping update from an old turn");
            return;
        }

        let terminal = update.is_terminal();
        self.conversation.apply(update);
        if terminal {
            self.query_task = None;
        }
    }

    /// Stop listening to the running request, if any.
    pub fn abort_query(&mut self) {
        if let Some(task) = self.query_task.take() {
            task.abort();
        }
    }

    pub fn new_conversation(&mut self) {
        self.abort_query();
        self.turn += 1;
        self.conversation.clear();
        self.chat_scroll = 0;
        self.follow_output = true;
    }

    pub fn quit(&mut self) {
        self.abort_query();
        self.should_quit = true;
    }

    /// Tick animation frame (called by Tick event)
    pub fn tick_animation(&mut self) {
        if self.conversation.is_typing() {
            self.animation_frame = (self.animation_frame + 1) % 3;
        }
    }

    fn max_scroll(&self) -> u16 {
        self.total_chat_lines.saturating_sub(self.chat_height)
    }

    pub fn scroll_up(&mut self, lines: u16) {
        self.chat_scroll = self.chat_scroll.min(self.max_scroll()).saturating_sub(lines);
        self.follow_output = false;
    }

    pub fn scroll_down(&mut self, lines: u16) {
        self.chat_scroll = self.chat_scroll.saturating_add(lines).min(self.max_scroll());
        self.follow_output = self.chat_scroll >= self.max_scroll();
    }

    pub fn scroll_half_page_up(&mut self) {
        self.scroll_up((self.chat_height / 2).max(1));
    }

    pub fn scroll_half_page_down(&mut self) {
        self.scroll_down((self.chat_height / 2).max(1));
    }

    pub fn scroll_to_top(&mut self) {
        self.chat_scroll = 0;
        self.follow_output = false;
    }

    pub fn scroll_to_bottom(&mut self) {
        self.chat_scroll = self.max_scroll();
        self.follow_output = true;
    }

    /// Record the size of the last rendered transcript and keep the view in range.
    pub fn set_chat_metrics(&mut self, total_lines: u16, height: u16) {
        self.total_chat_lines = total_lines;
        self.chat_height = height;
        if self.follow_output {
            self.chat_scroll = self.max_scroll();
        } else {
            self.chat_scroll = self.chat_scroll.min(self.max_scroll());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn app() -> App {
        App::new(HelpdeskClient::new("http://127.0.0.1:1/ask"))
    }

    #[tokio::test]
    async fn test_submit_starts_turn_and_clears_input() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut app = app();
        app.query_input = "Wifi drops".to_string();
        app.query_cursor = 10;
        app.submit_query(&tx);

        assert_eq!(app.turn, 1);
        assert!(app.query_input.is_empty());
        assert_eq!(app.query_cursor, 0);
        assert!(app.conversation.is_typing());
        assert!(app.query_task.is_some());
        app.abort_query();
    }

    #[tokio::test]
    async fn test_second_submit_refused_while_typing() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut app = app();
        app.query_input = "first".to_string();
        app.submit_query(&tx);
        app.query_input = "second".to_string();
        app.submit_query(&tx);

        assert_eq!(app.turn, 1);
        assert_eq!(app.query_input, "second");
        assert_eq!(app.conversation.messages().len(), 1);
        app.abort_query();
    }

    #[tokio::test]
    async fn test_stale_updates_are_dropped() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut app = app();
        app.query_input = "first".to_string();
        app.submit_query(&tx);
        app.new_conversation();

        app.apply_chat(1, ChatUpdate::StreamStarted);
        app.apply_chat(1, ChatUpdate::Chunk("old".to_string()));
        assert!(app.conversation.messages().is_empty());
        assert!(app.query_task.is_none());
    }

    #[tokio::test]
    async fn test_terminal_update_releases_task() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut app = app();
        app.query_input = "hi".to_string();
        app.submit_query(&tx);
        app.abort_query();
        app.query_task = Some(tokio::spawn(async {}));

        app.apply_chat(1, ChatUpdate::StreamStarted);
        app.apply_chat(1, ChatUpdate::Chunk("Hello".to_string()));
        assert!(app.query_task.is_some());
        app.apply_chat(1, ChatUpdate::Finished);

        assert!(app.query_task.is_none());
        assert!(!app.conversation.is_typing());
        assert_eq!(app.conversation.messages()[1].content, "Hello");
    }

    #[test]
    fn test_scrolling_follows_output_until_user_scrolls() {
        let mut app = app();
        app.set_chat_metrics(50, 10);
        assert_eq!(app.chat_scroll, 40);

        app.scroll_up(5);
        assert_eq!(app.chat_scroll, 35);
        assert!(!app.follow_output);

        app.set_chat_metrics(60, 10);
        assert_eq!(app.chat_scroll, 35);

        app.scroll_down(100);
        assert_eq!(app.chat_scroll, 50);
        assert!(app.follow_output);
    }

    #[test]
    fn test_tick_only_animates_while_typing() {
        let mut app = app();
        app.tick_animation();
        assert_eq!(app.animation_frame, 0);
    }
}
