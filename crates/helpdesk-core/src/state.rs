//! UI-agnostic conversation state
//!
//! The conversation is owned by whichever UI drives it (TUI, one-shot CLI).
//! Network code never touches it directly; it reports [`ChatUpdate`]s and the
//! UI applies them with [`Conversation::apply`].

use anyhow::{bail, Result};
use serde::Serialize;

/// A chat message in the support conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
    /// Where the backend says the answer came from. Display only.
    #[serde(skip)]
    pub source: Option<String>,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
            source: None,
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
            source: None,
        }
    }
}

/// The role of a chat message sender
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

/// Body of a POST to the support endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AskRequest {
    pub question: String,
    /// History before `question`.
    pub messages: Vec<ChatMessage>,
}

/// One state transition reported by a running turn
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatUpdate {
    /// A streamed response began; opens an empty assistant message.
    StreamStarted,
    /// The stream announced where its answer comes from.
    Source(String),
    /// Text to append to the in-progress assistant message.
    Chunk(String),
    /// A complete, non-streamed answer.
    Reply {
        content: String,
        source: Option<String>,
    },
    /// The turn ended normally.
    Finished,
    /// The turn ended with an error. Content already shown stays.
    Failed(String),
}

impl ChatUpdate {
    /// Whether this update ends the turn.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ChatUpdate::Reply { .. } | ChatUpdate::Finished | ChatUpdate::Failed(_)
        )
    }
}

#[derive(Debug, Clone, Default)]
pub struct Conversation {
    messages: Vec<ChatMessage>,
    typing: bool,
    in_progress: Option<usize>,
    last_error: Option<String>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    /// True while a request is in flight or a stream is active.
    pub fn is_typing(&self) -> bool {
        self.typing
    }

    /// The assistant message currently receiving streamed content.
    pub fn in_progress(&self) -> Option<&ChatMessage> {
        self.in_progress.and_then(|i| self.messages.get(i))
    }

    /// Error that ended the most recent turn, cleared by the next submit.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Record a user question and enter the typing state.
    ///
    /// Returns the request to send. Refused while another turn is running.
    pub fn submit(&mut self, question: &str) -> Result<AskRequest> {
        if self.typing {
            bail!("A response is still in progress");
        }
        let question = question.trim();
        if question.is_empty() {
            bail!("Question is empty");
        }

        let request = AskRequest {
            question: question.to_string(),
            messages: self.messages.clone(),
        };
        self.messages.push(ChatMessage::user(question));
        self.typing = true;
        self.in_progress = None;
        self.last_error = None;
        Ok(request)
    }

    /// Apply one update from the running turn.
    ///
    /// Updates arriving outside a turn are ignored.
    pub fn apply(&mut self, update: ChatUpdate) {
        if !self.typing {
            tracing::debug!(?update, "ignoring update outside of a turn");
            return;
        }

        match update {
            ChatUpdate::StreamStarted => {
                if self.in_progress.is_none() {
                    self.messages.push(ChatMessage::assistant(""));
                    self.in_progress = Some(self.messages.len() - 1);
                }
            }
            ChatUpdate::Source(source) => {
                if let Some(message) = self.in_progress_mut() {
                    message.source = Some(source);
                }
            }
            ChatUpdate::Chunk(content) => match self.in_progress_mut() {
                Some(message) => message.content.push_str(&content),
                None => {
                    // Chunk without a start: open the slot now.
                    self.messages.push(ChatMessage::assistant(content));
                    self.in_progress = Some(self.messages.len() - 1);
                }
            },
            ChatUpdate::Reply { content, source } => {
                let mut message = ChatMessage::assistant(content);
                message.source = source;
                self.messages.push(message);
                self.end_turn();
            }
            ChatUpdate::Finished => self.end_turn(),
            ChatUpdate::Failed(error) => {
                self.last_error = Some(error);
                self.end_turn();
            }
        }
    }

    /// Drop the whole transcript and any running turn.
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    fn in_progress_mut(&mut self) -> Option<&mut ChatMessage> {
        self.in_progress.and_then(|i| self.messages.get_mut(i))
    }

    fn end_turn(&mut self) {
        self.typing = false;
        self.in_progress = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_submit_sends_prior_history() {
        let mut conversation = Conversation::new();
        let first = conversation.submit("VPN is down").unwrap();
        assert!(first.messages.is_empty());
        conversation.apply(ChatUpdate::Reply {
            content: "Restart the client.".to_string(),
            source: Some("faiss".to_string()),
        });

        let second = conversation.submit("Still down").unwrap();
        assert_eq!(second.question, "Still down");
        assert_eq!(
            second.messages,
            vec![
                ChatMessage::user("VPN is down"),
                ChatMessage {
                    role: ChatRole::Assistant,
                    content: "Restart the client.".to_string(),
                    source: Some("faiss".to_string()),
                },
            ]
        );
    }

    #[test]
    fn test_submit_refused_while_typing() {
        let mut conversation = Conversation::new();
        conversation.submit("first").unwrap();
        assert!(conversation.submit("second").is_err());
        assert_eq!(conversation.messages().len(), 1);
    }

    #[test]
    fn test_submit_rejects_blank_question() {
        let mut conversation = Conversation::new();
        assert!(conversation.submit("   ").is_err());
        assert!(!conversation.is_typing());
    }

    #[test]
    fn test_stream_opens_slot_before_first_chunk() {
        let mut conversation = Conversation::new();
        conversation.submit("hi").unwrap();
        conversation.apply(ChatUpdate::StreamStarted);

        let slot = conversation.in_progress().unwrap();
        assert_eq!(slot.role, ChatRole::Assistant);
        assert_eq!(slot.content, "");
        assert!(conversation.is_typing());
    }

    #[test]
    fn test_chunks_concatenate_in_order() {
        let mut conversation = Conversation::new();
        conversation.submit("hi").unwrap();
        conversation.apply(ChatUpdate::StreamStarted);
        conversation.apply(ChatUpdate::Source("gemini".to_string()));
        conversation.apply(ChatUpdate::Chunk("Hel".to_string()));
        conversation.apply(ChatUpdate::Chunk("lo".to_string()));
        conversation.apply(ChatUpdate::Chunk(" there".to_string()));
        conversation.apply(ChatUpdate::Finished);

        assert!(!conversation.is_typing());
        assert!(conversation.in_progress().is_none());
        let last = conversation.messages().last().unwrap();
        assert_eq!(last.content, "Hello there");
        assert_eq!(last.source.as_deref(), Some("gemini"));
        assert_eq!(conversation.messages().len(), 2);
    }

    #[test]
    fn test_failure_keeps_partial_content() {
        let mut conversation = Conversation::new();
        conversation.submit("hi").unwrap();
        conversation.apply(ChatUpdate::StreamStarted);
        conversation.apply(ChatUpdate::Chunk("partial".to_string()));
        conversation.apply(ChatUpdate::Failed("quota exceeded".to_string()));

        assert!(!conversation.is_typing());
        assert_eq!(conversation.messages().last().unwrap().content, "partial");
        assert_eq!(conversation.last_error(), Some("quota exceeded"));

        // The user may retry after a failure.
        conversation.submit("again").unwrap();
        assert_eq!(conversation.last_error(), None);
    }

    #[test]
    fn test_updates_after_turn_are_ignored() {
        let mut conversation = Conversation::new();
        conversation.submit("hi").unwrap();
        conversation.apply(ChatUpdate::StreamStarted);
        conversation.apply(ChatUpdate::Finished);
        conversation.apply(ChatUpdate::Chunk("late".to_string()));

        assert_eq!(conversation.messages().last().unwrap().content, "");
    }

    #[test]
    fn test_role_serializes_lowercase() {
        let json = serde_json::to_value(ChatMessage::assistant("ok")).unwrap();
        assert_eq!(json, serde_json::json!({"role": "assistant", "content": "ok"}));
    }
}
