pub mod client;
pub mod config;
pub mod markup;
pub mod state;
pub mod stream;

// Re-export main types for convenience
pub use client::{consume_stream, HelpdeskClient};
pub use config::Config;
pub use markup::{LineKind, RenderedLine, Segment};
pub use state::{AskRequest, ChatMessage, ChatRole, ChatUpdate, Conversation};
pub use stream::{EventDecoder, StreamEvent};
