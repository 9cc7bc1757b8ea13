//! docs_chat - streaming chat client for an embedded documentation assistant
//!
//! The crate consumes an incremental token/citation stream from a remote chat
//! service and folds it into a conversation through a pure state machine.

#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod conversation;
pub mod runtime;
pub mod session;
pub mod sse;
pub mod state_machine;
pub mod transport;

pub use config::{ChatConfig, Visibility};
pub use conversation::{Citation, Conversation, Message, MessageId, Role};
pub use runtime::{WidgetHandle, WidgetRuntime, WidgetUpdate};
pub use session::{KeyValueStore, MemoryStore, SessionManager, SqliteStore, StorageError};
pub use sse::{SseDecoder, SseFrame, StreamEvent};
pub use transport::{
    ChatError, ChatRequest, ChatTransport, HttpTransport, StreamHandle, ValidationError,
};
