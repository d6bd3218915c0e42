//! Terminal chat with mode-scoped tool sets. Switching modes rebinds the model
//! conversation to a new tool set and replays the user's turns into it.

pub mod chat;
pub mod config;
pub mod core;
pub mod error;
pub mod tools;
pub mod ui;

pub use crate::chat::{Chat, ChatBuilder, InterruptSource};
pub use crate::core::commands::{CommandResult, SlashCommand, SlashCommandDispatcher};
pub use crate::core::engine::{Conversation, ConversationEngine, EngineHandle, FragmentStream, Model, ModelClient};
pub use crate::core::mode::{Mode, ModeRegistry};
pub use crate::core::session::{SessionState, SwitchOutcome, TurnSink};
pub use crate::core::{Role, Turn};
pub use crate::error::{EngineError, SessionError};
