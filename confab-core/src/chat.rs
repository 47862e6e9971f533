//! Prompt formatting: the fixed turn markup the model was trained with.
//!
//! Callers targeting a differently trained model can build their own markup
//! and skip [`render`] entirely, the rest of the pipeline does not depend on
//! it.

use serde::{Deserialize, Serialize};

/// Marker opening a conversation turn.
pub const START_OF_TURN: &str = "<start_of_turn>";

/// Marker closing a conversation turn, also the generation end signal.
pub const END_OF_TURN: &str = "<end_of_turn>";

/// The role of a message in a chat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    /// The human side of the conversation.
    #[serde(alias = "user")]
    User,
    /// The model side of the conversation.
    #[serde(alias = "model")]
    Model,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                Role::User => "user",
                Role::Model => "model",
            }
        )
    }
}

/// A chat message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Message role.
    pub role: Role,
    /// Message content.
    pub content: String,
}

impl Message {
    /// Create a user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    /// Create a model message.
    pub fn model(content: impl Into<String>) -> Self {
        Self {
            role: Role::Model,
            content: content.into(),
        }
    }
}

fn raw_turn(message: &Message) -> String {
    format!(
        "{START_OF_TURN}{}\n{}{END_OF_TURN}\n",
        message.role, message.content
    )
}

/// Wrap the conversation in turn markup and open the model turn.
pub fn render(messages: &[Message]) -> String {
    let mut raw = String::new();

    for message in messages {
        raw += &raw_turn(message);
    }

    raw += START_OF_TURN;
    raw += "model\n";
    raw
}
