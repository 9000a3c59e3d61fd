//! Chat model trait and message types.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }
}

/// Non-streaming chat completion.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Model used when the caller does not name one.
    fn default_model(&self) -> &str;

    /// Run one chat completion and return the assistant text.
    ///
    /// Fails with [`RagError::Provider`](crate::error::RagError::Provider)
    /// on transport failure, non-success status, or a malformed payload.
    async fn chat(&self, messages: &[ChatMessage], model: Option<&str>) -> Result<String>;
}
