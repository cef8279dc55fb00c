use serde::{Deserialize, Serialize};

/// Role of a message author.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
  System,
  User,
  Assistant,
}

/// One `{role, content}` entry of a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
  pub role: MessageRole,
  pub content: String,
}

impl Message {
  pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
    Self {
      role,
      content: content.into(),
    }
  }

  pub fn system(content: impl Into<String>) -> Self {
    Self::new(MessageRole::System, content)
  }

  pub fn user(content: impl Into<String>) -> Self {
    Self::new(MessageRole::User, content)
  }

  pub fn assistant(content: impl Into<String>) -> Self {
    Self::new(MessageRole::Assistant, content)
  }
}
