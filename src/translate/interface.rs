use serde::{Deserialize, Serialize};

/// Which way a message travels relative to the local user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Received from the other party, translated into my language
    Incoming,
    /// Written by me, translated into their language
    Outgoing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Me,
    #[serde(other)]
    Them,
}

/// A prior message of the conversation, used only to build the prompt
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextMessage {
    pub role: Role,
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranslationRequest {
    pub text: String,
    pub direction: Direction,
    #[serde(default)]
    pub chat_id: String,
    #[serde(default)]
    pub context: Vec<ContextMessage>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranslationResult {
    pub translated_text: String,
    pub original_text: String,
    pub direction: Direction,
    #[serde(default)]
    pub translation_failed: bool,
}

impl TranslationResult {
    /// Echo the input back unchanged.
    ///
    /// `failed` marks a fallback after exhausted retries; a bypassed empty
    /// request echoes with `failed == false`.
    pub fn echo(request: &TranslationRequest, failed: bool) -> Self {
        Self {
            translated_text: request.text.clone(),
            original_text: request.text.clone(),
            direction: request.direction,
            translation_failed: failed,
        }
    }
}

/// One entry of the upstream `messages` array
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}
