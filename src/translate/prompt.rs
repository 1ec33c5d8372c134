use std::path::PathBuf;

use tracing::warn;

use super::interface::{ChatMessage, ContextMessage, Direction, Role};
use crate::config::{read_text_file, TranslationConfig};

pub const DEFAULT_SYSTEM_PROMPT: &str =
    "You are a translator. Translate the given text accurately. \
     Only output the translation, nothing else.";

const CONTEXT_PREAMBLE: &str =
    "Here is the recent conversation for context (do NOT translate these, \
     only use them to understand the conversation flow):\n\n";

/// Builds the upstream message list for one translation
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    system_prompt_path: PathBuf,
    my_language: String,
    their_language: String,
}

impl PromptBuilder {
    pub fn new(system_prompt_path: impl Into<PathBuf>, languages: &TranslationConfig) -> Self {
        Self {
            system_prompt_path: system_prompt_path.into(),
            my_language: languages.my_language.clone(),
            their_language: languages.their_language.clone(),
        }
    }

    /// Read on every call so the prompt can be edited while the service runs
    pub fn system_prompt(&self) -> String {
        match read_text_file(&self.system_prompt_path) {
            Ok(content) if !content.trim().is_empty() => content.trim().to_string(),
            Ok(_) => {
                warn!(
                    "{} is empty, using default prompt",
                    self.system_prompt_path.display()
                );
                DEFAULT_SYSTEM_PROMPT.to_string()
            }
            Err(e) => {
                warn!(
                    "{} not readable ({}), using default prompt",
                    self.system_prompt_path.display(),
                    e
                );
                DEFAULT_SYSTEM_PROMPT.to_string()
            }
        }
    }

    pub fn build(
        &self,
        text: &str,
        direction: Direction,
        context: &[ContextMessage],
    ) -> Vec<ChatMessage> {
        vec![
            ChatMessage::system(self.system_prompt()),
            ChatMessage::user(self.user_content(text, direction, context)),
        ]
    }

    fn language_pair(&self, direction: Direction) -> (&str, &str) {
        match direction {
            Direction::Outgoing => (&self.my_language, &self.their_language),
            Direction::Incoming => (&self.their_language, &self.my_language),
        }
    }

    fn user_content(&self, text: &str, direction: Direction, context: &[ContextMessage]) -> String {
        let (from, to) = self.language_pair(direction);
        let mut content = String::new();

        if context.is_empty() {
            content.push_str("Translate");
        } else {
            content.push_str(CONTEXT_PREAMBLE);
            for msg in context {
                let label = match msg.role {
                    Role::Me => "Me",
                    Role::Them => "Them",
                };
                content.push_str(&format!("{}: {}\n", label, msg.text));
            }
            content.push_str("\n---\n\nNow translate");
        }

        content.push_str(&format!(
            " the following message from {from} to {to}. \
             Output ONLY the {to} translation, nothing else:\n\n{text}"
        ));
        content
    }
}
