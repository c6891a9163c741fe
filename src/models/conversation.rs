#[cfg(test)]
#[path = "conversation_test.rs"]
mod tests;

use chrono::{DateTime, Utc};

use crate::config::constants::TITLE_MAX_CHARS;
use crate::models::Message;

#[derive(Debug, Clone, Default)]
pub struct Conversation {
    id: String,
    title: String,
    model: Option<String>,
    messages: Vec<Message>,
    created_at: Option<DateTime<Utc>>,
    updated_at: Option<DateTime<Utc>>,
}

/// One row of the history list or of a search result.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConversationSummary {
    pub id: String,
    pub title: String,
    pub model: Option<String>,
    pub message_count: usize,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewConversation {
    pub title: String,
    pub model: Option<String>,
}

impl Conversation {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn with_model(mut self, model: Option<String>) -> Self {
        self.model = model;
        self
    }

    pub fn with_messages(mut self, messages: Vec<Message>) -> Self {
        self.messages = messages;
        self
    }

    pub fn with_created_at(mut self, timestamp: Option<DateTime<Utc>>) -> Self {
        self.created_at = timestamp;
        if self.updated_at.is_none() {
            self.updated_at = timestamp;
        }
        self
    }

    pub fn with_updated_at(mut self, timestamp: Option<DateTime<Utc>>) -> Self {
        if timestamp.is_some() {
            self.updated_at = timestamp;
        }
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn model(&self) -> Option<&str> {
        self.model.as_deref()
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }

    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.updated_at.or(self.created_at)
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn summary(&self) -> ConversationSummary {
        ConversationSummary {
            id: self.id.clone(),
            title: self.title.clone(),
            model: self.model.clone(),
            message_count: self.messages.len(),
            created_at: self.created_at,
            updated_at: self.updated_at(),
        }
    }
}

impl NewConversation {
    /// Builds the request used when the first message of a session is sent.
    /// `auto` means the backend picks the model, so no preference is stored.
    pub fn from_prompt(prompt: &str, selected_model: &str) -> Self {
        let model = if selected_model.is_empty() || is_auto_model(selected_model) {
            None
        } else {
            Some(selected_model.to_string())
        };

        Self {
            title: title_from_prompt(prompt, TITLE_MAX_CHARS),
            model,
        }
    }
}

pub fn is_auto_model(model: &str) -> bool {
    model.eq_ignore_ascii_case(crate::config::constants::AUTO_MODEL)
}

/// Takes the first `max_chars` characters of the prompt and marks the cut
/// with `...`. Counting is done in chars so multi-byte text never splits.
pub fn title_from_prompt(prompt: &str, max_chars: usize) -> String {
    let prompt = prompt.trim();
    match prompt.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &prompt[..idx]),
        None => prompt.to_string(),
    }
}
