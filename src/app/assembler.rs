#[cfg(test)]
#[path = "assembler_test.rs"]
mod tests;

use crate::models::{StreamEvent, TurnId};

/// What a consumed event means for the caller.
#[derive(Debug, PartialEq, Eq)]
pub enum Consumed<'a> {
    /// The reply grew; this is the whole text so far.
    Text(&'a str),
    /// The backend picked a model for this turn.
    ModelResolved(&'a str),
    Ignored,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedTurn {
    pub turn: TurnId,
    pub text: String,
    pub model: String,
}

/// Accumulates the stream events of one assistant turn.
#[derive(Debug, Default)]
pub struct TurnAssembler {
    turn: TurnId,
    text: String,
    model: Option<String>,
}

impl TurnAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin(&mut self) -> TurnId {
        self.turn = TurnId::new();
        self.text.clear();
        self.model = None;
        self.turn.clone()
    }

    pub fn consume(&mut self, event: StreamEvent) -> Consumed<'_> {
        match event {
            StreamEvent::Content(fragment) => {
                self.text.push_str(&fragment);
                Consumed::Text(&self.text)
            }
            StreamEvent::ModelSelected(model) => {
                log::debug!("Turn {} routed to model {}", self.turn, model);
                Consumed::ModelResolved(self.model.insert(model).as_str())
            }
            StreamEvent::Unknown => Consumed::Ignored,
        }
    }

    pub fn turn(&self) -> &TurnId {
        &self.turn
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn model(&self) -> Option<&str> {
        self.model.as_deref()
    }

    /// Hands out the assembled reply. The model falls back to `fallback`
    /// when the backend never announced one.
    pub fn finish(&mut self, fallback: &str) -> CompletedTurn {
        CompletedTurn {
            turn: self.turn.clone(),
            text: std::mem::take(&mut self.text),
            model: self
                .model
                .take()
                .unwrap_or_else(|| fallback.to_string()),
        }
    }
}
