/// One decoded unit of the `/chat` response stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// Incremental text to append to the reply.
    Content(String),
    /// The backend's choice of model for this turn.
    ModelSelected(String),
    /// Anything else the backend sends (`complete`, `error`, ...).
    Unknown,
}

impl StreamEvent {
    pub fn content(text: impl Into<String>) -> Self {
        StreamEvent::Content(text.into())
    }

    pub fn model_selected(model: impl Into<String>) -> Self {
        StreamEvent::ModelSelected(model.into())
    }
}
