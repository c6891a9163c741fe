use std::sync::Arc;

use tokio::sync::mpsc;

use super::{Conversation, ConversationSummary, Message, SystemMetrics, TurnId, VoiceEvent};

#[derive(Debug, Clone)]
pub enum Event {
    Notice(crate::models::NoticeMessage),

    /// A finished message entered the transcript (the user's prompt).
    MessageAdded(Message),

    /// An empty assistant placeholder was inserted for `turn`.
    TurnStarted(TurnId),
    /// The placeholder of `turn` now holds `text` in full.
    TurnUpdated { turn: TurnId, text: String },
    TurnCompleted {
        turn: TurnId,
        text: String,
        model: String,
    },
    /// The turn ended without completing; whatever was rendered stays.
    TurnAborted(TurnId),

    /// Active-model indicator, kept apart from the transcript.
    ModelSelected(String),

    SetConversation(Option<Conversation>),
    ConversationCreated(ConversationSummary),
    ConversationDeleted(String),
    HistoryCleared,

    Metrics(SystemMetrics),
    Voice(VoiceEvent),
}

#[macro_export]
macro_rules! notice_info {
    ($msg:expr) => {
        $crate::models::Event::Notice($crate::models::NoticeMessage::info($msg))
    };
}

#[macro_export]
macro_rules! notice_warning {
    ($msg:expr) => {
        $crate::models::Event::Notice($crate::models::NoticeMessage::warning($msg))
    };
}

#[macro_export]
macro_rules! notice_error {
    ($msg:expr) => {
        $crate::models::Event::Notice($crate::models::NoticeMessage::error($msg))
    };
}

#[async_trait::async_trait]
pub trait EventTx {
    async fn send(&self, event: Event) -> Result<(), mpsc::error::SendError<Event>>;
}

#[async_trait::async_trait]
impl EventTx for mpsc::Sender<Event> {
    async fn send(&self, event: Event) -> Result<(), mpsc::error::SendError<Event>> {
        self.send(event).await
    }
}

#[async_trait::async_trait]
impl EventTx for mpsc::UnboundedSender<Event> {
    async fn send(&self, event: Event) -> Result<(), mpsc::error::SendError<Event>> {
        self.send(event)
    }
}

pub type ArcEventTx = Arc<dyn EventTx + Send + Sync>;
