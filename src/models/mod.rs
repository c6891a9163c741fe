pub mod backend;
pub mod conversation;
pub mod event;
pub mod message;
pub mod notice;
pub mod stream;
pub mod turn;
pub(crate) mod utils;
pub mod voice;

pub use backend::*;
pub use conversation::{Conversation, ConversationSummary, NewConversation};
pub use event::{ArcEventTx, Event, EventTx};
pub use message::{Message, Role};
pub use notice::*;
pub use stream::StreamEvent;
pub use turn::TurnId;
pub use voice::VoiceEvent;
