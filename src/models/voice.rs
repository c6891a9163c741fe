/// Notifications from a speech recognizer. Replaces per-callback hooks with a
/// single stream the front end subscribes to once.
///
/// A [`SpeechRecognizer`](crate::app::services::SpeechRecognizer) reports
/// `Started` once it listens, any number of `Transcript`s, then `Ended`.
/// The console renders a final transcript and sends it as a message.
#[derive(Debug, Clone, PartialEq)]
pub enum VoiceEvent {
    Started,
    Transcript { text: String, is_final: bool },
    Error(String),
    Ended,
}
