pub mod metrics;
pub mod voice;

pub use metrics::MetricsPoller;
pub use voice::{
    CommandSynthesizer, SpeechRecognizer, SpeechSynthesizer, UnsupportedRecognizer, VoiceService,
    speakable_text,
};
