use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::{self, UnboundedReceiver};

use super::*;
use crate::models::NoticeKind;

fn channel() -> (ArcEventTx, UnboundedReceiver<Event>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (Arc::new(tx), rx)
}

fn drain(rx: &mut UnboundedReceiver<Event>) -> Vec<Event> {
    let mut events = vec![];
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

#[derive(Default)]
struct RecordingSynthesizer {
    spoken: Mutex<Vec<(String, f32, f32)>>,
}

#[async_trait]
impl SpeechSynthesizer for Arc<RecordingSynthesizer> {
    fn is_supported(&self) -> bool {
        true
    }

    async fn speak(&self, text: &str, rate: f32, pitch: f32) -> Result<()> {
        self.spoken
            .lock()
            .expect("spoken")
            .push((text.to_string(), rate, pitch));
        Ok(())
    }

    fn cancel(&self) {}
}

#[test]
fn test_speakable_text() {
    let markdown = "# Result\n\nUse **cargo** and *rustc*:\n\n```rust\nfn main() {}\n```\n\nSee [the book](https://doc.rust-lang.org/book/) or run `cargo test`.";
    assert_eq!(
        speakable_text(markdown),
        "Result Use cargo and rustc: See the book or run cargo test."
    );
    assert_eq!(speakable_text("```\nonly code\n```"), "");
    assert_eq!(speakable_text("snake_case_name stays"), "snake_case_name stays");
    assert_eq!(speakable_text("__bold__ text"), "bold text");
}

#[tokio::test]
async fn test_unsupported_recognizer_reports_every_attempt() {
    let (tx, mut rx) = channel();
    let voice = VoiceService::from_config(&VoiceConfig::default(), tx);

    for _ in 0..2 {
        assert!(!voice.listen().await);
        let events = drain(&mut rx);
        assert!(matches!(
            events.as_slice(),
            [Event::Notice(notice)] if notice.kind() == NoticeKind::Warning
        ));
    }
    voice.stop_listening().await;
}

#[tokio::test]
async fn test_unsupported_recognizer_start_fails() {
    let (tx, mut rx) = channel();
    let recognizer = UnsupportedRecognizer;
    assert!(!recognizer.is_supported());
    assert!(recognizer.start(tx).await.is_err());
    assert!(matches!(
        drain(&mut rx).as_slice(),
        [Event::Voice(VoiceEvent::Error(_))]
    ));
}

#[tokio::test]
async fn test_speak_without_command() {
    let (tx, mut rx) = channel();
    let voice = VoiceService::from_config(&VoiceConfig::default(), tx);
    let settings = Settings::default();

    assert!(!voice.speak("hello", &settings).await);
    assert_eq!(drain(&mut rx).len(), 1);

    let auto = Settings {
        auto_speak: true,
        ..Default::default()
    };
    assert!(!voice.auto_speak("hello", &auto).await);
    assert!(drain(&mut rx).is_empty());
}

#[tokio::test]
async fn test_auto_speak_follows_settings() {
    let (tx, _rx) = channel();
    let synthesizer = Arc::new(RecordingSynthesizer::default());
    let voice = VoiceService::new(
        Box::new(UnsupportedRecognizer),
        Box::new(Arc::clone(&synthesizer)),
        tx,
    );

    let mut settings = Settings::default();
    assert!(!voice.auto_speak("**Hi** there", &settings).await);

    settings.auto_speak = true;
    settings.speech_rate = 1.5;
    assert!(voice.auto_speak("**Hi** there", &settings).await);
    assert!(!voice.auto_speak("```\ncode\n```", &settings).await);

    let spoken = synthesizer.spoken.lock().expect("spoken").clone();
    assert_eq!(spoken, vec![("Hi there".to_string(), 1.5, 1.0)]);
}

#[test]
fn test_command_args_expansion() {
    let synthesizer = CommandSynthesizer::new(
        Some("espeak".to_string()),
        vec!["-s".to_string(), "{rate}".to_string(), "-p{pitch}".to_string()],
    );
    assert!(synthesizer.is_supported());
    assert_eq!(synthesizer.expand_args(1.5, 2.0), vec!["-s", "1.5", "-p2"]);

    assert!(!CommandSynthesizer::new(Some("  ".to_string()), vec![]).is_supported());
    assert!(!CommandSynthesizer::new(None, vec![]).is_supported());
}

#[tokio::test]
async fn test_command_synthesizer_pipes_text() {
    let dir = tempfile::tempdir().expect("tempdir");
    let out = dir.path().join("spoken.txt");
    let synthesizer = CommandSynthesizer::new(
        Some("sh".to_string()),
        vec!["-c".to_string(), format!("cat > {}", out.display())],
    );

    synthesizer
        .speak("hello there", 1.0, 1.0)
        .await
        .expect("speak");

    let spoken = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if let Ok(text) = tokio::fs::read_to_string(&out).await {
                if text == "hello there" {
                    return text;
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("speech command ran");
    assert_eq!(spoken, "hello there");

    synthesizer.cancel();
}

#[tokio::test]
async fn test_command_synthesizer_missing_program() {
    let synthesizer = CommandSynthesizer::new(
        Some("definitely-not-a-speech-program".to_string()),
        vec![],
    );
    assert!(synthesizer.speak("hi", 1.0, 1.0).await.is_err());
}
