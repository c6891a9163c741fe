#[cfg(test)]
#[path = "voice_test.rs"]
mod tests;

use std::process::Stdio;
use std::sync::Mutex;

use async_trait::async_trait;
use eyre::{Context, Result, bail};
use once_cell::sync::Lazy;
use regex::Regex;
use tokio::io::AsyncWriteExt;
use tokio::process::{Child, Command};

use crate::config::{Settings, VoiceConfig};
use crate::models::{ArcEventTx, Event, VoiceEvent};
use crate::{notice_error, notice_warning};

static FENCED_CODE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```.*?```").expect("valid fenced code regex"));
static INLINE_CODE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"`([^`]*)`").expect("valid inline code regex"));
static LINK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"!?\[([^\]]*)\]\([^)]*\)").expect("valid link regex"));
static STRONG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\*\*|__)(.+?)(\*\*|__)").expect("valid strong regex"));
static EMPHASIS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\*([^*\n]+)\*").expect("valid emphasis regex"));
static HEADING: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^\s{0,3}#{1,6}\s+").expect("valid heading regex"));
static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid whitespace regex"));

/// Turns a markdown reply into text worth reading aloud: code blocks are
/// dropped, markup is reduced to its words.
pub fn speakable_text(markdown: &str) -> String {
    let text = FENCED_CODE.replace_all(markdown, " ");
    let text = INLINE_CODE.replace_all(&text, "$1");
    let text = LINK.replace_all(&text, "$1");
    let text = STRONG.replace_all(&text, "$2");
    let text = EMPHASIS.replace_all(&text, "$1");
    let text = HEADING.replace_all(&text, "");
    WHITESPACE.replace_all(&text, " ").trim().to_string()
}

#[async_trait]
pub trait SpeechRecognizer {
    fn is_supported(&self) -> bool;
    /// Starts listening. Progress and transcripts arrive as
    /// [`Event::Voice`] on `events`.
    async fn start(&self, events: ArcEventTx) -> Result<()>;
    async fn stop(&self) -> Result<()>;
}

#[async_trait]
pub trait SpeechSynthesizer {
    fn is_supported(&self) -> bool;
    async fn speak(&self, text: &str, rate: f32, pitch: f32) -> Result<()>;
    /// Silences whatever is being spoken.
    fn cancel(&self);
}

/// Recognizer for platforms without speech input.
#[derive(Debug, Default)]
pub struct UnsupportedRecognizer;

#[async_trait]
impl SpeechRecognizer for UnsupportedRecognizer {
    fn is_supported(&self) -> bool {
        false
    }

    async fn start(&self, events: ArcEventTx) -> Result<()> {
        let reason = "speech recognition is not supported on this platform";
        if let Err(err) = events
            .send(Event::Voice(VoiceEvent::Error(reason.to_string())))
            .await
        {
            log::error!("Failed to send event: {}", err);
        }
        bail!(reason)
    }

    async fn stop(&self) -> Result<()> {
        Ok(())
    }
}

/// Speaks by piping text into an external program such as `espeak`.
///
/// `{rate}` and `{pitch}` in the configured arguments are replaced with the
/// values passed to [`SpeechSynthesizer::speak`].
pub struct CommandSynthesizer {
    command: Option<String>,
    args: Vec<String>,
    current: Mutex<Option<Child>>,
}

impl CommandSynthesizer {
    pub fn new(command: Option<String>, args: Vec<String>) -> Self {
        Self {
            command: command.filter(|c| !c.trim().is_empty()),
            args,
            current: Mutex::new(None),
        }
    }

    fn expand_args(&self, rate: f32, pitch: f32) -> Vec<String> {
        self.args
            .iter()
            .map(|arg| {
                arg.replace("{rate}", &rate.to_string())
                    .replace("{pitch}", &pitch.to_string())
            })
            .collect()
    }

    fn replace_current(&self, child: Option<Child>) {
        let mut current = self
            .current
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(mut previous) = std::mem::replace(&mut *current, child) {
            if let Err(err) = previous.start_kill() {
                log::trace!("Speech process already gone: {}", err);
            }
        }
    }
}

impl From<&VoiceConfig> for CommandSynthesizer {
    fn from(value: &VoiceConfig) -> Self {
        Self::new(value.speak_command.clone(), value.speak_args.clone())
    }
}

#[async_trait]
impl SpeechSynthesizer for CommandSynthesizer {
    fn is_supported(&self) -> bool {
        self.command.is_some()
    }

    async fn speak(&self, text: &str, rate: f32, pitch: f32) -> Result<()> {
        let Some(command) = self.command.as_deref() else {
            bail!("no speech command configured");
        };

        let mut child = Command::new(command)
            .args(self.expand_args(rate, pitch))
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .wrap_err(format!("spawning {}", command))?;

        let stdin = child.stdin.take();
        self.replace_current(Some(child));

        if let Some(mut stdin) = stdin {
            stdin
                .write_all(text.as_bytes())
                .await
                .wrap_err("writing text to speech command")?;
            stdin.shutdown().await.wrap_err("closing speech input")?;
        }
        Ok(())
    }

    fn cancel(&self) {
        self.replace_current(None);
    }
}

/// Front door for speech input and output.
pub struct VoiceService {
    recognizer: Box<dyn SpeechRecognizer + Send + Sync>,
    synthesizer: Box<dyn SpeechSynthesizer + Send + Sync>,
    event_tx: ArcEventTx,
}

impl VoiceService {
    pub fn new(
        recognizer: Box<dyn SpeechRecognizer + Send + Sync>,
        synthesizer: Box<dyn SpeechSynthesizer + Send + Sync>,
        event_tx: ArcEventTx,
    ) -> Self {
        Self {
            recognizer,
            synthesizer,
            event_tx,
        }
    }

    pub fn from_config(config: &VoiceConfig, event_tx: ArcEventTx) -> Self {
        Self::new(
            Box::new(UnsupportedRecognizer),
            Box::new(CommandSynthesizer::from(config)),
            event_tx,
        )
    }

    pub async fn listen(&self) -> bool {
        if !self.recognizer.is_supported() {
            self.notify(notice_warning!(
                "Speech recognition is not supported on this platform"
            ))
            .await;
            return false;
        }

        match self.recognizer.start(self.event_tx.clone()).await {
            Ok(()) => true,
            Err(err) => {
                log::error!("Failed to start speech recognition: {:#}", err);
                self.notify(notice_error!(format!("Voice input failed: {}", err)))
                    .await;
                false
            }
        }
    }

    pub async fn stop_listening(&self) {
        if let Err(err) = self.recognizer.stop().await {
            log::warn!("Failed to stop speech recognition: {:#}", err);
        }
    }

    /// Reads `markdown` aloud with the rate and pitch from `settings`.
    pub async fn speak(&self, markdown: &str, settings: &Settings) -> bool {
        if !self.synthesizer.is_supported() {
            self.notify(notice_warning!(
                "Speech output is not configured, set voice.speak_command"
            ))
            .await;
            return false;
        }
        self.say(markdown, settings).await
    }

    /// Speaks a completed reply when the user asked for it.
    pub async fn auto_speak(&self, markdown: &str, settings: &Settings) -> bool {
        if !settings.auto_speak || !self.synthesizer.is_supported() {
            return false;
        }
        self.say(markdown, settings).await
    }

    pub fn stop_speaking(&self) {
        self.synthesizer.cancel();
    }

    async fn say(&self, markdown: &str, settings: &Settings) -> bool {
        let text = speakable_text(markdown);
        if text.is_empty() {
            return false;
        }

        match self
            .synthesizer
            .speak(&text, settings.speech_rate, settings.speech_pitch)
            .await
        {
            Ok(()) => true,
            Err(err) => {
                log::error!("Speech output failed: {:#}", err);
                self.notify(notice_error!(format!("Speech output failed: {}", err)))
                    .await;
                false
            }
        }
    }

    async fn notify(&self, event: Event) {
        if let Err(err) = self.event_tx.send(event).await {
            log::error!("Failed to send event: {}", err);
        }
    }
}
