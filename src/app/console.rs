#[cfg(test)]
#[path = "console_test.rs"]
mod tests;

use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Local;
use tokio::sync::mpsc::UnboundedReceiver;

use crate::app::controller::{ArcController, Rejection, SubmitOutcome};
use crate::app::history::Confirm;
use crate::app::services::VoiceService;
use crate::config::Settings;
use crate::models::{ConversationSummary, Event, Model, Role, SystemMetrics, TurnId, VoiceEvent};
use crate::notice_warning;

pub const HELP: &str = r#"Commands:
  /new              start a new conversation
  /history          list saved conversations
  /open ID          continue a saved conversation
  /search QUERY     search saved conversations
  /delete ID        delete a conversation
  /clear            delete every conversation
  /model NAME       choose the model for new messages (auto routes)
  /models           list the models the backend offers
  /upload PATH      send a file to the backend
  /export [ID]      save a conversation as PDF
  /health           check the backend
  /cancel           stop the response being streamed
  /listen           dictate a message
  /speak            read the last reply aloud
  /stop             stop speaking
  /autospeak        toggle reading replies aloud
  /help             show this help
  /quit             leave (also: quit, exit, bye)"#;

/// One line of user input.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Empty,
    Message(String),
    New,
    History,
    Open(String),
    Search(String),
    Delete(String),
    Clear,
    Model(String),
    Models,
    Upload(PathBuf),
    Export(Option<String>),
    Health,
    Cancel,
    Listen,
    Speak,
    Stop,
    AutoSpeak,
    Help,
    Quit,
    /// A command given without its required argument.
    Usage(&'static str),
    Unknown(String),
}

impl Command {
    pub fn parse(line: &str) -> Command {
        let line = line.trim();
        if line.is_empty() {
            return Command::Empty;
        }
        if matches!(line.to_ascii_lowercase().as_str(), "quit" | "exit" | "bye") {
            return Command::Quit;
        }
        let Some(command) = line.strip_prefix('/') else {
            return Command::Message(line.to_string());
        };

        let (name, arg) = match command.split_once(char::is_whitespace) {
            Some((name, arg)) => (name, arg.trim()),
            None => (command, ""),
        };
        let arg = (!arg.is_empty()).then(|| arg.to_string());

        match (name.to_ascii_lowercase().as_str(), arg) {
            ("new", _) => Command::New,
            ("history", _) => Command::History,
            ("open", Some(id)) => Command::Open(id),
            ("open", None) => Command::Usage("/open ID"),
            ("search", Some(query)) => Command::Search(query),
            ("search", None) => Command::Usage("/search QUERY"),
            ("delete", Some(id)) => Command::Delete(id),
            ("delete", None) => Command::Usage("/delete ID"),
            ("clear", _) => Command::Clear,
            ("model", Some(model)) => Command::Model(model),
            ("model", None) => Command::Usage("/model NAME"),
            ("models", _) => Command::Models,
            ("upload", Some(path)) => Command::Upload(PathBuf::from(path)),
            ("upload", None) => Command::Usage("/upload PATH"),
            ("export", id) => Command::Export(id),
            ("health", _) => Command::Health,
            ("cancel", _) => Command::Cancel,
            ("listen", _) => Command::Listen,
            ("speak", _) => Command::Speak,
            ("stop", _) => Command::Stop,
            ("autospeak", _) => Command::AutoSpeak,
            ("help", _) => Command::Help,
            ("quit" | "exit", _) => Command::Quit,
            (other, _) => Command::Unknown(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

/// Renders controller events as plain text.
///
/// Streaming turns print only what was appended since the previous update,
/// so the reply grows in place on the terminal.
pub struct TerminalView<W: Write> {
    out: W,
    turn: Option<TurnId>,
    printed: usize,
    mid_line: bool,
    model: Option<String>,
    metrics: Option<SystemMetrics>,
    show_metrics: bool,
}

impl<W: Write> TerminalView<W> {
    pub fn new(out: W, show_metrics: bool) -> Self {
        Self {
            out,
            turn: None,
            printed: 0,
            mid_line: false,
            model: None,
            metrics: None,
            show_metrics,
        }
    }

    pub fn set_show_metrics(&mut self, show: bool) {
        self.show_metrics = show;
    }

    pub fn metrics(&self) -> Option<&SystemMetrics> {
        self.metrics.as_ref()
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    pub fn render(&mut self, event: &Event) -> io::Result<()> {
        match event {
            Event::Notice(notice) => {
                self.break_line()?;
                writeln!(self.out, "[{}] {}", notice.kind().label(), notice.message())?;
            }
            Event::MessageAdded(_) => {}
            Event::TurnStarted(turn) => {
                self.break_line()?;
                self.turn = Some(turn.clone());
                self.printed = 0;
                self.model = None;
                write!(self.out, "nexus> ")?;
                self.mid_line = true;
            }
            Event::TurnUpdated { turn, text } => {
                if self.turn.as_ref() == Some(turn) {
                    self.write_suffix(text)?;
                }
            }
            Event::TurnCompleted { turn, text, model } => {
                if self.turn.as_ref() == Some(turn) {
                    self.write_suffix(text)?;
                    self.break_line()?;
                    writeln!(self.out, "  ({})", self.footer(model))?;
                    self.turn = None;
                }
            }
            Event::TurnAborted(turn) => {
                if self.turn.as_ref() == Some(turn) {
                    self.break_line()?;
                    self.turn = None;
                }
            }
            Event::ModelSelected(model) => self.model = Some(model.clone()),
            Event::SetConversation(None) => {
                self.break_line()?;
                writeln!(self.out, "--- new conversation ---")?;
            }
            Event::SetConversation(Some(conversation)) => {
                self.break_line()?;
                writeln!(
                    self.out,
                    "--- {} (#{}) ---",
                    conversation.title(),
                    conversation.id()
                )?;
                for message in conversation.messages() {
                    match message.role() {
                        Role::User => writeln!(self.out, "you> {}", message.content())?,
                        Role::Assistant => {
                            writeln!(self.out, "nexus> {}", message.content())?;
                            if let Some(model) = message.model() {
                                writeln!(self.out, "  ({})", model)?;
                            }
                        }
                    }
                }
            }
            Event::ConversationCreated(summary) => {
                log::debug!("Conversation {} saved as {:?}", summary.id, summary.title);
            }
            Event::ConversationDeleted(id) => {
                writeln!(self.out, "Deleted conversation #{}", id)?;
            }
            Event::HistoryCleared => writeln!(self.out, "History cleared")?,
            Event::Metrics(metrics) => self.metrics = Some(metrics.clone()),
            Event::Voice(VoiceEvent::Transcript {
                text,
                is_final: true,
            }) => {
                self.break_line()?;
                writeln!(self.out, "(heard) {}", text)?;
            }
            Event::Voice(VoiceEvent::Error(reason)) => {
                self.break_line()?;
                writeln!(self.out, "[voice] {}", reason)?;
            }
            Event::Voice(_) => {}
        }
        self.out.flush()
    }

    pub fn history(
        &mut self,
        conversations: &[ConversationSummary],
        active: Option<&str>,
    ) -> io::Result<()> {
        if conversations.is_empty() {
            writeln!(self.out, "No conversations")?;
            return self.out.flush();
        }
        for convo in conversations {
            let marker = if active == Some(convo.id.as_str()) { "*" } else { " " };
            let updated = convo
                .updated_at
                .or(convo.created_at)
                .map(|t| t.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string())
                .unwrap_or_default();
            writeln!(
                self.out,
                "{} #{:<6} {:<32} {:>3} msgs  {}",
                marker, convo.id, convo.title, convo.message_count, updated
            )?;
        }
        self.out.flush()
    }

    pub fn models(&mut self, models: &[Model], selected: &str) -> io::Result<()> {
        for model in models {
            let marker = if model.name() == selected { "*" } else { " " };
            if model.role().is_empty() {
                writeln!(self.out, "{} {}", marker, model.name())?;
            } else {
                writeln!(self.out, "{} {:<20} {}", marker, model.name(), model.role())?;
            }
        }
        self.out.flush()
    }

    pub fn line(&mut self, text: &str) -> io::Result<()> {
        self.break_line()?;
        writeln!(self.out, "{}", text)?;
        self.out.flush()
    }

    /// Writes `prompt` without a newline, leaving the cursor for the answer.
    pub fn prompt(&mut self, prompt: &str) -> io::Result<()> {
        self.break_line()?;
        write!(self.out, "{} [y/N] ", prompt)?;
        self.out.flush()
    }

    fn write_suffix(&mut self, text: &str) -> io::Result<()> {
        if !self.mid_line {
            write!(self.out, "nexus> ")?;
            self.mid_line = true;
        }
        match text.get(self.printed..) {
            Some(suffix) => write!(self.out, "{}", suffix)?,
            None => write!(self.out, "\n{}", text)?,
        }
        self.printed = text.len();
        Ok(())
    }

    fn footer(&self, model: &str) -> String {
        let model = self.model.as_deref().unwrap_or(model);
        match (&self.metrics, self.show_metrics) {
            (Some(metrics), true) => format!("{} | {}", model, metrics),
            _ => model.to_string(),
        }
    }

    /// Ends a partially printed reply line so the next output starts on its
    /// own line. The reply resumes on a fresh line with its next update.
    fn break_line(&mut self) -> io::Result<()> {
        if self.mid_line {
            writeln!(self.out)?;
            self.mid_line = false;
        }
        Ok(())
    }
}

pub fn is_affirmative(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

/// Asks on the terminal and takes the next input line as the answer.
pub struct LineConfirm<'a, W: Write> {
    lines: tokio::sync::Mutex<&'a mut UnboundedReceiver<String>>,
    view: &'a Mutex<TerminalView<W>>,
}

impl<'a, W: Write> LineConfirm<'a, W> {
    pub fn new(lines: &'a mut UnboundedReceiver<String>, view: &'a Mutex<TerminalView<W>>) -> Self {
        Self {
            lines: tokio::sync::Mutex::new(lines),
            view,
        }
    }
}

#[async_trait]
impl<'a, W: Write + Send> Confirm for LineConfirm<'a, W> {
    async fn confirm(&self, prompt: &str) -> bool {
        if let Err(err) = lock(self.view).prompt(prompt) {
            log::warn!("Failed to write prompt: {}", err);
        }
        match self.lines.lock().await.recv().await {
            Some(answer) => is_affirmative(&answer),
            None => false,
        }
    }
}

/// Ties terminal input to the controller and renders what comes back.
pub struct Console<W: Write> {
    controller: ArcController,
    voice: VoiceService,
    settings: Mutex<Settings>,
    settings_path: String,
    export_dir: PathBuf,
    view: Mutex<TerminalView<W>>,
}

impl<W: Write + Send> Console<W> {
    pub fn new(
        controller: ArcController,
        voice: VoiceService,
        settings: Settings,
        settings_path: impl Into<String>,
        export_dir: impl Into<PathBuf>,
        out: W,
    ) -> Self {
        let view = TerminalView::new(out, settings.show_metrics);
        Self {
            controller,
            voice,
            settings: Mutex::new(settings),
            settings_path: settings_path.into(),
            export_dir: export_dir.into(),
            view: Mutex::new(view),
        }
    }

    pub fn settings(&self) -> Settings {
        lock(&self.settings).clone()
    }

    pub fn print(&self, text: &str) {
        if let Err(err) = lock(&self.view).line(text) {
            log::error!("Failed to write to terminal: {}", err);
        }
    }

    /// Renders one controller event, speaking completed replies when the user
    /// turned that on. A final dictation transcript is sent as a message.
    pub async fn render(&self, event: Event) {
        if let Err(err) = lock(&self.view).render(&event) {
            log::error!("Failed to render event: {}", err);
        }
        match &event {
            Event::TurnCompleted { text, .. } => {
                let settings = self.settings();
                self.voice.auto_speak(text, &settings).await;
            }
            Event::Voice(VoiceEvent::Transcript {
                text,
                is_final: true,
            }) if !text.trim().is_empty() => self.send(text.clone()),
            _ => {}
        }
    }

    /// Runs one command. Messages are submitted in the background so that
    /// `/cancel` stays usable while the reply streams in.
    pub async fn handle(&self, command: Command, lines: &mut UnboundedReceiver<String>) -> Flow {
        match command {
            Command::Empty => {}
            Command::Message(text) => self.send(text),
            Command::New => self.controller.new_session().await,
            Command::History => {
                let conversations = self.controller.refresh_history().await;
                self.show_history(&conversations);
            }
            Command::Search(query) => {
                let conversations = self.controller.search_history(&query).await;
                self.show_history(&conversations);
            }
            Command::Open(id) => {
                self.controller.switch_conversation(&id).await;
            }
            Command::Delete(id) => {
                let confirm = LineConfirm::new(lines, &self.view);
                self.controller.delete_conversation(&id, &confirm).await;
            }
            Command::Clear => {
                let confirm = LineConfirm::new(lines, &self.view);
                self.controller.clear_history(&confirm).await;
            }
            Command::Model(model) => self.select_model(model),
            Command::Models => {
                let models = self.controller.list_models().await;
                if models.is_empty() {
                    self.print("No models available");
                } else if let Err(err) =
                    lock(&self.view).models(&models, &self.controller.selected_model())
                {
                    log::error!("Failed to write to terminal: {}", err);
                }
            }
            Command::Upload(path) => {
                self.controller.upload(&path).await;
            }
            Command::Export(id) => {
                self.controller
                    .export_pdf(id.as_deref(), &self.export_dir)
                    .await;
            }
            Command::Health => self.health().await,
            Command::Cancel => {
                if !self.controller.cancel() {
                    self.print("Nothing to cancel");
                }
            }
            Command::Listen => {
                self.voice.listen().await;
            }
            Command::Speak => self.speak_last().await,
            Command::Stop => {
                self.voice.stop_speaking();
                self.voice.stop_listening().await;
            }
            Command::AutoSpeak => {
                let enabled = self.update_settings(|settings| {
                    settings.auto_speak = !settings.auto_speak;
                    settings.auto_speak
                });
                self.print(if enabled {
                    "Replies will be read aloud"
                } else {
                    "Replies will no longer be read aloud"
                });
            }
            Command::Help => self.print(HELP),
            Command::Usage(usage) => self.print(&format!("Usage: {}", usage)),
            Command::Unknown(name) => {
                self.print(&format!("Unknown command /{}, try /help", name))
            }
            Command::Quit => {
                self.controller.cancel();
                self.voice.stop_speaking();
                return Flow::Quit;
            }
        }
        Flow::Continue
    }

    fn send(&self, text: String) {
        let controller = self.controller.clone();
        tokio::spawn(async move {
            if let SubmitOutcome::Rejected(Rejection::Busy) = controller.submit(&text).await {
                controller
                    .emit(notice_warning!(
                        "Still answering the previous message, /cancel to stop it"
                    ))
                    .await;
            }
        });
    }

    fn select_model(&self, model: String) {
        self.controller.set_selected_model(model.clone());
        self.update_settings(|settings| settings.default_model = model.clone());
        self.print(&format!("Using model {}", model));
    }

    async fn health(&self) {
        let healthy = self.controller.check_health().await;
        let mut text = if healthy {
            "Backend is healthy".to_string()
        } else {
            "Backend is unreachable".to_string()
        };
        if let Some(metrics) = lock(&self.view).metrics() {
            text.push_str(&format!(" ({})", metrics));
        }
        self.print(&text);
    }

    async fn speak_last(&self) {
        let last = self
            .controller
            .transcript()
            .into_iter()
            .rev()
            .find(|m| m.is_assistant() && !m.content().is_empty());
        match last {
            Some(message) => {
                let settings = self.settings();
                self.voice.speak(message.content(), &settings).await;
            }
            None => self.print("Nothing to read aloud yet"),
        }
    }

    fn show_history(&self, conversations: &[ConversationSummary]) {
        let active = self.controller.active_conversation();
        if let Err(err) = lock(&self.view).history(conversations, active.as_deref()) {
            log::error!("Failed to write to terminal: {}", err);
        }
    }

    /// Applies `change` and persists the result. A failed save is logged;
    /// the change still holds for this run.
    fn update_settings<T>(&self, change: impl FnOnce(&mut Settings) -> T) -> T {
        let (ret, settings) = {
            let mut settings = lock(&self.settings);
            let ret = change(&mut settings);
            (ret, settings.clone())
        };
        lock(&self.view).set_show_metrics(settings.show_metrics);
        if let Err(err) = settings.save(&self.settings_path) {
            log::error!("Failed to save settings: {:#}", err);
        }
        ret
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
