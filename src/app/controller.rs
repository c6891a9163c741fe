#[cfg(test)]
#[path = "controller_test.rs"]
mod tests;

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use futures::StreamExt;
use tokio_util::sync::CancellationToken;

use crate::app::assembler::{CompletedTurn, Consumed, TurnAssembler};
use crate::backend::{ArcBackend, ChatStream, StreamDecoder};
use crate::config::BackendConfig;
use crate::config::constants::{
    AUTO_MODEL, HISTORY_LIMIT, SEARCH_LIMIT, STREAM_IDLE_TIMEOUT_SECS,
};
use crate::models::conversation::is_auto_model;
use crate::models::{ArcEventTx, ChatRequest, Conversation, Event, Message, NewConversation, TurnId};
use crate::storage::ArcSessionStore;
use crate::{notice_error, notice_info, notice_warning};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    #[default]
    Idle,
    /// Request issued, no response bytes yet.
    Sending,
    StreamingResponse,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    Empty,
    Busy,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SubmitOutcome {
    Rejected(Rejection),
    Completed(CompletedTurn),
    /// Transport failure or timeout. Partial text stays in the transcript.
    Failed(String),
    Cancelled,
}

#[derive(Debug, Clone)]
pub struct ControllerOptions {
    pub fallback_model: String,
    /// Longest wait for the response headers and between two chunks.
    pub idle_timeout: Duration,
    pub history_limit: usize,
    pub search_limit: usize,
}

impl Default for ControllerOptions {
    fn default() -> Self {
        Self {
            fallback_model: AUTO_MODEL.to_string(),
            idle_timeout: Duration::from_secs(STREAM_IDLE_TIMEOUT_SECS),
            history_limit: HISTORY_LIMIT,
            search_limit: SEARCH_LIMIT,
        }
    }
}

impl From<&BackendConfig> for ControllerOptions {
    fn from(value: &BackendConfig) -> Self {
        Self {
            idle_timeout: value.stream_idle_timeout(),
            history_limit: value.history_limit,
            search_limit: value.search_limit,
            ..Default::default()
        }
    }
}

#[derive(Debug)]
struct Session {
    active: Option<String>,
    transcript: Vec<Message>,
    /// Placeholder of the in-flight turn and its index in `transcript`.
    pending: Option<(TurnId, usize)>,
    cancel: Option<CancellationToken>,
    selected_model: String,
}

/// Drives chat turns against the backend and keeps the session store in
/// sync. Shared behind an `Arc`; every method takes `&self`.
pub struct Controller {
    pub(crate) backend: ArcBackend,
    pub(crate) store: ArcSessionStore,
    pub(crate) event_tx: ArcEventTx,
    pub(crate) options: ControllerOptions,
    state: Mutex<ControllerState>,
    session: Mutex<Session>,
}

pub type ArcController = Arc<Controller>;

/// Puts the state back to `Idle` however the turn ends.
struct TurnGuard<'a> {
    state: &'a Mutex<ControllerState>,
}

impl Drop for TurnGuard<'_> {
    fn drop(&mut self) {
        *lock(self.state) = ControllerState::Idle;
        log::debug!("Controller back to idle");
    }
}

enum TurnEnd {
    Completed,
    Failed(String),
    Cancelled,
}

impl Controller {
    pub fn new(
        backend: ArcBackend,
        store: ArcSessionStore,
        event_tx: ArcEventTx,
        options: ControllerOptions,
    ) -> Self {
        let selected_model = options.fallback_model.clone();
        Self {
            backend,
            store,
            event_tx,
            options,
            state: Mutex::new(ControllerState::Idle),
            session: Mutex::new(Session {
                active: None,
                transcript: vec![],
                pending: None,
                cancel: None,
                selected_model,
            }),
        }
    }

    pub fn state(&self) -> ControllerState {
        *lock(&self.state)
    }

    pub fn is_busy(&self) -> bool {
        self.state() != ControllerState::Idle
    }

    pub fn active_conversation(&self) -> Option<String> {
        lock(&self.session).active.clone()
    }

    pub fn transcript(&self) -> Vec<Message> {
        lock(&self.session).transcript.clone()
    }

    pub fn selected_model(&self) -> String {
        lock(&self.session).selected_model.clone()
    }

    pub fn set_selected_model(&self, model: impl Into<String>) {
        let model = model.into();
        log::debug!("Selected model: {}", model);
        lock(&self.session).selected_model = model;
    }

    /// Sends `text` as a new user turn and streams the reply into the
    /// transcript. Resolves when the turn is over.
    pub async fn submit(&self, text: &str) -> SubmitOutcome {
        let prompt = text.trim();
        if prompt.is_empty() {
            return SubmitOutcome::Rejected(Rejection::Empty);
        }

        let Some((_guard, cancel)) = self.try_begin() else {
            log::debug!("Rejecting submit, a turn is already in flight");
            return SubmitOutcome::Rejected(Rejection::Busy);
        };

        let conversation_id = self.ensure_conversation(prompt, &cancel).await;

        let user = Message::user(prompt);
        if !self.push_unless_cancelled(&cancel, user.clone()) {
            return self.cancelled_before_stream();
        }
        self.emit(Event::MessageAdded(user.clone())).await;
        if let Some(id) = conversation_id.as_deref() {
            self.store.add_message(id.to_string(), user).await;
        }

        let mut assembler = TurnAssembler::new();
        let turn = assembler.begin();
        let selected_model = {
            let mut session = lock(&self.session);
            if cancel.is_cancelled() {
                drop(session);
                return self.cancelled_before_stream();
            }
            let index = session.transcript.len();
            session.transcript.push(Message::assistant(""));
            session.pending = Some((turn.clone(), index));
            session.selected_model.clone()
        };
        self.emit(Event::TurnStarted(turn.clone())).await;

        let request = ChatRequest::new(prompt)
            .with_model((!is_auto_model(&selected_model)).then_some(selected_model));

        let end = self.run_turn(request, &turn, &mut assembler, &cancel).await;
        self.clear_cancel();

        match end {
            TurnEnd::Completed => {
                let completed = assembler.finish(&self.options.fallback_model);
                self.complete_turn(&completed, conversation_id.as_deref())
                    .await;
                SubmitOutcome::Completed(completed)
            }
            TurnEnd::Failed(reason) => {
                log::error!("Turn {} failed: {}", turn, reason);
                self.abort_turn(&turn).await;
                self.emit(notice_error!(format!("Request failed: {}", reason)))
                    .await;
                SubmitOutcome::Failed(reason)
            }
            TurnEnd::Cancelled => {
                log::debug!("Turn {} cancelled", turn);
                self.abort_turn(&turn).await;
                self.emit(notice_info!("Response cancelled")).await;
                SubmitOutcome::Cancelled
            }
        }
    }

    /// Stops the in-flight turn, if any. Returns whether there was one.
    pub fn cancel(&self) -> bool {
        match lock(&self.session).cancel.as_ref() {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Drops the active conversation and starts over. Always allowed: a turn
    /// in flight is cancelled first.
    pub async fn new_session(&self) {
        {
            let mut session = lock(&self.session);
            if let Some(token) = session.cancel.as_ref() {
                token.cancel();
            }
            session.active = None;
            session.transcript.clear();
            session.pending = None;
        }
        self.emit(Event::SetConversation(None)).await;

        if let Err(err) = self.backend.reset().await {
            log::warn!("Failed to reset backend context: {:#}", err);
        }
    }

    /// Loads conversation `id` and makes it the active one. Refused while a
    /// turn is in flight.
    pub async fn switch_conversation(&self, id: &str) -> bool {
        if self.is_busy() {
            self.emit(notice_warning!("Wait for the current response to finish"))
                .await;
            return false;
        }

        let Some(conversation) = self.store.get_conversation(id.to_string()).await else {
            self.emit(notice_error!(format!("Conversation {} not found", id)))
                .await;
            return false;
        };

        let switched = {
            let state = lock(&self.state);
            if *state == ControllerState::Idle {
                let mut session = lock(&self.session);
                session.active = Some(conversation.id().to_string());
                session.transcript = conversation.messages().to_vec();
                session.pending = None;
                true
            } else {
                false
            }
        };
        if !switched {
            self.emit(notice_warning!("Wait for the current response to finish"))
                .await;
            return false;
        }

        log::debug!(
            "Switched to conversation {} ({} messages)",
            conversation.id(),
            conversation.len()
        );
        self.emit(Event::SetConversation(Some(conversation))).await;
        true
    }

    pub(crate) async fn emit(&self, event: Event) {
        if let Err(err) = self.event_tx.send(event).await {
            log::error!("Failed to send event: {}", err);
        }
    }

    pub(crate) fn forget_conversation(&self, id: Option<&str>) -> bool {
        let mut session = lock(&self.session);
        let matches = match id {
            Some(id) => session.active.as_deref() == Some(id),
            None => true,
        };
        if matches {
            session.active = None;
            session.transcript.clear();
            session.pending = None;
        }
        matches
    }

    fn try_begin(&self) -> Option<(TurnGuard<'_>, CancellationToken)> {
        let mut state = lock(&self.state);
        if *state != ControllerState::Idle {
            return None;
        }
        *state = ControllerState::Sending;
        let guard = TurnGuard { state: &self.state };
        drop(state);

        let token = CancellationToken::new();
        lock(&self.session).cancel = Some(token.clone());
        log::debug!("Controller sending");
        Some((guard, token))
    }

    /// Only the turn holding the state can own the token slot.
    fn clear_cancel(&self) {
        lock(&self.session).cancel = None;
    }

    /// Returns the active conversation id, creating the conversation first
    /// when there is none. A turn cancelled while the store was busy leaves
    /// the session unbound.
    async fn ensure_conversation(
        &self,
        prompt: &str,
        cancel: &CancellationToken,
    ) -> Option<String> {
        let (active, selected_model) = {
            let session = lock(&self.session);
            (session.active.clone(), session.selected_model.clone())
        };
        if active.is_some() {
            return active;
        }

        let request = NewConversation::from_prompt(prompt, &selected_model);
        let title = request.title.clone();
        let model = request.model.clone();
        let Some(id) = self.store.create_conversation(request).await else {
            log::warn!("Continuing without persistence, conversation not created");
            return None;
        };

        let summary = Conversation::new(id.clone())
            .with_title(title)
            .with_model(model)
            .summary();
        let bound = {
            let mut session = lock(&self.session);
            if cancel.is_cancelled() {
                false
            } else {
                session.active = Some(id.clone());
                true
            }
        };
        self.emit(Event::ConversationCreated(summary)).await;

        if !bound {
            log::debug!("Turn cancelled, conversation {} left unbound", id);
            return None;
        }
        Some(id)
    }

    /// Appends `message` to the transcript unless the turn was cancelled.
    /// The check and the push happen under one lock so a concurrent
    /// `new_session` cannot slip in between.
    fn push_unless_cancelled(&self, cancel: &CancellationToken, message: Message) -> bool {
        let mut session = lock(&self.session);
        if cancel.is_cancelled() {
            return false;
        }
        session.transcript.push(message);
        true
    }

    fn cancelled_before_stream(&self) -> SubmitOutcome {
        log::debug!("Turn cancelled before the request was sent");
        self.clear_cancel();
        SubmitOutcome::Cancelled
    }

    async fn run_turn(
        &self,
        request: ChatRequest,
        turn: &TurnId,
        assembler: &mut TurnAssembler,
        cancel: &CancellationToken,
    ) -> TurnEnd {
        let idle_timeout = self.options.idle_timeout;

        let stream = tokio::select! {
            _ = cancel.cancelled() => return TurnEnd::Cancelled,
            res = tokio::time::timeout(idle_timeout, self.backend.chat(request)) => match res {
                Ok(Ok(stream)) => stream,
                Ok(Err(err)) => return TurnEnd::Failed(format!("{:#}", err)),
                Err(_) => return TurnEnd::Failed(timeout_reason(idle_timeout)),
            },
        };

        self.stream_turn(stream, turn, assembler, cancel).await
    }

    async fn stream_turn(
        &self,
        mut stream: ChatStream,
        turn: &TurnId,
        assembler: &mut TurnAssembler,
        cancel: &CancellationToken,
    ) -> TurnEnd {
        let idle_timeout = self.options.idle_timeout;
        let mut decoder = StreamDecoder::new();
        let mut streaming = false;

        loop {
            let next = tokio::select! {
                _ = cancel.cancelled() => return TurnEnd::Cancelled,
                next = tokio::time::timeout(idle_timeout, stream.next()) => next,
            };

            let chunk = match next {
                Ok(Some(Ok(chunk))) => chunk,
                Ok(Some(Err(err))) => return TurnEnd::Failed(format!("{:#}", err)),
                Ok(None) => break,
                Err(_) => return TurnEnd::Failed(timeout_reason(idle_timeout)),
            };

            if !streaming {
                streaming = true;
                *lock(&self.state) = ControllerState::StreamingResponse;
                log::debug!("Turn {} streaming", turn);
            }

            for event in decoder.decode(&chunk) {
                match assembler.consume(event) {
                    Consumed::Text(text) => {
                        let text = text.to_string();
                        if self.update_placeholder(turn, |m| m.set_content(text.as_str())) {
                            self.emit(Event::TurnUpdated {
                                turn: turn.clone(),
                                text,
                            })
                            .await;
                        }
                    }
                    Consumed::ModelResolved(model) => {
                        let model = model.to_string();
                        self.emit(Event::ModelSelected(model)).await;
                    }
                    Consumed::Ignored => {}
                }
            }
        }

        decoder.finish();
        TurnEnd::Completed
    }

    async fn complete_turn(&self, completed: &CompletedTurn, conversation_id: Option<&str>) {
        let turn = &completed.turn;
        let finalized = self.update_placeholder(turn, |m| {
            m.set_content(completed.text.as_str());
            m.set_model(completed.model.as_str());
        });
        self.release_placeholder(turn);

        if finalized {
            self.emit(Event::TurnCompleted {
                turn: turn.clone(),
                text: completed.text.clone(),
                model: completed.model.clone(),
            })
            .await;
        }

        if let Some(id) = conversation_id {
            let reply = Message::assistant(completed.text.as_str())
                .with_model(completed.model.as_str());
            self.store.add_message(id.to_string(), reply).await;
        }
        log::debug!(
            "Turn {} completed with {} chars from {}",
            turn,
            completed.text.len(),
            completed.model
        );
    }

    async fn abort_turn(&self, turn: &TurnId) {
        self.release_placeholder(turn);
        self.emit(Event::TurnAborted(turn.clone())).await;
    }

    /// Applies `update` to the placeholder of `turn`, unless the session
    /// moved on since the turn began.
    fn update_placeholder(&self, turn: &TurnId, update: impl FnOnce(&mut Message)) -> bool {
        let mut session = lock(&self.session);
        let Some((pending, index)) = session.pending.clone() else {
            return false;
        };
        if &pending != turn {
            return false;
        }
        match session.transcript.get_mut(index) {
            Some(message) => {
                update(message);
                true
            }
            None => false,
        }
    }

    fn release_placeholder(&self, turn: &TurnId) {
        let mut session = lock(&self.session);
        if session.pending.as_ref().is_some_and(|(p, _)| p == turn) {
            session.pending = None;
        }
    }
}

fn timeout_reason(timeout: Duration) -> String {
    format!("no response from backend within {}s", timeout.as_secs())
}

/// A poisoned lock only means another task panicked mid-update; the
/// protected data is still usable.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
